use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fileguard_core::biometric::{BiometricEvent, BiometricPrompt, BiometricService, Notice, Notifier};
use std::io::{self, BufRead, Write};
use tokio::sync::mpsc;
use tracing::debug;
use zeroize::Zeroizing;

/// Stand-in for a fingerprint sensor: each attempt is answered on stdin.
pub struct ConsoleBiometrics;

#[async_trait]
impl BiometricService for ConsoleBiometrics {
    fn is_available(&self) -> bool {
        true
    }

    async fn authenticate(&self, prompt: &BiometricPrompt) -> mpsc::Receiver<BiometricEvent> {
        let (tx, rx) = mpsc::channel(4);
        let prompt = prompt.clone();
        tokio::task::spawn_blocking(move || {
            eprintln!("{}", prompt.title);
            eprintln!("{}", prompt.description);
            let stdin = io::stdin();
            loop {
                eprint!("Touch the sensor [y = match, n = no match, c = {}]: ", prompt.cancel_label);
                let _ = io::stderr().flush();
                let mut line = String::new();
                let event = match stdin.lock().read_line(&mut line) {
                    Ok(0) | Err(_) => BiometricEvent::Error {
                        code: 5,
                        message: "Input closed".to_string(),
                    },
                    Ok(_) => match line.trim() {
                        "y" | "Y" => BiometricEvent::Success,
                        "c" | "C" => BiometricEvent::Error {
                            code: 10,
                            message: "Authentication canceled by user".to_string(),
                        },
                        _ => BiometricEvent::FailedAttempt,
                    },
                };
                let terminal = event.is_terminal();
                if tx.blocking_send(event).is_err() || terminal {
                    break;
                }
            }
            debug!("console biometric challenge finished");
        });
        rx
    }
}

pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        eprintln!("{notice}");
    }
}

pub fn prompt_pin(prompt: &str) -> Result<Zeroizing<String>> {
    let pin = rpassword::prompt_password(prompt).map_err(|e| anyhow!("read PIN: {e}"))?;
    Ok(Zeroizing::new(pin))
}

pub fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N]: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}
