//! Platform capabilities the protection flows depend on.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub const DEFAULT_PROMPT_TITLE: &str = "Fingerprint authentication";
pub const DEFAULT_PROMPT_DESCRIPTION: &str = "Authenticate to access the item";
pub const DEFAULT_CANCEL_LABEL: &str = "Cancel";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricPrompt {
    pub title: String,
    pub description: String,
    pub cancel_label: String,
}

impl Default for BiometricPrompt {
    fn default() -> Self {
        Self {
            title: DEFAULT_PROMPT_TITLE.to_string(),
            description: DEFAULT_PROMPT_DESCRIPTION.to_string(),
            cancel_label: DEFAULT_CANCEL_LABEL.to_string(),
        }
    }
}

/// Events of one biometric challenge. `FailedAttempt` may repeat; the
/// challenge ends with `Success` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BiometricEvent {
    Success,
    Error { code: i32, message: String },
    FailedAttempt,
}

impl BiometricEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::FailedAttempt)
    }
}

#[async_trait]
pub trait BiometricService: Send + Sync {
    /// Whether the platform offers a biometric prompt at all.
    fn is_available(&self) -> bool;

    /// Start a challenge. Events arrive on the returned channel from the
    /// service's own executor.
    async fn authenticate(&self, prompt: &BiometricPrompt) -> mpsc::Receiver<BiometricEvent>;
}

pub trait DeviceLock: Send + Sync {
    fn is_device_secure(&self) -> bool;
}

/// Fixed answer, for platforms that report lock state once at startup.
#[derive(Debug, Clone, Copy)]
pub struct StaticDeviceLock(pub bool);

impl DeviceLock for StaticDeviceLock {
    fn is_device_secure(&self) -> bool {
        self.0
    }
}

/// Platforms without a biometric prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBiometrics;

#[async_trait]
impl BiometricService for NoBiometrics {
    fn is_available(&self) -> bool {
        false
    }

    async fn authenticate(&self, _prompt: &BiometricPrompt) -> mpsc::Receiver<BiometricEvent> {
        let (tx, rx) = mpsc::channel(1);
        let _ = tx
            .send(BiometricEvent::Error {
                code: 1,
                message: "biometric hardware unavailable".to_string(),
            })
            .await;
        rx
    }
}

/// Replays a fixed script of events for every challenge.
#[derive(Debug, Default)]
pub struct ScriptedBiometrics {
    script: Mutex<Vec<BiometricEvent>>,
    challenges: Mutex<Vec<BiometricPrompt>>,
}

impl ScriptedBiometrics {
    pub fn new(script: Vec<BiometricEvent>) -> Self {
        Self {
            script: Mutex::new(script),
            challenges: Mutex::new(Vec::new()),
        }
    }

    pub fn set_script(&self, script: Vec<BiometricEvent>) {
        *self.script.lock() = script;
    }

    pub fn challenges(&self) -> Vec<BiometricPrompt> {
        self.challenges.lock().clone()
    }
}

#[async_trait]
impl BiometricService for ScriptedBiometrics {
    fn is_available(&self) -> bool {
        true
    }

    async fn authenticate(&self, prompt: &BiometricPrompt) -> mpsc::Receiver<BiometricEvent> {
        self.challenges.lock().push(prompt.clone());
        let events = self.script.lock().clone();
        let (tx, rx) = mpsc::channel(events.len().max(1));
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        rx
    }
}

/// Short user-visible messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Notice {
    WrongPin,
    PinMismatch,
    AuthenticationFailed,
    NoVerificationMethod,
    BiometricError(String),
    BiometricSetupSucceeded,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongPin => f.write_str("Wrong PIN"),
            Self::PinMismatch => f.write_str("PIN does not match"),
            Self::AuthenticationFailed => f.write_str("Authentication failed"),
            Self::NoVerificationMethod => {
                f.write_str("No fingerprints or secure lock screen registered")
            }
            Self::BiometricError(message) => f.write_str(message),
            Self::BiometricSetupSucceeded => f.write_str("Fingerprint protection set up"),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Keeps every notice, for callers that render them later.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}
