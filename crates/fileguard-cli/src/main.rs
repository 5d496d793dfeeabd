use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fileguard_core::biometric::{BiometricService, NoBiometrics, StaticDeviceLock};
use fileguard_core::paths::{data_dir, PREFERENCES_FILE};
use fileguard_core::{
    Access, Config, FilePreferences, GateState, Mechanism, ProtectionError, ProtectionGate,
    ProtectionSetupFlow, SetupState, ShakeDetector, ShakeSortToggle, Verification,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod console;
mod replay;

use crate::console::{confirm, prompt_pin, ConsoleBiometrics, ConsoleNotifier};
use crate::replay::ReplaySampler;

#[derive(Parser)]
#[command(name = "fileguard")]
#[command(about = "Protect file manager items with a PIN or biometrics", long_about = None)]
struct Cli {
    /// Directory holding preferences.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Report the device as having a secure lock screen
    #[arg(long, global = true)]
    device_secure: bool,

    /// Biometric backend
    #[arg(long, global = true, value_enum, default_value_t = BiometricBackend::None)]
    biometrics: BiometricBackend,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BiometricBackend {
    None,
    Console,
}

#[derive(Subcommand)]
enum Commands {
    /// Show protection settings
    Status,

    /// Add an item to the protected set
    Protect { path: String },

    /// Remove an item from the protected set
    Unprotect { path: String },

    /// List protected items
    List,

    /// Turn protection on globally
    Enable,

    /// Turn protection off globally
    Disable,

    /// Choose the protection mechanism
    Setup {
        #[arg(long)]
        mechanism: Mechanism,
    },

    /// Ask for access to an item
    Open { path: String },

    /// Flip the sort direction of a folder
    ToggleSort { path: String },

    /// Feed recorded accelerometer samples through the shake detector
    ShakeReplay {
        /// File with `timestamp_ms,x,y,z` lines
        file: PathBuf,

        /// Folder whose sorting a shake toggles
        #[arg(long, default_value = "")]
        folder: String,
    },
}

struct App {
    config: Config,
    gate: ProtectionGate,
    setup: ProtectionSetupFlow,
}

impl App {
    fn load(cli: &Cli) -> Result<Self> {
        let dir = match &cli.data_dir {
            Some(dir) => dir.clone(),
            None => data_dir()?,
        };
        let prefs = FilePreferences::open(dir.join(PREFERENCES_FILE))?;
        info!(path = %prefs.path().display(), "preferences opened");
        let config = Config::new(Arc::new(prefs));

        let device = Arc::new(StaticDeviceLock(cli.device_secure));
        let biometrics: Arc<dyn BiometricService> = match cli.biometrics {
            BiometricBackend::None => Arc::new(NoBiometrics),
            BiometricBackend::Console => Arc::new(ConsoleBiometrics),
        };
        let notifier = Arc::new(ConsoleNotifier);

        let gate = ProtectionGate::new(
            config.clone(),
            device.clone(),
            biometrics.clone(),
            notifier.clone(),
        );
        let setup = ProtectionSetupFlow::new(config.clone(), device, biometrics, notifier);
        Ok(Self {
            config,
            gate,
            setup,
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let app = App::load(&cli)?;

    match cli.command {
        Commands::Status => {
            let status = serde_json::json!({
                "protection": app.config.protection_settings(),
                "pinConfigured": !app.config.protection_pin().is_empty(),
                "shakeTogglesSorting": app.config.enable_shake_toggle_sorting(),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        Commands::Protect { path } => {
            app.config.add_protected(&path);
            println!("protected {path}");
        }

        Commands::Unprotect { path } => {
            // Removing protection requires passing the gate first.
            match open(&app, &path).await? {
                Access::Granted => {
                    app.config.remove_protected(&path);
                    println!("unprotected {path}");
                }
                Access::Denied(reason) => bail!("access denied: {reason}"),
            }
        }

        Commands::List => {
            for item in app.config.protected_items() {
                println!("{item}");
            }
        }

        Commands::Enable => {
            app.config.set_protection_enabled(true);
            println!("protection enabled");
        }

        Commands::Disable => {
            app.config.set_protection_enabled(false);
            println!("protection disabled");
        }

        Commands::Setup { mechanism } => setup(&app, mechanism).await?,

        Commands::Open { path } => match open(&app, &path).await? {
            Access::Granted => println!("access granted: {path}"),
            Access::Denied(reason) => bail!("access denied: {reason}"),
        },

        Commands::ToggleSort { path } => {
            let sorting = app.config.toggle_sort_order(&path);
            println!("sorting for '{path}' is now {sorting}");
        }

        Commands::ShakeReplay { file, folder } => {
            let mut sampler = ReplaySampler::from_file(&file)?;
            if sampler.is_empty() {
                bail!("no samples in {}", file.display());
            }
            let toggle = ShakeSortToggle::new(app.config.clone(), folder.clone());
            let mut detector = ShakeDetector::with_listener(toggle);
            let shakes = detector.run(&mut sampler).await?;
            println!(
                "{} samples, {} shakes, sorting for '{}' is now {}",
                sampler.len(),
                shakes,
                folder,
                app.config.folder_sorting(&folder)
            );
        }
    }

    Ok(())
}

async fn open(app: &App, path: &str) -> Result<Access> {
    let (tx, rx) = oneshot::channel();
    let mut session = app.gate.access(path, move |access| {
        let _ = tx.send(access);
    });
    loop {
        match session.state().clone() {
            GateState::Evaluating(Verification::Pin) => {
                let pin = prompt_pin("PIN (empty to cancel): ")?;
                if pin.is_empty() {
                    session.dismiss();
                } else {
                    // Wrong PINs are reported through the notifier; keep asking.
                    let _ = session.submit_pin(&pin);
                }
            }
            GateState::Evaluating(Verification::Biometric) => {
                session.resolve_biometric().await;
            }
            _ => break,
        }
    }
    rx.await.map_err(|_| anyhow!("gate finished without a decision"))
}

async fn setup(app: &App, mechanism: Mechanism) -> Result<()> {
    let (tx, rx) = oneshot::channel();
    let mut session = app.setup.start(move |ok| {
        let _ = tx.send(ok);
    });
    session.select(mechanism)?;

    while !session.is_done() {
        let result = match session.state() {
            SetupState::ConfirmingPin => {
                let pin = prompt_pin("New PIN: ")?;
                let confirm_pin = prompt_pin("Confirm PIN: ")?;
                session.submit(&pin, &confirm_pin).await
            }
            _ => session.submit("", "").await,
        };
        match result {
            Ok(()) => {}
            Err(ProtectionError::NoSecureLockConfigured) => session.dismiss(),
            Err(err) => {
                if !confirm(&format!("{err}. Try again?"))? {
                    session.dismiss();
                }
            }
        }
    }

    if rx.await.unwrap_or(false) {
        println!("protection set to {}", mechanism.as_str());
        Ok(())
    } else {
        bail!("protection setup was not completed")
    }
}
