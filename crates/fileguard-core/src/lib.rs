//! Item protection core for the file manager.
//!
//! ```text
//!  MotionSampler ──► ShakeDetector ──► ShakeSortToggle ──┐
//!                                                         ▼
//!  PreferenceStore ◄──────────────────────────────────  Config
//!                                                     ▲        ▲
//!       BiometricService / DeviceLock ──► ProtectionSetupFlow  ProtectionGate
//! ```

pub mod biometric;
pub mod config;
pub mod error;
pub mod gate;
pub mod paths;
pub mod prefs;
pub mod settings;
pub mod setup;
pub mod shake;

pub use biometric::{
    BiometricEvent, BiometricPrompt, BiometricService, DeviceLock, Notice, Notifier,
};
pub use config::Config;
pub use error::{ProtectionError, Result};
pub use gate::{Access, GateSession, GateState, ProtectionGate, Verification};
pub use prefs::{FilePreferences, MemoryPreferences, PrefValue, PreferenceStore};
pub use settings::{Mechanism, ProtectionSettings};
pub use setup::{ProtectionSetupFlow, SetupSession, SetupState};
pub use shake::{AccelSample, MotionSampler, ShakeDetector, ShakeSortToggle, ShakeState};
