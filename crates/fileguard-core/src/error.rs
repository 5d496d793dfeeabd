//! Error types for item protection

use thiserror::Error;

/// Errors surfaced by the setup flow and the gate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtectionError {
    #[error("no secure lock screen is configured on this device")]
    NoSecureLockConfigured,

    #[error("biometric authentication is not available")]
    BiometricUnavailable,

    #[error("biometric error {code}: {message}")]
    BiometricError { code: i32, message: String },

    #[error("wrong PIN")]
    WrongPin,

    #[error("PIN and confirmation do not match")]
    PinMismatchOnSetup,

    #[error("cancelled by user")]
    UserCancelled,

    #[error("invalid operation: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, ProtectionError>;
