//! Access gate for protected items.
//!
//! `ProtectionGate::evaluate` opens a [`GateSession`] that walks
//! `Idle -> Evaluating -> Granted | Denied`. The caller's callback fires once,
//! when the session reaches a terminal state. Wrong PINs and failed biometric
//! attempts keep the session open with no retry limit.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::biometric::{
    BiometricEvent, BiometricPrompt, BiometricService, DeviceLock, Notice, Notifier,
};
use crate::config::Config;
use crate::error::{ProtectionError, Result};
use crate::settings::Mechanism;

pub type AccessCallback = Box<dyn FnOnce(Access) + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied(ProtectionError),
}

impl Access {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Pin,
    Biometric,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Evaluating(Verification),
    Granted,
    Denied(ProtectionError),
}

#[derive(Clone)]
pub struct ProtectionGate {
    config: Config,
    device: Arc<dyn DeviceLock>,
    biometrics: Arc<dyn BiometricService>,
    notifier: Arc<dyn Notifier>,
    prompt: BiometricPrompt,
}

impl ProtectionGate {
    pub fn new(
        config: Config,
        device: Arc<dyn DeviceLock>,
        biometrics: Arc<dyn BiometricService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            device,
            biometrics,
            notifier,
            prompt: BiometricPrompt::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: BiometricPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Decide access to `path`, asking for proof of identity when
    /// protection is on.
    pub fn evaluate(
        &self,
        path: &str,
        on_result: impl FnOnce(Access) + Send + 'static,
    ) -> GateSession {
        let mut session = self.session(path, Box::new(on_result));

        if !self.config.is_protection_enabled() {
            session.finish(Access::Granted);
            return session;
        }

        match self.config.mechanism() {
            Mechanism::Biometric => {
                if !self.device.is_device_secure() {
                    self.notifier.notify(Notice::NoVerificationMethod);
                    session.finish(Access::Denied(ProtectionError::NoSecureLockConfigured));
                } else if self.biometrics.is_available() {
                    session.state = GateState::Evaluating(Verification::Biometric);
                } else if !self.config.protection_pin().is_empty() {
                    debug!(session = %session.id, "biometrics unavailable, falling back to PIN");
                    session.state = GateState::Evaluating(Verification::Pin);
                } else {
                    self.notifier.notify(Notice::NoVerificationMethod);
                    session.finish(Access::Denied(ProtectionError::BiometricUnavailable));
                }
            }
            Mechanism::Pin => {
                if self.config.protection_pin().is_empty() {
                    self.notifier.notify(Notice::NoVerificationMethod);
                    session.finish(Access::Denied(ProtectionError::InvalidState(
                        "no PIN configured".to_string(),
                    )));
                } else {
                    session.state = GateState::Evaluating(Verification::Pin);
                }
            }
        }
        session
    }

    /// Like [`evaluate`](Self::evaluate), but items outside the protected
    /// set are granted without a prompt.
    pub fn access(
        &self,
        path: &str,
        on_result: impl FnOnce(Access) + Send + 'static,
    ) -> GateSession {
        if self.config.is_protected(path) {
            return self.evaluate(path, on_result);
        }
        let mut session = self.session(path, Box::new(on_result));
        session.finish(Access::Granted);
        session
    }

    fn session(&self, path: &str, callback: AccessCallback) -> GateSession {
        GateSession {
            id: Uuid::new_v4(),
            path: path.to_string(),
            state: GateState::Idle,
            callback: Some(callback),
            config: self.config.clone(),
            biometrics: self.biometrics.clone(),
            notifier: self.notifier.clone(),
            prompt: self.prompt.clone(),
            events: None,
        }
    }
}

/// One evaluation of one item. Dropping an unfinished session counts as the
/// user dismissing the prompt.
pub struct GateSession {
    id: Uuid,
    path: String,
    state: GateState,
    callback: Option<AccessCallback>,
    config: Config,
    biometrics: Arc<dyn BiometricService>,
    notifier: Arc<dyn Notifier>,
    prompt: BiometricPrompt,
    events: Option<mpsc::Receiver<BiometricEvent>>,
}

impl std::fmt::Debug for GateSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateSession")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl GateSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, GateState::Granted | GateState::Denied(_))
    }

    pub fn outcome(&self) -> Option<Access> {
        match &self.state {
            GateState::Granted => Some(Access::Granted),
            GateState::Denied(reason) => Some(Access::Denied(reason.clone())),
            _ => None,
        }
    }

    /// Compare an entered PIN with the stored one.
    pub fn submit_pin(&mut self, entered: &str) -> Result<()> {
        if self.state != GateState::Evaluating(Verification::Pin) {
            return Err(ProtectionError::InvalidState(
                "session is not waiting for a PIN".to_string(),
            ));
        }
        let stored = Zeroizing::new(self.config.protection_pin());
        if entered == stored.as_str() {
            self.finish(Access::Granted);
            Ok(())
        } else {
            debug!(session = %self.id, "wrong PIN entered");
            self.notifier.notify(Notice::WrongPin);
            Err(ProtectionError::WrongPin)
        }
    }

    /// Apply one event of the running biometric challenge.
    pub fn on_biometric_event(&mut self, event: BiometricEvent) {
        if self.state != GateState::Evaluating(Verification::Biometric) {
            debug!(session = %self.id, ?event, "biometric event outside challenge ignored");
            return;
        }
        match event {
            BiometricEvent::Success => self.finish(Access::Granted),
            BiometricEvent::Error { code, message } => {
                self.notifier.notify(Notice::BiometricError(message.clone()));
                self.finish(Access::Denied(ProtectionError::BiometricError {
                    code,
                    message,
                }));
            }
            BiometricEvent::FailedAttempt => {
                self.notifier.notify(Notice::AuthenticationFailed);
            }
        }
    }

    /// Run the biometric challenge until it settles. A challenge whose
    /// event stream ends early is treated as cancelled.
    pub async fn resolve_biometric(&mut self) -> &GateState {
        if self.state != GateState::Evaluating(Verification::Biometric) {
            return &self.state;
        }
        if self.events.is_none() {
            self.events = Some(self.biometrics.authenticate(&self.prompt).await);
        }
        while !self.is_finished() {
            let next = match self.events.as_mut() {
                Some(events) => events.recv().await,
                None => None,
            };
            match next {
                Some(event) => self.on_biometric_event(event),
                None => self.finish(Access::Denied(ProtectionError::UserCancelled)),
            }
        }
        self.events = None;
        &self.state
    }

    /// Close the prompt without a decision.
    pub fn dismiss(&mut self) {
        if !self.is_finished() {
            self.finish(Access::Denied(ProtectionError::UserCancelled));
        }
    }

    fn finish(&mut self, access: Access) {
        match &access {
            Access::Granted => {
                info!(session = %self.id, path = %self.path, "access granted");
                self.state = GateState::Granted;
            }
            Access::Denied(reason) => {
                warn!(session = %self.id, path = %self.path, %reason, "access denied");
                self.state = GateState::Denied(reason.clone());
            }
        }
        self.events = None;
        if let Some(callback) = self.callback.take() {
            callback(access);
        }
    }
}

impl Drop for GateSession {
    fn drop(&mut self) {
        self.dismiss();
    }
}
