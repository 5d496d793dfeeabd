//! Choosing and committing the protection mechanism.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::biometric::{
    BiometricEvent, BiometricPrompt, BiometricService, DeviceLock, Notice, Notifier,
};
use crate::config::Config;
use crate::error::{ProtectionError, Result};
use crate::settings::Mechanism;

pub type SetupCallback = Box<dyn FnOnce(bool) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    ChoosingMechanism,
    ConfirmingPin,
    AwaitingBiometric,
    Done(bool),
}

#[derive(Clone)]
pub struct ProtectionSetupFlow {
    config: Config,
    device: Arc<dyn DeviceLock>,
    biometrics: Arc<dyn BiometricService>,
    notifier: Arc<dyn Notifier>,
    prompt: BiometricPrompt,
}

impl ProtectionSetupFlow {
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

    /// Open the setup dialog with the stored mechanism preselected.
    pub fn start(&self, on_result: impl FnOnce(bool) + Send + 'static) -> SetupSession {
        let selected = self.config.mechanism();
        SetupSession {
            flow: self.clone(),
            selected,
            state: state_for(selected),
            callback: Some(Box::new(on_result)),
            events: None,
        }
    }
}

fn state_for(mechanism: Mechanism) -> SetupState {
    match mechanism {
        Mechanism::Pin => SetupState::ConfirmingPin,
        Mechanism::Biometric => SetupState::ChoosingMechanism,
    }
}

/// An open setup dialog. Nothing is persisted until the chosen mechanism
/// has been verified; dropping an open session reports failure.
pub struct SetupSession {
    flow: ProtectionSetupFlow,
    selected: Mechanism,
    state: SetupState,
    callback: Option<SetupCallback>,
    events: Option<mpsc::Receiver<BiometricEvent>>,
}

impl std::fmt::Debug for SetupSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupSession")
            .field("selected", &self.selected)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SetupSession {
    pub fn selected(&self) -> Mechanism {
        self.selected
    }

    pub fn state(&self) -> SetupState {
        self.state
    }

    pub fn pin_fields_visible(&self) -> bool {
        self.selected == Mechanism::Pin
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, SetupState::Done(_))
    }

    pub fn outcome(&self) -> Option<bool> {
        match self.state {
            SetupState::Done(success) => Some(success),
            _ => None,
        }
    }

    pub fn select(&mut self, mechanism: Mechanism) -> Result<()> {
        match self.state {
            SetupState::ChoosingMechanism | SetupState::ConfirmingPin => {
                self.selected = mechanism;
                self.state = state_for(mechanism);
                Ok(())
            }
            _ => Err(ProtectionError::InvalidState(
                "mechanism can only change while the dialog is idle".to_string(),
            )),
        }
    }

    /// Press OK. For PIN this settles immediately; for biometrics it starts
    /// a challenge that [`resolve_biometric`](Self::resolve_biometric) drives.
    pub fn confirm(&mut self, pin: &str, confirm_pin: &str) -> Result<()> {
        match self.state {
            SetupState::ConfirmingPin => self.confirm_pin(pin, confirm_pin),
            SetupState::ChoosingMechanism => self.confirm_biometric(),
            _ => Err(ProtectionError::InvalidState(
                "setup is not waiting for confirmation".to_string(),
            )),
        }
    }

    /// Confirm and, for biometrics, wait for the challenge to settle.
    pub async fn submit(&mut self, pin: &str, confirm_pin: &str) -> Result<()> {
        self.confirm(pin, confirm_pin)?;
        if self.state == SetupState::AwaitingBiometric {
            self.resolve_biometric().await?;
        }
        Ok(())
    }

    fn confirm_pin(&mut self, pin: &str, confirm_pin: &str) -> Result<()> {
        if pin != confirm_pin {
            self.flow.notifier.notify(Notice::PinMismatch);
            return Err(ProtectionError::PinMismatchOnSetup);
        }
        if pin.is_empty() {
            warn!("empty PIN saved, protected items stay locked");
            self.flow.notifier.notify(Notice::NoVerificationMethod);
        }
        self.flow.config.set_protection_pin(pin);
        self.flow.config.set_mechanism(Mechanism::Pin);
        self.finish(true);
        Ok(())
    }

    fn confirm_biometric(&mut self) -> Result<()> {
        if !self.flow.device.is_device_secure() {
            self.flow.notifier.notify(Notice::NoVerificationMethod);
            return Err(ProtectionError::NoSecureLockConfigured);
        }
        if !self.flow.biometrics.is_available() {
            debug!("no biometric prompt on this platform, accepting lock screen");
            self.flow.config.set_mechanism(Mechanism::Biometric);
            self.finish(true);
            return Ok(());
        }
        self.state = SetupState::AwaitingBiometric;
        Ok(())
    }

    /// Apply one challenge event. Errors put the dialog back in its idle
    /// state and are returned to the caller.
    pub fn on_biometric_event(&mut self, event: BiometricEvent) -> Result<()> {
        if self.state != SetupState::AwaitingBiometric {
            debug!(?event, "biometric event outside challenge ignored");
            return Ok(());
        }
        match event {
            BiometricEvent::Success => {
                self.flow.config.set_mechanism(Mechanism::Biometric);
                self.flow.notifier.notify(Notice::BiometricSetupSucceeded);
                self.finish(true);
                Ok(())
            }
            BiometricEvent::Error { code, message } => {
                self.flow
                    .notifier
                    .notify(Notice::BiometricError(message.clone()));
                self.state = SetupState::ChoosingMechanism;
                self.events = None;
                Err(ProtectionError::BiometricError { code, message })
            }
            BiometricEvent::FailedAttempt => {
                self.flow.notifier.notify(Notice::AuthenticationFailed);
                Ok(())
            }
        }
    }

    pub async fn resolve_biometric(&mut self) -> Result<()> {
        if self.state != SetupState::AwaitingBiometric {
            return Ok(());
        }
        if self.events.is_none() {
            self.events = Some(self.flow.biometrics.authenticate(&self.flow.prompt).await);
        }
        while self.state == SetupState::AwaitingBiometric {
            let next = match self.events.as_mut() {
                Some(events) => events.recv().await,
                None => None,
            };
            match next {
                Some(event) => self.on_biometric_event(event)?,
                None => {
                    self.state = SetupState::ChoosingMechanism;
                    self.events = None;
                    return Err(ProtectionError::UserCancelled);
                }
            }
        }
        Ok(())
    }

    /// Close the dialog without committing anything.
    pub fn dismiss(&mut self) {
        if !self.is_done() {
            debug!("setup dismissed");
            self.finish(false);
        }
    }

    fn finish(&mut self, success: bool) {
        self.state = SetupState::Done(success);
        self.events = None;
        if success {
            info!(mechanism = self.selected.as_str(), "protection mechanism configured");
        }
        if let Some(callback) = self.callback.take() {
            callback(success);
        }
    }
}

impl Drop for SetupSession {
    fn drop(&mut self) {
        self.dismiss();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometric::{NoBiometrics, RecordingNotifier, ScriptedBiometrics, StaticDeviceLock};
    use crate::prefs::MemoryPreferences;
    use parking_lot::Mutex;
    use std::path::PathBuf;

    fn flow(
        secure: bool,
        biometrics: Arc<dyn BiometricService>,
    ) -> (ProtectionSetupFlow, Config, Arc<RecordingNotifier>) {
        let config = Config::with_default_home(
            Arc::new(MemoryPreferences::new()),
            PathBuf::from("/home"),
        );
        let notifier = Arc::new(RecordingNotifier::new());
        let flow = ProtectionSetupFlow::new(
            config.clone(),
            Arc::new(StaticDeviceLock(secure)),
            biometrics,
            notifier.clone(),
        );
        (flow, config, notifier)
    }

    fn recorder() -> (Arc<Mutex<Vec<bool>>>, impl FnOnce(bool) + Send + 'static) {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        (results, move |ok| sink.lock().push(ok))
    }

    #[test]
    fn entry_preselects_stored_mechanism() {
        let (flow, config, _) = flow(true, Arc::new(NoBiometrics));
        let session = flow.start(|_| {});
        assert_eq!(session.selected(), Mechanism::Biometric);
        assert!(!session.pin_fields_visible());
        drop(session);

        config.set_mechanism(Mechanism::Pin);
        let session = flow.start(|_| {});
        assert_eq!(session.state(), SetupState::ConfirmingPin);
        assert!(session.pin_fields_visible());
    }

    #[test]
    fn short_pin_is_accepted() {
        let (flow, config, _) = flow(true, Arc::new(NoBiometrics));
        let (results, cb) = recorder();
        let mut session = flow.start(cb);
        session.select(Mechanism::Pin).unwrap();
        session.confirm("ab", "ab").unwrap();
        assert_eq!(session.outcome(), Some(true));
        assert_eq!(config.protection_pin(), "ab");
        assert_eq!(config.mechanism(), Mechanism::Pin);
        assert_eq!(*results.lock(), vec![true]);
    }

    #[test]
    fn empty_pin_is_saved_with_warning() {
        let (flow, config, notifier) = flow(true, Arc::new(NoBiometrics));
        let (results, cb) = recorder();
        let mut session = flow.start(cb);
        session.select(Mechanism::Pin).unwrap();
        session.confirm("", "").unwrap();
        assert_eq!(*results.lock(), vec![true]);
        assert_eq!(config.mechanism(), Mechanism::Pin);
        assert_eq!(config.protection_pin(), "");
        assert_eq!(notifier.notices(), vec![Notice::NoVerificationMethod]);
    }

    #[test]
    fn mismatched_pin_keeps_dialog_open() {
        let (flow, config, notifier) = flow(true, Arc::new(NoBiometrics));
        let (results, cb) = recorder();
        let mut session = flow.start(cb);
        session.select(Mechanism::Pin).unwrap();
        assert_eq!(
            session.confirm("ab", "ba"),
            Err(ProtectionError::PinMismatchOnSetup)
        );
        assert_eq!(session.state(), SetupState::ConfirmingPin);
        assert_eq!(config.protection_pin(), "");
        assert_eq!(config.mechanism(), Mechanism::Biometric);
        assert!(results.lock().is_empty());
        assert_eq!(notifier.notices(), vec![Notice::PinMismatch]);

        session.confirm("AB", "AB").unwrap();
        assert_eq!(config.protection_pin(), "AB");
    }

    #[test]
    fn biometric_requires_secure_lock() {
        let (flow, config, notifier) = flow(false, Arc::new(ScriptedBiometrics::new(vec![])));
        let mut session = flow.start(|_| {});
        config.set_mechanism(Mechanism::Pin);
        assert_eq!(
            session.confirm("", ""),
            Err(ProtectionError::NoSecureLockConfigured)
        );
        assert_eq!(session.state(), SetupState::ChoosingMechanism);
        assert_eq!(config.mechanism(), Mechanism::Pin);
        assert_eq!(notifier.notices(), vec![Notice::NoVerificationMethod]);
    }

    #[test]
    fn legacy_platform_accepts_lock_screen() {
        let (flow, config, _) = flow(true, Arc::new(NoBiometrics));
        config.set_mechanism(Mechanism::Pin);
        let mut session = flow.start(|_| {});
        session.select(Mechanism::Biometric).unwrap();
        session.confirm("", "").unwrap();
        assert_eq!(session.outcome(), Some(true));
        assert_eq!(config.mechanism(), Mechanism::Biometric);
    }

    #[test]
    fn dismiss_reports_failure_once() {
        let (flow, _, _) = flow(true, Arc::new(NoBiometrics));
        let (results, cb) = recorder();
        let mut session = flow.start(cb);
        session.dismiss();
        session.dismiss();
        drop(session);
        assert_eq!(*results.lock(), vec![false]);
    }

    #[tokio::test]
    async fn biometric_error_then_retry_succeeds() {
        let service = Arc::new(ScriptedBiometrics::new(vec![BiometricEvent::Error {
            code: 10,
            message: "Canceled by user".into(),
        }]));
        let (flow, config, notifier) = flow(true, service.clone());
        config.set_mechanism(Mechanism::Pin);
        let (results, cb) = recorder();
        let mut session = flow.start(cb);
        session.select(Mechanism::Biometric).unwrap();

        let err = session.submit("", "").await.unwrap_err();
        assert_eq!(
            err,
            ProtectionError::BiometricError {
                code: 10,
                message: "Canceled by user".into()
            }
        );
        assert_eq!(session.state(), SetupState::ChoosingMechanism);
        assert_eq!(config.mechanism(), Mechanism::Pin);
        assert!(results.lock().is_empty());

        service.set_script(vec![BiometricEvent::FailedAttempt, BiometricEvent::Success]);
        session.submit("", "").await.unwrap();
        assert_eq!(session.outcome(), Some(true));
        assert_eq!(config.mechanism(), Mechanism::Biometric);
        assert_eq!(*results.lock(), vec![true]);
        assert_eq!(service.challenges().len(), 2);
        assert_eq!(
            notifier.notices(),
            vec![
                Notice::BiometricError("Canceled by user".into()),
                Notice::AuthenticationFailed,
                Notice::BiometricSetupSucceeded,
            ]
        );
    }
}
