//! End-to-end tests for item protection backed by an on-disk preference file.
//!
//! Tests cover:
//!  1. PIN setup persists and gates a protected item after reopening
//!  2. Global disable overrides the protected set
//!  3. Biometric setup followed by a biometric unlock
//!  4. Shake toggling of folder sorting through the file store

use std::path::PathBuf;
use std::sync::Arc;

use fileguard_core::biometric::{
    NoBiometrics, RecordingNotifier, ScriptedBiometrics, StaticDeviceLock,
};
use fileguard_core::settings::SORT_DESCENDING;
use fileguard_core::{
    Access, BiometricEvent, Config, FilePreferences, GateState, Mechanism, ProtectionError,
    ProtectionGate, ProtectionSetupFlow, ShakeDetector, ShakeSortToggle, Verification,
};
use parking_lot::Mutex;
use tempfile::tempdir;

fn open_config(path: &std::path::Path) -> Config {
    let prefs = FilePreferences::open(path).unwrap();
    Config::with_default_home(Arc::new(prefs), PathBuf::from("/"))
}

// ─── Test 1: PIN setup survives a restart ───────────────────────────────────

#[test]
fn test_pin_setup_then_gate_after_reopen() {
    let dir = tempdir().unwrap();
    let prefs_path = dir.path().join("preferences.json");
    let notifier = Arc::new(RecordingNotifier::new());

    {
        let config = open_config(&prefs_path);
        let flow = ProtectionSetupFlow::new(
            config.clone(),
            Arc::new(StaticDeviceLock(false)),
            Arc::new(NoBiometrics),
            notifier.clone(),
        );
        let mut session = flow.start(|_| {});
        session.select(Mechanism::Pin).unwrap();
        session.confirm("1234", "1234").unwrap();
        config.add_protected("/storage/emulated/0/Secret");
    }

    let config = open_config(&prefs_path);
    assert_eq!(config.mechanism(), Mechanism::Pin);
    assert!(config.is_protected("/storage/emulated/0/Secret"));

    let gate = ProtectionGate::new(
        config,
        Arc::new(StaticDeviceLock(false)),
        Arc::new(NoBiometrics),
        notifier.clone(),
    );
    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = results.clone();
    let mut session = gate.access("/storage/emulated/0/Secret", move |a| sink.lock().push(a));
    assert_eq!(session.state(), &GateState::Evaluating(Verification::Pin));
    assert_eq!(session.submit_pin("0000"), Err(ProtectionError::WrongPin));
    assert_eq!(session.submit_pin("4321"), Err(ProtectionError::WrongPin));
    assert!(results.lock().is_empty());
    session.submit_pin("1234").unwrap();
    assert_eq!(*results.lock(), vec![Access::Granted]);
}

// ─── Test 2: Global disable ─────────────────────────────────────────────────

#[test]
fn test_disabled_protection_grants_protected_items() {
    let dir = tempdir().unwrap();
    let config = open_config(&dir.path().join("preferences.json"));
    config.set_mechanism(Mechanism::Pin);
    config.set_protection_pin("1234");
    config.add_protected("/a");
    config.set_protection_enabled(false);

    let gate = ProtectionGate::new(
        config,
        Arc::new(StaticDeviceLock(true)),
        Arc::new(NoBiometrics),
        Arc::new(RecordingNotifier::new()),
    );
    for path in ["/a", "/b", ""] {
        let session = gate.evaluate(path, |access| assert!(access.is_granted()));
        assert_eq!(session.state(), &GateState::Granted);
    }
}

// ─── Test 3: Biometric setup then unlock ────────────────────────────────────

#[tokio::test]
async fn test_biometric_setup_then_unlock() {
    let dir = tempdir().unwrap();
    let config = open_config(&dir.path().join("preferences.json"));
    config.set_mechanism(Mechanism::Pin);
    let service = Arc::new(ScriptedBiometrics::new(vec![BiometricEvent::Success]));
    let notifier = Arc::new(RecordingNotifier::new());
    let device = Arc::new(StaticDeviceLock(true));

    let flow = ProtectionSetupFlow::new(
        config.clone(),
        device.clone(),
        service.clone(),
        notifier.clone(),
    );
    let mut setup = flow.start(|ok| assert!(ok));
    setup.select(Mechanism::Biometric).unwrap();
    setup.submit("", "").await.unwrap();
    assert_eq!(config.mechanism(), Mechanism::Biometric);

    let gate = ProtectionGate::new(config, device, service.clone(), notifier);
    let mut session = gate.evaluate("/photos", |_| {});
    assert_eq!(session.resolve_biometric().await, &GateState::Granted);
    assert_eq!(service.challenges().len(), 2);
}

// ─── Test 4: Shake toggles sorting ──────────────────────────────────────────

#[test]
fn test_shake_toggles_sorting_in_file_store() {
    let dir = tempdir().unwrap();
    let prefs_path = dir.path().join("preferences.json");
    let config = open_config(&prefs_path);
    let mut detector =
        ShakeDetector::with_listener(ShakeSortToggle::new(config.clone(), "/Download"));

    let strong = 30.0_f32;
    let t0 = 1_700_000_000_000_i64;
    for i in 0..3 {
        detector.on_sample(strong, 0.0, 0.0, t0 + i * 550);
    }

    let reopened = open_config(&prefs_path);
    assert_ne!(reopened.folder_sorting("/Download") & SORT_DESCENDING, 0);
}
