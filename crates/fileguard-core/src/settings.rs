use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const PROTECTION_PIN: i32 = 1;
pub const PROTECTION_BIOMETRIC: i32 = 2;

/// Bit flags stored under the sorting keys.
pub const SORT_BY_NAME: i32 = 1;
pub const SORT_BY_DATE_MODIFIED: i32 = 2;
pub const SORT_BY_SIZE: i32 = 4;
pub const SORT_BY_EXTENSION: i32 = 8;
pub const SORT_DESCENDING: i32 = 1024;

pub const VIEW_TYPE_GRID: i32 = 1;
pub const VIEW_TYPE_LIST: i32 = 2;

pub const TAB_RECENT_FILES: i32 = 1;
pub const TAB_FILES: i32 = 2;
pub const TAB_STORAGE_ANALYSIS: i32 = 4;
pub const ALL_TABS_MASK: i32 = TAB_RECENT_FILES | TAB_FILES | TAB_STORAGE_ANALYSIS;

/// How a protected item proves the user's identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mechanism {
    Pin,
    #[default]
    Biometric,
}

impl Mechanism {
    pub fn code(self) -> i32 {
        match self {
            Self::Pin => PROTECTION_PIN,
            Self::Biometric => PROTECTION_BIOMETRIC,
        }
    }

    /// Anything that is not the biometric code verifies by PIN.
    pub fn from_code(code: i32) -> Self {
        if code == PROTECTION_BIOMETRIC {
            Self::Biometric
        } else {
            Self::Pin
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pin => "pin",
            Self::Biometric => "biometric",
        }
    }
}

impl std::str::FromStr for Mechanism {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pin" => Ok(Self::Pin),
            "biometric" | "fingerprint" => Ok(Self::Biometric),
            other => Err(format!("unknown protection mechanism: {other}")),
        }
    }
}

/// Snapshot of everything protection-related in the preference store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtectionSettings {
    pub enabled: bool,
    pub mechanism: Mechanism,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub pin: String,
    #[serde(default)]
    pub protected_paths: BTreeSet<String>,
}

impl ProtectionSettings {
    pub fn has_pin(&self) -> bool {
        !self.pin.is_empty()
    }
}

impl Default for ProtectionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mechanism: Mechanism::Biometric,
            pin: String::new(),
            protected_paths: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_verify_by_pin() {
        assert_eq!(Mechanism::from_code(PROTECTION_BIOMETRIC), Mechanism::Biometric);
        assert_eq!(Mechanism::from_code(PROTECTION_PIN), Mechanism::Pin);
        assert_eq!(Mechanism::from_code(0), Mechanism::Pin);
    }

    #[test]
    fn pin_is_never_serialized() {
        let settings = ProtectionSettings {
            pin: "1234".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("1234"));
        assert!(json.contains("\"mechanism\":\"biometric\""));
    }
}
