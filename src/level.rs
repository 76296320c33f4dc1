//! Syslog severity levels and the name/number lookup tables used by GELF.
//!
//! [`SeverityTable`] is immutable and built once; [`SeverityRegistry`] layers
//! explicitly registered custom names over it for callers that need them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::GelfError;

/// Syslog severity, ordered from most to least severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum GelfLevel {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl GelfLevel {
    /// All levels in code order.
    pub const ALL: [GelfLevel; 8] = [
        GelfLevel::Emergency,
        GelfLevel::Alert,
        GelfLevel::Critical,
        GelfLevel::Error,
        GelfLevel::Warning,
        GelfLevel::Notice,
        GelfLevel::Info,
        GelfLevel::Debug,
    ];

    /// Numeric syslog code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Canonical upper-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            GelfLevel::Emergency => "EMERGENCY",
            GelfLevel::Alert => "ALERT",
            GelfLevel::Critical => "CRITICAL",
            GelfLevel::Error => "ERROR",
            GelfLevel::Warning => "WARNING",
            GelfLevel::Notice => "NOTICE",
            GelfLevel::Info => "INFO",
            GelfLevel::Debug => "DEBUG",
        }
    }

    /// Look up a level by numeric code.
    pub fn from_code(code: u8) -> Result<Self, GelfError> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or_else(|| GelfError::UnknownLevel(code.to_string()))
    }
}

impl Default for GelfLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl fmt::Display for GelfLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GelfLevel {
    type Err = GelfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SeverityTable::standard().level_for(s)
    }
}

const STANDARD_NAMES: &[(&str, GelfLevel)] = &[
    ("emergency", GelfLevel::Emergency),
    ("emerg", GelfLevel::Emergency),
    ("panic", GelfLevel::Emergency),
    ("alert", GelfLevel::Alert),
    ("critical", GelfLevel::Critical),
    ("crit", GelfLevel::Critical),
    ("fatal", GelfLevel::Critical),
    ("error", GelfLevel::Error),
    ("err", GelfLevel::Error),
    ("warning", GelfLevel::Warning),
    ("warn", GelfLevel::Warning),
    ("notice", GelfLevel::Notice),
    ("info", GelfLevel::Info),
    ("debug", GelfLevel::Debug),
    ("trace", GelfLevel::Debug),
];

static STANDARD_TABLE: Lazy<SeverityTable> = Lazy::new(|| {
    SeverityTable {
        by_name: STANDARD_NAMES
            .iter()
            .map(|(name, level)| ((*name).to_owned(), *level))
            .collect(),
    }
});

/// Immutable bidirectional mapping between severity names and codes.
///
/// Name lookups are case-insensitive and accept the usual syslog aliases
/// (`emerg`, `crit`, `err`, `warn`, ...). Code lookups return the canonical
/// name, so `name -> code -> name` is stable for the eight canonical names.
#[derive(Debug)]
pub struct SeverityTable {
    by_name: HashMap<String, GelfLevel>,
}

impl SeverityTable {
    /// The shared standard table.
    pub fn standard() -> &'static SeverityTable {
        &STANDARD_TABLE
    }

    /// Resolve a name to its level.
    pub fn level_for(&self, name: &str) -> Result<GelfLevel, GelfError> {
        self.by_name
            .get(name.trim().to_ascii_lowercase().as_str())
            .copied()
            .ok_or_else(|| GelfError::UnknownLevel(name.to_owned()))
    }

    /// Resolve a name to its numeric code.
    pub fn code_for(&self, name: &str) -> Result<u8, GelfError> {
        self.level_for(name).map(GelfLevel::code)
    }

    /// Resolve a numeric code to the canonical name.
    pub fn name_for(&self, code: u8) -> Result<&'static str, GelfError> {
        GelfLevel::from_code(code).map(GelfLevel::as_str)
    }
}

/// Severity lookups with optional caller-registered names.
///
/// Custom names never shadow the standard ones and must map to one of the
/// eight syslog codes. Registration is safe from any thread.
#[derive(Debug, Default)]
pub struct SeverityRegistry {
    custom: RwLock<HashMap<String, GelfLevel>>,
}

impl SeverityRegistry {
    /// Create a registry holding only the standard names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` as an alias for `code`.
    ///
    /// Re-registering an existing custom name replaces its code. Attempts to
    /// redefine a standard name are rejected.
    pub fn register(&self, name: &str, code: u8) -> Result<(), GelfError> {
        let level = GelfLevel::from_code(code)?;
        let key = name.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(GelfError::UnknownLevel(name.to_owned()));
        }
        if let Ok(existing) = SeverityTable::standard().level_for(&key) {
            if existing == level {
                return Ok(());
            }
            return Err(GelfError::UnknownLevel(format!(
                "{name} is a standard level ({existing}) and cannot be remapped"
            )));
        }
        self.custom.write().insert(key, level);
        Ok(())
    }

    /// Resolve a name, checking the standard table first.
    pub fn level_for(&self, name: &str) -> Result<GelfLevel, GelfError> {
        SeverityTable::standard().level_for(name).or_else(|err| {
            self.custom
                .read()
                .get(name.trim().to_ascii_lowercase().as_str())
                .copied()
                .ok_or(err)
        })
    }

    /// Resolve a name to its numeric code.
    pub fn code_for(&self, name: &str) -> Result<u8, GelfError> {
        self.level_for(name).map(GelfLevel::code)
    }

    /// Resolve a numeric code to the canonical name.
    pub fn name_for(&self, code: u8) -> Result<&'static str, GelfError> {
        SeverityTable::standard().name_for(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    fn canonical_names_form_a_bijection() {
        let table = SeverityTable::standard();
        for (expected, level) in GelfLevel::ALL.iter().enumerate() {
            let code = table.code_for(level.as_str()).expect("canonical name");
            assert_eq!(usize::from(code), expected);
            assert_eq!(table.name_for(code).expect("valid code"), level.as_str());
        }
    }

    #[rstest]
    #[case("EMERG", 0)]
    #[case("panic", 0)]
    #[case("Crit", 2)]
    #[case("err", 3)]
    #[case("warn", 4)]
    #[case(" info ", 6)]
    #[case("TRACE", 7)]
    fn aliases_resolve_case_insensitively(#[case] name: &str, #[case] code: u8) {
        assert_eq!(SeverityTable::standard().code_for(name).unwrap(), code);
    }

    #[rstest]
    fn unknown_names_and_codes_fail() {
        let table = SeverityTable::standard();
        assert!(matches!(
            table.code_for("loud"),
            Err(GelfError::UnknownLevel(name)) if name == "loud"
        ));
        assert!(matches!(table.name_for(8), Err(GelfError::UnknownLevel(_))));
    }

    #[rstest]
    fn registry_accepts_custom_aliases() {
        let registry = SeverityRegistry::new();
        registry.register("audit", 5).expect("register alias");
        assert_eq!(registry.code_for("AUDIT").unwrap(), 5);
        assert_eq!(registry.name_for(5).unwrap(), "NOTICE");
        assert!(SeverityTable::standard().code_for("audit").is_err());
    }

    #[rstest]
    fn registry_rejects_remapping_standard_names() {
        let registry = SeverityRegistry::new();
        assert!(registry.register("error", 3).is_ok());
        assert!(registry.register("error", 6).is_err());
        assert!(registry.register("custom", 9).is_err());
    }

    proptest! {
        #[test]
        fn code_name_code_round_trips(code in 0u8..8) {
            let table = SeverityTable::standard();
            let name = table.name_for(code).unwrap();
            prop_assert_eq!(table.code_for(name).unwrap(), code);
        }

        #[test]
        fn codes_above_seven_are_rejected(code in 8u8..=u8::MAX) {
            prop_assert!(GelfLevel::from_code(code).is_err());
        }
    }
}
