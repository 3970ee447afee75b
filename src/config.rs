//! Recognized configuration keys.
//!
//! Configuration lives as rows in the task store (`ConfigEntry`); this
//! module defines the user-tunable keys, their defaults and validation.
//! `system = true` rows (schema version, crypto check) bypass the key
//! table.

use crate::error::{Error, Result};

/// Description of a user-tunable configuration key.
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey {
    pub name: &'static str,
    pub default: &'static str,
    pub desc: &'static str,
    kind: ValueKind,
}

#[derive(Debug, Clone, Copy)]
enum ValueKind {
    /// Any string; command templates with `{ID} {TITLE} {PROJECT} {DATE}`
    /// placeholders.
    Text,
    /// Non-negative integer.
    NonNegativeInt,
    /// 0 or 1.
    Bool01,
}

/// The recognized user-tunable keys.
pub const KEYS: &[ConfigKey] = &[
    ConfigKey {
        name: "ALARM_DELAY",
        default: "8",
        desc: "Hours before due date to fire the 'due soon' alarm",
        kind: ValueKind::NonNegativeInt,
    },
    ConfigKey {
        name: "ALARM_SUSPEND",
        default: "1",
        desc: "Hours between consecutive alarms for the same task",
        kind: ValueKind::NonNegativeInt,
    },
    ConfigKey {
        name: "PURGE_DELAY",
        default: "90",
        desc: "Days after which done tasks are eligible for purge",
        kind: ValueKind::NonNegativeInt,
    },
    ConfigKey {
        name: "ALARM_DELAY_CMD",
        default: "",
        desc: "Command run when a task is due soon ({ID} {TITLE} {PROJECT} {DATE})",
        kind: ValueKind::Text,
    },
    ConfigKey {
        name: "ALARM_DUE_CMD",
        default: "",
        desc: "Command run when a task is due ({ID} {TITLE} {PROJECT} {DATE})",
        kind: ValueKind::Text,
    },
    ConfigKey {
        name: "PASSPHRASE_CACHE",
        default: "1",
        desc: "Keep the crypto passphrase in memory for the session (0/1)",
        kind: ValueKind::Bool01,
    },
];

/// Look up a recognized key.
pub fn key(name: &str) -> Option<&'static ConfigKey> {
    KEYS.iter().find(|key| key.name == name)
}

/// Validate a value for a recognized key. Unknown keys and malformed
/// values are user errors.
pub fn validate(name: &str, value: &str) -> Result<()> {
    let Some(key) = key(name) else {
        return Err(Error::UserInput(format!("unknown configuration key '{name}'")));
    };

    match key.kind {
        ValueKind::Text => Ok(()),
        ValueKind::NonNegativeInt => {
            value.parse::<u64>().map(|_| ()).map_err(|_| {
                Error::UserInput(format!(
                    "{name} must be a non-negative integer, got '{value}'"
                ))
            })
        }
        ValueKind::Bool01 => match value {
            "0" | "1" => Ok(()),
            _ => Err(Error::UserInput(format!("{name} must be 0 or 1, got '{value}'"))),
        },
    }
}
