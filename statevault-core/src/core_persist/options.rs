//! Per-store persistence options and the derived field policy

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Bookkeeping properties that are never persisted, on top of whatever the
/// caller excludes
pub const NOT_PERSISTED_PROPERTIES: &[&str] = &[
    "excluded_keys",
    "is_encrypted",
    "is_loading",
    "version",
    "watch_mutation",
];

/// Properties whose name starts with one of these are private by convention
/// and never persisted
pub(crate) const DENIED_FIRST_CHARS: &[char] = &['_', '$'];

/// Loading flag maintained by the orchestrator inside live state
pub(crate) const IS_LOADING_KEY: &str = "is_loading";

/// Options recognized when attaching a store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistOptions {
    /// Override the default storage identifier for this store
    pub db_name: Option<String>,
    /// Caller-supplied exclusions, merged with [`NOT_PERSISTED_PROPERTIES`]
    pub excluded_keys: Vec<String>,
    /// Whether the persisted snapshot is currently encrypted; maintained by
    /// the orchestrator afterwards
    pub is_encrypted: bool,
    /// Enable persistence at all
    pub persist: bool,
    /// Field names encrypted before persistence
    pub persisted_properties_to_encrypt: Vec<String>,
    /// Persist automatically on every qualifying mutation
    pub watch_mutation: bool,
}

/// Persistence treatment of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Never persisted
    Skip,
    /// Persisted as-is
    Plain,
    /// Persisted as ciphertext
    Encrypted,
}

/// Field-name to policy mapping, built once at configuration time
#[derive(Debug, Clone)]
pub struct PersistencePolicy {
    excluded: HashSet<String>,
    encrypted: HashSet<String>,
}

impl PersistencePolicy {
    pub fn from_options(options: &PersistOptions) -> Self {
        let excluded = NOT_PERSISTED_PROPERTIES
            .iter()
            .map(|k| k.to_string())
            .chain(options.excluded_keys.iter().cloned())
            .collect();
        let encrypted = options
            .persisted_properties_to_encrypt
            .iter()
            .cloned()
            .collect();

        Self {
            excluded,
            encrypted,
        }
    }

    /// Policy for a live-state key
    pub fn field_policy(&self, key: &str) -> FieldPolicy {
        if key.starts_with(DENIED_FIRST_CHARS) || self.excluded.contains(key) {
            FieldPolicy::Skip
        } else if self.encrypted.contains(key) {
            FieldPolicy::Encrypted
        } else {
            FieldPolicy::Plain
        }
    }

    /// Field names designated for encryption
    pub fn encrypted_fields(&self) -> impl Iterator<Item = &String> {
        self.encrypted.iter()
    }

    /// Whether any field is designated for encryption
    pub fn wants_encryption(&self) -> bool {
        !self.encrypted.is_empty()
    }
}

/// Empty values are omitted from persisted snapshots entirely
pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deny_list_is_skipped() {
        let policy = PersistencePolicy::from_options(&PersistOptions::default());
        for key in NOT_PERSISTED_PROPERTIES {
            assert_eq!(policy.field_policy(key), FieldPolicy::Skip);
        }
    }

    #[test]
    fn test_denied_prefix_is_skipped() {
        let policy = PersistencePolicy::from_options(&PersistOptions::default());
        assert_eq!(policy.field_policy("_internal"), FieldPolicy::Skip);
        assert_eq!(policy.field_policy("$subscription"), FieldPolicy::Skip);
        assert_eq!(policy.field_policy("public"), FieldPolicy::Plain);
    }

    #[test]
    fn test_caller_exclusions_and_encryption_selection() {
        let options = PersistOptions {
            excluded_keys: vec!["transient".to_string()],
            persisted_properties_to_encrypt: vec!["secret".to_string()],
            ..Default::default()
        };
        let policy = PersistencePolicy::from_options(&options);

        assert_eq!(policy.field_policy("transient"), FieldPolicy::Skip);
        assert_eq!(policy.field_policy("secret"), FieldPolicy::Encrypted);
        assert_eq!(policy.field_policy("other"), FieldPolicy::Plain);
        assert!(policy.wants_encryption());
    }

    #[test]
    fn test_exclusion_wins_over_encryption_selection() {
        let options = PersistOptions {
            excluded_keys: vec!["secret".to_string()],
            persisted_properties_to_encrypt: vec!["secret".to_string()],
            ..Default::default()
        };
        let policy = PersistencePolicy::from_options(&options);
        assert_eq!(policy.field_policy("secret"), FieldPolicy::Skip);
    }

    #[test]
    fn test_empty_values() {
        assert!(is_empty_value(&json!(null)));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!([])));
        assert!(is_empty_value(&json!({})));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!(false)));
        assert!(!is_empty_value(&json!("x")));
    }
}
