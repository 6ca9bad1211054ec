//! Redaction of sensitive values in workflow definitions.
//!
//! Workflow definitions nest connection parameters inside action inputs at
//! arbitrary depth, so masking walks the whole JSON tree rather than looking
//! at known locations.

use serde_json::{Map, Value};
use std::collections::HashSet;

/// Marker that replaces every redacted value.
pub const REDACTED: &str = "***REDACTED***";

/// Replaces the values of sensitive keys anywhere in a JSON document.
///
/// Keys are matched ASCII case-insensitively. A matched value is replaced
/// whole, whatever its type, and is not descended into.
///
/// # Example
///
/// ```
/// use logicapps_backup::masker::{SecretMasker, REDACTED};
/// use serde_json::json;
///
/// let masker = SecretMasker::default();
/// let doc = json!({"actions": {"call": {"inputs": {"headers": {"API-Key": "s3cret"}}}}});
///
/// let masked = masker.mask(&doc);
/// assert_eq!(masked.value["actions"]["call"]["inputs"]["headers"]["API-Key"], REDACTED);
/// assert_eq!(masked.redactions, 1);
/// ```
#[derive(Debug, Clone)]
pub struct SecretMasker {
    keys: HashSet<String>,
}

/// A masked copy of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Masked {
    /// The redacted document
    pub value: Value,
    /// Number of values replaced
    pub redactions: usize,
}

impl SecretMasker {
    /// Creates a masker for the given key names.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|k| k.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Returns true if `key` names a sensitive value.
    pub fn is_sensitive(&self, key: &str) -> bool {
        self.keys.contains(&key.to_ascii_lowercase())
    }

    /// Returns a masked copy of `doc`; `doc` itself is left untouched.
    pub fn mask(&self, doc: &Value) -> Masked {
        let mut value = doc.clone();
        let redactions = self.mask_in_place(&mut value);
        Masked { value, redactions }
    }

    /// Masks `doc` in place and returns the number of replaced values.
    pub fn mask_in_place(&self, doc: &mut Value) -> usize {
        match doc {
            Value::Object(map) => self.mask_object(map),
            Value::Array(items) => items.iter_mut().map(|v| self.mask_in_place(v)).sum(),
            _ => 0,
        }
    }

    fn mask_object(&self, map: &mut Map<String, Value>) -> usize {
        let mut count = 0;
        for (key, value) in map.iter_mut() {
            if self.is_sensitive(key) {
                *value = Value::String(REDACTED.to_string());
                count += 1;
            } else {
                count += self.mask_in_place(value);
            }
        }
        count
    }
}

impl Default for SecretMasker {
    fn default() -> Self {
        Self::new(["api-key"])
    }
}
