use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Invalid metadata key '{0}': keys may only contain letters, digits, '_', '.' or '-'")]
    InvalidKey(String),
    #[error("Invalid value for metadata key '{key}': values must be non-empty and free of whitespace and '|'")]
    InvalidValue { key: String, value: String },
}

/// Ordered string key/value annotations attached to a structure record.
///
/// Keys and values are restricted so that they can be stored verbatim in both
/// the HLT remark block and the single-line archive score line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<String, String>);

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn valid_value(value: &str) -> bool {
    !value.is_empty() && !value.chars().any(|c| c.is_whitespace() || c == '|' || c == '=')
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl fmt::Display,
    ) -> Result<Option<String>, MetadataError> {
        let key = key.into();
        let value = value.to_string();
        if !valid_key(&key) {
            return Err(MetadataError::InvalidKey(key));
        }
        if !valid_value(&value) {
            return Err(MetadataError::InvalidValue { key, value });
        }
        Ok(self.0.insert(key, value))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copies every entry of `other` into `self`, overwriting existing keys.
    pub fn extend_from(&mut self, other: &Metadata) {
        for (k, v) in other.iter() {
            self.0.insert(k.to_string(), v.to_string());
        }
    }

    /// Renders the entries as `k=v|k=v` for the archive score line.
    pub fn to_score_string(&self) -> String {
        self.iter().map(|(k, v)| format!("{k}={v}")).join("|")
    }

    pub fn parse_score_string(s: &str) -> Result<Self, MetadataError> {
        let mut metadata = Metadata::new();
        for field in s.trim().split('|').filter(|f| !f.is_empty()) {
            let (key, value) = field.split_once('=').ok_or_else(|| MetadataError::InvalidValue {
                key: field.to_string(),
                value: String::new(),
            })?;
            metadata.insert(key, value)?;
        }
        Ok(metadata)
    }
}

impl<'a> IntoIterator for &'a Metadata {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
