//! Layered string configuration
//!
//! A run carries two layers: a *global* configuration assembled once at
//! startup and frozen, and a *local* configuration supplied per retrieval.
//! [`merge`] combines them into the effective configuration, local keys
//! shadowing global ones. Neither layer is ever mutated by a merge.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Well-known configuration keys
pub mod keys {
    /// Directory that relative source identifiers are resolved against
    pub const BASE_DIRECTORY: &str = "base-directory";
    /// File the JSON suite summary is written to
    pub const RESULT_OUTPUT_FILE: &str = "result-output-file";
    /// Directory holding the sample images produced by the system under test
    pub const SAMPLES_DIRECTORY: &str = "samples-directory";
    /// Directory holding the reference pattern images
    pub const PATTERNS_DIRECTORY: &str = "patterns-directory";
    /// Directory diff artifacts are persisted to
    pub const FILE_STORAGE_DIRECTORY: &str = "file-storage-directory";
    /// Flat directory of mask images
    pub const MASKS_DIRECTORY: &str = "masks-directory";
    /// Registered type name of the result listener
    pub const SUITE_LISTENER: &str = "suite-listener";
    /// Per-channel tolerance of the bundled comparator
    pub const PIXEL_TOLERANCE: &str = "pixel-tolerance";
    /// Allowed percentage of differing pixels
    pub const DIFF_THRESHOLD: &str = "diff-threshold";
    /// `abort` or `skip-invalid`
    pub const MASK_LOAD_POLICY: &str = "mask-load-policy";
    /// Fill colour of generated rasters whose identifier names none
    pub const GENERATED_FILL: &str = "generated-fill";
}

/// An ordered mapping from string keys to string values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    entries: BTreeMap<String, String>,
}

impl Configuration {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value, returning the one it replaced
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Parse a value with `FromStr`; absent keys are `Ok(None)`
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
                Error::InvalidConfig(format!("value '{}' for key '{}' cannot be parsed", raw, key))
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Effective configuration with `local` layered over `self`
    pub fn merged_with(&self, local: &Configuration) -> Configuration {
        merge(self, local)
    }

    /// Parse the `[properties]` table of a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("malformed configuration file: {}", e)))?;

        let mut config = Self::new();
        for (key, value) in file.properties {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Datetime(d) => d.to_string(),
                toml::Value::Array(_) | toml::Value::Table(_) => {
                    return Err(Error::InvalidConfig(format!(
                        "property '{}' must be a scalar value",
                        key
                    )));
                }
            };
            config.insert(key, value);
        }
        Ok(config)
    }

    /// Load configuration from file; a missing file yields an empty configuration
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config = Self::from_toml_str(&content)?;
            debug!("Loaded {} properties from {}", config.len(), path.display());
            Ok(config)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    properties: BTreeMap<String, toml::Value>,
}

/// Combine `global` defaults with call-scoped `local` overrides.
///
/// For every key present in either layer the local value wins. Both inputs
/// are left untouched.
pub fn merge(global: &Configuration, local: &Configuration) -> Configuration {
    let mut entries = global.entries.clone();
    for (key, value) in &local.entries {
        entries.insert(key.clone(), value.clone());
    }
    Configuration { entries }
}
