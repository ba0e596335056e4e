//! HMR coordinator configuration
//!
//! All fields have defaults matching the dev server's wire protocol, so an
//! empty JSON object (or no file at all) yields a working configuration.
//!
//! ```json
//! {
//!   "max_pending": 256,
//!   "ids": { "prefix": "/@id/", "null_byte_placeholder": "__x00__" }
//! }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default prefix the dev server puts in front of ids that are not valid URLs
pub const DEFAULT_ID_PREFIX: &str = "/@id/";

/// Default placeholder the dev server uses for `\0` in virtual module ids
pub const DEFAULT_NULL_BYTE_PLACEHOLDER: &str = "__x00__";

/// How wire-level module ids map onto module cache ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdConfig {
    /// Prefix stripped from wire ids
    pub prefix: String,
    /// Placeholder restored to a null byte after stripping
    pub null_byte_placeholder: String,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_ID_PREFIX.to_string(),
            null_byte_placeholder: DEFAULT_NULL_BYTE_PLACEHOLDER.to_string(),
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmrConfig {
    /// Maximum payloads waiting in the queue (None = unlimited)
    pub max_pending: Option<usize>,
    /// Module id normalization
    pub ids: IdConfig,
}

impl HmrConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the number of pending payloads
    pub fn with_max_pending(mut self, limit: usize) -> Self {
        self.max_pending = Some(limit);
        self
    }

    /// Parse configuration from a JSON string
    pub fn from_json(text: &str) -> Result<Self> {
        let config: HmrConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Reject values the queue cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.max_pending == Some(0) {
            return Err(Error::Config(
                "max_pending must be at least 1 (omit it for an unbounded queue)".to_string(),
            ));
        }
        if self.ids.prefix.is_empty() {
            return Err(Error::Config("ids.prefix must not be empty".to_string()));
        }
        Ok(())
    }
}
