//! HMR Payloads
//!
//! The messages a dev server pushes to a module runner. Each payload is a
//! JSON object tagged by its `type` field:
//!
//! ```text
//! { "type": "connected" }
//! { "type": "update", "updates": [{ "type": "js-update", "path": "/@id/a.js", "acceptedPath": "/@id/a.js" }] }
//! { "type": "custom", "event": "my:event", "data": { ... } }
//! { "type": "full-reload", "triggeredBy": "/src/a.js" }
//! { "type": "prune", "paths": ["/src/old.js"] }
//! { "type": "error", "err": { "message": "...", "stack": "..." } }
//! ```
//!
//! Paths on the wire are module ids, which may carry the dev server's
//! `/@id/` prefix. The module cache indexes by the unprefixed id, so every
//! path crosses [`unwrap_id`] before it reaches the cache.

use crate::config::IdConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single HMR protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Payload {
    /// The transport has (re)connected
    Connected,
    /// One or more modules changed and can be patched in place
    Update { updates: Vec<Update> },
    /// User-defined event forwarded to listeners
    Custom {
        event: String,
        #[serde(default)]
        data: JsonValue,
    },
    /// Invalidate the cache and re-run entrypoints
    FullReload {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        triggered_by: Option<String>,
    },
    /// Modules that are no longer imported anywhere
    Prune { paths: Vec<String> },
    /// The dev server failed to process a change
    Error { err: ErrorPayload },
}

impl Payload {
    /// Decode a payload from its JSON text
    ///
    /// A `type` tag that matches no variant means the server speaks a
    /// different protocol version; that is reported as [`Error::Protocol`].
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::protocol(e.to_string()))
    }

    /// Decode a payload from an already parsed JSON value
    pub fn from_value(value: JsonValue) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::protocol(e.to_string()))
    }

    /// Encode the payload as a JSON value (listener data)
    pub fn to_value(&self) -> Result<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }

    /// The wire tag of this payload
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Connected => "connected",
            Payload::Update { .. } => "update",
            Payload::Custom { .. } => "custom",
            Payload::FullReload { .. } => "full-reload",
            Payload::Prune { .. } => "prune",
            Payload::Error { .. } => "error",
        }
    }
}

/// Kind of a single module update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateKind {
    JsUpdate,
    CssUpdate,
}

/// One module change inside an `update` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    /// Module that changed
    pub path: String,
    /// Module that accepted the change (may equal `path`)
    pub accepted_path: String,
    /// Server timestamp of the change, used for cache busting
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_import_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_within_circular_import: Option<bool>,
}

impl Update {
    /// Create a `js-update` for `path` accepted by `accepted_path`
    pub fn js(path: impl Into<String>, accepted_path: impl Into<String>) -> Self {
        Self {
            kind: UpdateKind::JsUpdate,
            path: path.into(),
            accepted_path: accepted_path.into(),
            timestamp: 0,
            explicit_import_required: None,
            is_within_circular_import: None,
        }
    }

    /// Create a `css-update` for `path`
    pub fn css(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            kind: UpdateKind::CssUpdate,
            accepted_path: path.clone(),
            path,
            timestamp: 0,
            explicit_import_required: None,
            is_within_circular_import: None,
        }
    }

    /// Set the server timestamp
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Copy of this update with both paths in module cache id space
    pub fn normalized(&self, ids: &IdConfig) -> Self {
        Self {
            path: unwrap_id(&self.path, ids),
            accepted_path: unwrap_id(&self.accepted_path, ids),
            ..self.clone()
        }
    }
}

/// Error reported by the dev server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default)]
    pub stack: String,
    /// Module the error originated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Code frame around the failing location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
    /// Plugin that raised the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: stack.into(),
            ..Self::default()
        }
    }
}

/// Map a wire-level module id onto the module cache's id space
///
/// Strips the configured prefix and restores the null-byte placeholder.
/// Ids without the prefix are returned unchanged.
pub fn unwrap_id(id: &str, ids: &IdConfig) -> String {
    match id.strip_prefix(ids.prefix.as_str()) {
        Some(rest) if !ids.null_byte_placeholder.is_empty() => {
            rest.replacen(ids.null_byte_placeholder.as_str(), "\0", 1)
        }
        Some(rest) => rest.to_string(),
        None => id.to_string(),
    }
}

/// Normalize a file path reported by the server (`triggeredBy`)
pub fn normalize_file_path(path: &str, ids: &IdConfig) -> String {
    unwrap_id(path, ids).replace('\\', "/")
}
