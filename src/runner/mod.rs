//! Collaborator contracts
//!
//! The coordinator never owns the module cache, the listener registry or the
//! import machinery. It drives them through the traits below, implemented by
//! whatever module runner embeds it.

use crate::error::Result;
use crate::graph::ModuleCache;
use crate::payload::Update;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Lifecycle events fired to HMR listeners
pub mod events {
    /// Before the modules of an `update` payload are patched
    pub const BEFORE_UPDATE: &str = "beforeUpdate";
    /// After every patch of an `update` payload settled
    pub const AFTER_UPDATE: &str = "afterUpdate";
    /// Before the module cache is cleared for a full reload
    pub const BEFORE_FULL_RELOAD: &str = "beforeFullReload";
    /// Before pruned modules are disposed
    pub const BEFORE_PRUNE: &str = "beforePrune";
    /// The dev server reported an error
    pub const ERROR: &str = "error";
}

/// Log sink of an HMR client
pub trait HmrLogger: Send + Sync {
    fn debug(&self, message: &str);
    fn error(&self, message: &str);
}

/// [`HmrLogger`] that forwards to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl HmrLogger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "quicksilver_hmr", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "quicksilver_hmr", "{}", message);
    }
}

/// Client side of the HMR connection
#[async_trait]
pub trait HmrClient: Send + Sync {
    /// Logger used for protocol-level messages
    fn logger(&self) -> &dyn HmrLogger;

    /// Send any outbound messages buffered while disconnected
    fn flush_messages(&self);

    /// Run every listener registered under `event`
    ///
    /// Events without listeners resolve immediately.
    async fn notify_listeners(&self, event: &str, data: &JsonValue) -> Result<()>;

    /// Apply one module patch (dispose, re-import, accept callbacks)
    async fn queue_update(&self, update: Update) -> Result<()>;

    /// Dispose modules that are no longer imported
    async fn prune_paths(&self, paths: &[String]) -> Result<()>;
}

/// The module runner that owns the cache and executes modules
#[async_trait]
pub trait ModuleRunner: Send + Sync {
    /// Whether the runner has been shut down
    fn is_destroyed(&self) -> bool;

    /// Active HMR client, if hot reloading is enabled
    fn hmr_client(&self) -> Option<&dyn HmrClient>;

    /// Cache of evaluated modules
    fn evaluated_modules(&self) -> &dyn ModuleCache;

    /// Import (and evaluate) a module by id
    async fn import(&self, id: &str) -> Result<()>;
}
