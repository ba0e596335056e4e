//! Prelude module for convenient imports
//!
//! ```no_run
//! use quicksilver_hmr::prelude::*;
//! ```

// Error handling
pub use crate::error::{Error, Operation, Result};

// Configuration
pub use crate::config::{HmrConfig, IdConfig};

// Wire model
pub use crate::payload::{ErrorPayload, Payload, Update, UpdateKind};

// Module graph
pub use crate::graph::{
    all_entrypoints, entrypoints_of, entrypoints_of_file, EvaluatedModules, ModuleCache,
    ModuleMeta, ModuleNode,
};

// Collaborators
pub use crate::runner::{events, HmrClient, HmrLogger, ModuleRunner, TracingLogger};

// Coordination
pub use crate::dispatch::{handle_hot_payload, HmrHandler};
pub use crate::queue::SerialQueue;

// Version constant
pub use crate::VERSION;
