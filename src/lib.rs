//! Quicksilver HMR: hot module replacement coordinator for the module runner
//!
//! The dev server pushes HMR payloads to a running program. This crate turns
//! that stream into the graph mutations, listener callbacks and re-imports
//! that keep the runner's in-memory module graph in sync with the source.
//!
//! # Quick Start
//!
//! ```no_run
//! use quicksilver_hmr::replay::{GraphFixture, RecordingRunner};
//! use quicksilver_hmr::{HmrHandler, Payload};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> quicksilver_hmr::Result<()> {
//!     let fixture = GraphFixture::from_json_file("graph.json")?;
//!     let handler = HmrHandler::new(Arc::new(RecordingRunner::new(&fixture)));
//!     handler.handle(Payload::FullReload { triggered_by: None }).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! Payloads flow: transport → [`queue`] → [`dispatch`] → [`runner`] collaborators
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Wire** | [`payload`], [`config`] |
//! | **Core** | [`queue`], [`dispatch`], [`graph`] |
//! | **Embedding** | [`runner`], [`replay`] |
// Clippy configuration for the HMR coordinator.
//
// - new_without_default: SerialQueue and HmrHandler spawn onto the current
//   Tokio runtime, which a Default impl would hide
#![allow(clippy::new_without_default)]

pub mod config;
pub mod dispatch;
pub mod graph;
pub mod payload;
pub mod prelude;
pub mod queue;
pub mod replay;
pub mod runner;

mod error;

pub use config::HmrConfig;
pub use dispatch::{handle_hot_payload, HmrHandler};
pub use error::{messages, Error, Operation, Result};
pub use payload::{Payload, Update, UpdateKind};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
