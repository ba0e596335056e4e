//! Payload Replay
//!
//! A dry-run [`ModuleRunner`] that keeps its module graph in memory and
//! records every collaborator call instead of executing modules. The CLI uses
//! it to replay a captured payload stream against a graph fixture; tests use
//! it to assert the exact call sequence a payload produces.
//!
//! Graph fixtures list modules with their importers:
//!
//! ```json
//! { "modules": [
//!     { "id": "/src/main.js", "file": "/src/main.js" },
//!     { "id": "/src/app.js", "file": "/src/app.js", "importers": ["/src/main.js"] }
//! ] }
//! ```

use crate::error::{Error, Operation, Result};
use crate::graph::{EvaluatedModules, ModuleCache, ModuleNode};
use crate::payload::Update;
use crate::runner::{HmrClient, HmrLogger, ModuleRunner};
use async_trait::async_trait;
use indexmap::IndexMap;
use rustc_hash::FxHashSet as HashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// One module in a graph fixture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureModule {
    pub id: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub importers: Vec<String>,
}

impl From<FixtureModule> for ModuleNode {
    fn from(module: FixtureModule) -> Self {
        let mut node = ModuleNode::new(module.id).with_importers(module.importers);
        if let Some(file) = module.file {
            node = node.with_file(file);
        }
        node
    }
}

/// A module graph snapshot loaded from JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphFixture {
    pub modules: Vec<FixtureModule>,
}

impl GraphFixture {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Nodes keyed by module id, in fixture order
    pub fn nodes(&self) -> IndexMap<String, ModuleNode> {
        self.modules
            .iter()
            .cloned()
            .map(|module| (module.id.clone(), ModuleNode::from(module)))
            .collect()
    }

    /// A populated in-memory cache
    pub fn to_cache(&self) -> EvaluatedModules {
        EvaluatedModules::from_nodes(self.nodes().into_values())
    }
}

/// Read a JSON Lines payload stream, skipping blank lines
pub fn payload_lines<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }
    Ok(lines)
}

/// A collaborator call observed by the recording runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum RunnerEvent {
    Debug { message: String },
    Error { message: String },
    Flush,
    Notify { event: String, data: JsonValue },
    QueueUpdate { update: Update },
    PrunePaths { paths: Vec<String> },
    ClearCache,
    Import { id: String },
}

/// Shared, ordered log of collaborator calls
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    events: Arc<Mutex<Vec<RunnerEvent>>>,
}

impl CallLog {
    pub fn push(&self, event: RunnerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Copy of every call recorded so far
    pub fn snapshot(&self) -> Vec<RunnerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return every recorded call
    pub fn take(&self) -> Vec<RunnerEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[derive(Debug)]
struct RecordingLogger {
    log: CallLog,
}

impl HmrLogger for RecordingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "quicksilver_hmr", "{}", message);
        self.log.push(RunnerEvent::Debug {
            message: message.to_string(),
        });
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "quicksilver_hmr", "{}", message);
        self.log.push(RunnerEvent::Error {
            message: message.to_string(),
        });
    }
}

/// Module cache that records `clear`
#[derive(Debug)]
struct RecordingCache {
    modules: EvaluatedModules,
    log: CallLog,
}

impl ModuleCache for RecordingCache {
    fn entries(&self) -> Vec<(String, ModuleNode)> {
        self.modules.entries()
    }

    fn get_by_module_id(&self, id: &str) -> Option<ModuleNode> {
        self.modules.get_by_module_id(id)
    }

    fn clear(&self) {
        self.log.push(RunnerEvent::ClearCache);
        self.modules.clear();
    }
}

/// HMR client that records calls and fails on request
#[derive(Debug)]
pub struct RecordingClient {
    log: CallLog,
    logger: RecordingLogger,
    cache: Arc<RecordingCache>,
    failures: Arc<Mutex<BTreeSet<String>>>,
}

impl RecordingClient {
    fn fails(&self, target: &str) -> bool {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(target)
    }
}

#[async_trait]
impl HmrClient for RecordingClient {
    fn logger(&self) -> &dyn HmrLogger {
        &self.logger
    }

    fn flush_messages(&self) {
        self.log.push(RunnerEvent::Flush);
    }

    async fn notify_listeners(&self, event: &str, data: &JsonValue) -> Result<()> {
        self.log.push(RunnerEvent::Notify {
            event: event.to_string(),
            data: data.clone(),
        });
        if self.fails(event) {
            return Err(Error::collaborator(
                Operation::NotifyListeners,
                format!("listener for '{}' failed", event),
            ));
        }
        Ok(())
    }

    async fn queue_update(&self, update: Update) -> Result<()> {
        let failed = self.fails(&update.path);
        let path = update.path.clone();
        self.log.push(RunnerEvent::QueueUpdate { update });
        // Let sibling patches interleave like real module evaluation would
        tokio::task::yield_now().await;
        if failed {
            return Err(Error::collaborator(
                Operation::QueueUpdate,
                format!("patch for '{}' failed", path),
            ));
        }
        Ok(())
    }

    async fn prune_paths(&self, paths: &[String]) -> Result<()> {
        self.log.push(RunnerEvent::PrunePaths {
            paths: paths.to_vec(),
        });
        for path in paths {
            self.cache.modules.remove(path);
        }
        Ok(())
    }
}

/// Dry-run module runner over a graph fixture
///
/// `import` re-inserts the imported module and everything it transitively
/// imports from the fixture, the way real evaluation repopulates the cache.
#[derive(Debug)]
pub struct RecordingRunner {
    fixture: IndexMap<String, ModuleNode>,
    cache: Arc<RecordingCache>,
    client: Option<RecordingClient>,
    destroyed: AtomicBool,
    failures: Arc<Mutex<BTreeSet<String>>>,
    log: CallLog,
}

impl RecordingRunner {
    /// Runner with an active HMR client and every fixture module evaluated
    pub fn new(fixture: &GraphFixture) -> Self {
        let log = CallLog::default();
        let failures = Arc::new(Mutex::new(BTreeSet::new()));
        let cache = Arc::new(RecordingCache {
            modules: fixture.to_cache(),
            log: log.clone(),
        });
        let client = RecordingClient {
            log: log.clone(),
            logger: RecordingLogger { log: log.clone() },
            cache: Arc::clone(&cache),
            failures: Arc::clone(&failures),
        };

        Self {
            fixture: fixture.nodes(),
            cache,
            client: Some(client),
            destroyed: AtomicBool::new(false),
            failures,
            log,
        }
    }

    /// Runner with HMR disabled
    pub fn without_client(fixture: &GraphFixture) -> Self {
        Self {
            client: None,
            ..Self::new(fixture)
        }
    }

    /// Make imports, patches or listeners for `target` fail
    ///
    /// `target` is matched against imported ids, patched paths and event names.
    pub fn fail_on(&self, target: impl Into<String>) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target.into());
    }

    /// Mark the runner as shut down
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    /// Calls recorded so far
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// The in-memory module cache
    pub fn modules(&self) -> &EvaluatedModules {
        &self.cache.modules
    }

    /// Fixture modules reachable by following imports from `id`
    fn import_closure(&self, id: &str) -> Vec<ModuleNode> {
        let mut loaded = Vec::new();
        let mut seen: HashSet<&str> = HashSet::default();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Some(node) = self.fixture.get(current) else {
                continue;
            };
            loaded.push(node.clone());
            stack.extend(
                self.fixture
                    .values()
                    .filter(|dep| dep.importers.as_ref().is_some_and(|i| i.contains(current)))
                    .map(|dep| dep.id.as_str()),
            );
        }

        loaded
    }
}

#[async_trait]
impl ModuleRunner for RecordingRunner {
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn hmr_client(&self) -> Option<&dyn HmrClient> {
        self.client.as_ref().map(|client| client as &dyn HmrClient)
    }

    fn evaluated_modules(&self) -> &dyn ModuleCache {
        self.cache.as_ref()
    }

    async fn import(&self, id: &str) -> Result<()> {
        self.log.push(RunnerEvent::Import { id: id.to_string() });
        let failed = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id);
        if failed {
            return Err(Error::collaborator(
                Operation::Import,
                format!("evaluating '{}' failed", id),
            ));
        }
        if !self.fixture.contains_key(id) {
            return Err(Error::collaborator(
                Operation::Import,
                format!("module not found: {}", id),
            ));
        }

        for node in self.import_closure(id) {
            self.cache.modules.insert(node);
        }
        Ok(())
    }
}
