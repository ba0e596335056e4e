//! Shared test helpers for integration tests

use async_trait::async_trait;
use quicksilver_hmr::graph::{EvaluatedModules, ModuleCache, ModuleNode};
use quicksilver_hmr::replay::{GraphFixture, RecordingRunner};
use quicksilver_hmr::runner::{HmrClient, HmrLogger, ModuleRunner, TracingLogger};
use quicksilver_hmr::{Result, Update};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// main <- app <- util, plus a standalone worker entrypoint
#[allow(dead_code)]
pub fn fixture() -> GraphFixture {
    GraphFixture::from_json(
        r#"{"modules": [
            {"id": "/src/main.js", "file": "/src/main.js"},
            {"id": "/src/app.js", "file": "/src/app.js", "importers": ["/src/main.js"]},
            {"id": "/src/util.js", "file": "/src/util.js", "importers": ["/src/app.js"]},
            {"id": "/src/worker.js", "file": "/src/worker.js"}
        ]}"#,
    )
    .expect("fixture is valid JSON")
}

/// Recording runner over [`fixture`]
#[allow(dead_code)]
pub fn recording_runner() -> Arc<RecordingRunner> {
    Arc::new(RecordingRunner::new(&fixture()))
}

/// Runner and client whose operations take time, logging start and end
///
/// Delays are looked up by update path or imported id (default 0ms).
#[allow(dead_code)]
pub struct TimedRunner {
    cache: EvaluatedModules,
    delays: HashMap<String, u64>,
    log: Arc<Mutex<Vec<String>>>,
    logger: TracingLogger,
}

#[allow(dead_code)]
impl TimedRunner {
    pub fn new(nodes: Vec<ModuleNode>) -> Self {
        Self {
            cache: EvaluatedModules::from_nodes(nodes),
            delays: HashMap::new(),
            log: Arc::new(Mutex::new(Vec::new())),
            logger: TracingLogger,
        }
    }

    pub fn with_delay(mut self, target: &str, millis: u64) -> Self {
        self.delays.insert(target.to_string(), millis);
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    async fn pause(&self, target: &str) {
        let millis = self.delays.get(target).copied().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

#[async_trait]
impl HmrClient for TimedRunner {
    fn logger(&self) -> &dyn HmrLogger {
        &self.logger
    }

    fn flush_messages(&self) {
        self.record("flush".to_string());
    }

    async fn notify_listeners(&self, event: &str, _data: &JsonValue) -> Result<()> {
        self.record(format!("notify {}", event));
        Ok(())
    }

    async fn queue_update(&self, update: Update) -> Result<()> {
        self.record(format!("patch start {}", update.path));
        self.pause(&update.path).await;
        self.record(format!("patch end {}", update.path));
        Ok(())
    }

    async fn prune_paths(&self, paths: &[String]) -> Result<()> {
        self.record(format!("prune {}", paths.join(",")));
        Ok(())
    }
}

#[async_trait]
impl ModuleRunner for TimedRunner {
    fn is_destroyed(&self) -> bool {
        false
    }

    fn hmr_client(&self) -> Option<&dyn HmrClient> {
        Some(self)
    }

    fn evaluated_modules(&self) -> &dyn ModuleCache {
        &self.cache
    }

    async fn import(&self, id: &str) -> Result<()> {
        self.record(format!("import start {}", id));
        self.pause(id).await;
        self.record(format!("import end {}", id));
        Ok(())
    }
}
