//! Payload Dispatch
//!
//! Turns one decoded [`Payload`] into the calls it implies on the runner,
//! its HMR client and the module cache. [`HmrHandler`] is the entry point
//! the transport talks to: it feeds every payload through a
//! [`SerialQueue`], so no two payloads are ever handled at the same time.
//!
//! | Payload       | Effect                                                         |
//! |---------------|----------------------------------------------------------------|
//! | `connected`   | flush buffered messages                                        |
//! | `update`      | `beforeUpdate`, patch every `js-update` together, `afterUpdate` |
//! | `custom`      | listeners of the custom event                                  |
//! | `full-reload` | `beforeFullReload`, clear cache, re-import entrypoints in order |
//! | `prune`       | `beforePrune`, prune paths                                     |
//! | `error`       | `error` listeners, error log                                   |

use crate::config::{HmrConfig, IdConfig};
use crate::error::{messages, Result};
use crate::graph::{all_entrypoints, entrypoints_of_file};
use crate::payload::{normalize_file_path, unwrap_id, Payload, Update, UpdateKind};
use crate::queue::SerialQueue;
use crate::runner::{events, HmrClient, ModuleRunner};
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Apply a single payload to `runner`
///
/// Does nothing once the runner is destroyed or when it has no HMR client.
/// Collaborator failures are returned as-is; server-reported `error`
/// payloads never fail.
pub async fn handle_hot_payload<R>(runner: &R, payload: &Payload, ids: &IdConfig) -> Result<()>
where
    R: ModuleRunner + ?Sized,
{
    let Some(client) = runner.hmr_client() else {
        return Ok(());
    };
    if runner.is_destroyed() {
        return Ok(());
    }

    tracing::debug!(kind = payload.kind(), "handling hmr payload");

    match payload {
        Payload::Connected => {
            client.logger().debug(messages::CONNECTED);
            client.flush_messages();
        }
        Payload::Update { updates } => {
            client
                .notify_listeners(events::BEFORE_UPDATE, &payload.to_value()?)
                .await?;

            // afterUpdate listeners see js paths in cache id space
            let applied: Vec<Update> = updates
                .iter()
                .map(|update| match update.kind {
                    UpdateKind::JsUpdate => update.normalized(ids),
                    UpdateKind::CssUpdate => update.clone(),
                })
                .collect();

            let mut patches = Vec::with_capacity(applied.len());
            for update in &applied {
                match update.kind {
                    UpdateKind::JsUpdate => patches.push(client.queue_update(update.clone())),
                    UpdateKind::CssUpdate => client.logger().error(messages::CSS_UPDATE_UNSUPPORTED),
                }
            }
            // Every patch settles before the first failure is reported
            future::join_all(patches)
                .await
                .into_iter()
                .collect::<Result<Vec<()>>>()?;

            let data = Payload::Update { updates: applied }.to_value()?;
            client.notify_listeners(events::AFTER_UPDATE, &data).await?;
        }
        Payload::Custom { event, data } => {
            client.notify_listeners(event, data).await?;
        }
        Payload::FullReload { triggered_by } => {
            full_reload(runner, client, payload, triggered_by.as_deref(), ids).await?;
        }
        Payload::Prune { paths } => {
            client
                .notify_listeners(events::BEFORE_PRUNE, &payload.to_value()?)
                .await?;
            let paths: Vec<String> = paths.iter().map(|path| unwrap_id(path, ids)).collect();
            client.prune_paths(&paths).await?;
        }
        Payload::Error { err } => {
            match payload.to_value() {
                Ok(data) => {
                    if let Err(e) = client.notify_listeners(events::ERROR, &data).await {
                        tracing::warn!(error = %e, "error listener failed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "could not encode error payload"),
            }
            client
                .logger()
                .error(&messages::server_error(&err.message, &err.stack));
        }
    }

    Ok(())
}

async fn full_reload<R>(
    runner: &R,
    client: &dyn HmrClient,
    payload: &Payload,
    triggered_by: Option<&str>,
    ids: &IdConfig,
) -> Result<()>
where
    R: ModuleRunner + ?Sized,
{
    let cache = runner.evaluated_modules();
    let entrypoints = match triggered_by {
        Some(file) => entrypoints_of_file(cache, &normalize_file_path(file, ids)),
        None => all_entrypoints(cache),
    };
    if entrypoints.is_empty() {
        tracing::debug!(?triggered_by, "full reload affects no entrypoints");
        return Ok(());
    }

    client.logger().debug(messages::PROGRAM_RELOAD);
    client
        .notify_listeners(events::BEFORE_FULL_RELOAD, &payload.to_value()?)
        .await?;
    cache.clear();

    // Sequential: an entrypoint may observe side effects of the previous one
    for id in &entrypoints {
        runner.import(id).await?;
    }
    Ok(())
}

/// Serialized payload handler bound to one runner
pub struct HmrHandler<R: ModuleRunner + 'static> {
    runner: Arc<R>,
    queue: SerialQueue,
    ids: IdConfig,
}

impl<R: ModuleRunner + 'static> std::fmt::Debug for HmrHandler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmrHandler")
            .field("queue", &self.queue)
            .field("ids", &self.ids)
            .finish()
    }
}

impl<R: ModuleRunner + 'static> HmrHandler<R> {
    /// Create a handler with the default configuration
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            queue: SerialQueue::new(),
            ids: IdConfig::default(),
        }
    }

    /// Create a handler with an explicit configuration
    ///
    /// The configuration is validated first, so a config built in code is
    /// held to the same rules as one loaded from a file.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn with_config(runner: Arc<R>, config: &HmrConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            runner,
            queue: SerialQueue::with_limit(config.max_pending.and_then(NonZeroUsize::new)),
            ids: config.ids.clone(),
        })
    }

    /// Queue a payload; the future resolves once it has been handled
    pub fn handle(&self, payload: Payload) -> impl Future<Output = Result<()>> + Send + 'static {
        let runner = Arc::clone(&self.runner);
        let ids = self.ids.clone();
        self.queue
            .enqueue(move || async move { handle_hot_payload(runner.as_ref(), &payload, &ids).await })
    }

    /// Decode and queue a JSON payload
    ///
    /// Undecodable payloads are rejected without entering the queue.
    pub fn handle_json(&self, text: &str) -> BoxFuture<'static, Result<()>> {
        match Payload::from_json(text) {
            Ok(payload) => self.handle(payload).boxed(),
            Err(e) => future::ready(Err(e)).boxed(),
        }
    }

    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    pub fn queue(&self) -> &SerialQueue {
        &self.queue
    }
}
