//! Integration tests for payload dispatch

mod common;
use common::{fixture, recording_runner};
use quicksilver_hmr::config::IdConfig;
use quicksilver_hmr::graph::ModuleCache;
use quicksilver_hmr::payload::ErrorPayload;
use quicksilver_hmr::replay::{RecordingRunner, RunnerEvent};
use quicksilver_hmr::runner::{events, ModuleRunner};
use quicksilver_hmr::{handle_hot_payload, messages, Error, HmrConfig, HmrHandler, Payload, Update};
use serde_json::json;
use std::sync::Arc;

fn notify(event: &str, data: serde_json::Value) -> RunnerEvent {
    RunnerEvent::Notify {
        event: event.to_string(),
        data,
    }
}

fn import(id: &str) -> RunnerEvent {
    RunnerEvent::Import { id: id.to_string() }
}

async fn dispatch(runner: &RecordingRunner, payload: Payload) -> quicksilver_hmr::Result<()> {
    handle_hot_payload(runner, &payload, &IdConfig::default()).await
}

mod connected {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_logs_and_flushes() {
        let runner = recording_runner();
        dispatch(&runner, Payload::Connected).await.unwrap();

        assert_eq!(
            runner.log().take(),
            vec![
                RunnerEvent::Debug { message: messages::CONNECTED.to_string() },
                RunnerEvent::Flush,
            ]
        );
    }
}

mod update {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_paths_are_unwrapped() {
        let runner = recording_runner();
        let payload = Payload::Update {
            updates: vec![Update::js("/@id/foo/bar.js", "/@id/foo/bar.js")],
        };
        let before = payload.to_value().unwrap();
        let after = Payload::Update {
            updates: vec![Update::js("foo/bar.js", "foo/bar.js")],
        }
        .to_value()
        .unwrap();

        dispatch(&runner, payload).await.unwrap();

        assert_eq!(
            runner.log().take(),
            vec![
                notify(events::BEFORE_UPDATE, before),
                RunnerEvent::QueueUpdate { update: Update::js("foo/bar.js", "foo/bar.js") },
                notify(events::AFTER_UPDATE, after),
            ]
        );
    }

    #[tokio::test]
    async fn test_css_update_is_logged_not_applied() {
        let runner = recording_runner();
        let payload = Payload::Update { updates: vec![Update::css("/src/style.css")] };

        dispatch(&runner, payload).await.unwrap();

        let log = runner.log().take();
        let patches = log
            .iter()
            .filter(|e| matches!(e, RunnerEvent::QueueUpdate { .. }))
            .count();
        let errors: Vec<_> = log
            .iter()
            .filter(|e| matches!(e, RunnerEvent::Error { .. }))
            .collect();

        assert_eq!(patches, 0);
        assert_eq!(
            errors,
            vec![&RunnerEvent::Error { message: messages::CSS_UPDATE_UNSUPPORTED.to_string() }]
        );
        assert!(matches!(&log[0], RunnerEvent::Notify { event, .. } if event == events::BEFORE_UPDATE));
        assert!(matches!(log.last(), Some(RunnerEvent::Notify { event, .. }) if event == events::AFTER_UPDATE));
    }

    #[tokio::test]
    async fn test_mixed_updates_only_patch_js() {
        let runner = recording_runner();
        let payload = Payload::Update {
            updates: vec![
                Update::js("/src/a.js", "/src/a.js"),
                Update::css("/src/a.css"),
                Update::js("/src/b.js", "/src/main.js"),
            ],
        };

        dispatch(&runner, payload).await.unwrap();

        let patched: Vec<String> = runner
            .log()
            .take()
            .into_iter()
            .filter_map(|e| match e {
                RunnerEvent::QueueUpdate { update } => Some(update.path),
                _ => None,
            })
            .collect();
        assert_eq!(patched, vec!["/src/a.js", "/src/b.js"]);
    }

    #[tokio::test]
    async fn test_failed_patch_rejects_whole_update() {
        let runner = recording_runner();
        runner.fail_on("/src/a.js");
        let payload = Payload::Update {
            updates: vec![
                Update::js("/src/a.js", "/src/a.js"),
                Update::js("/src/b.js", "/src/b.js"),
            ],
        };

        let err = dispatch(&runner, payload).await.unwrap_err();
        assert!(err.is_collaborator());

        let log = runner.log().take();
        // The sibling patch still ran, but afterUpdate never fired
        assert_eq!(
            log.iter().filter(|e| matches!(e, RunnerEvent::QueueUpdate { .. })).count(),
            2
        );
        assert!(!log.iter().any(|e| matches!(e, RunnerEvent::Notify { event, .. } if event == events::AFTER_UPDATE)));
    }
}

mod custom {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_forwards_event_and_data() {
        let runner = recording_runner();
        let payload = Payload::Custom {
            event: "plugin:ping".to_string(),
            data: json!({ "count": 2 }),
        };

        dispatch(&runner, payload).await.unwrap();

        assert_eq!(runner.log().take(), vec![notify("plugin:ping", json!({ "count": 2 }))]);
    }
}

mod full_reload {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_scoped_reload_reimports_dependent_root() {
        let runner = recording_runner();
        let payload = Payload::FullReload { triggered_by: Some("/src/util.js".to_string()) };
        let data = payload.to_value().unwrap();

        dispatch(&runner, payload).await.unwrap();

        assert_eq!(
            runner.log().take(),
            vec![
                RunnerEvent::Debug { message: messages::PROGRAM_RELOAD.to_string() },
                notify(events::BEFORE_FULL_RELOAD, data),
                RunnerEvent::ClearCache,
                import("/src/main.js"),
            ]
        );
        // Re-importing main repopulated its import closure only
        assert!(runner.modules().contains("/src/util.js"));
        assert!(!runner.modules().contains("/src/worker.js"));
    }

    #[tokio::test]
    async fn test_prefixed_trigger_is_normalized() {
        let runner = recording_runner();
        let payload = Payload::FullReload { triggered_by: Some("/@id//src/worker.js".to_string()) };

        dispatch(&runner, payload).await.unwrap();

        let imports: Vec<_> = runner
            .log()
            .take()
            .into_iter()
            .filter(|e| matches!(e, RunnerEvent::Import { .. }))
            .collect();
        assert_eq!(imports, vec![import("/src/worker.js")]);
    }

    #[tokio::test]
    async fn test_unmatched_trigger_does_nothing() {
        let runner = recording_runner();
        let payload = Payload::FullReload { triggered_by: Some("/src/unknown.js".to_string()) };

        dispatch(&runner, payload).await.unwrap();

        assert!(runner.log().take().is_empty());
        assert_eq!(runner.modules().len(), fixture().modules.len());
    }

    #[tokio::test]
    async fn test_global_reload_reimports_every_root() {
        let runner = recording_runner();

        dispatch(&runner, Payload::FullReload { triggered_by: None }).await.unwrap();

        let imports: Vec<_> = runner
            .log()
            .take()
            .into_iter()
            .filter(|e| matches!(e, RunnerEvent::Import { .. }))
            .collect();
        assert_eq!(imports, vec![import("/src/main.js"), import("/src/worker.js")]);
        assert_eq!(runner.modules().len(), fixture().modules.len());
    }

    #[tokio::test]
    async fn test_failed_import_stops_reload() {
        let runner = recording_runner();
        runner.fail_on("/src/main.js");

        let err = dispatch(&runner, Payload::FullReload { triggered_by: None })
            .await
            .unwrap_err();
        assert!(err.is_collaborator());

        let log = runner.log().take();
        assert!(log.contains(&import("/src/main.js")));
        assert!(!log.contains(&import("/src/worker.js")));
    }

    #[tokio::test]
    async fn test_empty_cache_is_a_noop() {
        let runner = recording_runner();
        runner.evaluated_modules().clear();
        runner.log().take();

        dispatch(&runner, Payload::FullReload { triggered_by: None }).await.unwrap();
        assert!(runner.log().take().is_empty());
    }
}

mod prune {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_prune_twice_is_idempotent() {
        let runner = recording_runner();
        let payload = Payload::Prune { paths: vec!["/@id//src/util.js".to_string()] };
        let data = payload.to_value().unwrap();

        dispatch(&runner, payload.clone()).await.unwrap();
        dispatch(&runner, payload).await.unwrap();

        let pruned = RunnerEvent::PrunePaths { paths: vec!["/src/util.js".to_string()] };
        assert_eq!(
            runner.log().take(),
            vec![
                notify(events::BEFORE_PRUNE, data.clone()),
                pruned.clone(),
                notify(events::BEFORE_PRUNE, data),
                pruned,
            ]
        );
        assert!(!runner.modules().contains("/src/util.js"));
    }
}

mod error {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_error_is_forwarded_and_logged() {
        let runner = recording_runner();
        let payload = Payload::Error { err: ErrorPayload::new("Transform failed", "at plugin (x.js:1:1)") };
        let data = payload.to_value().unwrap();

        dispatch(&runner, payload).await.unwrap();

        assert_eq!(
            runner.log().take(),
            vec![
                notify(events::ERROR, data),
                RunnerEvent::Error {
                    message: messages::server_error("Transform failed", "at plugin (x.js:1:1)"),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_error_listener_does_not_reject() {
        let runner = recording_runner();
        runner.fail_on(events::ERROR);

        let payload = Payload::Error { err: ErrorPayload::new("boom", "") };
        assert!(dispatch(&runner, payload).await.is_ok());
    }
}

mod preconditions {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_destroyed_runner_ignores_payloads() {
        let runner = recording_runner();
        runner.destroy();

        dispatch(&runner, Payload::FullReload { triggered_by: None }).await.unwrap();
        dispatch(&runner, Payload::Connected).await.unwrap();

        assert!(runner.log().take().is_empty());
        assert_eq!(runner.modules().len(), fixture().modules.len());
    }

    #[tokio::test]
    async fn test_runner_without_client_ignores_payloads() {
        let runner = RecordingRunner::without_client(&fixture());

        dispatch(&runner, Payload::FullReload { triggered_by: None }).await.unwrap();
        assert!(runner.log().take().is_empty());
    }
}

mod handler {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_unknown_payload_is_protocol_error() {
        let runner = recording_runner();
        let handler = HmrHandler::new(Arc::clone(&runner));

        let err = handler.handle_json(r#"{"type":"vite:teleport"}"#).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));

        handler.handle_json(r#"{"type":"connected"}"#).await.unwrap();
        assert_eq!(runner.log().take().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_payload_does_not_block_next() {
        let runner = recording_runner();
        runner.fail_on("/src/main.js");
        let handler = HmrHandler::new(Arc::clone(&runner));

        let reload = handler.handle(Payload::FullReload { triggered_by: None });
        let connected = handler.handle(Payload::Connected);

        assert!(reload.await.unwrap_err().is_collaborator());
        connected.await.unwrap();
        assert_eq!(runner.log().take().last(), Some(&RunnerEvent::Flush));
    }

    #[tokio::test]
    async fn test_zero_max_pending_is_rejected_at_construction() {
        let runner = recording_runner();
        let config = HmrConfig::new().with_max_pending(0);

        let err = HmrHandler::with_config(Arc::clone(&runner), &config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(runner.log().take().is_empty());
    }

    #[tokio::test]
    async fn test_configured_handler_accepts_on_idle_queue() {
        let runner = recording_runner();
        let config = HmrConfig::new().with_max_pending(1);
        let handler = HmrHandler::with_config(Arc::clone(&runner), &config).unwrap();

        handler.handle(Payload::Connected).await.unwrap();
        assert_eq!(runner.log().take().last(), Some(&RunnerEvent::Flush));
    }
}
