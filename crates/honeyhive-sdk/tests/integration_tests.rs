//! Tracer-level integration tests against a mock ingestion service.

use std::time::Duration;

use honeyhive::{
    TraceOptions, Tracer, TracerConfig, get_default_tracer, set_default_tracer, trace_discovered,
};
use mockito::Matcher;
use serde_json::json;
use uuid::Uuid;

fn config_for(server: &mockito::ServerGuard, project: &str) -> TracerConfig {
    let mut config = TracerConfig::new("test-key", project);
    config.server_url = Some(server.url());
    config.otlp_enabled = Some(false);
    config.disable_batch = Some(true);
    config.worker_count = Some(1);
    config.retry_max_attempts = Some(1);
    config
}

fn mock_session_start(server: &mut mockito::ServerGuard) -> mockito::Mock {
    let session_id = Uuid::new_v4();
    server
        .mock("POST", "/session/start")
        .with_status(200)
        .with_body(format!(r#"{{"session_id":"{}"}}"#, session_id))
        .create()
}

#[test]
fn test_manual_trace_records_params_and_result() {
    let mut server = mockito::Server::new();
    let _session = mock_session_start(&mut server);
    let events = server
        .mock("POST", "/events")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(json!([
            {
                "event_name": "fetch_data",
                "event_type": "tool",
                "inputs": { "_params_": { "city": "SF" } },
                "outputs": { "result": ["a", "b"] }
            }
        ])))
        .with_status(200)
        .create();

    let tracer = Tracer::init(config_for(&server, "s4-project")).unwrap();
    assert!(!tracer.is_degraded());

    let options = TraceOptions {
        params: Some(json!({ "city": "SF" })),
        ..TraceOptions::default()
    };
    let rows = tracer.trace("fetch_data", options, |_span| {
        vec!["a".to_string(), "b".to_string()]
    });
    assert_eq!(rows.len(), 2);

    let report = tracer.flush(Some(Duration::from_secs(5)));
    assert_eq!(report.cancelled, 0);
    events.assert();

    tracer.shutdown();
}

#[test]
fn test_trace_result_error_is_recorded_and_returned() {
    let mut server = mockito::Server::new();
    let _session = mock_session_start(&mut server);
    let events = server
        .mock("POST", "/events")
        .match_body(Matcher::PartialJson(json!([
            { "event_name": "risky", "error": "downstream unavailable" }
        ])))
        .with_status(200)
        .create();

    let tracer = Tracer::init(config_for(&server, "err-project")).unwrap();

    let outcome: Result<(), String> =
        tracer.trace_result("risky", TraceOptions::default(), |_span| {
            Err("downstream unavailable".to_string())
        });
    assert_eq!(outcome.unwrap_err(), "downstream unavailable");

    tracer.flush(Some(Duration::from_secs(5)));
    events.assert();
    tracer.shutdown();
}

#[test]
fn test_nested_trace_parenting() {
    let mut server = mockito::Server::new();
    let _session = mock_session_start(&mut server);
    // Two events; the child carries a parent_id.
    let events = server
        .mock("POST", "/events")
        .with_status(200)
        .expect_at_least(2)
        .create();

    let tracer = Tracer::init(config_for(&server, "nest-project")).unwrap();

    let tracer_clone = tracer.clone();
    tracer.trace("workflow", TraceOptions::default(), move |_span| {
        let mut child = tracer_clone.start_span("step");
        child.set_attribute("k", "v");
        child.end();
    });

    tracer.flush(Some(Duration::from_secs(5)));
    events.assert();
    tracer.shutdown();
}

#[test]
fn test_degraded_tracer_full_sequence_never_panics() {
    // No api key, unreachable server: everything still returns.
    let mut config = TracerConfig::new("", "degraded");
    config.server_url = Some("http://127.0.0.1:9".to_string());
    config.otlp_enabled = Some(false);
    let tracer = Tracer::init(config).unwrap();
    assert!(tracer.is_degraded());

    let value = tracer.trace("work", TraceOptions::default(), |span| {
        span.set_attribute("gen_ai.system", "openai");
        21 * 2
    });
    assert_eq!(value, 42);

    let mut span = tracer.start_span("manual");
    span.set_attribute("x", 1i64);
    span.end();

    tracer.flush(Some(Duration::from_millis(100)));
    tracer.shutdown();
    tracer.shutdown();

    // Degraded drops are visible in the counters.
    assert!(tracer.stats().dropped >= 2);
    assert_eq!(tracer.stats().exported, 0);
}

#[test]
fn test_post_shutdown_operations_are_noops() {
    let mut server = mockito::Server::new();
    let _session = mock_session_start(&mut server);
    let tracer = Tracer::init(config_for(&server, "shutdown-project")).unwrap();

    tracer.shutdown();

    let mut span = tracer.start_span("late");
    assert!(span.is_noop());
    span.end();
    assert_eq!(tracer.flush(None), honeyhive::FlushReport::default());
}

#[test]
fn test_default_tracer_accessors() {
    let mut server = mockito::Server::new();
    let _session = mock_session_start(&mut server);
    let tracer = Tracer::init(config_for(&server, "default-project")).unwrap();

    set_default_tracer(&tracer);
    let resolved = get_default_tracer().expect("default tracer should resolve");
    assert_eq!(resolved.id(), tracer.id());

    tracer.shutdown();
}

#[test]
fn test_trace_discovered_without_any_tracer_is_a_noop() {
    // No explicit tracer, no scope, default either unset or belonging to a
    // parallel test: the decorated function must run either way.
    let value = trace_discovered(None, "standalone", TraceOptions::default(), |span| {
        span.set_attribute("ignored", true);
        5
    });
    assert_eq!(value, 5);
}

#[test]
fn test_trace_discovered_prefers_explicit_tracer() {
    let mut server = mockito::Server::new();
    let _session = mock_session_start(&mut server);
    let events = server
        .mock("POST", "/events")
        .match_body(Matcher::PartialJson(json!([
            { "event_name": "discovered" }
        ])))
        .with_status(200)
        .create();

    let tracer = Tracer::init(config_for(&server, "discover-project")).unwrap();
    let value = trace_discovered(Some(&tracer), "discovered", TraceOptions::default(), |_| 1);
    assert_eq!(value, 1);

    tracer.flush(Some(Duration::from_secs(5)));
    events.assert();
    tracer.shutdown();
}

#[tokio::test]
async fn test_trace_async_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let session_id = Uuid::new_v4();
    let _session = server
        .mock("POST", "/session/start")
        .with_status(200)
        .with_body(format!(r#"{{"session_id":"{}"}}"#, session_id))
        .create_async()
        .await;
    let events = server
        .mock("POST", "/events")
        .match_body(Matcher::PartialJson(json!([
            { "event_name": "async_work", "outputs": { "result": 7 } }
        ])))
        .with_status(200)
        .create_async()
        .await;

    // Init performs blocking HTTP on its own runtime; hop off the test
    // runtime for it.
    let url = server.url();
    let tracer = tokio::task::spawn_blocking(move || {
        let mut config = TracerConfig::new("test-key", "async-project");
        config.server_url = Some(url);
        config.otlp_enabled = Some(false);
        config.disable_batch = Some(true);
        Tracer::init(config).unwrap()
    })
    .await
    .unwrap();

    let value = tracer
        .trace_async("async_work", TraceOptions::default(), async {
            tokio::task::yield_now().await;
            7
        })
        .await;
    assert_eq!(value, 7);

    let flusher = tracer.clone();
    tokio::task::spawn_blocking(move || {
        flusher.flush(Some(Duration::from_secs(5)));
        flusher.shutdown();
    })
    .await
    .unwrap();

    events.assert_async().await;
}
