use dc_core::{
    ConnectorContext, ConnectorEngine, EngineConfig, FailureKind, Registry, StreamTarget,
};
use dc_jsonl_connector::register_all;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn temp_file(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("dc-jsonl-{}-{}.jsonl", tag, uuid::Uuid::new_v4()))
}

fn engine(config: EngineConfig) -> ConnectorEngine {
    let mut registry = Registry::new();
    register_all(&mut registry);
    ConnectorEngine::new(config).with_registry(Arc::new(registry))
}

fn context_for(path: &PathBuf) -> ConnectorContext {
    ConnectorContext::generate().with_config("path", path.to_string_lossy().to_string())
}

fn write_lines(path: &PathBuf, lines: &[&str]) {
    std::fs::write(path, lines.join("\n")).unwrap();
}

#[tokio::test]
async fn test_batch_read() {
    let path = temp_file("read");
    write_lines(&path, &[r#"{"id": 1}"#, "", r#"{"id": 2, "name": "b"}"#]);
    let engine = engine(EngineConfig::default());

    let connector = engine.create("jsonl-reader").unwrap();
    let result = engine.run_batch_read(connector, context_for(&path)).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.records_processed, 2);
    let records = result.records.unwrap();
    assert_eq!(records[1].get("name"), Some(&json!("b")));
    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_batch_read_stops_at_bad_line() {
    let path = temp_file("bad");
    write_lines(&path, &[r#"{"id": 1}"#, "not json", r#"{"id": 3}"#]);
    let engine = engine(EngineConfig::default());

    let connector = engine.create("jsonl-reader").unwrap();
    let result = engine.run_batch_read(connector, context_for(&path)).await;

    assert!(result.is_failure(FailureKind::Operation));
    assert!(result.message.starts_with("line 2: "));
    assert_eq!(result.records_processed, 1);
    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_missing_path_is_a_configuration_failure() {
    let engine = engine(EngineConfig::default());
    let connector = engine.create("jsonl-reader").unwrap();

    let result = engine
        .run_batch_read(connector, ConnectorContext::generate())
        .await;

    assert!(result.is_failure(FailureKind::Configuration));
    assert_eq!(result.message, "invalid configuration: 'path' is required");
}

#[tokio::test]
async fn test_missing_file_is_an_operation_failure() {
    let engine = engine(EngineConfig::default());
    let connector = engine.create("jsonl-reader").unwrap();

    let result = engine
        .run_batch_read(connector, context_for(&temp_file("absent")))
        .await;

    assert!(result.is_failure(FailureKind::Operation));
}

#[tokio::test]
async fn test_batch_write_then_append() {
    let path = temp_file("write");
    let engine = engine(EngineConfig::default());
    let records: Vec<_> = (1..=2)
        .map(|i| dc_core::record_from_value(json!({ "id": i })).unwrap())
        .collect();

    let connector = engine.create("jsonl-writer").unwrap();
    let result = engine
        .run_batch_write(connector, context_for(&path), records.clone())
        .await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.records_processed, 2);

    let connector = engine.create("jsonl-writer").unwrap();
    let result = engine
        .run_batch_write(
            connector,
            context_for(&path).with_config("append", true),
            records,
        )
        .await;
    assert!(result.success);

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 4);
    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_stream_collect() {
    let path = temp_file("stream");
    write_lines(&path, &[r#"{"id": 1}"#, r#"{"id": 2}"#, r#"{"id": 3}"#]);
    let engine = engine(EngineConfig::default());

    let connector = engine.create("jsonl-stream-reader").unwrap();
    let result = engine
        .run_stream_to_end(connector, context_for(&path), StreamTarget::Collect)
        .await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.records_processed, 3);
    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_stream_error_keeps_partial_count() {
    let path = temp_file("stream-bad");
    write_lines(&path, &[r#"{"id": 1}"#, "[1, 2]"]);
    let engine = engine(EngineConfig::default());

    let connector = engine.create("jsonl-stream-reader").unwrap();
    let result = engine
        .run_stream_to_end(connector, context_for(&path), StreamTarget::Collect)
        .await;

    assert!(!result.success);
    assert_eq!(result.records_processed, 1);
    assert!(result.message.starts_with("line 2: "));
    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_stream_stop() {
    let path = temp_file("slow");
    let lines: Vec<String> = (1..=50).map(|i| format!(r#"{{"id": {}}}"#, i)).collect();
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    write_lines(&path, &lines);
    let engine = engine(EngineConfig::default());

    let connector = engine.create("jsonl-stream-reader").unwrap();
    let handle = engine
        .run_stream(
            connector,
            context_for(&path).with_config("delay_ms", 20),
            StreamTarget::Collect,
        )
        .await;
    tokio::time::sleep(Duration::from_millis(70)).await;
    handle.stop();
    let result = handle.wait().await;

    assert!(result.success);
    assert!(result.records_processed < 50);
    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_stream_timeout() {
    let path = temp_file("timeout");
    write_lines(&path, &[r#"{"id": 1}"#, r#"{"id": 2}"#, r#"{"id": 3}"#]);
    let engine = engine(EngineConfig::default().with_stream_timeout(Duration::from_millis(50)));

    let connector = engine.create("jsonl-stream-reader").unwrap();
    let result = engine
        .run_stream_to_end(
            connector,
            context_for(&path).with_config("delay_ms", 1000),
            StreamTarget::Collect,
        )
        .await;

    assert!(result.is_failure(FailureKind::Timeout));
    assert_eq!(result.records_processed, 1);
    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_stream_copy_into_stream_writer() {
    let source = temp_file("copy-in");
    let target = temp_file("copy-out");
    let lines: Vec<String> = (1..=7).map(|i| format!(r#"{{"id": {}}}"#, i)).collect();
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    write_lines(&source, &lines);
    let engine = engine(EngineConfig::default().with_sink_batch_size(3));

    let reader = engine.create("jsonl-stream-reader").unwrap();
    let writer = engine.create("jsonl-stream-writer").unwrap();
    let result = engine
        .run_stream_to_end(
            reader,
            context_for(&source),
            StreamTarget::Sink {
                connector: writer,
                context: context_for(&target),
            },
        )
        .await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.records_processed, 7);
    let copied = std::fs::read_to_string(&target).unwrap();
    assert_eq!(copied.lines().count(), 7);
    assert_eq!(copied.lines().next(), Some(r#"{"id":1}"#));
    std::fs::remove_file(source).ok();
    std::fs::remove_file(target).ok();
}

#[tokio::test]
async fn test_stream_write_from_batches() {
    let path = temp_file("batches");
    let engine = engine(EngineConfig::default());
    let batch = |ids: &[i64]| {
        ids.iter()
            .map(|id| dc_core::record_from_value(json!({ "id": id })).unwrap())
            .collect::<Vec<_>>()
    };

    let connector = engine.create("jsonl-stream-writer").unwrap();
    let result = engine
        .run_stream_write(
            connector,
            context_for(&path),
            futures::stream::iter(vec![batch(&[1, 2]), batch(&[3])]),
        )
        .await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.records_processed, 3);
    assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 3);
    std::fs::remove_file(path).ok();
}
