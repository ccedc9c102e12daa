//! Loading configuration from TOML and running an engine with it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use zefira::config::DialogConfig;
use zefira::llm::Reply;
use zefira::{DialogError, ProgressReporter, QueryEngine};

use crate::helpers::{RecordingSink, ScriptedBackend, chat_manager};

#[test]
fn partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[recognition]
final_silence_ms = 1500

[chat]
instructions = ["You are Zefira, a kitchen assistant."]
"#,
    )
    .unwrap();

    let config = DialogConfig::from_file(&path).unwrap();
    assert_eq!(config.recognition.final_silence_ms, 1500);
    assert_eq!(config.recognition.partial_silence_ms, 5000);
    assert_eq!(config.recognition.idle_timeout_ms, 7000);
    assert_eq!(config.chat.max_round_trips, 10);
    assert_eq!(config.chat.fallback_tool(), Some("fallback_function"));
}

#[test]
fn zero_round_trips_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[chat]\nmax_round_trips = 0\n").unwrap();

    let result = DialogConfig::from_file(&path);
    assert!(matches!(result, Err(DialogError::Config(_))));
}

#[tokio::test]
async fn configured_instructions_and_tiers_reach_the_backend() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[chat]
instructions = ["You are Zefira.", "Answer in one sentence."]
web_search = true

[chat.standard]
model = "small"
temperature = 0.2

[chat.smarter]
model = "large"
"#,
    )
    .unwrap();
    let config = DialogConfig::from_file(&path).unwrap();

    let backend = Arc::new(ScriptedBackend::replies(vec![Reply::text("Hello!")]));
    let mut engine = QueryEngine::new(
        Arc::new(config),
        Arc::clone(&backend) as Arc<dyn zefira::llm::LlmBackend>,
        Arc::new(RecordingSink::default()),
    );
    engine.add_toolkit(Box::new(chat_manager())).unwrap();
    engine.start().await.unwrap();
    engine
        .query("hi", &CancellationToken::new(), &ProgressReporter::silent())
        .await
        .unwrap();

    let request = &backend.requests()[0];
    assert_eq!(
        request.instructions,
        "You are Zefira.\nAnswer in one sentence.\n\n\
         Current date and time: 2025-03-14T09:26:53, Friday"
    );
    assert!(request.web_search);
    assert_eq!(request.model.model.as_deref(), Some("small"));
    assert_eq!(request.model.temperature, Some(0.2));
}
