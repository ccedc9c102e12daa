//! Query engine rounds against a scripted backend: tool ordering, standing
//! messages, reverts, fallbacks and the round-trip cap.

use tokio_util::sync::CancellationToken;
use zefira::config::{DialogConfig, ModelOptions};
use zefira::engine::RoundState;
use zefira::llm::{LlmRequest, Message, MessageContent, ModelTier, Reply};
use zefira::timeline::TimelineEntry;
use zefira::{DialogError, ProgressReporter, RoundOutcome};

use crate::helpers::{ScriptedBackend, TestSession, session};

async fn ask(session: &mut TestSession, utterance: &str) -> zefira::Result<RoundOutcome> {
    session
        .engine
        .query(utterance, &CancellationToken::new(), &ProgressReporter::silent())
        .await
}

fn tool_names(request: &LlmRequest) -> Vec<&str> {
    request.tools.iter().map(|t| t.name.as_str()).collect()
}

fn tool_results(request: &LlmRequest) -> Vec<serde_json::Value> {
    request
        .messages
        .iter()
        .filter_map(|m| match &m.content {
            MessageContent::ToolResult { content, .. } => serde_json::from_str(content).ok(),
            MessageContent::Text { .. } => None,
        })
        .collect()
}

// ─── Tool registry ────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_request_lists_dynamic_tools_after_static_ones() {
    let mut s = session(ScriptedBackend::default(), DialogConfig::default()).await;
    ask(&mut s, "hello").await.unwrap();

    let requests = s.backend.requests();
    assert_eq!(
        tool_names(&requests[0]),
        vec![
            "end_chat",
            "set_intelligence",
            "debug_mark_chat",
            "switch_light",
            "unlock_scenes",
            "set_mood",
            "forget_that",
            "list_scenes",
        ]
    );
}

#[tokio::test]
async fn tool_order_is_stable_across_rounds() {
    let mut s = session(ScriptedBackend::default(), DialogConfig::default()).await;
    ask(&mut s, "hello").await.unwrap();
    ask(&mut s, "hello again").await.unwrap();

    let requests = s.backend.requests();
    assert_eq!(tool_names(&requests[0]), tool_names(&requests[1]));
}

#[tokio::test]
async fn unhidden_tool_is_offered_from_the_next_request() {
    let backend = ScriptedBackend::replies(vec![
        Reply::default().with_call("c1", "unlock_scenes", "{}"),
        Reply::text("You can edit scenes now."),
    ]);
    let mut s = session(backend, DialogConfig::default()).await;
    ask(&mut s, "let me edit scenes").await.unwrap();

    let requests = s.backend.requests();
    assert!(!tool_names(&requests[0]).contains(&"scene_editor"));
    assert_eq!(tool_names(&requests[1]).last(), Some(&"scene_editor"));
}

// ─── Standing messages ────────────────────────────────────────────────────────

#[tokio::test]
async fn standing_message_is_updated_in_place() {
    let backend = ScriptedBackend::replies(vec![
        Reply::default().with_call("c1", "set_mood", r#"{"mood": "excited"}"#),
        Reply::text("Great!"),
    ]);
    let mut s = session(backend, DialogConfig::default()).await;
    ask(&mut s, "I got the job!").await.unwrap();

    let requests = s.backend.requests();
    assert_eq!(
        requests[0].instructions,
        "The user seems calm.\n\nCurrent date and time: 2025-03-14T09:26:53, Friday"
    );
    assert!(requests[1].instructions.contains("The user seems excited."));
    assert!(!requests[1].instructions.contains("calm"));

    let moods = s
        .engine
        .timeline()
        .entries()
        .iter()
        .filter(|e| match e {
            TimelineEntry::Standing(m) => m.tag.as_deref() == Some("home::mood"),
            TimelineEntry::Message(_) => false,
        })
        .count();
    assert_eq!(moods, 1);
}

#[tokio::test]
async fn changed_standing_message_follows_the_conversation() {
    let backend = ScriptedBackend::replies(vec![
        Reply::text("Hi."),
        Reply::default().with_call("c1", "set_mood", r#"{"mood": "tired"}"#),
        Reply::text("Get some rest."),
    ]);
    let mut s = session(backend, DialogConfig::default()).await;
    ask(&mut s, "hello").await.unwrap();
    ask(&mut s, "long day").await.unwrap();

    let request = &s.backend.requests()[2];
    assert_eq!(
        request.instructions,
        "Current date and time: 2025-03-14T09:26:53, Friday"
    );
    assert_eq!(request.messages[0], Message::user("hello"));
    assert_eq!(request.messages[1], Message::assistant("Hi."));
    assert_eq!(
        request.messages[2],
        Message::developer("The user seems tired.")
    );
    assert_eq!(request.messages[3], Message::user("long day"));
}

#[tokio::test]
async fn empty_standing_message_is_not_sent_but_kept() {
    let backend = ScriptedBackend::replies(vec![
        Reply::default().with_call("c1", "set_mood", r#"{"mood": ""}"#),
        Reply::text("OK."),
    ]);
    let mut s = session(backend, DialogConfig::default()).await;
    ask(&mut s, "never mind my mood").await.unwrap();

    let request = &s.backend.requests()[1];
    assert!(!request.instructions.contains("seems"));
    assert!(
        request
            .messages
            .iter()
            .all(|m| !m.text_content().contains("seems"))
    );
    let mood = s.engine.timeline().standing("home::mood");
    assert!(mood.is_some_and(|m| m.content.is_empty()));
}

#[tokio::test]
async fn assembling_twice_gives_the_same_request() {
    let mut s = session(ScriptedBackend::default(), DialogConfig::default()).await;
    ask(&mut s, "hello").await.unwrap();

    let round = RoundState::new("and again");
    let first = s.engine.build_request(&round);
    let second = s.engine.build_request(&round);
    assert_eq!(first, second);
}

// ─── Reverts ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn revert_query_leaves_timeline_untouched() {
    let backend = ScriptedBackend::replies(vec![
        Reply::text("Hi."),
        Reply::text("Sure, forgetting.").with_call("c1", "forget_that", "{}"),
    ]);
    let mut s = session(backend, DialogConfig::default()).await;
    ask(&mut s, "hello").await.unwrap();
    let before = s.engine.timeline().len();

    let outcome = ask(&mut s, "forget what I said").await.unwrap();
    assert_eq!(outcome, RoundOutcome::Reverted);
    assert!(outcome.continue_conversation());
    assert!(s.engine.is_active());
    assert_eq!(s.engine.timeline().len(), before);
    assert_eq!(s.engine.timeline().message_count(), 2);
}

#[tokio::test]
async fn end_chat_reverts_and_stops_the_session() {
    let backend = ScriptedBackend::replies(vec![
        Reply::text("Goodbye!").with_call("c1", "end_chat", "{}"),
    ]);
    let mut s = session(backend, DialogConfig::default()).await;

    let outcome = ask(&mut s, "bye").await.unwrap();
    assert_eq!(outcome, RoundOutcome::Ended);
    assert!(!outcome.continue_conversation());
    assert!(!s.engine.is_active());
    assert_eq!(s.engine.timeline().message_count(), 0);
    assert!(
        s.sink
            .notices()
            .contains(&"The assistant ended the conversation.".to_owned())
    );
}

#[tokio::test]
async fn revert_response_repeats_the_request_on_the_smarter_tier() {
    let mut config = DialogConfig::default();
    config.chat.smarter = Some(ModelOptions {
        model: Some("large".into()),
        ..ModelOptions::default()
    });
    let backend = ScriptedBackend::replies(vec![
        Reply::default().with_call("c1", "set_intelligence", r#"{"intelligent": true}"#),
        Reply::text("Let me think about that carefully."),
    ]);
    let mut s = session(backend, config).await;

    let outcome = ask(&mut s, "prove it").await.unwrap();
    assert_eq!(outcome, RoundOutcome::Committed);

    let requests = s.backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tier, ModelTier::Standard);
    assert_eq!(requests[1].tier, ModelTier::Smarter);
    assert_eq!(requests[1].model.model.as_deref(), Some("large"));

    let mut replayed = requests[1].clone();
    replayed.tier = requests[0].tier;
    replayed.model = requests[0].model.clone();
    assert_eq!(replayed, requests[0]);
    assert_eq!(s.engine.timeline().message_count(), 2);
}

// ─── Dispatch ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_function_is_handled_by_the_fallback() {
    let backend = ScriptedBackend::replies(vec![
        Reply::default().with_call("c1", "open_garage", "{}"),
        Reply::text("I can't open the garage."),
    ]);
    let mut s = session(backend, DialogConfig::default()).await;
    ask(&mut s, "open the garage").await.unwrap();

    let results = tool_results(&s.backend.requests()[1]);
    assert_eq!(
        results,
        vec![serde_json::json!({"status": "error", "message": "Unknown function called"})]
    );
    assert!(
        s.sink
            .notices()
            .contains(&"The assistant called an unknown function.".to_owned())
    );
}

#[tokio::test]
async fn invalid_arguments_become_a_structured_error() {
    let backend = ScriptedBackend::replies(vec![
        Reply::default().with_call("c1", "switch_light", r#"{"on": 1}"#),
        Reply::text("Oops."),
    ]);
    let mut s = session(backend, DialogConfig::default()).await;
    ask(&mut s, "light").await.unwrap();

    assert!(s.counts.calls().is_empty());
    let results = tool_results(&s.backend.requests()[1]);
    assert_eq!(results[0]["status"], "error");
    assert!(
        results[0]["message"]
            .as_str()
            .is_some_and(|m| m.starts_with("Invalid arguments: "))
    );
}

#[tokio::test]
async fn tool_results_are_returned_in_reply_order() {
    let backend = ScriptedBackend::replies(vec![
        Reply::default()
            .with_call("c1", "switch_light", r#"{"on": true}"#)
            .with_call("c2", "list_scenes", "{}"),
        Reply::text("Light is on. Scenes: evening, movie."),
    ]);
    let mut s = session(backend, DialogConfig::default()).await;
    let outcome = ask(&mut s, "light on and list scenes").await.unwrap();

    assert_eq!(outcome, RoundOutcome::Committed);
    assert_eq!(s.counts.calls(), vec!["switch_light", "list_scenes"]);
    let ids: Vec<String> = s.backend.requests()[1]
        .messages
        .iter()
        .filter_map(|m| match &m.content {
            MessageContent::ToolResult { call_id, .. } => Some(call_id.clone()),
            MessageContent::Text { .. } => None,
        })
        .collect();
    assert_eq!(ids, vec!["c1", "c2"]);
    // user, assistant with calls, two results, final answer
    assert_eq!(s.engine.timeline().message_count(), 5);
}

// ─── Limits ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn round_trip_cap_fails_and_aborts_each_toolkit_once() {
    let mut config = DialogConfig::default();
    config.chat.max_round_trips = 4;
    let backend =
        ScriptedBackend::repeating(Reply::default().with_call("c", "switch_light", r#"{"on": true}"#));
    let mut s = session(backend, config).await;

    let result = ask(&mut s, "keep switching").await;
    assert!(matches!(result, Err(DialogError::RoundTripLimit(4))));
    assert_eq!(s.backend.request_count(), 4);
    assert_eq!(s.counts.aborts(), 1);
    assert_eq!(s.engine.timeline().message_count(), 0);
}
