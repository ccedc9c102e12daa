//! Conversation state machine driven by a channel speech source on a
//! paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use zefira::config::DialogConfig;
use zefira::engine::ROUND_TRIP_LIMIT_NOTICE;
use zefira::llm::Reply;
use zefira::speech::ChannelSpeechSource;
use zefira::{ConversationCoordinator, ConversationState, QueryProgress, RecognitionUpdate};

use crate::helpers::{
    HookCounts, RecordingSink, ScriptedBackend, Step, last_user_text, unstarted_engine,
};

struct Conversation {
    coordinator: ConversationCoordinator,
    updates: mpsc::Sender<RecognitionUpdate>,
    backend: Arc<ScriptedBackend>,
    sink: Arc<RecordingSink>,
    counts: Arc<HookCounts>,
}

async fn conversation(backend: ScriptedBackend, config: DialogConfig) -> Conversation {
    let backend = Arc::new(backend);
    let sink = Arc::new(RecordingSink::default());
    let counts = Arc::new(HookCounts::default());
    let engine = unstarted_engine(&backend, &sink, &counts, config);
    let (source, updates) = ChannelSpeechSource::new(16);
    let mut coordinator = ConversationCoordinator::new(engine, Box::new(source));
    coordinator.start().await.unwrap();
    Conversation {
        coordinator,
        updates,
        backend,
        sink,
        counts,
    }
}

/// Send `(delay, update)` pairs from a background task, each delay counted
/// from the previous send.
fn speak(updates: &mpsc::Sender<RecognitionUpdate>, script: Vec<(u64, RecognitionUpdate)>) {
    let updates = updates.clone();
    tokio::spawn(async move {
        for (delay_secs, update) in script {
            sleep(Duration::from_secs(delay_secs)).await;
            if updates.send(update).await.is_err() {
                return;
            }
        }
    });
}

fn assert_elapsed(start: Instant, secs: u64) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_secs(secs) && elapsed < Duration::from_millis(secs * 1000 + 500),
        "expected about {secs}s, got {elapsed:?}"
    );
}

// ─── Silence timers ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn final_text_is_queried_once_after_silence() {
    let mut c = conversation(ScriptedBackend::default(), DialogConfig::default()).await;
    speak(
        &c.updates,
        vec![
            (0, RecognitionUpdate::partial("turn on")),
            (2, RecognitionUpdate::final_text("turn on the light")),
        ],
    );

    let start = Instant::now();
    let result = c.coordinator.run_round(None).await.unwrap();

    assert!(result.continue_conversation);
    assert_elapsed(start, 5);
    let requests = c.backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(last_user_text(&requests[0]), "turn on the light");
    assert_eq!(c.coordinator.state(), ConversationState::Waiting);
    assert_eq!(c.coordinator.engine().timeline().message_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn new_text_restarts_the_silence_timer() {
    let mut c = conversation(ScriptedBackend::default(), DialogConfig::default()).await;
    speak(
        &c.updates,
        vec![
            (0, RecognitionUpdate::final_text("turn on")),
            (2, RecognitionUpdate::partial("the light")),
            (2, RecognitionUpdate::final_text("the light")),
        ],
    );

    let start = Instant::now();
    c.coordinator.run_round(None).await.unwrap();

    assert_elapsed(start, 7);
    let requests = c.backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(last_user_text(&requests[0]), "turn on the light");
}

#[tokio::test(start_paused = true)]
async fn partial_text_alone_is_queried_after_longer_silence() {
    let mut c = conversation(ScriptedBackend::default(), DialogConfig::default()).await;
    speak(&c.updates, vec![(0, RecognitionUpdate::partial("what's the weather"))]);

    let start = Instant::now();
    c.coordinator.run_round(None).await.unwrap();

    assert_elapsed(start, 5);
    assert_eq!(
        last_user_text(&c.backend.requests()[0]),
        "what's the weather"
    );
}

#[tokio::test(start_paused = true)]
async fn idle_conversation_exits() {
    let mut c = conversation(ScriptedBackend::default(), DialogConfig::default()).await;

    let start = Instant::now();
    let result = c.coordinator.run_round(None).await.unwrap();

    assert!(!result.continue_conversation);
    assert_elapsed(start, 7);
    assert_eq!(c.backend.request_count(), 0);
    assert_eq!(c.coordinator.state(), ConversationState::Exit);
}

// ─── PreQuery and Query ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn speech_before_first_response_cancels_the_query() {
    let backend = ScriptedBackend::new(vec![
        Step::delayed(Reply::text("It is noon."), Duration::from_secs(2)),
        Step::delayed(Reply::text("It is noon."), Duration::from_secs(2)),
    ]);
    let mut c = conversation(backend, DialogConfig::default()).await;
    speak(
        &c.updates,
        vec![
            (0, RecognitionUpdate::final_text("what time")),
            (4, RecognitionUpdate::final_text("is it")),
        ],
    );

    let start = Instant::now();
    let result = c.coordinator.run_round(None).await.unwrap();

    assert!(result.continue_conversation);
    // query at 3s, cancelled at 4s, resubmitted at 7s, answered at 9s
    assert_elapsed(start, 9);
    let requests = c.backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(last_user_text(&requests[0]), "what time");
    assert_eq!(last_user_text(&requests[1]), "what time is it");
    assert_eq!(c.counts.aborts(), 1);
    assert_eq!(c.sink.texts(), vec!["It is noon."]);

    let timeline = c.coordinator.engine().timeline();
    assert_eq!(timeline.message_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn speech_during_answer_is_ignored() {
    let backend = ScriptedBackend::new(vec![Step::streaming(
        Reply::text("Playing music."),
        Duration::from_secs(2),
    )]);
    let mut c = conversation(backend, DialogConfig::default()).await;
    speak(
        &c.updates,
        vec![
            (0, RecognitionUpdate::final_text("play music")),
            (4, RecognitionUpdate::final_text("and dim the lights")),
        ],
    );

    let result = c.coordinator.run_round(None).await.unwrap();
    assert!(result.continue_conversation);
    assert_eq!(c.backend.request_count(), 1);
    assert_eq!(c.counts.aborts(), 0);

    // Nothing carried over: closing the source ends the next round.
    drop(c.updates);
    let result = c.coordinator.run_round(None).await.unwrap();
    assert!(!result.continue_conversation);
    assert_eq!(c.backend.request_count(), 1);
}

// ─── Ending ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn end_chat_ends_the_conversation() {
    let backend = ScriptedBackend::replies(vec![
        Reply::text("Goodbye!").with_call("c1", "end_chat", "{}"),
    ]);
    let mut c = conversation(backend, DialogConfig::default()).await;
    speak(&c.updates, vec![(0, RecognitionUpdate::final_text("bye"))]);

    c.coordinator.run().await.unwrap();

    assert_eq!(c.coordinator.state(), ConversationState::Exit);
    assert_eq!(c.backend.request_count(), 1);
    assert_eq!(
        c.sink.texts(),
        vec!["Goodbye!", "The assistant ended the conversation."]
    );
    assert!(!c.coordinator.engine().is_active());
}

#[tokio::test(start_paused = true)]
async fn closed_source_exits() {
    let mut c = conversation(ScriptedBackend::default(), DialogConfig::default()).await;
    speak(&c.updates, vec![(0, RecognitionUpdate::partial("turn"))]);
    drop(c.updates);

    let result = c.coordinator.run_round(None).await.unwrap();
    assert!(!result.continue_conversation);
    assert_eq!(c.backend.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_handle_ends_the_conversation() {
    let mut c = conversation(ScriptedBackend::default(), DialogConfig::default()).await;
    let stop = c.coordinator.stop_handle();
    tokio::spawn(async move {
        sleep(Duration::from_secs(1)).await;
        stop.cancel();
    });

    let start = Instant::now();
    c.coordinator.run().await.unwrap();
    assert_elapsed(start, 1);
    assert_eq!(c.coordinator.state(), ConversationState::Exit);
}

// ─── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failed_round_is_announced_and_listening_resumes() {
    let mut config = DialogConfig::default();
    config.chat.max_round_trips = 2;
    let backend =
        ScriptedBackend::repeating(Reply::default().with_call("c", "switch_light", r#"{"on": true}"#));
    let mut c = conversation(backend, config).await;
    speak(&c.updates, vec![(0, RecognitionUpdate::final_text("lights"))]);

    let result = c.coordinator.run_round(None).await.unwrap();

    assert!(result.continue_conversation);
    assert_eq!(c.coordinator.state(), ConversationState::Waiting);
    assert_eq!(c.sink.notices(), vec![ROUND_TRIP_LIMIT_NOTICE]);
    assert_eq!(c.counts.aborts(), 1);
    assert_eq!(c.coordinator.engine().timeline().message_count(), 0);
}

#[tokio::test]
async fn round_before_start_is_rejected() {
    let backend = Arc::new(ScriptedBackend::default());
    let sink = Arc::new(RecordingSink::default());
    let counts = Arc::new(HookCounts::default());
    let engine = unstarted_engine(&backend, &sink, &counts, DialogConfig::default());
    let (source, _updates) = ChannelSpeechSource::new(1);
    let mut coordinator = ConversationCoordinator::new(engine, Box::new(source));

    assert_eq!(coordinator.state(), ConversationState::Init);
    assert!(coordinator.run_round(None).await.is_err());
}

// ─── Progress ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn progress_callback_sees_the_round() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);

    let backend = Arc::new(ScriptedBackend::default());
    let sink = Arc::new(RecordingSink::default());
    let counts = Arc::new(HookCounts::default());
    let engine = unstarted_engine(&backend, &sink, &counts, DialogConfig::default());
    let (source, updates) = ChannelSpeechSource::new(4);
    let mut coordinator = ConversationCoordinator::new(engine, Box::new(source))
        .with_progress(Arc::new(move |p| record.lock().unwrap().push(p)));
    coordinator.start().await.unwrap();
    speak(&updates, vec![(0, RecognitionUpdate::final_text("hello"))]);

    coordinator.run_round(None).await.unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.first(), Some(&QueryProgress::Starting));
    assert_eq!(seen.last(), Some(&QueryProgress::Done));
    assert!(seen.contains(&QueryProgress::Receiving));
    assert_eq!(coordinator.engine().timeline().message_count(), 2);
}
