// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! End-to-end flow tests
//!
//! Wire the session runner, the shared reasoning timer, and the
//! persistence engine together the way the control panel does, and
//! check what actually lands in the store.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use modeldeck::chat::{ContentPart, Conversation, Message, Role};
use modeldeck::error::ApiError;
use modeldeck::persist::{ChatStore, MemoryStore, PersistenceEngine, WriteRecord};
use modeldeck::session::{
    ChatRequest, InferenceClient, LoopState, MessageSink, SessionRunner, StreamEvent,
};
use modeldeck::thinking::{ManualClock, ReasoningTimer};
use modeldeck::tools::{ToolDefinition, ToolExecutor, ToolOutcome, ToolRegistry};
use modeldeck::{DeckError, Result};

type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Streams a reasoned answer, advancing a manual clock by 300 ms
/// between the reasoning and the visible content
struct TimedReasoningClient {
    clock: ManualClock,
}

#[async_trait]
impl InferenceClient for TimedReasoningClient {
    async fn stream_chat(
        &self,
        _request: ChatRequest,
        _cancel: CancellationToken,
    ) -> Result<EventStream> {
        let clock = self.clock.clone();
        Ok(Box::pin(async_stream::stream! {
            yield Ok(StreamEvent::ReasoningDelta("compute".to_string()));
            clock.advance(Duration::from_millis(300));
            yield Ok(StreamEvent::TextDelta("4".to_string()));
            yield Ok(StreamEvent::Done);
        }))
    }
}

/// Plays one scripted event list per call
struct SequenceClient {
    scripts: Mutex<VecDeque<Vec<Result<StreamEvent>>>>,
}

impl SequenceClient {
    fn new(scripts: Vec<Vec<Result<StreamEvent>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
        }
    }
}

#[async_trait]
impl InferenceClient for SequenceClient {
    async fn stream_chat(
        &self,
        _request: ChatRequest,
        _cancel: CancellationToken,
    ) -> Result<EventStream> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![Ok(StreamEvent::Done)]);
        Ok(Box::pin(futures::stream::iter(script)))
    }
}

struct EchoExecutor;

#[async_trait]
impl ToolExecutor for EchoExecutor {
    async fn execute(&self, args: serde_json::Value) -> ToolOutcome {
        ToolOutcome::success(args)
    }
}

/// Forwards every runner-side message change to the persistence engine,
/// as the UI message store does
struct PersistingSink {
    engine: Arc<PersistenceEngine>,
}

impl MessageSink for PersistingSink {
    fn append(&self, message: &Message) {
        self.engine.reconcile(message);
    }

    fn update(&self, message: &Message) {
        self.engine.reconcile(message);
    }

    fn set_running(&self, _running: bool) {}
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Let debounce timers and detached writes run to completion under
/// paused time
async fn settle() {
    tokio::time::sleep(Duration::from_secs(60)).await;
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

fn shared_timer(clock: &ManualClock) -> Arc<Mutex<ReasoningTimer>> {
    Arc::new(Mutex::new(ReasoningTimer::with_clock(Box::new(
        clock.clone(),
    ))))
}

fn engine_for(store: &Arc<MemoryStore>, timer: &Arc<Mutex<ReasoningTimer>>) -> Arc<PersistenceEngine> {
    let engine = Arc::new(
        PersistenceEngine::new(Arc::clone(store) as Arc<dyn ChatStore>)
            .with_timer(Arc::clone(timer)),
    );
    engine.switch_conversation(1);
    engine
}

// ===== Reasoned answer, single write =====

#[tokio::test(start_paused = true)]
async fn test_reasoned_answer_stored_with_duration_in_one_write() {
    init_tracing();
    let clock = ManualClock::new();
    let timer = shared_timer(&clock);
    let store = Arc::new(MemoryStore::new());
    let engine = engine_for(&store, &timer);

    let client = Arc::new(TimedReasoningClient { clock });
    let runner = SessionRunner::new(client, "qwen3-4b").with_timer(Arc::clone(&timer));

    let mut conversation = Conversation::new(1, "Quick math").with_system("You are terse.");
    let mut user = Message::user("2+2?");
    user.finalize();
    engine.reconcile(&user);
    conversation.push(user);

    let sink = PersistingSink {
        engine: Arc::clone(&engine),
    };
    let outcome = runner
        .run(
            &mut conversation,
            &ToolRegistry::new(),
            &sink,
            CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome.state, LoopState::Done);
    settle().await;

    // The whole streaming burst collapsed into one insert per message
    let log = store.write_log();
    assert_eq!(log.len(), 2);
    assert!(log
        .iter()
        .all(|w| matches!(w, WriteRecord::Insert { .. })));

    let rows = store.messages(1).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].role, "user");
    assert_eq!(rows[0].text, "2+2?");
    assert_eq!(rows[1].role, "assistant");
    assert_eq!(rows[1].text, "<think duration=\"0.3\">\ncompute\n</think>\n\n4");
}

// ===== Tool round persisted per iteration =====

#[tokio::test(start_paused = true)]
async fn test_tool_round_persists_one_row_per_iteration() {
    init_tracing();
    let clock = ManualClock::new();
    let timer = shared_timer(&clock);
    let store = Arc::new(MemoryStore::new());
    let engine = engine_for(&store, &timer);

    let client = Arc::new(SequenceClient::new(vec![
        vec![
            Ok(StreamEvent::ToolCall {
                id: "call-1".to_string(),
                name: "echo".to_string(),
                args: serde_json::json!({"n": 1}),
            }),
            Ok(StreamEvent::Done),
        ],
        vec![
            Ok(StreamEvent::TextDelta("done".to_string())),
            Ok(StreamEvent::Done),
        ],
    ]));
    let runner = SessionRunner::new(client, "m").with_timer(Arc::clone(&timer));

    let mut registry = ToolRegistry::new();
    registry
        .register("test", ToolDefinition::new("echo", "echoes"), Arc::new(EchoExecutor))
        .unwrap();
    registry.enable("echo");

    let mut conversation = Conversation::new(1, "t");
    let mut user = Message::user("go");
    user.finalize();
    engine.reconcile(&user);
    conversation.push(user);

    let sink = PersistingSink {
        engine: Arc::clone(&engine),
    };
    let outcome = runner
        .run(&mut conversation, &registry, &sink, CancellationToken::new())
        .await;
    assert_eq!(outcome.state, LoopState::Done);
    settle().await;

    let rows = store.messages(1).await.unwrap();
    assert_eq!(rows.len(), 3);

    // A tool-call-only iteration persists through its structured parts
    assert_eq!(rows[1].text, "");
    assert_eq!(rows[1].parts.len(), 1);
    let ContentPart::ToolCall {
        name,
        result,
        is_error,
        ..
    } = &rows[1].parts[0]
    else {
        panic!("expected tool call part");
    };
    assert_eq!(name, "echo");
    assert_eq!(result, &Some(serde_json::json!({"n": 1})));
    assert!(!is_error);

    assert_eq!(rows[2].text, "done");

    // Hydration round trip restores the tool call intact
    let hydrated = engine.hydrate(1).await.unwrap();
    assert_eq!(hydrated.len(), 3);
    assert_eq!(hydrated[1].role, Role::Assistant);
    assert!(hydrated[1].has_tool_calls());
    assert!(hydrated.iter().all(|m| m.meta.finalized));
}

// ===== Cancellation keeps partial content =====

#[tokio::test(start_paused = true)]
async fn test_cancelled_stream_stores_partial_with_stopped_marker() {
    init_tracing();
    let clock = ManualClock::new();
    let timer = shared_timer(&clock);
    let store = Arc::new(MemoryStore::new());
    let engine = engine_for(&store, &timer);

    let client = Arc::new(SequenceClient::new(vec![vec![
        Ok(StreamEvent::TextDelta("partial answ".to_string())),
        Err(DeckError::Api(ApiError::Cancelled)),
    ]]));
    let runner = SessionRunner::new(client, "m").with_timer(Arc::clone(&timer));

    let mut conversation = Conversation::new(1, "t");
    conversation.push(Message::user("go"));

    let sink = PersistingSink {
        engine: Arc::clone(&engine),
    };
    let outcome = runner
        .run(
            &mut conversation,
            &ToolRegistry::new(),
            &sink,
            CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome.state, LoopState::Cancelled);
    settle().await;

    let rows = store.messages(1).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text, "partial answ\n\n[Stopped]");
}
