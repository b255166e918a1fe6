//! Session supervisor: coalescing, eviction and the summarization triggers.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use booktutor_core::agent::StudentInput;
use booktutor_core::llm::box_provider::BoxLlmProvider;
use booktutor_core::llm::provider::LlmProvider;
use booktutor_core::repository::{SessionRepository, SettingsRepository, TurnCommit};
use booktutor_core::session::{EngineOptions, SessionSupervisor};
use booktutor_infra::sqlite::SqliteStore;
use booktutor_types::error::TutorError;
use booktutor_types::llm::{CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities};
use booktutor_types::session::SessionKey;
use booktutor_types::summary::{SummaryStatus, SummaryTrigger};

use common::*;

fn supervisor(
    store: &Arc<SqliteStore>,
    provider: &ScriptedProvider,
    options: EngineOptions,
) -> SessionSupervisor<SqliteStore> {
    SessionSupervisor::new(store.clone(), provider.boxed(), options)
}

async fn exchange(store: &SqliteStore, key: SessionKey, student: &str, reply: &str) {
    store
        .commit_turn(&TurnCommit {
            key,
            client_message_id: None,
            student_text: student.to_string(),
            reply_text: reply.to_string(),
            evict_through: None,
        })
        .await
        .unwrap();
}

/// Answers every tutor call with the same reply after a short pause and
/// records how many calls ever overlapped. Summarization calls get a full
/// distillation.
#[derive(Clone)]
struct PacedTutor {
    reply: String,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    capabilities: ProviderCapabilities,
}

impl PacedTutor {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            capabilities: ProviderCapabilities {
                tool_calling: true,
                max_context_tokens: 128_000,
                max_output_tokens: 4_096,
            },
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl LlmProvider for PacedTutor {
    fn name(&self) -> &str {
        "paced"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if request.tools.iter().any(|t| t.name == "skip_update") {
            full_distillation()
        } else {
            reply(&self.reply)
        }
    }
}

async fn wait_for_summary(store: &SqliteStore, key: SessionKey) -> i64 {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let session = store.get_session(key).await.unwrap().unwrap();
            if let Some(id) = session.last_summarized_message_id {
                return id;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn open_reports_the_session() {
    let store = test_store().await;
    let key = seed(&store).await;
    exchange(&store, key, "Hi", "Hello!").await;
    let provider = ScriptedProvider::new(vec![]);
    let engine = supervisor(&store, &provider, engine_options());

    let overview = engine.open(key).await.unwrap();
    assert_eq!(overview.book_title, "Rust in Depth");
    assert_eq!(overview.student_name, "Ada");
    assert_eq!(overview.window_messages, 2);
    assert_eq!(overview.unsummarized_messages, 2);
    assert!(engine.is_live(key));
}

#[tokio::test]
async fn open_without_enrollment_fails() {
    let store = test_store().await;
    let key = seed(&store).await;
    store.unenroll(key).await.unwrap();
    let provider = ScriptedProvider::new(vec![]);
    let engine = supervisor(&store, &provider, engine_options());

    let err = engine.open(key).await.unwrap_err();
    assert!(matches!(err, TutorError::NotEnrolled(k) if k == key));
    assert!(!engine.is_live(key));
}

#[tokio::test]
async fn send_runs_a_turn_and_keeps_the_session_live() {
    let store = test_store().await;
    let key = seed(&store).await;
    let provider = ScriptedProvider::new(vec![reply("Welcome!")]);
    let engine = supervisor(&store, &provider, engine_options());

    let outcome = engine
        .send(key, StudentInput::new("Hello"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.reply, "Welcome!");
    assert!(outcome.budget_warning.is_none());
    assert_eq!(engine.live_sessions(), vec![key]);
    assert_eq!(store.load_history(key).await.unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_summarization_requests_are_coalesced() {
    let store = test_store().await;
    let key = seed(&store).await;
    exchange(&store, key, "What is a trait?", "A set of shared behaviour.").await;
    let provider = ScriptedProvider::gated(vec![full_distillation()]);
    let engine = supervisor(&store, &provider, engine_options());
    engine.open(key).await.unwrap();

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.summarize(key, SummaryTrigger::Explicit).await })
    };
    provider.wait_entered().await;

    let second = engine.summarize(key, SummaryTrigger::Interval).await.unwrap();
    assert!(matches!(second, SummaryStatus::Coalesced));

    provider.release();
    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, SummaryStatus::Completed(_)));
    assert_eq!(provider.calls(), 1);

    // Nothing new since the completed pass.
    let third = engine.summarize(key, SummaryTrigger::Explicit).await.unwrap();
    assert!(matches!(third, SummaryStatus::NothingToSummarize));
}

#[tokio::test]
async fn close_summarizes_and_drops_the_session() {
    let store = test_store().await;
    let key = seed(&store).await;
    let provider = ScriptedProvider::new(vec![reply("Hi Ada."), full_distillation()]);
    let engine = supervisor(&store, &provider, engine_options());

    engine
        .send(key, StudentInput::new("Hi"), &CancellationToken::new())
        .await
        .unwrap();
    let status = engine.close(key).await.unwrap();
    assert!(matches!(status, Some(SummaryStatus::Completed(_))));
    assert!(!engine.is_live(key));

    let session = store.get_session(key).await.unwrap().unwrap();
    assert!(session.last_summarized_message_id.is_some());

    // Closing a session that is not live is a no-op.
    assert!(engine.close(key).await.unwrap().is_none());
}

#[tokio::test]
async fn idle_sessions_are_evicted_and_reload_on_access() {
    let store = test_store().await;
    let key = seed(&store).await;
    let provider = ScriptedProvider::new(vec![reply("Back again.")]);
    let options = EngineOptions {
        idle_timeout: Duration::ZERO,
        ..engine_options()
    };
    let engine = supervisor(&store, &provider, options);

    engine.open(key).await.unwrap();
    let evicted = engine.evict_idle().await;
    assert_eq!(evicted, vec![key]);
    assert!(!engine.is_live(key));
    // Empty window: the close pass had nothing to do.
    assert_eq!(provider.calls(), 0);

    engine
        .send(key, StudentInput::new("Hello again"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(engine.is_live(key));
}

#[tokio::test]
async fn unsummarized_messages_are_distilled_before_eviction() {
    let store = test_store().await;
    let key = seed(&store).await;
    let mut settings = store.get_settings().await.unwrap();
    settings.token_budget = 4_000;
    store.update_settings(&settings).await.unwrap();

    let big = "x".repeat(4_000);
    for _ in 0..3 {
        exchange(&store, key, &big, &big).await;
    }

    let mut script: Vec<_> = (0..6).map(|_| full_distillation()).collect();
    script.push(reply("Let's continue."));
    // Spare responses for a possible budget-pressure pass after the turn.
    script.extend((0..6).map(|_| full_distillation()));
    let provider = ScriptedProvider::new(script);
    let engine = supervisor(&store, &provider, engine_options());

    let outcome = engine
        .send(key, StudentInput::new("Where were we?"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.reply, "Let's continue.");
    assert!(outcome.evicted > 0);

    let requests = provider.requests();
    assert!(requests[0].tools.iter().any(|t| t.name == "skip_update"));

    // Everything evicted had been distilled first.
    let session = store.get_session(key).await.unwrap().unwrap();
    let history = store.load_history(key).await.unwrap();
    let oldest_kept = history.first().unwrap().id;
    assert!(session.last_summarized_message_id.unwrap() >= oldest_kept - 1);
}

#[tokio::test]
async fn sends_racing_a_close_run_one_at_a_time() {
    let store = test_store().await;
    let key = seed(&store).await;
    let provider = PacedTutor::new("Noted.");
    let engine = SessionSupervisor::new(
        store.clone(),
        BoxLlmProvider::new(provider.clone()),
        engine_options(),
    );
    engine.open(key).await.unwrap();

    let send = |text: &'static str| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .send(key, StudentInput::new(text), &CancellationToken::new())
                .await
        })
    };

    let first = send("First question");
    tokio::time::sleep(Duration::from_millis(5)).await;
    let close = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.close(key).await })
    };
    let second = send("Second question");
    let third = send("Third question");

    for task in [first, second, third] {
        task.await.unwrap().unwrap();
    }
    close.await.unwrap().unwrap();
    send("Fourth question").await.unwrap().unwrap();

    assert_eq!(provider.peak(), 1);
    assert_eq!(store.load_history(key).await.unwrap().len(), 8);
}

#[tokio::test]
async fn deferred_eviction_schedules_a_summary() {
    let store = test_store().await;
    let key = seed(&store).await;
    let mut settings = store.get_settings().await.unwrap();
    settings.token_budget = 4_000;
    store.update_settings(&settings).await.unwrap();
    let big = "x".repeat(4_000);
    exchange(&store, key, &big, &big).await;

    let provider = PacedTutor::new(&"y".repeat(9_000));
    let engine = SessionSupervisor::new(
        store.clone(),
        BoxLlmProvider::new(provider.clone()),
        engine_options(),
    );

    let outcome = engine
        .send(key, StudentInput::new("Go on"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.eviction_deferred);
    assert_eq!(outcome.evicted, 0);
    assert_eq!(store.load_history(key).await.unwrap().len(), 4);

    let oldest = store.load_history(key).await.unwrap()[0].id;
    assert!(wait_for_summary(&store, key).await >= oldest);
}

#[tokio::test]
async fn over_budget_turn_warns_and_summarizes_in_the_background() {
    let store = test_store().await;
    let key = seed(&store).await;
    let mut settings = store.get_settings().await.unwrap();
    settings.token_budget = 1_000;
    store.update_settings(&settings).await.unwrap();

    let provider = ScriptedProvider::gated(vec![reply("That is a lot at once."), full_distillation()]);
    let engine = supervisor(&store, &provider, engine_options());

    let turn = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .send(key, StudentInput::new("z".repeat(5_000)), &CancellationToken::new())
                .await
        })
    };
    provider.wait_entered().await;
    provider.release();
    let outcome = turn.await.unwrap().unwrap();

    let warning = outcome.budget_warning.unwrap();
    assert_eq!(warning.budget, 1_000);
    assert!(warning.required_tokens > 1_000);

    // The budget-pressure pass is now waiting on the model.
    provider.wait_entered().await;
    let explicit = engine.summarize(key, SummaryTrigger::Explicit).await.unwrap();
    assert!(matches!(explicit, SummaryStatus::Coalesced));

    provider.release();
    wait_for_summary(&store, key).await;
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn shutdown_closes_every_session() {
    let store = test_store().await;
    let key = seed(&store).await;
    let provider = ScriptedProvider::new(vec![]);
    let engine = supervisor(&store, &provider, engine_options());
    let janitor = engine.spawn_janitor();

    engine.open(key).await.unwrap();
    engine.shutdown().await;

    assert!(engine.live_sessions().is_empty());
    tokio::time::timeout(Duration::from_secs(5), janitor)
        .await
        .unwrap()
        .unwrap();
}
