//! Shared fixtures for the engine integration tests: a temporary SQLite store,
//! a seeded session and a scripted LLM provider.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::Notify;

use booktutor_core::agent::{SummaryOptions, TurnOptions};
use booktutor_core::llm::box_provider::BoxLlmProvider;
use booktutor_core::llm::provider::LlmProvider;
use booktutor_core::llm::retry::RetryPolicy;
use booktutor_core::repository::{
    LibraryRepository, SessionRepository, SettingsRepository, StudentRepository,
};
use booktutor_core::session::EngineOptions;
use booktutor_infra::sqlite::SqliteStore;
use booktutor_types::book::{BookImport, ChapterImport, ChapterNumber};
use booktutor_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, StopReason, ToolCall,
    Usage,
};
use booktutor_types::session::SessionKey;
use booktutor_types::settings::AgentSettings;

// ---------------------------------------------------------------------------
// Store fixtures
// ---------------------------------------------------------------------------

/// A store on a database file that is removed with the value.
pub struct TestStore {
    store: Arc<SqliteStore>,
    _dir: TempDir,
}

impl Deref for TestStore {
    type Target = Arc<SqliteStore>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

pub async fn test_store() -> TestStore {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    let store = Arc::new(SqliteStore::connect(&url).await.unwrap());
    TestStore { store, _dir: dir }
}

fn chapter(number: &str, name: &str) -> ChapterImport {
    ChapterImport {
        chapter_number: ChapterNumber::parse(number).unwrap(),
        name: name.to_string(),
        summary: format!("{name} explained."),
        key_points: vec![format!("{name} matters")],
    }
}

/// Import a book, create a student and enroll them. Auto-save is disabled so
/// background passes never consume scripted responses.
pub async fn seed(store: &SqliteStore) -> SessionKey {
    store
        .update_settings(&AgentSettings {
            auto_save_secs: None,
            ..AgentSettings::default()
        })
        .await
        .unwrap();
    let book = store
        .import_book(&BookImport {
            title: "Rust in Depth".to_string(),
            author: "A. Writer".to_string(),
            path: String::new(),
            summary: Some("Systems programming with Rust.".to_string()),
            description: None,
            chapters: vec![
                chapter("1.", "Basics"),
                chapter("2.", "Ownership"),
                chapter("3.", "Traits"),
            ],
        })
        .await
        .unwrap();
    let student = store.create_student("Ada", None).await.unwrap();
    let key = SessionKey::new(book.id, student.id);
    store.enroll(key).await.unwrap();
    key
}

pub fn ch(number: &str) -> ChapterNumber {
    ChapterNumber::parse(number).unwrap()
}

// ---------------------------------------------------------------------------
// Scripted provider
// ---------------------------------------------------------------------------

pub fn reply(text: &str) -> Result<CompletionResponse, LlmError> {
    Ok(CompletionResponse {
        id: "resp".to_string(),
        content: text.to_string(),
        tool_calls: Vec::new(),
        model: "scripted".to_string(),
        stop_reason: StopReason::EndTurn,
        usage: Usage::default(),
    })
}

pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

pub fn tool_calls(calls: Vec<ToolCall>) -> Result<CompletionResponse, LlmError> {
    Ok(CompletionResponse {
        id: "resp".to_string(),
        content: String::new(),
        tool_calls: calls,
        model: "scripted".to_string(),
        stop_reason: StopReason::ToolUse,
        usage: Usage::default(),
    })
}

/// The four summarization writes in one response.
pub fn full_distillation() -> Result<CompletionResponse, LlmError> {
    tool_calls(vec![
        call(
            "s1",
            "set_chapter_progress",
            serde_json::json!({"chapter_number": "1.", "status": 1, "objectives": "variables"}),
        ),
        call(
            "s2",
            "update_overall_progress",
            serde_json::json!({"summary_text": "Working through chapter 1."}),
        ),
        call(
            "s3",
            "update_study_plan",
            serde_json::json!({"plan_text": "1. Basics\n2. Ownership"}),
        ),
        call(
            "s4",
            "update_agent_memory",
            serde_json::json!({"notes_text": "Ada prefers short examples."}),
        ),
    ])
}

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<Result<CompletionResponse, LlmError>>,
    requests: Vec<CompletionRequest>,
}

struct ScriptInner {
    state: Mutex<ScriptState>,
    /// When set, every call waits for `release` after signalling `entered`.
    gated: bool,
    entered: Notify,
    release: Notify,
}

/// Provider that plays back a fixed list of responses and records requests.
#[derive(Clone)]
pub struct ScriptedProvider {
    inner: Arc<ScriptInner>,
    capabilities: ProviderCapabilities,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<CompletionResponse, LlmError>>) -> Self {
        Self::build(responses, false)
    }

    /// A provider whose calls block until [`ScriptedProvider::release`].
    pub fn gated(responses: Vec<Result<CompletionResponse, LlmError>>) -> Self {
        Self::build(responses, true)
    }

    fn build(responses: Vec<Result<CompletionResponse, LlmError>>, gated: bool) -> Self {
        Self {
            inner: Arc::new(ScriptInner {
                state: Mutex::new(ScriptState {
                    responses: responses.into(),
                    requests: Vec::new(),
                }),
                gated,
                entered: Notify::new(),
                release: Notify::new(),
            }),
            capabilities: ProviderCapabilities {
                tool_calling: true,
                max_context_tokens: 128_000,
                max_output_tokens: 4_096,
            },
        }
    }

    pub fn boxed(&self) -> BoxLlmProvider {
        BoxLlmProvider::new(self.clone())
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.inner.state.lock().unwrap().requests.clone()
    }

    pub fn calls(&self) -> usize {
        self.inner.state.lock().unwrap().requests.len()
    }

    pub fn remaining(&self) -> usize {
        self.inner.state.lock().unwrap().responses.len()
    }

    pub async fn wait_entered(&self) {
        self.inner.entered.notified().await;
    }

    pub fn release(&self) {
        self.inner.release.notify_one();
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let next = {
            let mut state = self.inner.state.lock().unwrap();
            state.requests.push(request.clone());
            state.responses.pop_front()
        };
        if self.inner.gated {
            self.inner.entered.notify_one();
            self.inner.release.notified().await;
        }
        next.unwrap_or_else(|| Err(LlmError::InvalidRequest("script exhausted".to_string())))
    }
}

// ---------------------------------------------------------------------------
// Engine options
// ---------------------------------------------------------------------------

pub fn retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        call_timeout: Duration::from_secs(10),
    }
}

pub fn turn_options(max_tool_rounds: u32) -> TurnOptions {
    TurnOptions {
        max_tool_rounds,
        max_reply_tokens: 512,
        temperature: None,
    }
}

pub fn summary_options(max_rounds: u32) -> SummaryOptions {
    SummaryOptions {
        max_rounds,
        max_reply_tokens: 512,
        temperature: None,
    }
}

pub fn engine_options() -> EngineOptions {
    EngineOptions {
        turn: turn_options(4),
        summary: summary_options(3),
        retry: retry(),
        idle_timeout: Duration::from_secs(1_800),
        janitor_interval: Duration::from_secs(60),
    }
}
