//! Summarization passes against a real SQLite store and a scripted model.

mod common;

use std::sync::Arc;

use serde_json::json;

use booktutor_core::agent::Summarizer;
use booktutor_core::repository::{
    ProgressRepository, SessionRepository, SettingsRepository, TurnCommit,
};
use booktutor_core::session::SessionState;
use booktutor_infra::sqlite::SqliteStore;
use booktutor_types::error::TutorError;
use booktutor_types::llm::MessageRole;
use booktutor_types::progress::ChapterStatus;
use booktutor_types::session::SessionKey;
use booktutor_types::summary::{SummaryStatus, SummaryTarget, SummaryTrigger};

use common::*;

async fn exchange(store: &SqliteStore, key: SessionKey, student: &str, reply: &str) -> i64 {
    store
        .commit_turn(&TurnCommit {
            key,
            client_message_id: None,
            student_text: student.to_string(),
            reply_text: reply.to_string(),
            evict_through: None,
        })
        .await
        .unwrap()
        .reply
        .id
}

async fn setup(
    provider: &ScriptedProvider,
    max_rounds: u32,
) -> (TestStore, Summarizer<SqliteStore>, SessionState) {
    let store = test_store().await;
    let key = seed(&store).await;
    let settings = store.get_settings().await.unwrap();
    let state = SessionState::load(store.as_ref(), key, settings).await.unwrap();
    let summarizer = Summarizer::new(
        store.clone(),
        Arc::new(provider.boxed()),
        retry(),
        summary_options(max_rounds),
    );
    (store, summarizer, state)
}

async fn reload(store: &Arc<SqliteStore>, state: &SessionState) -> SessionState {
    let settings = store.get_settings().await.unwrap();
    SessionState::load(store.as_ref(), state.key(), settings).await.unwrap()
}

#[tokio::test]
async fn pass_settles_all_records_and_advances_marker() {
    let provider = ScriptedProvider::new(vec![full_distillation(), reply("All saved.")]);
    let (store, summarizer, state) = setup(&provider, 3).await;
    let key = state.key();
    exchange(&store, key, "What is a variable?", "A named place for a value.").await;
    let last = exchange(&store, key, "And mut?", "It allows changes.").await;
    let mut state = reload(&store, &state).await;

    let status = summarizer.run(&mut state, SummaryTrigger::Explicit).await.unwrap();
    let SummaryStatus::Completed(report) = status else {
        panic!("expected a completed pass, got {status:?}");
    };

    assert_eq!(report.through_message_id, last);
    assert_eq!(report.messages, 4);
    assert_eq!(report.rounds, 1);
    assert_eq!(report.applied.len(), 4);
    assert!(report.skipped.is_empty());
    assert_eq!(provider.calls(), 1);

    let session = store.get_session(key).await.unwrap().unwrap();
    assert_eq!(session.last_summarized_message_id, Some(last));
    assert_eq!(session.notes, "Ada prefers short examples.");
    assert_eq!(state.session.last_summarized_message_id, Some(last));

    let plan = store.get_study_plan(key).await.unwrap().unwrap();
    assert_eq!(plan.progress_summary, "Working through chapter 1.");
    let progress = store.get_chapter_progress(key, &ch("1.")).await.unwrap().unwrap();
    assert_eq!(progress.status, ChapterStatus::InProgress);

    // Summarization keeps the window intact.
    assert_eq!(store.load_history(key).await.unwrap().len(), 4);

    // The transcript reached the model as a single user message.
    let request = &provider.requests()[0];
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].role, MessageRole::User);
    assert!(request.messages[0].content.contains("And mut?"));
    assert!(request.tools.iter().any(|t| t.name == "skip_update"));
}

#[tokio::test]
async fn nothing_new_makes_no_model_call() {
    let provider = ScriptedProvider::new(vec![full_distillation()]);
    let (_store, summarizer, mut state) = setup(&provider, 3).await;

    let status = summarizer.run(&mut state, SummaryTrigger::Interval).await.unwrap();
    assert!(matches!(status, SummaryStatus::NothingToSummarize));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn second_pass_only_sees_newer_messages() {
    let provider = ScriptedProvider::new(vec![full_distillation(), full_distillation()]);
    let (store, summarizer, state) = setup(&provider, 3).await;
    let key = state.key();
    exchange(&store, key, "first question", "first answer").await;
    let mut state = reload(&store, &state).await;
    summarizer.run(&mut state, SummaryTrigger::Explicit).await.unwrap();

    exchange(&store, key, "second question", "second answer").await;
    let mut state = reload(&store, &state).await;
    let status = summarizer.run(&mut state, SummaryTrigger::Explicit).await.unwrap();
    let SummaryStatus::Completed(report) = status else {
        panic!("expected a completed pass, got {status:?}");
    };
    assert_eq!(report.messages, 2);

    let transcript = &provider.requests()[1].messages[0].content;
    assert!(transcript.contains("second question"));
    assert!(!transcript.contains("first question"));
}

#[tokio::test]
async fn text_reply_gets_reminder_then_skips_settle() {
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![
            call(
                "s1",
                "set_chapter_progress",
                json!({"chapter_number": "1.", "status": 1, "objectives": "variables"}),
            ),
            call("s2", "update_overall_progress", json!({"summary_text": "Started."})),
        ]),
        reply("I think that's everything."),
        tool_calls(vec![
            call("s3", "skip_update", json!({"target": "study_plan", "reason": "unchanged"})),
            call("s4", "skip_update", json!({"target": "agent_memory", "reason": "nothing new"})),
        ]),
    ]);
    let (store, summarizer, state) = setup(&provider, 4).await;
    exchange(&store, state.key(), "Hi", "Hello!").await;
    let mut state = reload(&store, &state).await;

    let status = summarizer.run(&mut state, SummaryTrigger::Close).await.unwrap();
    let SummaryStatus::Completed(report) = status else {
        panic!("expected a completed pass, got {status:?}");
    };
    assert_eq!(report.rounds, 3);
    assert_eq!(
        report.skipped,
        vec![SummaryTarget::StudyPlan, SummaryTarget::AgentMemory]
    );

    // The third request carries the reminder naming what is still open.
    let requests = provider.requests();
    let reminder = requests[2].messages.last().unwrap();
    assert_eq!(reminder.role, MessageRole::User);
    assert!(reminder.content.contains("study_plan"));
    assert!(reminder.content.contains("agent_memory"));
    assert!(!reminder.content.contains("overall_progress"));
}

#[tokio::test]
async fn rejected_write_does_not_settle_its_record() {
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![
            call(
                "s1",
                "set_chapter_progress",
                json!({"chapter_number": "1.", "status": 7}),
            ),
            call("s2", "update_overall_progress", json!({"summary_text": "Started."})),
            call("s3", "update_study_plan", json!({"plan_text": "Chapter 1"})),
            call("s4", "update_agent_memory", json!({"notes_text": "Curious."})),
        ]),
        tool_calls(vec![call(
            "s5",
            "set_chapter_progress",
            json!({"chapter_number": "1.", "status": 1}),
        )]),
    ]);
    let (store, summarizer, state) = setup(&provider, 3).await;
    exchange(&store, state.key(), "Hi", "Hello!").await;
    let mut state = reload(&store, &state).await;

    let status = summarizer.run(&mut state, SummaryTrigger::Explicit).await.unwrap();
    let SummaryStatus::Completed(report) = status else {
        panic!("expected a completed pass, got {status:?}");
    };
    assert_eq!(report.rounds, 2);
    assert!(report.applied.contains(&SummaryTarget::ChapterProgress));
}

#[tokio::test]
async fn running_out_of_rounds_reports_pending_records() {
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![call(
            "s1",
            "update_overall_progress",
            json!({"summary_text": "Started."}),
        )]),
        reply("Done, I believe."),
    ]);
    let (store, summarizer, state) = setup(&provider, 2).await;
    let key = state.key();
    exchange(&store, key, "Hi", "Hello!").await;
    let mut state = reload(&store, &state).await;

    let err = summarizer
        .run(&mut state, SummaryTrigger::Explicit)
        .await
        .unwrap_err();
    let TutorError::SummaryIncomplete { pending } = err else {
        panic!("expected SummaryIncomplete, got {err:?}");
    };
    assert_eq!(pending, vec!["chapter_progress", "study_plan", "agent_memory"]);

    // The write that did happen stays, the marker does not move.
    let plan = store.get_study_plan(key).await.unwrap().unwrap();
    assert_eq!(plan.progress_summary, "Started.");
    let session = store.get_session(key).await.unwrap().unwrap();
    assert_eq!(session.last_summarized_message_id, None);
}

#[tokio::test]
async fn oversized_backlog_is_distilled_oldest_first() {
    let provider = ScriptedProvider::new(vec![full_distillation()]);
    let (store, summarizer, state) = setup(&provider, 3).await;
    let key = state.key();
    let mut settings = store.get_settings().await.unwrap();
    settings.token_budget = 4_000;
    store.update_settings(&settings).await.unwrap();

    let big = "x".repeat(4_000);
    for _ in 0..3 {
        exchange(&store, key, &big, &big).await;
    }
    let mut state = reload(&store, &state).await;

    let status = summarizer.run(&mut state, SummaryTrigger::BudgetPressure).await.unwrap();
    let SummaryStatus::Completed(report) = status else {
        panic!("expected a completed pass, got {status:?}");
    };
    assert!(report.messages < 6);
    let remaining = store
        .history_since(key, state.session.last_summarized_message_id)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 6 - report.messages);
}
