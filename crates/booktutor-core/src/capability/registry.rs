//! Capability registry: the functions the model may call, their schemas, and
//! their execution against the store.
//!
//! A call either produces a result or a [`CapabilityError`]; both are handed
//! back to the model as the tool result. Only store failures escape as
//! [`TutorError::Store`] and abort the caller's turn. Every write is its own
//! transaction.

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use booktutor_types::book::ChapterNumber;
use booktutor_types::error::{CapabilityError, RepositoryError, TutorError};
use booktutor_types::llm::{ToolCall, ToolDefinition};
use booktutor_types::progress::ChapterStatus;
use booktutor_types::session::SessionKey;
use booktutor_types::summary::SummaryTarget;

use super::args::{
    BookArgs, ChapterArgs, SessionArgs, SetChapterProgressArgs, SetCurrentChapterArgs,
    SkipUpdateArgs, UpdateAgentMemoryArgs, UpdateOverallProgressArgs, UpdateStudyPlanArgs,
};
use crate::repository::TutorStore;

// ---------------------------------------------------------------------------
// Capability catalogue
// ---------------------------------------------------------------------------

/// Where a capability is being offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityMode {
    /// Inline during a conversation turn.
    Conversation,
    /// During a summarization pass.
    Summarization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    GetTableOfContents,
    GetChapterSummary,
    GetStudentPlan,
    GetChapterProgress,
    SetChapterProgress,
    UpdateStudyPlan,
    UpdateOverallProgress,
    UpdateAgentMemory,
    SetCurrentChapter,
    SkipUpdate,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::GetTableOfContents,
        Capability::GetChapterSummary,
        Capability::GetStudentPlan,
        Capability::GetChapterProgress,
        Capability::SetChapterProgress,
        Capability::UpdateStudyPlan,
        Capability::UpdateOverallProgress,
        Capability::UpdateAgentMemory,
        Capability::SetCurrentChapter,
        Capability::SkipUpdate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Capability::GetTableOfContents => "get_table_of_contents",
            Capability::GetChapterSummary => "get_chapter_summary",
            Capability::GetStudentPlan => "get_student_plan",
            Capability::GetChapterProgress => "get_chapter_progress",
            Capability::SetChapterProgress => "set_chapter_progress",
            Capability::UpdateStudyPlan => "update_study_plan",
            Capability::UpdateOverallProgress => "update_overall_progress",
            Capability::UpdateAgentMemory => "update_agent_memory",
            Capability::SetCurrentChapter => "set_current_chapter",
            Capability::SkipUpdate => "skip_update",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    fn description(self) -> &'static str {
        match self {
            Capability::GetTableOfContents => "List the chapters of the book in reading order.",
            Capability::GetChapterSummary => {
                "Get the name, summary and key points of one chapter."
            }
            Capability::GetStudentPlan => {
                "Get the student's study plan, overall progress summary and current chapter."
            }
            Capability::GetChapterProgress => {
                "Get the recorded status and objectives of every chapter the student has touched."
            }
            Capability::SetChapterProgress => {
                "Record the status (0 not started, 1 in progress, 2 completed) and objectives of a chapter. Lowering a status requires reset: true."
            }
            Capability::UpdateStudyPlan => "Replace the student's study plan.",
            Capability::UpdateOverallProgress => {
                "Replace the summary of the student's overall progress in the book."
            }
            Capability::UpdateAgentMemory => {
                "Replace your notes about the student. Keep everything that is still true."
            }
            Capability::SetCurrentChapter => "Move the lesson to another chapter of the book.",
            Capability::SkipUpdate => {
                "Declare that one of the records needs no change in this pass."
            }
        }
    }

    fn parameters(self) -> Value {
        match self {
            Capability::GetTableOfContents => schema::<BookArgs>(),
            Capability::GetChapterSummary => schema::<ChapterArgs>(),
            Capability::GetStudentPlan | Capability::GetChapterProgress => schema::<SessionArgs>(),
            Capability::SetChapterProgress => schema::<SetChapterProgressArgs>(),
            Capability::UpdateStudyPlan => schema::<UpdateStudyPlanArgs>(),
            Capability::UpdateOverallProgress => schema::<UpdateOverallProgressArgs>(),
            Capability::UpdateAgentMemory => schema::<UpdateAgentMemoryArgs>(),
            Capability::SetCurrentChapter => schema::<SetCurrentChapterArgs>(),
            Capability::SkipUpdate => schema::<SkipUpdateArgs>(),
        }
    }

    /// The summarization record this capability settles when it succeeds.
    pub fn summary_target(self) -> Option<SummaryTarget> {
        match self {
            Capability::SetChapterProgress => Some(SummaryTarget::ChapterProgress),
            Capability::UpdateOverallProgress => Some(SummaryTarget::OverallProgress),
            Capability::UpdateStudyPlan => Some(SummaryTarget::StudyPlan),
            Capability::UpdateAgentMemory => Some(SummaryTarget::AgentMemory),
            _ => None,
        }
    }

    pub fn is_write(self) -> bool {
        !matches!(
            self,
            Capability::GetTableOfContents
                | Capability::GetChapterSummary
                | Capability::GetStudentPlan
                | Capability::GetChapterProgress
        )
    }

    pub fn available_in(self, mode: CapabilityMode) -> bool {
        match self {
            Capability::SkipUpdate => mode == CapabilityMode::Summarization,
            _ => true,
        }
    }

    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// JSON Schema of an argument object, without the meta keys providers reject.
fn schema<T: JsonSchema>() -> Value {
    let mut value = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| json!({ "type": "object" }));
    if let Some(object) = value.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    value
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// How a successful call settled a summarization record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Applied(SummaryTarget),
    Skipped(SummaryTarget),
}

/// Result of one capability call, ready to be fed back to the model.
#[derive(Debug, Clone)]
pub struct CapabilityOutcome {
    pub capability: Option<Capability>,
    pub result: Result<Value, CapabilityError>,
    pub settlement: Option<Settlement>,
}

impl CapabilityOutcome {
    fn rejected(capability: Option<Capability>, error: CapabilityError) -> Self {
        Self {
            capability,
            result: Err(error),
            settlement: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Tool-result message content: `{"ok": true, "result": ...}` or
    /// `{"ok": false, "error": "..."}`.
    pub fn to_tool_content(&self) -> String {
        match &self.result {
            Ok(result) => json!({ "ok": true, "result": result }).to_string(),
            Err(error) => json!({ "ok": false, "error": error.to_string() }).to_string(),
        }
    }
}

/// Internal failure split: rejections go to the model, store errors to the caller.
enum Failure {
    Rejected(CapabilityError),
    Store(RepositoryError),
}

impl From<CapabilityError> for Failure {
    fn from(error: CapabilityError) -> Self {
        Failure::Rejected(error)
    }
}

impl From<RepositoryError> for Failure {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Constraint(message) => {
                Failure::Rejected(CapabilityError::Validation(message))
            }
            other => Failure::Store(other),
        }
    }
}

type Dispatch = Result<(Value, Option<Settlement>), Failure>;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Executes capability calls on behalf of one session at a time.
pub struct CapabilityRegistry<S> {
    store: Arc<S>,
}

impl<S> Clone for CapabilityRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: TutorStore> CapabilityRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Tool definitions offered in `mode`.
    pub fn definitions(&self, mode: CapabilityMode) -> Vec<ToolDefinition> {
        Capability::ALL
            .into_iter()
            .filter(|c| c.available_in(mode))
            .map(Capability::definition)
            .collect()
    }

    /// Execute one call for the session `scope`.
    ///
    /// Returns `Err` only for store failures; every other problem is an
    /// outcome carrying a [`CapabilityError`].
    #[tracing::instrument(skip(self, call), fields(capability = %call.name, book_id = scope.book_id, student_id = scope.student_id))]
    pub async fn invoke(
        &self,
        scope: SessionKey,
        mode: CapabilityMode,
        call: &ToolCall,
    ) -> Result<CapabilityOutcome, TutorError> {
        let Some(capability) = Capability::from_name(&call.name) else {
            tracing::debug!("Model called an unknown capability");
            return Ok(CapabilityOutcome::rejected(
                None,
                CapabilityError::Unknown(call.name.clone()),
            ));
        };
        if !capability.available_in(mode) {
            return Ok(CapabilityOutcome::rejected(
                Some(capability),
                CapabilityError::NotPermitted(capability.name().to_string()),
            ));
        }

        match self.dispatch(scope, capability, &call.arguments).await {
            Ok((result, settlement)) => {
                tracing::debug!(write = capability.is_write(), "Capability applied");
                Ok(CapabilityOutcome {
                    capability: Some(capability),
                    result: Ok(result),
                    settlement,
                })
            }
            Err(Failure::Rejected(error)) => {
                tracing::debug!(%error, "Capability rejected");
                Ok(CapabilityOutcome::rejected(Some(capability), error))
            }
            Err(Failure::Store(error)) => {
                tracing::error!(%error, "Capability failed in the store");
                Err(TutorError::Store(error))
            }
        }
    }

    async fn dispatch(&self, scope: SessionKey, capability: Capability, raw: &str) -> Dispatch {
        match capability {
            Capability::GetTableOfContents => {
                let args: BookArgs = parse_args(capability, raw)?;
                self.table_of_contents(scoped_book(scope, args.book_id)?).await
            }
            Capability::GetChapterSummary => {
                let args: ChapterArgs = parse_args(capability, raw)?;
                let book_id = scoped_book(scope, args.book_id)?;
                self.chapter_summary(book_id, &parse_chapter(&args.chapter_number)?)
                    .await
            }
            Capability::GetStudentPlan => {
                let args: SessionArgs = parse_args(capability, raw)?;
                self.student_plan(scoped(scope, args.student_id, args.book_id)?)
                    .await
            }
            Capability::GetChapterProgress => {
                let args: SessionArgs = parse_args(capability, raw)?;
                self.chapter_progress(scoped(scope, args.student_id, args.book_id)?)
                    .await
            }
            Capability::SetChapterProgress => {
                let args: SetChapterProgressArgs = parse_args(capability, raw)?;
                let key = scoped(scope, args.student_id, args.book_id)?;
                self.set_chapter_progress(key, &args).await
            }
            Capability::UpdateStudyPlan => {
                let args: UpdateStudyPlanArgs = parse_args(capability, raw)?;
                let key = scoped(scope, args.student_id, args.book_id)?;
                let plan = self.store.set_plan_text(key, &args.plan_text).await?;
                Ok((
                    json!({ "plan": plan.plan, "updated_at": plan.updated_at }),
                    Some(Settlement::Applied(SummaryTarget::StudyPlan)),
                ))
            }
            Capability::UpdateOverallProgress => {
                let args: UpdateOverallProgressArgs = parse_args(capability, raw)?;
                let key = scoped(scope, args.student_id, args.book_id)?;
                let plan = self
                    .store
                    .set_progress_summary(key, &args.summary_text)
                    .await?;
                Ok((
                    json!({ "progress_summary": plan.progress_summary, "updated_at": plan.updated_at }),
                    Some(Settlement::Applied(SummaryTarget::OverallProgress)),
                ))
            }
            Capability::UpdateAgentMemory => {
                let args: UpdateAgentMemoryArgs = parse_args(capability, raw)?;
                let key = scoped(scope, args.student_id, args.book_id)?;
                self.store.update_notes(key, &args.notes_text).await?;
                Ok((
                    json!({ "notes_length": args.notes_text.chars().count() }),
                    Some(Settlement::Applied(SummaryTarget::AgentMemory)),
                ))
            }
            Capability::SetCurrentChapter => {
                let args: SetCurrentChapterArgs = parse_args(capability, raw)?;
                let key = scoped(scope, args.student_id, args.book_id)?;
                let chapter_number = parse_chapter(&args.chapter_number)?;
                let chapter = self.require_chapter(key.book_id, &chapter_number).await?;
                self.store
                    .set_current_chapter(key, Some(&chapter_number))
                    .await?;
                Ok((
                    json!({ "current_chapter": chapter_number, "name": chapter.name }),
                    None,
                ))
            }
            Capability::SkipUpdate => {
                let args: SkipUpdateArgs = parse_args(capability, raw)?;
                tracing::debug!(target_record = %args.target, reason = %args.reason, "Update skipped");
                Ok((
                    json!({ "skipped": args.target }),
                    Some(Settlement::Skipped(args.target)),
                ))
            }
        }
    }

    async fn table_of_contents(&self, book_id: i64) -> Dispatch {
        let book = self
            .store
            .get_book(book_id)
            .await?
            .ok_or_else(|| CapabilityError::Validation(format!("book {book_id} does not exist")))?;
        let chapters = self.store.list_chapters(book_id).await?;
        let entries: Vec<Value> = chapters
            .iter()
            .map(|c| json!({ "chapter_number": c.chapter_number, "name": c.name }))
            .collect();
        Ok((
            json!({ "title": book.title, "author": book.author, "chapters": entries }),
            None,
        ))
    }

    async fn chapter_summary(&self, book_id: i64, chapter_number: &ChapterNumber) -> Dispatch {
        let chapter = self.require_chapter(book_id, chapter_number).await?;
        Ok((
            json!({
                "chapter_number": chapter.chapter_number,
                "name": chapter.name,
                "summary": chapter.summary,
                "key_points": chapter.key_points,
            }),
            None,
        ))
    }

    async fn student_plan(&self, key: SessionKey) -> Dispatch {
        let session = self
            .store
            .get_session(key)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let plan = self.store.get_study_plan(key).await?;
        let (plan_text, summary) = plan
            .map(|p| (p.plan, p.progress_summary))
            .unwrap_or_default();
        Ok((
            json!({
                "plan": plan_text,
                "progress_summary": summary,
                "current_chapter": session.current_chapter,
            }),
            None,
        ))
    }

    async fn chapter_progress(&self, key: SessionKey) -> Dispatch {
        let rows = self.store.list_chapter_progress(key).await?;
        let entries: Vec<Value> = rows
            .iter()
            .map(|p| {
                json!({
                    "chapter_number": p.chapter_number,
                    "status": p.status,
                    "status_label": p.status.label(),
                    "objectives": p.objectives,
                })
            })
            .collect();
        Ok((json!({ "chapters": entries }), None))
    }

    async fn set_chapter_progress(&self, key: SessionKey, args: &SetChapterProgressArgs) -> Dispatch {
        let status = ChapterStatus::try_from(args.status).map_err(CapabilityError::Validation)?;
        let chapter_number = parse_chapter(&args.chapter_number)?;
        self.require_chapter(key.book_id, &chapter_number).await?;

        if !args.reset {
            if let Some(existing) = self.store.get_chapter_progress(key, &chapter_number).await? {
                if status < existing.status {
                    return Err(CapabilityError::Validation(format!(
                        "chapter {chapter_number} is already {}; lowering it to {status} requires reset: true",
                        existing.status
                    ))
                    .into());
                }
            }
        }

        let progress = self
            .store
            .upsert_chapter_progress(key, &chapter_number, status, &args.objectives)
            .await?;
        Ok((
            json!({
                "chapter_number": progress.chapter_number,
                "status": progress.status,
                "status_label": progress.status.label(),
                "objectives": progress.objectives,
            }),
            Some(Settlement::Applied(SummaryTarget::ChapterProgress)),
        ))
    }

    async fn require_chapter(
        &self,
        book_id: i64,
        chapter_number: &ChapterNumber,
    ) -> Result<booktutor_types::book::Chapter, Failure> {
        self.store
            .get_chapter(book_id, chapter_number)
            .await?
            .ok_or_else(|| {
                Failure::Rejected(CapabilityError::Validation(format!(
                    "chapter {chapter_number} does not exist in book {book_id}; use get_table_of_contents"
                )))
            })
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn parse_args<T: DeserializeOwned>(capability: Capability, raw: &str) -> Result<T, Failure> {
    let raw = if raw.trim().is_empty() { "{}" } else { raw };
    serde_json::from_str(raw).map_err(|e| {
        Failure::Rejected(CapabilityError::InvalidArguments {
            name: capability.name().to_string(),
            reason: e.to_string(),
        })
    })
}

fn parse_chapter(raw: &str) -> Result<ChapterNumber, Failure> {
    ChapterNumber::parse(raw).map_err(|e| Failure::Rejected(CapabilityError::Validation(e)))
}

fn scoped_book(scope: SessionKey, book_id: Option<i64>) -> Result<i64, Failure> {
    match book_id {
        Some(id) if id != scope.book_id => Err(Failure::Rejected(CapabilityError::Validation(
            format!("book {id} is not the book of this session ({})", scope.book_id),
        ))),
        _ => Ok(scope.book_id),
    }
}

/// Resolve the session a call targets; it must be the caller's own.
fn scoped(
    scope: SessionKey,
    student_id: Option<i64>,
    book_id: Option<i64>,
) -> Result<SessionKey, Failure> {
    if let Some(id) = student_id.filter(|id| *id != scope.student_id) {
        return Err(Failure::Rejected(CapabilityError::Validation(format!(
            "student {id} is not the student of this session ({})",
            scope.student_id
        ))));
    }
    scoped_book(scope, book_id)?;
    Ok(scope)
}
