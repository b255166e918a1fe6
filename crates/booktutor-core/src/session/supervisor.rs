//! Session supervisor: owns the live sessions of the process.
//!
//! Each live session is a [`SessionHandle`] in a `DashMap`; its state sits
//! behind a `tokio::sync::Mutex` so turns and summarization passes of one
//! session run one after another while different sessions proceed in
//! parallel. Summarization passes are coalesced with an in-flight flag.
//! Idle sessions are closed by a janitor task and reloaded on next access.
//!
//! A handle is marked closed while its state lock is held and dropped from
//! the map before the lock is released. Every operation checks the mark after
//! locking and starts over with a fresh handle when it is set, so a caller
//! that was queued on a closing handle never writes through it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use booktutor_types::book::ChapterNumber;
use booktutor_types::config::GlobalConfig;
use booktutor_types::error::TutorError;
use booktutor_types::session::SessionKey;
use booktutor_types::summary::{SummaryStatus, SummaryTrigger};

use crate::agent::{StudentInput, SummaryOptions, Summarizer, TurnController, TurnOptions, TurnOutcome};
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::retry::RetryPolicy;
use crate::repository::TutorStore;

use super::state::SessionState;

/// Engine knobs taken from the global config.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub turn: TurnOptions,
    pub summary: SummaryOptions,
    pub retry: RetryPolicy,
    pub idle_timeout: Duration,
    pub janitor_interval: Duration,
}

impl EngineOptions {
    pub fn from_config(config: &GlobalConfig) -> Self {
        let provider = &config.provider;
        let engine = &config.engine;
        Self {
            turn: TurnOptions::new(engine.max_tool_rounds, provider),
            summary: SummaryOptions {
                max_rounds: engine.max_summary_rounds,
                max_reply_tokens: provider.max_reply_tokens,
                temperature: provider.temperature,
            },
            retry: RetryPolicy::from_config(engine, provider),
            idle_timeout: engine.idle_timeout(),
            janitor_interval: engine.janitor_interval(),
        }
    }
}

/// What a client sees when it opens a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOverview {
    pub key: SessionKey,
    pub book_title: String,
    pub student_name: String,
    pub current_chapter: Option<ChapterNumber>,
    pub window_messages: usize,
    pub unsummarized_messages: usize,
    pub ai_model: String,
    pub token_budget: u32,
}

impl SessionOverview {
    fn of(state: &SessionState) -> Self {
        Self {
            key: state.key(),
            book_title: state.book.title.clone(),
            student_name: state.student.name.clone(),
            current_chapter: state.session.current_chapter.clone(),
            window_messages: state.history.len(),
            unsummarized_messages: state.unsummarized().count(),
            ai_model: state.settings.ai_model.clone(),
            token_budget: state.settings.token_budget,
        }
    }
}

// ---------------------------------------------------------------------------
// Live session handle
// ---------------------------------------------------------------------------

struct SessionHandle {
    key: SessionKey,
    state: Mutex<SessionState>,
    summarizing: AtomicBool,
    /// Set under the state lock once the session is closed.
    closed: AtomicBool,
    last_access: StdMutex<Instant>,
    /// Stops the auto-save task; child of the supervisor's shutdown token.
    auto_save: CancellationToken,
}

/// Clears the in-flight flag when a summarization pass ends.
struct SummaryGuard<'a>(&'a AtomicBool);

impl Drop for SummaryGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SessionHandle {
    fn new(state: SessionState, auto_save: CancellationToken) -> Self {
        Self {
            key: state.key(),
            state: Mutex::new(state),
            summarizing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            last_access: StdMutex::new(Instant::now()),
            auto_save,
        }
    }

    fn touch(&self) {
        let mut last = self.last_access.lock().unwrap_or_else(|e| e.into_inner());
        *last = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        let last = self.last_access.lock().unwrap_or_else(|e| e.into_inner());
        last.elapsed()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Claim the summarization slot; `None` if a pass is already in flight.
    fn begin_summary(&self) -> Option<SummaryGuard<'_>> {
        self.summarizing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SummaryGuard(&self.summarizing))
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

struct Inner<S> {
    store: Arc<S>,
    provider: Arc<BoxLlmProvider>,
    turns: TurnController<S>,
    summarizer: Summarizer<S>,
    sessions: DashMap<SessionKey, Arc<SessionHandle>>,
    options: EngineOptions,
    shutdown: CancellationToken,
}

/// Entry point of the tutoring engine.
pub struct SessionSupervisor<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for SessionSupervisor<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: TutorStore> SessionSupervisor<S> {
    pub fn new(store: Arc<S>, provider: BoxLlmProvider, options: EngineOptions) -> Self {
        let provider = Arc::new(provider);
        let turns = TurnController::new(
            store.clone(),
            provider.clone(),
            options.retry.clone(),
            options.turn.clone(),
        );
        let summarizer = Summarizer::new(
            store.clone(),
            provider.clone(),
            options.retry.clone(),
            options.summary.clone(),
        );
        Self {
            inner: Arc::new(Inner {
                store,
                provider,
                turns,
                summarizer,
                sessions: DashMap::new(),
                options,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Load a session into memory (or reuse the live one).
    #[tracing::instrument(skip(self), fields(book_id = key.book_id, student_id = key.student_id))]
    pub async fn open(&self, key: SessionKey) -> Result<SessionOverview, TutorError> {
        loop {
            let handle = self.handle(key).await?;
            handle.touch();
            let state = handle.state.lock().await;
            if handle.is_closed() {
                continue;
            }
            return Ok(SessionOverview::of(&state));
        }
    }

    /// Run one conversation turn.
    ///
    /// Before the turn, messages that the window is about to evict without
    /// having been summarized are distilled first. After a turn whose context
    /// did not fit the budget, or whose eviction was held back for unsummarized
    /// messages, a background summarization pass is started.
    #[tracing::instrument(skip_all, fields(book_id = key.book_id, student_id = key.student_id))]
    pub async fn send(
        &self,
        key: SessionKey,
        input: StudentInput,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TutorError> {
        let (handle, result) = loop {
            let handle = self.handle(key).await?;
            handle.touch();
            let mut state = handle.state.lock().await;
            if handle.is_closed() {
                continue;
            }
            self.inner
                .summarize_before_eviction(&handle, &mut state, &input.text)
                .await;
            let result = self.inner.turns.run(&mut state, input, cancel).await;
            drop(state);
            break (handle, result);
        };
        handle.touch();
        let outcome = result?;

        if outcome.budget_warning.is_some() || outcome.eviction_deferred {
            match outcome.budget_warning {
                Some(warning) => tracing::warn!(
                    required_tokens = warning.required_tokens,
                    budget = warning.budget,
                    "Context exceeds the token budget, scheduling summarization"
                ),
                None => tracing::info!("Eviction deferred for unsummarized messages, scheduling summarization"),
            }
            let inner = self.inner.clone();
            tokio::spawn(async move {
                match inner
                    .summarize_on(&handle, SummaryTrigger::BudgetPressure)
                    .await
                {
                    Ok(Some(status)) => tracing::debug!(key = %handle.key, ?status, "Budget-pressure summarization finished"),
                    Ok(None) => tracing::debug!(key = %handle.key, "Session closed before budget-pressure summarization"),
                    Err(e) => tracing::warn!(key = %handle.key, error = %e, "Budget-pressure summarization failed"),
                }
            });
        }

        Ok(outcome)
    }

    /// Summarize a session now, unless a pass is already running.
    pub async fn summarize(
        &self,
        key: SessionKey,
        trigger: SummaryTrigger,
    ) -> Result<SummaryStatus, TutorError> {
        loop {
            let handle = self.handle(key).await?;
            if let Some(status) = self.inner.summarize_on(&handle, trigger).await? {
                return Ok(status);
            }
        }
    }

    /// Summarize and drop a live session. `None` if it was not live.
    #[tracing::instrument(skip(self), fields(book_id = key.book_id, student_id = key.student_id))]
    pub async fn close(&self, key: SessionKey) -> Result<Option<SummaryStatus>, TutorError> {
        let Some(handle) = self.inner.sessions.get(&key).map(|h| h.clone()) else {
            return Ok(None);
        };
        self.inner.close_handle(&handle).await
    }

    /// Close every session idle for longer than the configured timeout.
    pub async fn evict_idle(&self) -> Vec<SessionKey> {
        self.inner.evict_idle().await
    }

    /// Start the background task that evicts idle sessions until shutdown.
    pub fn spawn_janitor(&self) -> tokio::task::JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let period = inner.options.janitor_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = inner.evict_idle().await;
                        if !evicted.is_empty() {
                            tracing::info!(count = evicted.len(), "Evicted idle sessions");
                        }
                    }
                }
            }
            tracing::debug!("Session janitor stopped");
        })
    }

    /// Stop background tasks and close every live session.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handles: Vec<Arc<SessionHandle>> =
            self.inner.sessions.iter().map(|e| e.value().clone()).collect();
        for handle in handles {
            if let Err(e) = self.inner.close_handle(&handle).await {
                tracing::warn!(key = %handle.key, error = %e, "Summarization on shutdown failed");
            }
        }
        tracing::info!("Session supervisor shut down");
    }

    pub fn live_sessions(&self) -> Vec<SessionKey> {
        self.inner.sessions.iter().map(|e| *e.key()).collect()
    }

    pub fn is_live(&self, key: SessionKey) -> bool {
        self.inner.sessions.contains_key(&key)
    }

    async fn handle(&self, key: SessionKey) -> Result<Arc<SessionHandle>, TutorError> {
        if let Some(handle) = self.inner.sessions.get(&key) {
            return Ok(handle.clone());
        }

        let settings = self.inner.store.get_settings().await?;
        settings.validate().map_err(TutorError::InvalidSettings)?;
        let context_limit = self.inner.provider.capabilities().max_context_tokens;
        if settings.token_budget > context_limit {
            tracing::warn!(
                token_budget = settings.token_budget,
                context_limit,
                provider = self.inner.provider.name(),
                "Token budget is larger than the provider's context window"
            );
        }
        let auto_save = settings.auto_save();
        let state = SessionState::load(self.inner.store.as_ref(), key, settings).await?;

        let handle = match self.inner.sessions.entry(key) {
            Entry::Occupied(existing) => return Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                let handle = Arc::new(SessionHandle::new(
                    state,
                    self.inner.shutdown.child_token(),
                ));
                slot.insert(handle.clone());
                handle
            }
        };
        tracing::info!(%key, "Session loaded");

        if let Some(period) = auto_save {
            self.inner.clone().spawn_auto_save(handle.clone(), period);
        }
        Ok(handle)
    }
}

impl<S: TutorStore> Inner<S> {
    /// Run a pass on `handle`. `None` if the handle was closed meanwhile.
    async fn summarize_on(
        &self,
        handle: &SessionHandle,
        trigger: SummaryTrigger,
    ) -> Result<Option<SummaryStatus>, TutorError> {
        let Some(_guard) = handle.begin_summary() else {
            tracing::debug!(key = %handle.key, %trigger, "Summarization already in flight");
            return Ok(Some(SummaryStatus::Coalesced));
        };
        let mut state = handle.state.lock().await;
        if handle.is_closed() {
            return Ok(None);
        }
        self.summarizer.run(&mut state, trigger).await.map(Some)
    }

    /// Distill messages the next turn would evict while still unsummarized.
    async fn summarize_before_eviction(
        &self,
        handle: &SessionHandle,
        state: &mut SessionState,
        text: &str,
    ) {
        let plan = self.turns.preview(state, text);
        let Some(through) = plan.evict_through else {
            return;
        };
        if state
            .session
            .last_summarized_message_id
            .is_some_and(|done| done >= through)
        {
            return;
        }
        let Some(_guard) = handle.begin_summary() else {
            return;
        };
        tracing::info!(evict_through = through, "Summarizing before eviction");
        // One pass may cover only the oldest batch; repeat until `through` is distilled.
        while state
            .session
            .last_summarized_message_id
            .is_none_or(|done| done < through)
        {
            match self
                .summarizer
                .run(state, SummaryTrigger::BudgetPressure)
                .await
            {
                Ok(SummaryStatus::Completed(_)) => {}
                Ok(_) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Summarization before eviction failed, continuing turn");
                    break;
                }
            }
        }
    }

    /// Summarize and retire a handle. `None` if it was already closed.
    ///
    /// The state lock is held from the closing pass until the handle has left
    /// the map; passes queued behind it find the handle closed and skip.
    async fn close_handle(
        &self,
        handle: &Arc<SessionHandle>,
    ) -> Result<Option<SummaryStatus>, TutorError> {
        handle.auto_save.cancel();
        let mut state = handle.state.lock().await;
        if handle.closed.swap(true, Ordering::AcqRel) {
            return Ok(None);
        }
        let result = self.summarizer.run(&mut state, SummaryTrigger::Close).await;
        self.sessions
            .remove_if(&handle.key, |_, live| Arc::ptr_eq(live, handle));
        drop(state);
        tracing::info!(key = %handle.key, "Session closed");
        result.map(Some)
    }

    async fn evict_idle(&self) -> Vec<SessionKey> {
        let timeout = self.options.idle_timeout;
        let idle: Vec<Arc<SessionHandle>> = self
            .sessions
            .iter()
            .filter(|e| e.value().idle_for() >= timeout)
            .map(|e| e.value().clone())
            .collect();

        let mut evicted = Vec::new();
        for handle in idle {
            if handle.state.try_lock().is_err() {
                continue;
            }
            match self.close_handle(&handle).await {
                Ok(None) => continue,
                Ok(Some(_)) => {}
                Err(e) => {
                    tracing::warn!(key = %handle.key, error = %e, "Summarization of idle session failed");
                }
            }
            evicted.push(handle.key);
        }
        evicted
    }

    fn spawn_auto_save(self: Arc<Self>, handle: Arc<SessionHandle>, period: Duration) {
        let token = handle.auto_save.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.summarize_on(&handle, SummaryTrigger::Interval).await {
                            Ok(Some(status)) => tracing::debug!(key = %handle.key, ?status, "Auto-save finished"),
                            Ok(None) => break,
                            Err(e) => tracing::warn!(key = %handle.key, error = %e, "Auto-save failed"),
                        }
                    }
                }
            }
        });
    }
}
