//! PlanSession - orchestrates dialogue turns, background synthesis and edits
//!
//! Two independent flows touch the session: `send_message` (user turn, gateway
//! reply, assistant turn) and synthesis (full log in, plan out). Both may be in
//! flight together, alongside an open edit transaction. All state lives behind
//! one async mutex that is never held across a gateway call. Record snapshots
//! are queued to the session writer while the mutex is held, so store writes
//! follow mutation order without the I/O blocking other flows. Commit is the
//! exception: it waits for its write under the mutex and only swaps the plan
//! in once the store has accepted it.
//!
//! The committed plan has two writers: synthesis completion and edit commit.
//! A synthesis result is applied only if no commit or reset happened since its
//! request was issued; otherwise it is discarded as stale.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::edit::PlanEdit;
use super::error::{SessionError, SessionResult};
use super::events::{PlanSource, SessionEvent, SessionStatus, SkipReason, SynthesisOutcome};
use super::log::ConversationLog;
use super::persistence::SessionPersistence;
use super::transaction::EditTransaction;
use super::writer::{SessionWriter, WriteOp};
use crate::config::SessionConfig;
use crate::domain::{StructuredPlan, Turn};
use crate::gateway::SynthesisGateway;
use sessionstore::KeyValueStore;

const EVENT_CAPACITY: usize = 64;

/// Handle to a plan session. Clones share the same session.
#[derive(Clone)]
pub struct PlanSession {
    inner: Arc<Inner>,
}

struct Inner {
    gateway: Arc<dyn SynthesisGateway>,
    writer: SessionWriter,
    config: SessionConfig,
    state: Mutex<State>,
    synthesizing: AtomicBool,
    sending: AtomicUsize,
    event_tx: broadcast::Sender<SessionEvent>,
    tasks: Mutex<Vec<JoinHandle<SynthesisOutcome>>>,
}

struct State {
    log: ConversationLog,
    plan: Option<StructuredPlan>,
    transaction: Option<EditTransaction>,
    /// Bumped by every commit and reset; guards synthesis results
    generation: u64,
    /// Bumped by every reset; guards late conversation replies
    epoch: u64,
    /// Bumped whenever the committed plan is replaced
    revision: u64,
}

/// Clears the synthesizing flag when the synthesis flow ends, however it ends
struct SynthesisGuard<'a>(&'a AtomicBool);

impl<'a> SynthesisGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SynthesisGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct SendingGuard<'a>(&'a AtomicUsize);

impl<'a> SendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl PlanSession {
    /// Open a session, rehydrating its log and plan from the store
    ///
    /// A session with no stored log starts with the greeting turn, which is
    /// written to the store right away.
    pub async fn open(
        gateway: Arc<dyn SynthesisGateway>,
        store: Arc<dyn KeyValueStore>,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        debug!(session_id = %config.id, "PlanSession::open: called");
        Self::open_with(gateway, store, config, true).await
    }

    /// Open a session for inspection
    ///
    /// Like [`PlanSession::open`], but a missing log is seeded in memory only,
    /// so looking at a session that was never started leaves the store untouched.
    pub async fn inspect(
        gateway: Arc<dyn SynthesisGateway>,
        store: Arc<dyn KeyValueStore>,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        debug!(session_id = %config.id, "PlanSession::inspect: called");
        Self::open_with(gateway, store, config, false).await
    }

    async fn open_with(
        gateway: Arc<dyn SynthesisGateway>,
        store: Arc<dyn KeyValueStore>,
        config: SessionConfig,
        store_greeting: bool,
    ) -> SessionResult<Self> {
        let persistence = SessionPersistence::new(store, config.id.clone())?;

        let mut log = persistence.load_log().await?.unwrap_or_default();
        if log.is_empty() {
            debug!(store_greeting, "open_with: seeding greeting");
            log.append(Turn::assistant(config.greeting.clone()));
            if store_greeting {
                persistence.save_log(&log).await?;
            }
        }
        let plan = persistence.load_plan().await?;

        info!(
            session_id = %config.id,
            turns = log.size(),
            has_plan = plan.is_some(),
            "Session opened"
        );

        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                gateway,
                writer: SessionWriter::spawn(persistence),
                config,
                state: Mutex::new(State {
                    log,
                    plan,
                    transaction: None,
                    generation: 0,
                    epoch: 0,
                    revision: 0,
                }),
                synthesizing: AtomicBool::new(false),
                sending: AtomicUsize::new(0),
                event_tx,
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.inner.config.id
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }

    // === Dialogue ===

    /// Record a user message, fetch and record the reply, and return it
    ///
    /// The user turn is appended before the gateway is called. A gateway failure
    /// becomes the configured fallback reply. Resynthesis is then started in the
    /// background and never awaited here.
    pub async fn send_message(&self, text: &str) -> String {
        debug!(len = text.len(), "send_message: called");
        let _sending = SendingGuard::enter(&self.inner.sending);

        let (history, epoch) = {
            let mut state = self.inner.state.lock().await;
            let history = state.log.all().to_vec();
            state.log.append(Turn::user(text));
            self.persist_log(&state).await;
            self.emit(SessionEvent::TurnAppended {
                index: state.log.size() - 1,
            });
            (history, state.epoch)
        };

        let reply = match self.inner.gateway.converse(&history, text).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Conversation call failed, using fallback reply");
                self.inner.config.fallback_reply.clone()
            }
        };

        {
            let mut state = self.inner.state.lock().await;
            if state.epoch == epoch {
                state.log.append(Turn::assistant(reply.clone()));
                self.persist_log(&state).await;
                self.emit(SessionEvent::TurnAppended {
                    index: state.log.size() - 1,
                });
            } else {
                info!("Dropping reply that arrived after a session reset");
            }
        }

        let session = self.clone();
        self.track(tokio::spawn(async move { session.maybe_resynthesize().await }))
            .await;

        reply
    }

    // === Synthesis ===

    /// Synthesize if the log is long enough and no synthesis is running
    pub async fn maybe_resynthesize(&self) -> SynthesisOutcome {
        debug!("maybe_resynthesize: called");
        let size = self.inner.state.lock().await.log.size();
        if size < self.inner.config.min_turns {
            debug!(size, min_turns = self.inner.config.min_turns, "maybe_resynthesize: not enough turns");
            return SynthesisOutcome::Skipped(SkipReason::NotEnoughTurns);
        }
        self.run_synthesis().await
    }

    /// Synthesize regardless of log length, unless a synthesis is running
    pub async fn force_resynthesize(&self) -> SynthesisOutcome {
        debug!("force_resynthesize: called");
        self.run_synthesis().await
    }

    /// Start a forced synthesis in the background
    pub async fn request_refresh(&self) {
        debug!("request_refresh: called");
        let session = self.clone();
        self.track(tokio::spawn(async move { session.force_resynthesize().await }))
            .await;
    }

    /// Wait for every background synthesis started so far and for the store
    /// writes they queued
    pub async fn settle(&self) {
        debug!("settle: called");
        loop {
            let handles = std::mem::take(&mut *self.inner.tasks.lock().await);
            if handles.is_empty() {
                self.inner.writer.flush().await;
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Background synthesis task failed");
                }
            }
        }
    }

    async fn run_synthesis(&self) -> SynthesisOutcome {
        let Some(_guard) = SynthesisGuard::acquire(&self.inner.synthesizing) else {
            debug!("run_synthesis: already running");
            return SynthesisOutcome::Skipped(SkipReason::AlreadyRunning);
        };
        self.emit(SessionEvent::SynthesisStarted);

        let (history, generation) = {
            let state = self.inner.state.lock().await;
            (state.log.all().to_vec(), state.generation)
        };

        let outcome = match self.inner.gateway.synthesize(&history).await {
            Ok(Some(plan)) => self.apply_synthesis(plan, generation).await,
            Ok(None) => {
                debug!("run_synthesis: gateway returned no plan");
                SynthesisOutcome::NoUpdate
            }
            Err(e) => {
                warn!(error = %e, "Synthesis failed, keeping current plan");
                SynthesisOutcome::NoUpdate
            }
        };

        info!(?outcome, "Synthesis finished");
        self.emit(SessionEvent::SynthesisFinished(outcome));
        outcome
    }

    async fn apply_synthesis(&self, plan: StructuredPlan, generation: u64) -> SynthesisOutcome {
        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            info!(
                requested = generation,
                current = state.generation,
                "Discarding stale synthesis result"
            );
            return SynthesisOutcome::Discarded;
        }

        state.plan = Some(plan);
        state.revision += 1;
        self.persist_plan(&state).await;
        self.emit(SessionEvent::PlanChanged {
            source: PlanSource::Synthesis,
        });
        SynthesisOutcome::Applied
    }

    // === Editing ===

    /// Open an edit transaction over a copy of the committed plan
    pub async fn open_edit(&self) -> SessionResult<StructuredPlan> {
        debug!("open_edit: called");
        let mut state = self.inner.state.lock().await;
        if state.transaction.is_some() {
            return Err(SessionError::TransactionAlreadyOpen);
        }
        let tx = EditTransaction::open(state.plan.as_ref(), state.revision)?;
        let draft = tx.draft().clone();
        state.transaction = Some(tx);
        self.emit(SessionEvent::EditOpened);
        Ok(draft)
    }

    /// Apply an arbitrary change to the open transaction's copy
    pub async fn edit<F>(&self, updater: F) -> SessionResult<()>
    where
        F: FnOnce(&mut StructuredPlan),
    {
        debug!("edit: called");
        let mut state = self.inner.state.lock().await;
        let tx = state.transaction.as_mut().ok_or(SessionError::NoOpenTransaction)?;
        tx.mutate(updater);
        Ok(())
    }

    /// Apply one edit primitive to the open transaction's copy, returning the copy
    pub async fn apply_edit(&self, edit: PlanEdit) -> SessionResult<StructuredPlan> {
        debug!(?edit, "apply_edit: called");
        let mut state = self.inner.state.lock().await;
        let tx = state.transaction.as_mut().ok_or(SessionError::NoOpenTransaction)?;
        tx.apply(&edit)?;
        Ok(tx.draft().clone())
    }

    pub async fn edit_draft(&self) -> Option<StructuredPlan> {
        let state = self.inner.state.lock().await;
        state.transaction.as_ref().map(|tx| tx.draft().clone())
    }

    /// Replace the committed plan with the transaction's copy
    ///
    /// The copy is stored first. If the store rejects it, the committed plan is
    /// unchanged and the transaction stays open so the commit can be retried.
    pub async fn commit_edit(&self) -> SessionResult<StructuredPlan> {
        debug!("commit_edit: called");
        let mut state = self.inner.state.lock().await;
        let tx = state.transaction.as_ref().ok_or(SessionError::NoOpenTransaction)?;
        if tx.is_stale(state.revision) {
            info!(
                base = tx.base_revision(),
                current = state.revision,
                "Committing edit over a newer synthesized plan"
            );
        }

        let plan = tx.draft().clone();
        if let Err(e) = self.inner.writer.write(WriteOp::SavePlan(Some(plan.clone()))).await {
            warn!(error = %e, "Failed to store committed plan, edit stays open");
            return Err(e);
        }

        state.transaction = None;
        state.plan = Some(plan.clone());
        state.generation += 1;
        state.revision += 1;

        self.emit(SessionEvent::EditClosed { committed: true });
        self.emit(SessionEvent::PlanChanged {
            source: PlanSource::Edit,
        });
        info!(revision = state.revision, "Edit committed");
        Ok(plan)
    }

    /// Discard the transaction's copy
    pub async fn cancel_edit(&self) -> SessionResult<()> {
        debug!("cancel_edit: called");
        let mut state = self.inner.state.lock().await;
        state.transaction.take().ok_or(SessionError::NoOpenTransaction)?;
        self.emit(SessionEvent::EditClosed { committed: false });
        Ok(())
    }

    // === Reset ===

    /// Clear log, plan, stored records and any open edit, then re-seed the greeting
    ///
    /// In-flight gateway calls are not cancelled; their late results are ignored.
    /// The in-memory reset always completes; a store failure is returned after.
    pub async fn reset_session(&self) -> SessionResult<()> {
        debug!("reset_session: called");
        let stored = {
            let mut state = self.inner.state.lock().await;

            let had_transaction = state.transaction.take().is_some();
            state.log.clear();
            state.log.append(Turn::assistant(self.inner.config.greeting.clone()));
            state.plan = None;
            state.generation += 1;
            state.epoch += 1;
            state.revision += 1;

            let pending = self.inner.writer.enqueue(WriteOp::Reset(state.log.clone())).await;

            if had_transaction {
                self.emit(SessionEvent::EditClosed { committed: false });
            }
            self.emit(SessionEvent::SessionReset);
            info!(session_id = %self.inner.config.id, "Session reset");
            pending
        };

        stored?.wait().await.inspect_err(|e| {
            warn!(error = %e, "Failed to store session reset");
        })
    }

    // === Observation ===

    pub async fn log(&self) -> ConversationLog {
        self.inner.state.lock().await.log.clone()
    }

    pub async fn current_plan(&self) -> Option<StructuredPlan> {
        self.inner.state.lock().await.plan.clone()
    }

    pub fn is_sending(&self) -> bool {
        self.inner.sending.load(Ordering::Acquire) > 0
    }

    pub fn is_synthesizing(&self) -> bool {
        self.inner.synthesizing.load(Ordering::Acquire)
    }

    pub async fn is_editing(&self) -> bool {
        self.inner.state.lock().await.transaction.is_some()
    }

    pub async fn status(&self) -> SessionStatus {
        let state = self.inner.state.lock().await;
        SessionStatus {
            session_id: self.inner.config.id.clone(),
            turns: state.log.size(),
            has_plan: state.plan.is_some(),
            plan_revision: state.revision,
            sending: self.is_sending(),
            synthesizing: self.is_synthesizing(),
            editing: state.transaction.is_some(),
            edit_stale: state
                .transaction
                .as_ref()
                .is_some_and(|tx| tx.is_stale(state.revision)),
        }
    }

    // === Internals ===

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.inner.event_tx.send(event);
    }

    async fn track(&self, handle: JoinHandle<SynthesisOutcome>) {
        let mut tasks = self.inner.tasks.lock().await;
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    async fn persist_log(&self, state: &State) {
        self.inner.writer.submit(WriteOp::SaveLog(state.log.clone())).await;
    }

    async fn persist_plan(&self, state: &State) {
        self.inner.writer.submit(WriteOp::SavePlan(state.plan.clone())).await;
    }
}
