//! PlanSession behaviour against scripted gateways

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;
use tempfile::tempdir;
use tokio::sync::Semaphore;

use plansmith::config::SessionConfig;
use plansmith::domain::{Milestone, StructuredPlan, Turn};
use plansmith::gateway::{GatewayError, SynthesisGateway};
use plansmith::session::{
    ListField, PlanEdit, PlanSession, PlanSource, SessionError, SessionEvent, SkipReason, SynthesisOutcome,
};
use sessionstore::{FileStore, KeyValueStore, MemoryStore, StoreError, StoreResult};

/// Gateway with fixed answers and optional latches on each call
struct TestGateway {
    reply: Option<String>,
    plan: Option<StructuredPlan>,
    converse_gate: Option<Arc<Semaphore>>,
    synth_gate: Option<Arc<Semaphore>>,
    converse_calls: AtomicUsize,
    synth_calls: AtomicUsize,
}

impl TestGateway {
    fn new(plan: StructuredPlan) -> Self {
        Self {
            reply: Some("Tell me more.".to_string()),
            plan: Some(plan),
            converse_gate: None,
            synth_gate: None,
            converse_calls: AtomicUsize::new(0),
            synth_calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            reply: None,
            plan: None,
            ..Self::new(StructuredPlan::default())
        }
    }

    fn synth_calls(&self) -> usize {
        self.synth_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisGateway for TestGateway {
    async fn converse(&self, _history: &[Turn], _message: &str) -> Result<String, GatewayError> {
        self.converse_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.converse_gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.reply
            .clone()
            .ok_or_else(|| GatewayError::Unavailable("scripted failure".to_string()))
    }

    async fn synthesize(&self, _history: &[Turn]) -> Result<Option<StructuredPlan>, GatewayError> {
        self.synth_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.synth_gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        match &self.plan {
            Some(plan) => Ok(Some(plan.clone())),
            None => Err(GatewayError::Unavailable("scripted failure".to_string())),
        }
    }
}

/// Memory store whose writes can be failed or held back
struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    hold_writes: AtomicBool,
    write_gate: Semaphore,
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_writes: AtomicBool::new(false),
            hold_writes: AtomicBool::new(false),
            write_gate: Semaphore::new(0),
        }
    }
}

impl FlakyStore {
    fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn hold_writes(&self) {
        self.hold_writes.store(true, Ordering::SeqCst);
    }

    fn release_writes(&self) {
        self.hold_writes.store(false, Ordering::SeqCst);
        self.write_gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    async fn check(&self) -> StoreResult<()> {
        if self.hold_writes.load(Ordering::SeqCst) {
            self.write_gate.acquire().await.expect("gate closed").forget();
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check().await?;
        self.inner.put(key, value).await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.check().await?;
        self.inner.remove(key).await
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        self.inner.keys().await
    }
}

fn todo_plan() -> StructuredPlan {
    StructuredPlan {
        title: "Todo App".to_string(),
        next_steps: vec!["Sketch screens".to_string()],
        ..Default::default()
    }
}

async fn open(gateway: Arc<TestGateway>) -> PlanSession {
    PlanSession::open(gateway, Arc::new(MemoryStore::new()), SessionConfig::default())
        .await
        .unwrap()
}

/// Poll until `check` passes, failing the test after two seconds
async fn wait_until<F>(check: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_first_message_triggers_synthesis() {
    let gateway = Arc::new(TestGateway::new(todo_plan()));
    let session = open(gateway.clone()).await;
    assert_eq!(session.log().await.size(), 1);

    let reply = session.send_message("Build a todo app").await;
    assert_eq!(reply, "Tell me more.");
    assert_eq!(session.log().await.size(), 3);

    session.settle().await;
    assert_eq!(session.current_plan().await, Some(todo_plan()));
    assert_eq!(gateway.synth_calls(), 1);
}

#[tokio::test]
async fn test_maybe_resynthesize_below_threshold_is_noop() {
    let gateway = Arc::new(TestGateway::new(todo_plan()));
    let session = open(gateway.clone()).await;
    let mut events = session.subscribe();

    let outcome = session.maybe_resynthesize().await;

    assert_eq!(outcome, SynthesisOutcome::Skipped(SkipReason::NotEnoughTurns));
    assert!(session.current_plan().await.is_none());
    assert_eq!(gateway.synth_calls(), 0);
    assert!(events.try_recv().is_err(), "no synthesis may start");
}

#[tokio::test]
async fn test_force_while_synthesizing_issues_no_second_call() {
    let gate = Arc::new(Semaphore::new(0));
    let gateway = Arc::new(TestGateway {
        synth_gate: Some(gate.clone()),
        ..TestGateway::new(todo_plan())
    });
    let session = open(gateway.clone()).await;

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.force_resynthesize().await }
    });
    wait_until(|| session.is_synthesizing()).await;

    assert_eq!(
        session.force_resynthesize().await,
        SynthesisOutcome::Skipped(SkipReason::AlreadyRunning)
    );
    assert_eq!(
        session.maybe_resynthesize().await,
        SynthesisOutcome::Skipped(SkipReason::NotEnoughTurns)
    );
    assert_eq!(gateway.synth_calls(), 1);

    gate.add_permits(1);
    assert_eq!(first.await.unwrap(), SynthesisOutcome::Applied);
    assert!(!session.is_synthesizing());
    assert_eq!(gateway.synth_calls(), 1);
}

#[tokio::test]
async fn test_gateway_failures_degrade_quietly() {
    let gateway = Arc::new(TestGateway::failing());
    let session = open(gateway.clone()).await;

    let reply = session.send_message("Build a todo app").await;
    session.settle().await;

    assert_eq!(reply, "Sorry, I encountered an error. Please try again.");
    let log = session.log().await;
    assert_eq!(log.size(), 3);
    assert_eq!(log.all()[2].text, reply);
    assert!(session.current_plan().await.is_none());
    assert_eq!(gateway.synth_calls(), 1);
    assert!(!session.is_synthesizing());
}

#[tokio::test]
async fn test_failed_synthesis_keeps_existing_plan() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let session = PlanSession::open(
        Arc::new(TestGateway::new(todo_plan())),
        store.clone(),
        SessionConfig::default(),
    )
    .await
    .unwrap();
    session.force_resynthesize().await;
    session.settle().await;

    // Same store, gateway that now fails
    let reopened = PlanSession::open(Arc::new(TestGateway::failing()), store, SessionConfig::default())
        .await
        .unwrap();
    assert_eq!(reopened.current_plan().await, Some(todo_plan()));

    assert_eq!(reopened.force_resynthesize().await, SynthesisOutcome::NoUpdate);
    assert_eq!(reopened.current_plan().await, Some(todo_plan()));
}

#[tokio::test]
async fn test_cancel_leaves_committed_plan_untouched() {
    let session = open(Arc::new(TestGateway::new(todo_plan()))).await;
    session.force_resynthesize().await;
    let before = session.current_plan().await;

    session.open_edit().await.unwrap();
    session.edit(|p| p.title = "Scratch".to_string()).await.unwrap();
    session
        .apply_edit(PlanEdit::RemoveItem {
            list: ListField::NextSteps,
            index: 0,
        })
        .await
        .unwrap();
    session.edit(|p| p.timeline.milestones.push(Milestone::default())).await.unwrap();
    session.cancel_edit().await.unwrap();

    assert_eq!(session.current_plan().await, before);
    assert!(!session.is_editing().await);
}

#[tokio::test]
async fn test_commit_replaces_plan_with_draft() {
    let session = open(Arc::new(TestGateway::new(todo_plan()))).await;
    session.force_resynthesize().await;
    let mut events = session.subscribe();

    session.open_edit().await.unwrap();
    session
        .apply_edit(PlanEdit::SetTitle {
            value: "Todo App v2".to_string(),
        })
        .await
        .unwrap();
    session
        .apply_edit(PlanEdit::AppendItem {
            list: ListField::Tools,
        })
        .await
        .unwrap();
    let draft = session.edit_draft().await.unwrap();

    let committed = session.commit_edit().await.unwrap();

    assert_eq!(committed, draft);
    assert_eq!(session.current_plan().await, Some(draft));
    assert_eq!(events.recv().await.unwrap(), SessionEvent::EditOpened);
    assert_eq!(events.recv().await.unwrap(), SessionEvent::EditClosed { committed: true });
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::PlanChanged {
            source: PlanSource::Edit
        }
    );
}

#[tokio::test]
async fn test_bad_edit_is_rejected_and_draft_kept() {
    let session = open(Arc::new(TestGateway::new(todo_plan()))).await;
    assert!(matches!(
        session.apply_edit(PlanEdit::SetTitle { value: "x".to_string() }).await,
        Err(SessionError::NoOpenTransaction)
    ));

    session.force_resynthesize().await;
    session.open_edit().await.unwrap();
    let err = session
        .apply_edit(PlanEdit::RemoveItem {
            list: ListField::NextSteps,
            index: 5,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Edit(_)));
    assert_eq!(session.edit_draft().await, Some(todo_plan()));
}

#[tokio::test]
async fn test_synthesis_started_before_commit_is_discarded() {
    let gate = Arc::new(Semaphore::new(0));
    let gateway = Arc::new(TestGateway {
        synth_gate: Some(gate.clone()),
        ..TestGateway::new(todo_plan())
    });
    let session = open(gateway.clone()).await;

    // Seed a plan without the latch getting in the way
    gate.add_permits(1);
    session.force_resynthesize().await;

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.force_resynthesize().await }
    });
    wait_until(|| session.is_synthesizing()).await;

    session.open_edit().await.unwrap();
    session.edit(|p| p.title = "Hand edited".to_string()).await.unwrap();
    let committed = session.commit_edit().await.unwrap();

    gate.add_permits(1);
    assert_eq!(pending.await.unwrap(), SynthesisOutcome::Discarded);
    assert_eq!(session.current_plan().await, Some(committed));
}

#[tokio::test]
async fn test_synthesis_during_open_edit_updates_plan_not_draft() {
    let session = open(Arc::new(TestGateway::new(todo_plan()))).await;
    session.force_resynthesize().await;

    session.open_edit().await.unwrap();
    session.edit(|p| p.title = "Draft title".to_string()).await.unwrap();

    assert_eq!(session.force_resynthesize().await, SynthesisOutcome::Applied);
    assert_eq!(session.edit_draft().await.unwrap().title, "Draft title");
    assert!(session.status().await.edit_stale);

    // The later writer wins
    session.commit_edit().await.unwrap();
    assert_eq!(session.current_plan().await.unwrap().title, "Draft title");
}

#[tokio::test]
async fn test_reset_clears_plan_and_reseeds_greeting() {
    let store = Arc::new(MemoryStore::new());
    let session = PlanSession::open(
        Arc::new(TestGateway::new(todo_plan())),
        store.clone(),
        SessionConfig::default(),
    )
    .await
    .unwrap();
    session.send_message("Build a todo app").await;
    session.settle().await;
    assert!(session.current_plan().await.is_some());

    session.reset_session().await.unwrap();

    assert!(session.current_plan().await.is_none());
    let log = session.log().await;
    assert_eq!(log.size(), 1);
    assert_eq!(log.all()[0].text, SessionConfig::default().greeting);
    assert_eq!(store.keys().await.unwrap(), vec!["default/chat_history".to_string()]);
}

#[tokio::test]
async fn test_commit_rejected_by_store_keeps_edit_open() {
    let store = Arc::new(FlakyStore::default());
    let session = PlanSession::open(
        Arc::new(TestGateway::new(todo_plan())),
        store.clone(),
        SessionConfig::default(),
    )
    .await
    .unwrap();
    session.force_resynthesize().await;
    session.settle().await;
    session.open_edit().await.unwrap();
    session.edit(|p| p.title = "Edited".to_string()).await.unwrap();
    let mut events = session.subscribe();

    store.fail_writes(true);
    assert!(matches!(session.commit_edit().await, Err(SessionError::Store(_))));

    assert_eq!(session.current_plan().await, Some(todo_plan()));
    assert!(session.is_editing().await);
    assert_eq!(session.edit_draft().await.unwrap().title, "Edited");
    assert!(events.try_recv().is_err());

    // The same edit commits once the store recovers
    store.fail_writes(false);
    let committed = session.commit_edit().await.unwrap();
    assert_eq!(committed.title, "Edited");
    assert_eq!(session.current_plan().await, Some(committed));
    assert!(!session.is_editing().await);
}

#[tokio::test]
async fn test_reset_rejected_by_store_still_reseeds_greeting() {
    let store = Arc::new(FlakyStore::default());
    let session = PlanSession::open(
        Arc::new(TestGateway::new(todo_plan())),
        store.clone(),
        SessionConfig::default(),
    )
    .await
    .unwrap();
    session.send_message("Build a todo app").await;
    session.settle().await;

    store.fail_writes(true);
    assert!(matches!(session.reset_session().await, Err(SessionError::Store(_))));

    let log = session.log().await;
    assert_eq!(log.size(), 1);
    assert_eq!(log.all()[0].text, SessionConfig::default().greeting);
    assert!(session.current_plan().await.is_none());
}

#[tokio::test]
async fn test_stalled_store_does_not_block_sends() {
    let store = Arc::new(FlakyStore::default());
    let session = PlanSession::open(
        Arc::new(TestGateway::new(todo_plan())),
        store.clone(),
        SessionConfig::default(),
    )
    .await
    .unwrap();

    store.hold_writes();
    let reply = tokio::time::timeout(Duration::from_secs(2), session.send_message("Build a todo app"))
        .await
        .expect("send blocked on the store");
    assert_eq!(reply, "Tell me more.");
    assert_eq!(session.log().await.size(), 3);

    store.release_writes();
    session.settle().await;
    let raw = store.get("default/chat_history").await.unwrap().unwrap();
    let stored: Vec<Turn> = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored.len(), 3);
    assert!(store.get("default/project_plan").await.unwrap().is_some());
}

#[tokio::test]
async fn test_inspect_does_not_write_to_store() {
    let store = Arc::new(MemoryStore::new());
    let session = PlanSession::inspect(
        Arc::new(TestGateway::failing()),
        store.clone(),
        SessionConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(session.log().await.size(), 1);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_reply_arriving_after_reset_is_dropped() {
    let gate = Arc::new(Semaphore::new(0));
    let gateway = Arc::new(TestGateway {
        converse_gate: Some(gate.clone()),
        ..TestGateway::new(todo_plan())
    });
    let session = open(gateway.clone()).await;

    let sending = tokio::spawn({
        let session = session.clone();
        async move { session.send_message("Build a todo app").await }
    });
    wait_until(|| gateway.converse_calls.load(Ordering::SeqCst) == 1).await;
    assert!(session.is_sending());
    assert_eq!(session.log().await.size(), 2);

    session.reset_session().await.unwrap();
    gate.add_permits(1);

    assert_eq!(sending.await.unwrap(), "Tell me more.");
    session.settle().await;
    assert_eq!(session.log().await.size(), 1);
    assert!(session.current_plan().await.is_none());
    assert!(!session.is_sending());
}

#[tokio::test]
async fn test_concurrent_sends_append_in_call_order() {
    let gate = Arc::new(Semaphore::new(0));
    let gateway = Arc::new(TestGateway {
        converse_gate: Some(gate.clone()),
        ..TestGateway::new(todo_plan())
    });
    let session = open(gateway.clone()).await;

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.send_message("first").await }
    });
    wait_until(|| gateway.converse_calls.load(Ordering::SeqCst) == 1).await;
    let second = tokio::spawn({
        let session = session.clone();
        async move { session.send_message("second").await }
    });
    wait_until(|| gateway.converse_calls.load(Ordering::SeqCst) == 2).await;

    gate.add_permits(2);
    first.await.unwrap();
    second.await.unwrap();
    session.settle().await;

    let log = session.log().await;
    assert_eq!(log.size(), 5);
    assert_eq!(log.all()[1].text, "first");
    assert_eq!(log.all()[2].text, "second");
}

#[tokio::test]
async fn test_file_store_rehydrates_session() {
    let dir = tempdir().unwrap();
    let config = SessionConfig {
        id: "todo".to_string(),
        ..Default::default()
    };

    let (log, plan) = {
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let session = PlanSession::open(Arc::new(TestGateway::new(todo_plan())), store, config.clone())
            .await
            .unwrap();
        session.send_message("Build a todo app").await;
        session.send_message("For my family").await;
        session.settle().await;
        (session.log().await, session.current_plan().await)
    };

    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let reopened = PlanSession::open(Arc::new(TestGateway::failing()), store, config)
        .await
        .unwrap();
    let reloaded = reopened.log().await;

    assert_eq!(reloaded, log);
    for (a, b) in reloaded.all().iter().zip(log.all()) {
        assert_eq!(a.timestamp.timestamp_millis(), b.timestamp.timestamp_millis());
    }
    assert_eq!(reopened.current_plan().await, plan);
    assert!(plan.is_some());
}

#[tokio::test]
async fn test_sessions_are_isolated_by_id() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let gateway = Arc::new(TestGateway::new(todo_plan()));
    let a = PlanSession::open(
        gateway.clone(),
        store.clone(),
        SessionConfig {
            id: "a".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    a.send_message("Build a todo app").await;
    a.settle().await;

    let b = PlanSession::open(
        gateway,
        store,
        SessionConfig {
            id: "b".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(b.log().await.size(), 1);
    assert!(b.current_plan().await.is_none());
    assert_eq!(b.session_id(), "b");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_each_send_adds_two_turns(
        messages in prop::collection::vec("[a-z][a-z ]{0,15}", 0..6),
        fail in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (before, after) = runtime.block_on(async {
            let gateway = if fail { TestGateway::failing() } else { TestGateway::new(todo_plan()) };
            let session = open(Arc::new(gateway)).await;
            let before = session.log().await.size();
            for message in &messages {
                session.send_message(message).await;
            }
            session.settle().await;
            (before, session.log().await.size())
        });
        prop_assert_eq!(after, before + 2 * messages.len());
    }
}
