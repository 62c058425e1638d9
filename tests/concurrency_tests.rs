mod fixtures;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use fixtures::*;
use shiptrack::config::WorkflowConfig;
use shiptrack::store::{
    CommitOutcome, ContentsCommit, ContentsOutcome, InsertOutcome, ShipmentFilter, ShipmentStore,
    StoreError, TenantScope, TransitionCommit, UserDirectory,
};
use shiptrack::{
    ChangeLogEntry, ConfirmRequest, ErrorKind, IdempotencyKey, InMemoryStore,
    NotificationDispatcher, RejectReason, Shipment, ShipmentId, ShipmentSnapshot, Stage,
    StatusEvent, User, UserId,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirms_have_one_winner() {
    let h = Arc::new(harness().await);
    let s1 = h.register(SUPPLIER_1, "S1").await;
    h.advance_to(&s1, Stage::SentFromFactory).await;

    let mut handles = Vec::new();
    for (actor, key) in [(FF_1, "ff-a"), (FF_1B, "ff-b")] {
        let h = Arc::clone(&h);
        let request = ConfirmRequest::new(s1.clone(), Stage::ShippedFromFf)
            .with_key(IdempotencyKey::parse(key).unwrap());
        handles.push(tokio::spawn(async move {
            h.core.workflow.confirm(&h.token(actor), request).await
        }));
    }

    let mut accepted = 0;
    let mut rejected = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => rejected.push(e.rejection()),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(rejected, vec![Some(RejectReason::WrongAction)]);

    let snapshot = h.core.registry.get(&h.token(ADMIN_1), &s1).await.unwrap();
    assert_eq!(snapshot.current_status(), Some(Stage::ShippedFromFf));
    assert_eq!(snapshot.events.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retries_with_one_key_apply_once() {
    let h = Arc::new(harness().await);
    let s1 = h.register(SUPPLIER_1, "S1").await;
    let request = ConfirmRequest::new(s1.clone(), Stage::SentFromFactory)
        .with_key(IdempotencyKey::parse("retry-1").unwrap());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let h = Arc::clone(&h);
        let request = request.clone();
        handles.push(tokio::spawn(async move {
            h.core.workflow.confirm(&h.token(SUPPLIER_1), request).await
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }
    assert!(outcomes.windows(2).all(|pair| pair[0] == pair[1]));

    let snapshot = h.core.registry.get(&h.token(ADMIN_1), &s1).await.unwrap();
    assert_eq!(snapshot.events.len(), 1);
}

enum Mode {
    /// Another writer lands the given commit just before ours.
    Interloper(Mutex<Option<TransitionCommit>>),
    /// Every compare-and-set loses.
    AlwaysConflict,
}

/// Delegates to an in-memory store but interferes with transition commits.
struct ContendedStore {
    inner: InMemoryStore,
    mode: Mode,
    commits: AtomicU32,
}

#[async_trait]
impl UserDirectory for ContendedStore {
    async fn find_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        self.inner.find_user(user_id).await
    }
}

#[async_trait]
impl ShipmentStore for ContendedStore {
    async fn insert_shipment(
        &self,
        scope: &TenantScope,
        shipment: Shipment,
    ) -> Result<InsertOutcome, StoreError> {
        self.inner.insert_shipment(scope, shipment).await
    }

    async fn count_with_prefix(&self, scope: &TenantScope, prefix: &str) -> Result<u32, StoreError> {
        self.inner.count_with_prefix(scope, prefix).await
    }

    async fn load_shipment(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
    ) -> Result<Option<Shipment>, StoreError> {
        self.inner.load_shipment(scope, id).await
    }

    async fn load_events(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
    ) -> Result<Vec<StatusEvent>, StoreError> {
        self.inner.load_events(scope, id).await
    }

    async fn list_shipments(
        &self,
        scope: &TenantScope,
        filter: &ShipmentFilter,
    ) -> Result<Vec<Shipment>, StoreError> {
        self.inner.list_shipments(scope, filter).await
    }

    async fn find_idempotent_outcome(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
        key: &IdempotencyKey,
    ) -> Result<Option<ShipmentSnapshot>, StoreError> {
        self.inner.find_idempotent_outcome(scope, id, key).await
    }

    async fn commit_transition(
        &self,
        scope: &TenantScope,
        commit: TransitionCommit,
    ) -> Result<CommitOutcome, StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            Mode::AlwaysConflict => Ok(CommitOutcome::Conflict),
            Mode::Interloper(pending) => {
                if let Some(first) = pending.lock().await.take() {
                    let outcome = self.inner.commit_transition(scope, first).await?;
                    assert!(matches!(outcome, CommitOutcome::Committed(_)));
                }
                self.inner.commit_transition(scope, commit).await
            }
        }
    }

    async fn commit_contents(
        &self,
        scope: &TenantScope,
        commit: ContentsCommit,
    ) -> Result<Option<ContentsOutcome>, StoreError> {
        self.inner.commit_contents(scope, commit).await
    }

    async fn load_changes(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
    ) -> Result<Vec<ChangeLogEntry>, StoreError> {
        self.inner.load_changes(scope, id).await
    }

    async fn purge_idempotency(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.purge_idempotency(cutoff).await
    }
}

async fn contended(mode: Mode) -> Harness<ContendedStore> {
    let inner = InMemoryStore::new();
    for user in users() {
        inner.add_user(user).await;
    }
    let store = Arc::new(ContendedStore {
        inner,
        mode,
        commits: AtomicU32::new(0),
    });
    harness_with(store, NotificationDispatcher::disabled(), WorkflowConfig::default())
}

#[tokio::test]
async fn test_lost_race_is_reevaluated_into_wrong_action() {
    let interloper = TransitionCommit {
        shipment_id: sid("S1"),
        expected: None,
        next: Stage::SentFromFactory,
        changed_by: ADMIN_1,
        changed_at: Utc::now(),
        idempotency_key: IdempotencyKey::parse("other-writer").unwrap(),
        notes: None,
    };
    let h = contended(Mode::Interloper(Mutex::new(Some(interloper)))).await;
    let s1 = h.register(SUPPLIER_1, "S1").await;

    let err = h
        .core
        .workflow
        .confirm(
            &h.token(SUPPLIER_1),
            ConfirmRequest::new(s1.clone(), Stage::SentFromFactory),
        )
        .await
        .unwrap_err();
    assert_eq!(err.rejection(), Some(RejectReason::WrongAction));
    assert_eq!(h.store.commits.load(Ordering::SeqCst), 1);

    let snapshot = h.core.registry.get(&h.token(ADMIN_1), &s1).await.unwrap();
    assert_eq!(snapshot.events.len(), 1);
    assert_eq!(snapshot.events[0].changed_by, ADMIN_1);
}

#[tokio::test]
async fn test_exhausted_attempts_report_conflict() {
    let h = contended(Mode::AlwaysConflict).await;
    let s1 = h.register(SUPPLIER_1, "S1").await;

    let err = h
        .core
        .workflow
        .confirm(
            &h.token(SUPPLIER_1),
            ConfirmRequest::new(s1.clone(), Stage::SentFromFactory),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
    assert_eq!(
        h.store.commits.load(Ordering::SeqCst),
        WorkflowConfig::default().max_commit_attempts
    );

    let snapshot = h.core.registry.get(&h.token(ADMIN_1), &s1).await.unwrap();
    assert_eq!(snapshot.current_status(), None);
}
