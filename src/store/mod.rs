// Shipment store: persisted aggregates, their status history, idempotency
// records and change log.
//
// Every tenant-scoped operation takes a `TenantScope` and backends must apply
// it as a filter at the data-access boundary, never as a check on rows that
// were already loaded. Only the auth layer can mint a scope.

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    ChangeLogEntry, IdempotencyKey, OrganizationId, Shipment, ShipmentId, ShipmentPatch,
    ShipmentSnapshot, Stage, StatusEvent, User, UserId, ValidationError,
};

pub use memory::InMemoryStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteStore;

pub const DEFAULT_LIST_LIMIT: u32 = 20;
pub const MAX_LIST_LIMIT: u32 = 100;

/// Faults in the persistence layer. These are the only errors the core
/// propagates as unrecoverable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Organization filter applied to every tenant-scoped read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TenantScope {
    organization_id: OrganizationId,
}

impl TenantScope {
    pub(crate) fn new(organization_id: OrganizationId) -> Self {
        Self { organization_id }
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentFilter {
    pub status: Option<Stage>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for ShipmentFilter {
    fn default() -> Self {
        Self {
            status: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

impl ShipmentFilter {
    pub fn new(status: Option<Stage>, limit: u32, offset: u32) -> Result<Self, ValidationError> {
        if limit == 0 || limit > MAX_LIST_LIMIT {
            return Err(ValidationError::ListLimit {
                got: limit,
                max: MAX_LIST_LIMIT,
            });
        }
        Ok(Self {
            status,
            limit,
            offset,
        })
    }
}

/// Everything written by one accepted transition. Applied all together or
/// not at all.
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    pub shipment_id: ShipmentId,
    /// Status the decision was made against; the commit is a compare-and-set on it.
    pub expected: Option<Stage>,
    pub next: Stage,
    pub changed_by: UserId,
    pub changed_at: DateTime<Utc>,
    pub idempotency_key: IdempotencyKey,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Status, event and idempotency record were written.
    Committed(ShipmentSnapshot),
    /// The key was already recorded for this shipment; nothing was written.
    Replayed(ShipmentSnapshot),
    /// `current_status` no longer equals the expected value.
    Conflict,
    /// No shipment with this id in the scope.
    Missing,
}

#[derive(Debug, Clone)]
pub struct ContentsCommit {
    pub shipment_id: ShipmentId,
    pub patch: ShipmentPatch,
    pub changed_by: UserId,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentsOutcome {
    pub shipment: Shipment,
    pub changes: Vec<ChangeLogEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Stored outcome of an accepted confirmation, keyed per (shipment, key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub snapshot: ShipmentSnapshot,
    pub recorded_at: DateTime<Utc>,
}

/// Lookup of users by id, used to re-check credential membership.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: UserId) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait ShipmentStore: UserDirectory {
    async fn insert_shipment(
        &self,
        scope: &TenantScope,
        shipment: Shipment,
    ) -> Result<InsertOutcome, StoreError>;

    /// Number of shipments in the scope whose id starts with `prefix`.
    async fn count_with_prefix(&self, scope: &TenantScope, prefix: &str)
        -> Result<u32, StoreError>;

    async fn load_shipment(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
    ) -> Result<Option<Shipment>, StoreError>;

    async fn load_events(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
    ) -> Result<Vec<StatusEvent>, StoreError>;

    /// Shipments in the scope, most recently created first.
    async fn list_shipments(
        &self,
        scope: &TenantScope,
        filter: &ShipmentFilter,
    ) -> Result<Vec<Shipment>, StoreError>;

    async fn find_idempotent_outcome(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
        key: &IdempotencyKey,
    ) -> Result<Option<ShipmentSnapshot>, StoreError>;

    /// Atomically compare-and-set `current_status`, append the status event
    /// and record the idempotency outcome.
    async fn commit_transition(
        &self,
        scope: &TenantScope,
        commit: TransitionCommit,
    ) -> Result<CommitOutcome, StoreError>;

    /// Apply a contents patch and its change-log entries in one write.
    /// Returns `None` when the shipment is not in the scope.
    async fn commit_contents(
        &self,
        scope: &TenantScope,
        commit: ContentsCommit,
    ) -> Result<Option<ContentsOutcome>, StoreError>;

    async fn load_changes(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
    ) -> Result<Vec<ChangeLogEntry>, StoreError>;

    /// Drop idempotency records older than `cutoff` across all tenants.
    async fn purge_idempotency(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn load_snapshot(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
    ) -> Result<Option<ShipmentSnapshot>, StoreError> {
        let Some(shipment) = self.load_shipment(scope, id).await? else {
            return Ok(None);
        };
        let events = self.load_events(scope, id).await?;
        Ok(Some(ShipmentSnapshot::new(&shipment, events)))
    }
}
