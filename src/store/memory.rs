use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    CommitOutcome, ContentsCommit, ContentsOutcome, IdempotencyRecord, InsertOutcome,
    ShipmentFilter, ShipmentStore, StoreError, TenantScope, TransitionCommit, UserDirectory,
};
use crate::domain::{
    ChangeLogEntry, IdempotencyKey, Organization, OrganizationId, Shipment, ShipmentId,
    ShipmentSnapshot, StatusEvent, User, UserId,
};

type ShipmentKey = (OrganizationId, ShipmentId);

#[derive(Debug, Default)]
struct MemoryState {
    organizations: HashMap<OrganizationId, Organization>,
    users: HashMap<UserId, User>,
    shipments: HashMap<ShipmentKey, Shipment>,
    events: HashMap<ShipmentKey, Vec<StatusEvent>>,
    idempotency: HashMap<(OrganizationId, ShipmentId, IdempotencyKey), IdempotencyRecord>,
    changes: HashMap<ShipmentKey, Vec<ChangeLogEntry>>,
    next_event_id: i64,
    next_change_id: i64,
}

impl MemoryState {
    fn snapshot(&self, key: &ShipmentKey) -> Option<ShipmentSnapshot> {
        let shipment = self.shipments.get(key)?;
        let events = self.events.get(key).cloned().unwrap_or_default();
        Some(ShipmentSnapshot::new(shipment, events))
    }
}

/// Process-local store. All rows are keyed by organization, and one mutex
/// serializes every write, which makes each commit atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_organization(&self, organization: Organization) {
        let mut state = self.state.lock().await;
        state.organizations.insert(organization.id, organization);
    }

    pub async fn add_user(&self, user: User) {
        let mut state = self.state.lock().await;
        state.users.insert(user.id, user);
    }

    /// Move a user to another organization, as tenant administration would.
    pub async fn reassign_user(&self, user_id: UserId, organization_id: OrganizationId) -> bool {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&user_id) {
            Some(user) => {
                user.organization_id = organization_id;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }
}

#[async_trait]
impl ShipmentStore for InMemoryStore {
    async fn insert_shipment(
        &self,
        scope: &TenantScope,
        mut shipment: Shipment,
    ) -> Result<InsertOutcome, StoreError> {
        // The row always lands in the caller's organization.
        shipment.organization_id = scope.organization_id();
        let key = (scope.organization_id(), shipment.id.clone());
        let mut state = self.state.lock().await;
        if state.shipments.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        state.shipments.insert(key, shipment);
        Ok(InsertOutcome::Inserted)
    }

    async fn count_with_prefix(
        &self,
        scope: &TenantScope,
        prefix: &str,
    ) -> Result<u32, StoreError> {
        let state = self.state.lock().await;
        let count = state
            .shipments
            .keys()
            .filter(|(org, id)| *org == scope.organization_id() && id.as_str().starts_with(prefix))
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn load_shipment(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
    ) -> Result<Option<Shipment>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .shipments
            .get(&(scope.organization_id(), id.clone()))
            .cloned())
    }

    async fn load_events(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
    ) -> Result<Vec<StatusEvent>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .get(&(scope.organization_id(), id.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_shipments(
        &self,
        scope: &TenantScope,
        filter: &ShipmentFilter,
    ) -> Result<Vec<Shipment>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<Shipment> = state
            .shipments
            .iter()
            .filter(|((org, _), _)| *org == scope.organization_id())
            .map(|(_, shipment)| shipment)
            .filter(|shipment| filter.status.is_none() || shipment.current_status == filter.status)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn find_idempotent_outcome(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
        key: &IdempotencyKey,
    ) -> Result<Option<ShipmentSnapshot>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .idempotency
            .get(&(scope.organization_id(), id.clone(), key.clone()))
            .map(|record| record.snapshot.clone()))
    }

    async fn commit_transition(
        &self,
        scope: &TenantScope,
        commit: TransitionCommit,
    ) -> Result<CommitOutcome, StoreError> {
        let org = scope.organization_id();
        let key = (org, commit.shipment_id.clone());
        let idem_key = (org, commit.shipment_id.clone(), commit.idempotency_key.clone());

        let mut state = self.state.lock().await;
        if let Some(record) = state.idempotency.get(&idem_key) {
            return Ok(CommitOutcome::Replayed(record.snapshot.clone()));
        }
        let Some(shipment) = state.shipments.get_mut(&key) else {
            return Ok(CommitOutcome::Missing);
        };
        if shipment.current_status != commit.expected {
            debug!(
                shipment.id = %commit.shipment_id,
                expected = ?commit.expected,
                actual = ?shipment.current_status,
                "Compare-and-set lost"
            );
            return Ok(CommitOutcome::Conflict);
        }

        shipment.current_status = Some(commit.next);
        shipment.updated_at = commit.changed_at;

        state.next_event_id += 1;
        let event = StatusEvent {
            id: state.next_event_id,
            shipment_id: commit.shipment_id.clone(),
            organization_id: org,
            status: commit.next,
            changed_by: commit.changed_by,
            changed_at: commit.changed_at,
            notes: commit.notes,
        };
        state.events.entry(key.clone()).or_default().push(event);

        let snapshot = state
            .snapshot(&key)
            .ok_or_else(|| StoreError::Corrupt(format!("shipment {} vanished mid-commit", commit.shipment_id)))?;
        state.idempotency.insert(
            idem_key,
            IdempotencyRecord {
                snapshot: snapshot.clone(),
                recorded_at: commit.changed_at,
            },
        );
        Ok(CommitOutcome::Committed(snapshot))
    }

    async fn commit_contents(
        &self,
        scope: &TenantScope,
        commit: ContentsCommit,
    ) -> Result<Option<ContentsOutcome>, StoreError> {
        let org = scope.organization_id();
        let key = (org, commit.shipment_id.clone());

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(shipment) = state.shipments.get_mut(&key) else {
            return Ok(None);
        };
        let field_changes = commit.patch.diff(shipment);
        if field_changes.is_empty() {
            return Ok(Some(ContentsOutcome {
                shipment: shipment.clone(),
                changes: Vec::new(),
            }));
        }
        commit.patch.apply_to(shipment);
        shipment.updated_at = commit.changed_at;
        let updated = shipment.clone();

        let mut written = Vec::with_capacity(field_changes.len());
        for change in field_changes {
            state.next_change_id += 1;
            written.push(ChangeLogEntry {
                id: state.next_change_id,
                shipment_id: commit.shipment_id.clone(),
                organization_id: org,
                changed_by: commit.changed_by,
                change_type: change.change_type,
                old_value: change.old_value,
                new_value: change.new_value,
                changed_at: commit.changed_at,
            });
        }
        state
            .changes
            .entry(key)
            .or_default()
            .extend(written.iter().cloned());

        Ok(Some(ContentsOutcome {
            shipment: updated,
            changes: written,
        }))
    }

    async fn load_changes(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
    ) -> Result<Vec<ChangeLogEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .changes
            .get(&(scope.organization_id(), id.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn purge_idempotency(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.idempotency.len();
        state.idempotency.retain(|_, record| record.recorded_at >= cutoff);
        Ok((before - state.idempotency.len()) as u64)
    }
}
