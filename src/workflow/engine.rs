use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use super::notify::{NotificationDispatcher, TransitionNotice};
use crate::audit::{self, AuditReport};
use crate::auth::TenantResolver;
use crate::config::WorkflowConfig;
use crate::domain::{IdempotencyKey, ShipmentId, ShipmentSnapshot, Stage, ValidationError};
use crate::error::CoreError;
use crate::policy::{self, Decision};
use crate::store::{CommitOutcome, ShipmentStore, TransitionCommit};
use crate::telemetry::{create_workflow_span, generate_correlation_id, record_organization};

pub const MAX_NOTES_LEN: usize = 1000;

/// One request to advance a shipment to its next stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub shipment_id: ShipmentId,
    pub action: Stage,
    /// Generated when absent, which makes the request non-retryable.
    pub idempotency_key: Option<IdempotencyKey>,
    pub notes: Option<String>,
}

impl ConfirmRequest {
    pub fn new(shipment_id: ShipmentId, action: Stage) -> Self {
        Self {
            shipment_id,
            action,
            idempotency_key: None,
            notes: None,
        }
    }

    pub fn with_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

fn normalize_notes(notes: Option<String>) -> Result<Option<String>, ValidationError> {
    let Some(notes) = notes else {
        return Ok(None);
    };
    let trimmed = notes.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_NOTES_LEN {
        return Err(ValidationError::NotesTooLong { max: MAX_NOTES_LEN });
    }
    Ok(Some(trimmed.to_string()))
}

/// Runs status confirmations end to end: resolve the actor, load under the
/// actor's scope, replay or decide, then commit with compare-and-set.
pub struct WorkflowEngine {
    store: Arc<dyn ShipmentStore>,
    resolver: Arc<TenantResolver>,
    dispatcher: NotificationDispatcher,
    settings: WorkflowConfig,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn ShipmentStore>,
        resolver: Arc<TenantResolver>,
        dispatcher: NotificationDispatcher,
        settings: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            dispatcher,
            settings,
        }
    }

    pub async fn confirm(
        &self,
        credential: &str,
        request: ConfirmRequest,
    ) -> Result<ShipmentSnapshot, CoreError> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span(
            "confirm_status",
            Some(request.shipment_id.as_str()),
            None,
            Some(&correlation_id),
        );
        self.confirm_inner(credential, request).instrument(span).await
    }

    async fn confirm_inner(
        &self,
        credential: &str,
        request: ConfirmRequest,
    ) -> Result<ShipmentSnapshot, CoreError> {
        let actor = self.resolver.resolve(credential).await?;
        record_organization(actor.organization_id());
        let scope = actor.scope();
        let notes = normalize_notes(request.notes)?;
        let key = request
            .idempotency_key
            .unwrap_or_else(IdempotencyKey::generate);
        let shipment_id = request.shipment_id;

        let attempts = self.settings.max_commit_attempts.max(1);
        for attempt in 1..=attempts {
            let shipment = self
                .store
                .load_shipment(&scope, &shipment_id)
                .await?
                .ok_or(CoreError::NotFound)?;

            if let Some(snapshot) = self
                .store
                .find_idempotent_outcome(&scope, &shipment_id, &key)
                .await?
            {
                info!(
                    shipment.id = %shipment_id,
                    user.id = %actor.user_id(),
                    idempotency_key = %key,
                    "Replaying recorded confirmation"
                );
                return Ok(snapshot);
            }

            let current = shipment.current_status;
            let next = match policy::decide(current, request.action, actor.role()) {
                Decision::Accept(next) => next,
                Decision::Reject(reason) => {
                    info!(
                        shipment.id = %shipment_id,
                        user.id = %actor.user_id(),
                        role = %actor.role(),
                        requested = %request.action,
                        reason = %reason,
                        "Transition rejected"
                    );
                    return Err(CoreError::Rejected(reason));
                }
            };

            let changed_at = Utc::now();
            let commit = TransitionCommit {
                shipment_id: shipment_id.clone(),
                expected: current,
                next,
                changed_by: actor.user_id(),
                changed_at,
                idempotency_key: key.clone(),
                notes: notes.clone(),
            };

            match self.store.commit_transition(&scope, commit).await? {
                CommitOutcome::Committed(snapshot) => {
                    info!(
                        action = "confirm_status",
                        shipment.id = %shipment_id,
                        organization.id = %actor.organization_id(),
                        user.id = %actor.user_id(),
                        status = %next,
                        "Shipment status confirmed"
                    );
                    self.dispatcher.dispatch(TransitionNotice {
                        organization_id: actor.organization_id(),
                        shipment_id: shipment_id.clone(),
                        previous: current,
                        status: next,
                        changed_by: actor.user_id(),
                        changed_at,
                    });
                    return Ok(snapshot);
                }
                CommitOutcome::Replayed(snapshot) => return Ok(snapshot),
                CommitOutcome::Missing => return Err(CoreError::NotFound),
                CommitOutcome::Conflict => {
                    debug!(
                        shipment.id = %shipment_id,
                        attempt,
                        "Status changed underneath, re-evaluating"
                    );
                }
            }
        }

        warn!(
            shipment.id = %shipment_id,
            attempts,
            "Giving up after repeated commit conflicts"
        );
        Err(CoreError::ConcurrencyConflict)
    }

    /// Delete idempotency records older than the configured retention.
    pub async fn purge_expired_idempotency(&self) -> Result<u64, CoreError> {
        let retention = self.settings.retention()?;
        let cutoff = Utc::now().checked_sub_signed(retention).ok_or(
            ValidationError::OutOfRange {
                field: "idempotency_retention_hours",
                got: self.settings.idempotency_retention_hours,
                min: 1,
                max: crate::config::MAX_RETENTION_HOURS,
            },
        )?;
        let purged = self.store.purge_idempotency(cutoff).await?;
        info!(purged, cutoff = %cutoff, "Purged expired idempotency records");
        Ok(purged)
    }

    /// Replay the shipment's history and compare it to its current status.
    pub async fn verify_history(
        &self,
        credential: &str,
        shipment_id: &ShipmentId,
    ) -> Result<AuditReport, CoreError> {
        let actor = self.resolver.resolve(credential).await?;
        let snapshot = self
            .store
            .load_snapshot(&actor.scope(), shipment_id)
            .await?
            .ok_or(CoreError::NotFound)?;

        let report = audit::verify(&snapshot, actor.organization_id());
        if !report.is_consistent() {
            warn!(
                shipment.id = %shipment_id,
                violations = report.violations.len(),
                "Status history is inconsistent"
            );
        }
        Ok(report)
    }
}
