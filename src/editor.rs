// Aggregate editor: sparse edits of shipment contents, authorized by role
// alone. Never reads or writes current_status.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, Instrument};

use crate::auth::TenantResolver;
use crate::domain::{ChangeLogEntry, ShipmentId, ShipmentPatch, ShipmentSnapshot};
use crate::error::CoreError;
use crate::store::{ContentsCommit, ShipmentStore};
use crate::telemetry::{create_workflow_span, generate_correlation_id, record_organization};

pub struct AggregateEditor {
    store: Arc<dyn ShipmentStore>,
    resolver: Arc<TenantResolver>,
}

impl AggregateEditor {
    pub fn new(store: Arc<dyn ShipmentStore>, resolver: Arc<TenantResolver>) -> Self {
        Self { store, resolver }
    }

    /// Apply `patch` to the shipment and return the updated snapshot. Each
    /// changed field is written to the change log in the same store
    /// operation. A patch that changes nothing writes nothing.
    pub async fn apply_update(
        &self,
        credential: &str,
        shipment_id: &ShipmentId,
        patch: ShipmentPatch,
    ) -> Result<ShipmentSnapshot, CoreError> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span(
            "update_shipment",
            Some(shipment_id.as_str()),
            None,
            Some(&correlation_id),
        );

        async move {
            let actor = self.resolver.resolve(credential).await?;
            record_organization(actor.organization_id());
            if !actor.role().can_edit_contents() {
                return Err(CoreError::EditNotPermitted { role: actor.role() });
            }
            let patch = patch.validated()?;
            let scope = actor.scope();

            let outcome = self
                .store
                .commit_contents(
                    &scope,
                    ContentsCommit {
                        shipment_id: shipment_id.clone(),
                        patch,
                        changed_by: actor.user_id(),
                        changed_at: Utc::now(),
                    },
                )
                .await?
                .ok_or(CoreError::NotFound)?;

            if !outcome.changes.is_empty() {
                let fields: Vec<&str> = outcome
                    .changes
                    .iter()
                    .map(|c| c.change_type.as_str())
                    .collect();
                info!(
                    action = "update_shipment",
                    shipment.id = %shipment_id,
                    organization.id = %actor.organization_id(),
                    user.id = %actor.user_id(),
                    fields = ?fields,
                    "Shipment contents updated"
                );
            }

            let events = self.store.load_events(&scope, shipment_id).await?;
            Ok(ShipmentSnapshot::new(&outcome.shipment, events))
        }
        .instrument(span)
        .await
    }

    /// Change-log entries for a shipment, oldest first.
    pub async fn changes(
        &self,
        credential: &str,
        shipment_id: &ShipmentId,
    ) -> Result<Vec<ChangeLogEntry>, CoreError> {
        let actor = self.resolver.resolve(credential).await?;
        let scope = actor.scope();
        if self.store.load_shipment(&scope, shipment_id).await?.is_none() {
            return Err(CoreError::NotFound);
        }
        Ok(self.store.load_changes(&scope, shipment_id).await?)
    }
}
