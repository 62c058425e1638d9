// Shipment registry: registration, lookup and org-scoped listing.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::TenantResolver;
use crate::domain::shipment::require_text;
use crate::domain::{
    validate_bags, Bag, RouteType, Shipment, ShipmentId, ShipmentSnapshot, ShipmentSummary,
};
use crate::error::CoreError;
use crate::store::{InsertOutcome, ShipmentFilter, ShipmentStore};

/// Attempts at claiming a generated id before giving up.
const GENERATED_ID_ATTEMPTS: u32 = 5;

/// Registration payload. `id` is generated as `SHIP-YYYYMMDD-NNN` when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShipment {
    #[serde(default)]
    pub id: Option<ShipmentId>,
    pub supplier: String,
    pub warehouse: String,
    pub route_type: RouteType,
    #[serde(default)]
    pub shipment_date: Option<NaiveDate>,
    #[serde(default, alias = "bags_data")]
    pub bags: Vec<Bag>,
}

pub struct ShipmentRegistry {
    store: Arc<dyn ShipmentStore>,
    resolver: Arc<TenantResolver>,
}

impl ShipmentRegistry {
    pub fn new(store: Arc<dyn ShipmentStore>, resolver: Arc<TenantResolver>) -> Self {
        Self { store, resolver }
    }

    /// Register a shipment in the caller's organization with no status.
    pub async fn register(
        &self,
        credential: &str,
        new: NewShipment,
    ) -> Result<ShipmentSnapshot, CoreError> {
        let actor = self.resolver.resolve(credential).await?;
        let scope = actor.scope();

        let supplier = require_text("supplier", &new.supplier)?;
        let warehouse = require_text("warehouse", &new.warehouse)?;
        validate_bags(&new.bags)?;

        let now = Utc::now();
        let mut shipment = Shipment {
            id: match &new.id {
                Some(id) => id.clone(),
                None => ShipmentId::generated(now.date_naive(), 1),
            },
            organization_id: actor.organization_id(),
            supplier,
            warehouse,
            route_type: new.route_type,
            shipment_date: new.shipment_date,
            current_status: None,
            bags: new.bags,
            created_at: now,
            updated_at: now,
        };

        match new.id {
            Some(id) => {
                if self.store.insert_shipment(&scope, shipment.clone()).await?
                    == InsertOutcome::AlreadyExists
                {
                    return Err(CoreError::AlreadyExists(id));
                }
            }
            None => {
                let today = now.date_naive();
                let prefix = ShipmentId::daily_prefix(today);
                let mut sequence = self.store.count_with_prefix(&scope, &prefix).await? + 1;
                let mut claimed = false;
                for _ in 0..GENERATED_ID_ATTEMPTS {
                    shipment.id = ShipmentId::generated(today, sequence);
                    match self.store.insert_shipment(&scope, shipment.clone()).await? {
                        InsertOutcome::Inserted => {
                            claimed = true;
                            break;
                        }
                        InsertOutcome::AlreadyExists => {
                            debug!(shipment.id = %shipment.id, "Generated id taken, trying next");
                            sequence += 1;
                        }
                    }
                }
                if !claimed {
                    return Err(CoreError::AlreadyExists(shipment.id));
                }
            }
        }

        info!(
            action = "create_shipment",
            shipment.id = %shipment.id,
            organization.id = %actor.organization_id(),
            user.id = %actor.user_id(),
            bags = shipment.bags.len(),
            "Shipment registered"
        );
        Ok(ShipmentSnapshot::new(&shipment, Vec::new()))
    }

    pub async fn get(
        &self,
        credential: &str,
        shipment_id: &ShipmentId,
    ) -> Result<ShipmentSnapshot, CoreError> {
        let actor = self.resolver.resolve(credential).await?;
        self.store
            .load_snapshot(&actor.scope(), shipment_id)
            .await?
            .ok_or(CoreError::NotFound)
    }

    pub async fn list(
        &self,
        credential: &str,
        filter: &ShipmentFilter,
    ) -> Result<Vec<ShipmentSummary>, CoreError> {
        let actor = self.resolver.resolve(credential).await?;
        let shipments = self.store.list_shipments(&actor.scope(), filter).await?;
        Ok(shipments.iter().map(ShipmentSummary::from).collect())
    }
}
