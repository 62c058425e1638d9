use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Bag, OrganizationId, RouteType, Shipment, ShipmentId, Stage, Totals, UserId};

/// One accepted transition. Append-only audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: i64,
    pub shipment_id: ShipmentId,
    pub organization_id: OrganizationId,
    pub status: Stage,
    pub changed_by: UserId,
    pub changed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Supplier,
    Warehouse,
    RouteType,
    ShipmentDate,
    BagContents,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Supplier => "supplier",
            ChangeType::Warehouse => "warehouse",
            ChangeType::RouteType => "route_type",
            ChangeType::ShipmentDate => "shipment_date",
            ChangeType::BagContents => "bag_contents",
        }
    }
}

/// Field-level record of an aggregate edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: i64,
    pub shipment_id: ShipmentId,
    pub organization_id: OrganizationId,
    pub changed_by: UserId,
    pub change_type: ChangeType,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
    pub changed_at: DateTime<Utc>,
}

/// A change not yet assigned an id by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub change_type: ChangeType,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentView {
    pub id: ShipmentId,
    pub supplier: String,
    pub warehouse: String,
    pub route_type: RouteType,
    pub shipment_date: Option<NaiveDate>,
    pub current_status: Option<Stage>,
    pub bags: Vec<Bag>,
    pub totals: Totals,
}

/// The server-authoritative state handed back to callers: shipment fields,
/// derived totals and the event history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentSnapshot {
    pub shipment: ShipmentView,
    pub events: Vec<StatusEvent>,
}

impl ShipmentSnapshot {
    pub fn new(shipment: &Shipment, mut events: Vec<StatusEvent>) -> Self {
        events.sort_by(|a, b| b.changed_at.cmp(&a.changed_at).then(b.id.cmp(&a.id)));
        Self {
            shipment: ShipmentView {
                id: shipment.id.clone(),
                supplier: shipment.supplier.clone(),
                warehouse: shipment.warehouse.clone(),
                route_type: shipment.route_type,
                shipment_date: shipment.shipment_date,
                current_status: shipment.current_status,
                bags: shipment.bags.clone(),
                totals: shipment.totals(),
            },
            events,
        }
    }

    pub fn current_status(&self) -> Option<Stage> {
        self.shipment.current_status
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentSummary {
    pub id: ShipmentId,
    pub supplier: String,
    pub warehouse: String,
    pub current_status: Option<Stage>,
    pub totals: Totals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Shipment> for ShipmentSummary {
    fn from(shipment: &Shipment) -> Self {
        Self {
            id: shipment.id.clone(),
            supplier: shipment.supplier.clone(),
            warehouse: shipment.warehouse.clone(),
            current_status: shipment.current_status,
            totals: shipment.totals(),
            created_at: shipment.created_at,
            updated_at: shipment.updated_at,
        }
    }
}
