use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::shipment::require_text;
use super::{validate_bags, Bag, ChangeType, FieldChange, RouteType, Shipment, ValidationError};

/// Sparse edit of shipment contents. Absent fields are left untouched.
/// There is deliberately no status field: unknown fields are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShipmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_type: Option<RouteType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment_date: Option<NaiveDate>,
    #[serde(default, alias = "bags_data", skip_serializing_if = "Option::is_none")]
    pub bags: Option<Vec<Bag>>,
}

impl ShipmentPatch {
    pub fn is_empty(&self) -> bool {
        self.supplier.is_none()
            && self.warehouse.is_none()
            && self.route_type.is_none()
            && self.shipment_date.is_none()
            && self.bags.is_none()
    }

    /// Trim text fields and validate replacement bags.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        if let Some(supplier) = self.supplier.as_deref() {
            self.supplier = Some(require_text("supplier", supplier)?);
        }
        if let Some(warehouse) = self.warehouse.as_deref() {
            self.warehouse = Some(require_text("warehouse", warehouse)?);
        }
        if let Some(bags) = &self.bags {
            validate_bags(bags)?;
        }
        Ok(self)
    }

    /// Field changes this patch would make to `current`. Unchanged values
    /// produce no entry.
    pub fn diff(&self, current: &Shipment) -> Vec<FieldChange> {
        let mut changes = Vec::new();
        if let Some(supplier) = self.supplier.as_ref().filter(|s| **s != current.supplier) {
            changes.push(FieldChange {
                change_type: ChangeType::Supplier,
                old_value: json!(current.supplier),
                new_value: json!(supplier),
            });
        }
        if let Some(warehouse) = self.warehouse.as_ref().filter(|w| **w != current.warehouse) {
            changes.push(FieldChange {
                change_type: ChangeType::Warehouse,
                old_value: json!(current.warehouse),
                new_value: json!(warehouse),
            });
        }
        if let Some(route_type) = self.route_type.filter(|r| *r != current.route_type) {
            changes.push(FieldChange {
                change_type: ChangeType::RouteType,
                old_value: json!(current.route_type),
                new_value: json!(route_type),
            });
        }
        if let Some(date) = self.shipment_date.filter(|d| Some(*d) != current.shipment_date) {
            changes.push(FieldChange {
                change_type: ChangeType::ShipmentDate,
                old_value: json!(current.shipment_date),
                new_value: json!(date),
            });
        }
        if let Some(bags) = self.bags.as_ref().filter(|b| **b != current.bags) {
            changes.push(FieldChange {
                change_type: ChangeType::BagContents,
                old_value: json!(current.bags),
                new_value: json!(bags),
            });
        }
        changes
    }

    /// Apply to `shipment` in place. `current_status` is never touched.
    pub fn apply_to(&self, shipment: &mut Shipment) {
        if let Some(supplier) = &self.supplier {
            shipment.supplier = supplier.clone();
        }
        if let Some(warehouse) = &self.warehouse {
            shipment.warehouse = warehouse.clone();
        }
        if let Some(route_type) = self.route_type {
            shipment.route_type = route_type;
        }
        if let Some(date) = self.shipment_date {
            shipment.shipment_date = Some(date);
        }
        if let Some(bags) = &self.bags {
            shipment.bags = bags.clone();
        }
    }
}
