// Domain types shared by every layer: identifiers, roles, the shipment
// aggregate and its audit records.

pub mod event;
pub mod ids;
pub mod patch;
pub mod role;
pub mod shipment;
pub mod validation;

pub use event::{
    ChangeLogEntry, ChangeType, FieldChange, ShipmentSnapshot, ShipmentSummary, ShipmentView,
    StatusEvent,
};
pub use ids::{IdempotencyKey, OrganizationId, ShipmentId, UserId};
pub use patch::ShipmentPatch;
pub use role::{Organization, Role, User};
pub use shipment::{validate_bags, Bag, Item, RouteType, Shipment, SizeQuantities, Stage, Totals};
pub use validation::ValidationError;
