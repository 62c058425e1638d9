// ShipTrack Library - garment shipment custody tracking
// Status-transition and tenant-isolation core, exposed for the CLI and tests.

pub mod audit;
pub mod auth;
pub mod config;
pub mod domain;
pub mod editor;
pub mod error;
pub mod policy;
pub mod registry;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use audit::{AuditReport, AuditViolation};
pub use auth::{ActorContext, Claims, TenantResolver, TokenError, TokenIssuer};
pub use config::{config, init_config, ShipTrackConfig};
pub use domain::{
    Bag, ChangeLogEntry, ChangeType, IdempotencyKey, Item, Organization, OrganizationId, Role,
    RouteType, Shipment, ShipmentId, ShipmentPatch, ShipmentSnapshot, ShipmentSummary,
    SizeQuantities, Stage, StatusEvent, Totals, User, UserId, ValidationError,
};
pub use editor::AggregateEditor;
pub use error::{CoreError, ErrorKind, ErrorResponse};
pub use policy::{decide, Decision, RejectReason};
pub use registry::{NewShipment, ShipmentRegistry};
pub use service::ShipTrack;
pub use store::{InMemoryStore, ShipmentFilter, ShipmentStore, StoreError, TenantScope};
#[cfg(feature = "database")]
pub use store::SqliteStore;
pub use telemetry::{
    create_workflow_span, generate_correlation_id, init_telemetry, record_organization,
};
pub use workflow::{
    ConfirmRequest, LogNotifier, NotificationDispatcher, Notifier, TransitionNotice,
    WorkflowEngine,
};
