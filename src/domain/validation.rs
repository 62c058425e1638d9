use thiserror::Error;

/// Malformed input rejected at the boundary before it reaches the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid shipment id '{0}'")]
    ShipmentId(String),
    #[error("idempotency key must be 1-100 printable characters")]
    IdempotencyKey,
    #[error("size '{label}' has non-positive quantity {quantity}")]
    SizeQuantity { label: String, quantity: i64 },
    #[error("size quantity for '{label}' is too large")]
    SizeOverflow { label: String },
    #[error("size label must not be empty")]
    EmptySizeLabel,
    #[error("size '{0}' appears more than once")]
    DuplicateSizeLabel(String),
    #[error("item in bag '{bag_id}' has no sizes")]
    EmptyItem { bag_id: String },
    #[error("bag id must not be empty")]
    EmptyBagId,
    #[error("duplicate bag id '{0}'")]
    DuplicateBagId(String),
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
    #[error("unknown role '{0}'")]
    UnknownRole(String),
    #[error("unknown status '{0}'")]
    UnknownStage(String),
    #[error("unknown route type '{0}'")]
    UnknownRouteType(String),
    #[error("list limit must be between 1 and {max}, got {got}")]
    ListLimit { got: u32, max: u32 },
    #[error("{field} must be between {min} and {max}, got {got}")]
    OutOfRange {
        field: &'static str,
        got: i64,
        min: i64,
        max: i64,
    },
    #[error("notes exceed {max} characters")]
    NotesTooLong { max: usize },
}
