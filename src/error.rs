use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Role, ShipmentId, ValidationError};
use crate::policy::RejectReason;
use crate::store::StoreError;

/// Generic message shared by missing and cross-tenant shipments.
pub const NOT_FOUND_MESSAGE: &str = "shipment not found";

/// Errors returned by the core operations.
///
/// Policy and isolation failures are typed results. Only `Storage` represents
/// an unrecoverable fault in the persistence layer.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("authentication failed: {0}")]
    Unauthenticated(String),

    #[error("credential organization does not match current membership")]
    TenantMismatch,

    #[error("shipment not found")]
    NotFound,

    #[error("transition not allowed: {0}")]
    Rejected(RejectReason),

    #[error("role '{role}' may not edit shipments")]
    EditNotPermitted { role: Role },

    #[error("shipment changed concurrently, reload and retry")]
    ConcurrencyConflict,

    #[error("shipment '{0}' already exists")]
    AlreadyExists(ShipmentId),

    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    TenantMismatch,
    NotFound,
    WrongAction,
    TerminalState,
    RoleNotPermitted,
    ConcurrencyConflict,
    AlreadyExists,
    Validation,
    Storage,
}

/// Body returned to the API layer: `{kind, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            CoreError::TenantMismatch => ErrorKind::TenantMismatch,
            CoreError::NotFound => ErrorKind::NotFound,
            CoreError::Rejected(RejectReason::WrongAction) => ErrorKind::WrongAction,
            CoreError::Rejected(RejectReason::TerminalState) => ErrorKind::TerminalState,
            CoreError::Rejected(RejectReason::RoleNotPermitted) => ErrorKind::RoleNotPermitted,
            CoreError::EditNotPermitted { .. } => ErrorKind::RoleNotPermitted,
            CoreError::ConcurrencyConflict => ErrorKind::ConcurrencyConflict,
            CoreError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            CoreError::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }

    /// External representation. Internal detail (token parse failures,
    /// storage faults) is not exposed.
    pub fn to_response(&self) -> ErrorResponse {
        let message = match self {
            CoreError::Unauthenticated(_) => "invalid authentication credentials".to_string(),
            CoreError::TenantMismatch => "organization mismatch, please sign in again".to_string(),
            CoreError::Storage(_) => "internal storage error".to_string(),
            other => other.to_string(),
        };
        ErrorResponse {
            kind: self.kind(),
            message,
        }
    }
}

impl From<RejectReason> for CoreError {
    fn from(reason: RejectReason) -> Self {
        CoreError::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_map_to_reason_kinds() {
        assert_eq!(
            CoreError::from(RejectReason::WrongAction).kind(),
            ErrorKind::WrongAction
        );
        assert_eq!(
            CoreError::from(RejectReason::TerminalState).kind(),
            ErrorKind::TerminalState
        );
        assert_eq!(
            CoreError::EditNotPermitted { role: Role::Driver }.kind(),
            ErrorKind::RoleNotPermitted
        );
    }

    #[test]
    fn test_not_found_response_is_generic() {
        let response = CoreError::NotFound.to_response();
        assert_eq!(response.kind, ErrorKind::NotFound);
        assert_eq!(response.message, NOT_FOUND_MESSAGE);
    }

    #[test]
    fn test_unauthenticated_hides_detail() {
        let response = CoreError::Unauthenticated("signature mismatch".to_string()).to_response();
        assert!(!response.message.contains("signature"));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["kind"], "unauthenticated");
    }
}
