use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::domain::OrganizationId;

/// Initialize structured logging. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    tracing::debug!("ShipTrack telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span carried by every workflow operation on a shipment. The organization
/// is usually unknown until the credential is resolved; fill it in then with
/// [`record_organization`].
pub fn create_workflow_span(
    operation: &str,
    shipment_id: Option<&str>,
    organization_id: Option<i64>,
    correlation_id: Option<&str>,
) -> tracing::Span {
    let span = tracing::info_span!(
        "shipment_workflow",
        operation = operation,
        shipment.id = shipment_id,
        organization.id = tracing::field::Empty,
        correlation.id = correlation_id,
    );
    if let Some(organization_id) = organization_id {
        span.record("organization.id", organization_id);
    }
    span
}

/// Record the resolved organization on the current workflow span.
pub fn record_organization(organization_id: OrganizationId) {
    tracing::Span::current().record("organization.id", organization_id.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_ids_are_unique() {
        assert_ne!(generate_correlation_id(), generate_correlation_id());
    }
}
