use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{OrganizationId, ShipmentId, Stage, UserId};

/// Emitted once per committed transition. Replays and rejections produce none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionNotice {
    pub organization_id: OrganizationId,
    pub shipment_id: ShipmentId,
    pub previous: Option<Stage>,
    pub status: Stage,
    pub changed_by: UserId,
    pub changed_at: DateTime<Utc>,
}

/// Sink for transition notices. Failures are logged by the dispatcher and
/// never affect the committed transition.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &TransitionNotice) -> anyhow::Result<()>;
}

/// Writes notices to the structured log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: &TransitionNotice) -> anyhow::Result<()> {
        info!(
            shipment.id = %notice.shipment_id,
            organization.id = %notice.organization_id,
            user.id = %notice.changed_by,
            status = %notice.status,
            "Shipment status changed"
        );
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    sinks: Vec<Arc<dyn Notifier>>,
    enabled: bool,
}

impl NotificationDispatcher {
    pub fn new(enabled: bool) -> Self {
        Self {
            sinks: Vec::new(),
            enabled,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn with_sink(mut self, sink: Arc<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Fire-and-forget delivery, one task per sink. Must only be called
    /// after the transition has committed.
    pub fn dispatch(&self, notice: TransitionNotice) {
        if !self.enabled || self.sinks.is_empty() {
            return;
        }
        let notice = Arc::new(notice);
        for sink in &self.sinks {
            let sink = Arc::clone(sink);
            let notice = Arc::clone(&notice);
            tokio::spawn(async move {
                if let Err(e) = sink.notify(&notice).await {
                    warn!(
                        shipment.id = %notice.shipment_id,
                        error = %e,
                        "Notification delivery failed"
                    );
                }
            });
        }
    }
}
