use std::sync::Arc;

use crate::auth::{TenantResolver, TokenIssuer};
use crate::config::{ShipTrackConfig, WorkflowConfig};
use crate::editor::AggregateEditor;
use crate::registry::ShipmentRegistry;
use crate::store::{ShipmentStore, UserDirectory};
use crate::workflow::{LogNotifier, NotificationDispatcher, WorkflowEngine};

/// The core's entry points wired to one store and one token issuer.
pub struct ShipTrack {
    resolver: Arc<TenantResolver>,
    pub workflow: WorkflowEngine,
    pub editor: AggregateEditor,
    pub registry: ShipmentRegistry,
}

impl ShipTrack {
    /// Build from configuration, logging transitions through [`LogNotifier`]
    /// when notifications are enabled.
    pub fn new<S>(store: Arc<S>, issuer: TokenIssuer, config: &ShipTrackConfig) -> Self
    where
        S: ShipmentStore + 'static,
    {
        let dispatcher = NotificationDispatcher::new(config.notifications.enabled)
            .with_sink(Arc::new(LogNotifier));
        Self::with_dispatcher(store, issuer, dispatcher, config.workflow.clone())
    }

    pub fn with_dispatcher<S>(
        store: Arc<S>,
        issuer: TokenIssuer,
        dispatcher: NotificationDispatcher,
        settings: WorkflowConfig,
    ) -> Self
    where
        S: ShipmentStore + 'static,
    {
        let directory: Arc<dyn UserDirectory> = store.clone();
        let store: Arc<dyn ShipmentStore> = store;
        let resolver = Arc::new(TenantResolver::new(issuer, directory));

        Self {
            workflow: WorkflowEngine::new(
                Arc::clone(&store),
                Arc::clone(&resolver),
                dispatcher,
                settings,
            ),
            editor: AggregateEditor::new(Arc::clone(&store), Arc::clone(&resolver)),
            registry: ShipmentRegistry::new(store, Arc::clone(&resolver)),
            resolver,
        }
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    pub fn issuer(&self) -> &TokenIssuer {
        self.resolver.issuer()
    }
}
