//! Shared harness for the integration tests: two organizations, one user per
//! role, and helpers for registering shipments and minting credentials.
#![allow(dead_code)]

use chrono::Duration;
use std::sync::Arc;

use shiptrack::config::WorkflowConfig;
use shiptrack::{
    Bag, InMemoryStore, Item, NewShipment, NotificationDispatcher, Organization, OrganizationId,
    Role, RouteType, ShipTrack, ShipmentId, ShipmentStore, SizeQuantities, Stage, TokenIssuer,
    User, UserId,
};

pub const ORG_1: OrganizationId = OrganizationId(1);
pub const ORG_2: OrganizationId = OrganizationId(2);

pub const SUPPLIER_1: UserId = UserId(11);
pub const FF_1: UserId = UserId(12);
pub const FF_1B: UserId = UserId(13);
pub const DRIVER_1: UserId = UserId(14);
pub const WAREHOUSE_1: UserId = UserId(15);
pub const ADMIN_1: UserId = UserId(16);
pub const OWNER_1: UserId = UserId(17);

pub const SUPPLIER_2: UserId = UserId(21);
pub const FF_2: UserId = UserId(22);
pub const ADMIN_2: UserId = UserId(23);

pub fn users() -> Vec<User> {
    let user = |id: UserId, name: &str, role: Role, org: OrganizationId| User {
        id,
        username: name.to_string(),
        role,
        organization_id: org,
    };
    vec![
        user(SUPPLIER_1, "supplier1", Role::Supplier, ORG_1),
        user(FF_1, "ff1", Role::Ff, ORG_1),
        user(FF_1B, "ff1b", Role::Ff, ORG_1),
        user(DRIVER_1, "driver1", Role::Driver, ORG_1),
        user(WAREHOUSE_1, "warehouse1", Role::Warehouse, ORG_1),
        user(ADMIN_1, "admin1", Role::Admin, ORG_1),
        user(OWNER_1, "owner1", Role::Owner, ORG_1),
        user(SUPPLIER_2, "supplier2", Role::Supplier, ORG_2),
        user(FF_2, "ff2", Role::Ff, ORG_2),
        user(ADMIN_2, "admin2", Role::Admin, ORG_2),
    ]
}

pub fn issuer() -> TokenIssuer {
    TokenIssuer::new("integration-secret", "shiptrack", Duration::minutes(30))
}

pub fn sid(raw: &str) -> ShipmentId {
    ShipmentId::parse(raw).unwrap()
}

pub fn bags() -> Vec<Bag> {
    vec![
        Bag {
            bag_id: "B1".to_string(),
            items: vec![Item {
                model: "Dress 204".to_string(),
                color: "navy".to_string(),
                sizes: SizeQuantities::try_from([("S", 4), ("M", 6)]).unwrap(),
            }],
        },
        Bag {
            bag_id: "B2".to_string(),
            items: vec![Item {
                model: "Shirt 17".to_string(),
                color: "white".to_string(),
                sizes: SizeQuantities::try_from([("L", 5)]).unwrap(),
            }],
        },
    ]
}

pub fn new_shipment(id: Option<&str>) -> NewShipment {
    NewShipment {
        id: id.map(sid),
        supplier: "Narselya".to_string(),
        warehouse: "Kazan".to_string(),
        route_type: RouteType::ViaFf,
        shipment_date: None,
        bags: bags(),
    }
}

pub struct Harness<S: ShipmentStore + 'static = InMemoryStore> {
    pub store: Arc<S>,
    pub core: ShipTrack,
}

impl<S: ShipmentStore + 'static> Harness<S> {
    pub fn token(&self, user_id: UserId) -> String {
        let user = users()
            .into_iter()
            .find(|u| u.id == user_id)
            .unwrap();
        self.core.issuer().issue(&user).unwrap()
    }

    /// Register `id` in the organization of `owner`.
    pub async fn register(&self, owner: UserId, id: &str) -> ShipmentId {
        self.core
            .registry
            .register(&self.token(owner), new_shipment(Some(id)))
            .await
            .unwrap()
            .shipment
            .id
    }

    /// Walk a shipment forward to `target` with the default actors.
    pub async fn advance_to(&self, id: &ShipmentId, target: Stage) {
        let steps = [
            (Stage::SentFromFactory, SUPPLIER_1),
            (Stage::ShippedFromFf, FF_1),
            (Stage::Delivered, DRIVER_1),
        ];
        for (stage, actor) in steps {
            self.core
                .workflow
                .confirm(
                    &self.token(actor),
                    shiptrack::ConfirmRequest::new(id.clone(), stage),
                )
                .await
                .unwrap();
            if stage == target {
                break;
            }
        }
    }
}

pub async fn memory_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for (id, name) in [(ORG_1, "Atelier One"), (ORG_2, "Atelier Two")] {
        store
            .add_organization(Organization {
                id,
                name: name.to_string(),
            })
            .await;
    }
    for user in users() {
        store.add_user(user).await;
    }
    store
}

pub fn harness_with<S: ShipmentStore + 'static>(
    store: Arc<S>,
    dispatcher: NotificationDispatcher,
    settings: WorkflowConfig,
) -> Harness<S> {
    let core = ShipTrack::with_dispatcher(Arc::clone(&store), issuer(), dispatcher, settings);
    Harness { store, core }
}

pub async fn harness() -> Harness {
    harness_with(
        memory_store().await,
        NotificationDispatcher::disabled(),
        WorkflowConfig::default(),
    )
}
