use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    CommitOutcome, ContentsCommit, ContentsOutcome, InsertOutcome, ShipmentFilter, ShipmentStore,
    StoreError, TenantScope, TransitionCommit, UserDirectory,
};
use crate::domain::{
    ChangeLogEntry, ChangeType, IdempotencyKey, Organization, OrganizationId, RouteType, Shipment,
    ShipmentId, ShipmentSnapshot, Stage, StatusEvent, User, UserId,
};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

const SHIPMENT_COLUMNS: &str = "organization_id, id, supplier, warehouse, route_type, \
     shipment_date, current_status, bags_data, created_at, updated_at";

fn timestamp(at: DateTime<Utc>) -> String {
    // Fixed precision keeps lexicographic order equal to time order.
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{raw}': {e}")))
}

fn corrupt<E: std::fmt::Display>(what: &'static str) -> impl FnOnce(E) -> StoreError {
    move |e| StoreError::Corrupt(format!("{what}: {e}"))
}

fn shipment_from_row(row: &SqliteRow) -> Result<Shipment, StoreError> {
    let id: String = row.try_get("id")?;
    let route_type: String = row.try_get("route_type")?;
    let shipment_date: Option<String> = row.try_get("shipment_date")?;
    let current_status: Option<String> = row.try_get("current_status")?;
    let bags_data: String = row.try_get("bags_data")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Shipment {
        id: ShipmentId::parse(id).map_err(corrupt("shipment id"))?,
        organization_id: OrganizationId(row.try_get("organization_id")?),
        supplier: row.try_get("supplier")?,
        warehouse: row.try_get("warehouse")?,
        route_type: RouteType::from_str(&route_type).map_err(corrupt("route type"))?,
        shipment_date: shipment_date
            .map(|raw| NaiveDate::from_str(&raw))
            .transpose()
            .map_err(corrupt("shipment date"))?,
        current_status: current_status
            .map(|raw| Stage::from_str(&raw))
            .transpose()
            .map_err(corrupt("current status"))?,
        bags: serde_json::from_str(&bags_data)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<StatusEvent, StoreError> {
    let shipment_id: String = row.try_get("shipment_id")?;
    let status: String = row.try_get("status")?;
    let changed_at: String = row.try_get("changed_at")?;
    Ok(StatusEvent {
        id: row.try_get("id")?,
        shipment_id: ShipmentId::parse(shipment_id).map_err(corrupt("shipment id"))?,
        organization_id: OrganizationId(row.try_get("organization_id")?),
        status: Stage::from_str(&status).map_err(corrupt("event status"))?,
        changed_by: UserId(row.try_get("changed_by")?),
        changed_at: parse_timestamp(&changed_at)?,
        notes: row.try_get("notes")?,
    })
}

fn change_from_row(row: &SqliteRow) -> Result<ChangeLogEntry, StoreError> {
    let shipment_id: String = row.try_get("shipment_id")?;
    let change_type: String = row.try_get("change_type")?;
    let old_value: String = row.try_get("old_value")?;
    let new_value: String = row.try_get("new_value")?;
    let changed_at: String = row.try_get("changed_at")?;
    Ok(ChangeLogEntry {
        id: row.try_get("id")?,
        shipment_id: ShipmentId::parse(shipment_id).map_err(corrupt("shipment id"))?,
        organization_id: OrganizationId(row.try_get("organization_id")?),
        changed_by: UserId(row.try_get("changed_by")?),
        change_type: serde_json::from_value::<ChangeType>(serde_json::Value::String(change_type))?,
        old_value: serde_json::from_str(&old_value)?,
        new_value: serde_json::from_str(&new_value)?,
        changed_at: parse_timestamp(&changed_at)?,
    })
}

async fn fetch_shipment(
    conn: &mut SqliteConnection,
    org: OrganizationId,
    id: &ShipmentId,
) -> Result<Option<Shipment>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE organization_id = ?1 AND id = ?2"
    ))
    .bind(org.0)
    .bind(id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(shipment_from_row).transpose()
}

async fn fetch_events(
    conn: &mut SqliteConnection,
    org: OrganizationId,
    id: &ShipmentId,
) -> Result<Vec<StatusEvent>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT id, organization_id, shipment_id, status, changed_by, changed_at, notes
        FROM shipment_status_history
        WHERE organization_id = ?1 AND shipment_id = ?2
        ORDER BY changed_at DESC, id DESC
        "#,
    )
    .bind(org.0)
    .bind(id.as_str())
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(event_from_row).collect()
}

async fn fetch_outcome(
    conn: &mut SqliteConnection,
    org: OrganizationId,
    id: &ShipmentId,
    key: &IdempotencyKey,
) -> Result<Option<ShipmentSnapshot>, StoreError> {
    let outcome: Option<String> = sqlx::query_scalar(
        r#"
        SELECT outcome FROM idempotency_records
        WHERE organization_id = ?1 AND shipment_id = ?2 AND idempotency_key = ?3
        "#,
    )
    .bind(org.0)
    .bind(id.as_str())
    .bind(key.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    Ok(outcome
        .map(|raw| serde_json::from_str(&raw))
        .transpose()?)
}

/// SQLite-backed store. Every statement filters on `organization_id`.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect, creating the database file if needed, and optionally migrate.
    ///
    /// Use `max_connections = 1` with `sqlite::memory:`; each pooled
    /// connection would otherwise see its own empty database.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        auto_migrate: bool,
    ) -> Result<Self, StoreError> {
        if !sqlx::Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            sqlx::Sqlite::create_database(database_url).await?;
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        if auto_migrate {
            store.migrate().await?;
        }
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn add_organization(&self, organization: &Organization) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO organizations (id, name, created_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(organization.id.0)
        .bind(&organization.name)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, role, organization_id) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                role = excluded.role,
                organization_id = excluded.organization_id
            "#,
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(user.role.as_str())
        .bind(user.organization_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn find_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, username, role, organization_id FROM users WHERE id = ?1",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let role: String = row.try_get("role")?;
        Ok(Some(User {
            id: UserId(row.try_get("id")?),
            username: row.try_get("username")?,
            role: role.parse().map_err(corrupt("user role"))?,
            organization_id: OrganizationId(row.try_get("organization_id")?),
        }))
    }
}

#[async_trait]
impl ShipmentStore for SqliteStore {
    async fn insert_shipment(
        &self,
        scope: &TenantScope,
        shipment: Shipment,
    ) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(&format!(
            "INSERT INTO shipments ({SHIPMENT_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT(organization_id, id) DO NOTHING"
        ))
        .bind(scope.organization_id().0)
        .bind(shipment.id.as_str())
        .bind(&shipment.supplier)
        .bind(&shipment.warehouse)
        .bind(shipment.route_type.as_str())
        .bind(shipment.shipment_date.map(|d| d.to_string()))
        .bind(shipment.current_status.map(|s| s.as_str()))
        .bind(serde_json::to_string(&shipment.bags)?)
        .bind(timestamp(shipment.created_at))
        .bind(timestamp(shipment.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::AlreadyExists
        })
    }

    async fn count_with_prefix(
        &self,
        scope: &TenantScope,
        prefix: &str,
    ) -> Result<u32, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shipments WHERE organization_id = ?1 AND substr(id, 1, length(?2)) = ?2",
        )
        .bind(scope.organization_id().0)
        .bind(prefix)
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn load_shipment(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
    ) -> Result<Option<Shipment>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_shipment(&mut conn, scope.organization_id(), id).await
    }

    async fn load_events(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
    ) -> Result<Vec<StatusEvent>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_events(&mut conn, scope.organization_id(), id).await
    }

    async fn list_shipments(
        &self,
        scope: &TenantScope,
        filter: &ShipmentFilter,
    ) -> Result<Vec<Shipment>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments \
             WHERE organization_id = ?1 AND (?2 IS NULL OR current_status = ?2) \
             ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4"
        ))
        .bind(scope.organization_id().0)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(i64::from(filter.limit))
        .bind(i64::from(filter.offset))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(shipment_from_row).collect()
    }

    async fn find_idempotent_outcome(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
        key: &IdempotencyKey,
    ) -> Result<Option<ShipmentSnapshot>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_outcome(&mut conn, scope.organization_id(), id, key).await
    }

    async fn commit_transition(
        &self,
        scope: &TenantScope,
        commit: TransitionCommit,
    ) -> Result<CommitOutcome, StoreError> {
        let org = scope.organization_id();
        let mut tx = self.pool.begin().await?;

        // The compare-and-set is the first statement so the transaction takes
        // the write lock before reading anything.
        let updated = sqlx::query(
            r#"
            UPDATE shipments SET current_status = ?1, updated_at = ?2
            WHERE organization_id = ?3 AND id = ?4 AND current_status IS ?5
            "#,
        )
        .bind(commit.next.as_str())
        .bind(timestamp(commit.changed_at))
        .bind(org.0)
        .bind(commit.shipment_id.as_str())
        .bind(commit.expected.map(|s| s.as_str()))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let outcome = match fetch_outcome(&mut tx, org, &commit.shipment_id, &commit.idempotency_key).await? {
                Some(snapshot) => CommitOutcome::Replayed(snapshot),
                None => match fetch_shipment(&mut tx, org, &commit.shipment_id).await? {
                    Some(_) => CommitOutcome::Conflict,
                    None => CommitOutcome::Missing,
                },
            };
            tx.rollback().await?;
            debug!(shipment.id = %commit.shipment_id, outcome = ?outcome, "Transition not applied");
            return Ok(outcome);
        }

        sqlx::query(
            r#"
            INSERT INTO shipment_status_history
                (organization_id, shipment_id, status, changed_by, changed_at, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(org.0)
        .bind(commit.shipment_id.as_str())
        .bind(commit.next.as_str())
        .bind(commit.changed_by.0)
        .bind(timestamp(commit.changed_at))
        .bind(commit.notes.as_deref())
        .execute(&mut *tx)
        .await?;

        let shipment = fetch_shipment(&mut tx, org, &commit.shipment_id)
            .await?
            .ok_or_else(|| {
                StoreError::Corrupt(format!("shipment {} vanished mid-commit", commit.shipment_id))
            })?;
        let events = fetch_events(&mut tx, org, &commit.shipment_id).await?;
        let snapshot = ShipmentSnapshot::new(&shipment, events);

        let recorded = sqlx::query(
            r#"
            INSERT INTO idempotency_records
                (organization_id, shipment_id, idempotency_key, outcome, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(organization_id, shipment_id, idempotency_key) DO NOTHING
            "#,
        )
        .bind(org.0)
        .bind(commit.shipment_id.as_str())
        .bind(commit.idempotency_key.as_str())
        .bind(serde_json::to_string(&snapshot)?)
        .bind(timestamp(commit.changed_at))
        .execute(&mut *tx)
        .await?;

        if recorded.rows_affected() == 0 {
            // Same key landed first; keep its outcome and discard our writes.
            let existing = fetch_outcome(&mut tx, org, &commit.shipment_id, &commit.idempotency_key).await?;
            tx.rollback().await?;
            return Ok(existing.map_or(CommitOutcome::Conflict, CommitOutcome::Replayed));
        }

        tx.commit().await?;
        Ok(CommitOutcome::Committed(snapshot))
    }

    async fn commit_contents(
        &self,
        scope: &TenantScope,
        commit: ContentsCommit,
    ) -> Result<Option<ContentsOutcome>, StoreError> {
        let org = scope.organization_id();
        let mut tx = self.pool.begin().await?;

        // Take the write lock on the row before reading it.
        let locked = sqlx::query(
            "UPDATE shipments SET updated_at = updated_at WHERE organization_id = ?1 AND id = ?2",
        )
        .bind(org.0)
        .bind(commit.shipment_id.as_str())
        .execute(&mut *tx)
        .await?;
        if locked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let mut shipment = fetch_shipment(&mut tx, org, &commit.shipment_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("shipment {} vanished", commit.shipment_id)))?;
        let field_changes = commit.patch.diff(&shipment);
        if field_changes.is_empty() {
            tx.rollback().await?;
            return Ok(Some(ContentsOutcome {
                shipment,
                changes: Vec::new(),
            }));
        }

        commit.patch.apply_to(&mut shipment);
        shipment.updated_at = commit.changed_at;

        // current_status is not in this statement.
        sqlx::query(
            r#"
            UPDATE shipments
            SET supplier = ?1, warehouse = ?2, route_type = ?3, shipment_date = ?4,
                bags_data = ?5, updated_at = ?6
            WHERE organization_id = ?7 AND id = ?8
            "#,
        )
        .bind(&shipment.supplier)
        .bind(&shipment.warehouse)
        .bind(shipment.route_type.as_str())
        .bind(shipment.shipment_date.map(|d| d.to_string()))
        .bind(serde_json::to_string(&shipment.bags)?)
        .bind(timestamp(shipment.updated_at))
        .bind(org.0)
        .bind(commit.shipment_id.as_str())
        .execute(&mut *tx)
        .await?;

        let mut written = Vec::with_capacity(field_changes.len());
        for change in field_changes {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO shipment_change_log
                    (organization_id, shipment_id, changed_by, change_type, old_value, new_value, changed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                RETURNING id
                "#,
            )
            .bind(org.0)
            .bind(commit.shipment_id.as_str())
            .bind(commit.changed_by.0)
            .bind(change.change_type.as_str())
            .bind(change.old_value.to_string())
            .bind(change.new_value.to_string())
            .bind(timestamp(commit.changed_at))
            .fetch_one(&mut *tx)
            .await?;
            written.push(ChangeLogEntry {
                id,
                shipment_id: commit.shipment_id.clone(),
                organization_id: org,
                changed_by: commit.changed_by,
                change_type: change.change_type,
                old_value: change.old_value,
                new_value: change.new_value,
                changed_at: commit.changed_at,
            });
        }

        tx.commit().await?;
        Ok(Some(ContentsOutcome {
            shipment,
            changes: written,
        }))
    }

    async fn load_changes(
        &self,
        scope: &TenantScope,
        id: &ShipmentId,
    ) -> Result<Vec<ChangeLogEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, organization_id, shipment_id, changed_by, change_type,
                   old_value, new_value, changed_at
            FROM shipment_change_log
            WHERE organization_id = ?1 AND shipment_id = ?2
            ORDER BY id ASC
            "#,
        )
        .bind(scope.organization_id().0)
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(change_from_row).collect()
    }

    async fn purge_idempotency(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE recorded_at < ?1")
            .bind(timestamp(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
