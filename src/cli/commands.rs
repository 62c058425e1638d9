use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use shiptrack::config::{token_ttl_from_minutes, DatabaseConfig};
use shiptrack::store::UserDirectory;
use shiptrack::{
    ConfirmRequest, CoreError, IdempotencyKey, NewShipment, Organization, OrganizationId, Role,
    ShipTrack, ShipTrackConfig, ShipmentFilter, ShipmentId, ShipmentPatch, SqliteStore,
    TokenIssuer, User, UserId,
};

use super::Commands;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a core result as JSON. Core errors are printed to stderr as their
/// external `{kind, message}` body and fail the command.
fn emit<T: Serialize>(result: Result<T, CoreError>) -> Result<()> {
    match result {
        Ok(value) => print_json(&value),
        Err(e) => {
            tracing::debug!(error = %e, "Command failed");
            eprintln!("{}", serde_json::to_string_pretty(&e.to_response())?);
            Err(anyhow!("{}", e.to_response().message))
        }
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn token_issuer(config: &ShipTrackConfig) -> Result<TokenIssuer> {
    Ok(TokenIssuer::new(
        &config.auth.secret_or_generate(),
        config.auth.issuer.clone(),
        config.auth.token_ttl()?,
    ))
}

async fn open_store(config: &ShipTrackConfig, migrate: bool) -> Result<Arc<SqliteStore>> {
    let database = config.database.clone().unwrap_or_else(DatabaseConfig::default);
    let store = SqliteStore::connect(
        &database.url,
        database.max_connections,
        migrate || database.auto_migrate,
    )
    .await
    .with_context(|| format!("opening database {}", database.url))?;
    Ok(Arc::new(store))
}

pub async fn execute(command: Commands, config: &ShipTrackConfig) -> Result<()> {
    let store = open_store(config, matches!(command, Commands::Migrate)).await?;
    let core = ShipTrack::new(Arc::clone(&store), token_issuer(config)?, config);

    let outcome = match command {
        Commands::Migrate => {
            tracing::info!("Database is up to date");
            Ok(())
        }
        Commands::Provision {
            org_id,
            org_name,
            user_id,
            username,
            role,
        } => {
            let role: Role = role.parse()?;
            let organization = Organization {
                id: OrganizationId(org_id),
                name: org_name,
            };
            let user = User {
                id: UserId(user_id),
                username,
                role,
                organization_id: organization.id,
            };
            store.add_organization(&organization).await?;
            store.add_user(&user).await?;
            print_json(&user)
        }
        Commands::IssueToken {
            user_id,
            ttl_minutes,
        } => {
            let user = store
                .find_user(UserId(user_id))
                .await?
                .ok_or_else(|| anyhow!("no user with id {user_id}"))?;
            let token = match ttl_minutes {
                Some(minutes) => core
                    .issuer()
                    .issue_with_ttl(&user, token_ttl_from_minutes(minutes)?)?,
                None => core.issuer().issue(&user)?,
            };
            println!("{token}");
            Ok(())
        }
        Commands::Register { token, file } => {
            let new: NewShipment = read_json(&file).await?;
            emit(core.registry.register(&token, new).await)
        }
        Commands::Show { token, id } => {
            let id = ShipmentId::parse(id)?;
            emit(core.registry.get(&token, &id).await)
        }
        Commands::List {
            token,
            status,
            limit,
            offset,
        } => {
            let status = status.map(|s| s.parse()).transpose()?;
            let filter = ShipmentFilter::new(status, limit, offset)?;
            emit(core.registry.list(&token, &filter).await)
        }
        Commands::Confirm {
            token,
            id,
            action,
            key,
            notes,
        } => {
            let mut request = ConfirmRequest::new(ShipmentId::parse(id)?, action.parse()?);
            if let Some(key) = key {
                request = request.with_key(IdempotencyKey::parse(key)?);
            }
            if let Some(notes) = notes {
                request = request.with_notes(notes);
            }
            emit(core.workflow.confirm(&token, request).await)
        }
        Commands::Update { token, id, file } => {
            let id = ShipmentId::parse(id)?;
            let patch: ShipmentPatch = read_json(&file).await?;
            emit(core.editor.apply_update(&token, &id, patch).await)
        }
        Commands::Audit { token, id } => {
            let id = ShipmentId::parse(id)?;
            emit(core.workflow.verify_history(&token, &id).await)
        }
        Commands::Prune => {
            let purged = core.workflow.purge_expired_idempotency().await?;
            print_json(&serde_json::json!({ "purged": purged }))
        }
    };

    store.shutdown().await;
    outcome
}
