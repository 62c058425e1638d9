use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[cfg(feature = "database")]
pub mod commands;

#[derive(Parser)]
#[command(name = "shiptrack")]
#[command(about = "Garment shipment custody tracking")]
#[command(long_about = "ShipTrack records shipments moving from factory through fulfillment to the \
                       warehouse. Every command acting on shipments takes a bearer token issued \
                       with 'shiptrack issue-token' and only sees its own organization's data.")]
pub struct Cli {
    /// Configuration file (defaults to shiptrack.toml / .shiptrack-rc and SHIPTRACK_* variables)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and apply migrations
    Migrate,
    /// Create or update an organization and a user in it (bootstrap only)
    Provision {
        #[arg(long)]
        org_id: i64,
        #[arg(long)]
        org_name: String,
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        username: String,
        /// supplier, ff, driver, warehouse, admin or owner
        #[arg(long)]
        role: String,
    },
    /// Issue a bearer token for an existing user
    IssueToken {
        #[arg(long)]
        user_id: i64,
        /// Override the configured lifetime
        #[arg(long)]
        ttl_minutes: Option<i64>,
    },
    /// Register a shipment from a JSON file
    Register {
        #[arg(long)]
        token: String,
        #[arg(long, help = "JSON file with supplier, warehouse, route_type and bags")]
        file: PathBuf,
    },
    /// Show a shipment with its status history
    Show {
        #[arg(long)]
        token: String,
        #[arg(long)]
        id: String,
    },
    /// List shipments, newest first
    List {
        #[arg(long)]
        token: String,
        #[arg(long, help = "Only shipments currently at this stage")]
        status: Option<String>,
        #[arg(long, default_value = "20")]
        limit: u32,
        #[arg(long, default_value = "0")]
        offset: u32,
    },
    /// Confirm the next stage of a shipment
    Confirm {
        #[arg(long)]
        token: String,
        #[arg(long)]
        id: String,
        /// SENT_FROM_FACTORY, SHIPPED_FROM_FF or DELIVERED
        #[arg(long)]
        action: String,
        #[arg(long, help = "Reuse the same key when retrying a timed-out request")]
        key: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Apply a JSON patch of shipment contents
    Update {
        #[arg(long)]
        token: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Replay a shipment's history and check it against its status
    Audit {
        #[arg(long)]
        token: String,
        #[arg(long)]
        id: String,
    },
    /// Delete expired idempotency records
    Prune,
}
