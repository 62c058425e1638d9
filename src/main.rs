use anyhow::Result;
use clap::Parser;

use shiptrack::{init_config, init_telemetry, ShipTrackConfig};

mod cli;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            ShipTrackConfig::load_env_file()?;
            ShipTrackConfig::load_from(path)?
        }
        None => init_config()?.clone(),
    };
    init_telemetry(&config.observability)?;

    tokio::runtime::Runtime::new()?.block_on(async { run(cli.command, &config).await })
}

#[cfg(feature = "database")]
async fn run(command: Commands, config: &ShipTrackConfig) -> Result<()> {
    cli::commands::execute(command, config).await
}

#[cfg(not(feature = "database"))]
async fn run(_command: Commands, _config: &ShipTrackConfig) -> Result<()> {
    anyhow::bail!("shiptrack was built without the 'database' feature")
}
