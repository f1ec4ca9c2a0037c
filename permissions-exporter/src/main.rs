use std::path::PathBuf;

use clap::Parser;
use permissions_exporter::config::{DEFAULT_CONFIG_PATH, ExporterConfig};
use permissions_exporter::server::run_server;
use permissions_exporter::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "mysql-permissions-exporter")]
#[command(about = "Export MySQL grant tables as Prometheus metrics", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file [default: /etc/mysql_permissions_exporter.toml]
    #[arg(short, long, env = "MPE_CONFIG")]
    config: Option<PathBuf>
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = ExporterConfig::load(cli.config.as_deref())?;
    tracing::debug!(
        config = ?config,
        default_path = DEFAULT_CONFIG_PATH,
        "Configuration loaded"
    );

    run_server(config).await?;
    Ok(())
}
