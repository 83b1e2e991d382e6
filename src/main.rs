use balance_grid::config::{Cli, NodeConfig};
use balance_grid::ingestion::loader::load_csv_file;
use balance_grid::node::NodeServices;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = NodeConfig::from_cli(&cli)?;

    tracing::info!("Starting node {} on {}", config.node_id, config.bind);
    for member in &config.members {
        tracing::info!("  - member {} at {}", member.id, member.http_addr);
    }

    let services = NodeServices::build(&config);
    let app = services.router();

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("HTTP server listening on {}", config.bind);

    if let Some(path) = config.load.clone() {
        let store = services.store.clone();
        tokio::spawn(async move {
            // Peers may still be starting; writes to them fail and are reported here.
            if let Err(e) = load_csv_file(&store, &path).await {
                tracing::error!("Initial load from {} failed: {:#}", path.display(), e);
            }
        });
    }

    tracing::info!("Press Ctrl+C to shutdown");
    axum::serve(listener, app).await?;

    Ok(())
}
