use clap::Parser;
use peerkv::config::Cli;
use peerkv::{Config, Server};
use tracing::{info, warn};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::from(Cli::parse());
    let server = Server::bind(config).await?;

    server
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await?;

    info!("shutdown complete");
    Ok(())
}
