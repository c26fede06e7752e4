use anyhow::Result;
use clap::Parser;
use quotegate::config::Config;
use quotegate::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "quotegate", version, about = "Rate-limited random quote API")]
struct Cli {
    /// Bind address, overrides BIND_ADDR
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,

    /// Cache connection string (host:port), overrides CONNECTIONSTRINGS__CACHE
    #[arg(long)]
    cache: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration from environment, then apply CLI overrides
    let mut config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(cache) = cli.cache {
        config.cache_connection = Some(cache);
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("quotegate={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting quotegate service");
    tracing::info!(
        "Configuration: bind_addr={}, rate_limit={}, window_seconds={}",
        config.bind_addr,
        config.rate_limit,
        config.window_seconds
    );

    // Create and run the server
    let server = Server::new(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create server: {}", e))?;

    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
