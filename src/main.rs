use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tubecast::auth::TokenSigner;
use tubecast::config::{AuthConfig, ServerConfig};
use tubecast::media::DiskMediaStore;
use tubecast::server::{AppState, create_router};
use tubecast::store::{SqliteStore, Store};

#[derive(Parser)]
#[command(name = "tubecast")]
#[command(about = "A self-hostable video sharing backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "8080")]
        port: u16,

        /// Data directory for the database and media assets
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Public base URL for media links (e.g., "https://videos.example.com").
        /// Defaults to the bind address.
        #[arg(long)]
        public_base_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tubecast=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            data_dir,
            public_base_url,
        } => {
            let config = ServerConfig {
                host,
                port,
                data_dir: PathBuf::from(data_dir),
                public_base_url,
            };
            serve(config).await
        }
    }
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    fs::create_dir_all(&config.data_dir).context("failed to create data directory")?;

    let store = SqliteStore::new(config.db_path()).context("failed to open database")?;
    store.initialize().context("failed to initialize database")?;

    let auth = AuthConfig::from_env();
    let signer = TokenSigner::new(
        &auth.access_secret,
        &auth.refresh_secret,
        auth.access_ttl,
        auth.refresh_ttl,
    );
    let media = DiskMediaStore::new(&config.data_dir, &config.media_base_url());

    let state = Arc::new(AppState::new(Arc::new(store), media, signer));
    let router = create_router(state);

    let addr = config.socket_addr().context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}
