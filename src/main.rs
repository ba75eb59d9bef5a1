//! Task tracker HTTP service.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use task_tracker::cli::create_user::run_create_user;
use task_tracker::cli::{Cli, Command};
use task_tracker::config::{Config, ConfigLoader};
use task_tracker::db::Database;
use task_tracker::logging::init_logging;
use task_tracker::mail::LogMailer;
use task_tracker::web::{AppState, start_server};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, cli.verbose)?;

    let loader = ConfigLoader::load(cli.config.as_deref())?;
    for (tier, path) in loader.sources() {
        info!("Loaded {} config from {}", tier, path.display());
    }
    let mut config = loader.into_config();

    // CLI flags override every config tier
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.clone();
    }
    if let Some(media_dir) = &cli.media_dir {
        config.server.media_dir = media_dir.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    config.ensure_db_dir()?;
    let db = Database::open(&config.server.db_path)?;

    match cli.command {
        Some(Command::CreateUser(args)) => {
            let user = run_create_user(&db, &args, config.auth.min_password_length)?;
            println!("Created user {} (id {})", user.email, user.id);
        }
        Some(Command::Serve) | None => {
            run_server(db, config).await?;
        }
    }

    Ok(())
}

async fn run_server(db: Database, config: Config) -> Result<()> {
    config.ensure_media_dir()?;

    info!("Starting task tracker v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {:?}", config.server.db_path);
    info!("Media dir: {:?}", config.server.media_dir);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let state = AppState::new(db, config, Arc::new(LogMailer));
    let (shutdown_tx, _bound, server) = start_server(state, addr).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received interrupt");
    let _ = shutdown_tx.send(());
    server.await?;

    Ok(())
}
