use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use afk_keeper::accounts::AccountStore;
use afk_keeper::config::Config;
use afk_keeper::registry::SessionRegistry;
use afk_keeper::web;
use afk_keeper::wire::TcpConnector;

/// AFK session keeper - keeps game accounts connected and controllable over HTTP
#[derive(Parser, Debug)]
#[command(name = "afk-keeper", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "afk-keeper.toml")]
    config: PathBuf,

    /// Override the control surface listen address
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main(flavor = "current_thread")] // transitions stay cooperatively serialized
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    let mut config = if args.config.exists() {
        Config::from_file(&args.config)?
    } else {
        info!(path = %args.config.display(), "no config file, using defaults");
        Config::default()
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    info!(
        server = %config.server_host,
        listen = %config.listen_addr,
        accounts = %config.accounts_file.display(),
        "afk-keeper starting"
    );

    let store = AccountStore::new(&config.accounts_file);
    let registry = SessionRegistry::new(&config, store, Arc::new(TcpConnector));

    web::serve(&config, registry).await
}
