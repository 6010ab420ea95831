use std::{error::Error, net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use log::info;
use mishmash::{ConversationConfig, MemoryStore, Server};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen for new connections at address
    address: SocketAddr,
    /// How long to wait for a client's setup, in milliseconds
    #[arg(long, default_value_t = 1500)]
    setup_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let config =
        ConversationConfig::default().with_setup_timeout(Duration::from_millis(cli.setup_timeout));

    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    ctrlc::set_handler(move || {
        info!("interrupted");
        handle.cancel();
    })?;

    let server = Server::bind(cli.address, Arc::new(MemoryStore::new()), config).await?;
    server.listen(cancel).await?;
    Ok(())
}
