use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rumor::cli;
use rumor::node::GossipNode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rumor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse args and env vars
    let settings = cli::Cli::parse().into_settings();
    let node = GossipNode::start(settings).await?;
    info!(
        "[{}] Rumor listening on {}",
        node.local_peer(),
        node.local_addr()
    );

    let mut messages = node.subscribe_messages();
    let mut reputation = node.subscribe_reputation();
    loop {
        tokio::select! {
            message = messages.recv() => match message {
                Ok(message) => info!(
                    "[{}] Delivered {} {} from peer {}",
                    node.local_peer(), message.type_url, message.correlation_id, message.sender
                ),
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} delivered messages", skipped),
                Err(RecvError::Closed) => break,
            },
            change = reputation.recv() => match change {
                Ok(change) => info!(
                    "[{}] Peer {} reputation {:+} ({:?})",
                    node.local_peer(), change.peer, change.event.amount(), change.event
                ),
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} reputation changes", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received ctrl-c");
                break;
            }
        }
    }

    node.shutdown().await;
    Ok(())
}
