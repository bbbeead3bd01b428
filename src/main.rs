/// blipd - federated microblogging node
///
/// Speaks a subset of ActivityPub: local users publish short posts
/// ("blips") and enact Follow/Like/Announce relationships, exposed as
/// ActivityStreams collections.

mod activitypub;
mod api;
mod auth;
mod config;
mod context;
mod db;
mod error;
mod server;
mod store;

use config::ServerConfig;
use context::AppContext;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blipd=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    let ctx = AppContext::new(config).await?;

    server::serve(ctx).await?;

    Ok(())
}
