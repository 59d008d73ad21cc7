use std::sync::Arc;

use frontseat::config::Config;
use frontseat::store::{DocumentStore, MemoryStore, PgStore};
use frontseat::{db, routes, state};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    let port = config.port;

    let store: Arc<dyn DocumentStore> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = db::init_pool(url).await.expect("database init failed");
            tracing::info!("using postgres document store");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; documents are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let state = state::AppState::new(config, store);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "frontseat listening");
    routes::serve(listener, state).await.expect("server failed");
}
