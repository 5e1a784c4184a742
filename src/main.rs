use std::time::Duration;

use anyhow::Context;
use authflow::store::sqlite::{self, SqliteSessionStore, SqliteUserRepository};
use authflow::{AuthConfig, SessionStore, auth_routes};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

const PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("authflow=info,tower_http=info")),
        )
        .init();

    let config = AuthConfig::from_env()?;
    tracing::info!(callback = config.callback_path(), "Loaded auth configuration");

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://authflow.db".to_string());
    let pool = sqlite::connect(&database_url)
        .await
        .with_context(|| format!("opening database {database_url}"))?;

    let sessions = SqliteSessionStore::new(pool.clone());
    let users = SqliteUserRepository::new(pool);

    let purger = sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match purger.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(removed = n, "Purged expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Session purge failed"),
            }
        }
    });

    let app = auth_routes(config, users, sessions).layer(TraceLayer::new_for_http());

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
