use ids_lab_experiments::{create_router, Config, DbPool, PgLabStore};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ids_lab_experiments=info,tower_http=debug".into()),
        )
        .with(fmt::layer())
        .init();

    let config = Config::from_env()?;

    info!(
        host = %config.database.host,
        database = %config.database.name,
        "Connecting to database..."
    );
    let db_pool = DbPool::new(&config.database).await?;

    info!("Running database migrations...");
    db_pool.migrate().await?;

    let store = Arc::new(PgLabStore::new(db_pool.inner().clone()));

    info!(
        project_root = %config.bridge.project_root.display(),
        interpreter = %config.bridge.interpreter,
        "Creating router..."
    );
    let app = create_router(store, config.bridge.clone());

    let listener = config.server.bind().await?;
    info!("Starting server on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
