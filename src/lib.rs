//! shelf application library
//!
//! Wires the books module to its store and drives the module lifecycle
//! around the HTTP server.

use std::sync::Arc;

use anyhow::Context;
use shelf_kernel::{
    settings::{Settings, StoreBackend},
    InitCtx, ModuleRegistry,
};

pub mod modules;

use modules::books::{BookStore, MemoryBookStore, PgBookStore};

/// Build a registry with every module bound to `store`.
pub fn registry(store: Arc<dyn BookStore>) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, store);
    registry
}

/// Open the configured store. For PostgreSQL this connects and applies
/// pending migrations before returning.
pub async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn BookStore>> {
    match settings.database.backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory book store, data is lost on exit");
            Ok(Arc::new(MemoryBookStore::new()))
        }
        StoreBackend::Postgres => {
            let pool = shelf_db::connect(&settings.database).await?;
            apply_migrations(&pool).await?;
            Ok(Arc::new(PgBookStore::new(pool)))
        }
    }
}

/// Apply pending migrations against the configured PostgreSQL database.
pub async fn migrate(settings: &Settings) -> anyhow::Result<usize> {
    let pool = shelf_db::connect(&settings.database).await?;
    apply_migrations(&pool).await
}

async fn apply_migrations(pool: &sqlx::PgPool) -> anyhow::Result<usize> {
    // Migrations do not depend on the store, so any store will do here.
    let registry = registry(Arc::new(MemoryBookStore::new()));
    shelf_db::migrate(pool, &registry.collect_migrations()).await
}

/// Run the application until a shutdown signal arrives.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    tracing::info!(
        environment = settings.environment.as_str(),
        version = env!("CARGO_PKG_VERSION"),
        "shelf starting"
    );

    let store = open_store(&settings).await?;
    let registry = registry(store);
    let ctx = InitCtx {
        settings: &settings,
    };

    registry
        .init_modules(&ctx)
        .await
        .context("module initialization failed")?;
    registry
        .start_modules(&ctx)
        .await
        .context("module start failed")?;

    let served = shelf_http::start_server(&registry, &settings).await;

    if let Err(err) = registry.stop_modules().await {
        tracing::error!(error = ?err, "failed to stop modules cleanly");
    }

    served?;
    tracing::info!("shelf stopped");
    Ok(())
}
