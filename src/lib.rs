//! Tenant and identity resolution for a multi-tenant HTTP platform.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod readiness;
pub mod types;

// Re-export key types and functions
pub use api::{AppState, create_router};
pub use auth::{
    ResolutionContext, ResolutionError, SessionConfig, TenantDirectory, TenantResolver,
    ThemeBindingResolver, ThemeScope,
};
pub use config::{ResolverConfig, load_config};
pub use db::{DatabaseConfig, Db, create_connection, ensure_schema};
pub use readiness::{ReadinessGate, ReadinessHandle, StoreStatus};

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

/// Build the application state over a store handle that may not be
/// connected yet. Requests are held back by `gate` until it is.
pub fn build_state(db: Db, gate: ReadinessGate, config: &ResolverConfig) -> AppState {
    let directory = TenantDirectory::new(db.clone());
    let tenant_keys = Arc::new(config.tenant_key_validator(db));

    let mut resolver = TenantResolver::new(gate, directory.clone(), tenant_keys);
    if let Some(verifier) = config.session.verifier() {
        resolver = resolver.with_session_verifier(verifier);
    }

    AppState::new(resolver, ThemeBindingResolver::new(directory))
}

/// Connect the store, apply the schema, then open the gate.
///
/// On failure the gate is marked failed, so requests get 503
/// `STORE_UNAVAILABLE` instead of waiting forever.
pub async fn initialize_store(db: &Db, config: DatabaseConfig, handle: ReadinessHandle) -> Result<()> {
    info!("Connecting to database at {}", config.url);

    let result = async {
        db::connect(db, config).await?;
        ensure_schema(db).await
    }
    .await;

    match result {
        Ok(()) => {
            info!("Database ready");
            handle.mark_ready();
            Ok(())
        }
        Err(e) => {
            error!("Database initialization failed: {:#}", e);
            handle.mark_failed(e.to_string());
            Err(e)
        }
    }
}
