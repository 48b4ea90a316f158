//! Citadel access administration tool.

#![forbid(unsafe_code)]

mod admin_config;
mod commands;

use std::sync::Arc;

use citadel_application::{
    AccessProvider, AccessProviderRegistry, EffectiveAccessService, install_global_registry,
};
use citadel_core::{AppError, AppResult};
use citadel_domain::{
    AccessLevel, DocumentAccessLevel, ResourceKind, TemplateAccessLevel, ThreadAccessLevel,
};
use citadel_infrastructure::{GrantTables, MIGRATOR, PostgresAccessStore};
use clap::Parser;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::admin_config::{AdminConfig, init_tracing};
use crate::commands::AdminCli;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let AdminCli { command } = AdminCli::parse();
    let config = AdminConfig::load()?;
    let pool = connect_pool(&config).await?;

    MIGRATOR
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    let registry = install_global_registry(build_registry(&pool)?)?;
    info!(kinds = ?registry.kinds(), "access providers registered");

    command.run(&pool, registry).await
}

async fn connect_pool(config: &AdminConfig) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url.as_str())
        .await
        .map_err(|error| AppError::Query(format!("failed to connect to database: {error}")))
}

fn build_registry(pool: &PgPool) -> AppResult<AccessProviderRegistry> {
    let mut registry = AccessProviderRegistry::new();

    for kind in ResourceKind::all() {
        let provider = match kind {
            ResourceKind::Document => provider::<DocumentAccessLevel>(pool, *kind),
            ResourceKind::DocumentTemplate => provider::<TemplateAccessLevel>(pool, *kind),
            ResourceKind::MessengerThread => provider::<ThreadAccessLevel>(pool, *kind),
        };
        registry.register(kind.as_str(), provider)?;
    }

    Ok(registry)
}

fn provider<L: AccessLevel>(pool: &PgPool, kind: ResourceKind) -> Arc<dyn AccessProvider> {
    let store = Arc::new(PostgresAccessStore::<L>::new(
        pool.clone(),
        &GrantTables::for_kind(kind),
    ));

    Arc::new(EffectiveAccessService::<L>::new(store))
}
