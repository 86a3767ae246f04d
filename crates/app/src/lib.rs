//! Unitwork application composition root
//!
//! Picks the session backend from configuration and wires the product
//! catalogue onto a unit of work factory.

pub mod backend;
pub mod catalog;

use std::sync::Arc;

use tracing::info;
use unitwork_common::Config;
use unitwork_core::{Actor, UnitOfWorkFactory};

pub use backend::{Backend, BackendFactory, BackendKind};
pub use catalog::{
    catalog_registry, CatalogError, CatalogResult, CatalogService, NewProduct, PriceHistory,
    Product,
};

/// Build the catalogue service on the configured backend
pub async fn create_catalog(config: &Config, actor: Actor) -> anyhow::Result<CatalogService> {
    let backend = BackendFactory::create(config).await?;
    backend.migrate().await?;

    let factory = UnitOfWorkFactory::new(backend.provider(), catalog_registry(actor), config.container);
    info!(backend = %backend.kind(), "Catalogue ready");

    Ok(CatalogService::new(factory))
}

/// Actor stamped on audited writes made by the local binary
pub fn system_actor() -> Actor {
    let name = std::env::var("UNITWORK_ACTOR").unwrap_or_else(|_| "system".to_string());
    Arc::new(move || name.clone())
}
