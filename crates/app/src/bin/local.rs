// Unitwork - Local catalogue walkthrough

use rust_decimal::Decimal;
use tracing::{error, info};

use unitwork_app::{create_catalog, system_actor, CatalogError, NewProduct};
use unitwork_common::config::Config;
use unitwork_contracts::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .pretty()
        .init();

    info!("Starting Unitwork local catalogue");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(backend = %config.backend, "Configuration loaded successfully");

    let catalog = create_catalog(&config, system_actor())
        .await
        .map_err(|e| {
            error!("Failed to create catalogue: {}", e);
            e
        })?;

    let ct = CancellationToken::new();
    let shutdown = ct.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C signal, cancelling");
            shutdown.cancel();
        }
    });

    let code = format!("DEMO-{}", chrono::Utc::now().timestamp() % 100_000);
    let product = catalog
        .create_product(
            NewProduct {
                code: code.clone(),
                name: "Demo product".to_string(),
                price: Decimal::new(1999, 2),
            },
            &ct,
        )
        .await?;
    info!(id = product.id, external_id = %product.external_id, code = %product.code, "Created product");

    match catalog
        .create_product(
            NewProduct {
                code,
                name: "Demo product again".to_string(),
                price: Decimal::ONE,
            },
            &ct,
        )
        .await
    {
        Err(CatalogError::DuplicateCode(code)) => info!(%code, "Duplicate code refused"),
        Err(e) => return Err(e.into()),
        Ok(_) => error!("Duplicate code was accepted"),
    }

    let changed = catalog
        .change_price(product.external_id, Decimal::new(2499, 2), &ct)
        .await?;
    info!(price = %changed.price, "Changed price");

    for entry in catalog.price_history(product.external_id, &ct).await? {
        info!(value = %entry.value, on = %entry.created_on, "Price history");
    }

    let page = catalog.list_products(0, 10, &ct).await?;
    info!(count = page.len(), "Listed products");

    info!("Walkthrough complete");
    Ok(())
}
