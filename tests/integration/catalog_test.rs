//! Product catalogue end to end through the composition root

mod common;

use rust_decimal::Decimal;
use serial_test::serial;
use unitwork_app::{create_catalog, system_actor, CatalogError, CatalogService, NewProduct};
use unitwork_common::{Config, ContainerOptions};
use unitwork_contracts::CancellationToken;
use uuid::Uuid;

use common::TestConfig;

fn config(backend: &str, database_url: Option<String>) -> Config {
    Config {
        backend: backend.to_string(),
        database_url,
        max_connections: 2,
        container: ContainerOptions::default(),
        rust_log: "debug".to_string(),
    }
}

fn unique_code() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_uppercase()
}

async fn walk_through(catalog: &CatalogService) {
    let ct = CancellationToken::new();
    let code = unique_code();

    let product = catalog
        .create_product(
            NewProduct {
                code: code.clone(),
                name: "Walkthrough".to_string(),
                price: Decimal::new(1999, 2),
            },
            &ct,
        )
        .await
        .unwrap();
    assert!(product.id > 0);

    let err = catalog
        .create_product(
            NewProduct {
                code: code.clone(),
                name: "Again".to_string(),
                price: Decimal::ONE,
            },
            &ct,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::DuplicateCode(_)));

    let changed = catalog
        .change_price(product.external_id, Decimal::new(2499, 2), &ct)
        .await
        .unwrap();
    assert_eq!(changed.price, Decimal::new(2499, 2));
    assert!(changed.updated_on.is_some());

    let read = catalog.get_product(product.external_id, &ct).await.unwrap();
    assert_eq!(read.code, code);
    assert_eq!(read.price, Decimal::new(2499, 2));

    let history = catalog.price_history(product.external_id, &ct).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].value, Decimal::new(1999, 2));

    catalog.delete_product(product.external_id, &ct).await.unwrap();
    let err = catalog.get_product(product.external_id, &ct).await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
}

#[test_log::test(tokio::test)]
async fn test_catalog_on_memory_backend() {
    let catalog = create_catalog(&config("memory", None), system_actor())
        .await
        .unwrap();
    walk_through(&catalog).await;
}

#[test_log::test(tokio::test)]
async fn test_unknown_backend_is_rejected() {
    let err = create_catalog(&config("cassandra", None), system_actor())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unknown session backend"));
}

#[test_log::test(tokio::test)]
#[ignore] // Requires database setup
#[serial]
async fn test_catalog_on_postgres_backend() {
    let test_config = TestConfig::from_env();
    let catalog = create_catalog(
        &config("postgres", Some(test_config.database_url)),
        system_actor(),
    )
    .await
    .unwrap();
    walk_through(&catalog).await;
}
