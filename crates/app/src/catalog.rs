//! Product catalogue
//!
//! A small domain built only on the unit-of-work API: products carry an
//! external id and audit stamps, every price change is recorded in the
//! price history inside one transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use unitwork_contracts::{
    CancellationToken, Entity, HasCreatedMeta, HasExternalId, HasUpdatedMeta,
};
use unitwork_core::{Actor, OperationRegistry, ScopedUnitOfWork, UnitOfWork, UnitOfWorkFactory};
use uuid::Uuid;

/// Longest accepted product code
pub const MAX_CODE_LENGTH: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub external_id: Uuid,
    pub code: String,
    pub name: String,
    pub price: Decimal,
    pub created_on: DateTime<Utc>,
    pub created_by: String,
    pub updated_on: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

impl Product {
    /// A product not yet stored; id and audit stamps are filled on create
    pub fn new(code: impl Into<String>, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: 0,
            external_id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            price,
            created_on: DateTime::<Utc>::UNIX_EPOCH,
            created_by: String::new(),
            updated_on: None,
            updated_by: None,
        }
    }
}

impl Entity for Product {
    type Id = i64;
    const TABLE: &'static str = "products";
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["external_id"], &["code"]];

    fn id(&self) -> &i64 {
        &self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

impl HasExternalId for Product {
    fn external_id(&self) -> &Uuid {
        &self.external_id
    }
}

impl HasCreatedMeta for Product {
    fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    fn set_created_on(&mut self, on: DateTime<Utc>) {
        self.created_on = on;
    }

    fn created_by(&self) -> &String {
        &self.created_by
    }

    fn set_created_by(&mut self, by: String) {
        self.created_by = by;
    }
}

impl HasUpdatedMeta for Product {
    fn updated_on(&self) -> Option<DateTime<Utc>> {
        self.updated_on
    }

    fn set_updated_on(&mut self, on: Option<DateTime<Utc>>) {
        self.updated_on = on;
    }

    fn updated_by(&self) -> Option<&String> {
        self.updated_by.as_ref()
    }

    fn set_updated_by(&mut self, by: Option<String>) {
        self.updated_by = by;
    }
}

/// A price a product had before it was changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub id: i64,
    pub product_id: i64,
    pub value: Decimal,
    pub created_on: DateTime<Utc>,
}

impl Entity for PriceHistory {
    type Id = i64;
    const TABLE: &'static str = "price_history";

    fn id(&self) -> &i64 {
        &self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

/// Operations for the catalogue entities, with products audited as `actor`
pub fn catalog_registry(actor: Actor) -> OperationRegistry {
    OperationRegistry::new()
        .entity::<Product>()
        .external_id::<Product, Uuid>()
        .with_audit::<Product, String>(actor)
        .entity::<PriceHistory>()
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Duplicated product code: {0}")]
    DuplicateCode(String),

    #[error("Product {0} not found")]
    NotFound(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Data(#[from] unitwork_common::Error),
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub code: String,
    pub name: String,
    pub price: Decimal,
}

impl NewProduct {
    fn validate(&self) -> CatalogResult<()> {
        let code = self.code.trim();
        if code.is_empty() || code.len() > MAX_CODE_LENGTH {
            return Err(CatalogError::Validation(format!(
                "code must be 1 to {} characters",
                MAX_CODE_LENGTH
            )));
        }
        if self.name.trim().is_empty() {
            return Err(CatalogError::Validation("name must not be empty".to_string()));
        }
        validate_price(self.price)
    }
}

fn validate_price(price: Decimal) -> CatalogResult<()> {
    if price.is_sign_negative() {
        return Err(CatalogError::Validation(
            "price must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// Catalogue use cases. Each call runs in its own scoped unit of work.
#[derive(Debug, Clone)]
pub struct CatalogService {
    factory: UnitOfWorkFactory,
}

impl CatalogService {
    pub fn new(factory: UnitOfWorkFactory) -> Self {
        Self { factory }
    }

    async fn scope(&self) -> CatalogResult<ScopedUnitOfWork> {
        Ok(self.factory.create().await?)
    }

    /// Create a product, refusing a code that is already taken
    pub async fn create_product(
        &self,
        new: NewProduct,
        ct: &CancellationToken,
    ) -> CatalogResult<Product> {
        new.validate()?;
        let mut uow = self.scope().await?;
        let result = create_product(&uow, new, ct).await;
        uow.dispose().await;
        result
    }

    pub async fn get_product(
        &self,
        external_id: Uuid,
        ct: &CancellationToken,
    ) -> CatalogResult<Product> {
        let mut uow = self.scope().await?;
        let result = find_product(&uow, external_id, ct).await;
        uow.dispose().await;
        result
    }

    /// One page of products ordered by code
    pub async fn list_products(
        &self,
        skip: u64,
        take: u64,
        ct: &CancellationToken,
    ) -> CatalogResult<Vec<Product>> {
        let mut uow = self.scope().await?;
        let result = list_page(&uow, skip, take, ct).await;
        uow.dispose().await;
        result
    }

    /// Change a product's price, keeping the previous one in the history.
    /// Both writes commit together or not at all.
    pub async fn change_price(
        &self,
        external_id: Uuid,
        price: Decimal,
        ct: &CancellationToken,
    ) -> CatalogResult<Product> {
        validate_price(price)?;
        let mut uow = self.scope().await?;
        let result = in_transaction(&uow, ct, |uow| {
            Box::pin(change_price(uow, external_id, price, ct))
        })
        .await;
        uow.dispose().await;
        if result.is_ok() {
            info!(%external_id, %price, "Product price changed");
        }
        result
    }

    /// Previous prices of a product, oldest first
    pub async fn price_history(
        &self,
        external_id: Uuid,
        ct: &CancellationToken,
    ) -> CatalogResult<Vec<PriceHistory>> {
        let mut uow = self.scope().await?;
        let result = history_of(&uow, external_id, ct).await;
        uow.dispose().await;
        result
    }

    /// Delete a product together with its price history
    pub async fn delete_product(
        &self,
        external_id: Uuid,
        ct: &CancellationToken,
    ) -> CatalogResult<Product> {
        let mut uow = self.scope().await?;
        let result = in_transaction(&uow, ct, |uow| {
            Box::pin(delete_product(uow, external_id, ct))
        })
        .await;
        uow.dispose().await;
        result
    }
}

type StepFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = CatalogResult<T>> + Send + 'a>>;

/// Run `step` inside a transaction: commit on success, roll back otherwise
async fn in_transaction<'a, T, F>(
    uow: &'a UnitOfWork,
    ct: &'a CancellationToken,
    step: F,
) -> CatalogResult<T>
where
    F: FnOnce(&'a UnitOfWork) -> StepFuture<'a, T>,
{
    let mut tx = uow.begin_transaction(ct).await?;
    let result = match step(uow).await {
        Ok(value) => match tx.commit(ct).await {
            Ok(()) => Ok(value),
            Err(e) => {
                warn!(error = %e, "Commit failed");
                Err(e.into())
            }
        },
        Err(e) => Err(e),
    };
    tx.dispose().await;
    result
}

async fn find_product(
    uow: &UnitOfWork,
    external_id: Uuid,
    ct: &CancellationToken,
) -> CatalogResult<Product> {
    uow.read_by_uuid::<Product>(external_id, ct)
        .await?
        .ok_or(CatalogError::NotFound(external_id))
}

async fn list_page(
    uow: &UnitOfWork,
    skip: u64,
    take: u64,
    ct: &CancellationToken,
) -> CatalogResult<Vec<Product>> {
    Ok(uow
        .query::<Product>()?
        .order_by("code")
        .skip(skip)
        .take(take)
        .to_list(ct)
        .await?)
}

async fn history_of(
    uow: &UnitOfWork,
    external_id: Uuid,
    ct: &CancellationToken,
) -> CatalogResult<Vec<PriceHistory>> {
    let product = find_product(uow, external_id, ct).await?;
    Ok(uow
        .query::<PriceHistory>()?
        .eq("product_id", product.id)
        .order_by("created_on")
        .order_by("id")
        .to_list(ct)
        .await?)
}

async fn create_product(
    uow: &UnitOfWork,
    new: NewProduct,
    ct: &CancellationToken,
) -> CatalogResult<Product> {
    let code = new.code.trim().to_string();
    if uow.query::<Product>()?.eq("code", code.as_str()).any(ct).await? {
        return Err(CatalogError::DuplicateCode(code));
    }

    match uow.create(Product::new(code.clone(), new.name, new.price), ct).await {
        Ok(product) => {
            debug!(id = product.id, code = %product.code, "Product created");
            Ok(product)
        }
        // Lost a race with a concurrent create of the same code
        Err(e) if e.is_unique_violation() => Err(CatalogError::DuplicateCode(code)),
        Err(e) => Err(e.into()),
    }
}

async fn change_price(
    uow: &UnitOfWork,
    external_id: Uuid,
    price: Decimal,
    ct: &CancellationToken,
) -> CatalogResult<Product> {
    let mut product = find_product(uow, external_id, ct).await?;
    uow.create(
        PriceHistory {
            id: 0,
            product_id: product.id,
            value: product.price,
            created_on: Utc::now(),
        },
        ct,
    )
    .await?;
    product.price = price;
    Ok(uow.update(product, ct).await?)
}

async fn delete_product(
    uow: &UnitOfWork,
    external_id: Uuid,
    ct: &CancellationToken,
) -> CatalogResult<Product> {
    let product = find_product(uow, external_id, ct).await?;
    let history = uow
        .query::<PriceHistory>()?
        .eq("product_id", product.id)
        .to_list(ct)
        .await?;
    uow.delete_range(history, ct).await?;
    Ok(uow.delete(product, ct).await?)
}
