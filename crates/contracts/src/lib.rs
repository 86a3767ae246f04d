//! Data-access contracts for Unitwork
//!
//! Application code depends on these types only: the entity model, the lazy
//! query, and one operation trait per kind of persistence action. Session
//! backends and the unit of work live in `unitwork-core` and the backend
//! crates.

pub mod entity;
pub mod meta;
pub mod operations;
pub mod query;
pub mod range;
pub mod value;

pub use entity::{DefaultExternalId, DefaultId, Entity, EntityId, EntityMeta, HasExternalId};
pub use meta::{HasCreatedMeta, HasDeletedMeta, HasUpdatedMeta};
pub use operations::{
    Create, CreateRange, Delete, DeleteRange, ExistsByExternalId, ExistsById, Queryable,
    ReadByExternalId, ReadByExternalIdRange, ReadById, ReadByIdRange, Update, UpdateRange,
};
pub use query::{
    is_identifier, CompareOp, Filter, Query, QuerySource, QuerySpec, SortDirection, SortKey,
};
pub use range::{
    CreateRangeExt, DeleteRangeExt, ReadByExternalIdRangeExt, ReadByIdRangeExt, UpdateRangeExt,
};
pub use value::FieldValue;

pub use tokio_util::sync::CancellationToken;
pub use unitwork_common::{Error, Result, StoreError};
