//! Entity model
//!
//! An entity is a serde-mapped record stored in one table and identified by
//! `Id`. Entities optionally carry an external identifier, a stable
//! cross-system key distinct from the storage identity.

use std::fmt::Debug;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::value::FieldValue;

/// Identifier type used when an entity does not choose one
pub type DefaultId = i64;

/// External identifier type used when an entity does not choose one
pub type DefaultExternalId = Uuid;

/// Identifier usable as an entity id or external id
pub trait EntityId:
    Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Whether this value is the type's empty value and still needs assignment
    fn is_unassigned(&self) -> bool;

    /// Generate a value locally, or `None` when the store must issue it
    fn generate() -> Option<Self>;

    /// Build a value from a store sequence number, or `None` if unsupported
    fn from_sequence(value: i64) -> Option<Self>;

    /// Convert into a filterable field value
    fn to_field(&self) -> FieldValue;
}

impl EntityId for i64 {
    fn is_unassigned(&self) -> bool {
        *self == 0
    }

    fn generate() -> Option<Self> {
        None
    }

    fn from_sequence(value: i64) -> Option<Self> {
        Some(value)
    }

    fn to_field(&self) -> FieldValue {
        FieldValue::Int(*self)
    }
}

impl EntityId for i32 {
    fn is_unassigned(&self) -> bool {
        *self == 0
    }

    fn generate() -> Option<Self> {
        None
    }

    fn from_sequence(value: i64) -> Option<Self> {
        i32::try_from(value).ok()
    }

    fn to_field(&self) -> FieldValue {
        FieldValue::Int(i64::from(*self))
    }
}

impl EntityId for Uuid {
    fn is_unassigned(&self) -> bool {
        self.is_nil()
    }

    fn generate() -> Option<Self> {
        Some(Uuid::new_v4())
    }

    fn from_sequence(_value: i64) -> Option<Self> {
        None
    }

    fn to_field(&self) -> FieldValue {
        FieldValue::Uuid(*self)
    }
}

impl EntityId for String {
    fn is_unassigned(&self) -> bool {
        self.is_empty()
    }

    fn generate() -> Option<Self> {
        Some(Uuid::new_v4().to_string())
    }

    fn from_sequence(value: i64) -> Option<Self> {
        Some(value.to_string())
    }

    fn to_field(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }
}

/// Static description of how an entity type is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityMeta {
    /// Rust type name, used in diagnostics
    pub entity: &'static str,
    /// Table or collection name
    pub table: &'static str,
    /// Column holding the identifier
    pub id_column: &'static str,
    /// Column sets that must be unique across the table
    pub unique_keys: &'static [&'static [&'static str]],
}

/// A persisted record
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identifier type
    type Id: EntityId;

    /// Table or collection name
    const TABLE: &'static str;

    /// Column holding the identifier
    const ID_COLUMN: &'static str = "id";

    /// Column sets that must be unique, in addition to the id
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[];

    fn id(&self) -> &Self::Id;

    fn set_id(&mut self, id: Self::Id);

    fn meta() -> EntityMeta {
        EntityMeta {
            entity: short_type_name::<Self>(),
            table: Self::TABLE,
            id_column: Self::ID_COLUMN,
            unique_keys: Self::UNIQUE_KEYS,
        }
    }
}

/// Capability of entities carrying a stable external identifier
pub trait HasExternalId<X: EntityId = DefaultExternalId>: Entity {
    /// Column holding the external identifier
    const EXTERNAL_ID_COLUMN: &'static str = "external_id";

    fn external_id(&self) -> &X;
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}
