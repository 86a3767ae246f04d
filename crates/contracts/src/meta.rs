//! Audit metadata capabilities
//!
//! Entities opt into these to be stamped by the audited and soft-delete
//! operation strategies. `By` identifies the actor, a user name by default.

use chrono::{DateTime, Utc};

use crate::entity::Entity;

/// Creation stamp
pub trait HasCreatedMeta<By = String>: Entity {
    fn created_on(&self) -> DateTime<Utc>;
    fn set_created_on(&mut self, on: DateTime<Utc>);
    fn created_by(&self) -> &By;
    fn set_created_by(&mut self, by: By);
}

/// Last update stamp
pub trait HasUpdatedMeta<By = String>: Entity {
    fn updated_on(&self) -> Option<DateTime<Utc>>;
    fn set_updated_on(&mut self, on: Option<DateTime<Utc>>);
    fn updated_by(&self) -> Option<&By>;
    fn set_updated_by(&mut self, by: Option<By>);
}

/// Logical deletion stamp
pub trait HasDeletedMeta<By = String>: Entity {
    /// Column holding the deletion instant
    const DELETED_ON_COLUMN: &'static str = "deleted_on";

    fn deleted_on(&self) -> Option<DateTime<Utc>>;
    fn set_deleted_on(&mut self, on: Option<DateTime<Utc>>);
    fn deleted_by(&self) -> Option<&By>;
    fn set_deleted_by(&mut self, by: Option<By>);

    fn is_deleted(&self) -> bool {
        self.deleted_on().is_some()
    }
}
