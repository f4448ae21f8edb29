//! Measurement history and caller identity.
//!
//! The measurement service persists successful results through a
//! [`MeasurementStore`]; the caller is identified by an [`IdentityProvider`].
//! Both are collaborators: the pipeline works without either.

mod error;
mod file;
mod identity;
mod memory;
mod record;

pub use error::StoreError;
pub use file::JsonFileStore;
pub use identity::{EnvIdentity, IdentityProvider, StaticIdentity, UserId, USER_ENV_VAR};
pub use memory::MemoryStore;
pub use record::{MeasuredObjectRecord, MeasurementRecord, RecordMetadata};

use uuid::Uuid;

/// History listing limit used when the caller does not choose one.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Persistence for measurement records.
///
/// Each record owns its measured objects; deleting a record deletes them too.
pub trait MeasurementStore: Send + Sync {
    fn save(&self, record: &MeasurementRecord) -> Result<(), StoreError>;

    /// The user's records, newest first, at most `limit` of them.
    fn list_for_user(&self, user: &UserId, limit: usize)
        -> Result<Vec<MeasurementRecord>, StoreError>;

    /// Delete one of the user's records. Returns `false` when the user owns
    /// no record with that id.
    fn delete(&self, user: &UserId, id: Uuid) -> Result<bool, StoreError>;
}

/// Newest first; ties broken by id so listings are stable.
pub(crate) fn sort_newest_first(records: &mut [MeasurementRecord]) {
    records.sort_by(|a, b| {
        b.created_at_ms
            .cmp(&a.created_at_ms)
            .then_with(|| b.id.cmp(&a.id))
    });
}
