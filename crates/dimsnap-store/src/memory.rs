use std::sync::Mutex;

use uuid::Uuid;

use crate::error::StoreError;
use crate::identity::UserId;
use crate::record::MeasurementRecord;
use crate::{sort_newest_first, MeasurementStore};

/// Process-local store, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<MeasurementRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MeasurementStore for MemoryStore {
    fn save(&self, record: &MeasurementRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records.retain(|r| r.id != record.id);
        records.push(record.clone());
        Ok(())
    }

    fn list_for_user(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<MeasurementRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        let mut mine: Vec<_> = records
            .iter()
            .filter(|r| &r.user_id == user)
            .cloned()
            .collect();
        sort_newest_first(&mut mine);
        mine.truncate(limit);
        Ok(mine)
    }

    fn delete(&self, user: &UserId, id: Uuid) -> Result<bool, StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        let before = records.len();
        records.retain(|r| !(r.id == id && &r.user_id == user));
        Ok(records.len() != before)
    }
}
