use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::identity::UserId;
use crate::record::MeasurementRecord;
use crate::{sort_newest_first, MeasurementStore};

const RECORD_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct RecordEnvelope {
    version: u32,
    record: MeasurementRecord,
}

/// One pretty-printed JSON file per measurement under
/// `<root>/<hex(user)>/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn from_default_project() -> Result<Self, StoreError> {
        let dirs = ProjectDirs::from("dev", "DimensionSnap", "dimsnap")
            .ok_or(StoreError::NoDataDirectory)?;
        Ok(Self {
            root: dirs.data_local_dir().join("measurements"),
        })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // hex keeps arbitrary user ids filesystem-safe
    fn user_dir(&self, user: &UserId) -> PathBuf {
        let encoded: String = user
            .as_str()
            .bytes()
            .map(|b| format!("{b:02x}"))
            .collect();
        self.root.join(encoded)
    }

    fn record_path(&self, user: &UserId, id: Uuid) -> PathBuf {
        self.user_dir(user).join(format!("{id}.json"))
    }

    fn read_record(path: &Path) -> Result<MeasurementRecord, StoreError> {
        let bytes = fs::read(path)?;
        let envelope: RecordEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version != RECORD_SCHEMA_VERSION {
            return Err(StoreError::UnsupportedVersion(envelope.version));
        }
        Ok(envelope.record)
    }
}

impl MeasurementStore for JsonFileStore {
    fn save(&self, record: &MeasurementRecord) -> Result<(), StoreError> {
        let dir = self.user_dir(&record.user_id);
        fs::create_dir_all(&dir)?;

        let envelope = RecordEnvelope {
            version: RECORD_SCHEMA_VERSION,
            record: record.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        let path = self.record_path(&record.user_id, record.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        log::debug!("saved measurement {} to {}", record.id, path.display());
        Ok(())
    }

    fn list_for_user(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<MeasurementRecord>, StoreError> {
        let dir = self.user_dir(user);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path) {
                Ok(record) if &record.user_id == user => records.push(record),
                Ok(_) => log::warn!("{} belongs to another user, skipping", path.display()),
                Err(e) => log::warn!("skipping unreadable record {}: {e}", path.display()),
            }
        }
        sort_newest_first(&mut records);
        records.truncate(limit);
        Ok(records)
    }

    fn delete(&self, user: &UserId, id: Uuid) -> Result<bool, StoreError> {
        let path = self.record_path(user, id);
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("deleted measurement {id}");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample_record;

    #[test]
    fn save_then_list_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = JsonFileStore::with_root(temp.path());
        let rec = sample_record("alice", 10);

        store.save(&rec).expect("save should succeed");
        let listed = store
            .list_for_user(&rec.user_id, 50)
            .expect("list should succeed");
        assert_eq!(listed, vec![rec]);
    }

    #[test]
    fn list_is_empty_for_unknown_user() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = JsonFileStore::with_root(temp.path().join("missing"));
        let user = UserId::new("nobody").expect("user");
        assert!(store.list_for_user(&user, 50).expect("list").is_empty());
    }

    #[test]
    fn corrupt_files_are_skipped() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = JsonFileStore::with_root(temp.path());
        let rec = sample_record("alice", 10);
        store.save(&rec).expect("save");

        let dir = store.user_dir(&rec.user_id);
        fs::write(dir.join("broken.json"), b"{not json").expect("write");
        fs::write(dir.join("notes.txt"), b"ignored").expect("write");

        let listed = store.list_for_user(&rec.user_id, 50).expect("list");
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn user_ids_with_path_characters_stay_inside_root() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = JsonFileStore::with_root(temp.path());
        let rec = sample_record("../../etc", 1);
        store.save(&rec).expect("save");
        assert!(store.record_path(&rec.user_id, rec.id).starts_with(temp.path()));
        assert_eq!(store.list_for_user(&rec.user_id, 5).expect("list").len(), 1);
    }
}
