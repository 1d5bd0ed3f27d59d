use anyhow::{Context, Result};
use async_trait::async_trait;
use sled::Db;

use crate::transfer::record::{RecordStatus, RecordStore, RecordUpdate, StoredRecord};

/// Sled-backed record journal, one JSON document per context id
pub struct SledRecordStore {
    db: Db,
}

impl SledRecordStore {
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path).with_context(|| format!("open record store at {}", path))?;
        Ok(Self { db })
    }

    /// Throwaway store removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .context("open temporary record store")?;
        Ok(Self { db })
    }

    fn read(&self, context_id: &str) -> Result<Option<StoredRecord>> {
        match self.db.get(context_id.as_bytes())? {
            Some(value) => {
                let record = serde_json::from_slice(&value)
                    .with_context(|| format!("corrupt record for {}", context_id))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RecordStore for SledRecordStore {
    async fn apply(&self, update: &RecordUpdate) -> Result<StoredRecord> {
        let record = StoredRecord::merge(self.read(&update.context_id)?, update);
        let value = serde_json::to_vec(&record)?;

        self.db.insert(update.context_id.as_bytes(), value)?;
        self.db.flush().context("record store flush")?;

        log::debug!(
            "[{}] record -> {}",
            update.context_id,
            update.status
        );
        Ok(record)
    }

    async fn get(&self, context_id: &str) -> Result<Option<StoredRecord>> {
        self.read(context_id)
    }

    async fn list_by_status(&self, status: RecordStatus) -> Result<Vec<StoredRecord>> {
        let mut records = Vec::new();
        for entry in self.db.iter() {
            let (key, value) = entry?;
            match serde_json::from_slice::<StoredRecord>(&value) {
                Ok(record) if record.status == status => records.push(record),
                Ok(_) => {}
                Err(e) => log::warn!(
                    "skipping unreadable record {}: {}",
                    String::from_utf8_lossy(&key),
                    e
                ),
            }
        }
        records.sort_by_key(|r| r.updated_at);
        Ok(records)
    }
}
