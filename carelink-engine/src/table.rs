//! Typed tables and unique indexes over fjall partitions
//!
//! A table partition holds JSON rows under `row:{id:020}` so a prefix scan
//! yields them in id order, plus a `seq` key with the last issued id.
//! Index partitions map a unique string key to an 8-byte big-endian id.

use crate::{storage_error, StorageEngine};
use carelink_core::{CoreError, Result};
use fjall::{Batch, PartitionHandle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

const ROW_PREFIX: &str = "row:";
const SEQ_KEY: &str = "seq";

pub struct Table<T> {
    partition: PartitionHandle,
    _row: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> Table<T> {
    pub(crate) fn open(engine: &StorageEngine, name: &'static str) -> Result<Self> {
        Ok(Table {
            partition: engine.partition(name)?,
            _row: PhantomData,
        })
    }

    /// The id after the last one issued. Callers serialize id allocation and
    /// stage the new value with [`stage_seq`](Self::stage_seq).
    pub(crate) fn next_id(&self) -> Result<u64> {
        let last = match self.partition.get(SEQ_KEY).map_err(storage_error)? {
            Some(raw) => decode_u64(&raw)?,
            None => 0,
        };
        Ok(last + 1)
    }

    pub(crate) fn stage_seq(&self, batch: &mut Batch, id: u64) {
        batch.insert(&self.partition, SEQ_KEY, id.to_be_bytes().to_vec());
    }

    pub fn get(&self, id: u64) -> Result<Option<T>> {
        match self.partition.get(row_key(id)).map_err(storage_error)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get), but a missing row is `NotFound`.
    pub fn require(&self, entity: &'static str, id: u64) -> Result<T> {
        self.get(id)?.ok_or(CoreError::NotFound { entity, id })
    }

    pub fn contains(&self, id: u64) -> Result<bool> {
        self.partition
            .contains_key(row_key(id))
            .map_err(storage_error)
    }

    pub(crate) fn stage_put(&self, batch: &mut Batch, id: u64, row: &T) -> Result<()> {
        let json = serde_json::to_vec(row)?;
        batch.insert(&self.partition, row_key(id), json);
        Ok(())
    }

    pub(crate) fn stage_remove(&self, batch: &mut Batch, id: u64) {
        batch.remove(&self.partition, row_key(id));
    }

    /// All rows in id order
    pub fn scan(&self) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        for item in self.partition.prefix(ROW_PREFIX) {
            let (_key, value) = item.map_err(|e| CoreError::Storage(format!("Scan error: {}", e)))?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }
}

/// Unique string key to row id
pub struct Index {
    partition: PartitionHandle,
}

impl Index {
    pub(crate) fn open(engine: &StorageEngine, name: &str) -> Result<Self> {
        Ok(Index {
            partition: engine.partition(name)?,
        })
    }

    pub fn lookup(&self, key: &str) -> Result<Option<u64>> {
        match self.partition.get(key).map_err(storage_error)? {
            Some(raw) => Ok(Some(decode_u64(&raw)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn stage_put(&self, batch: &mut Batch, key: &str, id: u64) {
        batch.insert(&self.partition, key, id.to_be_bytes().to_vec());
    }

    pub(crate) fn stage_remove(&self, batch: &mut Batch, key: &str) {
        batch.remove(&self.partition, key);
    }
}

fn row_key(id: u64) -> String {
    format!("{}{:020}", ROW_PREFIX, id)
}

fn decode_u64(raw: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| CoreError::Storage(format!("corrupt id value ({} bytes)", raw.len())))?;
    Ok(u64::from_be_bytes(bytes))
}
