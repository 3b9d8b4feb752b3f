//! Key-value persistence boundary.
//!
//! The engine treats persistence as a synchronous key-value store with
//! atomic batch writes. [`RocksStore`] is the production backend;
//! [`MemoryStore`] backs unit tests and in-process embedding.

use crate::errors::{EngineResult, StorageError};
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Synchronous key-value boundary consumed by the engine.
///
/// `batch_write` must be atomic: either every pair lands or none do. The
/// seed rotation and chain generation paths rely on this for their
/// no-partial-state guarantee.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> EngineResult<()>;
    fn batch_write(&self, items: &[(Vec<u8>, Vec<u8>)]) -> EngineResult<()>;
    /// All entries whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&self, prefix: &[u8]) -> EngineResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// RocksDB-backed store tuned for batched sequential writes.
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
}

impl RocksStore {
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        // Chain generation writes millions of sequential entries; a large
        // write buffer keeps compaction out of the hot path.
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_max_write_buffer_number(4);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)
            .map_err(|e| StorageError::OpenFailed(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        Ok(self
            .db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        Ok(self
            .db
            .put(key, value)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?)
    }

    fn batch_write(&self, items: &[(Vec<u8>, Vec<u8>)]) -> EngineResult<()> {
        let mut batch = WriteBatch::default();
        for (key, value) in items {
            batch.put(key, value);
        }
        Ok(self
            .db
            .write(batch)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> EngineResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut rows = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, rocksdb::Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }
}

/// In-memory store for tests and embedding. BTreeMap keeps keys ordered so
/// prefix scans behave like the RocksDB iterator.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        let map = self.map.read().expect("memory store lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        let mut map = self.map.write().expect("memory store lock poisoned");
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn batch_write(&self, items: &[(Vec<u8>, Vec<u8>)]) -> EngineResult<()> {
        let mut map = self.map.write().expect("memory store lock poisoned");
        for (key, value) in items {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> EngineResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.map.read().expect("memory store lock poisoned");
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
