use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::KiraError;
use crate::store::{CacheEntry, CacheKey, ContentStore, EntryFormat, SCHEMA_VERSION};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoStats {
    pub hits: u64,
    pub misses: u64,
}

/// Durable memoization over a [`ContentStore`].
///
/// Each key is computed at most once per process: a miss holds a per-key lock
/// while computing, so concurrent callers for the same key wait and then read
/// the stored result. Failed computations store nothing.
#[derive(Debug)]
pub struct Memoizer {
    store: ContentStore,
    locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Memoizer {
    pub fn new(store: ContentStore) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn stats(&self) -> MemoStats {
        MemoStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn get_or_compute<T, F>(&self, key: &CacheKey, compute: F) -> Result<T, KiraError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, KiraError>,
    {
        self.with_key_lock(key, || {
            if let Some(entry) = self.lookup(key, EntryFormat::Serialized)? {
                return serde_json::from_slice(&entry.payload).map_err(|err| {
                    KiraError::CacheCorruption {
                        key: key.to_string(),
                        message: format!("stored value does not decode: {err}"),
                    }
                });
            }

            let value = compute()?;
            let payload = serde_json::to_vec(&value)
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
            self.persist(key, EntryFormat::Serialized, payload)?;
            Ok(value)
        })
    }

    /// Like [`Memoizer::get_or_compute`] for downloads: the bytes are stored untouched.
    pub fn get_or_fetch_raw<F>(&self, key: &CacheKey, fetch: F) -> Result<Vec<u8>, KiraError>
    where
        F: FnOnce() -> Result<Vec<u8>, KiraError>,
    {
        self.with_key_lock(key, || {
            if let Some(entry) = self.lookup(key, EntryFormat::Raw)? {
                return Ok(entry.payload);
            }

            let bytes = fetch()?;
            self.persist(key, EntryFormat::Raw, bytes.clone())?;
            Ok(bytes)
        })
    }

    /// Programmatic removal, refused while the store only allows operator deletes.
    pub fn invalidate(&self, key: &CacheKey) -> Result<bool, KiraError> {
        if self.store.config().allow_manual_delete_only {
            return Err(KiraError::PolicyViolation(format!(
                "refusing to invalidate {key}: cache allows manual deletion only"
            )));
        }
        self.with_key_lock(key, || self.store.delete(key))
    }

    fn lookup(&self, key: &CacheKey, format: EntryFormat) -> Result<Option<CacheEntry>, KiraError> {
        let entry = match self.store.read_entry(key) {
            Ok(entry) => entry,
            Err(KiraError::NotFound(_)) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache miss");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        if entry.header.format != format {
            return Err(KiraError::CacheCorruption {
                key: key.to_string(),
                message: format!("expected {format} entry, found {}", entry.header.format),
            });
        }
        if entry.header.schema_version != SCHEMA_VERSION {
            return Err(KiraError::CacheCorruption {
                key: key.to_string(),
                message: format!(
                    "schema version {} is not {SCHEMA_VERSION}",
                    entry.header.schema_version
                ),
            });
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "cache hit");
        Ok(Some(entry))
    }

    fn persist(&self, key: &CacheKey, format: EntryFormat, payload: Vec<u8>) -> Result<(), KiraError> {
        let entry = CacheEntry::new(key, format, payload, self.store.config().compress);
        self.store.write_entry(key, &entry)
    }

    /// Runs `work` holding the lock of `key`. The lock is dropped from the map
    /// once its last holder is done, so the map only holds keys in flight.
    fn with_key_lock<R>(&self, key: &CacheKey, work: impl FnOnce() -> R) -> R {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            work()
        };
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // one reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
        result
    }

    #[cfg(test)]
    fn locks_in_flight(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;
    use crate::store::CacheConfig;

    fn memoizer(dir: &tempfile::TempDir) -> Memoizer {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        Memoizer::new(ContentStore::new(CacheConfig::new(root)))
    }

    #[test]
    fn computes_once() {
        let dir = tempfile::tempdir().unwrap();
        let memo = memoizer(&dir);
        let key = CacheKey::new("test", "answer").unwrap();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok::<_, KiraError>(vec![4u32, 2])
        };
        let first: Vec<u32> = memo.get_or_compute(&key, compute).unwrap();
        let second: Vec<u32> = memo.get_or_compute(&key, compute).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
        assert_eq!(memo.stats(), MemoStats { hits: 1, misses: 1 });
    }

    #[test]
    fn raw_entry_read_as_serialized_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let memo = memoizer(&dir);
        let key = CacheKey::new("test", "bytes").unwrap();
        memo.get_or_fetch_raw(&key, || Ok(b"raw".to_vec())).unwrap();
        let result: Result<String, _> = memo.get_or_compute(&key, || Ok("x".to_string()));
        assert_matches!(result, Err(KiraError::CacheCorruption { .. }));
    }

    #[test]
    fn key_locks_are_released_after_use() {
        let dir = tempfile::tempdir().unwrap();
        let memo = memoizer(&dir);
        for index in 0..64 {
            let key = CacheKey::new("test", format!("key-{index}")).unwrap();
            let _: u32 = memo.get_or_compute(&key, || Ok(index)).unwrap();
            memo.get_or_fetch_raw(&CacheKey::new("raw", format!("key-{index}")).unwrap(), || {
                Ok(vec![index as u8])
            })
            .unwrap();
        }
        let failing = CacheKey::new("test", "failing").unwrap();
        let result: Result<u32, _> =
            memo.get_or_compute(&failing, || Err(KiraError::NotFound("gone".to_string())));
        assert!(result.is_err());
        assert_eq!(memo.locks_in_flight(), 0);
    }

    #[test]
    fn nested_computations_hold_only_their_own_keys() {
        let dir = tempfile::tempdir().unwrap();
        let memo = memoizer(&dir);
        let outer = CacheKey::new("test", "outer").unwrap();
        let inner = CacheKey::new("test", "inner").unwrap();
        let value: u32 = memo
            .get_or_compute(&outer, || {
                let nested: u32 = memo.get_or_compute(&inner, || Ok(1))?;
                assert_eq!(memo.locks_in_flight(), 1);
                Ok(nested + 1)
            })
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(memo.locks_in_flight(), 0);
    }

    #[test]
    fn invalidate_respects_policy() {
        let dir = tempfile::tempdir().unwrap();
        let memo = memoizer(&dir);
        let key = CacheKey::new("test", "guarded").unwrap();
        assert_matches!(memo.invalidate(&key), Err(KiraError::PolicyViolation(_)));
    }
}
