//! The LSM-style storage engine: an in-memory memtable flushed to
//! timestamp-named SSTables, with an LRU cache of their indices.

use crate::error::StorageError;
use kv_wire::{RequestPayload, ResponsePayload};
use lru::LruCache;
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

const DATA_FILE_EXT: &str = "ssdf";
const INDEX_FILE_EXT: &str = "ssif";

/// `(offset, length, version)` for one key within one SSTable.
type SsTableIndex = HashMap<String, (u64, u64, u64)>;

/// Configuration for a [`StorageEngine`].
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub datafile_dir: PathBuf,
    /// LRU capacity for cached SSTable indices. Negative means unbounded;
    /// zero means caching is disabled (every lookup re-reads the index
    /// file); positive is the cache's entry capacity.
    pub max_indices_in_memory: i64,
    pub max_data_per_sstable: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            datafile_dir: PathBuf::from("data"),
            max_indices_in_memory: -1,
            max_data_per_sstable: 1 << 20,
        }
    }
}

enum IndexCache {
    Unbounded(HashMap<String, SsTableIndex>),
    Bounded(LruCache<String, SsTableIndex>),
    Disabled,
}

impl IndexCache {
    fn new(capacity: i64) -> Self {
        if capacity < 0 {
            IndexCache::Unbounded(HashMap::new())
        } else if let Some(n) = NonZeroUsize::new(capacity as usize) {
            IndexCache::Bounded(LruCache::new(n))
        } else {
            IndexCache::Disabled
        }
    }

    fn get(&mut self, index_key: &str) -> Option<SsTableIndex> {
        match self {
            IndexCache::Unbounded(map) => map.get(index_key).cloned(),
            IndexCache::Bounded(cache) => cache.get(index_key).cloned(),
            IndexCache::Disabled => None,
        }
    }

    fn put(&mut self, index_key: String, index: SsTableIndex) {
        match self {
            IndexCache::Unbounded(map) => {
                map.insert(index_key, index);
            }
            IndexCache::Bounded(cache) => {
                cache.put(index_key, index);
            }
            IndexCache::Disabled => {}
        }
    }
}

/// The node's local key-value storage: memtable plus flushed SSTables.
pub struct StorageEngine {
    config: StorageConfig,
    memtable: HashMap<String, String>,
    memversions: HashMap<String, u64>,
    memtable_size: u64,
    table_index_names: Vec<String>,
    table_indices: IndexCache,
}

impl StorageEngine {
    /// Open the engine, creating `datafile_dir` if needed and scanning it
    /// for existing SSTables.
    pub fn open(config: StorageConfig) -> Result<Self, StorageError> {
        let table_index_names = load_dir(&config.datafile_dir)?;
        let table_indices = IndexCache::new(config.max_indices_in_memory);
        Ok(StorageEngine {
            config,
            memtable: HashMap::new(),
            memversions: HashMap::new(),
            memtable_size: 0,
            table_index_names,
            table_indices,
        })
    }

    pub fn datafile_dir(&self) -> &Path {
        &self.config.datafile_dir
    }

    /// Insert or replace `key`, bumping its version. Flushes the memtable
    /// first if this write would exceed `max_data_per_sstable`.
    pub fn put(&mut self, key: &str, value: &str) -> Result<u64, StorageError> {
        let length = value.len() as u64;
        if self.memtable_size + length > self.config.max_data_per_sstable {
            self.flush_to_file()?;
        }

        let previous = self.find_existing_version(key)?;
        let version = previous.unwrap_or(0) + 1;

        if let Some(old) = self.memtable.insert(key.to_owned(), value.to_owned()) {
            self.memtable_size = self.memtable_size - old.len() as u64 + length;
        } else {
            self.memtable_size += length;
        }
        self.memversions.insert(key.to_owned(), version);
        Ok(version)
    }

    /// Read `key`: memtable first, then SSTables newest to oldest. Returns
    /// `None` if not found anywhere.
    pub fn get(&mut self, key: &str) -> Result<Option<(String, u64)>, StorageError> {
        if let Some(value) = self.memtable.get(key) {
            let version = self.memversions.get(key).copied().unwrap_or(0);
            return Ok(Some((value.clone(), version)));
        }
        self.get_from_sstables(key)
    }

    fn get_from_sstables(&mut self, key: &str) -> Result<Option<(String, u64)>, StorageError> {
        for index_key in self.table_index_names.clone().into_iter().rev() {
            if let Some((offset, length, version)) = self.lookup_in_index(&index_key, key)? {
                let value = self.read_value(&index_key, offset, length)?;
                return Ok(Some((value, version)));
            }
        }
        Ok(None)
    }

    fn find_existing_version(&mut self, key: &str) -> Result<Option<u64>, StorageError> {
        if let Some(v) = self.memversions.get(key) {
            return Ok(Some(*v));
        }
        for index_key in self.table_index_names.clone().into_iter().rev() {
            if let Some((_, _, version)) = self.lookup_in_index(&index_key, key)? {
                return Ok(Some(version));
            }
        }
        Ok(None)
    }

    fn lookup_in_index(
        &mut self,
        index_key: &str,
        key: &str,
    ) -> Result<Option<(u64, u64, u64)>, StorageError> {
        let index = self.index_for(index_key)?;
        Ok(index.get(key).copied())
    }

    fn index_for(&mut self, index_key: &str) -> Result<SsTableIndex, StorageError> {
        if let Some(index) = self.table_indices.get(index_key) {
            return Ok(index);
        }
        let index = read_index_file(&self.index_file_path(index_key), index_key)?;
        self.table_indices.put(index_key.to_owned(), index.clone());
        Ok(index)
    }

    fn read_value(&self, index_key: &str, offset: u64, length: u64) -> Result<String, StorageError> {
        let path = self.data_file_path(index_key);
        let mut file = fs::File::open(&path).map_err(|e| io_err(&path, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| io_err(&path, e))?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf).map_err(|e| io_err(&path, e))?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Flush the memtable to a new `.ssdf`/`.ssif` pair, named by the
    /// current millisecond timestamp. No-op if the memtable is empty.
    /// Data files carry no trailing padding: reads are length-delimited.
    pub fn flush_to_file(&mut self) -> Result<(), StorageError> {
        if self.memtable.is_empty() {
            return Ok(());
        }
        let index_key = current_millis().to_string();
        let index_path = self.index_file_path(&index_key);
        let data_path = self.data_file_path(&index_key);

        let mut keys: Vec<&String> = self.memtable.keys().collect();
        keys.sort();

        let mut index_file = fs::File::create(&index_path).map_err(|e| io_err(&index_path, e))?;
        let mut data_file = fs::File::create(&data_path).map_err(|e| io_err(&data_path, e))?;

        let mut offset: u64 = 0;
        for key in keys {
            let value = &self.memtable[key];
            let length = value.len() as u64;
            let version = self.memversions.get(key).copied().unwrap_or(1);
            writeln!(index_file, "{key},{offset},{length},{version}")
                .map_err(|e| io_err(&index_path, e))?;
            data_file
                .write_all(value.as_bytes())
                .map_err(|e| io_err(&data_path, e))?;
            offset += length;
        }

        self.memtable.clear();
        self.memversions.clear();
        self.memtable_size = 0;
        self.table_index_names.push(index_key);
        Ok(())
    }

    fn index_file_path(&self, index_key: &str) -> PathBuf {
        self.config
            .datafile_dir
            .join(format!("{index_key}.{INDEX_FILE_EXT}"))
    }

    fn data_file_path(&self, index_key: &str) -> PathBuf {
        self.config
            .datafile_dir
            .join(format!("{index_key}.{DATA_FILE_EXT}"))
    }

    /// Decode and execute a `get`/`put` request, producing the
    /// [`ResponsePayload`] to send back to the request's source.
    pub fn handle_request(&mut self, request: &RequestPayload) -> ResponsePayload {
        match self.dispatch(request) {
            Ok(payload) => ResponsePayload::success(payload, request.request_hash),
            Err(e) => ResponsePayload::failure(e.to_string(), request.request_hash),
        }
    }

    fn dispatch(&mut self, request: &RequestPayload) -> Result<serde_json::Value, StorageError> {
        let op = request.op().ok_or(StorageError::UnsupportedOp {
            op: String::new(),
        })?;
        match op {
            "put" => {
                let key = request.key().ok_or(StorageError::MissingKey)?;
                let value = request.value().ok_or(StorageError::MissingValue)?;
                let version = self.put(key, value)?;
                Ok(serde_json::json!([value, version]))
            }
            "get" => {
                let key = request.key().ok_or(StorageError::MissingKey)?;
                match self.get(key)? {
                    Some((value, version)) => Ok(serde_json::json!([value, version])),
                    None => Ok(serde_json::json!([])),
                }
            }
            other => Err(StorageError::UnsupportedOp {
                op: other.to_owned(),
            }),
        }
    }
}

fn load_dir(dir: &Path) -> Result<Vec<String>, StorageError> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        return Ok(Vec::new());
    }

    let mut data_names = Vec::new();
    let mut index_names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match path.extension().and_then(|e| e.to_str()) {
            Some(DATA_FILE_EXT) => data_names.push(stem.to_owned()),
            Some(INDEX_FILE_EXT) => index_names.push(stem.to_owned()),
            _ => {}
        }
    }

    for name in &data_names {
        if !index_names.contains(name) {
            tracing::warn!(sstable = %name, "index file not found for data file, ignoring");
        }
    }
    for name in &index_names {
        if !data_names.contains(name) {
            tracing::warn!(sstable = %name, "data file not found for index file, ignoring");
        }
    }

    let mut complete: Vec<String> = data_names
        .into_iter()
        .filter(|n| index_names.contains(n))
        .collect();
    complete.sort();
    Ok(complete)
}

fn read_index_file(path: &Path, index_key: &str) -> Result<SsTableIndex, StorageError> {
    let contents = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut index = HashMap::new();
    for line in contents.lines() {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let [key, offset, length, version] = fields[..] else {
            return Err(StorageError::MalformedIndexLine {
                index_key: index_key.to_owned(),
                line: line.to_owned(),
            });
        };
        let parse = |s: &str| {
            s.parse::<u64>().map_err(|_| StorageError::MalformedIndexLine {
                index_key: index_key.to_owned(),
                line: line.to_owned(),
            })
        };
        index.insert(key.to_owned(), (parse(offset)?, parse(length)?, parse(version)?));
    }
    Ok(index)
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn current_millis() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_wire::RequestPayload;

    fn config_in(dir: &Path) -> StorageConfig {
        StorageConfig {
            datafile_dir: dir.to_path_buf(),
            max_indices_in_memory: -1,
            max_data_per_sstable: 1024,
        }
    }

    #[test]
    fn put_then_get_reads_from_memtable() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(config_in(dir.path())).unwrap();
        engine.put("alpha", "one").unwrap();
        let (value, version) = engine.get("alpha").unwrap().unwrap();
        assert_eq!(value, "one");
        assert_eq!(version, 1);
    }

    #[test]
    fn put_bumps_version_on_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(config_in(dir.path())).unwrap();
        engine.put("alpha", "one").unwrap();
        let v2 = engine.put("alpha", "two").unwrap();
        assert_eq!(v2, 2);
    }

    #[test]
    fn flush_then_get_reads_from_sstable() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(config_in(dir.path())).unwrap();
        engine.put("alpha", "one").unwrap();
        engine.flush_to_file().unwrap();
        assert!(engine.memtable.is_empty());
        let (value, version) = engine.get("alpha").unwrap().unwrap();
        assert_eq!(value, "one");
        assert_eq!(version, 1);
    }

    #[test]
    fn version_survives_across_flush() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(config_in(dir.path())).unwrap();
        engine.put("alpha", "one").unwrap();
        engine.flush_to_file().unwrap();
        let v2 = engine.put("alpha", "two").unwrap();
        assert_eq!(v2, 2);
    }

    #[test]
    fn get_missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(config_in(dir.path())).unwrap();
        assert!(engine.get("nope").unwrap().is_none());
    }

    #[test]
    fn reopen_recovers_sstables() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut engine = StorageEngine::open(config_in(dir.path())).unwrap();
            engine.put("alpha", "one").unwrap();
            engine.flush_to_file().unwrap();
        }
        let mut reopened = StorageEngine::open(config_in(dir.path())).unwrap();
        let (value, _) = reopened.get("alpha").unwrap().unwrap();
        assert_eq!(value, "one");
    }

    #[test]
    fn orphan_data_file_without_index_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("12345.ssdf"), b"garbage").unwrap();
        let engine = StorageEngine::open(config_in(dir.path())).unwrap();
        assert!(engine.table_index_names.is_empty());
    }

    #[test]
    fn handle_request_dispatches_put_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(config_in(dir.path())).unwrap();
        let put_req = RequestPayload::new(
            vec!["put".to_owned(), "alpha".to_owned(), "one".to_owned()],
            1,
        );
        let put_resp = engine.handle_request(&put_req);
        assert!(put_resp.status);

        let get_req = RequestPayload::new(vec!["get".to_owned(), "alpha".to_owned()], 2);
        let get_resp = engine.handle_request(&get_req);
        assert!(get_resp.status);
        assert_eq!(get_resp.description, serde_json::json!(["one", 1]));
    }

    #[test]
    fn handle_request_rejects_unsupported_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(config_in(dir.path())).unwrap();
        let req = RequestPayload::new(vec!["delete".to_owned(), "alpha".to_owned()], 1);
        let resp = engine.handle_request(&req);
        assert!(!resp.status);
    }

    #[test]
    fn flush_is_noop_on_empty_memtable() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(config_in(dir.path())).unwrap();
        engine.flush_to_file().unwrap();
        assert!(engine.table_index_names.is_empty());
    }
}
