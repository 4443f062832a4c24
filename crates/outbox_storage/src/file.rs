//! File-based store for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_name, DurableStore};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const RECORD_EXT: &str = "rec";
const TEMP_EXT: &str = "tmp";

/// A file-based partitioned store.
///
/// Each partition is a directory under the store root and each record is
/// one file inside it. Data survives process restarts.
///
/// # Durability
///
/// `put_record` writes to a temporary file, calls `File::sync_all()`, then
/// renames it over the previous record. A crash mid-write leaves the old
/// value in place; stray temporary files are ignored on read.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads. Writes are
/// serialized through an internal lock.
///
/// # Example
///
/// ```no_run
/// use outbox_storage::{DurableStore, FileStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("outbox-data")).unwrap();
/// store.put_record("pending_operations", "operations", b"...").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens or creates a store rooted at `root`, creating directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, partition: &str) -> StorageResult<PathBuf> {
        validate_name("partition", partition)?;
        Ok(self.root.join(partition))
    }

    fn record_path(&self, partition: &str, key: &str) -> StorageResult<PathBuf> {
        validate_name("key", key)?;
        let dir = self.partition_dir(partition)?;
        Ok(dir.join(format!("{}.{}", encode_key(key), RECORD_EXT)))
    }
}

impl DurableStore for FileStore {
    fn put_record(&self, partition: &str, key: &str, value: &[u8]) -> StorageResult<()> {
        let path = self.record_path(partition, key)?;
        let temp = path.with_extension(TEMP_EXT);
        let _guard = self.write_lock.lock();

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp)?;
            file.write_all(value)?;
            file.sync_all()?;
        }

        fs::rename(&temp, &path)?;
        sync_dir(path.parent());
        Ok(())
    }

    fn get_record(&self, partition: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.record_path(partition, key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_all_records(&self, partition: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let dir = self.partition_dir(partition)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_key)
            else {
                warn!(path = %path.display(), "skipping record with undecodable file name");
                continue;
            };
            records.push((key, fs::read(&path)?));
        }

        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }

    fn delete_record(&self, partition: &str, key: &str) -> StorageResult<()> {
        let path = self.record_path(partition, key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => {
                sync_dir(path.parent());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_partition(&self, partition: &str) -> StorageResult<()> {
        let dir = self.partition_dir(partition)?;
        let _guard = self.write_lock.lock();
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

/// Best-effort fsync of a directory so a rename survives power loss.
fn sync_dir(dir: Option<&Path>) {
    if let Some(dir) = dir {
        if let Ok(handle) = File::open(dir) {
            let _ = handle.sync_all();
        }
    }
}

/// Hex-encodes a key so arbitrary keys map to portable file names.
fn encode_key(key: &str) -> String {
    key.bytes().map(|b| format!("{:02x}", b)).collect()
}

fn decode_key(name: &str) -> Option<String> {
    if name.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..name.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(name.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn file_open_creates_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("store");

        let store = FileStore::open(&root).unwrap();
        assert!(root.exists());
        assert_eq!(store.root(), root.as_path());
    }

    #[test]
    fn file_put_and_get() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put_record("tickets", "/api/tickets/1", b"single").unwrap();
        assert_eq!(
            store.get_record("tickets", "/api/tickets/1").unwrap(),
            Some(b"single".to_vec())
        );
        assert_eq!(store.get_record("tickets", "missing").unwrap(), None);
    }

    #[test]
    fn file_put_replaces_without_leftovers() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put_record("settings", "user", b"v1").unwrap();
        store.put_record("settings", "user", b"v2").unwrap();

        let files: Vec<_> = fs::read_dir(dir.path().join("settings"))
            .unwrap()
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(store.get_record("settings", "user").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn file_persists_across_reopen() {
        let dir = tempdir().unwrap();

        {
            let store = FileStore::open(dir.path()).unwrap();
            store.put_record("journeys", "a", b"1").unwrap();
            store.put_record("journeys", "b", b"2").unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        let records = store.get_all_records("journeys").unwrap();
        assert_eq!(
            records,
            vec![("a".to_string(), b"1".to_vec()), ("b".to_string(), b"2".to_vec())]
        );
    }

    #[test]
    fn file_get_all_ignores_temp_files() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.put_record("tickets", "a", b"1").unwrap();

        // Simulate a crash between write and rename.
        fs::write(dir.path().join("tickets").join("62.tmp"), b"partial").unwrap();

        let records = store.get_all_records("tickets").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn file_missing_partition_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.get_all_records("never_written").unwrap().is_empty());
    }

    #[test]
    fn file_delete_and_clear() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.put_record("tickets", "a", b"1").unwrap();
        store.put_record("tickets", "b", b"2").unwrap();

        store.delete_record("tickets", "a").unwrap();
        store.delete_record("tickets", "a").unwrap();
        assert_eq!(store.get_all_records("tickets").unwrap().len(), 1);

        store.clear_partition("tickets").unwrap();
        store.clear_partition("tickets").unwrap();
        assert!(store.get_all_records("tickets").unwrap().is_empty());
    }

    #[test]
    fn file_rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let result = store.put_record("../outside", "a", b"1");
        assert!(matches!(result, Err(StorageError::InvalidName { .. })));
    }

    proptest! {
        #[test]
        fn key_encoding_roundtrips(key in "\\PC{1,40}") {
            prop_assert_eq!(decode_key(&encode_key(&key)), Some(key));
        }
    }
}
