//! Directory-backed blob store for persistent storage.
//!
//! Layout:
//!
//! ```text
//! <root>/
//! ├─ .lock             # Advisory lock, one process per directory
//! ├─ User.json         # One file per blob
//! └─ Order.json
//! ```

use crate::backend::{validate_blob_name, BlobStore};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const LOCK_FILE: &str = ".lock";

/// A file-based blob store.
///
/// Each blob is one file inside the root directory. Writes go to a hidden
/// temporary file which is synced and then renamed over the target, so a
/// crash mid-write leaves the previous blob intact.
///
/// # Thread Safety
///
/// The store is `Send + Sync`. Writes to different names proceed in
/// parallel; callers that write the same name from several threads must
/// serialize those writes themselves if ordering matters.
///
/// # Example
///
/// ```no_run
/// use residb_storage::{BlobStore, FileBlobStore};
/// use std::path::Path;
///
/// let store = FileBlobStore::open(Path::new("data")).unwrap();
/// store.write("users.json", b"[]").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBlobStore {
    root: PathBuf,
    /// Held for exclusive access to the directory.
    _lock_file: File,
    /// Disambiguates concurrent temp files.
    temp_seq: AtomicU64,
}

impl FileBlobStore {
    /// Opens or creates a blob store rooted at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `path` exists but is not a directory
    /// - Another process holds the lock (returns `Locked`)
    /// - I/O errors occur
    pub fn open(path: &Path) -> StorageResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(StorageError::InvalidLocation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: path.display().to_string(),
            });
        }

        Ok(Self {
            root: path.to_path_buf(),
            _lock_file: lock_file,
            temp_seq: AtomicU64::new(0),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Returns the file path used for a blob name.
    #[must_use]
    pub fn blob_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!(".{name}.{seq}.tmp"))
    }
}

impl BlobStore for FileBlobStore {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_blob_name(name)?;
        match fs::read(self.blob_path(name)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        validate_blob_name(name)?;

        let temp = self.temp_path(name);
        let result = (|| -> StorageResult<()> {
            let mut file = File::create(&temp)?;
            file.write_all(data)?;
            file.sync_all()?;
            fs::rename(&temp, self.blob_path(name))?;
            Ok(())
        })();

        if result.is_err() {
            let _ = fs::remove_file(&temp);
        }
        result
    }

    fn delete(&self, name: &str) -> StorageResult<bool> {
        validate_blob_name(name)?;
        match fs::remove_file(self.blob_path(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn names(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        validate_blob_name(name)?;
        Ok(self.blob_path(name).is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");

        let store = FileBlobStore::open(&root).unwrap();
        assert!(root.is_dir());
        assert!(store.names().unwrap().is_empty());
    }

    #[test]
    fn file_write_and_read() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();

        store.write("users.json", b"[1,2,3]").unwrap();

        assert_eq!(store.read("users.json").unwrap(), Some(b"[1,2,3]".to_vec()));
        assert_eq!(store.read("missing.json").unwrap(), None);
    }

    #[test]
    fn file_write_replaces_whole_blob() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();

        store.write("a.json", b"a much longer payload").unwrap();
        store.write("a.json", b"short").unwrap();

        assert_eq!(store.read("a.json").unwrap(), Some(b"short".to_vec()));
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let store = FileBlobStore::open(dir.path()).unwrap();
            store.write("persist.json", b"persistent data").unwrap();
        }

        {
            let store = FileBlobStore::open(dir.path()).unwrap();
            assert_eq!(
                store.read("persist.json").unwrap(),
                Some(b"persistent data".to_vec())
            );
        }
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = FileBlobStore::open(dir.path()).unwrap();

        let second = FileBlobStore::open(dir.path());
        assert!(matches!(second, Err(StorageError::Locked { .. })));
    }

    #[test]
    fn file_names_skip_hidden_files() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();

        store.write("b.json", b"1").unwrap();
        store.write("a.json", b"2").unwrap();

        assert_eq!(
            store.names().unwrap(),
            vec!["a.json".to_string(), "b.json".to_string()]
        );
    }

    #[test]
    fn file_delete() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        store.write("gone.json", b"x").unwrap();

        assert!(store.delete("gone.json").unwrap());
        assert!(!store.delete("gone.json").unwrap());
        assert!(!store.exists("gone.json").unwrap());
    }

    #[test]
    fn file_rejects_path_escape() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();

        assert!(store.write("../outside.json", b"x").is_err());
        assert!(store.read("nested/inner.json").is_err());
    }

    #[test]
    fn file_not_a_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        fs::write(&path, b"x").unwrap();

        let result = FileBlobStore::open(&path);
        assert!(matches!(result, Err(StorageError::InvalidLocation(_))));
    }
}
