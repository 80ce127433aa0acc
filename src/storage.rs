//! Storage abstraction over the tree that holds originals and cached variants.
//!
//! Paths are storage-relative, forward-slash separated, with no leading slash.
//! The coordinator never assumes a local filesystem; any backend satisfying
//! [`Storage`] works. Two implementations ship:
//!
//! - [`DiskStorage`] — a directory root on a local or network filesystem.
//!   Writes are crash-safe via the write-temp-then-rename pattern, so readers
//!   only ever observe complete files.
//! - [`MemoryStorage`] — an in-process map, used by tests and embedders that
//!   want an ephemeral tree.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Backend contract for original and variant bytes.
pub trait Storage: Send + Sync {
    fn exists(&self, path: &str) -> bool;
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
    /// Write a complete file. Implementations must make the write atomic
    /// with respect to concurrent readers: a reader sees either the old
    /// content, the new content, or no file — never a partial write.
    fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()>;
    fn delete(&self, path: &str) -> io::Result<()>;
    /// Remove a directory and everything beneath it. Missing directories
    /// are not an error.
    fn delete_directory(&self, dir: &str) -> io::Result<()>;
    /// Files directly inside `dir` (non-recursive), as storage-relative paths.
    fn list_files(&self, dir: &str) -> io::Result<Vec<String>>;
    /// Every directory in the tree, recursively, as storage-relative paths.
    fn list_directories(&self) -> io::Result<Vec<String>>;
}

/// Reject escapes from the storage root before touching the filesystem.
fn validate_relative(path: &str) -> io::Result<()> {
    if path.starts_with('/') || path.split('/').any(|seg| seg == "..") {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path escapes storage root: {path}"),
        ));
    }
    Ok(())
}

/// Filesystem-backed storage rooted at a directory.
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full(&self, path: &str) -> io::Result<PathBuf> {
        validate_relative(path)?;
        Ok(self.root.join(path))
    }
}

impl Storage for DiskStorage {
    fn exists(&self, path: &str) -> bool {
        self.full(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.full(path)?)
    }

    fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        let target = self.full(path)?;
        let parent = target.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "write target has no parent")
        })?;
        std::fs::create_dir_all(parent)?;

        // Temp file in the same directory so the rename stays on one
        // filesystem (POSIX guarantees rename atomicity there).
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        io::Write::write_all(&mut tmp, bytes)?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        std::fs::remove_file(self.full(path)?)
    }

    fn delete_directory(&self, dir: &str) -> io::Result<()> {
        let full = self.full(dir)?;
        if full.is_dir() {
            std::fs::remove_dir_all(full)?;
        }
        Ok(())
    }

    fn list_files(&self, dir: &str) -> io::Result<Vec<String>> {
        let full = self.full(dir)?;
        if !full.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&full)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(format!("{dir}/{}", entry.file_name().to_string_lossy()));
            }
        }
        files.sort();
        Ok(files)
    }

    fn list_directories(&self) -> io::Result<Vec<String>> {
        let mut dirs = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.file_type().is_dir() {
                if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                    dirs.push(to_storage_path(rel));
                }
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

/// Normalize an OS path to the forward-slash storage convention.
fn to_storage_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// In-memory storage backend.
#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        self.files.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, path: &str) -> bool {
        let files = self.files.read().unwrap();
        // A directory "exists" if any file lives beneath it.
        files.contains_key(path) || files.keys().any(|k| k.starts_with(&format!("{path}/")))
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }

    fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        validate_relative(path)?;
        self.files
            .write()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        self.files
            .write()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }

    fn delete_directory(&self, dir: &str) -> io::Result<()> {
        let prefix = format!("{dir}/");
        self.files
            .write()
            .unwrap()
            .retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    fn list_files(&self, dir: &str) -> io::Result<Vec<String>> {
        let prefix = format!("{dir}/");
        Ok(self
            .files
            .read()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(&prefix) && !k[prefix.len()..].contains('/'))
            .cloned()
            .collect())
    }

    fn list_directories(&self) -> io::Result<Vec<String>> {
        let files = self.files.read().unwrap();
        let mut dirs: Vec<String> = Vec::new();
        for key in files.keys() {
            let mut end = 0;
            while let Some(idx) = key[end..].find('/') {
                end += idx;
                let dir = &key[..end];
                if !dirs.iter().any(|d| d == dir) {
                    dirs.push(dir.to_string());
                }
                end += 1;
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}
