use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::{CachedEntry, FeedMetadata};
use crate::errors::{PlanetError, PlanetResult};
use crate::storage::cache_key::derive_key;

const SOURCES_DIR: &str = "sources";
const BLACKLIST_DIR: &str = "blacklist";
pub const INDEX_DIR: &str = "index";

/// Subdirectory names an entry file must not take.
const RESERVED_NAMES: [&str; 3] = [SOURCES_DIR, BLACKLIST_DIR, INDEX_DIR];

/// A cached entry file as seen by a directory scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFile {
    pub key: String,
    pub path: PathBuf,
    pub mtime: SystemTime,
}

/// The on-disk cache: entry files at the root, per-feed metadata under
/// `sources/` and blacklist markers under `blacklist/`.
///
/// Not safe for concurrent writers; all writes come from the single thread
/// consuming fetch results.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn open<P: AsRef<Path>>(root: P) -> PlanetResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(SOURCES_DIR))?;
        fs::create_dir_all(root.join(BLACKLIST_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(entry_file_name(key))
    }

    pub fn entry_mtime(&self, key: &str) -> PlanetResult<Option<SystemTime>> {
        match fs::metadata(self.entry_path(key)) {
            Ok(meta) if meta.is_file() => Ok(Some(meta.modified()?)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_entry(&self, key: &str) -> PlanetResult<Option<CachedEntry>> {
        match fs::read(self.entry_path(key)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_entry_file(&self, file: &EntryFile) -> PlanetResult<CachedEntry> {
        let bytes = fs::read(&file.path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Upsert the entry body at `key` with its mtime forced to `mtime`.
    pub fn write_entry(&self, key: &str, body: &str, mtime: SystemTime) -> PlanetResult<()> {
        write_atomic(&self.entry_path(key), body.as_bytes(), Some(mtime))
    }

    /// Returns whether a file was actually removed.
    pub fn remove_entry(&self, key: &str) -> PlanetResult<bool> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// All entry files, newest mtime first; ties break on key.
    pub fn list_entries(&self) -> PlanetResult<Vec<EntryFile>> {
        let mut files = Vec::new();

        for dirent in fs::read_dir(&self.root)? {
            let dirent = dirent?;
            let key = match dirent.file_name().into_string() {
                Ok(name) if !name.starts_with('.') => entry_key(name),
                _ => continue,
            };

            let meta = match dirent.metadata() {
                Ok(meta) => meta,
                // Removed between read_dir and stat.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !meta.is_file() {
                continue;
            }

            files.push(EntryFile {
                key,
                path: dirent.path(),
                mtime: meta.modified()?,
            });
        }

        files.sort_by(|a, b| b.mtime.cmp(&a.mtime).then_with(|| a.key.cmp(&b.key)));
        Ok(files)
    }

    fn metadata_path(&self, uri: &str) -> PlanetResult<PathBuf> {
        Ok(self.root.join(SOURCES_DIR).join(derive_key(uri)?))
    }

    /// Stored metadata for `uri`, or fresh metadata if none was recorded.
    /// An unreadable file is treated like a missing one.
    pub fn read_metadata(&self, uri: &str) -> PlanetResult<FeedMetadata> {
        let path = self.metadata_path(uri)?;
        match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<FeedMetadata>(&bytes) {
                Ok(mut meta) => {
                    meta.uri = uri.to_string();
                    Ok(meta)
                }
                Err(e) => {
                    tracing::warn!(feed = %uri, error = %e, "Discarding unreadable feed metadata");
                    Ok(FeedMetadata::new(uri.to_string()))
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(FeedMetadata::new(uri.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(test)]
    pub(crate) fn has_metadata(&self, uri: &str) -> PlanetResult<bool> {
        Ok(self.metadata_path(uri)?.is_file())
    }

    pub fn write_metadata(&self, meta: &FeedMetadata) -> PlanetResult<()> {
        let body = serde_json::to_vec_pretty(meta)?;
        write_atomic(&self.metadata_path(&meta.uri)?, &body, None)
    }

    pub fn is_blacklisted(&self, key: &str) -> bool {
        self.root.join(BLACKLIST_DIR).join(key).exists()
    }

    /// Permanently suppress the entry with `entry_id`. Returns its cache key.
    pub fn blacklist(&self, entry_id: &str) -> PlanetResult<String> {
        let key = derive_key(entry_id)?;
        write_atomic(&self.root.join(BLACKLIST_DIR).join(&key), entry_id.as_bytes(), None)?;
        Ok(key)
    }
}

/// Derived keys never end in ',', so a trailing one moves an entry whose
/// key equals a subdirectory name out of its way.
fn entry_file_name(key: &str) -> String {
    if RESERVED_NAMES.contains(&key) {
        format!("{},", key)
    } else {
        key.to_string()
    }
}

fn entry_key(name: String) -> String {
    match name.strip_suffix(',') {
        Some(key) if RESERVED_NAMES.contains(&key) => key.to_string(),
        _ => name,
    }
}

/// Write via a hidden temp file and rename so readers never see partial data.
fn write_atomic(path: &Path, bytes: &[u8], mtime: Option<SystemTime>) -> PlanetResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| PlanetError::InvalidInput(format!("no parent for {}", path.display())))?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    // Short and independent of the target name, which may already be close
    // to the file name limit.
    let temp_path = dir.join(format!(".tmp.{}.{:x}", std::process::id(), nanos));

    let result = (|| -> PlanetResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(bytes)?;
        if let Some(mtime) = mtime {
            file.set_modified(mtime)?;
        }
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
