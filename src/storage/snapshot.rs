//! Snapshot Persistence
//!
//! A snapshot is a full point-in-time copy of both store mappings. It is
//! written as JSON to a fresh temporary file next to the target path and
//! renamed into place, so a crash mid-write never leaves a truncated
//! snapshot behind and concurrent saves never share a file.
//!
//! Expiration instants are stored as absolute wall-clock times and come
//! back bit-for-bit; entries that expired while the server was down are
//! restored as-is and disappear through normal lazy/active expiry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::SystemTime;
use tempfile::NamedTempFile;
use thiserror::Error;

/// On-disk format version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors raised while saving or loading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed snapshot: {0}")]
    Format(#[from] serde_json::Error),

    #[error("unsupported snapshot version {found} (expected {expected})", expected = SNAPSHOT_VERSION)]
    UnsupportedVersion { found: u32 },

    #[error("snapshot file not found: {0}")]
    NotFound(String),

    #[error("persistence is disabled")]
    Disabled,
}

/// Full export of the store state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Every stored key and its value.
    pub values: HashMap<String, String>,
    /// Absolute expiration instants for keys that carry a TTL.
    pub expirations: HashMap<String, SystemTime>,
}

#[derive(Serialize)]
struct SnapshotFileRef<'a> {
    version: u32,
    values: &'a HashMap<String, String>,
    expirations: &'a HashMap<String, SystemTime>,
}

#[derive(Deserialize)]
struct SnapshotFile {
    version: u32,
    values: HashMap<String, String>,
    #[serde(default)]
    expirations: HashMap<String, SystemTime>,
}

impl Snapshot {
    /// Number of keys in the snapshot.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Atomically writes the snapshot to `path`.
    ///
    /// Each call writes its own temporary file in the target directory, so
    /// saves racing on the same path each land whole; the last rename wins.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent)?;
                parent
            }
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(
                &mut writer,
                &SnapshotFileRef {
                    version: SNAPSHOT_VERSION,
                    values: &self.values,
                    expirations: &self.expirations,
                },
            )?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;

        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Reads a snapshot from `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist, which callers treat
    /// as a cold start rather than a failure.
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let stored: SnapshotFile = serde_json::from_reader(BufReader::new(file))?;
        if stored.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: stored.version,
            });
        }

        Ok(Some(Self {
            values: stored.values,
            expirations: stored.expirations,
        }))
    }
}
