//! On-disk snapshot of the committed subscription set.
//!
//! Layout of `subscriptions.bin`:
//!
//! ```text
//! magic "SUB\0" | format version (u8) | crc32 (u32 LE) | len (u64 LE) | body
//! ```
//!
//! The body is MessagePack. The file is rewritten through a temp file and a
//! rename, so a crash leaves either the old or the new snapshot.

use crate::error::{Result, SubscriptionError};
use crate::types::{Subscription, SubscriptionState, Version};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the snapshot file.
const SNAPSHOT_MAGIC: &[u8; 4] = b"SUB\0";

/// Current snapshot format version.
const SNAPSHOT_VERSION: u8 = 1;

/// magic + format version + crc32 + body length
const SNAPSHOT_HEADER_LEN: u64 = 4 + 1 + 4 + 8;

const SNAPSHOT_FILE: &str = "subscriptions.bin";

/// Everything needed to restore a lineage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedSet {
    pub version: Version,
    /// Next subscription id to hand out.
    pub next_id: u64,
    pub state: SubscriptionState,
    #[serde(default)]
    pub error: Option<String>,
    pub subscriptions: Vec<Subscription>,
}

/// Exclusive handle on a snapshot directory.
pub struct SnapshotFile {
    dir: PathBuf,
    _lock_file: File,
}

impl SnapshotFile {
    /// Open (or create) the snapshot directory and lock it.
    ///
    /// Returns the stored set if one exists.
    pub fn open(dir: impl AsRef<Path>, create_if_missing: bool) -> Result<(Self, Option<PersistedSet>)> {
        let dir = dir.as_ref().to_path_buf();

        if !dir.exists() {
            if !create_if_missing {
                return Err(SubscriptionError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("subscription store not found: {}", dir.display()),
                )));
            }
            fs::create_dir_all(&dir)?;
        }

        let lock_file = Self::acquire_lock(&dir)?;
        let file = Self {
            dir,
            _lock_file: lock_file,
        };

        let stored = if file.snapshot_path().exists() {
            Some(file.read()?)
        } else {
            None
        };

        Ok((file, stored))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// Replace the stored snapshot.
    pub fn write(&self, set: &PersistedSet) -> Result<()> {
        let body = rmp_serde::to_vec(set)?;
        let checksum = crc32fast::hash(&body);

        let tmp_path = self.dir.join(format!("{}.tmp", SNAPSHOT_FILE));
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;

            file.write_all(SNAPSHOT_MAGIC)?;
            file.write_all(&[SNAPSHOT_VERSION])?;
            file.write_all(&checksum.to_le_bytes())?;
            file.write_all(&(body.len() as u64).to_le_bytes())?;
            file.write_all(&body)?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, self.snapshot_path())?;
        Ok(())
    }

    /// Read the stored snapshot.
    pub fn read(&self) -> Result<PersistedSet> {
        let mut file = File::open(self.snapshot_path())?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != SNAPSHOT_MAGIC {
            return Err(SubscriptionError::InvalidFormat(
                "Invalid snapshot magic".into(),
            ));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != SNAPSHOT_VERSION {
            return Err(SubscriptionError::InvalidFormat(format!(
                "Unsupported snapshot version: {}",
                version[0]
            )));
        }

        let mut crc_bytes = [0u8; 4];
        file.read_exact(&mut crc_bytes)?;
        let expected = u32::from_le_bytes(crc_bytes);

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes);

        let available = file.metadata()?.len().saturating_sub(SNAPSHOT_HEADER_LEN);
        if len > available {
            return Err(SubscriptionError::InvalidFormat(format!(
                "Snapshot body length {} exceeds file size ({} bytes after header)",
                len, available
            )));
        }

        let mut body = vec![0u8; len as usize];
        file.read_exact(&mut body)?;

        let got = crc32fast::hash(&body);
        if got != expected {
            return Err(SubscriptionError::ChecksumMismatch { expected, got });
        }

        Ok(rmp_serde::from_slice(&body)?)
    }

    fn acquire_lock(dir: &Path) -> Result<File> {
        let lock_file = File::create(dir.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| SubscriptionError::Locked)?;

        Ok(lock_file)
    }
}

impl std::fmt::Debug for SnapshotFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotFile").field("dir", &self.dir).finish()
    }
}
