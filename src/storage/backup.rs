//! Backup & restore for the player document
//!
//! Snapshots are byte-for-byte copies of `players.json` written under
//! `<data_dir>/backups/`. The index, `backups.json`, is itself a keyed document
//! (`[backup_id, metadata]` pairs) so it shares the locking rules of the other stores.
//! Every entry carries a SHA-256 of the snapshot, checked again before a restore.

use super::document::{self, Document};
use super::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

const INDEX_FILE: &str = "backups.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// `backup-<utc timestamp>`, with a numeric suffix on collisions
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub backup_type: BackupType,
    /// Hex SHA-256 of the snapshot bytes
    pub checksum: String,
    #[serde(default)]
    pub verified: bool,
    /// File name inside the backups directory
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    /// Operator asked for it.
    Manual,
    /// Taken automatically right before a bulk reset.
    PreReset,
}

pub struct BackupManager {
    dir: PathBuf,
    index: Document<BackupMetadata>,
}

pub fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

impl BackupManager {
    /// Open (creating if needed) the backup directory and read its index.
    pub fn new(dir: PathBuf) -> Result<Self, StoreError> {
        document::ensure_dir(&dir)?;
        let index = document::load(&dir.join(INDEX_FILE))?;
        Ok(Self { dir, index })
    }

    /// Write one entry into the on-disk index, keeping entries other processes added
    /// since this manager was opened. The merged index replaces the in-memory copy.
    fn merge_into_index(&mut self, meta: &BackupMetadata) -> Result<(), StoreError> {
        let merged = document::update::<BackupMetadata, _, _>(
            &self.dir.join(INDEX_FILE),
            |current| match current {
                Ok(mut doc) => {
                    match doc.iter_mut().find(|(id, _)| *id == meta.id) {
                        Some(slot) => slot.1 = meta.clone(),
                        None => doc.push((meta.id.clone(), meta.clone())),
                    }
                    (Some(doc.clone()), Ok(doc))
                }
                Err(e) => (None, Err(e)),
            },
        )??;
        self.index = merged;
        Ok(())
    }

    fn entry(&self, backup_id: &str) -> Result<&BackupMetadata, StoreError> {
        self.index
            .iter()
            .find(|(id, _)| id == backup_id)
            .map(|(_, meta)| meta)
            .ok_or_else(|| StoreError::Backup(format!("unknown backup '{}'", backup_id)))
    }

    fn next_id(&self, created_at: DateTime<Utc>) -> String {
        let base = format!("backup-{}", created_at.format("%Y-%m-%dT%H-%M-%S-%3fZ"));
        let taken = |id: &str| {
            self.index.iter().any(|(k, _)| k == id)
                || self.dir.join(format!("{}.json", id)).exists()
        };
        let mut id = base.clone();
        let mut n = 1;
        while taken(&id) {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        id
    }

    /// Reserve a snapshot file nobody else holds. `create_new` fails if another writer
    /// took the same name first, in which case the next free id is tried.
    fn create_snapshot_file(
        &self,
        created_at: DateTime<Utc>,
    ) -> Result<(String, File), StoreError> {
        loop {
            let id = self.next_id(created_at);
            let opened = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(format!("{}.json", id)));
            match opened {
                Ok(f) => return Ok((id, f)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Write `contents` as a new snapshot and record it in the index.
    pub fn create_backup(
        &mut self,
        contents: &[u8],
        backup_type: BackupType,
    ) -> Result<BackupMetadata, StoreError> {
        let created_at = Utc::now();
        let (id, mut file) = self.create_snapshot_file(created_at)?;
        let path = PathBuf::from(format!("{}.json", id));

        log::info!("Creating backup: {} (type: {:?})", id, backup_type);
        file.write_all(contents)?;
        file.sync_all()?;

        let meta = BackupMetadata {
            id: id.clone(),
            created_at,
            size_bytes: contents.len() as u64,
            backup_type,
            checksum: checksum(contents),
            verified: false,
            path,
        };
        self.merge_into_index(&meta)?;
        log::info!("Backup created: {} ({} bytes)", meta.id, meta.size_bytes);
        Ok(meta)
    }

    /// Re-hash a snapshot against its index entry, marking it verified on a match.
    pub fn verify_backup(&mut self, backup_id: &str) -> Result<bool, StoreError> {
        let meta = self.entry(backup_id)?;
        let bytes = fs::read(self.dir.join(&meta.path))?;
        let valid = checksum(&bytes) == meta.checksum;
        if !valid {
            log::error!("Backup {} failed verification (checksum mismatch)", backup_id);
            return Ok(false);
        }
        let mut meta = meta.clone();
        meta.verified = true;
        self.merge_into_index(&meta)?;
        Ok(true)
    }

    /// Snapshot bytes, refused if they no longer match the recorded checksum.
    pub fn read_backup(&self, backup_id: &str) -> Result<Vec<u8>, StoreError> {
        let meta = self.entry(backup_id)?;
        let bytes = fs::read(self.dir.join(&meta.path))?;
        if checksum(&bytes) != meta.checksum {
            return Err(StoreError::Backup(format!("checksum mismatch for '{}'", backup_id)));
        }
        Ok(bytes)
    }

    /// All known backups, oldest first.
    pub fn list_backups(&self) -> Vec<BackupMetadata> {
        let mut list: Vec<BackupMetadata> = self.index.iter().map(|(_, m)| m.clone()).collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub fn get_backup(&self, backup_id: &str) -> Option<&BackupMetadata> {
        self.entry(backup_id).ok()
    }
}
