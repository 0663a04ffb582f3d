//! # Storage Module - Player Persistence
//!
//! The whole player set lives in one JSON document, `<data_dir>/players.json`, stored as
//! a list of `(player_id, record)` pairs. [`PlayerStore`] keeps an in-memory cache in
//! front of it and follows a read-your-own-key-fresh discipline:
//!
//! - every read for mutation first reconciles that one key from disk, so changes made by
//!   another process since the last read are picked up
//! - every save re-reads the document under an exclusive fs2 lock, replaces only the saved
//!   key and rewrites the file, so concurrent saves for *different* players never lose
//!   each other's writes
//!
//! ```text
//! data/
//! ├── players.json      ← player document
//! ├── rewards.json      ← scarce reward registry
//! └── backups/          ← pre-reset and manual snapshots + backups.json index
//! ```
//!
//! ## Error Handling
//!
//! Storage faults never take the process down. Reads fall back to the cached view and
//! failed writes are logged; the only operation that refuses to proceed is
//! [`PlayerStore::reset_all`], which will not clear anything it could not back up first.

pub mod backup;
pub mod document;

use crate::config::{Config, ProgressionConfig};
use crate::game::types::Player;
use crate::logutil::escape_log;
use backup::{BackupManager, BackupMetadata, BackupType};
use chrono::{DateTime, Utc};
use document::{ensure_dir, Document};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("backup error: {0}")]
    Backup(String),
}

/// Full player set at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct PlayersSnapshot {
    pub exported_at: DateTime<Utc>,
    pub players: Document<Player>,
}

pub struct PlayerStore {
    data_dir: PathBuf,
    path: PathBuf,
    start_position: u32,
    progression: ProgressionConfig,
    cache: Mutex<HashMap<String, Player>>,
}

impl PlayerStore {
    /// Open the store rooted at `data_dir`, loading whatever is already on disk.
    pub fn open(data_dir: impl AsRef<Path>, config: &Config) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        if let Err(e) = ensure_dir(&data_dir) {
            warn!("player store: unable to ensure dir {:?}: {}", data_dir, e);
        }
        let store = Self {
            path: data_dir.join("players.json"),
            data_dir,
            start_position: config.game.start_position,
            progression: config.progression.clone(),
            cache: Mutex::new(HashMap::new()),
        };
        match document::load::<Player>(&store.path) {
            Ok(doc) => {
                info!("Loaded {} players from {}", doc.len(), store.path.display());
                let mut cache = store.cache();
                for (id, p) in doc {
                    let p = store.normalize(&id, p);
                    cache.insert(id, p);
                }
            }
            Err(e) => warn!("player store: failed loading {}: {}", store.path.display(), e),
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn start_position(&self) -> u32 {
        self.start_position
    }

    fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Player>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Key wins over the embedded id; out-of-range fields are pulled back in.
    fn normalize(&self, key: &str, mut p: Player) -> Player {
        if p.id != key {
            p.id = key.to_string();
        }
        let progression = &self.progression;
        if p.clamp_invariants(self.start_position, |pos| progression.digs_required(pos)) {
            debug!("player store: clamped record {}", escape_log(key));
        }
        p
    }

    fn cached_players(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self.cache().values().cloned().collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));
        players
    }

    /// Refresh one key from disk. Other keys in the cache are left alone. A key that is
    /// gone from a readable document was removed elsewhere and is dropped here too.
    fn reconcile(&self, id: &str) {
        match document::load::<Player>(&self.path) {
            Ok(doc) => match doc.into_iter().find(|(k, _)| k == id) {
                Some((key, p)) => {
                    let p = self.normalize(&key, p);
                    self.cache().insert(key, p);
                }
                None => {
                    if self.cache().remove(id).is_some() {
                        debug!("player store: {} no longer on disk, dropped", escape_log(id));
                    }
                }
            },
            Err(e) => warn!(
                "player store: reconcile of {} failed, using cached copy: {}",
                escape_log(id),
                e
            ),
        }
    }

    pub fn get(&self, id: &str) -> Option<Player> {
        self.reconcile(id);
        self.cache().get(id).cloned()
    }

    /// Existing record with its display name refreshed, or a fresh record (persisted
    /// immediately) on first contact.
    pub fn get_or_create(&self, id: &str, display_name: &str) -> Player {
        self.reconcile(id);
        let existing = self.cache().get_mut(id).map(|p| {
            p.display_name = display_name.to_string();
            p.clone()
        });
        match existing {
            Some(p) => p,
            None => {
                let p = Player::new(id, display_name, self.start_position);
                info!(
                    "player store: new player {} ({})",
                    escape_log(id),
                    escape_log(display_name)
                );
                self.save(&p);
                p
            }
        }
    }

    /// Persist one player. Failures are logged, never returned.
    pub fn save(&self, player: &Player) {
        let record = self.normalize(&player.id, player.clone());
        self.cache().insert(record.id.clone(), record.clone());

        let path = self.path.clone();
        let result = document::update::<Player, _, ()>(&self.path, |current| match current {
            Ok(mut doc) => {
                match doc.iter_mut().find(|(k, _)| *k == record.id) {
                    Some(slot) => slot.1 = record.clone(),
                    None => doc.push((record.id.clone(), record.clone())),
                }
                (Some(doc), ())
            }
            Err(e) => {
                error!(
                    "player store: {} unreadable ({}); left untouched, {} kept in memory only",
                    path.display(),
                    e,
                    escape_log(&record.id)
                );
                (None, ())
            }
        });
        if let Err(e) = result {
            error!("player store: failed saving {}: {}", escape_log(&player.id), e);
        }
    }

    /// Every player, in document order. Refreshes the whole cache from disk.
    pub fn list_all(&self) -> Vec<Player> {
        match document::load::<Player>(&self.path) {
            Ok(doc) => {
                let players: Vec<Player> = doc
                    .into_iter()
                    .map(|(k, p)| self.normalize(&k, p))
                    .collect();
                let mut cache = self.cache();
                cache.clear();
                for p in &players {
                    cache.insert(p.id.clone(), p.clone());
                }
                players
            }
            Err(e) => {
                warn!("player store: failed listing players, using cached view: {}", e);
                self.cached_players()
            }
        }
    }

    /// Put one player back at the start. Returns the reset record, or `None` if unknown.
    pub fn reset_one(&self, id: &str) -> Option<Player> {
        let mut p = self.get(id)?;
        p.reset_progress(self.start_position);
        self.save(&p);
        info!("Player {} data has been reset", escape_log(id));
        Some(p)
    }

    /// Back up the current document, then clear it. Nothing is cleared if the backup fails.
    pub fn reset_all(&self) -> Result<BackupMetadata, StoreError> {
        let backups_dir = self.backups_dir();
        let meta = document::update::<Player, _, Result<BackupMetadata, StoreError>>(
            &self.path,
            |current| {
                let doc = match current {
                    Ok(doc) => doc,
                    Err(e) => return (None, Err(e)),
                };
                let taken = serde_json::to_vec_pretty(&doc)
                    .map_err(StoreError::from)
                    .and_then(|bytes| {
                        BackupManager::new(backups_dir)
                            .and_then(|mut m| m.create_backup(&bytes, BackupType::PreReset))
                    });
                match taken {
                    Ok(meta) => (Some(Vec::new()), Ok(meta)),
                    Err(e) => (None, Err(e)),
                }
            },
        )??;
        self.cache().clear();
        info!("All player data has been reset (backup {})", meta.id);
        Ok(meta)
    }

    /// Manual snapshot of the current document.
    pub fn backup(&self) -> Result<BackupMetadata, StoreError> {
        let doc = document::load::<Player>(&self.path)?;
        let bytes = serde_json::to_vec_pretty(&doc)?;
        let mut manager = BackupManager::new(self.backups_dir())?;
        Ok(manager.create_backup(&bytes, BackupType::Manual)?)
    }

    pub fn list_backups(&self) -> Result<Vec<BackupMetadata>, StoreError> {
        Ok(BackupManager::new(self.backups_dir())?.list_backups())
    }

    /// Re-hash one snapshot against the index.
    pub fn verify_backup(&self, backup_id: &str) -> Result<bool, StoreError> {
        BackupManager::new(self.backups_dir())?.verify_backup(backup_id)
    }

    /// Replace the player document with a checksum-verified backup. Returns the number of
    /// players restored.
    pub fn restore_backup(&self, backup_id: &str) -> Result<usize, StoreError> {
        let manager = BackupManager::new(self.backups_dir())?;
        let bytes = manager.read_backup(backup_id)?;
        let doc: Document<Player> = serde_json::from_slice(&bytes)?;
        let count = doc.len();
        document::store(&self.path, doc)?;
        self.list_all();
        info!("Restored {} players from backup {}", count, backup_id);
        Ok(count)
    }

    pub fn export_snapshot(&self) -> PlayersSnapshot {
        PlayersSnapshot {
            exported_at: Utc::now(),
            players: self
                .list_all()
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
        }
    }

    /// Remember the player's private channel handle. Returns false for unknown players.
    pub fn set_private_channel(&self, id: &str, handle: &str) -> bool {
        match self.get(id) {
            Some(mut p) => {
                p.private_channel_ref = Some(handle.to_string());
                self.save(&p);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::types::ConsumableKind;
    use std::fs;
    use tempfile::tempdir;

    fn open(dir: &Path) -> PlayerStore {
        PlayerStore::open(dir, &Config::default())
    }

    #[test]
    fn get_or_create_persists_new_player() {
        let tmp = tempdir().unwrap();
        let store = open(tmp.path());
        let p = store.get_or_create("100", "alice");
        assert_eq!(p.position, 3000);
        assert_eq!(p.currency, 0);
        let reopened = open(tmp.path());
        assert_eq!(reopened.get("100"), Some(p));
    }

    #[test]
    fn display_name_refreshes_on_access() {
        let tmp = tempdir().unwrap();
        let store = open(tmp.path());
        store.get_or_create("100", "alice");
        let p = store.get_or_create("100", "alice_renamed");
        assert_eq!(p.display_name, "alice_renamed");
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let tmp = tempdir().unwrap();
        let store = open(tmp.path());
        let mut p = Player::new("7", "bob", 3000);
        p.position = 1234;
        p.currency = 987;
        p.inventory.add(ConsumableKind::Dynamite, 3);
        p.last_action_at = 1_700_000_000_000;
        p.timeout_until = 1_700_000_030_000;
        p.total_actions = 55;
        p.tile_progress = 2;
        p.private_channel_ref = Some("thread-9".into());
        store.save(&p);

        let reopened = open(tmp.path());
        assert_eq!(reopened.list_all(), vec![p]);
    }

    #[test]
    fn reconciles_out_of_process_change() {
        let tmp = tempdir().unwrap();
        let store = open(tmp.path());
        let mut p = store.get_or_create("1", "alice");
        assert_eq!(p.currency, 0);

        // Another process bumps the balance behind our back.
        p.currency = 400;
        let doc: Document<Player> = vec![("1".to_string(), p)];
        fs::write(store.path(), serde_json::to_string(&doc).unwrap()).unwrap();

        assert_eq!(store.get("1").unwrap().currency, 400);
    }

    #[test]
    fn saves_from_two_stores_do_not_clobber_each_other() {
        let tmp = tempdir().unwrap();
        let a = open(tmp.path());
        let b = open(tmp.path());
        let mut pa = a.get_or_create("a", "alice");
        let mut pb = b.get_or_create("b", "bob");
        pa.currency = 10;
        pb.currency = 20;
        // `a` never saw player `b` in its cache; the merge still keeps it.
        a.save(&pa);
        b.save(&pb);
        let ids: Vec<(String, u64)> = open(tmp.path())
            .list_all()
            .into_iter()
            .map(|p| (p.id, p.currency))
            .collect();
        assert_eq!(ids, vec![("a".to_string(), 10), ("b".to_string(), 20)]);
    }

    #[test]
    fn reset_by_another_store_is_not_undone_by_a_later_save() {
        let tmp = tempdir().unwrap();
        let bot = open(tmp.path());
        let admin = open(tmp.path());
        let mut p = bot.get_or_create("1", "alice");
        p.currency = 500;
        p.position = 100;
        bot.save(&p);

        admin.reset_all().unwrap();
        assert!(bot.get("1").is_none());

        let fresh = bot.get_or_create("1", "alice");
        assert_eq!((fresh.currency, fresh.position), (0, 3000));
        bot.save(&fresh);
        let on_disk: Vec<(u64, u32)> = admin
            .list_all()
            .into_iter()
            .map(|p| (p.currency, p.position))
            .collect();
        assert_eq!(on_disk, vec![(0, 3000)]);
    }

    #[test]
    fn load_clamps_out_of_range_records() {
        let tmp = tempdir().unwrap();
        let json = concat!(
            r#"[["x",{"id":"x","display_name":"x","#,
            r#""position":9000,"currency":5,"tile_progress":4}]]"#
        );
        fs::write(tmp.path().join("players.json"), json).unwrap();
        let store = open(tmp.path());
        let p = store.get("x").unwrap();
        assert_eq!(p.position, 3000);
        assert_eq!(p.tile_progress, 0);
        assert_eq!(p.total_actions, 0);
    }

    #[test]
    fn corrupt_document_falls_back_to_cache_and_is_not_overwritten() {
        let tmp = tempdir().unwrap();
        let store = open(tmp.path());
        let mut p = store.get_or_create("1", "alice");
        fs::write(store.path(), "{{{ garbage").unwrap();

        assert_eq!(store.get("1").unwrap().id, "1");
        p.currency = 99;
        store.save(&p);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{{{ garbage");
        assert_eq!(store.get("1").unwrap().currency, 99);
        assert!(store.reset_all().is_err());
    }

    #[test]
    fn reset_one_keeps_identity() {
        let tmp = tempdir().unwrap();
        let store = open(tmp.path());
        let mut p = store.get_or_create("1", "alice");
        p.position = 10;
        p.currency = 5000;
        p.total_actions = 300;
        p.private_channel_ref = Some("chan".into());
        store.save(&p);
        let reset = store.reset_one("1").unwrap();
        assert_eq!(reset.position, 3000);
        assert_eq!(reset.currency, 0);
        assert_eq!(reset.total_actions, 0);
        assert_eq!(reset.display_name, "alice");
        assert_eq!(reset.private_channel_ref.as_deref(), Some("chan"));
        assert!(store.reset_one("nobody").is_none());
    }

    #[test]
    fn reset_all_backs_up_then_clears_and_restore_brings_it_back() {
        let tmp = tempdir().unwrap();
        let store = open(tmp.path());
        store.get_or_create("1", "alice");
        store.get_or_create("2", "bob");

        let meta = store.reset_all().unwrap();
        assert_eq!(meta.backup_type, BackupType::PreReset);
        assert!(store.list_all().is_empty());
        assert!(store.get("1").is_none());

        let backups = store.list_backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(store.restore_backup(&meta.id).unwrap(), 2);
        assert_eq!(store.list_all().len(), 2);
    }

    #[test]
    fn private_channel_is_stored() {
        let tmp = tempdir().unwrap();
        let store = open(tmp.path());
        assert!(!store.set_private_channel("1", "thread-1"));
        store.get_or_create("1", "alice");
        assert!(store.set_private_channel("1", "thread-1"));
        assert_eq!(
            open(tmp.path()).get("1").unwrap().private_channel_ref.as_deref(),
            Some("thread-1")
        );
    }

    #[test]
    fn snapshot_lists_pairs_in_document_order() {
        let tmp = tempdir().unwrap();
        let store = open(tmp.path());
        store.get_or_create("z", "zed");
        store.get_or_create("a", "amy");
        let snap = store.export_snapshot();
        let keys: Vec<&str> = snap.players.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }
}
