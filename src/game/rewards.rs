//! Scarce reward registry.
//!
//! A small catalog of one-off prizes, each bound to a single tile. Positions are drawn
//! once, when `rewards.json` is first created, and never move afterwards. Claims are a
//! check-and-set done while holding both the in-process mutex and an exclusive fs2 lock
//! on the document, so an entry is handed out at most once across threads and processes.

use super::engine::RewardLookup;
use super::types::{ClaimOutcome, ScarceReward};
use crate::config::{RewardSpec, RewardsConfig, TileBand};
use crate::logutil::escape_log;
use crate::storage::document::{self, Document};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use rand::Rng;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub struct RewardRegistry {
    path: PathBuf,
    entries: Mutex<Vec<ScarceReward>>,
}

fn to_document(entries: &[ScarceReward]) -> Document<ScarceReward> {
    entries.iter().map(|r| (r.id.clone(), r.clone())).collect()
}

fn from_document(doc: Document<ScarceReward>) -> Vec<ScarceReward> {
    doc.into_iter().map(|(_, r)| r).collect()
}

/// Distinct uniform position inside `band`, or `None` once the band is full.
fn place<R: Rng + ?Sized>(band: TileBand, taken: &mut HashSet<u32>, rng: &mut R) -> Option<u32> {
    let used = taken.iter().filter(|p| band.contains(**p)).count() as u64;
    if band.min > band.max || used >= band.width() as u64 {
        return None;
    }
    loop {
        let pos = rng.gen_range(band.min..=band.max);
        if taken.insert(pos) {
            return Some(pos);
        }
    }
}

/// Add catalog entries that are not in `entries` yet. Returns true if anything was added.
fn fill_catalog<R: Rng + ?Sized>(
    entries: &mut Vec<ScarceReward>,
    config: &RewardsConfig,
    rng: &mut R,
) -> bool {
    let mut taken: HashSet<u32> = entries.iter().map(|r| r.position).collect();
    let mut added = false;
    for spec in &config.catalog {
        if entries.iter().any(|r| r.id == spec.id) {
            continue;
        }
        match place(config.band, &mut taken, rng) {
            Some(position) => {
                entries.push(new_entry(spec, position));
                added = true;
            }
            None => warn!(
                "rewards: no free tile left in {}..={} for '{}'",
                config.band.min,
                config.band.max,
                escape_log(&spec.id)
            ),
        }
    }
    added
}

fn new_entry(spec: &RewardSpec, position: u32) -> ScarceReward {
    ScarceReward {
        id: spec.id.clone(),
        name: spec.name.clone(),
        description: spec.description.clone(),
        value: spec.value.clone(),
        position,
        claimed_by: None,
        claimed_at: None,
    }
}

/// The check-and-set itself. Returns the outcome and whether anything changed.
fn decide<'a>(
    entries: impl IntoIterator<Item = &'a mut ScarceReward>,
    position: u32,
    claimant: &str,
    now: DateTime<Utc>,
) -> (ClaimOutcome, bool) {
    let Some(entry) = entries.into_iter().find(|r| r.position == position) else {
        return (ClaimOutcome::NoReward, false);
    };
    match entry.claimed_by.as_deref() {
        Some(owner) if owner == claimant => (ClaimOutcome::Claimed(entry.clone()), false),
        Some(_) => (ClaimOutcome::AlreadyClaimed(entry.clone()), false),
        None => {
            entry.claimed_by = Some(claimant.to_string());
            entry.claimed_at = Some(now);
            (ClaimOutcome::Claimed(entry.clone()), true)
        }
    }
}

impl RewardRegistry {
    /// Load `<data_dir>/rewards.json`, creating and persisting it on first use. Catalog
    /// entries missing from an existing document are placed and appended. Nothing is
    /// placed when the document can't be read or written; the registry then stays empty.
    pub fn open<R: Rng + ?Sized>(
        data_dir: impl AsRef<Path>,
        config: &RewardsConfig,
        rng: &mut R,
    ) -> Self {
        let path = data_dir.as_ref().join("rewards.json");
        let result = document::update::<ScarceReward, _, Vec<ScarceReward>>(&path, |current| {
            match current {
                Ok(doc) => {
                    let mut entries = from_document(doc);
                    if fill_catalog(&mut entries, config, rng) {
                        info!("rewards: placed catalog, {} entries total", entries.len());
                        (Some(to_document(&entries)), entries)
                    } else {
                        (None, entries)
                    }
                }
                Err(e) => {
                    error!("rewards: {} unreadable, no prizes available: {}", path.display(), e);
                    (None, Vec::new())
                }
            }
        });
        let entries = match result {
            Ok(entries) => entries,
            Err(e) => {
                error!("rewards: failed to persist registry, no prizes available: {}", e);
                Vec::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<ScarceReward>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pick up claims made by other processes. Keeps the cached view when the file is
    /// unreadable or empty.
    fn refresh(&self) -> MutexGuard<'_, Vec<ScarceReward>> {
        let mut entries = self.entries();
        match document::load::<ScarceReward>(&self.path) {
            Ok(doc) if !doc.is_empty() => *entries = from_document(doc),
            Ok(_) => {}
            Err(e) => warn!("rewards: reload failed, using cached view: {}", e),
        }
        entries
    }

    /// Every entry, claimed or not.
    pub fn status(&self) -> Vec<ScarceReward> {
        self.refresh().clone()
    }

    /// Atomically claim the reward at `position` for `claimant`. A claim only counts
    /// once it is on disk; any read or write fault yields `Unavailable`.
    pub fn claim(&self, position: u32, claimant: &str, now: DateTime<Utc>) -> ClaimOutcome {
        let mut entries = self.entries();
        // A deleted file is re-seeded from the cached view.
        let seed = to_document(&entries);
        let path = self.path.clone();
        let result = document::update::<ScarceReward, _, Option<(ClaimOutcome, Vec<ScarceReward>)>>(
            &self.path,
            |current| {
                let mut doc = match current {
                    Ok(doc) if doc.is_empty() => seed,
                    Ok(doc) => doc,
                    Err(e) => {
                        error!("rewards: {} unreadable during claim: {}", path.display(), e);
                        return (None, None);
                    }
                };
                let (outcome, changed) =
                    decide(doc.iter_mut().map(|(_, r)| r), position, claimant, now);
                let view = doc.iter().map(|(_, r)| r.clone()).collect();
                (changed.then_some(doc), Some((outcome, view)))
            },
        );

        let outcome = match result {
            Ok(Some((outcome, view))) => {
                *entries = view;
                outcome
            }
            Ok(None) => ClaimOutcome::Unavailable,
            Err(e) => {
                error!("rewards: claim at tile {} not persisted: {}", position, e);
                ClaimOutcome::Unavailable
            }
        };
        if let ClaimOutcome::Claimed(r) = &outcome {
            info!(
                "rewards: '{}' at tile {} claimed by {}",
                escape_log(&r.id),
                r.position,
                escape_log(claimant)
            );
        }
        outcome
    }
}

impl RewardLookup for RewardRegistry {
    fn lookup(&self, position: u32) -> Option<ScarceReward> {
        self.refresh()
            .iter()
            .find(|r| r.position == position && !r.is_claimed())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn open(dir: &Path, seed: u64) -> RewardRegistry {
        RewardRegistry::open(dir, &RewardsConfig::default(), &mut StdRng::seed_from_u64(seed))
    }

    #[test]
    fn first_open_places_distinct_positions_in_band() {
        let tmp = tempdir().unwrap();
        let reg = open(tmp.path(), 1);
        let all = reg.status();
        assert_eq!(all.len(), 3);
        let band = RewardsConfig::default().band;
        let positions: HashSet<u32> = all.iter().map(|r| r.position).collect();
        assert_eq!(positions.len(), 3);
        assert!(all.iter().all(|r| band.contains(r.position) && !r.is_claimed()));
        assert!(tmp.path().join("rewards.json").exists());
    }

    #[test]
    fn positions_survive_reopen_with_a_different_seed() {
        let tmp = tempdir().unwrap();
        let first = open(tmp.path(), 1).status();
        let second = open(tmp.path(), 99).status();
        assert_eq!(first, second);
    }

    #[test]
    fn new_catalog_entries_are_appended() {
        let tmp = tempdir().unwrap();
        let before = open(tmp.path(), 1).status();
        let mut config = RewardsConfig::default();
        config.catalog.push(RewardSpec {
            id: "gift".into(),
            name: "Gift card".into(),
            description: "A gift card".into(),
            value: "$5".into(),
        });
        let reg = RewardRegistry::open(tmp.path(), &config, &mut StdRng::seed_from_u64(2));
        let after = reg.status();
        assert_eq!(after.len(), 4);
        assert_eq!(&after[..3], &before[..]);
        assert!(!before.iter().any(|r| r.position == after[3].position));
    }

    #[test]
    fn place_stops_when_band_is_full() {
        let band = TileBand { min: 10, max: 11 };
        let mut taken = HashSet::new();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(place(band, &mut taken, &mut rng).is_some());
        assert!(place(band, &mut taken, &mut rng).is_some());
        assert!(place(band, &mut taken, &mut rng).is_none());
    }

    #[test]
    fn claim_is_single_use_and_idempotent_for_the_winner() {
        let tmp = tempdir().unwrap();
        let reg = open(tmp.path(), 4);
        let pos = reg.status()[0].position;
        let now = Utc::now();

        assert!(reg.lookup(pos).is_some());
        assert!(matches!(reg.claim(pos, "alice", now), ClaimOutcome::Claimed(_)));
        assert!(matches!(reg.claim(pos, "alice", now), ClaimOutcome::Claimed(_)));
        match reg.claim(pos, "bob", now) {
            ClaimOutcome::AlreadyClaimed(r) => assert_eq!(r.claimed_by.as_deref(), Some("alice")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(reg.lookup(pos).is_none());
        // Claimed entries remain listed.
        assert_eq!(reg.status().len(), 3);
    }

    #[test]
    fn claim_on_empty_tile_is_no_reward() {
        let tmp = tempdir().unwrap();
        let reg = open(tmp.path(), 5);
        let taken: HashSet<u32> = reg.status().iter().map(|r| r.position).collect();
        let empty = (1..3000).find(|p| !taken.contains(p)).unwrap();
        assert_eq!(reg.claim(empty, "alice", Utc::now()), ClaimOutcome::NoReward);
    }

    #[test]
    fn concurrent_claims_have_exactly_one_winner() {
        let tmp = tempdir().unwrap();
        let reg = Arc::new(open(tmp.path(), 6));
        let pos = reg.status()[1].position;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || reg.claim(pos, &format!("player{}", i), Utc::now()))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| matches!(o, ClaimOutcome::Claimed(_)))
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn claims_are_visible_across_registry_instances() {
        let tmp = tempdir().unwrap();
        let a = open(tmp.path(), 7);
        let b = open(tmp.path(), 7);
        let pos = a.status()[2].position;
        assert!(matches!(a.claim(pos, "alice", Utc::now()), ClaimOutcome::Claimed(_)));
        assert!(b.lookup(pos).is_none());
        assert!(matches!(b.claim(pos, "bob", Utc::now()), ClaimOutcome::AlreadyClaimed(_)));
    }

    #[test]
    fn unreadable_document_never_hands_out_a_prize() {
        let tmp = tempdir().unwrap();
        let pos = open(tmp.path(), 1).status()[0].position;
        let file = tmp.path().join("rewards.json");
        std::fs::write(&file, "{corrupt").unwrap();

        let a = open(tmp.path(), 1);
        assert!(a.status().is_empty());
        assert!(a.lookup(pos).is_none());
        assert_eq!(a.claim(pos, "alice", Utc::now()), ClaimOutcome::Unavailable);

        // Same broken file after a restart: still nothing to win.
        let b = open(tmp.path(), 1);
        assert_eq!(b.claim(pos, "bob", Utc::now()), ClaimOutcome::Unavailable);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "{corrupt");
    }

    #[test]
    fn failed_claim_leaves_the_prize_for_the_next_player() {
        let tmp = tempdir().unwrap();
        let reg = open(tmp.path(), 2);
        let pos = reg.status()[0].position;
        let file = tmp.path().join("rewards.json");
        let good = std::fs::read_to_string(&file).unwrap();

        std::fs::write(&file, "{corrupt").unwrap();
        assert_eq!(reg.claim(pos, "alice", Utc::now()), ClaimOutcome::Unavailable);

        std::fs::write(&file, good).unwrap();
        match reg.claim(pos, "bob", Utc::now()) {
            ClaimOutcome::Claimed(r) => assert_eq!(r.claimed_by.as_deref(), Some("bob")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
