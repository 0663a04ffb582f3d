//! # Game Service
//!
//! The one entry point the presentation layer talks to. It owns the engine and both
//! stores, validates incoming identities, and ties an accepted dig to the reward claim
//! and the save that follow it.
//!
//! Every time-dependent call has an `_at` twin taking an explicit clock value and random
//! source; the plain versions use the wall clock and `rand::thread_rng()`.

use crate::config::Config;
use crate::game::leaderboard;
use crate::game::{
    ActionResult, ClaimOutcome, ConsumableKind, GameStats, LeaderboardEntry, Player,
    ProgressionEngine, Rejection, RewardRegistry, ScarceReward, TimeRemaining,
};
use crate::logutil::escape_log;
use crate::storage::backup::BackupMetadata;
use crate::storage::{PlayerStore, PlayersSnapshot, StoreError};
use crate::validation::{sanitize_display_name, validate_player_id};
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info};
use rand::Rng;
use serde::Serialize;

/// Inclusive bounds on a single admin grant.
pub const GRANT_MIN: u64 = 1;
pub const GRANT_MAX: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    pub item: ConsumableKind,
    pub cost: u64,
    pub balance: u64,
    /// Units of `item` held after the purchase.
    pub owned: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantReceipt {
    pub amount: u64,
    pub previous_balance: u64,
    pub balance: u64,
}

pub struct GameService {
    engine: ProgressionEngine,
    players: PlayerStore,
    rewards: RewardRegistry,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn checked_id(player_id: &str) -> Result<String, Rejection> {
    validate_player_id(player_id).map_err(|e| Rejection::InvalidPlayerId(e.to_string()))
}

/// Smallest tier the player holds, if any.
pub fn preferred_consumable(player: &Player) -> Option<ConsumableKind> {
    ConsumableKind::ALL
        .into_iter()
        .find(|kind| player.inventory.count(*kind) > 0)
}

impl GameService {
    /// Open both stores under `config.storage.data_dir`.
    pub fn open(config: &Config) -> Self {
        let data_dir = &config.storage.data_dir;
        let players = PlayerStore::open(data_dir, config);
        let rewards = RewardRegistry::open(data_dir, &config.rewards, &mut rand::thread_rng());
        Self::from_parts(ProgressionEngine::new(config), players, rewards)
    }

    pub fn from_parts(
        engine: ProgressionEngine,
        players: PlayerStore,
        rewards: RewardRegistry,
    ) -> Self {
        Self {
            engine,
            players,
            rewards,
        }
    }

    pub fn engine(&self) -> &ProgressionEngine {
        &self.engine
    }

    pub fn players(&self) -> &PlayerStore {
        &self.players
    }

    pub fn get_or_create_player(
        &self,
        player_id: &str,
        display_name: &str,
    ) -> Result<Player, Rejection> {
        let id = checked_id(player_id)?;
        Ok(self.players.get_or_create(&id, &sanitize_display_name(display_name)))
    }

    /// Existing player only.
    pub fn player(&self, player_id: &str) -> Result<Player, Rejection> {
        let id = checked_id(player_id)?;
        self.players.get(&id).ok_or(Rejection::UnknownPlayer(id))
    }

    pub fn time_remaining(&self, player: &Player) -> TimeRemaining {
        self.engine.time_remaining(player, now_ms())
    }

    pub fn perform_action(
        &self,
        player_id: &str,
        display_name: &str,
        consumable: Option<ConsumableKind>,
    ) -> Result<ActionResult, Rejection> {
        let mut rng = rand::thread_rng();
        self.perform_action_at(player_id, display_name, consumable, now_ms(), &mut rng)
    }

    /// One dig: engine step, then the reward claim, then the save.
    pub fn perform_action_at<R: Rng + ?Sized>(
        &self,
        player_id: &str,
        display_name: &str,
        consumable: Option<ConsumableKind>,
        now: i64,
        rng: &mut R,
    ) -> Result<ActionResult, Rejection> {
        let mut player = self.get_or_create_player(player_id, display_name)?;
        let mut result = self
            .engine
            .perform_action(&mut player, consumable, &self.rewards, now, rng);
        if !result.accepted() {
            debug!(
                "dig from {} not accepted: {:?}",
                escape_log(&player.id),
                result.status
            );
            return Ok(result);
        }

        if let Some(found) = result.scarce_reward.clone() {
            let outcome = self.rewards.claim(found.position, &player.id, to_datetime(now));
            match &outcome {
                ClaimOutcome::Claimed(r) => {
                    result
                        .message
                        .push_str(&format!("\n🏆 You claimed {} ({})!", r.name, r.value));
                }
                ClaimOutcome::AlreadyClaimed(_) => {
                    result
                        .message
                        .push_str("\n😞 Someone else got here first, the prize is gone.");
                }
                ClaimOutcome::Unavailable => {
                    result
                        .message
                        .push_str("\n⚠️ A prize is here but can't be claimed right now.");
                }
                ClaimOutcome::NoReward => {}
            }
            result.claim = Some(outcome);
        }

        self.players.save(&player);
        debug!(
            "dig by {}: tile {} -> {} ({:+} glyphs)",
            escape_log(&player.id),
            result.previous_position,
            result.position,
            result.currency_delta
        );
        if player.at_goal() && result.previous_position != 0 {
            info!("{} reached the goal", escape_log(&player.display_name));
        }
        Ok(result)
    }

    /// Buy one unit of `kind` at the configured price.
    pub fn purchase(
        &self,
        player_id: &str,
        display_name: &str,
        kind: ConsumableKind,
    ) -> Result<PurchaseReceipt, Rejection> {
        let mut player = self.get_or_create_player(player_id, display_name)?;
        let cost = self.engine.consumable(kind).cost;
        if player.currency < cost {
            return Err(Rejection::InsufficientFunds {
                needed: cost,
                available: player.currency,
            });
        }
        player.currency -= cost;
        player.inventory.add(kind, 1);
        self.players.save(&player);
        info!(
            "{} bought a {} for {} glyphs",
            escape_log(&player.id),
            kind,
            cost
        );
        Ok(PurchaseReceipt {
            item: kind,
            cost,
            balance: player.currency,
            owned: player.inventory.count(kind),
        })
    }

    /// Admin grant of `amount` glyphs, bounded to `GRANT_MIN..=GRANT_MAX`.
    pub fn grant_currency(
        &self,
        player_id: &str,
        display_name: &str,
        amount: i64,
    ) -> Result<GrantReceipt, Rejection> {
        if amount < GRANT_MIN as i64 || amount > GRANT_MAX as i64 {
            return Err(Rejection::InvalidAmount {
                amount,
                min: GRANT_MIN,
                max: GRANT_MAX,
            });
        }
        let amount = amount as u64;
        let mut player = self.get_or_create_player(player_id, display_name)?;
        let previous_balance = player.currency;
        player.currency = player.currency.saturating_add(amount);
        self.players.save(&player);
        info!(
            "granted {} glyphs to {} ({} -> {})",
            amount,
            escape_log(&player.id),
            previous_balance,
            player.currency
        );
        Ok(GrantReceipt {
            amount,
            previous_balance,
            balance: player.currency,
        })
    }

    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        leaderboard::leaderboard(&self.players.list_all(), limit, self.engine.start_position())
    }

    pub fn stats(&self) -> GameStats {
        leaderboard::stats(&self.players.list_all(), self.engine.start_position())
    }

    pub fn winner(&self) -> Option<Player> {
        leaderboard::winner(&self.players.list_all()).cloned()
    }

    pub fn reset_player(&self, player_id: &str) -> Result<Player, Rejection> {
        let id = checked_id(player_id)?;
        self.players.reset_one(&id).ok_or(Rejection::UnknownPlayer(id))
    }

    pub fn reset_all_players(&self) -> Result<BackupMetadata, StoreError> {
        self.players.reset_all()
    }

    pub fn rewards_status(&self) -> Vec<ScarceReward> {
        self.rewards.status()
    }

    pub fn export_snapshot(&self) -> PlayersSnapshot {
        self.players.export_snapshot()
    }

    pub fn set_private_channel(&self, player_id: &str, handle: &str) -> Result<(), Rejection> {
        let id = checked_id(player_id)?;
        if self.players.set_private_channel(&id, handle) {
            Ok(())
        } else {
            Err(Rejection::UnknownPlayer(id))
        }
    }

    pub fn backup(&self) -> Result<BackupMetadata, StoreError> {
        self.players.backup()
    }

    pub fn list_backups(&self) -> Result<Vec<BackupMetadata>, StoreError> {
        self.players.list_backups()
    }

    pub fn verify_backup(&self, backup_id: &str) -> Result<bool, StoreError> {
        self.players.verify_backup(backup_id)
    }

    pub fn restore_backup(&self, backup_id: &str) -> Result<usize, StoreError> {
        self.players.restore_backup(backup_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectsConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    const T0: i64 = 1_700_000_000_000;

    fn quiet_service(dir: &std::path::Path) -> GameService {
        let mut config = Config::default();
        config.storage.data_dir = dir.to_string_lossy().into_owned();
        let players = PlayerStore::open(dir, &config);
        let rewards = RewardRegistry::open(dir, &config.rewards, &mut StdRng::seed_from_u64(1));
        let engine = ProgressionEngine::new(&config).with_effects(EffectsConfig::disabled());
        GameService::from_parts(engine, players, rewards)
    }

    #[test]
    fn preferred_consumable_takes_smallest_tier() {
        let mut p = Player::new("1", "a", 3000);
        assert_eq!(preferred_consumable(&p), None);
        p.inventory.add(ConsumableKind::Explosive, 1);
        assert_eq!(preferred_consumable(&p), Some(ConsumableKind::Explosive));
        p.inventory.add(ConsumableKind::Dynamite, 2);
        assert_eq!(preferred_consumable(&p), Some(ConsumableKind::Dynamite));
        p.inventory.add(ConsumableKind::Pickaxe, 1);
        assert_eq!(preferred_consumable(&p), Some(ConsumableKind::Pickaxe));
    }

    #[test]
    fn invalid_ids_are_rejected_before_touching_storage() {
        let tmp = tempdir().unwrap();
        let svc = quiet_service(tmp.path());
        let err = svc.perform_action("../x", "x", None).unwrap_err();
        assert!(matches!(err, Rejection::InvalidPlayerId(_)));
        assert!(svc.players().list_all().is_empty());
    }

    #[test]
    fn grant_bounds() {
        let tmp = tempdir().unwrap();
        let svc = quiet_service(tmp.path());
        for bad in [0, -5, 1_000_001] {
            assert_eq!(
                svc.grant_currency("1", "a", bad),
                Err(Rejection::InvalidAmount {
                    amount: bad,
                    min: 1,
                    max: 1_000_000
                })
            );
        }
        assert_eq!(svc.grant_currency("1", "a", 1_000_000).unwrap().balance, 1_000_000);
    }

    #[test]
    fn gated_dig_is_not_saved() {
        let tmp = tempdir().unwrap();
        let svc = quiet_service(tmp.path());
        let mut rng = StdRng::seed_from_u64(2);
        svc.perform_action_at("1", "a", None, T0, &mut rng).unwrap();
        let before = svc.player("1").unwrap();
        let gated = svc.perform_action_at("1", "a", None, T0 + 1_000, &mut rng).unwrap();
        assert!(!gated.accepted());
        assert_eq!(svc.player("1").unwrap(), before);
    }

    fn park_above(svc: &GameService, target: u32) {
        let mut p = svc.get_or_create_player("1", "alice").unwrap();
        p.position = target + 5;
        p.inventory.add(ConsumableKind::Explosive, 1);
        svc.players().save(&p);
    }

    fn blast(svc: &GameService) -> ActionResult {
        svc.perform_action_at(
            "1",
            "alice",
            Some(ConsumableKind::Explosive),
            T0,
            &mut StdRng::seed_from_u64(3),
        )
        .unwrap()
    }

    #[test]
    fn landing_on_a_reward_claims_it() {
        let tmp = tempdir().unwrap();
        let svc = quiet_service(tmp.path());
        let target = svc.rewards_status()[0].position;

        // Park the player five tiles above the prize with an explosive in hand.
        park_above(&svc, target);

        let r = blast(&svc);
        assert_eq!(r.position, target);
        assert!(matches!(r.claim, Some(ClaimOutcome::Claimed(_))));
        let claimed = svc.rewards_status().into_iter().find(|e| e.position == target).unwrap();
        assert_eq!(claimed.claimed_by.as_deref(), Some("1"));
        assert_eq!(claimed.claimed_at, Some(to_datetime(T0)));
    }

    #[test]
    fn prize_is_not_awarded_while_the_registry_is_unwritable() {
        let tmp = tempdir().unwrap();
        let svc = quiet_service(tmp.path());
        let target = svc.rewards_status()[0].position;
        park_above(&svc, target);

        let file = tmp.path().join("rewards.json");
        let good = std::fs::read_to_string(&file).unwrap();
        std::fs::write(&file, "{corrupt").unwrap();

        let r = blast(&svc);
        assert_eq!(r.position, target);
        assert_eq!(r.claim, Some(ClaimOutcome::Unavailable));
        assert!(r.message.contains("can't be claimed"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "{corrupt");

        std::fs::write(&file, good).unwrap();
        let entry = svc.rewards_status().into_iter().find(|e| e.position == target).unwrap();
        assert!(!entry.is_claimed());
    }

    #[test]
    fn unknown_player_errors() {
        let tmp = tempdir().unwrap();
        let svc = quiet_service(tmp.path());
        assert_eq!(svc.reset_player("9"), Err(Rejection::UnknownPlayer("9".into())));
        assert_eq!(
            svc.set_private_channel("9", "thread"),
            Err(Rejection::UnknownPlayer("9".into()))
        );
        assert_eq!(svc.player("9"), Err(Rejection::UnknownPlayer("9".into())));
    }
}
