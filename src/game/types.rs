//! Core data model shared by the engine, the stores and the service facade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Consumable tiers sold at the market. Each tier advances a fixed number of tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumableKind {
    Pickaxe,
    Dynamite,
    Explosive,
}

impl ConsumableKind {
    /// Smallest tier first. This is also the order used when auto-selecting an item to dig with.
    pub const ALL: [ConsumableKind; 3] = [
        ConsumableKind::Pickaxe,
        ConsumableKind::Dynamite,
        ConsumableKind::Explosive,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ConsumableKind::Pickaxe => "Pickaxe",
            ConsumableKind::Dynamite => "Dynamite",
            ConsumableKind::Explosive => "Explosive",
        }
    }

    /// The largest tier, handed out by the consumable bonus.
    pub fn largest() -> ConsumableKind {
        ConsumableKind::Explosive
    }
}

impl fmt::Display for ConsumableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ConsumableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pickaxe" | "pickaxes" => Ok(ConsumableKind::Pickaxe),
            "dynamite" | "dynamites" => Ok(ConsumableKind::Dynamite),
            "explosive" | "explosives" => Ok(ConsumableKind::Explosive),
            other => Err(format!("unknown consumable '{}'", other)),
        }
    }
}

/// Per-player consumable counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub pickaxes: u32,
    #[serde(default)]
    pub dynamites: u32,
    #[serde(default)]
    pub explosives: u32,
}

impl Inventory {
    pub fn count(&self, kind: ConsumableKind) -> u32 {
        match kind {
            ConsumableKind::Pickaxe => self.pickaxes,
            ConsumableKind::Dynamite => self.dynamites,
            ConsumableKind::Explosive => self.explosives,
        }
    }

    fn slot_mut(&mut self, kind: ConsumableKind) -> &mut u32 {
        match kind {
            ConsumableKind::Pickaxe => &mut self.pickaxes,
            ConsumableKind::Dynamite => &mut self.dynamites,
            ConsumableKind::Explosive => &mut self.explosives,
        }
    }

    pub fn add(&mut self, kind: ConsumableKind, count: u32) {
        let slot = self.slot_mut(kind);
        *slot = slot.saturating_add(count);
    }

    /// Remove one unit. Returns false (and changes nothing) when none are held.
    pub fn take_one(&mut self, kind: ConsumableKind) -> bool {
        let slot = self.slot_mut(kind);
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }

    pub fn is_empty(&self) -> bool {
        self.pickaxes == 0 && self.dynamites == 0 && self.explosives == 0
    }
}

/// Persistent per-player state, keyed by the external user id.
///
/// Timestamps are epoch milliseconds. Fields added after the first release carry
/// `#[serde(default)]` so older documents keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub display_name: String,
    pub position: u32,
    pub currency: u64,
    #[serde(default)]
    pub inventory: Inventory,
    #[serde(default)]
    pub last_action_at: i64,
    #[serde(default)]
    pub timeout_until: i64,
    #[serde(default)]
    pub total_actions: u64,
    #[serde(default)]
    pub tile_progress: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_channel_ref: Option<String>,
}

impl Player {
    pub fn new(id: &str, display_name: &str, start_position: u32) -> Self {
        Player {
            id: id.to_string(),
            display_name: display_name.to_string(),
            position: start_position,
            currency: 0,
            inventory: Inventory::default(),
            last_action_at: 0,
            timeout_until: 0,
            total_actions: 0,
            tile_progress: 0,
            private_channel_ref: None,
        }
    }

    /// Tiles travelled from the start.
    pub fn depth(&self, start_position: u32) -> u32 {
        start_position.saturating_sub(self.position)
    }

    pub fn at_goal(&self) -> bool {
        self.position == 0
    }

    /// Back to starting values. Identity, display name and channel handle survive.
    pub fn reset_progress(&mut self, start_position: u32) {
        self.position = start_position;
        self.currency = 0;
        self.inventory = Inventory::default();
        self.last_action_at = 0;
        self.timeout_until = 0;
        self.total_actions = 0;
        self.tile_progress = 0;
    }

    /// Move to `position`, clearing partial tile progress when the tile changes.
    pub fn move_to(&mut self, position: u32) {
        if position != self.position {
            self.position = position;
            self.tile_progress = 0;
        }
    }

    /// Force the record back inside its invariants. Returns true when anything changed.
    pub fn clamp_invariants(
        &mut self,
        start_position: u32,
        digs_required: impl Fn(u32) -> u32,
    ) -> bool {
        let mut changed = false;
        if self.position > start_position {
            self.position = start_position;
            self.tile_progress = 0;
            changed = true;
        }
        if self.tile_progress >= digs_required(self.position) {
            self.tile_progress = 0;
            changed = true;
        }
        changed
    }
}

/// Rarity buckets, ordered from most to least common.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        };
        f.write_str(s)
    }
}

/// Static reward tier entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mineral {
    pub name: &'static str,
    pub reward: u64,
    pub rarity: Rarity,
}

/// Setbacks rolled after an accepted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Penalty {
    /// Currency actually removed (already capped at the available balance).
    LoseCurrency { amount: u64 },
    /// Tiles actually pushed back (already capped at the start position).
    PushBack { tiles: u32 },
    Timeout { duration_ms: u64 },
}

/// Windfalls rolled after an accepted action, independently of penalties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Bonus {
    Consumables { item: ConsumableKind, count: u32 },
    /// Tiles actually advanced (already capped at the goal).
    Advance { tiles: u32 },
    Currency { amount: u64 },
}

/// One of the globally scarce, single-claim prizes bound to a tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScarceReward {
    pub id: String,
    pub name: String,
    pub description: String,
    pub value: String,
    pub position: u32,
    #[serde(default)]
    pub claimed_by: Option<String>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl ScarceReward {
    pub fn is_claimed(&self) -> bool {
        self.claimed_by.is_some()
    }
}

/// Which rate-limit gate stopped an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Timeout,
    Cooldown,
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::Timeout => f.write_str("timeout"),
            Gate::Cooldown => f.write_str("cooldown"),
        }
    }
}

/// Answer to "may this player act right now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub allowed: bool,
    pub reason: Option<Gate>,
    pub remaining_ms: u64,
}

/// Remaining wait on each gate; zero when the gate is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeRemaining {
    pub cooldown_ms: u64,
    pub timeout_ms: u64,
}

impl TimeRemaining {
    pub fn is_clear(&self) -> bool {
        self.cooldown_ms == 0 && self.timeout_ms == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Accepted,
    Gated { gate: Gate, remaining_ms: u64 },
    GoalReached,
}

/// Result of a claim attempt against the reward registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reward", rename_all = "snake_case")]
pub enum ClaimOutcome {
    Claimed(ScarceReward),
    AlreadyClaimed(ScarceReward),
    NoReward,
    /// The registry document could not be read or written; nothing was handed out.
    Unavailable,
}

/// Everything the presentation layer needs to render one action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub status: ActionStatus,
    pub currency_delta: i64,
    pub previous_position: u32,
    pub position: u32,
    pub tile_progress: u32,
    pub digs_required: u32,
    pub consumable_used: Option<ConsumableKind>,
    pub minerals: Vec<Mineral>,
    pub penalty: Option<Penalty>,
    pub bonus: Option<Bonus>,
    /// Unclaimed prize found at the resulting tile, if any.
    pub scarce_reward: Option<ScarceReward>,
    /// Filled in by the service once the registry has ruled on the claim.
    pub claim: Option<ClaimOutcome>,
    pub message: String,
}

impl ActionResult {
    pub fn accepted(&self) -> bool {
        self.status == ActionStatus::Accepted
    }

    /// Sum of mineral payouts before effects.
    pub fn mineral_total(&self) -> u64 {
        self.minerals.iter().map(|m| m.reward).sum()
    }
}

/// Row in the ranking view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub player_id: String,
    pub display_name: String,
    pub total_actions: u64,
    pub position: u32,
    pub depth: u32,
    pub currency: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GameStats {
    pub total_players: usize,
    pub total_actions: u64,
    /// Mean depth, rounded to the nearest tile.
    pub average_depth: u32,
    pub players_at_goal: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_one_never_goes_negative() {
        let mut inv = Inventory::default();
        assert!(!inv.take_one(ConsumableKind::Dynamite));
        inv.add(ConsumableKind::Dynamite, 1);
        assert!(inv.take_one(ConsumableKind::Dynamite));
        assert_eq!(inv.count(ConsumableKind::Dynamite), 0);
        assert!(!inv.take_one(ConsumableKind::Dynamite));
    }

    #[test]
    fn move_to_resets_progress_only_on_change() {
        let mut p = Player::new("u1", "alice", 3000);
        p.tile_progress = 2;
        p.move_to(3000);
        assert_eq!(p.tile_progress, 2);
        p.move_to(2999);
        assert_eq!(p.tile_progress, 0);
    }

    #[test]
    fn clamp_pulls_position_and_progress_back() {
        let mut p = Player::new("u1", "alice", 3000);
        p.position = 5000;
        p.tile_progress = 9;
        assert!(p.clamp_invariants(3000, |_| 3));
        assert_eq!(p.position, 3000);
        assert_eq!(p.tile_progress, 0);
        assert!(!p.clamp_invariants(3000, |_| 3));
    }

    #[test]
    fn legacy_record_defaults_missing_fields() {
        let json = r#"{"id":"42","display_name":"bob","position":1200,"currency":75}"#;
        let p: Player = serde_json::from_str(json).unwrap();
        assert_eq!(p.tile_progress, 0);
        assert!(p.inventory.is_empty());
        assert!(p.private_channel_ref.is_none());
    }

    #[test]
    fn consumable_names_parse() {
        assert_eq!("Dynamite".parse::<ConsumableKind>(), Ok(ConsumableKind::Dynamite));
        assert_eq!("explosives".parse::<ConsumableKind>(), Ok(ConsumableKind::Explosive));
        assert!("shovel".parse::<ConsumableKind>().is_err());
    }
}
