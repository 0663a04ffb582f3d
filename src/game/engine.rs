//! Progression engine: rate-limit gates, tile advancement and randomized effects.
//!
//! The engine never touches disk or shared state. Callers hand it the player record,
//! the current time (epoch ms) and a random source, and get back the mutated record
//! plus an [`ActionResult`] describing what happened. Scarce rewards are only looked
//! up here; claiming them is the registry's job.

use super::tables::roll_mineral;
use super::types::{
    ActionResult, ActionStatus, Bonus, ConsumableKind, Eligibility, Gate, Penalty, Player,
    ScarceReward, TimeRemaining,
};
use crate::config::{
    Config, ConsumableSpec, ConsumablesConfig, EffectsConfig, GameConfig, ProgressionConfig,
};
use rand::Rng;

/// Read-only view of the scarce reward registry used during an action.
pub trait RewardLookup {
    /// Unclaimed reward bound to `position`, if any.
    fn lookup(&self, position: u32) -> Option<ScarceReward>;
}

/// Lookup that never finds anything.
pub struct NoRewards;

impl RewardLookup for NoRewards {
    fn lookup(&self, _position: u32) -> Option<ScarceReward> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct ProgressionEngine {
    game: GameConfig,
    effects: EffectsConfig,
    consumables: ConsumablesConfig,
    progression: ProgressionConfig,
}

fn ceil_secs(ms: u64) -> u64 {
    ms.div_ceil(1000)
}

fn pick_u64<R: Rng + ?Sized>(rng: &mut R, a: u64, b: u64) -> u64 {
    rng.gen_range(a.min(b)..=a.max(b))
}

fn pick_u32<R: Rng + ?Sized>(rng: &mut R, a: u32, b: u32) -> u32 {
    rng.gen_range(a.min(b)..=a.max(b))
}

impl ProgressionEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            game: config.game.clone(),
            effects: config.effects.clone(),
            consumables: config.consumables.clone(),
            progression: config.progression.clone(),
        }
    }

    /// Replace the effect settings, e.g. to switch randomized effects off.
    pub fn with_effects(mut self, effects: EffectsConfig) -> Self {
        self.effects = effects;
        self
    }

    pub fn start_position(&self) -> u32 {
        self.game.start_position
    }

    pub fn digs_required(&self, position: u32) -> u32 {
        self.progression.digs_required(position)
    }

    pub fn consumable(&self, kind: ConsumableKind) -> ConsumableSpec {
        self.consumables.spec(kind)
    }

    /// Remaining wait on both gates at `now`.
    pub fn time_remaining(&self, player: &Player, now: i64) -> TimeRemaining {
        let since_last = now.saturating_sub(player.last_action_at);
        let cooldown = (self.game.cooldown_ms as i64).saturating_sub(since_last).max(0);
        let timeout = player.timeout_until.saturating_sub(now).max(0);
        TimeRemaining {
            cooldown_ms: cooldown as u64,
            timeout_ms: timeout as u64,
        }
    }

    /// Timeout is checked before cooldown; both must be clear.
    pub fn can_act(&self, player: &Player, now: i64) -> Eligibility {
        let remaining = self.time_remaining(player, now);
        if remaining.timeout_ms > 0 {
            return Eligibility {
                allowed: false,
                reason: Some(Gate::Timeout),
                remaining_ms: remaining.timeout_ms,
            };
        }
        if remaining.cooldown_ms > 0 {
            return Eligibility {
                allowed: false,
                reason: Some(Gate::Cooldown),
                remaining_ms: remaining.cooldown_ms,
            };
        }
        Eligibility {
            allowed: true,
            reason: None,
            remaining_ms: 0,
        }
    }

    /// Run one dig for `player`.
    ///
    /// Contract:
    /// - Gated or finished players are returned untouched with a non-accepted status
    /// - `consumable` is used only when the player holds at least one; otherwise the dig is manual
    /// - Accepted actions always set `last_action_at = now` and bump `total_actions`
    /// - Currency never drops below zero and position stays within `[0, start_position]`
    pub fn perform_action<R: Rng + ?Sized>(
        &self,
        player: &mut Player,
        consumable: Option<ConsumableKind>,
        rewards: &dyn RewardLookup,
        now: i64,
        rng: &mut R,
    ) -> ActionResult {
        let eligibility = self.can_act(player, now);
        if let Some(gate) = eligibility.reason {
            let secs = ceil_secs(eligibility.remaining_ms);
            let message = match gate {
                Gate::Timeout => format!("⏰ You're timed out! Wait {}s", secs),
                Gate::Cooldown => format!("⏱️ Cooldown active! Wait {}s", secs),
            };
            return self.not_accepted(
                player,
                ActionStatus::Gated {
                    gate,
                    remaining_ms: eligibility.remaining_ms,
                },
                message,
            );
        }
        if player.at_goal() {
            return self.not_accepted(
                player,
                ActionStatus::GoalReached,
                "🎉 You've already reached the deepest point!".to_string(),
            );
        }

        let start = self.start_position();
        let previous_position = player.position;
        let mut lines = Vec::new();
        let mut minerals = Vec::new();

        let used = consumable.filter(|kind| player.inventory.count(*kind) > 0);
        if let (Some(kind), None) = (consumable, used) {
            lines.push(format!("No {} left, digging by hand.", kind.label().to_lowercase()));
        }

        match used {
            Some(kind) => {
                player.inventory.take_one(kind);
                let advance = self.consumables.spec(kind).advance.min(player.position);
                let target = player.position - advance;
                let thresholds = &self.progression.rarity_thresholds;
                for tile in (target..player.position).rev() {
                    minerals.push(roll_mineral(rng, tile, start, thresholds));
                }
                // Partial progress on the old tile carries over untouched.
                player.position = target;
                let earned: u64 = minerals.iter().map(|m| m.reward).sum();
                let names: Vec<&str> = minerals.iter().map(|m| m.name).collect();
                lines.push(format!(
                    "💥 {} used! Cleared {} tile(s) to tile {} and found {} (+{} glyphs)",
                    kind,
                    advance,
                    target,
                    names.join(", "),
                    earned
                ));
            }
            None => {
                let required = self.digs_required(player.position);
                player.tile_progress = player.tile_progress.saturating_add(1);
                if player.tile_progress >= required {
                    let next = player.position - 1;
                    player.move_to(next);
                    let mineral =
                        roll_mineral(rng, next, start, &self.progression.rarity_thresholds);
                    lines.push(format!(
                        "⛏️ Tile cleared! Moved to tile {} and found {} (+{} glyphs)",
                        next, mineral.name, mineral.reward
                    ));
                    minerals.push(mineral);
                } else {
                    lines.push(format!(
                        "⛏️ Digging... ({}/{}) keep going to clear this tile",
                        player.tile_progress, required
                    ));
                }
            }
        }

        let earned: u64 = minerals.iter().map(|m| m.reward).sum();
        let mut gained = earned;
        let mut lost = 0u64;

        let mut penalty = None;
        if self.effects.penalty_band.contains(previous_position)
            && rng.gen::<f64>() < self.effects.penalty_chance
        {
            let p = self.roll_penalty(player, earned, now, rng);
            if let Penalty::LoseCurrency { amount } = p {
                lost = amount;
            }
            lines.push(describe_penalty(&p));
            penalty = Some(p);
        }

        let mut bonus = None;
        if rng.gen::<f64>() < self.effects.bonus_chance {
            let b = self.roll_bonus(player, rng);
            if let Bonus::Currency { amount } = b {
                gained = gained.saturating_add(amount);
            }
            lines.push(describe_bonus(&b));
            bonus = Some(b);
        }

        player.currency = player.currency.saturating_add(gained).saturating_sub(lost);
        player.last_action_at = now;
        player.total_actions = player.total_actions.saturating_add(1);

        let scarce_reward = if player.position != previous_position {
            rewards.lookup(player.position)
        } else {
            None
        };
        if let Some(reward) = &scarce_reward {
            lines.push(format!("🎁 Something glints in the rock: {}!", reward.name));
        }
        if player.at_goal() {
            lines.push("🎉 You reached the deepest point!".to_string());
        }

        ActionResult {
            status: ActionStatus::Accepted,
            currency_delta: gained as i64 - lost as i64,
            previous_position,
            position: player.position,
            tile_progress: player.tile_progress,
            digs_required: self.digs_required(player.position),
            consumable_used: used,
            minerals,
            penalty,
            bonus,
            scarce_reward,
            claim: None,
            message: lines.join("\n"),
        }
    }

    fn not_accepted(&self, player: &Player, status: ActionStatus, message: String) -> ActionResult {
        ActionResult {
            status,
            currency_delta: 0,
            previous_position: player.position,
            position: player.position,
            tile_progress: player.tile_progress,
            digs_required: self.digs_required(player.position),
            consumable_used: None,
            minerals: Vec::new(),
            penalty: None,
            bonus: None,
            scarce_reward: None,
            claim: None,
            message,
        }
    }

    /// `earned` is this action's mineral income, which a currency loss may eat into.
    fn roll_penalty<R: Rng + ?Sized>(
        &self,
        player: &mut Player,
        earned: u64,
        now: i64,
        rng: &mut R,
    ) -> Penalty {
        let fx = &self.effects;
        match rng.gen_range(0..3) {
            0 => {
                let rolled = pick_u64(rng, fx.loss_min, fx.loss_max);
                let available = player.currency.saturating_add(earned);
                Penalty::LoseCurrency {
                    amount: rolled.min(available),
                }
            }
            1 => {
                let rolled = pick_u32(rng, fx.pushback_min, fx.pushback_max);
                let target = player.position.saturating_add(rolled).min(self.start_position());
                let tiles = target - player.position;
                player.move_to(target);
                Penalty::PushBack { tiles }
            }
            _ => {
                player.timeout_until = now.saturating_add(self.game.timeout_ms as i64);
                Penalty::Timeout {
                    duration_ms: self.game.timeout_ms,
                }
            }
        }
    }

    fn roll_bonus<R: Rng + ?Sized>(&self, player: &mut Player, rng: &mut R) -> Bonus {
        let fx = &self.effects;
        match rng.gen_range(0..3) {
            0 => {
                let item = ConsumableKind::largest();
                player.inventory.add(item, fx.bonus_consumables);
                Bonus::Consumables {
                    item,
                    count: fx.bonus_consumables,
                }
            }
            1 => {
                let target = player.position.saturating_sub(fx.bonus_advance);
                let tiles = player.position - target;
                player.move_to(target);
                Bonus::Advance { tiles }
            }
            _ => Bonus::Currency {
                amount: fx.bonus_currency,
            },
        }
    }
}

fn describe_penalty(p: &Penalty) -> String {
    match p {
        Penalty::LoseCurrency { amount } => format!("💥 ZONK! Lost {} glyphs!", amount),
        Penalty::PushBack { tiles } => format!("💥 ZONK! Pushed back {} tile(s)!", tiles),
        Penalty::Timeout { duration_ms } => {
            format!("💥 ZONK! Timed out for {} seconds!", ceil_secs(*duration_ms))
        }
    }
}

fn describe_bonus(b: &Bonus) -> String {
    match b {
        Bonus::Consumables { item, count } => format!("🍀 Lucky! Found {} {}(s)!", count, item),
        Bonus::Advance { tiles } => {
            format!("🍀 Lucky! A cave-in carried you {} tile(s) deeper!", tiles)
        }
        Bonus::Currency { amount } => format!("🍀 Lucky! Found a stash of {} glyphs!", amount),
    }
}
