//! # Configuration Management Module
//!
//! Every tunable the game depends on lives here: track length, rate limits, effect
//! probabilities and magnitudes, market prices, dig bands, rarity thresholds and the
//! scarce reward catalog. Nothing in the engine hardcodes a per-deployment value.
//!
//! ## Configuration Structure
//!
//! - [`GameConfig`] - start position, cooldown and timeout durations
//! - [`EffectsConfig`] - penalty/bonus probabilities and magnitudes
//! - [`ConsumablesConfig`] - market cost and tile advance of each consumable tier
//! - [`ProgressionConfig`] - digs required per depth band and rarity thresholds
//! - [`RewardsConfig`] - scarce reward band and catalog
//! - [`StorageConfig`] - data directory for the persisted documents
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use glyphdig::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     config.validate()?;
//!     println!("Start tile: {}", config.game.start_position);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [game]
//! start_position = 3000
//! cooldown_ms = 30000
//! timeout_ms = 30000
//!
//! [effects]
//! penalty_chance = 0.10
//! bonus_chance = 0.05
//!
//! [storage]
//! data_dir = "./data"
//! ```
//!
//! Sections other than `[game]`, `[storage]` and `[logging]` may be omitted entirely and
//! fall back to their defaults.

use crate::game::types::{ConsumableKind, Rarity};
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub game: GameConfig,
    #[serde(default)]
    pub effects: EffectsConfig,
    #[serde(default)]
    pub consumables: ConsumablesConfig,
    #[serde(default)]
    pub progression: ProgressionConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Tile every new player starts on. The goal is tile 0.
    pub start_position: u32,
    /// Minimum gap between two accepted actions of the same player (ms).
    pub cooldown_ms: u64,
    /// Length of the timeout penalty (ms).
    pub timeout_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            start_position: 3000,
            cooldown_ms: 30_000,
            timeout_ms: 30_000,
        }
    }
}

/// Inclusive tile range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileBand {
    pub min: u32,
    pub max: u32,
}

impl TileBand {
    pub fn contains(&self, position: u32) -> bool {
        position >= self.min && position <= self.max
    }

    pub fn width(&self) -> u32 {
        self.max.saturating_sub(self.min).saturating_add(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectsConfig {
    /// Probability in `[0, 1]` that a penalty fires on an accepted action.
    pub penalty_chance: f64,
    pub loss_min: u64,
    pub loss_max: u64,
    pub pushback_min: u32,
    pub pushback_max: u32,
    /// Probability in `[0, 1]` that a bonus fires. Rolled independently of penalties.
    pub bonus_chance: f64,
    /// How many of the largest consumable the item bonus grants.
    pub bonus_consumables: u32,
    pub bonus_advance: u32,
    pub bonus_currency: u64,
    /// Penalties only fire while the pre-action position lies inside this band.
    pub penalty_band: TileBand,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            penalty_chance: 0.10,
            loss_min: 50,
            loss_max: 200,
            pushback_min: 1,
            pushback_max: 5,
            bonus_chance: 0.05,
            bonus_consumables: 2,
            bonus_advance: 10,
            bonus_currency: 1000,
            penalty_band: TileBand { min: 50, max: 2500 },
        }
    }
}

impl EffectsConfig {
    /// Zero chance for both effect channels.
    pub fn disabled() -> Self {
        Self {
            penalty_chance: 0.0,
            bonus_chance: 0.0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumableSpec {
    /// Market price in currency.
    pub cost: u64,
    /// Tiles advanced per use; one mineral roll per tile.
    pub advance: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumablesConfig {
    pub pickaxe: ConsumableSpec,
    pub dynamite: ConsumableSpec,
    pub explosive: ConsumableSpec,
}

impl Default for ConsumablesConfig {
    fn default() -> Self {
        Self {
            pickaxe: ConsumableSpec { cost: 500, advance: 1 },
            dynamite: ConsumableSpec { cost: 1000, advance: 3 },
            explosive: ConsumableSpec { cost: 2000, advance: 5 },
        }
    }
}

impl ConsumablesConfig {
    pub fn spec(&self, kind: ConsumableKind) -> ConsumableSpec {
        match kind {
            ConsumableKind::Pickaxe => self.pickaxe,
            ConsumableKind::Dynamite => self.dynamite,
            ConsumableKind::Explosive => self.explosive,
        }
    }
}

/// Tiles strictly above `above` need `digs` manual actions each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigBand {
    pub above: u32,
    pub digs: u32,
}

/// `rarity` is selected when the depth factor exceeds `min_depth_factor` and the
/// uniform draw is below `max_roll`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RarityThreshold {
    pub rarity: Rarity,
    pub min_depth_factor: f64,
    pub max_roll: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionConfig {
    /// Requirement for tiles below the last band.
    pub max_digs: u32,
    /// Ordered shallow to deep (descending `above`).
    pub dig_bands: Vec<DigBand>,
    /// Checked in order, rarest first; the first match wins, common is the fallback.
    pub rarity_thresholds: Vec<RarityThreshold>,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            max_digs: 6,
            dig_bands: vec![
                DigBand {
                    above: 2700,
                    digs: 1,
                },
                DigBand {
                    above: 2100,
                    digs: 2,
                },
                DigBand {
                    above: 1500,
                    digs: 3,
                },
                DigBand {
                    above: 900,
                    digs: 4,
                },
                DigBand {
                    above: 300,
                    digs: 5,
                },
            ],
            rarity_thresholds: vec![
                RarityThreshold {
                    rarity: Rarity::Legendary,
                    min_depth_factor: 0.8,
                    max_roll: 0.05,
                },
                RarityThreshold {
                    rarity: Rarity::Epic,
                    min_depth_factor: 0.6,
                    max_roll: 0.15,
                },
                RarityThreshold {
                    rarity: Rarity::Rare,
                    min_depth_factor: 0.4,
                    max_roll: 0.35,
                },
                RarityThreshold {
                    rarity: Rarity::Uncommon,
                    min_depth_factor: 0.2,
                    max_roll: 0.65,
                },
            ],
        }
    }
}

impl ProgressionConfig {
    /// Manual actions needed to clear the tile at `position`.
    pub fn digs_required(&self, position: u32) -> u32 {
        self.dig_bands
            .iter()
            .find(|band| position > band.above)
            .map(|band| band.digs)
            .unwrap_or(self.max_digs)
            .max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Positions are drawn uniformly from this band when the registry is first created.
    pub band: TileBand,
    pub catalog: Vec<RewardSpec>,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            band: TileBand { min: 100, max: 2800 },
            catalog: vec![
                RewardSpec {
                    id: "nitro".to_string(),
                    name: "Discord Nitro".to_string(),
                    description: "One month of Discord Nitro".to_string(),
                    value: "1 month Nitro".to_string(),
                },
                RewardSpec {
                    id: "cash_10".to_string(),
                    name: "$10 Cash".to_string(),
                    description: "Ten dollars paid out by the organizers".to_string(),
                    value: "$10".to_string(),
                },
                RewardSpec {
                    id: "nitro_classic".to_string(),
                    name: "Discord Nitro Classic".to_string(),
                    description: "One month of Discord Nitro Classic".to_string(),
                    value: "1 month Nitro Classic".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

fn check_chance(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("{} must be within [0, 1], got {}", name, value);
    }
    Ok(())
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        Self::from_toml_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject configurations that would break engine invariants.
    pub fn validate(&self) -> Result<()> {
        let start = self.game.start_position;
        if start == 0 {
            bail!("game.start_position must be greater than 0");
        }

        let fx = &self.effects;
        check_chance("effects.penalty_chance", fx.penalty_chance)?;
        check_chance("effects.bonus_chance", fx.bonus_chance)?;
        if fx.loss_min > fx.loss_max {
            bail!("effects.loss_min ({}) exceeds loss_max ({})", fx.loss_min, fx.loss_max);
        }
        if fx.pushback_min > fx.pushback_max {
            bail!(
                "effects.pushback_min ({}) exceeds pushback_max ({})",
                fx.pushback_min,
                fx.pushback_max
            );
        }
        if fx.penalty_band.min > fx.penalty_band.max {
            bail!("effects.penalty_band is empty");
        }

        for kind in ConsumableKind::ALL {
            if self.consumables.spec(kind).advance == 0 {
                bail!("consumables.{} must advance at least one tile", kind.label().to_lowercase());
            }
        }

        let prog = &self.progression;
        if prog.max_digs == 0 {
            bail!("progression.max_digs must be at least 1");
        }
        let mut prev: Option<DigBand> = None;
        for band in &prog.dig_bands {
            if band.digs == 0 {
                bail!("progression.dig_bands entries need at least 1 dig");
            }
            if let Some(p) = prev {
                if band.above >= p.above {
                    bail!("progression.dig_bands must be ordered by descending 'above'");
                }
                if band.digs < p.digs {
                    bail!("progression.dig_bands must not get easier with depth");
                }
            }
            prev = Some(*band);
        }
        if let Some(last) = prev {
            if prog.max_digs < last.digs {
                bail!("progression.max_digs must be at least the deepest band's digs");
            }
        }
        let mut prev_rarity: Option<Rarity> = None;
        for t in &prog.rarity_thresholds {
            check_chance("progression.rarity_thresholds.max_roll", t.max_roll)?;
            if t.rarity == Rarity::Common {
                bail!("progression.rarity_thresholds must not list the common fallback");
            }
            if let Some(p) = prev_rarity {
                if t.rarity >= p {
                    bail!("progression.rarity_thresholds must be ordered rarest first");
                }
            }
            prev_rarity = Some(t.rarity);
        }

        let rewards = &self.rewards;
        let band = rewards.band;
        if band.min == 0 || band.max > start || band.min > band.max {
            bail!("rewards.band must lie within [1, {}]", start);
        }
        if (rewards.catalog.len() as u64) > band.width() as u64 {
            bail!("rewards.band is too narrow for {} rewards", rewards.catalog.len());
        }
        let mut ids = HashSet::new();
        for spec in &rewards.catalog {
            if spec.id.trim().is_empty() {
                bail!("rewards.catalog entries need a non-empty id");
            }
            if !ids.insert(spec.id.as_str()) {
                bail!("duplicate reward id '{}'", spec.id);
            }
        }

        if self.storage.data_dir.trim().is_empty() {
            bail!("storage.data_dir must not be empty");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            game: GameConfig::default(),
            effects: EffectsConfig::default(),
            consumables: ConsumablesConfig::default(),
            progression: ProgressionConfig::default(),
            rewards: RewardsConfig::default(),
            storage: StorageConfig {
                data_dir: "./data".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("glyphdig.log".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn digs_required_steps_with_depth() {
        let prog = ProgressionConfig::default();
        assert_eq!(prog.digs_required(3000), 1);
        assert_eq!(prog.digs_required(2701), 1);
        assert_eq!(prog.digs_required(2700), 2);
        assert_eq!(prog.digs_required(1501), 3);
        assert_eq!(prog.digs_required(301), 5);
        assert_eq!(prog.digs_required(300), 6);
        assert_eq!(prog.digs_required(0), 6);
    }

    #[test]
    fn digs_required_never_increases_toward_start() {
        let prog = ProgressionConfig::default();
        let mut last = u32::MAX;
        for pos in 0..=3000u32 {
            let d = prog.digs_required(pos);
            assert!(d <= last, "digs went up at position {}", pos);
            last = d;
        }
    }

    #[test]
    fn rejects_out_of_range_chance() {
        let mut cfg = Config::default();
        cfg.effects.penalty_chance = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_reward_band_beyond_start() {
        let mut cfg = Config::default();
        cfg.rewards.band = TileBand { min: 10, max: 4000 };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unordered_rarity_thresholds() {
        let mut cfg = Config::default();
        cfg.progression.rarity_thresholds.reverse();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_reward_ids() {
        let mut cfg = Config::default();
        let first = cfg.rewards.catalog[0].clone();
        cfg.rewards.catalog.push(first);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn minimal_toml_fills_optional_sections() {
        let toml = r#"
            [game]
            start_position = 2000
            cooldown_ms = 1000
            timeout_ms = 5000

            [storage]
            data_dir = "/tmp/glyphdig"

            [logging]
            level = "debug"
        "#;
        let cfg = Config::from_toml_str(toml).unwrap();
        assert_eq!(cfg.game.start_position, 2000);
        assert_eq!(cfg.effects.penalty_chance, EffectsConfig::default().penalty_chance);
        assert_eq!(cfg.rewards.catalog.len(), 3);
        assert!(cfg.logging.file.is_none());
    }

    #[test]
    fn default_round_trips_through_toml() {
        let cfg = Config::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back = Config::from_toml_str(&text).unwrap();
        assert_eq!(back.game.start_position, cfg.game.start_position);
        assert_eq!(back.progression.dig_bands, cfg.progression.dig_bands);
        assert_eq!(back.rewards.catalog, cfg.rewards.catalog);
    }

    #[tokio::test]
    async fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path_str = path.to_str().unwrap();
        Config::create_default(path_str).await.unwrap();
        let cfg = Config::load(path_str).await.unwrap();
        assert_eq!(cfg.game.cooldown_ms, 30_000);
        assert!(Config::load("/definitely/not/here.toml").await.is_err());
    }
}
