//! Test utilities & fixtures.
//! Every helper works inside a caller-owned temp dir so tests never share state.

use glyphdig::config::{Config, EffectsConfig};
use glyphdig::game::{ProgressionEngine, RewardRegistry};
use glyphdig::service::GameService;
use glyphdig::storage::PlayerStore;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

/// A fixed wall clock far enough from zero that fresh players are never on cooldown.
#[allow(dead_code)]
pub const T0: i64 = 1_700_000_000_000;

/// Default configuration with its data directory pointed at `dir`.
pub fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = dir.to_string_lossy().to_string();
    config
}

/// Service over `config` with rewards placed from a fixed seed.
#[allow(dead_code)]
pub fn service_with(config: &Config) -> GameService {
    let dir = Path::new(&config.storage.data_dir);
    let players = PlayerStore::open(dir, config);
    let rewards = RewardRegistry::open(dir, &config.rewards, &mut StdRng::seed_from_u64(42));
    GameService::from_parts(ProgressionEngine::new(config), players, rewards)
}

/// Service with every random effect switched off.
#[allow(dead_code)]
pub fn quiet_service(dir: &Path) -> GameService {
    let mut config = config_in(dir);
    config.effects = EffectsConfig::disabled();
    service_with(&config)
}
