//! # Game Module
//!
//! Everything that decides what a dig does lives here:
//!
//! - [`types`]: player record, effect and reward descriptors
//! - [`tables`]: mineral table and rarity selection
//! - [`engine`]: gates, tile advancement, randomized effects
//! - [`rewards`]: persisted registry of single-claim prizes
//! - [`leaderboard`]: rankings, aggregate stats and winner detection
//! - [`errors`]: policy rejections returned by the service

pub mod engine;
pub mod errors;
pub mod leaderboard;
pub mod rewards;
pub mod tables;
pub mod types;

pub use engine::{NoRewards, ProgressionEngine, RewardLookup};
pub use errors::Rejection;
pub use rewards::RewardRegistry;
pub use types::*;
