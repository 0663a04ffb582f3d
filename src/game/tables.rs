//! Static mineral table and the depth-weighted rarity roll.

use super::types::{Mineral, Rarity};
use crate::config::RarityThreshold;
use rand::Rng;

const fn mineral(name: &'static str, reward: u64, rarity: Rarity) -> Mineral {
    Mineral {
        name,
        reward,
        rarity,
    }
}

pub const MINERALS: [Mineral; 8] = [
    mineral("Coal", 10, Rarity::Common),
    mineral("Iron", 20, Rarity::Common),
    mineral("Copper", 30, Rarity::Uncommon),
    mineral("Silver", 40, Rarity::Uncommon),
    mineral("Gold", 50, Rarity::Rare),
    mineral("Platinum", 100, Rarity::Rare),
    mineral("Diamond", 200, Rarity::Epic),
    mineral("Mythril", 500, Rarity::Legendary),
];

/// Fraction of the track already travelled at `tile`, in `[0, 1]`.
pub fn depth_factor(tile: u32, start_position: u32) -> f64 {
    if start_position == 0 {
        return 0.0;
    }
    let travelled = start_position.saturating_sub(tile) as f64;
    (travelled / start_position as f64).clamp(0.0, 1.0)
}

/// Pick a rarity for one uniform draw `roll` at the given depth factor.
pub fn select_rarity(depth_factor: f64, roll: f64, thresholds: &[RarityThreshold]) -> Rarity {
    thresholds
        .iter()
        .find(|t| depth_factor > t.min_depth_factor && roll < t.max_roll)
        .map(|t| t.rarity)
        .unwrap_or(Rarity::Common)
}

pub fn minerals_of(rarity: Rarity) -> impl Iterator<Item = &'static Mineral> {
    MINERALS.iter().filter(move |m| m.rarity == rarity)
}

/// Roll one mineral for `tile`: weighted rarity first, then uniform within the bucket.
pub fn roll_mineral<R: Rng + ?Sized>(
    rng: &mut R,
    tile: u32,
    start_position: u32,
    thresholds: &[RarityThreshold],
) -> Mineral {
    let rarity = select_rarity(depth_factor(tile, start_position), rng.gen::<f64>(), thresholds);
    let bucket: Vec<&Mineral> = minerals_of(rarity).collect();
    // Every rarity has at least one table entry; fall back to the first row regardless.
    if bucket.is_empty() {
        return MINERALS[0];
    }
    *bucket[rng.gen_range(0..bucket.len())]
}
