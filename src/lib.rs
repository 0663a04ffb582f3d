//! # Glyphdig - Turn-Based Digging Game Core
//!
//! Glyphdig is the game engine behind a chat-bot digging race. Players start at the top
//! tile of a shared track and dig their way down to tile 0, earning glyphs (the in-game
//! currency) from the minerals they uncover and spending them on consumables that clear
//! several tiles at once.
//!
//! ## Features
//!
//! - **Rate-Limited Progression**: per-player cooldown and penalty timeouts, digs per
//!   tile growing with depth.
//! - **Randomized Effects**: depth-weighted mineral rarity, occasional penalties inside a
//!   configurable band, independent bonuses.
//! - **Market**: pickaxes, dynamite and explosives priced and tuned from configuration.
//! - **Scarce Rewards**: one-off prizes hidden on random tiles, claimed exactly once
//!   across threads and processes. A claim that can't be written is not awarded.
//! - **Durable Storage**: keyed JSON documents with fs2 file locks, per-key merge on save,
//!   checksummed backups before bulk resets.
//! - **Admin Tooling**: grants, resets, exports and backups from the `glyphdig` CLI.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use glyphdig::config::Config;
//! use glyphdig::service::GameService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     config.validate()?;
//!
//!     let game = GameService::open(&config);
//!     let result = game.perform_action("123456789", "alice", None)?;
//!     println!("{}", result.message);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`game`] - Progression engine, mineral tables, reward registry, rankings
//! - [`storage`] - Player document persistence and backups
//! - [`service`] - The facade the presentation layer calls
//! - [`config`] - Configuration management and validation
//! - [`validation`] - Player id validation and display name cleanup
//! - [`logutil`] - Single-line escaping for user strings in logs
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  GameService    │ ← Identity checks, claim + save after each dig
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  Progression    │ ← Pure rules: gates, advancement, effects
//! │  Engine         │
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  PlayerStore /  │ ← JSON documents under the data directory
//! │  RewardRegistry │
//! └─────────────────┘
//! ```

pub mod config;
pub mod game;
pub mod logutil;
pub mod service;
pub mod storage;
pub mod validation;
