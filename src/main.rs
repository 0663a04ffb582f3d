//! Binary entrypoint for the Glyphdig CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml` and place the scarce rewards
//! - `dig --player <id> [--name <n>] [--item <kind>|auto]` - take one dig
//! - `buy --player <id> <kind>` - buy one consumable
//! - `grant --player <id> <amount>` - admin currency grant
//! - `player <id>` - show a player's record and remaining wait
//! - `leaderboard [-n <limit>]`, `stats`, `rewards` - read-only views
//! - `channel --player <id> <handle>` - remember a player's private channel
//! - `reset-player <id>`, `reset-all --yes` - admin resets (bulk reset is backed up first)
//! - `export [--out <file>]` - JSON snapshot of every player
//! - `backup [--list | --verify <id> | --restore <id>]` - checksummed player backups
//!
//! See the library crate docs for module-level details: `glyphdig::`.
use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use log::info;

use glyphdig::config::Config;
use glyphdig::game::{ClaimOutcome, ConsumableKind};
use glyphdig::service::{preferred_consumable, GameService};

#[derive(Parser)]
#[command(name = "glyphdig")]
#[command(about = "Turn-based digging game engine and admin tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and initialize the data directory
    Init,
    /// Dig once for a player
    Dig {
        #[arg(short, long)]
        player: String,
        /// Display name (defaults to the player id)
        #[arg(short, long)]
        name: Option<String>,
        /// Consumable to use: pickaxe, dynamite, explosive, or `auto` for the smallest held
        #[arg(short, long)]
        item: Option<String>,
    },
    /// Buy one consumable at the configured price
    Buy {
        #[arg(short, long)]
        player: String,
        #[arg(short, long)]
        name: Option<String>,
        item: ConsumableKind,
    },
    /// Grant glyphs to a player (1..=1000000)
    Grant {
        #[arg(short, long)]
        player: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },
    /// Show one player's record
    Player { id: String },
    /// Show the top players
    Leaderboard {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
    /// Show aggregate statistics
    Stats,
    /// Show the scarce reward catalog and claim state
    Rewards,
    /// Remember a player's private channel handle
    Channel {
        #[arg(short, long)]
        player: String,
        handle: String,
    },
    /// Reset one player to the start
    ResetPlayer { id: String },
    /// Reset every player (a backup is written first)
    ResetAll {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Export every player as JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<String>,
    },
    /// Create, list, verify or restore player document backups
    Backup {
        #[arg(long, conflicts_with_all = ["restore", "verify"])]
        list: bool,
        #[arg(long, conflicts_with = "verify")]
        restore: Option<String>,
        #[arg(long)]
        verify: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        init_logging(&None, cli.verbose);
        info!("Initializing new Glyphdig configuration");
        Config::create_default(&cli.config).await?;
        info!("Configuration file created at {}", cli.config);
        let config = Config::load(&cli.config).await?;
        let game = GameService::open(&config);
        info!(
            "Placed {} scarce rewards under {}",
            game.rewards_status().len(),
            config.storage.data_dir
        );
        return Ok(());
    }

    let config = Config::load(&cli.config)
        .await
        .map_err(|e| anyhow!("{} (run `glyphdig init` to create one)", e))?;
    config.validate()?;
    init_logging(&Some(config.clone()), cli.verbose);
    let game = GameService::open(&config);

    match cli.command {
        Commands::Init => {}
        Commands::Dig { player, name, item } => {
            let name = name.unwrap_or_else(|| player.clone());
            let consumable = match item.as_deref() {
                None => None,
                Some("auto") => {
                    let current = game.get_or_create_player(&player, &name)?;
                    preferred_consumable(&current)
                }
                Some(other) => Some(other.parse::<ConsumableKind>().map_err(|e| anyhow!(e))?),
            };
            let result = game.perform_action(&player, &name, consumable)?;
            println!("{}", result.message);
            if result.accepted() {
                println!(
                    "Tile {} ({}/{}) | {:+} glyphs",
                    result.position,
                    result.tile_progress,
                    result.digs_required,
                    result.currency_delta
                );
            }
            if let Some(ClaimOutcome::Claimed(r)) = &result.claim {
                info!("{} claimed scarce reward '{}'", player, r.id);
            }
        }
        Commands::Buy { player, name, item } => {
            let name = name.unwrap_or_else(|| player.clone());
            let receipt = game.purchase(&player, &name, item)?;
            println!(
                "Bought 1 {} for {} glyphs. Balance {} | {} held",
                receipt.item, receipt.cost, receipt.balance, receipt.owned
            );
        }
        Commands::Grant { player, name, amount } => {
            let name = name.unwrap_or_else(|| player.clone());
            let receipt = game.grant_currency(&player, &name, amount)?;
            println!(
                "Granted {} glyphs to {}: {} -> {}",
                receipt.amount, player, receipt.previous_balance, receipt.balance
            );
        }
        Commands::Player { id } => {
            let p = game.player(&id)?;
            let wait = game.time_remaining(&p);
            println!("{}", serde_json::to_string_pretty(&p)?);
            if !wait.is_clear() {
                println!(
                    "Cooldown {}ms, timeout {}ms remaining",
                    wait.cooldown_ms, wait.timeout_ms
                );
            }
        }
        Commands::Leaderboard { limit } => {
            for e in game.leaderboard(limit) {
                println!(
                    "{:>3}. {:<24} {:>6} digs  tile {:>5}  {:>8} glyphs",
                    e.rank, e.display_name, e.total_actions, e.position, e.currency
                );
            }
        }
        Commands::Stats => {
            let s = game.stats();
            println!("Players: {}", s.total_players);
            println!("Total digs: {}", s.total_actions);
            println!("Average depth: {}", s.average_depth);
            println!("At the bottom: {}", s.players_at_goal);
            if let Some(w) = game.winner() {
                println!("Winner: {} ({})", w.display_name, w.id);
            }
        }
        Commands::Rewards => {
            for r in game.rewards_status() {
                match &r.claimed_by {
                    Some(who) => println!("{} [{}] claimed by {}", r.name, r.value, who),
                    None => println!("{} [{}] unclaimed", r.name, r.value),
                }
            }
        }
        Commands::Channel { player, handle } => {
            game.set_private_channel(&player, &handle)?;
            println!("Private channel for {} set", player);
        }
        Commands::ResetPlayer { id } => {
            let p = game.reset_player(&id)?;
            println!("{} is back at tile {}", p.display_name, p.position);
        }
        Commands::ResetAll { yes } => {
            if !yes {
                bail!("refusing to reset every player without --yes");
            }
            let backup = game.reset_all_players()?;
            println!("All players reset. Backup: {}", backup.id);
        }
        Commands::Export { out } => {
            let json = serde_json::to_string_pretty(&game.export_snapshot())?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, json).await?;
                    info!("Exported players to {}", path);
                }
                None => println!("{}", json),
            }
        }
        Commands::Backup {
            list,
            restore,
            verify,
        } => {
            if list {
                for b in game.list_backups()? {
                    println!(
                        "{}  {:?}  {} bytes  {}",
                        b.id,
                        b.backup_type,
                        b.size_bytes,
                        b.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            } else if let Some(id) = verify {
                if game.verify_backup(&id)? {
                    println!("{} verified", id);
                } else {
                    bail!("{} failed checksum verification", id);
                }
            } else if let Some(id) = restore {
                let n = game.restore_backup(&id)?;
                println!("Restored {} players from {}", n, id);
            } else {
                let b = game.backup()?;
                println!("Backup created: {} ({} bytes)", b.id, b.size_bytes);
            }
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
    if let Some(f) = file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Only echo to the console when someone is watching
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
