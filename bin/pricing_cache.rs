//! # Pricing Cache Maintenance
//!
//! Inspects and prunes the on-disk price cache, and writes a starter configuration file.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin pricing_cache -- stats
//! cargo run --bin pricing_cache -- clear --region us-east-1
//! cargo run --bin pricing_cache -- init-config
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use instancepedia_pricing::settings::{self, Settings};
use instancepedia_pricing::{metrics, PriceCache};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pricing_cache")]
#[command(about = "Inspect and maintain the Instancepedia price cache", long_about = None)]
struct Args {
    /// Cache directory (overrides configuration)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show entry counts, size and age range
    Stats,
    /// Delete cached prices, optionally filtered
    Clear {
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        instance_type: Option<String>,
    },
    /// Write a commented config template to ~/.instancepedia/config.toml
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    metrics::describe_metrics();

    let args = Args::parse();

    if let Command::InitConfig { force } = args.command {
        return init_config(force);
    }

    let mut settings = Settings::new().context("failed to load settings")?;
    if let Some(dir) = args.cache_dir {
        settings.cache_dir = Some(dir);
    }
    let cache = PriceCache::open(&settings);

    match args.command {
        Command::Stats => print_stats(&cache),
        Command::Clear { region, instance_type } => {
            let removed = cache.clear(region.as_deref(), instance_type.as_deref());
            println!("{} {} cache entries", "Cleared".green().bold(), removed);
        }
        Command::InitConfig { .. } => {}
    }
    Ok(())
}

fn print_stats(cache: &PriceCache) {
    let stats = cache.stats();
    metrics::set_cache_entries(stats.valid_entries);

    println!("{}", "Price cache".bold());
    println!("{}", "=".repeat(40));
    println!("Directory:   {}", cache.cache_dir().display());
    println!("TTL:         {}s", cache.ttl().as_secs());
    println!("Entries:     {}", stats.total_entries);
    println!("  valid:     {}", stats.valid_entries.to_string().green());
    println!("  expired:   {}", stats.expired_entries.to_string().yellow());
    if stats.corrupted_entries > 0 {
        println!("  corrupted: {}", stats.corrupted_entries.to_string().red());
    }
    println!("Size:        {:.1} KiB", stats.size_bytes as f64 / 1024.0);
    match (stats.oldest_entry, stats.newest_entry) {
        (Some(oldest), Some(newest)) => {
            println!("Oldest:      {}", oldest.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Newest:      {}", newest.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        _ => println!("{}", "Cache is empty".dimmed()),
    }
}

fn init_config(force: bool) -> Result<()> {
    let path = settings::config_path();
    if path.exists() && !force {
        println!(
            "{} {} already exists (use --force to overwrite)",
            "Skipped:".yellow(),
            path.display()
        );
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, settings::default_config_template())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("{} {}", "Wrote".green().bold(), path.display());
    Ok(())
}
