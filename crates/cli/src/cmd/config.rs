//! Configuration command
//!
//! Shows the effective configuration and where it lives.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cli_lib::config::{self, ConfigError, PathwatchConfig, MAX_INTERVAL_MS, MIN_INTERVAL_MS};
use owo_colors::OwoColorize;

fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => config::config_file_path().ok_or_else(|| ConfigError::NoConfigDir.into()),
    }
}

/// List the effective configuration
pub fn run_show(explicit: Option<&Path>) -> Result<()> {
    let config = PathwatchConfig::load(explicit)?;
    let config_path = resolve_path(explicit)?;

    println!("{}", "Pathwatch Configuration".bold());
    if config_path.exists() {
        println!("{}: {}\n", "Location".dimmed(), config_path.display().dimmed());
    } else {
        println!(
            "{}: {} {}\n",
            "Location".dimmed(),
            config_path.display().dimmed(),
            "(not found, using defaults)".yellow()
        );
    }

    println!("{}", "[monitor]".yellow());
    println!(
        "  {} = {} {}",
        "interval_ms".cyan(),
        config.monitor.interval_ms,
        format!("({:.1}s)", config.interval().as_secs_f64()).dimmed()
    );
    println!("  {} = {}", "probe".cyan(), config.monitor.probe);

    println!("\n{}", "[watch]".yellow());
    let extra = if config.watch.extra_events.is_empty() {
        "(none)".dimmed().to_string()
    } else {
        config.watch.extra_events.join(", ")
    };
    println!("  {} = {}", "extra_events".cyan(), extra);

    println!("\n{}", "[log]".yellow());
    println!("  {} = {}", "level".cyan(), config.log.level);
    match &config.log.directory {
        Some(dir) => println!("  {} = {}", "directory".cyan(), dir.display()),
        None => println!("  {} = {}", "directory".cyan(), "(stderr)".dimmed()),
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!("  interval_ms: {}-{}", MIN_INTERVAL_MS, MAX_INTERVAL_MS);
    println!("  probe: stat, contents, json, toml");

    Ok(())
}

/// Show the config file path and optionally create it
pub fn run_path(explicit: Option<&Path>, create: bool) -> Result<()> {
    let config_path = resolve_path(explicit)?;

    if create && !config_path.exists() {
        config::init_if_missing(&config_path)
            .with_context(|| format!("failed to create {}", config_path.display()))?;
        println!("{} Created config file at: {}", "✓".green(), config_path.display());
    } else if config_path.exists() {
        println!("{}", config_path.display());
    } else {
        println!("{}", config_path.display());
        println!("{}", "File does not exist. Use --create to create it.".yellow());
    }

    Ok(())
}

/// Show example configuration
pub fn run_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}
