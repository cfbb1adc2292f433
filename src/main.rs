use chrono::{DateTime, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use planet::cli::{Cli, Commands};
use planet::config::Config;
use planet::domain::normalize_timestamp;
use planet::errors::PlanetResult;
use planet::filters::FilterRegistry;
use planet::services::{ExpungeService, RefreshService, SpliceService};
use planet::storage::{CacheStore, IdIndex, SqliteIdIndex, SqliteStorage};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> PlanetResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env(&cli.config)?;

    // Initialize storage
    let store = CacheStore::open(&config.cache_directory)?;
    let index = open_index(&config);
    let index = index.as_ref().map(|i| i as &dyn IdIndex);

    match cli.command {
        Commands::Refresh => cmd_refresh(&config, &store, index),
        Commands::Splice => cmd_splice(&config, &store, index),
        Commands::Expunge => cmd_expunge(&config, &store, index),
        Commands::Blacklist { id } => cmd_blacklist(&id, &store, index),
        Commands::Reindex => cmd_reindex(&config, &store),
        Commands::Run => {
            cmd_refresh(&config, &store, index)?;
            cmd_expunge(&config, &store, index)?;
            cmd_splice(&config, &store, index)
        }
    }
}

/// The index is optional: if it cannot be opened we run without it.
fn open_index(config: &Config) -> Option<SqliteIdIndex> {
    if !config.id_index {
        return None;
    }

    match SqliteStorage::new(config.index_path()) {
        Ok(storage) => Some(SqliteIdIndex::new(storage)),
        Err(e) => {
            tracing::warn!(error = %e, "ID index unavailable, continuing without it");
            None
        }
    }
}

fn cmd_refresh(config: &Config, store: &CacheStore, index: Option<&dyn IdIndex>) -> PlanetResult<()> {
    if config.subscriptions.is_empty() {
        println!("No subscriptions configured.");
        return Ok(());
    }

    println!("Fetching {} feeds...", config.subscriptions.len());

    let service = RefreshService::from_config(config, FilterRegistry::new())?;
    let report = service.refresh(config, store, index)?;

    println!(
        "Refresh complete: {} updated, {} unchanged, {} failed",
        report.updated, report.not_modified, report.failed
    );
    println!(
        "Entries: {} written, {} filtered, {} blacklisted, {} errors",
        report.entries.written, report.entries.rejected, report.entries.blacklisted, report.entries.failed
    );
    if report.unsaved > 0 {
        println!("Could not save {} feeds to the cache", report.unsaved);
    }
    if report.duplicates > 0 {
        println!("Duplicate subscriptions: {}", report.duplicates);
    }

    Ok(())
}

fn cmd_splice(config: &Config, store: &CacheStore, index: Option<&dyn IdIndex>) -> PlanetResult<()> {
    let entries = SpliceService::new(store, index).splice(config)?;

    if entries.is_empty() {
        println!("No cached entries.");
        return Ok(());
    }

    for spliced in &entries {
        let when = normalize_timestamp(DateTime::<Utc>::from(spliced.mtime));
        let feed = spliced
            .source
            .name
            .as_deref()
            .or(spliced.source.title.as_deref())
            .unwrap_or(&spliced.source.uri);
        let title = spliced.entry.title.as_deref().unwrap_or(&spliced.entry.id);
        println!("{}  [{}] {}", when, feed, title);
        if let Some(link) = &spliced.entry.link {
            println!("    {}", link);
        }
    }

    Ok(())
}

fn cmd_expunge(config: &Config, store: &CacheStore, index: Option<&dyn IdIndex>) -> PlanetResult<()> {
    let report = ExpungeService::new(store, index).expunge(config)?;

    println!(
        "Expunge complete: {} kept, {} deleted, {} unreadable",
        report.kept, report.deleted, report.skipped
    );

    Ok(())
}

fn cmd_blacklist(id: &str, store: &CacheStore, index: Option<&dyn IdIndex>) -> PlanetResult<()> {
    let key = store.blacklist(id)?;
    let removed = store.remove_entry(&key)?;
    if let Some(index) = index {
        index.forget(&key)?;
    }

    println!("Blacklisted: {} ({})", id, key);
    if removed {
        println!("Removed cached entry.");
    }

    Ok(())
}

fn cmd_reindex(config: &Config, store: &CacheStore) -> PlanetResult<()> {
    let index = SqliteIdIndex::new(SqliteStorage::new(config.index_path())?);
    let count = index.rebuild(store)?;

    println!("Indexed {} entries.", count);

    Ok(())
}
