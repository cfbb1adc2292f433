use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "planet")]
#[command(about = "Feed aggregation engine: fetch, cache, splice and expunge syndication feeds")]
#[command(version)]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "PLANET_CONFIG", default_value = "planet.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch every subscription and update the cache
    Refresh,

    /// Print the merged list of the freshest cached entries
    Splice,

    /// Delete cached entries beyond each feed's retention count
    Expunge,

    /// Permanently suppress an entry by its id
    Blacklist {
        /// Entry id as it appears in the feed
        id: String,
    },

    /// Rebuild the entry -> feed index from the cache
    Reindex,

    /// Refresh, expunge, then splice
    Run,
}
