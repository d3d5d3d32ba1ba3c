//! Command-line interface definitions for discussion_ingest.
//!
//! Settings that describe *what* to ingest live in the configuration file;
//! the command line picks the file, the action and a few overrides.

use crate::aggregate::Ranking;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Ingest everything named in config.yaml
/// discussion_ingest download
///
/// # Abort on the first failed post, with debug logging
/// discussion_ingest -c ./wahl.yaml -v --strict download
///
/// # Top 30 commenters of the latest run
/// discussion_ingest user-stats --top 30 --rank comment
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML (or JSON) configuration file
    #[arg(short, long, env = "INGEST_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Log at debug level for this crate
    #[arg(short, long)]
    pub verbose: bool,

    /// Abort the run on the first failed post
    #[arg(long)]
    pub strict: bool,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Action {
    /// Ingest the configured page and URL groups into a new snapshot
    Download,
    /// Count all comments of the latest snapshot
    CommentStats,
    /// Count distinct users, overall and per action
    CountUsers,
    /// List display names shared by several accounts
    DuplicateNames,
    /// Rank users of the latest snapshot by activity
    UserStats {
        /// Number of users to list
        #[arg(long, default_value_t = 30)]
        top: usize,

        /// What to rank by
        #[arg(long, value_enum, default_value_t = Ranking::Total)]
        rank: Ranking,
    },
    /// Print the latest snapshot as a Markdown outline
    Show,
}
