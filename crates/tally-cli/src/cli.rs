//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Import bank statements into your ledger
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Statement import pipeline for personal bookkeeping", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Acting user id (defaults to TALLY_USER, then the local user)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and seed system categories
    Init,

    /// List or add categories
    Categories {
        #[command(subcommand)]
        action: Option<CategoriesAction>,
    },

    /// Upload a PDF statement and parse it for review
    Upload {
        /// Statement file (PDF)
        #[arg(short, long)]
        file: PathBuf,

        /// Parse offline with the built-in mock parser instead of an AI backend
        #[arg(long)]
        mock: bool,

        /// Print the resulting import as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show an import and its parsed lines
    Show {
        /// Import id
        id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List your imports, newest first
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change the category of a parsed line before confirming
    Categorize {
        /// Import id
        id: String,

        /// Line number as shown by `tally show` (or the line id)
        line: String,

        /// Category name or id
        category: String,
    },

    /// Confirm an import and book its lines into the ledger
    Confirm {
        /// Import id
        id: String,
    },

    /// Cancel an import that has not been confirmed
    Cancel {
        /// Import id
        id: String,
    },

    /// Deliver ledger transactions left pending by an interrupted confirm
    Resume {
        /// Import id
        id: String,
    },

    /// Show recent audit log entries
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// List categories visible to you
    List,

    /// Add a personal category
    Add {
        /// Category name
        name: String,

        /// Optional description (helps the AI parser pick it)
        #[arg(short, long)]
        description: Option<String>,
    },
}
