//! Tally CLI - Statement import pipeline
//!
//! Usage:
//!   tally init                    Initialize database and categories
//!   tally upload --file PDF       Upload and parse a statement
//!   tally show <ID>               Review parsed lines
//!   tally categorize <ID> 2 Gym   Change a line's category
//!   tally confirm <ID>            Book the lines into the ledger

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    if let Err(e) = run(cli).await {
        // Stable code from the core error, if that is what failed
        let code = e
            .downcast_ref::<tally_core::Error>()
            .map(|err| err.code())
            .unwrap_or("error");
        eprintln!("❌ [{}] {:#}", code, e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let user = commands::resolve_user(cli.user.as_deref())?;

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Categories { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(CategoriesAction::List) => commands::cmd_categories_list(&db, user),
                Some(CategoriesAction::Add { name, description }) => {
                    commands::cmd_categories_add(&db, user, &name, description.as_deref())
                }
            }
        }
        Commands::Upload { file, mock, json } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let service = commands::upload_service(db, mock).await?;
            commands::cmd_upload(&service, user, &file, json).await
        }
        Commands::Show { id, json } => {
            let service = commands::review_service(&cli.db, cli.no_encrypt)?;
            commands::cmd_show(&service, user, &id, json)
        }
        Commands::List { json } => {
            let service = commands::review_service(&cli.db, cli.no_encrypt)?;
            commands::cmd_list(&service, user, json)
        }
        Commands::Categorize { id, line, category } => {
            let service = commands::review_service(&cli.db, cli.no_encrypt)?;
            commands::cmd_categorize(&service, user, &id, &line, &category)
        }
        Commands::Confirm { id } => {
            let service = commands::review_service(&cli.db, cli.no_encrypt)?;
            commands::cmd_confirm(&service, user, &id).await
        }
        Commands::Cancel { id } => {
            let service = commands::review_service(&cli.db, cli.no_encrypt)?;
            commands::cmd_cancel(&service, user, &id)
        }
        Commands::Resume { id } => {
            let service = commands::review_service(&cli.db, cli.no_encrypt)?;
            commands::cmd_resume(&service, user, &id).await
        }
        Commands::Audit { limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_audit(&db, limit)
        }
    }
}
