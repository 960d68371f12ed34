//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `resolve_user` - Pick the acting user
//! - `upload_service` / `review_service` - Build the import service
//! - `cmd_init` - Initialize the database
//! - `cmd_audit` - Show the audit log

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tally_core::models::{UploadId, UserId};
use tally_core::{
    AIClient, Database, ImportConfig, ImportService, LocalFileStorage, PdfTextExtractor,
    StatementParser,
};
use uuid::Uuid;

use super::truncate;

/// Environment variable naming the acting user
pub const USER_ENV: &str = "TALLY_USER";

/// User id for single-user local installs
pub const LOCAL_USER: Uuid = Uuid::from_u128(1);

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// `--user`, else `TALLY_USER`, else the local user
pub fn resolve_user(arg: Option<&str>) -> Result<UserId> {
    let raw = match arg {
        Some(value) => Some(value.to_string()),
        None => std::env::var(USER_ENV).ok(),
    };

    match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => value
            .parse::<UserId>()
            .with_context(|| format!("Invalid user id: {}", value)),
        None => Ok(UserId(LOCAL_USER)),
    }
}

pub fn parse_upload_id(id: &str) -> Result<UploadId> {
    id.parse::<UploadId>()
        .with_context(|| format!("Invalid import id: {}", id))
}

/// Fail fast when the parsing backend is down, before anything is stored
pub async fn ensure_parser_ready(parser: &dyn StatementParser) -> Result<()> {
    if !parser.health_check().await {
        bail!(
            "AI backend at {} (model {}) is not reachable. Start it, or pass --mock",
            parser.host(),
            parser.model()
        );
    }
    tracing::debug!(host = parser.host(), model = parser.model(), "AI backend ready");
    Ok(())
}

/// Service wired with the configured AI backend (or the offline mock parser)
pub async fn upload_service(db: Database, mock: bool) -> Result<ImportService> {
    let parser = if mock {
        AIClient::mock()
    } else {
        AIClient::from_env().context(
            "No AI backend configured. Set OLLAMA_HOST (or AI_BACKEND=openai_compatible with \
             OPENAI_COMPATIBLE_HOST), or pass --mock",
        )?
    };
    ensure_parser_ready(&parser).await?;
    build_service(db, parser)
}

/// Service for commands that never parse (review, confirm, cancel)
pub fn review_service(db_path: &Path, no_encrypt: bool) -> Result<ImportService> {
    let db = open_db(db_path, no_encrypt)?;
    build_service(db, AIClient::mock())
}

fn build_service(db: Database, parser: AIClient) -> Result<ImportService> {
    let config = ImportConfig::load().context("Failed to load import config")?;
    let storage = LocalFileStorage::from_env().context("Failed to set up statement storage")?;

    Ok(ImportService::new(
        db,
        config,
        Arc::new(storage),
        Arc::new(PdfTextExtractor::new()),
        Arc::new(parser),
    ))
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;

    let seeded = db
        .seed_system_categories()
        .context("Failed to seed system categories")?;
    println!("   Seeded {} system categories", seeded);

    if db.is_encrypted()? {
        println!("   🔒 Encryption: ENABLED");
    } else {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Upload a statement: tally upload --file statement.pdf");
    println!("  2. Review it: tally show <IMPORT_ID>");
    println!("  3. Book it: tally confirm <IMPORT_ID>");

    Ok(())
}

pub fn cmd_audit(db: &Database, limit: i64) -> Result<()> {
    let entries = db.list_audit_log(limit)?;

    if entries.is_empty() {
        println!("No audit entries yet.");
        return Ok(());
    }

    println!();
    println!("📜 Audit Log");
    println!("   ─────────────────────────────────────────────────────────────");

    for entry in entries {
        println!(
            "   {} │ {:18} │ {} │ {}",
            entry.timestamp,
            entry.action,
            entry
                .entity_id
                .as_deref()
                .map(|id| truncate(id, 13))
                .unwrap_or_else(|| "-".to_string()),
            entry.details.as_deref().unwrap_or("")
        );
    }

    Ok(())
}
