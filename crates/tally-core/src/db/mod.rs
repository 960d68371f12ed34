//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `statements` - Statement uploads and their parsed lines (optimistic concurrency)
//! - `categories` - System and user categories
//! - `outbox` - Confirmation outbox and the local ledger table
//! - `audit` - Audit log

use std::str::FromStr;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use tracing::info;

use crate::error::{Error, Result};

mod audit;
mod categories;
mod outbox;
mod statements;

pub use audit::AuditEntry;
pub use categories::SYSTEM_CATEGORIES;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "TALLY_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"tally-salt-v1-fx";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    // Hash portion, hex encoded, is the SQLCipher raw key
    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a TEXT column through `FromStr`, reporting failures as conversion errors
pub(crate) fn parse_column<T, E>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = E>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    value
        .parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    db_path: String,
    keyed: bool,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `TALLY_DB_KEY`. Use `new_unencrypted()` for development or
    /// testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // Set the key on every new connection, before foreign keys
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            let manager = manager.with_init(|conn| {
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                Ok(())
            });
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
            keyed: passphrase.is_some(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because every
    /// pooled connection to `:memory:` would get its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "tally_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    ///
    /// True only when opened with a key and SQLCipher is active.
    pub fn is_encrypted(&self) -> Result<bool> {
        if !self.keyed {
            return Ok(false);
        }
        let conn = self.conn()?;
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Categories: user_id NULL = system-wide
            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                user_id TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_scope_name
                ON categories(COALESCE(user_id, ''), name COLLATE NOCASE);
            CREATE INDEX IF NOT EXISTS idx_categories_user ON categories(user_id);

            -- Statement uploads (import aggregate roots)
            CREATE TABLE IF NOT EXISTS statement_uploads (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                storage_locator TEXT NOT NULL,
                content_hash TEXT,
                uploaded_at TEXT NOT NULL,            -- RFC 3339, sortable
                status TEXT NOT NULL,
                error_message TEXT,
                period_month INTEGER,
                period_year INTEGER,
                version INTEGER NOT NULL,             -- optimistic concurrency token
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_statement_uploads_user
                ON statement_uploads(user_id, uploaded_at);
            CREATE INDEX IF NOT EXISTS idx_statement_uploads_status ON statement_uploads(status);

            -- Parsed lines owned by an upload
            CREATE TABLE IF NOT EXISTS parsed_transactions (
                id TEXT PRIMARY KEY,
                upload_id TEXT NOT NULL REFERENCES statement_uploads(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                amount TEXT NOT NULL,                 -- decimal string
                currency TEXT NOT NULL,
                suggested_category_id TEXT NOT NULL,
                confirmed_category_id TEXT,
                original_text TEXT NOT NULL,
                UNIQUE(upload_id, position)
            );

            -- Durable intent records written when an import is confirmed
            CREATE TABLE IF NOT EXISTS confirmation_outbox (
                upload_id TEXT NOT NULL REFERENCES statement_uploads(id),
                transaction_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                amount TEXT NOT NULL,
                currency TEXT NOT NULL,
                category_id TEXT NOT NULL,
                idempotency_key TEXT NOT NULL UNIQUE,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                delivered_at DATETIME,                -- NULL = pending
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (upload_id, transaction_id)
            );

            CREATE INDEX IF NOT EXISTS idx_outbox_pending
                ON confirmation_outbox(upload_id, delivered_at);

            -- Local bookkeeping ledger
            CREATE TABLE IF NOT EXISTS ledger_transactions (
                id INTEGER PRIMARY KEY,
                idempotency_key TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                amount TEXT NOT NULL,
                currency TEXT NOT NULL,
                category_id TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_user ON ledger_transactions(user_id, date);

            -- Audit log
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                user_id TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT,
                entity_id TEXT,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_log_user ON audit_log(user_id);
            CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
