//! Confirmation outbox and local ledger
//!
//! Confirming an import writes one outbox row per line in the same SQLite
//! transaction that flips the upload to `Confirmed`. Rows are then delivered
//! to the ledger one by one and marked as they succeed, so an interrupted
//! delivery can be resumed without creating anything twice.

use async_trait::async_trait;
use rusqlite::{params, Row};
use tracing::debug;

use super::statements::write_upload;
use super::{parse_column, Database};
use crate::error::Result;
use crate::ledger::{idempotency_key, TransactionCreator};
use crate::models::{
    LedgerEntry, LedgerRecord, OutboxEntry, StatementUpload, TransactionId, UploadId, UserId,
};
use crate::statement::ImportConfirmed;

fn row_to_outbox(row: &Row) -> rusqlite::Result<OutboxEntry> {
    let upload_id: String = row.get(0)?;
    let transaction_id: String = row.get(1)?;
    let user_id: String = row.get(3)?;
    let date: String = row.get(4)?;
    let amount: String = row.get(6)?;
    let category_id: String = row.get(8)?;
    let delivered_at: Option<String> = row.get(12)?;

    Ok(OutboxEntry {
        upload_id: parse_column(0, &upload_id)?,
        transaction_id: parse_column(1, &transaction_id)?,
        position: row.get(2)?,
        entry: LedgerEntry {
            user_id: parse_column(3, &user_id)?,
            date: parse_column(4, &date)?,
            description: row.get(5)?,
            amount: parse_column(6, &amount)?,
            currency: row.get(7)?,
            category_id: parse_column(8, &category_id)?,
        },
        idempotency_key: row.get(9)?,
        attempts: row.get(10)?,
        last_error: row.get(11)?,
        delivered: delivered_at.is_some(),
    })
}

const OUTBOX_COLUMNS: &str = "upload_id, transaction_id, position, user_id, date, description, \
     amount, currency, category_id, idempotency_key, attempts, last_error, delivered_at";

impl Database {
    /// Persist a confirmed upload together with its outbox rows
    ///
    /// Either both the `Confirmed` status and every intent record are
    /// written, or neither is.
    pub fn save_confirmed_upload(
        &self,
        upload: &mut StatementUpload,
        confirmed: &ImportConfirmed,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let version = write_upload(&tx, upload)?;

        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT OR IGNORE INTO confirmation_outbox
                    (upload_id, transaction_id, position, user_id, date, description,
                     amount, currency, category_id, idempotency_key)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for (position, line) in confirmed.lines.iter().enumerate() {
                stmt.execute(params![
                    confirmed.upload_id.to_string(),
                    line.transaction_id.to_string(),
                    position as i64,
                    confirmed.user_id.to_string(),
                    line.date.to_string(),
                    line.description,
                    line.amount.to_string(),
                    line.currency,
                    line.category_id.to_string(),
                    idempotency_key(confirmed.upload_id, line.transaction_id),
                ])?;
            }
        }

        tx.commit()?;
        upload.version = version;
        debug!(upload_id = %upload.id, lines = confirmed.lines.len(), "Wrote confirmation outbox");
        Ok(())
    }

    /// Outbox rows not yet delivered, in line order
    pub fn pending_outbox(&self, upload_id: UploadId) -> Result<Vec<OutboxEntry>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM confirmation_outbox \
             WHERE upload_id = ? AND delivered_at IS NULL ORDER BY position",
            OUTBOX_COLUMNS
        ))?;

        let entries = stmt
            .query_map(params![upload_id.to_string()], row_to_outbox)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Every outbox row for an upload, in line order
    pub fn outbox_entries(&self, upload_id: UploadId) -> Result<Vec<OutboxEntry>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM confirmation_outbox WHERE upload_id = ? ORDER BY position",
            OUTBOX_COLUMNS
        ))?;

        let entries = stmt
            .query_map(params![upload_id.to_string()], row_to_outbox)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    pub fn mark_outbox_delivered(
        &self,
        upload_id: UploadId,
        transaction_id: TransactionId,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE confirmation_outbox
            SET delivered_at = CURRENT_TIMESTAMP, attempts = attempts + 1, last_error = NULL
            WHERE upload_id = ? AND transaction_id = ?
            "#,
            params![upload_id.to_string(), transaction_id.to_string()],
        )?;
        Ok(())
    }

    /// Record a failed delivery attempt; the row stays pending
    pub fn record_outbox_failure(
        &self,
        upload_id: UploadId,
        transaction_id: TransactionId,
        error: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE confirmation_outbox
            SET attempts = attempts + 1, last_error = ?
            WHERE upload_id = ? AND transaction_id = ?
            "#,
            params![error, upload_id.to_string(), transaction_id.to_string()],
        )?;
        Ok(())
    }

    /// Insert a ledger transaction unless the key was already used
    ///
    /// Returns whether a new row was created.
    pub fn insert_ledger_transaction(&self, entry: &LedgerEntry, key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO ledger_transactions
                (idempotency_key, user_id, date, description, amount, currency, category_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                key,
                entry.user_id.to_string(),
                entry.date.to_string(),
                entry.description,
                entry.amount.to_string(),
                entry.currency,
                entry.category_id.to_string(),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Ledger transactions for a user, oldest first
    pub fn list_ledger_transactions(&self, user_id: UserId) -> Result<Vec<LedgerRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, idempotency_key, user_id, date, description, amount, currency,
                   category_id, created_at
            FROM ledger_transactions
            WHERE user_id = ?
            ORDER BY date, id
            "#,
        )?;

        let records = stmt
            .query_map(params![user_id.to_string()], |row| {
                let user_id: String = row.get(2)?;
                let date: String = row.get(3)?;
                let amount: String = row.get(5)?;
                let category_id: String = row.get(7)?;
                Ok(LedgerRecord {
                    id: row.get(0)?,
                    idempotency_key: row.get(1)?,
                    entry: LedgerEntry {
                        user_id: parse_column(2, &user_id)?,
                        date: parse_column(3, &date)?,
                        description: row.get(4)?,
                        amount: parse_column(5, &amount)?,
                        currency: row.get(6)?,
                        category_id: parse_column(7, &category_id)?,
                    },
                    created_at: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

/// The local ledger table as the transaction-creation collaborator
#[async_trait]
impl TransactionCreator for Database {
    async fn create(&self, entry: &LedgerEntry, idempotency_key: &str) -> Result<()> {
        if !self.insert_ledger_transaction(entry, idempotency_key)? {
            debug!(idempotency_key, "Ledger transaction already exists, skipping");
        }
        Ok(())
    }
}
