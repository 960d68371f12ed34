//! Statement upload persistence
//!
//! An upload and its parsed lines are always written in one SQLite
//! transaction. Writes are guarded by the `version` column: an update only
//! applies if nobody else saved the same import since it was loaded.

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::debug;

use super::{parse_column, Database};
use crate::error::{Error, Result};
use crate::models::{
    ImportSummary, ParsedTransaction, StatementPeriod, StatementUpload, UploadId, UserId,
};

const UPLOAD_COLUMNS: &str = "id, user_id, file_name, storage_locator, content_hash, uploaded_at, \
     status, error_message, period_month, period_year, version";

fn row_to_upload(row: &Row) -> rusqlite::Result<StatementUpload> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let uploaded_at: String = row.get(5)?;
    let status: String = row.get(6)?;
    let month: Option<u32> = row.get(8)?;
    let year: Option<i32> = row.get(9)?;

    Ok(StatementUpload {
        id: parse_column(0, &id)?,
        user_id: parse_column(1, &user_id)?,
        file_name: row.get(2)?,
        storage_locator: row.get(3)?,
        content_hash: row.get(4)?,
        uploaded_at: parse_column(5, &uploaded_at)?,
        status: parse_column(6, &status)?,
        error_message: row.get(7)?,
        period: month
            .zip(year)
            .map(|(month, year)| StatementPeriod { month, year }),
        transactions: Vec::new(),
        version: row.get(10)?,
    })
}

fn row_to_line(row: &Row) -> rusqlite::Result<ParsedTransaction> {
    let id: String = row.get(0)?;
    let date: String = row.get(2)?;
    let amount: String = row.get(4)?;
    let suggested: String = row.get(6)?;
    let confirmed: Option<String> = row.get(7)?;

    Ok(ParsedTransaction {
        id: parse_column(0, &id)?,
        position: row.get(1)?,
        date: parse_column(2, &date)?,
        description: row.get(3)?,
        amount: parse_column(4, &amount)?,
        currency: row.get(5)?,
        suggested_category_id: parse_column(6, &suggested)?,
        confirmed_category_id: confirmed.map(|c| parse_column(7, &c)).transpose()?,
        original_text: row.get(8)?,
    })
}

/// Write an upload and its lines on an open transaction, returning the new version
pub(super) fn write_upload(conn: &Connection, upload: &StatementUpload) -> Result<i64> {
    let next_version = upload.version + 1;
    let month = upload.period.map(|p| p.month);
    let year = upload.period.map(|p| p.year);

    if upload.is_new() {
        let inserted = conn.execute(
            r#"
            INSERT INTO statement_uploads
                (id, user_id, file_name, storage_locator, content_hash, uploaded_at,
                 status, error_message, period_month, period_year, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                upload.id.to_string(),
                upload.user_id.to_string(),
                upload.file_name,
                upload.storage_locator,
                upload.content_hash,
                upload
                    .uploaded_at
                    .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
                upload.status.as_str(),
                upload.error_message,
                month,
                year,
                next_version,
            ],
        );
        match inserted {
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(Error::Conflict(format!("Import {} already exists", upload.id)));
            }
            other => {
                other?;
            }
        }
    } else {
        let updated = conn.execute(
            r#"
            UPDATE statement_uploads
            SET status = ?, error_message = ?, period_month = ?, period_year = ?,
                version = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND version = ?
            "#,
            params![
                upload.status.as_str(),
                upload.error_message,
                month,
                year,
                next_version,
                upload.id.to_string(),
                upload.version,
            ],
        )?;
        if updated == 0 {
            return Err(Error::Conflict(format!(
                "Import {} was modified by another request (expected version {})",
                upload.id, upload.version
            )));
        }
    }

    // Lines are immutable once attached apart from the user's category choice
    let mut stmt = conn.prepare_cached(
        r#"
        INSERT INTO parsed_transactions
            (id, upload_id, position, date, description, amount, currency,
             suggested_category_id, confirmed_category_id, original_text)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET confirmed_category_id = excluded.confirmed_category_id
        "#,
    )?;
    for line in &upload.transactions {
        stmt.execute(params![
            line.id.to_string(),
            upload.id.to_string(),
            line.position,
            line.date.to_string(),
            line.description,
            line.amount.to_string(),
            line.currency,
            line.suggested_category_id.to_string(),
            line.confirmed_category_id.map(|c| c.to_string()),
            line.original_text,
        ])?;
    }

    Ok(next_version)
}

impl Database {
    /// Persist an upload and its lines atomically
    ///
    /// New aggregates are inserted; existing ones are updated only if their
    /// version still matches, otherwise `Error::Conflict`. On success the
    /// aggregate's version is advanced in place.
    pub fn save_statement_upload(&self, upload: &mut StatementUpload) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let version = write_upload(&tx, upload)?;
        tx.commit()?;

        upload.version = version;
        debug!(upload_id = %upload.id, status = %upload.status, version, "Saved statement upload");
        Ok(())
    }

    /// Load an upload with its lines in statement order
    pub fn get_statement_upload(&self, id: UploadId) -> Result<Option<StatementUpload>> {
        let conn = self.conn()?;

        let upload = conn
            .query_row(
                &format!("SELECT {} FROM statement_uploads WHERE id = ?", UPLOAD_COLUMNS),
                params![id.to_string()],
                row_to_upload,
            )
            .optional()?;

        let Some(mut upload) = upload else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT id, position, date, description, amount, currency,
                   suggested_category_id, confirmed_category_id, original_text
            FROM parsed_transactions
            WHERE upload_id = ?
            ORDER BY position
            "#,
        )?;
        upload.transactions = stmt
            .query_map(params![id.to_string()], row_to_line)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(upload))
    }

    /// List a user's uploads, newest first
    pub fn list_statement_uploads(&self, user_id: UserId) -> Result<Vec<ImportSummary>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT u.id, u.file_name, u.status, u.uploaded_at, u.error_message,
                   (SELECT COUNT(*) FROM parsed_transactions p WHERE p.upload_id = u.id)
            FROM statement_uploads u
            WHERE u.user_id = ?
            ORDER BY u.uploaded_at DESC, u.rowid DESC
            "#,
        )?;

        let summaries = stmt
            .query_map(params![user_id.to_string()], |row| {
                let id: String = row.get(0)?;
                let status: String = row.get(2)?;
                let uploaded_at: String = row.get(3)?;
                Ok(ImportSummary {
                    id: parse_column(0, &id)?,
                    file_name: row.get(1)?,
                    status: parse_column(2, &status)?,
                    uploaded_at: parse_column(3, &uploaded_at)?,
                    error_message: row.get(4)?,
                    transaction_count: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(summaries)
    }
}
