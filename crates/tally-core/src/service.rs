//! Import orchestrators
//!
//! `ImportService` drives a statement upload through the aggregate's
//! transitions and persists every step. Each public method is one request:
//! it loads what it needs, checks ownership, applies transitions, saves, and
//! only then publishes the emitted events.
//!
//! Pipeline failures after the aggregate exists (storage read, extraction,
//! parsing, nothing left after filtering) are recorded on the aggregate as
//! `Failed` before the error is returned, so a failed import explains itself.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::ai::StatementParser;
use crate::cancel::CancelSignal;
use crate::config::ImportConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::events::EventRegistry;
use crate::extract::TextExtractor;
use crate::filter::{filter_boilerplate, FilterResult};
use crate::ledger::TransactionCreator;
use crate::models::{
    Category, CategoryUpdate, ImportStatus, ImportSummary, NewParsedTransaction,
    NewStatementUpload, StatementUpload, UploadId, UserId,
};
use crate::resolver::{CategoryResolver, CategorySnapshot};
use crate::statement::{validate_file_name, ImportCommand, ImportEvent, Transition};
use crate::storage::FileStorage;

/// Re-label infrastructure errors from a pipeline stage as that stage's failure
fn stage_failure(error: Error, stage: fn(String) -> Error) -> Error {
    match error {
        Error::Cancelled | Error::Storage(_) | Error::Extraction(_) | Error::Parsing(_) => error,
        other => stage(other.to_string()),
    }
}

/// Statement import orchestrator
pub struct ImportService {
    db: Database,
    config: ImportConfig,
    storage: Arc<dyn FileStorage>,
    extractor: Arc<dyn TextExtractor>,
    parser: Arc<dyn StatementParser>,
    ledger: Arc<dyn TransactionCreator>,
    resolver: CategoryResolver,
    events: EventRegistry,
}

impl ImportService {
    /// Create a service that books confirmed lines into the database's own ledger table
    pub fn new(
        db: Database,
        config: ImportConfig,
        storage: Arc<dyn FileStorage>,
        extractor: Arc<dyn TextExtractor>,
        parser: Arc<dyn StatementParser>,
    ) -> Self {
        Self {
            resolver: CategoryResolver::from_config(&config),
            ledger: Arc::new(db.clone()),
            events: EventRegistry::with_logging(),
            db,
            config,
            storage,
            extractor,
            parser,
        }
    }

    /// Use a different transaction-creation collaborator
    pub fn with_ledger(mut self, ledger: Arc<dyn TransactionCreator>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Replace the event registry
    pub fn with_events(mut self, events: EventRegistry) -> Self {
        self.events = events;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    // ========================================================================
    // Upload
    // ========================================================================

    /// Store a statement and run it through extraction, parsing and resolution
    ///
    /// Returns the import in `PendingReview`. Input problems are rejected
    /// before anything is stored. If `cancel` fires during extraction or
    /// parsing the import stays in `Parsing` and `Error::Cancelled` is
    /// returned.
    pub async fn upload(
        &self,
        content: &[u8],
        file_name: &str,
        user_id: UserId,
        cancel: &CancelSignal,
    ) -> Result<StatementUpload> {
        self.validate_upload(content, file_name, user_id)?;
        cancel.check()?;

        let locator = self
            .storage
            .save(content, file_name, user_id)
            .await
            .map_err(|e| stage_failure(e, Error::Storage))?;
        debug!(%user_id, locator = %locator, bytes = content.len(), "Stored statement document");

        let new = NewStatementUpload {
            user_id,
            file_name: file_name.to_string(),
            storage_locator: locator.clone(),
            content_hash: Some(hex::encode(Sha256::digest(content))),
        };
        let created = match StatementUpload::create(new, &self.config.accepted_extension) {
            Ok(transition) => transition,
            Err(e) => {
                self.discard_document(&locator).await;
                return Err(e);
            }
        };
        let parsing = created.upload.apply(ImportCommand::MarkAsParsing)?;

        let mut upload = parsing.upload;
        if let Err(e) = self.db.save_statement_upload(&mut upload) {
            self.discard_document(&locator).await;
            return Err(e);
        }
        self.events.publish_all(&created.events);
        self.events.publish_all(&parsing.events);
        self.audit(user_id, "upload", upload.id, Some(file_name));
        info!(upload_id = %upload.id, file_name, "Statement uploaded, parsing");

        let completed = self
            .parse_statement(&upload, cancel)
            .await
            .and_then(|lines| upload.apply(ImportCommand::CompleteParsing(lines)));

        match completed {
            Ok(Transition {
                upload: mut parsed,
                events,
            }) => {
                self.db.save_statement_upload(&mut parsed)?;
                self.events.publish_all(&events);
                info!(
                    upload_id = %parsed.id,
                    transactions = parsed.transactions.len(),
                    "Statement ready for review"
                );
                Ok(parsed)
            }
            Err(Error::Cancelled) => {
                info!(upload_id = %upload.id, "Upload cancelled, import left in parsing");
                Err(Error::Cancelled)
            }
            Err(e) => Err(self.record_failure(&upload, e)),
        }
    }

    fn validate_upload(&self, content: &[u8], file_name: &str, user_id: UserId) -> Result<()> {
        if user_id.is_nil() {
            return Err(Error::Validation("User id is required".into()));
        }
        validate_file_name(file_name, &self.config.accepted_extension)?;
        if content.is_empty() {
            return Err(Error::Validation("Uploaded file is empty".into()));
        }
        if content.len() > self.config.max_size_bytes {
            return Err(Error::Validation(format!(
                "File is {} bytes, the limit is {} bytes",
                content.len(),
                self.config.max_size_bytes
            )));
        }
        Ok(())
    }

    /// Steps between `Parsing` and `CompleteParsing`
    async fn parse_statement(
        &self,
        upload: &StatementUpload,
        cancel: &CancelSignal,
    ) -> Result<Vec<NewParsedTransaction>> {
        let document = cancel
            .run(self.storage.read(&upload.storage_locator))
            .await
            .map_err(|e| stage_failure(e, Error::Storage))?;

        let text = cancel
            .run(self.extractor.extract(&document))
            .await
            .map_err(|e| stage_failure(e, Error::Extraction))?;
        debug!(upload_id = %upload.id, chars = text.len(), "Extracted statement text");

        let snapshot = CategorySnapshot::new(self.db.available_categories(upload.user_id)?);

        let timeout = self.config.parse_timeout;
        let parse = async {
            match tokio::time::timeout(
                timeout,
                self.parser.parse_statement(&text, snapshot.categories()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(Error::Parsing(format!(
                    "Parsing service timed out after {:?}",
                    timeout
                ))),
            }
        };
        let candidates = cancel
            .run(parse)
            .await
            .map_err(|e| stage_failure(e, Error::Parsing))?;
        debug!(
            upload_id = %upload.id,
            candidates = candidates.len(),
            model = self.parser.model(),
            "Statement parsed"
        );

        let FilterResult { kept, excluded } = filter_boilerplate(candidates);
        info!(upload_id = %upload.id, kept = kept.len(), excluded, "Filtered statement lines");
        if kept.is_empty() {
            return Err(Error::NoTransactions);
        }

        let fallback = snapshot.fallback_id(&self.config.fallback_category)?;

        let lines = kept
            .into_iter()
            .map(|raw| {
                let suggested_category_id = self
                    .resolver
                    .resolve(raw.suggested_category.as_deref(), &snapshot)
                    .unwrap_or(fallback);
                let currency = raw
                    .currency
                    .map(|c| c.trim().to_uppercase())
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| self.config.default_currency.clone());
                NewParsedTransaction {
                    date: raw.date,
                    description: raw.description,
                    amount: raw.amount,
                    currency,
                    suggested_category_id,
                    original_text: raw.original_text,
                }
            })
            .collect();

        Ok(lines)
    }

    /// Persist the import as `Failed`, returning the original error
    fn record_failure(&self, upload: &StatementUpload, cause: Error) -> Error {
        warn!(upload_id = %upload.id, code = cause.code(), error = %cause, "Import failed");

        match upload.apply(ImportCommand::MarkAsFailed(cause.to_string())) {
            Ok(mut transition) => match self.db.save_statement_upload(&mut transition.upload) {
                Ok(()) => {
                    self.events.publish_all(&transition.events);
                    self.audit(upload.user_id, "fail", upload.id, Some(cause.code()));
                }
                Err(e) => {
                    error!(upload_id = %upload.id, error = %e, "Could not record import failure")
                }
            },
            Err(e) => {
                error!(upload_id = %upload.id, error = %e, "Could not mark import as failed")
            }
        }

        cause
    }

    async fn discard_document(&self, locator: &str) {
        if let Err(e) = self.storage.delete(locator).await {
            warn!(locator, error = %e, "Failed to remove orphaned statement document");
        }
    }

    // ========================================================================
    // Review
    // ========================================================================

    /// Load an import the user owns
    pub fn get_by_id(&self, upload_id: UploadId, user_id: UserId) -> Result<StatementUpload> {
        let upload = self
            .db
            .get_statement_upload(upload_id)?
            .ok_or_else(|| Error::NotFound(format!("Import {}", upload_id)))?;

        if upload.user_id != user_id {
            warn!(%upload_id, %user_id, "Rejected access to another user's import");
            return Err(Error::Forbidden(format!(
                "Import {} belongs to another user",
                upload_id
            )));
        }
        Ok(upload)
    }

    /// The user's imports, newest first
    pub fn list_for_user(&self, user_id: UserId) -> Result<Vec<ImportSummary>> {
        self.db.list_statement_uploads(user_id)
    }

    /// Categories the user can assign
    pub fn categories(&self, user_id: UserId) -> Result<Vec<Category>> {
        self.db.available_categories(user_id)
    }

    /// Resolve a free-text category name against the user's categories
    pub fn resolve_category(&self, user_id: UserId, name: &str) -> Result<Option<Category>> {
        let snapshot = CategorySnapshot::new(self.db.available_categories(user_id)?);
        let resolved = self.resolver.resolve(Some(name), &snapshot);
        Ok(resolved.and_then(|id| {
            snapshot
                .categories()
                .iter()
                .find(|c| c.id == id)
                .cloned()
        }))
    }

    /// Apply category overrides as one request
    ///
    /// Updates are applied in order; the first unknown line or category
    /// rejects the whole request and nothing is saved.
    pub fn update_categories(
        &self,
        upload_id: UploadId,
        user_id: UserId,
        updates: &[CategoryUpdate],
    ) -> Result<StatementUpload> {
        let mut upload = self.get_by_id(upload_id, user_id)?;
        if upload.status != ImportStatus::PendingReview {
            return Err(Error::InvalidStatus {
                operation: "update categories of",
                status: upload.status,
            });
        }
        if updates.is_empty() {
            return Ok(upload);
        }

        let snapshot = CategorySnapshot::new(self.db.available_categories(user_id)?);
        let mut events = Vec::with_capacity(updates.len());

        for update in updates {
            if !snapshot.contains(update.category_id) {
                return Err(Error::Validation(format!(
                    "Category {} is not available",
                    update.category_id
                )));
            }
            let transition = upload.apply(ImportCommand::UpdateTransactionCategory {
                transaction_id: update.transaction_id,
                category_id: update.category_id,
            })?;
            upload = transition.upload;
            events.extend(transition.events);
        }

        self.db.save_statement_upload(&mut upload)?;
        self.publish(&events);
        self.audit(
            user_id,
            "update_categories",
            upload_id,
            Some(&format!("{} lines", updates.len())),
        );
        Ok(upload)
    }

    /// Cancel an import that has not been confirmed
    pub fn cancel(&self, upload_id: UploadId, user_id: UserId) -> Result<StatementUpload> {
        let upload = self.get_by_id(upload_id, user_id)?;
        let Transition {
            upload: mut cancelled,
            events,
        } = upload.apply(ImportCommand::Cancel)?;

        self.db.save_statement_upload(&mut cancelled)?;
        self.publish(&events);
        self.audit(user_id, "cancel", upload_id, None);
        Ok(cancelled)
    }

    // ========================================================================
    // Confirmation
    // ========================================================================

    /// Confirm an import and book every line into the ledger
    ///
    /// The `Confirmed` status and one outbox row per line are saved
    /// atomically before any ledger call. A ledger failure then returns
    /// `Error::TransactionCreation`; the import stays confirmed and
    /// [`resume_confirmation`](Self::resume_confirmation) delivers the rest.
    pub async fn confirm(&self, upload_id: UploadId, user_id: UserId) -> Result<StatementUpload> {
        let upload = self.get_by_id(upload_id, user_id)?;
        let (mut confirmed, event) = upload.confirm()?;

        self.db.save_confirmed_upload(&mut confirmed, &event)?;
        self.publish(&[ImportEvent::Confirmed(event)]);
        self.audit(
            user_id,
            "confirm",
            upload_id,
            Some(&format!("{} lines", confirmed.transactions.len())),
        );

        let delivered = self.deliver_outbox(upload_id).await?;
        info!(%upload_id, delivered, "Import confirmed");
        Ok(confirmed)
    }

    /// Deliver outbox rows left pending by an interrupted confirmation
    ///
    /// Returns how many lines were delivered by this call.
    pub async fn resume_confirmation(&self, upload_id: UploadId, user_id: UserId) -> Result<usize> {
        let upload = self.get_by_id(upload_id, user_id)?;
        if upload.status != ImportStatus::Confirmed {
            return Err(Error::InvalidStatus {
                operation: "resume confirmation of",
                status: upload.status,
            });
        }

        let delivered = self.deliver_outbox(upload_id).await?;
        self.audit(
            user_id,
            "resume_confirmation",
            upload_id,
            Some(&format!("{} lines", delivered)),
        );
        info!(%upload_id, delivered, "Confirmation resumed");
        Ok(delivered)
    }

    /// Hand pending outbox rows to the ledger in line order, stopping at the first failure
    ///
    /// Runs after the import is already `Confirmed`, so every failure here,
    /// bookkeeping included, is reported as `Error::TransactionCreation`.
    async fn deliver_outbox(&self, upload_id: UploadId) -> Result<usize> {
        let pending = self.db.pending_outbox(upload_id).map_err(|e| {
            error!(%upload_id, error = %e, "Could not read confirmation outbox");
            Error::TransactionCreation(format!(
                "import {} is confirmed but its pending lines could not be read: {}",
                upload_id, e
            ))
        })?;
        let total = pending.len();
        let still_pending = |delivered: usize, e: &Error| {
            Error::TransactionCreation(format!(
                "import {} is confirmed but {} of {} lines are still pending: {}",
                upload_id,
                total - delivered,
                total,
                e
            ))
        };

        for (delivered, item) in pending.iter().enumerate() {
            if let Err(e) = self.ledger.create(&item.entry, &item.idempotency_key).await {
                error!(
                    %upload_id,
                    transaction_id = %item.transaction_id,
                    error = %e,
                    "Ledger transaction creation failed"
                );
                if let Err(record_err) =
                    self.db
                        .record_outbox_failure(upload_id, item.transaction_id, &e.to_string())
                {
                    warn!(%upload_id, error = %record_err, "Could not record outbox failure");
                }
                return Err(still_pending(delivered, &e));
            }
            // The ledger has the line; an unmarked row is re-sent under the same key
            if let Err(e) = self.db.mark_outbox_delivered(upload_id, item.transaction_id) {
                error!(
                    %upload_id,
                    transaction_id = %item.transaction_id,
                    error = %e,
                    "Could not mark outbox row delivered"
                );
                return Err(still_pending(delivered, &e));
            }
        }

        Ok(total)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn publish(&self, events: &[ImportEvent]) {
        self.events.publish_all(events);
    }

    fn audit(&self, user_id: UserId, action: &str, upload_id: UploadId, details: Option<&str>) {
        if let Err(e) = self.db.log_audit(
            user_id,
            action,
            Some("import"),
            Some(&upload_id.to_string()),
            details,
        ) {
            warn!(action, %upload_id, error = %e, "Failed to write audit log");
        }
    }
}
