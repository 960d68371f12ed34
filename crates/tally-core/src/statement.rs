//! Statement upload state machine
//!
//! ```text
//! Uploading -> Parsing -> PendingReview -> Confirmed
//!     |           |            |
//!     +-----------+------------+--> Failed / Cancelled
//! ```
//!
//! Every transition is a pure function of the current aggregate and a command:
//! it returns the next aggregate plus the events it emitted, and leaves the
//! input untouched. A rejected command therefore never partially applies.
//! Persisting the result is the caller's job.

use chrono::{Datelike, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{
    CategoryId, ImportStatus, NewParsedTransaction, NewStatementUpload, ParsedTransaction,
    StatementPeriod, StatementUpload, TransactionId, UploadId, UserId,
};

/// A request to move an import through its lifecycle
#[derive(Debug, Clone)]
pub enum ImportCommand {
    MarkAsParsing,
    CompleteParsing(Vec<NewParsedTransaction>),
    MarkAsFailed(String),
    UpdateTransactionCategory {
        transaction_id: TransactionId,
        category_id: CategoryId,
    },
    Confirm,
    Cancel,
}

impl ImportCommand {
    fn operation(&self) -> &'static str {
        match self {
            Self::MarkAsParsing => "start parsing",
            Self::CompleteParsing(_) => "complete parsing",
            Self::MarkAsFailed(_) => "fail",
            Self::UpdateTransactionCategory { .. } => "recategorize",
            Self::Confirm => "confirm",
            Self::Cancel => "cancel",
        }
    }
}

/// Snapshot of one line at confirmation time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmedLine {
    pub transaction_id: TransactionId,
    pub date: chrono::NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    pub category_id: CategoryId,
}

/// Integration event emitted exactly once per import by `Confirm`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportConfirmed {
    pub upload_id: UploadId,
    pub user_id: UserId,
    pub lines: Vec<ConfirmedLine>,
}

/// Events emitted by transitions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ImportEvent {
    Created {
        upload_id: UploadId,
        user_id: UserId,
        file_name: String,
    },
    ParsingStarted {
        upload_id: UploadId,
    },
    ParsingCompleted {
        upload_id: UploadId,
        transaction_count: usize,
    },
    Failed {
        upload_id: UploadId,
        reason: String,
    },
    CategoryUpdated {
        upload_id: UploadId,
        transaction_id: TransactionId,
        category_id: CategoryId,
    },
    Confirmed(ImportConfirmed),
    Cancelled {
        upload_id: UploadId,
    },
}

/// Variant tag of an [`ImportEvent`], used as the registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    ParsingStarted,
    ParsingCompleted,
    Failed,
    CategoryUpdated,
    Confirmed,
    Cancelled,
}

impl EventKind {
    pub fn all() -> &'static [EventKind] {
        &[
            Self::Created,
            Self::ParsingStarted,
            Self::ParsingCompleted,
            Self::Failed,
            Self::CategoryUpdated,
            Self::Confirmed,
            Self::Cancelled,
        ]
    }
}

impl ImportEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Created { .. } => EventKind::Created,
            Self::ParsingStarted { .. } => EventKind::ParsingStarted,
            Self::ParsingCompleted { .. } => EventKind::ParsingCompleted,
            Self::Failed { .. } => EventKind::Failed,
            Self::CategoryUpdated { .. } => EventKind::CategoryUpdated,
            Self::Confirmed(_) => EventKind::Confirmed,
            Self::Cancelled { .. } => EventKind::Cancelled,
        }
    }

    pub fn upload_id(&self) -> UploadId {
        match self {
            Self::Created { upload_id, .. }
            | Self::ParsingStarted { upload_id }
            | Self::ParsingCompleted { upload_id, .. }
            | Self::Failed { upload_id, .. }
            | Self::CategoryUpdated { upload_id, .. }
            | Self::Cancelled { upload_id } => *upload_id,
            Self::Confirmed(confirmed) => confirmed.upload_id,
        }
    }
}

/// Result of a successful transition
#[derive(Debug, Clone)]
pub struct Transition {
    pub upload: StatementUpload,
    pub events: Vec<ImportEvent>,
}

/// Check a file name against the accepted document extension
///
/// `accepted_extension` is compared case-insensitively, with or without the dot.
pub fn validate_file_name(file_name: &str, accepted_extension: &str) -> Result<()> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return Err(Error::Validation("File name is required".into()));
    }
    let suffix = format!(".{}", accepted_extension.trim_start_matches('.'));
    if !file_name.to_lowercase().ends_with(&suffix.to_lowercase()) {
        return Err(Error::Validation(format!(
            "Only {} files are accepted",
            suffix.to_uppercase()
        )));
    }
    Ok(())
}

impl StatementUpload {
    /// Create a new import in `Uploading`
    pub fn create(new: NewStatementUpload, accepted_extension: &str) -> Result<Transition> {
        let file_name = new.file_name.trim();
        validate_file_name(file_name, accepted_extension)?;
        if new.storage_locator.trim().is_empty() {
            return Err(Error::Validation("Storage locator is required".into()));
        }
        if new.user_id.is_nil() {
            return Err(Error::Validation("User id is required".into()));
        }

        let upload = StatementUpload {
            id: UploadId::new(),
            user_id: new.user_id,
            file_name: file_name.to_string(),
            storage_locator: new.storage_locator,
            content_hash: new.content_hash,
            // Stored with microsecond precision
            uploaded_at: Utc::now().trunc_subsecs(6),
            status: ImportStatus::Uploading,
            error_message: None,
            period: None,
            transactions: Vec::new(),
            version: 0,
        };
        let events = vec![ImportEvent::Created {
            upload_id: upload.id,
            user_id: upload.user_id,
            file_name: upload.file_name.clone(),
        }];
        Ok(Transition { upload, events })
    }

    /// Apply a command, returning the next state and its events
    pub fn apply(&self, command: ImportCommand) -> Result<Transition> {
        let operation = command.operation();
        let invalid = |status| Error::InvalidStatus { operation, status };
        let mut next = self.clone();

        let event = match command {
            ImportCommand::MarkAsParsing => {
                if self.status != ImportStatus::Uploading {
                    return Err(invalid(self.status));
                }
                next.status = ImportStatus::Parsing;
                ImportEvent::ParsingStarted { upload_id: self.id }
            }
            ImportCommand::CompleteParsing(lines) => {
                if lines.is_empty() {
                    return Err(Error::NoTransactions);
                }
                if self.status != ImportStatus::Parsing || !self.transactions.is_empty() {
                    return Err(invalid(self.status));
                }
                next.period = lines.iter().map(|l| l.date).max().map(|d| StatementPeriod {
                    month: d.month(),
                    year: d.year(),
                });
                next.transactions = lines
                    .into_iter()
                    .enumerate()
                    .map(|(i, l)| ParsedTransaction {
                        id: TransactionId::new(),
                        position: i as u32,
                        date: l.date,
                        description: l.description,
                        amount: l.amount.abs(),
                        currency: l.currency,
                        suggested_category_id: l.suggested_category_id,
                        confirmed_category_id: None,
                        original_text: l.original_text,
                    })
                    .collect();
                next.status = ImportStatus::PendingReview;
                ImportEvent::ParsingCompleted {
                    upload_id: self.id,
                    transaction_count: next.transactions.len(),
                }
            }
            ImportCommand::MarkAsFailed(reason) => {
                if matches!(
                    self.status,
                    ImportStatus::Confirmed | ImportStatus::Cancelled
                ) {
                    return Err(invalid(self.status));
                }
                next.status = ImportStatus::Failed;
                next.error_message = Some(reason.clone());
                ImportEvent::Failed {
                    upload_id: self.id,
                    reason,
                }
            }
            ImportCommand::UpdateTransactionCategory {
                transaction_id,
                category_id,
            } => {
                if self.status != ImportStatus::PendingReview {
                    return Err(invalid(self.status));
                }
                let line = next
                    .transactions
                    .iter_mut()
                    .find(|t| t.id == transaction_id)
                    .ok_or_else(|| {
                        Error::NotFound(format!(
                            "Transaction {} in import {}",
                            transaction_id, self.id
                        ))
                    })?;
                line.confirmed_category_id = Some(category_id);
                ImportEvent::CategoryUpdated {
                    upload_id: self.id,
                    transaction_id,
                    category_id,
                }
            }
            ImportCommand::Confirm => {
                if self.status != ImportStatus::PendingReview {
                    return Err(invalid(self.status));
                }
                if self.transactions.is_empty() {
                    return Err(Error::NoTransactions);
                }
                next.status = ImportStatus::Confirmed;
                ImportEvent::Confirmed(self.confirmed_snapshot())
            }
            ImportCommand::Cancel => {
                if self.status == ImportStatus::Confirmed {
                    return Err(invalid(self.status));
                }
                next.status = ImportStatus::Cancelled;
                ImportEvent::Cancelled { upload_id: self.id }
            }
        };

        Ok(Transition {
            upload: next,
            events: vec![event],
        })
    }

    pub fn mark_as_parsing(&self) -> Result<Self> {
        Ok(self.apply(ImportCommand::MarkAsParsing)?.upload)
    }

    pub fn complete_parsing(&self, lines: Vec<NewParsedTransaction>) -> Result<Self> {
        Ok(self.apply(ImportCommand::CompleteParsing(lines))?.upload)
    }

    pub fn mark_as_failed(&self, reason: impl Into<String>) -> Result<Self> {
        Ok(self.apply(ImportCommand::MarkAsFailed(reason.into()))?.upload)
    }

    pub fn update_transaction_category(
        &self,
        transaction_id: TransactionId,
        category_id: CategoryId,
    ) -> Result<Self> {
        Ok(self
            .apply(ImportCommand::UpdateTransactionCategory {
                transaction_id,
                category_id,
            })?
            .upload)
    }

    /// Confirm the import, returning the integration event alongside it
    pub fn confirm(&self) -> Result<(Self, ImportConfirmed)> {
        let Transition { upload, .. } = self.apply(ImportCommand::Confirm)?;
        Ok((upload, self.confirmed_snapshot()))
    }

    /// Lines as booked, each with its effective category
    fn confirmed_snapshot(&self) -> ImportConfirmed {
        ImportConfirmed {
            upload_id: self.id,
            user_id: self.user_id,
            lines: self
                .transactions
                .iter()
                .map(|t| ConfirmedLine {
                    transaction_id: t.id,
                    date: t.date,
                    description: t.description.clone(),
                    amount: t.amount,
                    currency: t.currency.clone(),
                    category_id: t.effective_category_id(),
                })
                .collect(),
        }
    }

    pub fn cancel(&self) -> Result<Self> {
        Ok(self.apply(ImportCommand::Cancel)?.upload)
    }
}
