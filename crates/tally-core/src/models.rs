//! Data models for Tally

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Identity of the acting user (owned by the auth layer)
    UserId
);
id_type!(
    /// Identity of a statement upload (one import)
    UploadId
);
id_type!(
    /// Identity of a parsed line, scoped to its upload
    TransactionId
);
id_type!(CategoryId);

// ============================================================================
// Import lifecycle
// ============================================================================

/// Lifecycle status of a statement upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    #[default]
    Uploading,
    Parsing,
    PendingReview,
    Confirmed,
    Cancelled,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Parsing => "parsing",
            Self::PendingReview => "pending_review",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// End states of the review lifecycle (nothing further reaches the ledger)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled | Self::Failed)
    }
}

impl std::str::FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uploading" => Ok(Self::Uploading),
            "parsing" => Ok(Self::Parsing),
            "pending_review" => Ok(Self::PendingReview),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown import status: {}", s)),
        }
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Month/year a statement covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementPeriod {
    pub month: u32,
    pub year: i32,
}

impl std::fmt::Display for StatementPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Fields required to create a statement upload
#[derive(Debug, Clone)]
pub struct NewStatementUpload {
    pub user_id: UserId,
    pub file_name: String,
    pub storage_locator: String,
    /// SHA-256 of the stored document (hex)
    pub content_hash: Option<String>,
}

/// Statement upload aggregate root
///
/// Mutated only through the transitions in [`crate::statement`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementUpload {
    pub id: UploadId,
    pub user_id: UserId,
    pub file_name: String,
    pub storage_locator: String,
    pub content_hash: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub status: ImportStatus,
    pub error_message: Option<String>,
    pub period: Option<StatementPeriod>,
    pub transactions: Vec<ParsedTransaction>,
    /// Optimistic concurrency token, 0 until first persisted
    #[serde(skip)]
    pub(crate) version: i64,
}

impl StatementUpload {
    pub fn transaction(&self, id: TransactionId) -> Option<&ParsedTransaction> {
        self.transactions.iter().find(|t| t.id == id)
    }

    /// Whether the aggregate has never been saved
    pub fn is_new(&self) -> bool {
        self.version == 0
    }
}

/// A line as returned by the parsing service, before filtering and resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, alias = "category", alias = "suggested_category_name")]
    pub suggested_category: Option<String>,
    #[serde(default)]
    pub original_text: String,
}

/// A resolved line ready to be attached by `CompleteParsing`
#[derive(Debug, Clone)]
pub struct NewParsedTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    pub suggested_category_id: CategoryId,
    pub original_text: String,
}

/// Parsed statement line owned by a [`StatementUpload`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTransaction {
    pub id: TransactionId,
    /// Order within the statement (0-based)
    pub position: u32,
    pub date: NaiveDate,
    pub description: String,
    /// Always a positive magnitude; sign is decided by the ledger
    pub amount: Decimal,
    pub currency: String,
    pub suggested_category_id: CategoryId,
    pub confirmed_category_id: Option<CategoryId>,
    pub original_text: String,
}

impl ParsedTransaction {
    /// User override if present, else the automatic suggestion
    pub fn effective_category_id(&self) -> CategoryId {
        self.confirmed_category_id
            .unwrap_or(self.suggested_category_id)
    }
}

/// A single re-categorization request
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CategoryUpdate {
    pub transaction_id: TransactionId,
    pub category_id: CategoryId,
}

/// Import summary for list views
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub id: UploadId,
    pub file_name: String,
    pub status: ImportStatus,
    pub uploaded_at: DateTime<Utc>,
    pub transaction_count: i64,
    pub error_message: Option<String>,
}

// ============================================================================
// Categories
// ============================================================================

/// Whether a category is shared by everyone or owned by one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum CategoryScope {
    System,
    User(UserId),
}

/// A category visible to a user (read-only to the import pipeline)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub scope: CategoryScope,
}

impl Category {
    pub fn system(name: &str) -> Self {
        Self {
            id: CategoryId::new(),
            name: name.to_string(),
            description: None,
            scope: CategoryScope::System,
        }
    }

    pub fn is_system(&self) -> bool {
        self.scope == CategoryScope::System
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// One transaction handed to the bookkeeping ledger on confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    pub description: String,
    pub category_id: CategoryId,
}

/// Durable intent to deliver one confirmed line to the ledger
#[derive(Debug, Clone, Serialize)]
pub struct OutboxEntry {
    pub upload_id: UploadId,
    pub transaction_id: TransactionId,
    pub position: u32,
    pub idempotency_key: String,
    pub entry: LedgerEntry,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub delivered: bool,
}

/// A row of the local ledger table
#[derive(Debug, Clone, Serialize)]
pub struct LedgerRecord {
    pub id: i64,
    pub idempotency_key: String,
    pub entry: LedgerEntry,
    pub created_at: String,
}
