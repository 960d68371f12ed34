//! Integration tests for tally-core
//!
//! These tests exercise the full upload → review → confirm workflow against
//! a real SQLite database, with in-test fakes for text extraction and the
//! downstream ledger.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tally_core::{
    models::{CategoryUpdate, ImportStatus, LedgerEntry, UserId},
    CancelSignal, Database, Error, EventKind, ImportConfig, ImportService, LocalFileStorage,
    MockBackend, Result, TextExtractor, TransactionCreator,
};

/// A statement as the PDF text layer would come out, boilerplate included
fn march_statement() -> &'static str {
    r#"ACME BANK VISA SIGNATURE
Statement Period 03/01/2024 - 03/31/2024
Previous Balance $1,204.55
03/02/2024 WALMART SUPERCENTER $42.10
03/05/2024 UBER TRIP 18.40
03/09/2024 STARBUCKS STORE 1123 6.25
03/14/2024 CHIPOTLE 0455 13.80
Payment Received - Thank You -500.00
Total Purchases $80.55
Minimum Payment Due $35.00
Credit Limit $5,000.00"#
}

/// Returns the statement text for any document
struct StatementText(&'static str);

#[async_trait]
impl TextExtractor for StatementText {
    async fn extract(&self, _document: &[u8]) -> Result<String> {
        Ok(self.0.to_string())
    }
}

#[derive(Default)]
struct Ledger {
    entries: Mutex<Vec<(LedgerEntry, String)>>,
}

#[async_trait]
impl TransactionCreator for Ledger {
    async fn create(&self, entry: &LedgerEntry, idempotency_key: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .push((entry.clone(), idempotency_key.to_string()));
        Ok(())
    }
}

fn service(dir: &tempfile::TempDir, ledger: Arc<Ledger>) -> ImportService {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    db.seed_system_categories().expect("Failed to seed categories");

    ImportService::new(
        db,
        ImportConfig::default(),
        Arc::new(LocalFileStorage::new(dir.path())),
        Arc::new(StatementText(march_statement())),
        Arc::new(MockBackend::new()),
    )
    .with_ledger(ledger)
}

// =============================================================================
// Full workflow
// =============================================================================

#[tokio::test]
async fn test_full_import_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(Ledger::default());
    let service = service(&dir, ledger.clone());
    let user = UserId::new();

    // Upload
    let upload = service
        .upload(b"%PDF-1.7 statement", "Statement_March.pdf", user, &CancelSignal::never())
        .await
        .expect("Upload failed");

    assert_eq!(upload.status, ImportStatus::PendingReview);
    let descriptions: Vec<_> = upload
        .transactions
        .iter()
        .map(|t| t.description.as_str())
        .collect();
    assert_eq!(
        descriptions,
        vec![
            "WALMART SUPERCENTER",
            "UBER TRIP",
            "STARBUCKS STORE 1123",
            "CHIPOTLE 0455"
        ]
    );
    let period = upload.period.expect("Period should be set");
    assert_eq!((period.month, period.year), (3, 2024));

    let categories = service.categories(user).unwrap();
    let name_of = |id| {
        categories
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
            .unwrap()
    };
    let suggested: Vec<_> = upload
        .transactions
        .iter()
        .map(|t| name_of(t.suggested_category_id))
        .collect();
    assert_eq!(
        suggested,
        vec!["Groceries", "Rideshare", "Coffee & Tea", "Dining Out"]
    );

    // The stored document is kept under the user's directory
    assert!(upload.storage_locator.starts_with(&user.to_string()));
    assert!(dir.path().join(&upload.storage_locator).exists());

    // Review: Starbucks was really a work lunch
    let dining = categories.iter().find(|c| c.name == "Dining Out").unwrap().id;
    service
        .update_categories(
            upload.id,
            user,
            &[CategoryUpdate {
                transaction_id: upload.transactions[2].id,
                category_id: dining,
            }],
        )
        .expect("Update failed");

    // Confirm
    let confirmed = service.confirm(upload.id, user).await.expect("Confirm failed");
    assert_eq!(confirmed.status, ImportStatus::Confirmed);

    let entries = ledger.entries.lock().unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[2].0.description, "STARBUCKS STORE 1123");
    assert_eq!(entries[2].0.category_id, dining);
    assert!(entries.iter().all(|(e, _)| e.user_id == user));
    assert!(entries
        .iter()
        .all(|(_, key)| key.starts_with(&upload.id.to_string())));

    // Listing shows the confirmed import
    let summaries = service.list_for_user(user).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].status, ImportStatus::Confirmed);
    assert_eq!(summaries[0].transaction_count, 4);
}

#[tokio::test]
async fn test_events_follow_the_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut registry = tally_core::EventRegistry::new();
    for kind in EventKind::all() {
        let seen = seen.clone();
        registry.register(*kind, move |event| seen.lock().unwrap().push(event.kind()));
    }
    let service = service(&dir, Arc::new(Ledger::default())).with_events(registry);
    let user = UserId::new();

    let upload = service
        .upload(b"%PDF", "march.pdf", user, &CancelSignal::never())
        .await
        .unwrap();
    service.cancel(upload.id, user).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            EventKind::Created,
            EventKind::ParsingStarted,
            EventKind::ParsingCompleted,
            EventKind::Cancelled,
        ]
    );
}

// =============================================================================
// Database-backed ledger
// =============================================================================

#[tokio::test]
async fn test_confirm_into_database_ledger_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::in_memory().unwrap();
    db.seed_system_categories().unwrap();
    let service = ImportService::new(
        db.clone(),
        ImportConfig::default(),
        Arc::new(LocalFileStorage::new(dir.path())),
        Arc::new(StatementText(march_statement())),
        Arc::new(MockBackend::new()),
    );
    let user = UserId::new();

    let upload = service
        .upload(b"%PDF", "march.pdf", user, &CancelSignal::never())
        .await
        .unwrap();
    service.confirm(upload.id, user).await.unwrap();
    assert_eq!(db.list_ledger_transactions(user).unwrap().len(), 4);

    // Re-delivering the same keys creates nothing new
    for item in db.outbox_entries(upload.id).unwrap() {
        db.create(&item.entry, &item.idempotency_key).await.unwrap();
    }
    assert_eq!(db.list_ledger_transactions(user).unwrap().len(), 4);

    let err = service.confirm(upload.id, user).await.unwrap_err();
    assert!(matches!(err, Error::InvalidStatus { .. }));
}

// =============================================================================
// Ownership
// =============================================================================

#[tokio::test]
async fn test_users_only_see_their_own_imports() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir, Arc::new(Ledger::default()));
    let alice = UserId::new();
    let bob = UserId::new();

    let upload = service
        .upload(b"%PDF", "alice.pdf", alice, &CancelSignal::never())
        .await
        .unwrap();

    assert!(service.list_for_user(bob).unwrap().is_empty());
    let err = service.get_by_id(upload.id, bob).unwrap_err();
    assert_eq!(err.code(), "forbidden");
    assert!(!err.is_retryable());
}
