//! CLI command tests
//!
//! Commands run against an in-memory database, a temp storage directory
//! and a fixed statement text in place of PDF extraction.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tally_core::db::Database;
use tally_core::models::{ImportStatus, UserId};
use tally_core::{
    CancelSignal, ImportConfig, ImportService, LocalFileStorage, MockBackend, TextExtractor,
};
use tempfile::TempDir;

use crate::commands::{self, truncate};

const STATEMENT: &str = "\
Statement Period 04/01/2024 - 04/30/2024
04/03/2024 KROGER #512 61.20
04/07/2024 LYFT RIDE 14.75
04/12/2024 PLANET FITNESS 24.99
Total Purchases $100.94
New Balance $100.94";

struct FixedText;

#[async_trait]
impl TextExtractor for FixedText {
    async fn extract(&self, _document: &[u8]) -> tally_core::Result<String> {
        Ok(STATEMENT.to_string())
    }
}

fn setup_test_db() -> Database {
    let db = Database::in_memory().unwrap();
    db.seed_system_categories().unwrap();
    db
}

fn setup_service(dir: &TempDir) -> ImportService {
    ImportService::new(
        setup_test_db(),
        ImportConfig::default(),
        Arc::new(LocalFileStorage::new(dir.path().join("storage"))),
        Arc::new(FixedText),
        Arc::new(MockBackend::new()),
    )
}

fn write_statement(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, b"%PDF-1.7 april").unwrap();
    path
}

async fn upload_one(service: &ImportService, user: UserId) -> tally_core::models::StatementUpload {
    service
        .upload(b"%PDF-1.7 april", "april.pdf", user, &CancelSignal::never())
        .await
        .unwrap()
}

// ========== Helpers ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a much longer description", 10), "a much ...");
    assert_eq!(truncate("Café Überland", 8), "Café ...");
}

#[test]
fn test_resolve_user_from_argument() {
    let id = UserId::new();
    let resolved = commands::resolve_user(Some(&id.to_string())).unwrap();
    assert_eq!(resolved, id);
}

#[test]
fn test_resolve_user_rejects_garbage() {
    assert!(commands::resolve_user(Some("not-a-uuid")).is_err());
}

#[test]
fn test_parse_upload_id() {
    assert!(commands::parse_upload_id("nope").is_err());
    let id = tally_core::models::UploadId::new();
    assert_eq!(commands::parse_upload_id(&id.to_string()).unwrap(), id);
}

#[test]
fn test_open_db_unencrypted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tally.db");
    let db = commands::open_db(&path, true).unwrap();
    assert!(!db.is_encrypted().unwrap());
    assert!(path.exists());
}

#[tokio::test]
async fn test_ensure_parser_ready() {
    assert!(commands::ensure_parser_ready(&MockBackend::new()).await.is_ok());

    let err = commands::ensure_parser_ready(&MockBackend::unhealthy())
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("mock://localhost"));
    assert!(message.contains("--mock"));
}

// ========== Init / Categories ==========

#[test]
fn test_cmd_init() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tally.db");

    commands::cmd_init(&path, true).unwrap();
    // Running twice is harmless
    commands::cmd_init(&path, true).unwrap();

    let db = commands::open_db(&path, true).unwrap();
    let categories = db.available_categories(UserId::new()).unwrap();
    assert_eq!(categories.len(), tally_core::db::SYSTEM_CATEGORIES.len());
}

#[test]
fn test_cmd_categories_list() {
    let db = setup_test_db();
    assert!(commands::cmd_categories_list(&db, UserId::new()).is_ok());
}

#[test]
fn test_cmd_categories_add() {
    let db = setup_test_db();
    let user = UserId::new();

    commands::cmd_categories_add(&db, user, "Climbing", Some("Gym fees")).unwrap();

    let categories = db.available_categories(user).unwrap();
    let climbing = categories.iter().find(|c| c.name == "Climbing").unwrap();
    assert!(!climbing.is_system());

    // Other users do not see it
    let other = db.available_categories(UserId::new()).unwrap();
    assert!(other.iter().all(|c| c.name != "Climbing"));
}

#[test]
fn test_cmd_categories_add_duplicate_fails() {
    let db = setup_test_db();
    let result = commands::cmd_categories_add(&db, UserId::new(), "groceries", None);
    assert!(result.is_err());
}

// ========== Upload / Show / List ==========

#[tokio::test]
async fn test_cmd_upload() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let user = UserId::new();
    let file = write_statement(&dir, "april.pdf");

    commands::cmd_upload(&service, user, &file, false)
        .await
        .unwrap();

    let imports = service.list_for_user(user).unwrap();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].file_name, "april.pdf");
    assert_eq!(imports[0].status, ImportStatus::PendingReview);
    assert_eq!(imports[0].transaction_count, 3);
}

#[tokio::test]
async fn test_cmd_upload_json() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let file = write_statement(&dir, "april.pdf");

    assert!(commands::cmd_upload(&service, UserId::new(), &file, true)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_cmd_upload_rejects_wrong_extension() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let user = UserId::new();
    let file = write_statement(&dir, "april.csv");

    let err = commands::cmd_upload(&service, user, &file, false)
        .await
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<tally_core::Error>().map(|e| e.code()),
        Some("invalid_input")
    );
    assert!(service.list_for_user(user).unwrap().is_empty());
}

#[tokio::test]
async fn test_cmd_upload_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let missing = dir.path().join("missing.pdf");

    assert!(commands::cmd_upload(&service, UserId::new(), &missing, false)
        .await
        .is_err());
}

#[tokio::test]
async fn test_cmd_show_and_list() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let user = UserId::new();
    let upload = upload_one(&service, user).await;

    let id = upload.id.to_string();
    assert!(commands::cmd_show(&service, user, &id, false).is_ok());
    assert!(commands::cmd_show(&service, user, &id, true).is_ok());
    assert!(commands::cmd_list(&service, user, false).is_ok());
    assert!(commands::cmd_list(&service, user, true).is_ok());
}

#[tokio::test]
async fn test_cmd_show_other_users_import() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let upload = upload_one(&service, UserId::new()).await;

    let err = commands::cmd_show(&service, UserId::new(), &upload.id.to_string(), false)
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<tally_core::Error>().map(|e| e.code()),
        Some("forbidden")
    );
}

#[test]
fn test_cmd_list_empty() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    assert!(commands::cmd_list(&service, UserId::new(), false).is_ok());
}

// ========== Categorize ==========

#[tokio::test]
async fn test_find_line() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let upload = upload_one(&service, UserId::new()).await;

    assert_eq!(
        commands::find_line(&upload, "2").unwrap(),
        upload.transactions[1].id
    );
    let by_id = upload.transactions[2].id.to_string();
    assert_eq!(
        commands::find_line(&upload, &by_id).unwrap(),
        upload.transactions[2].id
    );
    assert!(commands::find_line(&upload, "0").is_err());
    assert!(commands::find_line(&upload, "4").is_err());
    assert!(commands::find_line(&upload, "first").is_err());
}

#[tokio::test]
async fn test_cmd_categorize_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let user = UserId::new();
    let upload = upload_one(&service, user).await;

    commands::cmd_categorize(&service, user, &upload.id.to_string(), "1", "shopping").unwrap();

    let stored = service.get_by_id(upload.id, user).unwrap();
    let shopping = service
        .categories(user)
        .unwrap()
        .into_iter()
        .find(|c| c.name == "Shopping")
        .unwrap();
    assert_eq!(stored.transactions[0].confirmed_category_id, Some(shopping.id));
    assert_eq!(stored.transactions[0].effective_category_id(), shopping.id);
    // Other lines keep their suggestion
    assert!(stored.transactions[1].confirmed_category_id.is_none());
}

#[tokio::test]
async fn test_cmd_categorize_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let user = UserId::new();
    let upload = upload_one(&service, user).await;
    let travel = service
        .categories(user)
        .unwrap()
        .into_iter()
        .find(|c| c.name == "Travel")
        .unwrap();

    commands::cmd_categorize(
        &service,
        user,
        &upload.id.to_string(),
        "2",
        &travel.id.to_string(),
    )
    .unwrap();

    let stored = service.get_by_id(upload.id, user).unwrap();
    assert_eq!(stored.transactions[1].confirmed_category_id, Some(travel.id));
}

#[tokio::test]
async fn test_cmd_categorize_unknown_category() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let user = UserId::new();
    let upload = upload_one(&service, user).await;

    let result =
        commands::cmd_categorize(&service, user, &upload.id.to_string(), "1", "zzqx");
    assert!(result.is_err());

    let stored = service.get_by_id(upload.id, user).unwrap();
    assert!(stored
        .transactions
        .iter()
        .all(|t| t.confirmed_category_id.is_none()));
}

// ========== Confirm / Cancel / Resume ==========

#[tokio::test]
async fn test_cmd_confirm_books_into_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let user = UserId::new();
    let upload = upload_one(&service, user).await;

    commands::cmd_confirm(&service, user, &upload.id.to_string())
        .await
        .unwrap();

    let stored = service.get_by_id(upload.id, user).unwrap();
    assert_eq!(stored.status, ImportStatus::Confirmed);

    let ledger = service.db().list_ledger_transactions(user).unwrap();
    assert_eq!(ledger.len(), 3);

    // Nothing left to deliver
    let delivered = service.resume_confirmation(upload.id, user).await.unwrap();
    assert_eq!(delivered, 0);
    assert!(commands::cmd_resume(&service, user, &upload.id.to_string())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_cmd_confirm_twice_fails() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let user = UserId::new();
    let upload = upload_one(&service, user).await;
    let id = upload.id.to_string();

    commands::cmd_confirm(&service, user, &id).await.unwrap();
    let err = commands::cmd_confirm(&service, user, &id).await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<tally_core::Error>().map(|e| e.code()),
        Some("invalid_status")
    );
    assert_eq!(service.db().list_ledger_transactions(user).unwrap().len(), 3);
}

#[tokio::test]
async fn test_cmd_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let user = UserId::new();
    let upload = upload_one(&service, user).await;
    let id = upload.id.to_string();

    commands::cmd_cancel(&service, user, &id).unwrap();
    assert_eq!(
        service.get_by_id(upload.id, user).unwrap().status,
        ImportStatus::Cancelled
    );

    // A cancelled import cannot be confirmed
    assert!(commands::cmd_confirm(&service, user, &id).await.is_err());
    assert!(service.db().list_ledger_transactions(user).unwrap().is_empty());
}

#[tokio::test]
async fn test_cmd_resume_requires_confirmed() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let user = UserId::new();
    let upload = upload_one(&service, user).await;

    assert!(commands::cmd_resume(&service, user, &upload.id.to_string())
        .await
        .is_err());
}

// ========== Audit ==========

#[tokio::test]
async fn test_cmd_audit() {
    let dir = tempfile::tempdir().unwrap();
    let service = setup_service(&dir);
    let user = UserId::new();
    let upload = upload_one(&service, user).await;
    commands::cmd_cancel(&service, user, &upload.id.to_string()).unwrap();

    let entries = service.db().list_audit_log(10).unwrap();
    assert!(entries.iter().any(|e| e.action == "upload"));
    assert!(entries.iter().any(|e| e.action == "cancel"));
    assert!(commands::cmd_audit(service.db(), 10).is_ok());
}
