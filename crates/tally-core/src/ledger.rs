//! Downstream bookkeeping ledger contract
//!
//! Confirmed imports hand each line to the ledger exactly as reviewed. The
//! idempotency key is stable per `(upload, line)`, so implementations must
//! treat a repeated key as success without creating a second transaction.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{LedgerEntry, TransactionId, UploadId};

/// Transaction creation collaborator
#[async_trait]
pub trait TransactionCreator: Send + Sync {
    async fn create(&self, entry: &LedgerEntry, idempotency_key: &str) -> Result<()>;
}

#[async_trait]
impl<T: TransactionCreator + ?Sized> TransactionCreator for Arc<T> {
    async fn create(&self, entry: &LedgerEntry, idempotency_key: &str) -> Result<()> {
        (**self).create(entry, idempotency_key).await
    }
}

/// Key used for one confirmed line
pub fn idempotency_key(upload_id: UploadId, transaction_id: TransactionId) -> String {
    format!("{}:{}", upload_id, transaction_id)
}
