//! AI backend response types
//!
//! Models are inconsistent about field names and value types, so lines are
//! deserialized loosely here and tightened into [`RawTransaction`] by the
//! parsing helpers.
//!
//! [`RawTransaction`]: crate::models::RawTransaction

use serde::Deserialize;

/// One statement line as a model emits it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementLine {
    #[serde(default, alias = "transaction_date")]
    pub date: Option<String>,
    #[serde(default, alias = "merchant")]
    pub description: Option<String>,
    /// Number or string ("42.10", "$1,234.00", "(12.00)")
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, alias = "category", alias = "suggested_category_name")]
    pub suggested_category: Option<String>,
    #[serde(default, alias = "original_line", alias = "raw")]
    pub original_text: Option<String>,
}

/// Envelope the parse_statement prompt asks for
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementResponse {
    #[serde(default)]
    pub transactions: Vec<StatementLine>,
}
