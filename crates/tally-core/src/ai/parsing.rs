//! JSON parsing helpers for AI backend responses
//!
//! Models often wrap the JSON payload in prose or code fences, so the payload
//! is located first and then deserialized. Lines missing a usable date,
//! description or amount are dropped rather than failing the whole statement.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::RawTransaction;

use super::types::{StatementLine, StatementResponse};

// Two-digit years first: %Y would happily read "24" as year 24
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d", "%d %b %Y"];

/// Parse the statement-extraction response into candidate transactions
///
/// Accepts `{"transactions": [...]}` or a bare array.
pub fn parse_statement_response(response: &str) -> Result<Vec<RawTransaction>> {
    let json_str = extract_json(response)?;

    let lines: Vec<StatementLine> = if json_str.starts_with('[') {
        serde_json::from_str(json_str)
    } else {
        serde_json::from_str::<StatementResponse>(json_str).map(|r| r.transactions)
    }
    .map_err(|e| {
        Error::Parsing(format!(
            "Invalid JSON from AI: {} | Raw: {}",
            e,
            truncate(json_str, 200)
        ))
    })?;

    let total = lines.len();
    let transactions: Vec<RawTransaction> = lines.into_iter().filter_map(into_raw).collect();
    if transactions.len() < total {
        debug!(
            dropped = total - transactions.len(),
            kept = transactions.len(),
            "Dropped unusable lines from AI response"
        );
    }
    Ok(transactions)
}

/// Locate the outermost JSON object or array in a model response
fn extract_json(response: &str) -> Result<&str> {
    let response = response.trim();

    let object = match (response.find('{'), response.rfind('}')) {
        (Some(s), Some(e)) if s < e => Some((s, e)),
        _ => None,
    };
    let array = match (response.find('['), response.rfind(']')) {
        (Some(s), Some(e)) if s < e => Some((s, e)),
        _ => None,
    };

    // Whichever opens first is the outer value
    let bounds = match (object, array) {
        (Some(o), Some(a)) => Some(if a.0 < o.0 { a } else { o }),
        (o, a) => o.or(a),
    };

    bounds
        .map(|(s, e)| &response[s..=e])
        .ok_or_else(|| {
            Error::Parsing(format!(
                "No JSON found in AI response | Raw: {}",
                truncate(response, 200)
            ))
        })
}

fn into_raw(line: StatementLine) -> Option<RawTransaction> {
    let description = line
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())?;
    let date = line.date.as_deref().and_then(parse_date)?;
    let amount = line.amount.as_ref().and_then(parse_amount)?;

    let original_text = line
        .original_text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| description.clone());

    Some(RawTransaction {
        date,
        description,
        amount,
        currency: line
            .currency
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty()),
        suggested_category: line
            .suggested_category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
        original_text,
    })
}

/// Parse a statement date in the handful of layouts models produce
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parse an amount from a JSON number or a formatted string
///
/// Handles currency symbols, thousands separators, and accounting-style
/// parentheses for negatives.
pub fn parse_amount(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        serde_json::Value::String(s) => parse_amount_str(s),
        _ => None,
    }
}

fn parse_amount_str(s: &str) -> Option<Decimal> {
    let trimmed = s.trim();
    let negative = trimmed.starts_with('-') || (trimmed.starts_with('(') && trimmed.ends_with(')'));
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let amount = Decimal::from_str(&cleaned).ok()?;
    Some(if negative { -amount } else { amount })
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}
