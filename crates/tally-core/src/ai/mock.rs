//! Mock backend for testing
//!
//! Parses statement text offline by picking out lines that end in an amount.
//! Useful for unit tests, demos and development without a running LLM server.
//! Summary rows are returned too, just like a real model often does.

use std::str::FromStr;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::{Category, RawTransaction};

use super::parsing::parse_date;
use super::StatementParser;

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:(?P<date>\d{1,2}/\d{1,2}(?:/\d{2,4})?|\d{4}-\d{2}-\d{2})\s+)?(?P<desc>.*?)\s*(?P<amount>-?\$?-?[\d,]+\.\d{2})$",
        )
        .expect("valid regex")
    })
}

/// Mock AI backend for testing
#[derive(Clone)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self { healthy: true }
    }

    pub fn unhealthy() -> Self {
        Self { healthy: false }
    }

    /// Pull "[date] description amount" lines out of statement text
    ///
    /// Lines without a date get today's date; "MM/DD" dates get this year.
    pub fn extract_lines(statement_text: &str) -> Vec<RawTransaction> {
        let today = Utc::now().date_naive();
        statement_text
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                let caps = line_pattern().captures(line)?;
                let description = caps.name("desc")?.as_str().trim().to_string();
                if description.is_empty() {
                    return None;
                }
                let amount_str: String = caps
                    .name("amount")?
                    .as_str()
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                    .collect();
                let amount = Decimal::from_str(&amount_str).ok()?;
                let date = match caps.name("date") {
                    Some(d) => mock_date(d.as_str(), today.year())?,
                    None => today,
                };
                Some(RawTransaction {
                    date,
                    suggested_category: guess_category(&description).map(str::to_string),
                    description,
                    amount,
                    currency: None,
                    original_text: line.to_string(),
                })
            })
            .collect()
    }
}

fn mock_date(s: &str, current_year: i32) -> Option<NaiveDate> {
    parse_date(s).or_else(|| parse_date(&format!("{}/{}", s, current_year)))
}

/// Keyword category guesses for well-known merchants
fn guess_category(description: &str) -> Option<&'static str> {
    let d = description.to_uppercase();
    let guess = match d.as_str() {
        m if m.contains("WALMART") || m.contains("KROGER") || m.contains("TRADER JOE") => {
            "Groceries"
        }
        m if m.contains("WHOLE FOODS") || m.contains("SAFEWAY") => "Groceries",
        m if m.contains("STARBUCKS") || m.contains("PEET") => "Coffee",
        m if m.contains("UBER") || m.contains("LYFT") => "Uber",
        m if m.contains("CVS") || m.contains("WALGREENS") => "Pharmacy",
        m if m.contains("MARRIOTT") || m.contains("HILTON") => "Hotel",
        m if m.contains("IKEA") => "Furniture",
        m if m.contains("PLANET FITNESS") => "Gym",
        m if m.contains("CHIPOTLE") || m.contains("RESTAURANT") => "Restaurant",
        _ => return None,
    };
    Some(guess)
}

#[async_trait]
impl StatementParser for MockBackend {
    async fn parse_statement(
        &self,
        statement_text: &str,
        _categories: &[Category],
    ) -> Result<Vec<RawTransaction>> {
        Ok(Self::extract_lines(statement_text))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
