//! Statement boilerplate filter
//!
//! Credit-card statements mix real purchases with summary rows: balances,
//! totals, fees, credit-limit and year-to-date lines. The parsing service does
//! not reliably drop them, so every candidate is checked here before it can
//! become a parsed transaction.
//!
//! The match is a blunt case-insensitive substring test against both the
//! description and the original statement text. Dropping a real purchase is
//! acceptable (the user can still see it in the PDF); letting a
//! "Total Purchases" row through corrupts every report built on the ledger.

use tracing::debug;

use crate::models::RawTransaction;

/// Phrase fragments that mark a line as statement boilerplate
pub const BOILERPLATE_PHRASES: &[&str] = &[
    // Balances
    "previous balance",
    "new balance",
    "statement balance",
    "balance transfer",
    "balance forward",
    "current balance",
    // Totals
    "total purchases",
    "total payments",
    "total fees",
    "total interest",
    "total credits",
    "total charges",
    "total new charges",
    "purchases and adjustments",
    // Payments
    "minimum payment due",
    "minimum payment",
    "payment due date",
    "payment received",
    "payment - thank you",
    "payment thank you",
    "autopay payment",
    // Fees and interest
    "finance charge",
    "interest charge",
    "late fee",
    "annual fee",
    "fees charged",
    "interest charged",
    // Informational
    "credit limit",
    "available credit",
    "cash advance limit",
    "year-to-date",
    "year to date",
    "ytd",
    "rewards balance",
    "points earned",
];

/// Whether a candidate line is statement boilerplate rather than a purchase
pub fn is_boilerplate(candidate: &RawTransaction) -> bool {
    contains_boilerplate(&candidate.description) || contains_boilerplate(&candidate.original_text)
}

fn contains_boilerplate(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let lower = text.to_lowercase();
    BOILERPLATE_PHRASES.iter().any(|phrase| {
        if phrase.len() <= 3 {
            // Short fragments ("ytd") must stand alone to avoid hitting merchant names
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word == *phrase)
        } else {
            lower.contains(phrase)
        }
    })
}

/// Outcome of filtering a batch of candidates
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    pub kept: Vec<RawTransaction>,
    pub excluded: usize,
}

/// Drop boilerplate rows, preserving the order of the rest
pub fn filter_boilerplate(candidates: Vec<RawTransaction>) -> FilterResult {
    let mut result = FilterResult::default();
    for candidate in candidates {
        if is_boilerplate(&candidate) {
            debug!(description = %candidate.description, "Excluding statement boilerplate row");
            result.excluded += 1;
        } else {
            result.kept.push(candidate);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn candidate(description: &str, original_text: &str) -> RawTransaction {
        RawTransaction {
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            description: description.to_string(),
            amount: "42.10".parse().unwrap(),
            currency: Some("USD".to_string()),
            suggested_category: None,
            original_text: original_text.to_string(),
        }
    }

    #[test]
    fn test_excludes_by_description_any_casing() {
        assert!(is_boilerplate(&candidate("Previous Balance", "")));
        assert!(is_boilerplate(&candidate("TOTAL PURCHASES", "")));
        assert!(is_boilerplate(&candidate("Minimum Payment Due", "")));
        assert!(is_boilerplate(&candidate("FINANCE CHARGE", "")));
        assert!(is_boilerplate(&candidate("Credit Limit", "")));
        assert!(is_boilerplate(&candidate("Fees charged year-to-date", "")));
        assert!(is_boilerplate(&candidate("Payment Received - Thank You", "")));
    }

    #[test]
    fn test_excludes_by_original_text_only() {
        let row = candidate("Statement line", "Total Purchases: $1,532.00");
        assert!(is_boilerplate(&row));
    }

    #[test]
    fn test_transaction_like_line_with_phrase_is_still_excluded() {
        let row = candidate("WALMART #1234", "01/15 WALMART #1234 previous balance 42.10");
        assert!(is_boilerplate(&row));
    }

    #[test]
    fn test_keeps_ordinary_merchants() {
        for name in [
            "Trader Joe's",
            "Uber Trip",
            "WALMART $42.10",
            "Starbucks",
            "Netflix.com",
            "Amazon Marketplace",
            "Whole Foods Market",
            "Shell Oil 5744",
            "Total Wine & More",
        ] {
            assert!(!is_boilerplate(&candidate(name, name)), "{} was excluded", name);
        }
    }

    #[test]
    fn test_short_fragment_requires_whole_word() {
        assert!(is_boilerplate(&candidate("Interest YTD", "")));
        assert!(!is_boilerplate(&candidate("YTDESIGNS STUDIO", "")));
    }

    #[test]
    fn test_filter_preserves_order_and_counts_exclusions() {
        let result = filter_boilerplate(vec![
            candidate("WALMART", "WALMART $42.10"),
            candidate("Previous Balance", "Previous Balance $120.00"),
            candidate("Uber Trip", "UBER *TRIP 14.00"),
        ]);
        assert_eq!(result.excluded, 1);
        let kept: Vec<&str> = result.kept.iter().map(|c| c.description.as_str()).collect();
        assert_eq!(kept, vec!["WALMART", "Uber Trip"]);
    }
}
