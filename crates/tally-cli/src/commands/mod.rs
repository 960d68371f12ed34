//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init, audit and shared utilities (open_db, resolve_user, service construction)
//! - `categories` - Category listing and personal categories
//! - `imports` - Statement import workflow (upload, show, list, categorize, confirm, cancel, resume)

pub mod categories;
pub mod core;
pub mod imports;

// Re-export command functions for main.rs
pub use categories::*;
pub use core::*;
pub use imports::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
