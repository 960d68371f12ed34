//! Category command implementations

use anyhow::{Context, Result};
use tally_core::db::Database;
use tally_core::models::UserId;

use super::truncate;

pub fn cmd_categories_list(db: &Database, user: UserId) -> Result<()> {
    let categories = db.available_categories(user)?;

    if categories.is_empty() {
        println!("No categories yet. Run:");
        println!("  tally init");
        return Ok(());
    }

    println!();
    println!("🏷️  Categories");
    println!("   ─────────────────────────────────────────────────────────────");

    for category in categories {
        let scope = if category.is_system() { "system" } else { "yours" };
        println!(
            "   {:24} │ {:6} │ {}",
            truncate(&category.name, 24),
            scope,
            category.description.as_deref().unwrap_or("")
        );
    }

    Ok(())
}

pub fn cmd_categories_add(
    db: &Database,
    user: UserId,
    name: &str,
    description: Option<&str>,
) -> Result<()> {
    let category = db
        .create_user_category(user, name, description)
        .with_context(|| format!("Failed to add category '{}'", name))?;

    println!("✅ Added category: {}", category.name);
    Ok(())
}
