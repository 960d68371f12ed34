//! Category operations
//!
//! System categories are shared by every user; user categories are visible
//! only to their owner. Names are unique per scope, case-insensitively.

use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use super::{parse_column, Database};
use crate::error::{Error, Result};
use crate::models::{Category, CategoryId, CategoryScope, UserId};

/// Default system taxonomy: (name, description)
pub const SYSTEM_CATEGORIES: &[(&str, &str)] = &[
    ("Miscellaneous", "Anything that fits nowhere else"),
    ("Groceries", "Supermarkets and food for home"),
    ("Dining Out", "Restaurants, takeout and delivery"),
    ("Coffee & Tea", "Cafes and coffee shops"),
    ("Fitness", "Gyms, classes and sports"),
    ("Rideshare", "Uber, Lyft and taxis"),
    ("Transportation", "Fuel, parking, transit and tolls"),
    ("Healthcare", "Pharmacies, doctors and dental"),
    ("Travel", "Hotels, flights and vacation rentals"),
    ("Home Goods", "Furniture, decor and household items"),
    ("Utilities", "Electric, water, internet and phone"),
    ("Entertainment", "Streaming, movies, games and events"),
    ("Shopping", "General retail"),
    ("Subscriptions", "Recurring software and memberships"),
];

fn row_to_category(row: &Row) -> rusqlite::Result<Category> {
    let id: String = row.get(0)?;
    let owner: Option<String> = row.get(3)?;
    let scope = match owner {
        Some(user) => CategoryScope::User(parse_column(3, &user)?),
        None => CategoryScope::System,
    };
    Ok(Category {
        id: parse_column(0, &id)?,
        name: row.get(1)?,
        description: row.get(2)?,
        scope,
    })
}

impl Database {
    /// Install the system taxonomy, skipping names that already exist
    ///
    /// Returns the number of categories inserted.
    pub fn seed_system_categories(&self) -> Result<usize> {
        let conn = self.conn()?;
        let mut inserted = 0;

        for (name, description) in SYSTEM_CATEGORIES {
            inserted += conn.execute(
                r#"
                INSERT OR IGNORE INTO categories (id, name, description, user_id)
                VALUES (?, ?, ?, NULL)
                "#,
                params![CategoryId::new().to_string(), name, description],
            )?;
        }

        if inserted > 0 {
            info!(inserted, "Seeded system categories");
        }
        Ok(inserted)
    }

    /// Create a category owned by one user
    ///
    /// Rejected when the name is blank or already visible to the user.
    pub fn create_user_category(
        &self,
        user_id: UserId,
        name: &str,
        description: Option<&str>,
    ) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Category name cannot be empty".into()));
        }

        let conn = self.conn()?;

        let existing: Option<String> = conn
            .query_row(
                r#"
                SELECT id FROM categories
                WHERE name = ? COLLATE NOCASE AND (user_id IS NULL OR user_id = ?)
                "#,
                params![name, user_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(Error::Validation(format!(
                "Category '{}' already exists",
                name
            )));
        }

        let category = Category {
            id: CategoryId::new(),
            name: name.to_string(),
            description: description.map(str::to_string),
            scope: CategoryScope::User(user_id),
        };

        conn.execute(
            "INSERT INTO categories (id, name, description, user_id) VALUES (?, ?, ?, ?)",
            params![
                category.id.to_string(),
                category.name,
                category.description,
                user_id.to_string()
            ],
        )?;

        Ok(category)
    }

    /// Categories visible to a user: system first, then the user's own, each by name
    pub fn available_categories(&self, user_id: UserId) -> Result<Vec<Category>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, name, description, user_id
            FROM categories
            WHERE user_id IS NULL OR user_id = ?
            ORDER BY (user_id IS NOT NULL), name COLLATE NOCASE
            "#,
        )?;

        let categories = stmt
            .query_map(params![user_id.to_string()], row_to_category)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(categories)
    }

    /// Get a category by ID
    pub fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        let conn = self.conn()?;

        let category = conn
            .query_row(
                "SELECT id, name, description, user_id FROM categories WHERE id = ?",
                params![id.to_string()],
                row_to_category,
            )
            .optional()?;

        Ok(category)
    }
}
