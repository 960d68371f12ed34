//! Category resolution for AI-suggested labels
//!
//! The parsing service suggests free-text category names ("Restaurant",
//! "groceries", "Coffee Shop"). These have to land on a real category the user
//! can see. Resolution runs through ordered tiers and stops at the first hit:
//!
//! 1. Exact name (case-insensitive)
//! 2. Synonym table -> canonical name -> exact name
//! 3. Substring, in either direction, for names of at least `min_substring_len`
//!
//! Within a tier the first category in snapshot order wins. No match yields
//! `None`; the caller substitutes the fallback category.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::ImportConfig;
use crate::error::{Error, Result};
use crate::models::{Category, CategoryId};

/// Which tier produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Exact,
    Synonym,
    Substring,
}

/// Categories visible to one user, frozen for the duration of a pipeline run
#[derive(Debug, Clone, Default)]
pub struct CategorySnapshot {
    categories: Vec<Category>,
}

impl CategorySnapshot {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.categories.iter().any(|c| c.id == id)
    }

    /// First category whose name equals `name`, ignoring case
    pub fn find_by_name(&self, name: &str) -> Option<&Category> {
        let wanted = name.trim().to_lowercase();
        self.categories
            .iter()
            .find(|c| c.name.trim().to_lowercase() == wanted)
    }

    /// Category used when resolution finds nothing
    ///
    /// The named fallback if the user can see it, else the first category.
    pub fn fallback_id(&self, fallback_name: &str) -> Result<CategoryId> {
        self.find_by_name(fallback_name)
            .or_else(|| self.categories.first())
            .map(|c| c.id)
            .ok_or(Error::NoCategories)
    }
}

/// Maps suggested names onto a [`CategorySnapshot`]
#[derive(Debug, Clone)]
pub struct CategoryResolver {
    synonyms: BTreeMap<String, String>,
    min_substring_len: usize,
}

impl CategoryResolver {
    pub fn new(synonyms: BTreeMap<String, String>, min_substring_len: usize) -> Self {
        let synonyms = synonyms
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();
        Self {
            synonyms,
            min_substring_len,
        }
    }

    pub fn from_config(config: &ImportConfig) -> Self {
        Self::new(config.synonyms.clone(), config.min_substring_len)
    }

    /// Resolve a suggested name, or `None` when nothing matches confidently
    pub fn resolve(&self, suggested: Option<&str>, snapshot: &CategorySnapshot) -> Option<CategoryId> {
        self.resolve_with_tier(suggested, snapshot).map(|(id, _)| id)
    }

    /// Like [`resolve`](Self::resolve), also reporting the tier that matched
    pub fn resolve_with_tier(
        &self,
        suggested: Option<&str>,
        snapshot: &CategorySnapshot,
    ) -> Option<(CategoryId, MatchTier)> {
        let suggested = suggested.map(str::trim).filter(|s| !s.is_empty())?;

        if let Some(category) = snapshot.find_by_name(suggested) {
            return Some((category.id, MatchTier::Exact));
        }

        let key = suggested.to_lowercase();
        if let Some(canonical) = self.synonyms.get(&key) {
            if let Some(category) = snapshot.find_by_name(canonical) {
                debug!(suggested, canonical = %canonical, "Resolved category via synonym");
                return Some((category.id, MatchTier::Synonym));
            }
        }

        self.substring_match(&key, snapshot).map(|category| {
            debug!(suggested, category = %category.name, "Resolved category via substring");
            (category.id, MatchTier::Substring)
        })
    }

    fn substring_match<'a>(
        &self,
        suggested_lower: &str,
        snapshot: &'a CategorySnapshot,
    ) -> Option<&'a Category> {
        let suggested_long_enough = suggested_lower.chars().count() >= self.min_substring_len;
        snapshot.categories().iter().find(|category| {
            let name = category.name.trim().to_lowercase();
            if name.is_empty() {
                return false;
            }
            let name_long_enough = name.chars().count() >= self.min_substring_len;
            (name_long_enough && suggested_lower.contains(&name))
                || (suggested_long_enough && name.contains(suggested_lower))
        })
    }
}

impl Default for CategoryResolver {
    fn default() -> Self {
        Self::from_config(&ImportConfig::default())
    }
}
