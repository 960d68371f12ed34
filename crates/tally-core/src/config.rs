//! Import configuration
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/tally/config/import.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Keys missing from an override keep their embedded default.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/import.toml");

/// Settings for the import pipeline
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Accepted document extension, without the dot
    pub accepted_extension: String,
    /// Upper bound on the uploaded document size
    pub max_size_bytes: usize,
    /// Category used when resolution finds nothing
    pub fallback_category: String,
    /// Shortest name that may take part in substring matching
    pub min_substring_len: usize,
    /// Currency assumed when the parser does not report one
    pub default_currency: String,
    /// Upper bound on a single parsing-service call
    pub parse_timeout: Duration,
    /// Lowercased statement vocabulary -> canonical category name
    pub synonyms: BTreeMap<String, String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        // The embedded file is part of the build; a parse failure is a packaging bug
        layer(Self::builtin(), DEFAULT_CONFIG).unwrap_or_else(|_| Self::builtin())
    }
}

impl ImportConfig {
    /// Load from the default override location, falling back to embedded defaults
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from an explicit override file
    pub fn from_path(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Parse a TOML document layered over the embedded defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }

    fn builtin() -> Self {
        Self {
            accepted_extension: "pdf".to_string(),
            max_size_bytes: 10 * 1024 * 1024,
            fallback_category: "Miscellaneous".to_string(),
            min_substring_len: 4,
            default_currency: "USD".to_string(),
            parse_timeout: Duration::from_secs(120),
            synonyms: BTreeMap::new(),
        }
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config").join("import.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<ImportConfig> {
    let path = match override_path {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path(),
    };

    match path {
        Some(p) if p.exists() => {
            let content = fs::read_to_string(&p)
                .map_err(|e| Error::Config(format!("Failed to read {}: {}", p.display(), e)))?;
            parse_config(&content)
        }
        _ => layer(ImportConfig::builtin(), DEFAULT_CONFIG),
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    upload: Option<RawUpload>,
    categories: Option<RawCategories>,
    parsing: Option<RawParsing>,
    synonyms: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct RawUpload {
    accepted_extension: Option<String>,
    max_size_bytes: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawCategories {
    fallback_name: Option<String>,
    min_substring_len: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawParsing {
    default_currency: Option<String>,
    timeout_secs: Option<u64>,
}

/// Parse an override document on top of the embedded defaults
fn parse_config(content: &str) -> Result<ImportConfig> {
    layer(ImportConfig::default(), content)
}

fn layer(mut config: ImportConfig, content: &str) -> Result<ImportConfig> {
    let raw: RawConfig =
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    if let Some(upload) = raw.upload {
        if let Some(ext) = upload.accepted_extension {
            config.accepted_extension = ext.trim_start_matches('.').to_lowercase();
        }
        if let Some(max) = upload.max_size_bytes {
            config.max_size_bytes = max;
        }
    }

    if let Some(categories) = raw.categories {
        if let Some(name) = categories.fallback_name {
            config.fallback_category = name;
        }
        if let Some(len) = categories.min_substring_len {
            config.min_substring_len = len;
        }
    }

    if let Some(parsing) = raw.parsing {
        if let Some(currency) = parsing.default_currency {
            config.default_currency = currency.to_uppercase();
        }
        if let Some(secs) = parsing.timeout_secs {
            config.parse_timeout = Duration::from_secs(secs);
        }
    }

    if let Some(synonyms) = raw.synonyms {
        config.synonyms = synonyms
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();
    }

    if config.accepted_extension.is_empty() {
        return Err(Error::Config("upload.accepted_extension is empty".into()));
    }
    if config.max_size_bytes == 0 {
        return Err(Error::Config("upload.max_size_bytes must be positive".into()));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults() {
        let config = ImportConfig::default();
        assert_eq!(config.accepted_extension, "pdf");
        assert_eq!(config.max_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.fallback_category, "Miscellaneous");
        assert_eq!(config.min_substring_len, 4);
        assert_eq!(config.default_currency, "USD");
        assert_eq!(config.parse_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_embedded_synonym_table() {
        let synonyms = ImportConfig::default().synonyms;
        assert_eq!(synonyms.len(), 7);
        assert_eq!(synonyms["restaurant"], "Dining Out");
        assert_eq!(synonyms["gym"], "Fitness");
        assert_eq!(synonyms["coffee"], "Coffee & Tea");
        assert_eq!(synonyms["uber"], "Rideshare");
        assert_eq!(synonyms["pharmacy"], "Healthcare");
        assert_eq!(synonyms["hotel"], "Travel");
        assert_eq!(synonyms["furniture"], "Home Goods");
    }

    #[test]
    fn test_override_keeps_unspecified_defaults() {
        let config = ImportConfig::from_toml(
            r#"
            [upload]
            max_size_bytes = 2048

            [synonyms]
            Grocery = "Groceries"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_size_bytes, 2048);
        assert_eq!(config.accepted_extension, "pdf");
        assert_eq!(config.fallback_category, "Miscellaneous");
        // A synonyms table replaces the default one wholesale
        assert_eq!(config.synonyms.len(), 1);
        assert_eq!(config.synonyms["grocery"], "Groceries");
    }

    #[test]
    fn test_extension_is_normalized() {
        let config = ImportConfig::from_toml("[upload]\naccepted_extension = \".PDF\"").unwrap();
        assert_eq!(config.accepted_extension, "pdf");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            ImportConfig::from_toml("[upload]\nmax_size_bytes = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ImportConfig::from_toml("not = [valid"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_path_reads_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.toml");
        fs::write(&path, "[categories]\nfallback_name = \"Other\"").unwrap();
        let config = ImportConfig::from_path(&path).unwrap();
        assert_eq!(config.fallback_category, "Other");
    }

    #[test]
    fn test_from_path_missing_file_uses_defaults() {
        let config = ImportConfig::from_path(Path::new("/nonexistent/tally/import.toml")).unwrap();
        assert_eq!(config.fallback_category, "Miscellaneous");
    }
}
