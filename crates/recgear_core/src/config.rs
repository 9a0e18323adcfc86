use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "recgear/0.2";
pub const DEFAULT_API_URL: &str = "https://oldschool.runescape.wiki/api.php";
pub const DEFAULT_ARTICLE_PREFIX: &str = "https://oldschool.runescape.wiki/w/";
pub const DEFAULT_ACTIVITIES_CSV: &str = "data_to_import.csv";
pub const DEFAULT_OUTPUT_DIR: &str = "recs";
pub const DEFAULT_ITEM_CACHE: &str = "item_ids.cache.json";
pub const DEFAULT_REMEDIATION_FILE: &str = "items_that_need_special_handling.txt";
pub const DEFAULT_CATEGORY_CACHE_DIR: &str = ".recgear/cache";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RecgearConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub scrape: ScrapeSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub article_prefix: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ScrapeSection {
    pub activities_csv: Option<String>,
    pub output_dir: Option<String>,
    pub item_cache: Option<String>,
    pub remediation_file: Option<String>,
    pub category_cache_dir: Option<String>,
    pub use_cache: Option<bool>,
}

impl RecgearConfig {
    /// Resolve the wiki API URL: env WIKI_API_URL > config > DEFAULT_API_URL.
    pub fn api_url(&self) -> String {
        env_override("WIKI_API_URL")
            .or_else(|| self.wiki.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("WIKI_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// URL prefix stripped from activity links to get page titles.
    pub fn article_prefix(&self) -> &str {
        self.wiki
            .article_prefix
            .as_deref()
            .unwrap_or(DEFAULT_ARTICLE_PREFIX)
    }

    pub fn use_cache(&self) -> bool {
        self.scrape.use_cache.unwrap_or(true)
    }
}

/// Load and parse a RecgearConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<RecgearConfig> {
    if !config_path.exists() {
        return Ok(RecgearConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: RecgearConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
