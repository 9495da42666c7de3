//! Configuration module.
//!
//! Handles loading, validating, and merging `storyfront.toml`. Stock defaults
//! are overridden by the user file key-by-key, so the file only needs the
//! values it wants to change. A missing file means stock defaults.
//!
//! ## Configuration Options
//!
//! ```toml
//! [source]
//! base_url = "https://api.webflow.com/v2"
//! collection_id = ""          # or WEBFLOW_COLLECTION_ID
//! page_size = 100             # 1-100
//! api_version = "2.0.0"
//! # timeout_secs = 30
//!
//! [cache]
//! path = "cache/stories.json"
//! freshness_secs = 3600
//!
//! [page]
//! template = "dynamic-pages/template.html"
//! output = "dynamic-pages/home.html"
//! section_size = 4
//! story_path = "/stories/"
//! category_path = "/categories/"
//! read_on_image = "https://..."
//! strip_badges = false
//!
//! [regions]
//! cover = ".landingcoverwrapper .coversection"
//! featured_mobile = ".storywrapperfeatonly .storyitem"
//! related = ".content-section .landingstorysection"
//! sections_container = ".pagewrapper"
//!
//! [[categories]]
//! name = "Nature"
//! tags = ["612d7acb4f8d5a7e91be840a", "612d82770d2a5222be716c6f"]
//! # hook = "#nature .landingstorysection"
//!
//! [people.authors]
//! 612e683242673a05f052db42 = "Krystina Castella"
//! ```
//!
//! ## Secrets and environment
//!
//! The API token is never read from the file. It comes from
//! `WEBFLOW_API_TOKEN`; `WEBFLOW_COLLECTION_ID` overrides
//! `source.collection_id`. The binary loads a `.env` file first.
//!
//! Unknown keys are rejected to catch typos early. A user `[[categories]]`
//! list replaces the stock list as a whole.

use crate::fetch::MAX_PAGE_SIZE;
use crate::template::Selector;
use crate::types::Category;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "storyfront.toml";
/// Bearer token for the CMS API.
pub const TOKEN_ENV: &str = "WEBFLOW_API_TOKEN";
/// Overrides `source.collection_id`.
pub const COLLECTION_ENV: &str = "WEBFLOW_COLLECTION_ID";

const READ_ON_IMAGE: &str = "https://cdn.prod.website-files.com/611592871745f6ed8d8306bc/614f085fb7876ca33c1520d6_Read%20On%20Button.svg";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("{0} is not set")]
    MissingEnv(&'static str),
}

/// Configuration loaded from `storyfront.toml`.
///
/// All fields have defaults matching the production site. Unknown keys are
/// rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Upstream CMS collection.
    pub source: SourceConfig,
    /// Local story cache.
    pub cache: CacheConfig,
    /// Template, output, and rendering settings.
    pub page: PageConfig,
    /// Template hook selectors.
    pub regions: RegionsConfig,
    /// Category sections, in page order.
    pub categories: Vec<Category>,
    /// Display names for author and photographer ids.
    pub people: PeopleConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            cache: CacheConfig::default(),
            page: PageConfig::default(),
            regions: RegionsConfig::default(),
            categories: default_categories(),
            people: PeopleConfig::default(),
        }
    }
}

fn default_categories() -> Vec<Category> {
    vec![
        Category::new(
            "Roadside Attractions",
            &["612d7ad69511a722188af085", "612d7ae98938e83e79ae337c"],
        ),
        Category::new(
            "Nature",
            &["612d7acb4f8d5a7e91be840a", "612d82770d2a5222be716c6f"],
        ),
        Category::new(
            "Play",
            &["612d7a69be08433c0906cf70", "612d7a40ea4449035d215cd7"],
        ),
    ]
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.source.page_size) {
            return Err(ConfigError::Validation(format!(
                "source.page_size must be 1-{MAX_PAGE_SIZE}"
            )));
        }
        if self.source.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "source.base_url must not be empty".into(),
            ));
        }
        if self.page.section_size == 0 {
            return Err(ConfigError::Validation(
                "page.section_size must be non-zero".into(),
            ));
        }
        if self.cache.freshness_secs == 0 {
            return Err(ConfigError::Validation(
                "cache.freshness_secs must be non-zero".into(),
            ));
        }

        let mut names = HashSet::new();
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "categories.name must not be empty".into(),
                ));
            }
            if !names.insert(category.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate category {:?}",
                    category.name
                )));
            }
            if category.tags.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "category {:?} has no tags",
                    category.name
                )));
            }
            check_selector(&format!("hook of category {:?}", category.name), &category.hook())?;
        }

        check_selector("regions.cover", &self.regions.cover)?;
        check_selector("regions.featured_mobile", &self.regions.featured_mobile)?;
        check_selector("regions.related", &self.regions.related)?;
        if let Some(container) = self.regions.sections_container() {
            check_selector("regions.sections_container", container)?;
        }
        Ok(())
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in the binary.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup(COLLECTION_ENV).filter(|id| !id.trim().is_empty()) {
            self.source.collection_id = id.trim().to_string();
        }
    }
}

fn check_selector(what: &str, selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::Validation(format!("{what}: {e}")))
}

/// Read the API token through `lookup`.
pub fn api_token<F>(lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(TOKEN_ENV)
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or(ConfigError::MissingEnv(TOKEN_ENV))
}

/// Process environment lookup for [`SiteConfig::apply_env_overrides`] and
/// [`api_token`].
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Upstream CMS collection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// API root; the items endpoint is `<base_url>/collections/<id>/items`.
    pub base_url: String,
    pub collection_id: String,
    /// Items per request. The upstream caps this at 100.
    pub page_size: usize,
    /// Sent as the `accept-version` header.
    pub api_version: String,
    /// Per-request timeout. No timeout when absent.
    pub timeout_secs: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.webflow.com/v2".to_string(),
            collection_id: String::new(),
            page_size: MAX_PAGE_SIZE,
            api_version: "2.0.0".to_string(),
            timeout_secs: None,
        }
    }
}

impl SourceConfig {
    /// The collection id, or an error naming both ways to set it.
    pub fn require_collection_id(&self) -> Result<&str, ConfigError> {
        match self.collection_id.trim() {
            "" => Err(ConfigError::Validation(format!(
                "source.collection_id is empty (set it in the config file or {COLLECTION_ENV})"
            ))),
            id => Ok(id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub path: PathBuf,
    /// Maximum age, in seconds, of a reusable cache record.
    pub freshness_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cache/stories.json"),
            freshness_secs: crate::cache::DEFAULT_FRESHNESS_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageConfig {
    pub template: PathBuf,
    pub output: PathBuf,
    /// Stories per related list and per category section.
    pub section_size: usize,
    /// Story links are `<story_path><slug>`.
    pub story_path: String,
    /// "More ..." links are `<category_path><category slug>`.
    pub category_path: String,
    /// Image inside each card's read-on link. Empty renders a text link.
    pub read_on_image: String,
    /// Remove the CMS "made in" badge from the output.
    pub strip_badges: bool,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            template: PathBuf::from("dynamic-pages/template.html"),
            output: PathBuf::from("dynamic-pages/home.html"),
            section_size: crate::select::DEFAULT_SECTION_SIZE,
            story_path: "/stories/".to_string(),
            category_path: "/categories/".to_string(),
            read_on_image: READ_ON_IMAGE.to_string(),
            strip_badges: false,
        }
    }
}

/// Selectors of the template regions filled on every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegionsConfig {
    /// Desktop cover block for the featured story.
    pub cover: String,
    /// Mobile featured story card.
    pub featured_mobile: String,
    /// List of stories related to the featured one (first match).
    pub related: String,
    /// Where whole category sections are appended when a category's own
    /// hook is absent. Empty disables appending.
    pub sections_container: String,
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            cover: ".landingcoverwrapper .coversection".to_string(),
            featured_mobile: ".storywrapperfeatonly .storyitem".to_string(),
            related: ".content-section .landingstorysection".to_string(),
            sections_container: ".pagewrapper".to_string(),
        }
    }
}

impl RegionsConfig {
    pub fn sections_container(&self) -> Option<&str> {
        Some(self.sections_container.trim()).filter(|s| !s.is_empty())
    }
}

/// Id to display-name tables. Unknown ids render as the raw id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PeopleConfig {
    pub authors: BTreeMap<String, String>,
    pub photographers: BTreeMap<String, String>,
}

impl Default for PeopleConfig {
    fn default() -> Self {
        let krystina = "Krystina Castella".to_string();
        Self {
            authors: BTreeMap::from([("612e683242673a05f052db42".to_string(), krystina.clone())]),
            photographers: BTreeMap::from([
                ("612e693dc13e672b389de11c".to_string(), krystina),
                ("612e69221a4899ad4b38c7cf".to_string(), "Brian Boyl".to_string()),
            ]),
        }
    }
}

impl PeopleConfig {
    pub fn author<'a>(&'a self, id: &'a str) -> &'a str {
        self.authors.get(id).map_or(id, String::as_str)
    }

    pub fn photographer<'a>(&'a self, id: &'a str) -> &'a str {
        self.photographers.get(id).map_or(id, String::as_str)
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay, arrays included, replace base values.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. Environment overrides are applied separately.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `storyfront.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Storyfront Configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Secrets never go in this file:
#   WEBFLOW_API_TOKEN      bearer token for the CMS API (required to fetch)
#   WEBFLOW_COLLECTION_ID  overrides source.collection_id
# Both may also be set in a .env file next to this one.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Upstream collection
# ---------------------------------------------------------------------------
[source]
base_url = "https://api.webflow.com/v2"

# Collection holding the stories. Usually supplied via WEBFLOW_COLLECTION_ID.
collection_id = ""

# Items per request (1-100, the upstream maximum).
page_size = 100

# Sent as the accept-version header.
api_version = "2.0.0"

# Per-request timeout in seconds. No timeout when omitted.
# timeout_secs = 30

# ---------------------------------------------------------------------------
# Story cache
# ---------------------------------------------------------------------------
[cache]
path = "cache/stories.json"

# A cache record older than this is refetched.
freshness_secs = 3600

# ---------------------------------------------------------------------------
# Page rendering
# ---------------------------------------------------------------------------
[page]
template = "dynamic-pages/template.html"
output = "dynamic-pages/home.html"

# Stories in the related list and in each category section.
section_size = 4

# Story links are <story_path><slug>; "More ..." links are
# <category_path><category-name-slug>.
story_path = "/stories/"
category_path = "/categories/"

# Image inside each card's read-on link. Set to "" for a plain text link.
read_on_image = "https://cdn.prod.website-files.com/611592871745f6ed8d8306bc/614f085fb7876ca33c1520d6_Read%20On%20Button.svg"

# Remove the CMS badge link from the generated page.
strip_badges = false

# ---------------------------------------------------------------------------
# Template hooks (tag, .class, #id, [attr], [attr="value"], space = descendant)
# ---------------------------------------------------------------------------
[regions]
cover = ".landingcoverwrapper .coversection"
featured_mobile = ".storywrapperfeatonly .storyitem"
related = ".content-section .landingstorysection"

# Category sections whose own hook is missing are appended here.
# Set to "" to skip them instead.
sections_container = ".pagewrapper"

# ---------------------------------------------------------------------------
# People: id -> display name. Unknown ids are shown as-is.
# ---------------------------------------------------------------------------
[people.authors]
612e683242673a05f052db42 = "Krystina Castella"

[people.photographers]
612e693dc13e672b389de11c = "Krystina Castella"
612e69221a4899ad4b38c7cf = "Brian Boyl"

# ---------------------------------------------------------------------------
# Category sections, in page order. A story belongs to a category when it
# carries any of the listed tag ids. Each section fills the element matched
# by `hook` (default: [data-category="<name>"] .landingstorysection).
#
# Other categories in the collection:
#   Articles              666a6c762536fd5cf0bd7f33
#   Art & Design          612d7a8b8019a9e99c4a2852, 612d7a598052f46147a873dc
#   Outdoor Activities    612d7ab3be86e69bec316fd9, 615072e85bd34c10889710aa
# ---------------------------------------------------------------------------
[[categories]]
name = "Roadside Attractions"
tags = ["612d7ad69511a722188af085", "612d7ae98938e83e79ae337c"]

[[categories]]
name = "Nature"
tags = ["612d7acb4f8d5a7e91be840a", "612d82770d2a5222be716c6f"]

[[categories]]
name = "Play"
tags = ["612d7a69be08433c0906cf70", "612d7a40ea4449035d215cd7"]
"##
}
