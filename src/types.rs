//! Shared types used across all pipeline stages.
//!
//! A [`Story`] is what the CMS calls a collection item. It is serialized
//! verbatim into the cache file, so the field names here follow the upstream
//! JSON shape (`id`, `slug`, `fieldData`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known keys inside a story's `fieldData`.
pub mod fields {
    pub const TITLE: &str = "main-title";
    pub const SUBTITLE: &str = "subtitle";
    pub const SUMMARY: &str = "content-summary";
    pub const THUMBNAIL: &str = "big-thumbnail";
    pub const MAIN_IMAGE: &str = "main-image";
    pub const AUTHOR: &str = "author";
    pub const PHOTOGRAPHER: &str = "photographer";
    pub const TAGS: &str = "tags";
    /// Canonical featured flag, written by [`super::FieldData::normalize_featured`].
    pub const FEATURED: &str = "featured";
    /// Upstream spelling variant, folded into [`FEATURED`] at ingestion.
    pub const FEATURED_VARIANT: &str = "Featured";
}

/// A single content item from the CMS collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    /// URL-safe name; outbound links are built from it.
    #[serde(default)]
    pub slug: String,
    /// Older API versions call this `fields`.
    #[serde(alias = "fields")]
    pub field_data: FieldData,
}

impl Story {
    pub fn title(&self) -> &str {
        self.field_data.text(fields::TITLE).unwrap_or_default()
    }

    pub fn is_featured(&self) -> bool {
        self.field_data.is_featured()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.field_data.tags()
    }

    /// True when the story carries at least one of `tags`.
    pub fn has_any_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        self.tags()
            .any(|tag| tags.iter().any(|wanted| wanted.as_ref() == tag))
    }

    /// Human-readable label for logs and CLI output.
    pub fn label(&self) -> &str {
        match self.title() {
            "" => self.id.as_str(),
            title => title,
        }
    }

    pub fn normalize(&mut self) {
        self.field_data.normalize_featured();
    }
}

/// Normalize every story in place. Called wherever stories enter the
/// process (fetch and cache read), never at read sites.
pub fn normalize_stories(stories: &mut [Story]) {
    for story in stories {
        story.normalize();
    }
}

/// Named field values of a story.
///
/// Kept as a raw JSON object: the collection schema belongs to the CMS, and
/// the renderer only needs a handful of well-known keys (see [`fields`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldData(Map<String, Value>);

impl FieldData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// A string field, or `None` when absent, null, or not a string.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// The `url` attribute of a media field (`{"url": "..."}`).
    pub fn media_url(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|media| media.get("url"))
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
    }

    /// Tag identifiers; non-string entries are ignored.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.0
            .get(fields::TAGS)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    pub fn is_featured(&self) -> bool {
        self.0.get(fields::FEATURED).is_some_and(is_truthy)
    }

    /// Fold `Featured` into the canonical `featured` field.
    ///
    /// `featured` wins when present and non-null; otherwise `Featured` is
    /// used. The result is stored as a JSON boolean and the variant key is
    /// removed. Stories carrying neither key are left untouched.
    pub fn normalize_featured(&mut self) {
        let variant = self.0.remove(fields::FEATURED_VARIANT);
        let canonical = self.0.get(fields::FEATURED).filter(|v| !v.is_null());
        let flag = match (canonical, &variant) {
            (Some(value), _) => is_truthy(value),
            (None, Some(value)) if !value.is_null() => is_truthy(value),
            _ => return,
        };
        self.0.insert(fields::FEATURED.to_string(), Value::Bool(flag));
    }
}

impl From<Map<String, Value>> for FieldData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Boolean-like interpretation used by the CMS: `true`, `"true"`, non-zero numbers.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

/// A named group of stories, defined by tag identifiers.
///
/// A story belongs to a category when its tags intersect `tags`; there is
/// no priority among matching tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Category {
    pub name: String,
    pub tags: Vec<String>,
    /// Template selector for this category's list container. When absent,
    /// `[data-category="<name>"] .landingstorysection` is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
}

impl Category {
    pub fn new(name: impl Into<String>, tags: &[&str]) -> Self {
        Self {
            name: name.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            hook: None,
        }
    }

    pub fn matches(&self, story: &Story) -> bool {
        story.has_any_tag(&self.tags)
    }

    /// Selector for the category's list container in the template.
    pub fn hook(&self) -> String {
        match &self.hook {
            Some(hook) => hook.clone(),
            None => format!(
                "[data-category=\"{}\"] .landingstorysection",
                self.name.replace('"', "\\\"")
            ),
        }
    }

    /// URL segment for the category's listing page: `Art & Design` → `art-&-design`.
    pub fn slug(&self) -> String {
        self.name
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
    }
}
