//! End-to-end generation runs against an in-memory collection.
//!
//! Drives [`storyfront::generate::generate`] through the public API with a
//! fake [`PageSource`], a real template file, and a real cache file in a
//! temp directory.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use storyfront::assemble::{Region, SkipReason};
use storyfront::config::SiteConfig;
use storyfront::fetch::{FetchError, Page, PageSource, Pagination};
use storyfront::generate::{GenerateError, GenerateOptions, StoryOrigin, generate};
use storyfront::types::{Category, Story};
use tempfile::TempDir;

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html><head><title>Home</title></head>
<body><div class="pagewrapper">
<div class="landingcoverwrapper"><div class="coversection">cover placeholder</div></div>
<div class="storywrapperfeatonly"><div class="storyitem">card placeholder</div></div>
<div class="content-section"><div class="landingstorysection">related placeholder</div></div>
<div data-category="Nature"><div class="landingstorysection">nature placeholder</div></div>
</div></body></html>"#;

/// Serves `stories` in pages, reporting the true total.
struct FakeSource {
    stories: Vec<Story>,
    fail_with: Option<u16>,
    calls: AtomicUsize,
}

impl FakeSource {
    fn new(stories: Vec<Story>) -> Self {
        Self {
            stories,
            fail_with: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(status: u16) -> Self {
        Self {
            fail_with: Some(status),
            ..Self::new(Vec::new())
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource for FakeSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Page, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.fail_with {
            return Err(FetchError::Upstream {
                status,
                body: "upstream unavailable".into(),
            });
        }
        let start = offset.min(self.stories.len());
        let end = (offset + limit).min(self.stories.len());
        Ok(Page {
            items: self.stories[start..end].to_vec(),
            pagination: Some(Pagination {
                total: Some(self.stories.len()),
                offset: Some(offset),
                limit: Some(limit),
            }),
        })
    }
}

fn story(id: &str, tags: &[&str], featured: bool) -> Story {
    serde_json::from_value(json!({
        "id": id,
        "slug": format!("slug-{id}"),
        "fieldData": {
            "main-title": format!("Title {id}"),
            "tags": tags,
            "Featured": featured,
        }
    }))
    .unwrap()
}

/// One featured lead tagged `n`, then stories tagged `n`, `p`, or both.
fn collection() -> Vec<Story> {
    let mut stories = vec![story("lead", &["n"], true)];
    for i in 0..12 {
        stories.push(story(&format!("n{i}"), &["n"], false));
        stories.push(story(&format!("p{i}"), &["p"], false));
        stories.push(story(&format!("np{i}"), &["n", "p"], false));
    }
    stories
}

fn site(tmp: &TempDir, template: &str) -> SiteConfig {
    let mut config = SiteConfig::default();
    config.source.page_size = 10;
    config.cache.path = tmp.path().join("cache/stories.json");
    config.page.template = tmp.path().join("template.html");
    config.page.output = tmp.path().join("dynamic-pages/home.html");
    config.categories = vec![Category::new("Nature", &["n"]), Category::new("Play", &["p"])];
    fs::write(&config.page.template, template).unwrap();
    config
}

fn seeded(seed: u64) -> GenerateOptions {
    GenerateOptions {
        seed: Some(seed),
        ..Default::default()
    }
}

// =========================================================================
// Selection through a full run
// =========================================================================

#[tokio::test]
async fn every_story_appears_at_most_once() {
    let tmp = TempDir::new().unwrap();
    let config = site(&tmp, TEMPLATE);
    let source = FakeSource::new(collection());

    let report = generate(&config, &source, &seeded(3)).await.unwrap();

    assert_eq!(report.stories, 37);
    assert_eq!(report.origin, StoryOrigin::Upstream);
    assert_eq!(report.selection.featured, "Title lead");
    assert_eq!(report.selection.related.len(), 4);

    let mut seen = HashSet::new();
    assert!(seen.insert(report.selection.featured.clone()));
    for label in report.selection.related.iter().chain(
        report
            .selection
            .sections
            .iter()
            .flat_map(|section| section.stories.iter()),
    ) {
        assert!(seen.insert(label.clone()), "{label} selected twice");
    }

    let html = fs::read_to_string(&config.page.output).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(!html.contains("placeholder"));
    assert!(html.contains(r#"data-category="Play""#));
    assert!(html.contains("More Play..."));
}

#[tokio::test]
async fn same_seed_same_page() {
    let tmp = TempDir::new().unwrap();
    let config = site(&tmp, TEMPLATE);
    let source = FakeSource::new(collection());

    let first = generate(&config, &source, &seeded(11)).await.unwrap();
    let first_html = fs::read_to_string(&config.page.output).unwrap();
    let second = generate(&config, &source, &seeded(11)).await.unwrap();
    let second_html = fs::read_to_string(&config.page.output).unwrap();

    assert_eq!(first.selection, second.selection);
    assert_eq!(first_html, second_html);
}

// =========================================================================
// Cache behavior
// =========================================================================

#[tokio::test]
async fn second_run_reads_cache() {
    let tmp = TempDir::new().unwrap();
    let config = site(&tmp, TEMPLATE);
    let source = FakeSource::new(collection());

    generate(&config, &source, &seeded(1)).await.unwrap();
    let fetches = source.calls();
    let report = generate(&config, &source, &seeded(1)).await.unwrap();

    assert_eq!(fetches, 4);
    assert_eq!(source.calls(), fetches);
    assert_eq!(report.origin, StoryOrigin::Cache);
    assert_eq!(report.stories, 37);
}

#[tokio::test]
async fn corrupt_cache_is_refetched_and_repaired() {
    let tmp = TempDir::new().unwrap();
    let config = site(&tmp, TEMPLATE);
    fs::create_dir_all(config.cache.path.parent().unwrap()).unwrap();
    fs::write(&config.cache.path, "{ not json").unwrap();
    let source = FakeSource::new(collection());

    let report = generate(&config, &source, &seeded(1)).await.unwrap();

    assert_eq!(report.origin, StoryOrigin::Upstream);
    let record: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&config.cache.path).unwrap()).unwrap();
    assert_eq!(record["stories"].as_array().unwrap().len(), 37);
}

#[tokio::test]
async fn cached_variant_flag_is_normalized() {
    let tmp = TempDir::new().unwrap();
    let config = site(&tmp, TEMPLATE);
    fs::create_dir_all(config.cache.path.parent().unwrap()).unwrap();
    let record = json!({
        "timestamp": chrono::Utc::now(),
        "stories": [
            {"id": "a", "slug": "a", "fieldData": {"main-title": "Plain"}},
            {"id": "b", "slug": "b", "fieldData": {"main-title": "Flagged", "Featured": true}},
        ]
    });
    fs::write(&config.cache.path, record.to_string()).unwrap();
    let source = FakeSource::new(Vec::new());

    let report = generate(&config, &source, &seeded(1)).await.unwrap();

    assert_eq!(source.calls(), 0);
    assert_eq!(report.selection.featured, "Flagged");
}

// =========================================================================
// Failure and degradation
// =========================================================================

#[tokio::test]
async fn upstream_error_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let config = site(&tmp, TEMPLATE);
    let source = FakeSource::failing(503);

    let err = generate(&config, &source, &seeded(1)).await.unwrap_err();

    assert!(matches!(
        err,
        GenerateError::Fetch(FetchError::Upstream { status: 503, .. })
    ));
    assert!(!config.page.output.exists());
    assert!(!config.cache.path.exists());
}

#[tokio::test]
async fn absent_regions_are_reported_as_skipped() {
    let tmp = TempDir::new().unwrap();
    let template = r#"<html><body><div class="landingcoverwrapper"><div class="coversection"></div></div></body></html>"#;
    let config = site(&tmp, template);
    let source = FakeSource::new(collection());

    let report = generate(&config, &source, &seeded(1)).await.unwrap();

    let skipped: Vec<&Region> = report
        .regions
        .skipped
        .iter()
        .filter(|s| s.reason == SkipReason::Missing)
        .map(|s| &s.region)
        .collect();
    assert!(skipped.contains(&&Region::FeaturedMobile));
    assert!(skipped.contains(&&Region::Related));
    assert!(skipped.contains(&&Region::Category("Nature".into())));
    assert!(skipped.contains(&&Region::Category("Play".into())));
    assert_eq!(report.regions.filled.len(), 1);

    let html = fs::read_to_string(&config.page.output).unwrap();
    assert!(html.contains("Title lead"));
}
