//! Shared test utilities for the storyfront test suite.
//!
//! Provides story builders and [`ScriptedSource`], a [`PageSource`] that
//! replays a fixed list of pages and records every request it receives.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let source = ScriptedSource::new()
//!     .page(numbered_stories(0, 100), Some(137))
//!     .page(numbered_stories(100, 37), Some(137));
//!
//! let stories = fetch_all(&source, 100).await.unwrap();
//! assert_eq!(source.requests(), vec![(0, 100), (100, 100)]);
//! ```

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Mutex;

use crate::fetch::{FetchError, Page, PageSource, Pagination};
use crate::types::{FieldData, Story};

// =========================================================================
// Story builders
// =========================================================================

/// Story with fields given as a JSON object. Panics on a non-object.
pub fn story_with(id: &str, slug: &str, fields: Value) -> Story {
    let Value::Object(map) = fields else {
        panic!("story fields must be a JSON object, got {fields}");
    };
    Story {
        id: id.to_string(),
        slug: slug.to_string(),
        field_data: FieldData::from(map),
    }
}

/// Untagged, unflagged story; slug equals id.
pub fn story(id: &str) -> Story {
    story_with(id, id, json!({ "main-title": format!("Story {id}") }))
}

pub fn tagged_story(id: &str, tags: &[&str]) -> Story {
    story_with(
        id,
        id,
        json!({ "main-title": format!("Story {id}"), "tags": tags }),
    )
}

/// Tagged story carrying the canonical `featured: true` flag.
pub fn featured_story(id: &str, tags: &[&str]) -> Story {
    story_with(
        id,
        id,
        json!({ "main-title": format!("Story {id}"), "tags": tags, "featured": true }),
    )
}

/// `count` plain stories with ids `story-<start>` onwards.
pub fn numbered_stories(start: usize, count: usize) -> Vec<Story> {
    (start..start + count)
        .map(|n| story(&format!("story-{n}")))
        .collect()
}

// =========================================================================
// Scripted page source
// =========================================================================

enum Scripted {
    Page(Page),
    Failure { status: u16, body: String },
}

/// Replays scripted pages in order, one per request, ignoring the requested
/// offset. Requests past the script get an empty page.
#[derive(Default)]
pub struct ScriptedSource {
    script: Vec<Scripted>,
    requests: Mutex<Vec<(usize, usize)>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, items: Vec<Story>, total: Option<usize>) -> Self {
        let pagination = total.map(|total| Pagination {
            total: Some(total),
            offset: None,
            limit: None,
        });
        self.script.push(Scripted::Page(Page { items, pagination }));
        self
    }

    pub fn failure(mut self, status: u16, body: &str) -> Self {
        self.script.push(Scripted::Failure {
            status,
            body: body.to_string(),
        });
        self
    }

    /// `(offset, limit)` of every request so far.
    pub fn requests(&self) -> Vec<(usize, usize)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Page, FetchError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push((offset, limit));
            requests.len() - 1
        };
        match self.script.get(index) {
            Some(Scripted::Page(page)) => Ok(page.clone()),
            Some(Scripted::Failure { status, body }) => Err(FetchError::Upstream {
                status: *status,
                body: body.clone(),
            }),
            None => Ok(Page::default()),
        }
    }
}
