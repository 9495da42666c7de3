//! Story cache with a freshness window.
//!
//! The fetch stage is the slow part of a run (one HTTP round trip per page of
//! 100 stories), and the collection changes rarely. This module lets the
//! generate stage reuse the last fetched collection while it is younger than
//! the freshness window.
//!
//! # Storage
//!
//! A single pretty-printed JSON file, `cache/stories.json` by default:
//!
//! ```text
//! { "timestamp": "2026-03-01T12:00:00Z", "stories": [ ... ] }
//! ```
//!
//! The whole file is read and written at once. Every successful fetch
//! overwrites it; nothing ever deletes it.
//!
//! # Failure policy
//!
//! The cache is an optimization, never a source of errors. A missing,
//! unreadable, or corrupt file is a miss; a record with zero stories is a
//! miss; a failed write is logged and ignored. Overlapping runs race on the
//! file and the last writer wins.
//!
//! Stories read back from the file are normalized again, since older cache
//! files may still carry the `Featured` spelling.

use crate::types::{Story, normalize_stories};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_FRESHNESS_SECS: u64 = 3600;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub timestamp: DateTime<Utc>,
    pub stories: Vec<Story>,
}

/// Borrowing twin of [`CacheRecord`] for writes.
#[derive(Serialize)]
struct CacheRecordRef<'a> {
    timestamp: DateTime<Utc>,
    stories: &'a [Story],
}

/// What a cache lookup found.
#[derive(Debug)]
pub enum Lookup {
    /// Young enough to reuse.
    Fresh { stories: Vec<Story>, age: TimeDelta },
    /// Older than the freshness window.
    Stale { age: TimeDelta },
    /// A well-formed record holding no stories.
    Empty,
    Missing,
    /// Unreadable or unparsable; carries the reason.
    Corrupt(String),
}

impl Lookup {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Lookup::Fresh { .. })
    }

    pub fn into_stories(self) -> Option<Vec<Story>> {
        match self {
            Lookup::Fresh { stories, .. } => Some(stories),
            _ => None,
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Fresh { stories, age } => write!(
                f,
                "fresh, {} stories, {} min old",
                stories.len(),
                age.num_minutes().max(0)
            ),
            Lookup::Stale { age } => write!(f, "stale, {} min old", age.num_minutes()),
            Lookup::Empty => write!(f, "empty record"),
            Lookup::Missing => write!(f, "no cache file"),
            Lookup::Corrupt(reason) => write!(f, "unreadable: {}", reason),
        }
    }
}

/// File-backed story cache.
#[derive(Debug, Clone)]
pub struct StoryCache {
    path: PathBuf,
    freshness: TimeDelta,
}

impl StoryCache {
    pub fn new(path: impl Into<PathBuf>, freshness_secs: u64) -> Self {
        let freshness = i64::try_from(freshness_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Self {
            path: path.into(),
            freshness,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Classify the cache file as of `now`.
    ///
    /// A record is fresh when `now - timestamp` is strictly below the
    /// window. A timestamp in the future counts as fresh.
    pub fn lookup(&self, now: DateTime<Utc>) -> Lookup {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Lookup::Missing,
            Err(e) => return Lookup::Corrupt(e.to_string()),
        };
        let mut record: CacheRecord = match serde_json::from_str(&content) {
            Ok(r) => r,
            Err(e) => return Lookup::Corrupt(e.to_string()),
        };
        if record.stories.is_empty() {
            return Lookup::Empty;
        }
        let age = now - record.timestamp;
        if age >= self.freshness {
            return Lookup::Stale { age };
        }
        normalize_stories(&mut record.stories);
        Lookup::Fresh {
            stories: record.stories,
            age,
        }
    }

    /// Cached stories if a fresh record exists.
    pub fn read(&self) -> Option<Vec<Story>> {
        self.read_at(Utc::now())
    }

    pub fn read_at(&self, now: DateTime<Utc>) -> Option<Vec<Story>> {
        let lookup = self.lookup(now);
        match &lookup {
            Lookup::Fresh { stories, age } => info!(
                path = %self.path.display(),
                count = stories.len(),
                age_secs = age.num_seconds(),
                "Using cached stories"
            ),
            Lookup::Stale { age } => info!(
                path = %self.path.display(),
                age_secs = age.num_seconds(),
                "Cache is stale"
            ),
            Lookup::Empty => info!(path = %self.path.display(), "Cache holds no stories"),
            Lookup::Missing => debug!(path = %self.path.display(), "No cache file"),
            Lookup::Corrupt(reason) => warn!(
                path = %self.path.display(),
                %reason,
                "Ignoring unreadable cache file"
            ),
        }
        lookup.into_stories()
    }

    /// Persist `stories` stamped with the current time. Errors are logged.
    pub fn write(&self, stories: &[Story]) {
        self.write_at(stories, Utc::now())
    }

    pub fn write_at(&self, stories: &[Story], now: DateTime<Utc>) {
        match self.try_write(stories, now) {
            Ok(()) => debug!(
                path = %self.path.display(),
                count = stories.len(),
                "Wrote story cache"
            ),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to write story cache"
            ),
        }
    }

    pub fn try_write(&self, stories: &[Story], now: DateTime<Utc>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let record = CacheRecordRef {
            timestamp: now,
            stories,
        };
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}
