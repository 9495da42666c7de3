//! # Storyfront
//!
//! Renders the home page of a CMS-driven story site. The page layout is an
//! HTML template exported from the site builder; the stories come from the
//! CMS collection API. Every run promotes one story to the cover, picks a few
//! related stories and a few per category, and fills them into the template.
//!
//! # Architecture: One Run, Five Steps
//!
//! ```text
//! 1. Load      cache (fresh?)  →  stories     (else fetch every page, write through)
//! 2. Select    stories         →  selection   (featured, related, per category)
//! 3. Assemble  template        →  document    (regions filled with rendered cards)
//! 4. Clean     document        →  html        (optional badge stripping)
//! 5. Write     html            →  output      (temp file + rename)
//! ```
//!
//! Steps 1 and 2 can fail the run (upstream error, malformed response, empty
//! collection). Everything after degrades: a region missing from the
//! template is skipped and reported, and a broken cache file is a miss.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`fetch`] | Paginated collection fetch behind the [`fetch::PageSource`] trait; HTTP implementation |
//! | [`cache`] | Timestamped JSON cache of the whole collection with a freshness window |
//! | [`select`] | Featured pick and de-duplicated random sampling into related and category lists |
//! | [`template`] | HTML template tree, CSS-style selectors, and the [`template::Document`] trait |
//! | [`assemble`] | Story card rendering with Maud and region filling |
//! | [`postprocess`] | String-level cleanup of the serialized page |
//! | [`generate`] | The run itself: cache, fetch, select, assemble, write |
//! | [`config`] | `storyfront.toml` loading over stock defaults, environment overrides, validation |
//! | [`types`] | `Story`, its field data, and `Category` |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## No Story Twice
//!
//! Selection keeps a per-run set of used story ids. The featured story is
//! marked first, then the related list, then each category in declared order,
//! so earlier lists win when a story qualifies for several.
//!
//! ## Featured Flag Normalized Once
//!
//! The CMS has spelled the flag both `featured` and `Featured`. Stories are
//! normalized where they enter the process (fetch and cache read), so the
//! rest of the code only ever reads `featured`.
//!
//! ## Template Stays Byte-Identical Outside Regions
//!
//! The template is parsed into a tree that keeps every tag's original text.
//! Only the insides of filled regions are replaced, so the builder's markup,
//! attribute order, and whitespace survive a run untouched.

pub mod assemble;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod generate;
pub mod output;
pub mod postprocess;
pub mod select;
pub mod template;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
