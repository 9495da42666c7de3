//! Story selection: featured pick, related stories, category sections.
//!
//! Step 2 of the generation run. Distributes stories across the page so
//! that no story appears twice. One used set is threaded through three
//! steps, in this order:
//!
//! 1. **Featured**: the first story flagged `featured`, else the first story.
//! 2. **Related**: unused stories sharing a tag with the featured story,
//!    shuffled, capped at `section_size`.
//! 3. **Sections**: for each category in declared order, unused stories
//!    matching the category's tags, shuffled, capped at `section_size`.
//!
//! Earlier steps win: a story that fits several categories lands in the
//! first one that picks it. The random source is a parameter, so a seeded
//! generator gives a reproducible page.

use crate::types::{Category, Story};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_SECTION_SIZE: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectError {
    #[error("no stories to select from")]
    EmptyInput,
}

/// Stories picked for one category.
#[derive(Debug, Clone)]
pub struct Section<'a> {
    pub category: &'a Category,
    pub stories: Vec<&'a Story>,
}

impl Section<'_> {
    pub fn name(&self) -> &str {
        &self.category.name
    }
}

/// The outcome of one selection pass.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    pub featured: &'a Story,
    pub related: Vec<&'a Story>,
    /// One entry per category, in declared order, possibly empty.
    pub sections: Vec<Section<'a>>,
}

impl<'a> Selection<'a> {
    pub fn section(&self, name: &str) -> Option<&Section<'a>> {
        self.sections.iter().find(|s| s.name() == name)
    }

    /// Every selected story, featured first.
    pub fn all_stories(&self) -> impl Iterator<Item = &'a Story> + '_ {
        std::iter::once(self.featured)
            .chain(self.related.iter().copied())
            .chain(self.sections.iter().flat_map(|s| s.stories.iter().copied()))
    }
}

/// Per-run bookkeeping of story ids already placed on the page.
#[derive(Debug, Default)]
struct UsedSet<'a>(HashSet<&'a str>);

impl<'a> UsedSet<'a> {
    fn contains(&self, story: &Story) -> bool {
        self.0.contains(story.id.as_str())
    }

    fn mark(&mut self, story: &'a Story) {
        self.0.insert(story.id.as_str());
    }

    /// Unused stories passing `filter`, in input order. A story id that
    /// occurs twice in the input is yielded once.
    fn candidates<F>(&self, stories: &'a [Story], filter: F) -> Vec<&'a Story>
    where
        F: Fn(&Story) -> bool,
    {
        let mut seen: HashSet<&str> = HashSet::new();
        stories
            .iter()
            .filter(|&s| !self.contains(s) && filter(s))
            .filter(|&s| seen.insert(s.id.as_str()))
            .collect()
    }
}

/// The first featured story, else the first story.
pub fn pick_featured(stories: &[Story]) -> Result<&Story, SelectError> {
    stories
        .iter()
        .find(|s| s.is_featured())
        .or_else(|| stories.first())
        .ok_or(SelectError::EmptyInput)
}

/// Shuffle candidates and keep up to `size`, marking the kept ones used.
fn take_random<'a, R>(
    mut candidates: Vec<&'a Story>,
    size: usize,
    used: &mut UsedSet<'a>,
    rng: &mut R,
) -> Vec<&'a Story>
where
    R: Rng + ?Sized,
{
    candidates.shuffle(rng);
    candidates.truncate(size);
    for &story in &candidates {
        used.mark(story);
    }
    candidates
}

/// Distribute `stories` across the featured slot, the related list, and
/// one section per category.
pub fn select<'a, R>(
    stories: &'a [Story],
    categories: &'a [Category],
    section_size: usize,
    rng: &mut R,
) -> Result<Selection<'a>, SelectError>
where
    R: Rng + ?Sized,
{
    let featured = pick_featured(stories)?;
    let mut used = UsedSet::default();
    used.mark(featured);
    info!(
        id = %featured.id,
        title = featured.label(),
        flagged = featured.is_featured(),
        "Picked featured story"
    );

    let featured_tags: Vec<&str> = featured.tags().collect();
    let related_pool = used.candidates(stories, |s| s.has_any_tag(&featured_tags));
    debug!(candidates = related_pool.len(), "Related candidates");
    let related = take_random(related_pool, section_size, &mut used, &mut *rng);

    let sections = categories
        .iter()
        .map(|category| {
            let pool = used.candidates(stories, |s| category.matches(s));
            let picked = take_random(pool, section_size, &mut used, &mut *rng);
            debug!(
                category = %category.name,
                picked = picked.len(),
                "Filled section"
            );
            Section {
                category,
                stories: picked,
            }
        })
        .collect();

    Ok(Selection {
        featured,
        related,
        sections,
    })
}
