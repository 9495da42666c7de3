//! One generation run, end to end.
//!
//! ## Pipeline
//!
//! 1. **Load stories**: the cache is consulted first; on a miss, a stale or
//!    unreadable record, or `--no-cache`, the whole collection is fetched and
//!    written through to the cache.
//! 2. **Select**: featured story, related list, one list per category, with
//!    no story used twice.
//! 3. **Assemble**: the template is parsed and each region filled. Absent
//!    regions are skipped and reported.
//! 4. **Post-process**: optional badge stripping on the serialized page.
//! 5. **Write**: the page goes to a temporary sibling of the output path and
//!    is renamed into place.
//!
//! Any fatal error (upstream failure, bad response shape, empty collection,
//! unreadable template) aborts the run before step 5, so a failed run never
//! leaves an output file behind.

use crate::assemble::{self, AssembleReport, CardRenderer, Region, Regions};
use crate::cache::StoryCache;
use crate::config::{ConfigError, SiteConfig};
use crate::fetch::{self, FetchError, PageSource};
use crate::postprocess;
use crate::select::{self, SelectError, Selection};
use crate::template::{HtmlDocument, Selector, TemplateError};
use crate::types::Story;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Per-run overrides, usually from the command line.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Skip the cache lookup. Fetched stories are still written through.
    pub no_cache: bool,
    /// Seed for the selection RNG; `None` seeds from the OS.
    pub seed: Option<u64>,
    pub template: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

/// Where a run's stories came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryOrigin {
    Cache,
    Upstream,
}

/// Owned copy of a [`Selection`], kept after the stories are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSummary {
    pub featured: String,
    pub related: Vec<String>,
    pub sections: Vec<SectionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSummary {
    pub name: String,
    pub stories: Vec<String>,
}

impl SelectionSummary {
    fn of(selection: &Selection<'_>) -> Self {
        Self {
            featured: selection.featured.label().to_string(),
            related: labels(&selection.related),
            sections: selection
                .sections
                .iter()
                .map(|section| SectionSummary {
                    name: section.name().to_string(),
                    stories: labels(&section.stories),
                })
                .collect(),
        }
    }
}

fn labels(stories: &[&Story]) -> Vec<String> {
    stories.iter().map(|s| s.label().to_string()).collect()
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct GenerateReport {
    pub stories: usize,
    pub origin: StoryOrigin,
    pub selection: SelectionSummary,
    pub regions: AssembleReport,
    /// `None` when badge stripping is disabled.
    pub badges_removed: Option<usize>,
    pub output: PathBuf,
}

/// Presence of one template hook, as reported by [`check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookStatus {
    /// Region name, or `sections container`.
    pub label: String,
    pub selector: String,
    pub matches: usize,
}

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub template: PathBuf,
    pub hooks: Vec<HookStatus>,
    /// Matches of the sections container; `None` when disabled.
    pub sections_container: Option<HookStatus>,
}

/// Cached stories when fresh, otherwise a full fetch written through to the
/// cache.
pub async fn load_stories<S>(
    cache: &StoryCache,
    source: &S,
    page_size: usize,
    no_cache: bool,
) -> Result<(Vec<Story>, StoryOrigin), FetchError>
where
    S: PageSource + ?Sized,
{
    if no_cache {
        info!("Cache bypassed");
    } else if let Some(stories) = cache.read() {
        return Ok((stories, StoryOrigin::Cache));
    }
    let stories = refresh(cache, source, page_size).await?;
    Ok((stories, StoryOrigin::Upstream))
}

/// Fetch the whole collection and rewrite the cache.
///
/// Cache write failures are logged, never returned.
pub async fn refresh<S>(
    cache: &StoryCache,
    source: &S,
    page_size: usize,
) -> Result<Vec<Story>, FetchError>
where
    S: PageSource + ?Sized,
{
    let stories = fetch::fetch_all(source, page_size).await?;
    cache.write(&stories);
    Ok(stories)
}

/// Run the whole pipeline and write the output page.
pub async fn generate<S>(
    config: &SiteConfig,
    source: &S,
    options: &GenerateOptions,
) -> Result<GenerateReport, GenerateError>
where
    S: PageSource + ?Sized,
{
    let template_path = options.template.as_deref().unwrap_or(&config.page.template);
    let output_path = options.output.as_deref().unwrap_or(&config.page.output);
    let regions = Regions::from_config(&config.regions)?;

    let cache = StoryCache::new(&config.cache.path, config.cache.freshness_secs);
    let (stories, origin) =
        load_stories(&cache, source, config.source.page_size, options.no_cache).await?;

    let mut rng = match options.seed {
        Some(seed) => {
            debug!(seed, "Seeded selection");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    };
    let selection = select::select(
        &stories,
        &config.categories,
        config.page.section_size,
        &mut rng,
    )?;

    let mut doc = HtmlDocument::load(template_path)?;
    let renderer = CardRenderer::new(&config.page, &config.people);
    let filled = assemble::assemble(&mut doc, &selection, &regions, &renderer)?;

    let mut html = doc.to_html();
    let badges_removed = if config.page.strip_badges {
        let (stripped, removed) = postprocess::strip_badges(&html);
        debug!(removed, "Stripped badges");
        html = stripped;
        Some(removed)
    } else {
        None
    };

    write_atomic(output_path, &html)?;
    info!(
        path = %output_path.display(),
        bytes = html.len(),
        "Wrote page"
    );

    Ok(GenerateReport {
        stories: stories.len(),
        origin,
        selection: SelectionSummary::of(&selection),
        regions: filled,
        badges_removed,
        output: output_path.to_path_buf(),
    })
}

/// Count the matches of every configured region in the template.
pub fn check(config: &SiteConfig, template: Option<&Path>) -> Result<CheckReport, GenerateError> {
    let template = template.unwrap_or(&config.page.template);
    let regions = Regions::from_config(&config.regions)?;
    let doc = HtmlDocument::load(template)?;

    let status = |label: String, selector: &Selector| HookStatus {
        label,
        selector: selector.to_string(),
        matches: doc.count(selector),
    };

    let mut hooks = vec![
        status(Region::Cover.to_string(), &regions.cover),
        status(Region::FeaturedMobile.to_string(), &regions.featured_mobile),
        status(Region::Related.to_string(), &regions.related),
    ];
    for category in &config.categories {
        let hook = Selector::parse(&category.hook())?;
        hooks.push(status(category.name.clone(), &hook));
    }
    let sections_container = regions
        .sections_container
        .as_ref()
        .map(|container| status("sections container".to_string(), container));

    Ok(CheckReport {
        template: template.to_path_buf(),
        hooks,
        sections_container,
    })
}

/// Write `contents` to a temporary sibling of `path`, then rename it over
/// `path`. Parent directories are created.
pub fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, contents)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}
