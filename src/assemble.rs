//! Page assembly: render selected stories into the template's regions.
//!
//! Stage 4 of the generation run. Works on any [`Document`]; the production
//! document is [`HtmlDocument`](crate::template::HtmlDocument).
//!
//! ## Regions
//!
//! | Region            | Default hook                                   | Content            |
//! |-------------------|------------------------------------------------|--------------------|
//! | cover             | `.landingcoverwrapper .coversection`           | featured cover     |
//! | featured (mobile) | `.storywrapperfeatonly .storyitem`             | featured card body |
//! | related           | `.content-section .landingstorysection`        | story cards        |
//! | each category     | `[data-category="<name>"] .landingstorysection` | story cards        |
//!
//! Each region's first match has its children replaced. When a category's
//! hook is absent but the sections container (`.pagewrapper`) exists, a
//! complete category section is appended to the container instead, unless
//! the category has no stories.
//!
//! A region with no match in the template is skipped and reported; it is
//! never an error.
//!
//! Fragments are rendered with maud, so story fields are always escaped.

use crate::config::{PageConfig, PeopleConfig, RegionsConfig};
use crate::select::{Section, Selection};
use crate::template::{Document, Selector, TemplateError};
use crate::types::{Story, fields};
use maud::{Markup, html};
use std::fmt;
use tracing::{debug, info, warn};

const READ_ON_ALT: &str = "Click here to read more of the article.";

/// Parsed region hooks.
#[derive(Debug, Clone)]
pub struct Regions {
    pub cover: Selector,
    pub featured_mobile: Selector,
    pub related: Selector,
    pub sections_container: Option<Selector>,
}

impl Regions {
    pub fn from_config(config: &RegionsConfig) -> Result<Self, TemplateError> {
        Ok(Self {
            cover: config.cover.parse()?,
            featured_mobile: config.featured_mobile.parse()?,
            related: config.related.parse()?,
            sections_container: config
                .sections_container()
                .map(Selector::parse)
                .transpose()?,
        })
    }
}

/// A fillable part of the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Region {
    Cover,
    FeaturedMobile,
    Related,
    Category(String),
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Cover => write!(f, "cover"),
            Region::FeaturedMobile => write!(f, "featured (mobile)"),
            Region::Related => write!(f, "related"),
            Region::Category(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilledRegion {
    pub region: Region,
    pub selector: String,
    pub stories: usize,
    /// True when a whole section was appended to the sections container.
    pub appended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No element matches the hook.
    Missing,
    /// Nothing to append for an empty category.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRegion {
    pub region: Region,
    pub selector: String,
    pub reason: SkipReason,
}

/// What assembly did to the template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembleReport {
    pub filled: Vec<FilledRegion>,
    pub skipped: Vec<SkippedRegion>,
}

impl AssembleReport {
    fn fill(&mut self, region: Region, selector: &Selector, stories: usize, appended: bool) {
        info!(%region, %selector, stories, appended, "Filled region");
        self.filled.push(FilledRegion {
            region,
            selector: selector.to_string(),
            stories,
            appended,
        });
    }

    fn skip(&mut self, region: Region, selector: &Selector, reason: SkipReason) {
        match reason {
            SkipReason::Missing => {
                warn!(%region, %selector, "Template region not found, skipping")
            }
            SkipReason::Empty => debug!(%region, "No stories, section not appended"),
        }
        self.skipped.push(SkippedRegion {
            region,
            selector: selector.to_string(),
            reason,
        });
    }
}

/// Renders story fragments matching the site's markup.
#[derive(Debug, Clone, Copy)]
pub struct CardRenderer<'a> {
    people: &'a PeopleConfig,
    story_path: &'a str,
    category_path: &'a str,
    read_on_image: &'a str,
}

impl<'a> CardRenderer<'a> {
    pub fn new(page: &'a PageConfig, people: &'a PeopleConfig) -> Self {
        Self {
            people,
            story_path: &page.story_path,
            category_path: &page.category_path,
            read_on_image: &page.read_on_image,
        }
    }

    /// Link to the story page; stories without a slug are not linked.
    fn story_href(&self, story: &Story) -> Option<String> {
        (!story.slug.is_empty()).then(|| format!("{}{}", self.story_path, story.slug))
    }

    fn author<'s>(&'s self, story: &'s Story) -> &'s str {
        story
            .field_data
            .text(fields::AUTHOR)
            .map_or("", |id| self.people.author(id))
    }

    fn photographer<'s>(&'s self, story: &'s Story) -> &'s str {
        story
            .field_data
            .text(fields::PHOTOGRAPHER)
            .map_or("", |id| self.people.photographer(id))
    }

    fn photo_credit(&self, story: &Story) -> Markup {
        html! {
            div.photocreditblock {
                div.phototext { "Photo:" }
                div.coverphotocredit { (self.photographer(story)) }
            }
        }
    }

    fn read_on(&self) -> Markup {
        html! {
            @if self.read_on_image.is_empty() {
                "Read On"
            } @else {
                img src=(self.read_on_image) loading="lazy" alt=(READ_ON_ALT);
            }
        }
    }

    /// Desktop cover block for the featured story.
    pub fn cover(&self, story: &Story) -> Markup {
        html! {
            @if let Some(src) = story.field_data.media_url(fields::MAIN_IMAGE) {
                img.coverimage src=(src) alt=(story.title()) loading="lazy";
            }
            (self.photo_credit(story))
            h1.coverheading { (story.title()) }
            @if let Some(href) = self.story_href(story) {
                a.readonbutton."w-button" href=(href) { "Read On" }
            }
        }
    }

    /// Inside of a story card; also fills the mobile featured card.
    pub fn story_card_body(&self, story: &Story) -> Markup {
        let field = |key| story.field_data.text(key).unwrap_or_default();
        html! {
            div.storyitemlinkblock {
                @if let Some(src) = story.field_data.media_url(fields::THUMBNAIL) {
                    img.storyitemimage src=(src) loading="lazy" alt=(story.title());
                }
                (self.photo_credit(story))
                div.storyitemtextblock {
                    h2.storyitemheading { (story.title()) }
                    h3.storyitemsubhead { (field(fields::SUBTITLE)) }
                    h4.storyitembyline { (self.author(story)) }
                    div.storyitemteasertext { (field(fields::SUMMARY)) }
                    @if let Some(href) = self.story_href(story) {
                        a."link-block-2"."w-inline-block" href=(href) { (self.read_on()) }
                    }
                }
            }
        }
    }

    pub fn story_card(&self, story: &Story) -> Markup {
        html! {
            div.storyitem."w-dyn-item" role="listitem" {
                (self.story_card_body(story))
            }
        }
    }

    pub fn story_list(&self, stories: &[&Story]) -> Markup {
        html! {
            @for story in stories {
                (self.story_card(story))
            }
        }
    }

    /// A complete category section with header, cards, and "More" link.
    pub fn category_section(&self, section: &Section<'_>) -> Markup {
        let name = section.name();
        html! {
            section."content-section" data-category=(name) {
                div."topic-section-header" {
                    h1."section-header" { (name) }
                }
                div.storywrappernofeat."w-dyn-list" {
                    div.landingstorysection."w-dyn-items" role="list" {
                        (self.story_list(&section.stories))
                    }
                }
                div."topic-section-footer" {
                    a."w-inline-block" href={ (self.category_path) (section.category.slug()) } {
                        h1."section-footer-link-text" { "More " (name) "..." }
                    }
                }
            }
        }
    }
}

fn fill<D>(
    doc: &mut D,
    report: &mut AssembleReport,
    region: Region,
    selector: &Selector,
    content: Markup,
    stories: usize,
) -> Result<(), TemplateError>
where
    D: Document + ?Sized,
{
    if !doc.has_region(selector) {
        report.skip(region, selector, SkipReason::Missing);
        return Ok(());
    }
    doc.set_region_content(selector, &content.into_string())?;
    report.fill(region, selector, stories, false);
    Ok(())
}

fn fill_section<D>(
    doc: &mut D,
    report: &mut AssembleReport,
    regions: &Regions,
    renderer: &CardRenderer<'_>,
    section: &Section<'_>,
) -> Result<(), TemplateError>
where
    D: Document + ?Sized,
{
    let region = Region::Category(section.name().to_string());
    let hook = Selector::parse(&section.category.hook())?;

    if doc.has_region(&hook) {
        let cards = renderer.story_list(&section.stories);
        return fill(doc, report, region, &hook, cards, section.stories.len());
    }

    match &regions.sections_container {
        Some(container) if doc.has_region(container) => {
            if section.stories.is_empty() {
                report.skip(region, container, SkipReason::Empty);
            } else {
                let html = renderer.category_section(section).into_string();
                doc.append_to_region(container, &html)?;
                report.fill(region, container, section.stories.len(), true);
            }
        }
        _ => report.skip(region, &hook, SkipReason::Missing),
    }
    Ok(())
}

/// Fill every region of `doc` from `selection`.
///
/// Regions are processed in page order: cover, mobile featured card,
/// related list, then categories in declared order.
pub fn assemble<D>(
    doc: &mut D,
    selection: &Selection<'_>,
    regions: &Regions,
    renderer: &CardRenderer<'_>,
) -> Result<AssembleReport, TemplateError>
where
    D: Document + ?Sized,
{
    let mut report = AssembleReport::default();
    let featured = selection.featured;

    fill(
        doc,
        &mut report,
        Region::Cover,
        &regions.cover,
        renderer.cover(featured),
        1,
    )?;
    fill(
        doc,
        &mut report,
        Region::FeaturedMobile,
        &regions.featured_mobile,
        renderer.story_card_body(featured),
        1,
    )?;
    fill(
        doc,
        &mut report,
        Region::Related,
        &regions.related,
        renderer.story_list(&selection.related),
        selection.related.len(),
    )?;

    for section in &selection.sections {
        fill_section(doc, &mut report, regions, renderer, section)?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::template::HtmlDocument;
    use crate::test_helpers::{story, story_with};
    use crate::types::Category;
    use serde_json::json;

    const TEMPLATE: &str = r#"<html><body><div class="pagewrapper">
<div class="landingcoverwrapper"><div class="coversection">placeholder cover</div></div>
<div class="storywrapperfeatonly"><div class="storyitem">placeholder card</div></div>
<div class="content-section"><div class="landingstorysection">placeholder related</div></div>
<div data-category="Nature"><div class="landingstorysection">placeholder nature</div></div>
</div></body></html>"#;

    fn full_story(id: &str, slug: &str) -> Story {
        story_with(
            id,
            slug,
            json!({
                "main-title": format!("Title {id}"),
                "subtitle": "A subtitle",
                "content-summary": "Teaser text",
                "big-thumbnail": {"url": format!("https://cdn.example/{id}-thumb.jpg")},
                "main-image": {"url": format!("https://cdn.example/{id}-main.jpg")},
                "author": "612e683242673a05f052db42",
                "photographer": "612e69221a4899ad4b38c7cf",
            }),
        )
    }

    fn run(
        template: &str,
        selection: &Selection<'_>,
        config: &SiteConfig,
    ) -> (String, AssembleReport) {
        let mut doc = HtmlDocument::parse(template).unwrap();
        let regions = Regions::from_config(&config.regions).unwrap();
        let renderer = CardRenderer::new(&config.page, &config.people);
        let report = assemble(&mut doc, selection, &regions, &renderer).unwrap();
        (doc.to_html(), report)
    }

    // =========================================================================
    // Fragments
    // =========================================================================

    #[test]
    fn card_resolves_people_and_links_slug() {
        let config = SiteConfig::default();
        let renderer = CardRenderer::new(&config.page, &config.people);
        let html = renderer.story_card(&full_story("a", "first-story")).into_string();

        assert!(html.contains(r#"<div class="storyitem w-dyn-item" role="listitem">"#));
        assert!(html.contains(r#"src="https://cdn.example/a-thumb.jpg""#));
        assert!(html.contains(r#"<h2 class="storyitemheading">Title a</h2>"#));
        assert!(html.contains(r#"<h4 class="storyitembyline">Krystina Castella</h4>"#));
        assert!(html.contains(r#"<div class="coverphotocredit">Brian Boyl</div>"#));
        assert!(html.contains(r#"href="/stories/first-story""#));
        assert!(html.contains(READ_ON_ALT));
    }

    #[test]
    fn card_without_slug_has_no_link() {
        let config = SiteConfig::default();
        let renderer = CardRenderer::new(&config.page, &config.people);
        let html = renderer.story_card(&full_story("a", "")).into_string();
        assert!(!html.contains("href="));
        assert!(!html.contains("link-block-2"));
    }

    #[test]
    fn missing_fields_render_empty() {
        let config = SiteConfig::default();
        let renderer = CardRenderer::new(&config.page, &config.people);
        let html = renderer.story_card(&story_with("b", "b", json!({}))).into_string();

        assert!(!html.contains("<img class=\"storyitemimage\""));
        assert!(html.contains(r#"<h3 class="storyitemsubhead"></h3>"#));
        assert!(html.contains(r#"<h4 class="storyitembyline"></h4>"#));
    }

    #[test]
    fn unknown_author_renders_raw_id() {
        let config = SiteConfig::default();
        let renderer = CardRenderer::new(&config.page, &config.people);
        let s = story_with("c", "c", json!({"author": "zzz-unknown"}));
        assert!(renderer.story_card(&s).into_string().contains(">zzz-unknown</h4>"));
    }

    #[test]
    fn fields_are_escaped() {
        let config = SiteConfig::default();
        let renderer = CardRenderer::new(&config.page, &config.people);
        let s = story_with("d", "d", json!({"main-title": "<script>x</script> & co"}));
        let html = renderer.story_card(&s).into_string();
        assert!(html.contains("&lt;script&gt;x&lt;/script&gt; &amp; co"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn empty_read_on_image_renders_text_link() {
        let mut config = SiteConfig::default();
        config.page.read_on_image = String::new();
        let renderer = CardRenderer::new(&config.page, &config.people);
        let html = renderer.story_card(&full_story("a", "a")).into_string();
        assert!(html.contains(">Read On</a>"));
    }

    // =========================================================================
    // Region filling
    // =========================================================================

    #[test]
    fn fills_cover_featured_and_related() {
        let config = SiteConfig::default();
        let featured = full_story("f", "featured-slug");
        let related = [full_story("r1", "r1"), full_story("r2", "r2")];
        let selection = Selection {
            featured: &featured,
            related: related.iter().collect(),
            sections: Vec::new(),
        };

        let (html, report) = run(TEMPLATE, &selection, &config);

        assert!(!html.contains("placeholder cover"));
        assert!(html.contains(r#"<h1 class="coverheading">Title f</h1>"#));
        assert!(html.contains(r#"src="https://cdn.example/f-main.jpg""#));
        assert!(html.contains(r#"href="/stories/featured-slug""#));
        assert!(!html.contains("placeholder card"));
        assert!(!html.contains("placeholder related"));
        assert_eq!(html.matches(r#"role="listitem""#).count(), 2);

        let filled: Vec<&Region> = report.filled.iter().map(|f| &f.region).collect();
        assert_eq!(filled, vec![&Region::Cover, &Region::FeaturedMobile, &Region::Related]);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn hooked_category_is_filled_in_place() {
        let config = SiteConfig::default();
        let featured = story("f");
        let nature = Category::new("Nature", &["t"]);
        let picked = full_story("n1", "n1");
        let selection = Selection {
            featured: &featured,
            related: Vec::new(),
            sections: vec![Section {
                category: &nature,
                stories: vec![&picked],
            }],
        };

        let (html, report) = run(TEMPLATE, &selection, &config);

        assert!(!html.contains("placeholder nature"));
        assert!(html.contains("Title n1"));
        let nature_fill = report
            .filled
            .iter()
            .find(|f| f.region == Region::Category("Nature".into()))
            .unwrap();
        assert!(!nature_fill.appended);
        assert_eq!(nature_fill.stories, 1);
    }

    #[test]
    fn unhooked_category_is_appended_to_container() {
        let config = SiteConfig::default();
        let featured = story("f");
        let play = Category::new("Play", &["t"]);
        let picked = full_story("p1", "p1");
        let selection = Selection {
            featured: &featured,
            related: Vec::new(),
            sections: vec![Section {
                category: &play,
                stories: vec![&picked],
            }],
        };

        let (html, report) = run(TEMPLATE, &selection, &config);

        assert!(html.contains(r#"<h1 class="section-header">Play</h1>"#));
        assert!(html.contains(r#"href="/categories/play""#));
        assert!(html.contains("More Play..."));
        assert!(html.trim_end().ends_with("</section></div></body></html>"));
        assert!(report.filled.iter().any(|f| f.appended && f.stories == 1));
    }

    #[test]
    fn empty_unhooked_category_is_not_appended() {
        let config = SiteConfig::default();
        let featured = story("f");
        let play = Category::new("Play", &["t"]);
        let selection = Selection {
            featured: &featured,
            related: Vec::new(),
            sections: vec![Section {
                category: &play,
                stories: Vec::new(),
            }],
        };

        let (html, report) = run(TEMPLATE, &selection, &config);

        assert!(!html.contains("section-header"));
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SkipReason::Empty);
    }

    #[test]
    fn absent_regions_are_skipped() {
        let config = SiteConfig::default();
        let featured = story("f");
        let play = Category::new("Play", &["t"]);
        let selection = Selection {
            featured: &featured,
            related: Vec::new(),
            sections: vec![Section {
                category: &play,
                stories: Vec::new(),
            }],
        };

        let (html, report) = run("<main><p>static</p></main>", &selection, &config);

        assert_eq!(html, "<main><p>static</p></main>");
        assert!(report.filled.is_empty());
        let skipped: Vec<String> = report.skipped.iter().map(|s| s.region.to_string()).collect();
        assert_eq!(skipped, vec!["cover", "featured (mobile)", "related", "Play"]);
        assert!(report.skipped.iter().all(|s| s.reason == SkipReason::Missing));
    }

    #[test]
    fn disabled_container_skips_unhooked_category() {
        let mut config = SiteConfig::default();
        config.regions.sections_container = String::new();
        let featured = story("f");
        let play = Category::new("Play", &["t"]);
        let picked = full_story("p1", "p1");
        let selection = Selection {
            featured: &featured,
            related: Vec::new(),
            sections: vec![Section {
                category: &play,
                stories: vec![&picked],
            }],
        };

        let (html, report) = run(TEMPLATE, &selection, &config);

        assert!(!html.contains("Title p1"));
        let skip = report.skipped.last().unwrap();
        assert_eq!(skip.region, Region::Category("Play".into()));
        assert_eq!(skip.reason, SkipReason::Missing);
        assert_eq!(skip.selector, r#"[data-category="Play"] .landingstorysection"#);
    }
}
