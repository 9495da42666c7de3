//! Cosmetic string-level cleanup of the rendered page.
//!
//! Runs after assembly, on the serialized HTML, and only when
//! `page.strip_badges` is set.

use regex::Regex;
use std::sync::LazyLock;

static BADGE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a[^>]*?w-webflow-badge[^>]*>[\s\S]*?</a>").unwrap());

static BADGE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<div[^>]*?w-webflow-badge[^>]*>[\s\S]*?</div>").unwrap());

/// Remove the CMS "made in" badge, in both its link and block forms.
///
/// Returns the cleaned page and the number of badges removed.
pub fn strip_badges(html: &str) -> (String, usize) {
    let links = BADGE_LINK.find_iter(html).count();
    let html = BADGE_LINK.replace_all(html, "");
    let blocks = BADGE_BLOCK.find_iter(&html).count();
    let html = BADGE_BLOCK.replace_all(&html, "").into_owned();
    (html, links + blocks)
}
