//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Stories are listed by their title, not by id; ids only appear for
//! untitled stories. Selectors are shown as secondary context after the
//! region they name, so the output reads as an inventory of the page.
//!
//! # Output Format
//!
//! ## Generate
//!
//! ```text
//! Stories: 42 (cache)
//! Featured: The Long Walk Home
//! Related (2 stories)
//!     001 A River in Winter
//!     002 Forty Hands
//! Sections
//!     001 Nature (4 stories)
//!         001 Night Owls
//!         ...
//! Skipped
//!     featured (mobile): .storywrapperfeatonly .storyitem not in template
//! Wrote dynamic-pages/home.html
//! ```
//!
//! ## Fetch
//!
//! ```text
//! Fetched 237 stories
//!     Cache: cache/stories.json
//! ```
//!
//! ## Check
//!
//! ```text
//! Template dynamic-pages/template.html
//!     ok       cover: .landingcoverwrapper .coversection (1 match)
//!     missing  Play: [data-category="Play"] .landingstorysection
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::assemble::SkipReason;
use crate::generate::{CheckReport, GenerateReport, HookStatus, StoryOrigin};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{} {}", n, one)
    } else {
        format!("{} {}", n, many)
    }
}

/// Numbered story lines at `depth`.
fn story_lines(lines: &mut Vec<String>, labels: &[String], depth: usize) {
    for (i, label) in labels.iter().enumerate() {
        lines.push(format!("{}{} {}", indent(depth), format_index(i + 1), label));
    }
}

// ============================================================================
// Generate
// ============================================================================

/// Format the summary of a generation run.
pub fn format_generate_output(report: &GenerateReport) -> Vec<String> {
    let mut lines = Vec::new();
    let origin = match report.origin {
        StoryOrigin::Cache => "cache",
        StoryOrigin::Upstream => "fetched",
    };
    lines.push(format!("Stories: {} ({})", report.stories, origin));

    let selection = &report.selection;
    lines.push(format!("Featured: {}", selection.featured));

    lines.push(format!(
        "Related ({})",
        plural(selection.related.len(), "story", "stories")
    ));
    story_lines(&mut lines, &selection.related, 1);

    if !selection.sections.is_empty() {
        lines.push("Sections".to_string());
        for (i, section) in selection.sections.iter().enumerate() {
            lines.push(format!(
                "{}{} {} ({})",
                indent(1),
                format_index(i + 1),
                section.name,
                plural(section.stories.len(), "story", "stories")
            ));
            story_lines(&mut lines, &section.stories, 2);
        }
    }

    let appended: Vec<_> = report.regions.filled.iter().filter(|f| f.appended).collect();
    if !appended.is_empty() {
        lines.push("Appended".to_string());
        for filled in appended {
            lines.push(format!("{}{} \u{2192} {}", indent(1), filled.region, filled.selector));
        }
    }

    if !report.regions.skipped.is_empty() {
        lines.push("Skipped".to_string());
        for skipped in &report.regions.skipped {
            let why = match skipped.reason {
                SkipReason::Missing => format!("{} not in template", skipped.selector),
                SkipReason::Empty => "no stories".to_string(),
            };
            lines.push(format!("{}{}: {}", indent(1), skipped.region, why));
        }
    }

    if let Some(removed) = report.badges_removed {
        lines.push(format!("Badges removed: {}", removed));
    }
    lines.push(format!("Wrote {}", report.output.display()));

    lines
}

/// Print generate output to stdout.
pub fn print_generate_output(report: &GenerateReport) {
    for line in format_generate_output(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Fetch
// ============================================================================

pub fn format_fetch_output(count: usize, cache_path: &Path) -> Vec<String> {
    vec![
        format!("Fetched {}", plural(count, "story", "stories")),
        format!("{}Cache: {}", indent(1), cache_path.display()),
    ]
}

pub fn print_fetch_output(count: usize, cache_path: &Path) {
    for line in format_fetch_output(count, cache_path) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

fn hook_line(hook: &HookStatus) -> String {
    if hook.matches == 0 {
        format!("{}missing  {}: {}", indent(1), hook.label, hook.selector)
    } else {
        format!(
            "{}ok       {}: {} ({})",
            indent(1),
            hook.label,
            hook.selector,
            plural(hook.matches, "match", "matches")
        )
    }
}

/// Format template hook presence, one line per region.
pub fn format_check_output(report: &CheckReport) -> Vec<String> {
    let mut lines = vec![format!("Template {}", report.template.display())];
    lines.extend(report.hooks.iter().map(hook_line));
    match &report.sections_container {
        Some(container) => lines.push(hook_line(container)),
        None => lines.push(format!("{}sections container disabled", indent(1))),
    }
    lines
}

pub fn print_check_output(report: &CheckReport) {
    for line in format_check_output(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
