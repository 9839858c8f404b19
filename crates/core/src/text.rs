//! Text shaping helpers for stream content: roadmap outlines, topic cache
//! keys, and the `<SOURCE>` citation tags embedded in lesson markdown.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

static OUTLINE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)*\.?)\s*(.*)$").expect("valid regex"));

static SOURCE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<SOURCE\s+id="([^"]+)">\s*<TITLE>([^<]*)</TITLE>\s*<URL>([^<]*)</URL>\s*</SOURCE>"#,
    )
    .expect("valid regex")
});

/// Cache key for a topic: lowercased, whitespace runs collapsed to `_`.
#[must_use]
pub fn normalize_topic_key(topic: &str) -> String {
    WHITESPACE_RUN
        .replace_all(&topic.to_lowercase(), "_")
        .into_owned()
}

/// Render a numbered roadmap outline as an indented fenced block.
///
/// Nesting depth follows the numbering (`2.1.3` is three levels deep); each
/// level below the first indents four spaces. Lines that do not look like
/// outline entries pass through unchanged.
#[must_use]
pub fn roadmap_to_markdown(text: &str) -> String {
    if text.trim().is_empty() {
        return "Content not available.".to_string();
    }

    let formatted: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            let Some(caps) = OUTLINE_LINE.captures(line) else {
                return line.to_string();
            };
            let number = &caps[1];
            let title = &caps[2];
            let level = number.split('.').filter(|p| !p.is_empty()).count();
            let indent = " ".repeat(4 * level.saturating_sub(1));
            format!("{indent}{number} {title}").trim_end().to_string()
        })
        .collect();

    format!("```\n{}\n```", formatted.join("\n"))
}

/// A citation extracted from a `<SOURCE>` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// Replace `<SOURCE id="S#"><TITLE>…</TITLE><URL>…</URL></SOURCE>` tags with
/// clickable markdown links; tags without a URL degrade to a bold reference.
#[must_use]
pub fn parse_source_tags(content: &str) -> String {
    SOURCE_TAG
        .replace_all(content, |caps: &regex::Captures<'_>| {
            let id = caps[1].trim().to_string();
            let title = caps[2].trim().to_string();
            let url = caps[3].trim().to_string();

            if url.is_empty() {
                format!("**[{id}]** {title}")
            } else {
                format!("• [{id}: {title}]({url})\n\n")
            }
        })
        .into_owned()
}

/// Collect all `<SOURCE>` citations in order of appearance.
#[must_use]
pub fn extract_sources(content: &str) -> Vec<Source> {
    SOURCE_TAG
        .captures_iter(content)
        .map(|caps| Source {
            id: caps[1].trim().to_string(),
            title: caps[2].trim().to_string(),
            url: caps[3].trim().to_string(),
        })
        .collect()
}
