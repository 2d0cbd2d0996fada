use regex::{Regex, RegexBuilder};
use scraper::{Html, Selector};
use std::sync::OnceLock;

use super::sanitize::clean;

/// A named way of locating the article body in a post page.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionStrategy {
    pub name: &'static str,
    /// CSS selector for the body container; the first match is used
    pub selector: &'static str,
}

/// Strategies tried in order, most Substack-specific first.
pub const STRATEGIES: &[ExtractionStrategy] = &[
    ExtractionStrategy {
        name: "available-content",
        selector: "div.available-content",
    },
    ExtractionStrategy {
        name: "body-markup",
        selector: "div.body.markup",
    },
    ExtractionStrategy {
        name: "article",
        selector: "article",
    },
    ExtractionStrategy {
        name: "post-body",
        selector: "div.post-content, div.post-body, div.post",
    },
];

impl ExtractionStrategy {
    /// Returns the sanitized text of the first matching element when it is
    /// longer than `min_chars` characters.
    pub fn apply(&self, document: &Html, min_chars: usize) -> Option<String> {
        let selector = match Selector::parse(self.selector) {
            Ok(selector) => selector,
            Err(e) => {
                tracing::warn!(strategy = self.name, error = %e, "Invalid extraction selector");
                return None;
            }
        };

        let element = document.select(&selector).next()?;
        let text = clean(&element.inner_html());
        (text.chars().count() > min_chars).then_some(text)
    }
}

fn script_pattern() -> &'static Regex {
    static SCRIPT: OnceLock<Regex> = OnceLock::new();
    SCRIPT.get_or_init(|| {
        RegexBuilder::new(r"<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)\s*>")
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .expect("script pattern is a valid regex")
    })
}

/// Runs the strategy chain over a page and returns the first substantial
/// body, along with the name of the strategy that produced it.
pub fn extract_article_body(html: &str, min_chars: usize) -> Option<(&'static str, String)> {
    let stripped = script_pattern().replace_all(html, "");
    let document = Html::parse_document(&stripped);

    STRATEGIES.iter().find_map(|strategy| {
        let text = strategy.apply(&document, min_chars);
        if text.is_none() {
            tracing::trace!(strategy = strategy.name, "Extraction strategy found nothing substantial");
        }
        text.map(|text| (strategy.name, text))
    })
}
