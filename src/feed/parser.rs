use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

use super::extract::extract;
use crate::content::clean;

/// One entry parsed from the syndication feed.
///
/// `encoded_content` is kept as raw markup; reconciliation sanitizes it when
/// comparing content sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub published_at: String,
    pub description: String,
    pub encoded_content: Option<String>,
    pub external_id: String,
}

/// Items recovered from a feed plus the number of `<item>` blocks dropped for
/// missing a title, link or publish date.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub items: Vec<FeedItem>,
    pub skipped: usize,
}

fn item_pattern() -> &'static Regex {
    static ITEM: OnceLock<Regex> = OnceLock::new();
    ITEM.get_or_init(|| {
        RegexBuilder::new(r"<item(?:\s[^>]*)?>(.*?)</item\s*>")
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .expect("item pattern is a valid regex")
    })
}

/// Parses RSS text into feed items, preserving feed order.
///
/// Malformed items are skipped rather than failing the parse; the caller
/// only sees how many were dropped.
pub fn parse_feed(text: &str) -> ParseResult {
    let mut result = ParseResult::default();

    for block in item_pattern().captures_iter(text) {
        let fragment = block.get(1).map_or("", |m| m.as_str());
        match parse_item(fragment) {
            Some(item) => result.items.push(item),
            None => result.skipped += 1,
        }
    }

    result
}

fn parse_item(fragment: &str) -> Option<FeedItem> {
    let title = clean(&extract(fragment, "title"));
    let link = extract(fragment, "link");
    let published_at = extract(fragment, "pubDate");

    if title.is_empty() || link.is_empty() || published_at.is_empty() {
        tracing::debug!(
            title = %title,
            link = %link,
            published_at = %published_at,
            "Skipping feed item missing required fields"
        );
        return None;
    }

    let description = clean(&extract(fragment, "description"));
    let encoded = extract(fragment, "content:encoded");
    let guid = extract(fragment, "guid");

    Some(FeedItem {
        external_id: if guid.is_empty() { link.clone() } else { guid },
        title,
        link,
        published_at,
        description,
        encoded_content: (!encoded.is_empty()).then_some(encoded),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SUBSTACK_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss xmlns:content="http://purl.org/rss/1.0/modules/content/" version="2.0">
<channel>
    <title><![CDATA[Example Newsletter]]></title>
    <link>https://example.substack.com</link>
    <item>
        <title><![CDATA[First &amp; Foremost]]></title>
        <description><![CDATA[<p>A short teaser.</p>]]></description>
        <link>https://example.substack.com/p/first</link>
        <guid isPermaLink="false">https://example.substack.com/p/first</guid>
        <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate>
        <content:encoded><![CDATA[<p>The full body of the first post.</p>]]></content:encoded>
    </item>
    <item>
        <title>Second</title>
        <description>Plain description</description>
        <link>https://example.substack.com/p/second</link>
        <pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate>
    </item>
</channel>
</rss>"#;

    #[test]
    fn test_parse_substack_items_in_order() {
        let result = parse_feed(SUBSTACK_RSS);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.items.len(), 2);

        let first = &result.items[0];
        assert_eq!(first.title, "First & Foremost");
        assert_eq!(first.link, "https://example.substack.com/p/first");
        assert_eq!(first.published_at, "Mon, 01 Jan 2024 10:00:00 GMT");
        assert_eq!(first.description, "A short teaser.");
        assert_eq!(
            first.encoded_content.as_deref(),
            Some("<p>The full body of the first post.</p>")
        );
        assert_eq!(first.external_id, "https://example.substack.com/p/first");

        assert_eq!(result.items[1].title, "Second");
    }

    #[test]
    fn test_missing_guid_falls_back_to_link() {
        let result = parse_feed(SUBSTACK_RSS);
        let second = &result.items[1];
        assert_eq!(second.external_id, second.link);
        assert_eq!(second.encoded_content, None);
    }

    #[test]
    fn test_items_missing_required_fields_are_skipped() {
        let rss = r#"<rss><channel>
            <item><title>Valid</title><link>https://x.test/p/a</link><pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>
            <item><title>No link</title><pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>
            <item><link>https://x.test/p/no-title</link><pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>
            <item><title>No date</title><link>https://x.test/p/c</link></item>
            <item><title><![CDATA[<b></b>]]></title><link>https://x.test/p/d</link><pubDate>x</pubDate></item>
            <item><title>Also valid</title><link>https://x.test/p/e</link><pubDate>Tue, 02 Jan 2024 00:00:00 GMT</pubDate></item>
        </channel></rss>"#;

        let result = parse_feed(rss);
        let titles: Vec<&str> = result.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Valid", "Also valid"]);
        assert_eq!(result.skipped, 4);
    }

    #[test]
    fn test_channel_fields_do_not_leak_into_items() {
        let rss = r#"<rss><channel><title>Channel</title><link>https://x.test</link>
            <item><description>orphan</description></item></channel></rss>"#;
        let result = parse_feed(rss);
        assert!(result.items.is_empty());
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn test_empty_and_garbage_input() {
        assert!(parse_feed("").items.is_empty());
        assert!(parse_feed("<not valid xml").items.is_empty());
        assert!(parse_feed("<rss><channel></channel></rss>").items.is_empty());
    }

    #[test]
    fn test_item_with_attributes() {
        let rss = r#"<item rdf:about="x"><title>T</title><link>https://x.test/p/t</link><pubDate>Wed, 03 Jan 2024 00:00:00 GMT</pubDate></item>"#;
        let result = parse_feed(rss);
        assert_eq!(result.items.len(), 1);
    }
}
