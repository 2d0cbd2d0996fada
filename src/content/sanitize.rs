use regex::Regex;
use std::sync::OnceLock;

/// Entity replacements applied after tag removal.
///
/// `&amp;` is decoded first so the remaining entities are matched against the
/// text the feed author actually wrote.
const ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&quot;", "\""),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&#39;", "'"),
    ("&nbsp;", " "),
];

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is a valid regex"))
}

/// Strips markup from an HTML fragment and decodes the common entities.
///
/// Every `<...>` span is removed, then `&amp;`, `&quot;`, `&lt;`, `&gt;`,
/// `&#39;` and `&nbsp;` are decoded and the result is trimmed. Any other
/// entity is left as written. Never fails.
///
/// # Examples
///
/// ```
/// use stacksync::content::clean;
///
/// assert_eq!(clean("<p>A &amp; B</p>"), "A & B");
/// assert_eq!(clean("no tags"), "no tags");
/// ```
pub fn clean(html: &str) -> String {
    let mut text = tag_pattern().replace_all(html, "").into_owned();
    for (entity, replacement) in ENTITIES {
        if text.contains(entity) {
            text = text.replace(entity, replacement);
        }
    }
    text.trim().to_string()
}
