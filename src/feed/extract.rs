use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// Returns the trimmed inner text of the first `<tag ...>…</tag>` element in
/// `fragment`, or an empty string when the tag is absent.
///
/// Matching is case-insensitive, ignores attributes on the opening tag and
/// accepts namespaced names such as `content:encoded`. A CDATA section that
/// wraps the whole inner text is unwrapped.
///
/// # Examples
///
/// ```
/// use stacksync::feed::extract;
///
/// assert_eq!(extract("<title>Hi</title>", "title"), "Hi");
/// assert_eq!(extract("<x></x>", "title"), "");
/// ```
pub fn extract(fragment: &str, tag: &str) -> String {
    let pattern = match element_pattern(tag) {
        Ok(pattern) => pattern,
        Err(e) => {
            tracing::warn!(tag = %tag, error = %e, "Could not build tag pattern");
            return String::new();
        }
    };

    pattern
        .captures(fragment)
        .and_then(|caps| caps.get(1))
        .map(|inner| unwrap_cdata(inner.as_str().trim()).to_string())
        .unwrap_or_default()
}

/// Compiled element patterns, keyed by lowercased tag name.
fn pattern_cache() -> &'static RwLock<HashMap<String, Regex>> {
    static PATTERNS: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();
    PATTERNS.get_or_init(|| RwLock::new(HashMap::new()))
}

fn element_pattern(tag: &str) -> Result<Regex, regex::Error> {
    let key = tag.to_ascii_lowercase();

    let cached = pattern_cache()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(&key)
        .cloned();
    if let Some(pattern) = cached {
        return Ok(pattern);
    }

    let pattern = compile_element_pattern(&key)?;
    pattern_cache()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(key, pattern.clone());
    Ok(pattern)
}

fn compile_element_pattern(tag: &str) -> Result<Regex, regex::Error> {
    let name = regex::escape(tag);
    // The opening tag must end at the name or continue with whitespace, so
    // `<titles>` never satisfies a lookup for `title`.
    RegexBuilder::new(&format!(r"<{name}(?:\s[^>]*)?>(.*?)</{name}\s*>"))
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
}

fn unwrap_cdata(inner: &str) -> &str {
    inner
        .strip_prefix(CDATA_OPEN)
        .and_then(|rest| rest.strip_suffix(CDATA_CLOSE))
        .map(str::trim)
        .unwrap_or(inner)
}
