//! Minimal XML helpers shared by the OGC and S3 adapters.
//!
//! These capabilities only mine a handful of well-known tags out of service
//! responses; a full XML model would be overkill.

/// Decode the five XML entities that appear in the documents we mine.
pub(crate) fn decode_entities(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// The text content of the first `<tag>...</tag>` in `body`.
pub(crate) fn first_tag_text(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)?.checked_add(open.len())?;
    let end = body.get(start..)?.find(&close)?.checked_add(start)?;
    Some(decode_entities(body.get(start..end)?.trim()))
}
