use std::collections::HashSet;

/// Longest detail text kept in an activity log entry.
pub const MAX_DETAIL_CHARS: usize = 200;

/// Reduce client-supplied text to plain text using the ammonia library.
///
/// Every tag is stripped (an empty tag whitelist), and the contents of
/// `<script>` and `<style>` are dropped entirely. The entities ammonia emits
/// are decoded again, so the result is plain text and must be escaped by
/// whatever renders it. It is trimmed and capped at `MAX_DETAIL_CHARS` characters.
pub fn clean_text(input: &str) -> String {
    let cleaned = ammonia::Builder::empty()
        .clean_content_tags(HashSet::from(["script", "style"]))
        .clean(input)
        .to_string();
    let decoded = decode_entities(&cleaned);
    decoded.trim().chars().take(MAX_DETAIL_CHARS).collect()
}

/// Reverses the escaping of ammonia's serializer. `&amp;` goes last so an
/// escaped entity such as `&amp;lt;` decodes to `&lt;` and not `<`.
fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_stripped() {
        assert_eq!(clean_text("<b>answer</b> text"), "answer text");
        assert_eq!(clean_text("<script>alert(1)</script>ok"), "ok");
    }

    #[test]
    fn test_text_is_not_left_html_escaped() {
        assert_eq!(clean_text("a < b & c > d"), "a < b & c > d");
        assert_eq!(clean_text("<i>Tom &amp; Jerry</i>"), "Tom & Jerry");
        assert_eq!(clean_text("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_long_detail_is_truncated() {
        let long = "x".repeat(MAX_DETAIL_CHARS + 50);
        assert_eq!(clean_text(&long).chars().count(), MAX_DETAIL_CHARS);
    }
}
