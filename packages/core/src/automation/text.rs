//! Plain-text extraction from portable-text bodies

use serde_json::Value;

/// Flatten a portable-text body into plain text.
///
/// Spans of each `block` node are concatenated and blocks are separated by a
/// blank line. Non-text nodes (images, embeds) are skipped. Anything that is
/// not an array of blocks yields an empty string.
pub fn extract_plain_text(body: Option<&Value>) -> String {
    let Some(Value::Array(blocks)) = body else {
        return String::new();
    };

    blocks
        .iter()
        .filter(|block| block.get("_type").and_then(Value::as_str) == Some("block"))
        .filter_map(|block| {
            let children = block.get("children")?.as_array()?;
            let text: String = children
                .iter()
                .filter_map(|child| child.get("text").and_then(Value::as_str))
                .collect();
            (!text.is_empty()).then_some(text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// First `max_chars` characters of `text`, cut on a word boundary where
/// possible and suffixed with an ellipsis when shortened. The result never
/// exceeds `max_chars`.
pub fn truncate_words(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }

    let budget = max_chars.saturating_sub(1);
    let cut: String = text.chars().take(budget).collect();
    let ends_on_boundary = text.chars().nth(budget).is_some_and(char::is_whitespace);
    let trimmed = match cut.rfind(char::is_whitespace) {
        _ if ends_on_boundary => cut.as_str(),
        Some(idx) if idx > budget / 2 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}…", trimmed.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn joins_blocks_with_blank_lines() {
        let body = json!([
            { "_type": "block", "children": [{ "_type": "span", "text": "Hello " }, { "_type": "span", "text": "world" }] },
            { "_type": "image", "asset": { "_ref": "image-abc" } },
            { "_type": "block", "children": [{ "_type": "span", "text": "Second paragraph" }] }
        ]);
        assert_eq!(
            extract_plain_text(Some(&body)),
            "Hello world\n\nSecond paragraph"
        );
    }

    #[test]
    fn missing_or_malformed_body_is_empty() {
        assert_eq!(extract_plain_text(None), "");
        assert_eq!(extract_plain_text(Some(&Value::Null)), "");
        assert_eq!(extract_plain_text(Some(&json!("just a string"))), "");
        assert_eq!(extract_plain_text(Some(&json!([{ "_type": "block" }]))), "");
    }

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate_words("short", 10), "short");
    }

    #[test]
    fn truncate_cuts_on_word_boundary() {
        let out = truncate_words("the quick brown fox jumps", 16);
        assert_eq!(out, "the quick brown…");
        assert!(out.chars().count() <= 16);
    }

    #[test]
    fn truncate_to_zero_is_empty() {
        assert_eq!(truncate_words("anything at all", 0), "");
        assert_eq!(truncate_words("", 0), "");
    }

    proptest! {
        #[test]
        fn truncate_never_exceeds_budget(text in "[a-z ]{0,60}", max in 0usize..40) {
            prop_assert!(truncate_words(&text, max).chars().count() <= max);
        }
    }
}
