//! Markdown code-fence stripping for model output.

const FENCE: &str = "```";

/// Remove a surrounding markdown code fence (```` ```json ... ``` ````).
///
/// When the closing fence is missing, or is followed by more text, only the
/// opening marker is removed and the remainder is returned as-is. Text with no
/// fence at all is returned trimmed.
pub fn strip_markdown_code_fences(text: &str) -> String {
    let trimmed = text.trim();

    let Some(open) = trimmed.find(FENCE) else {
        return trimmed.to_string();
    };

    // Only treat it as a wrapper if nothing JSON-like precedes the fence.
    let before = &trimmed[..open];
    if before.contains('{') || before.contains('[') {
        return trimmed.to_string();
    }

    let after_marker = &trimmed[open + FENCE.len()..];
    let body = skip_language_tag(after_marker);

    if let Some(close) = body.find(FENCE) {
        let tail = &body[close + FENCE.len()..];
        if tail.trim().is_empty() {
            return body[..close].trim().to_string();
        }
    }

    body.trim().to_string()
}

/// Skip the info string after an opening fence (e.g. `json`, `JSON5`).
fn skip_language_tag(s: &str) -> &str {
    match s.find('\n') {
        Some(nl) if s[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') => {
            &s[nl + 1..]
        }
        _ => {
            // Fence and payload on the same line: "```json{...}"
            let tag_len = s
                .char_indices()
                .take_while(|(_, c)| c.is_ascii_alphanumeric())
                .map(|(i, c)| i + c.len_utf8())
                .last()
                .unwrap_or(0);
            &s[tag_len..]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_json_fence() {
        assert_eq!(
            strip_markdown_code_fences("```json\n{\"a\":1}\n```"),
            "{\"a\":1}"
        );
    }

    #[test]
    fn test_strips_bare_fence() {
        assert_eq!(strip_markdown_code_fences("```\n[1, 2]\n```\n"), "[1, 2]");
    }

    #[test]
    fn test_missing_closing_fence_strips_opening() {
        assert_eq!(
            strip_markdown_code_fences("```json\n{\"a\":1}"),
            "{\"a\":1}"
        );
    }

    #[test]
    fn test_text_after_closing_fence_keeps_body_and_tail() {
        let out = strip_markdown_code_fences("```json\n{\"a\":1}\n```\nHope this helps!");
        assert!(out.starts_with("{\"a\":1}"));
        assert!(out.contains("Hope this helps!"));
    }

    #[test]
    fn test_no_fence_is_trimmed_passthrough() {
        assert_eq!(strip_markdown_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_prose_before_fence() {
        assert_eq!(
            strip_markdown_code_fences("Here you go:\n```json\n{\"a\":1}\n```"),
            "{\"a\":1}"
        );
    }

    #[test]
    fn test_same_line_fence() {
        assert_eq!(strip_markdown_code_fences("```json{\"a\":1}```"), "{\"a\":1}");
    }
}
