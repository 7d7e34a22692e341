//! Helpers for pulling structured data out of free-form model output, plus
//! file naming for per-thread files.

use sha2::{Digest, Sha256};

/// File-name stem for a per-thread file.
///
/// The SHA-256 of the thread id in hex: always 64 characters, whatever the
/// thread id contains or how long it is.
pub fn thread_file_stem(thread_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(thread_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Locate the outermost JSON object in `text`.
///
/// Model replies often wrap JSON in prose or a fenced code block. This scans
/// from the first `{` and counts braces, ignoring any that appear inside JSON
/// string literals, until the matching `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Truncate `text` to at most `max_chars` characters for log output.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let text = r#"{"detected_language": "python"}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_object_inside_prose_and_fence() {
        let text = "Here is the result:\n```json\n{\"confidence\": 0.9}\n```\nHope it helps.";
        assert_eq!(extract_json_object(text), Some("{\"confidence\": 0.9}"));
    }

    #[test]
    fn test_nested_objects() {
        let text = r#"x {"outer": {"inner": 1}} y"#;
        assert_eq!(extract_json_object(text), Some(r#"{"outer": {"inner": 1}}"#));
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"{"imports": ["from x import {a}"], "q": "say \"}\""} trailing"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"imports": ["from x import {a}"], "q": "say \"}\""}"#)
        );
    }

    #[test]
    fn test_missing_or_unclosed() {
        assert_eq!(extract_json_object("No JSON here"), None);
        assert_eq!(extract_json_object(r#"{"key": "value""#), None);
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("héllo", 2), "hé...");
    }

    #[test]
    fn test_thread_file_stem_is_bounded() {
        let short = thread_file_stem("t-1");
        let long = thread_file_stem(&"x".repeat(4096));
        assert_eq!(short.len(), 64);
        assert_eq!(long.len(), 64);
        assert_ne!(short, thread_file_stem("t-2"));
        assert!(long.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
