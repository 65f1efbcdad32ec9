use once_cell::sync::Lazy;
use regex::Regex;

static LETTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}").expect("letter regex"));

/// Whether a text run contains anything worth sending to the transform.
/// Runs of pure punctuation, digits, or whitespace are left in place.
pub fn has_letters(text: &str) -> bool {
    LETTER_RE.is_match(text)
}

/// Strips markdown code fences and surrounding noise from a transform reply
/// before the markup inside is parsed. An echoed XML declaration is dropped
/// as well.
pub fn cleanup_reply_text(text: &str) -> String {
    let mut s = text.trim().to_string();
    if s.starts_with("```") {
        if let Some(i) = s.find('\n') {
            s = s[i + 1..].to_string();
        }
        if let Some(end) = s.rfind("```") {
            s = s[..end].to_string();
        }
    }
    let mut s = s.trim();
    if s.starts_with("<?xml") {
        if let Some(end) = s.find("?>") {
            s = s[end + 2..].trim_start();
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::{cleanup_reply_text, has_letters};

    #[test]
    fn letters_detected_across_scripts() {
        assert!(has_letters("hello"));
        assert!(has_letters("你好"));
        assert!(!has_letters("42 …!"));
        assert!(!has_letters("   "));
    }

    #[test]
    fn fences_and_declaration_stripped() {
        let raw = "```xml\n<p>hi</p>\n```";
        assert_eq!(cleanup_reply_text(raw), "<p>hi</p>");

        let raw = "<?xml version=\"1.0\"?>\n<p>hi</p>";
        assert_eq!(cleanup_reply_text(raw), "<p>hi</p>");

        assert_eq!(cleanup_reply_text("  <p>hi</p>  "), "<p>hi</p>");
    }
}
