use std::sync::OnceLock;

use regex::Regex;

use crate::error::ExportError;

pub trait Optimizer: Send + Sync {
    fn optimize(&self, name: &str, markup: &str) -> Result<String, ExportError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SvgOptimizer;

struct Patterns {
    prolog: Regex,
    comment: Regex,
    noise: Regex,
    between_tags: Regex,
    root: Regex,
    empty_root: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        prolog: Regex::new(r"(?s)<\?xml.*?\?>|<!DOCTYPE[^>]*>").expect("valid prolog regex"),
        comment: Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"),
        noise: Regex::new(r"(?s)<(title|desc|metadata)\b[^>]*>.*?</(title|desc|metadata)>")
            .expect("valid noise regex"),
        between_tags: Regex::new(r">\s+<").expect("valid whitespace regex"),
        root: Regex::new(r"(?s)^<svg\b[^>]*>(.*)</svg>$").expect("valid root regex"),
        empty_root: Regex::new(r"^<svg\b[^>]*/>$").expect("valid empty root regex"),
    })
}

impl Optimizer for SvgOptimizer {
    fn optimize(&self, name: &str, markup: &str) -> Result<String, ExportError> {
        let patterns = patterns();
        let cleaned = patterns.prolog.replace_all(markup, "");
        let cleaned = patterns.comment.replace_all(&cleaned, "");
        let cleaned = patterns.noise.replace_all(&cleaned, "");
        let cleaned = patterns.between_tags.replace_all(cleaned.trim(), "><");
        // Validates the root element as a side effect.
        inner_markup(name, &cleaned)?;
        Ok(cleaned.into_owned())
    }
}

pub fn inner_markup(name: &str, document: &str) -> Result<String, ExportError> {
    let document = document.trim();
    if patterns().empty_root.is_match(document) {
        return Ok(String::new());
    }
    let inner = patterns()
        .root
        .captures(document)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| ExportError::Optimization {
            name: name.to_string(),
            message: "content is not a standalone <svg> document".to_string(),
        })?
        .as_str()
        .trim();
    if inner.matches("<svg").count() != inner.matches("</svg>").count() {
        return Err(ExportError::Optimization {
            name: name.to_string(),
            message: "unbalanced nested <svg> element".to_string(),
        });
    }
    Ok(inner.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn strips_wrapper_and_noise() {
        let raw = r#"<?xml version="1.0"?>
<!-- exported -->
<svg width="24" height="24" viewBox="0 0 24 24" xmlns="http://www.w3.org/2000/svg">
  <title>home</title>
  <path d="M3 12l9-9 9 9"/>
  <g>
    <circle cx="12" cy="12" r="2"/>
  </g>
</svg>
"#;
        let optimized = SvgOptimizer.optimize("home", raw).unwrap();
        assert!(optimized.starts_with("<svg width=\"24\""));
        assert!(!optimized.contains("<title>"));
        assert_eq!(
            inner_markup("home", &optimized).unwrap(),
            r#"<path d="M3 12l9-9 9 9"/><g><circle cx="12" cy="12" r="2"/></g>"#
        );
    }

    #[test]
    fn rejects_non_svg_content() {
        let result = SvgOptimizer.optimize("broken", "<html><body>nope</body></html>");
        assert_matches!(result, Err(ExportError::Optimization { name, .. }) if name == "broken");
    }

    #[test]
    fn rejects_truncated_document() {
        let result = SvgOptimizer.optimize("cut", r#"<svg viewBox="0 0 1 1"><path d="M0"/>"#);
        assert_matches!(result, Err(ExportError::Optimization { .. }));
    }

    #[test]
    fn self_closing_root_is_an_empty_icon() {
        let raw = "<?xml version=\"1.0\"?>\n<svg width=\"24\" height=\"24\" viewBox=\"0 0 24 24\"/>\n";
        let optimized = SvgOptimizer.optimize("blank", raw).unwrap();
        assert_eq!(optimized, r#"<svg width="24" height="24" viewBox="0 0 24 24"/>"#);
        assert_eq!(inner_markup("blank", &optimized).unwrap(), "");
    }
}
