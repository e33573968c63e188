//! HTML entity decoding and tag stripping for CMS text fields.

use scraper::Html;

/// Decodes character references while leaving any markup in place.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let escaped = input.replace('<', "&lt;");
    Html::parse_fragment(&escaped)
        .root_element()
        .text()
        .collect()
}

/// Visible text of an HTML fragment.
pub fn strip_tags(html: &str) -> String {
    Html::parse_fragment(html)
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

/// CMS SEO description when set, else the excerpt, both decoded and stripped.
pub fn preferred_description(excerpt: &str, seo_description: &str) -> String {
    for candidate in [seo_description, excerpt] {
        if candidate.trim().is_empty() {
            continue;
        }
        let text = strip_tags(&decode_entities(candidate));
        if !text.is_empty() {
            return text;
        }
    }
    String::new()
}

/// Truncates on a char boundary, appending an ellipsis when shortened.
pub fn truncate_chars(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_named_and_numeric_references() {
        assert_eq!(decode_entities("Sales &amp; Marketing"), "Sales & Marketing");
        assert_eq!(decode_entities("Jakarta &#8211; Selatan"), "Jakarta \u{2013} Selatan");
        assert_eq!(decode_entities("&quot;Remote&quot; &#39;ok&#39;"), "\"Remote\" 'ok'");
        assert_eq!(decode_entities("plain"), "plain");
    }

    #[test]
    fn decoding_keeps_markup() {
        assert_eq!(
            decode_entities("<p>R&amp;D</p>"),
            "<p>R&D</p>"
        );
        assert_eq!(decode_entities("&lt;b&gt;"), "<b>");
    }

    #[test]
    fn strips_tags_to_text() {
        assert_eq!(strip_tags("<p>Hello <strong>world</strong></p>\n"), "Hello world");
    }

    #[test]
    fn description_prefers_seo_text_then_excerpt() {
        assert_eq!(
            preferred_description("<p>Excerpt</p>", "<b>SEO &amp; more</b>"),
            "SEO & more"
        );
        assert_eq!(preferred_description("<p>Excerpt &amp; co</p>", "   "), "Excerpt & co");
        assert_eq!(preferred_description("<p> </p>", ""), "");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("Lowongan", 20), "Lowongan");
        assert_eq!(truncate_chars("Gaji Rp 8–12 Juta", 9), "Gaji Rp 8...");
    }
}
