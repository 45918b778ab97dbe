//! HTML preview sanitising.
//! Strips what would execute when a translated e-mail body is rendered for
//! preview: script blocks, inline event handlers and `javascript:` links.

use regex::Regex;

pub struct PreviewSanitizer {
    script_blocks: Regex,
    event_handlers: Regex,
    javascript_hrefs: Regex,
}

impl Default for PreviewSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewSanitizer {
    pub fn new() -> Self {
        Self {
            script_blocks: Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>")
                .expect("script pattern"),
            event_handlers: Regex::new(r#"(?i)\s+on\w+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#)
                .expect("handler pattern"),
            // the whole attribute value goes, quoted or not
            javascript_hrefs: Regex::new(
                r#"(?i)href\s*=\s*("\s*javascript:[^"]*"|'\s*javascript:[^']*'|javascript:[^\s>]*)"#,
            )
            .expect("href pattern"),
        }
    }

    pub fn sanitize(&self, html: &str) -> String {
        let html = self.script_blocks.replace_all(html, "");
        let html = self.event_handlers.replace_all(&html, "");
        self.javascript_hrefs
            .replace_all(&html, "href=\"#\"")
            .into_owned()
    }
}

/// Placeholder rendered when there is nothing to preview.
pub const EMPTY_PREVIEW: &str = "<em>The preview will appear here...</em>";

/// Sanitised preview markup for `html`.
pub fn render_preview(html: &str) -> String {
    if html.trim().is_empty() {
        return EMPTY_PREVIEW.to_string();
    }
    PreviewSanitizer::new().sanitize(html)
}
