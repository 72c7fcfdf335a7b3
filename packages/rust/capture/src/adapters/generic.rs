//! Generic (fallback) site adapter.
//!
//! Always matches. Body text is every `<p>` in document order, one per line.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use super::{SiteAdapter, element_text};

static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("p").unwrap_or_else(|e| panic!("invalid paragraph selector: {e}"))
});

/// Generic adapter that works on arbitrary HTML pages.
pub struct GenericAdapter;

impl SiteAdapter for GenericAdapter {
    fn detect(&self, _url: &Url) -> bool {
        true
    }

    fn extract_body(&self, doc: &Html) -> Option<String> {
        let paragraphs: Vec<String> = doc
            .select(&PARAGRAPH)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect();
        Some(paragraphs.join("\n"))
    }

    fn name(&self) -> &str {
        "generic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paragraphs_skipping_empty() {
        let doc = Html::parse_document(
            "<body><p>Hello\n   world</p><div><p> </p><p>Second</p></div></body>",
        );
        assert_eq!(GenericAdapter.extract_body(&doc).unwrap(), "Hello world\nSecond");
    }
}
