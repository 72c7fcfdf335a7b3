//! Site adapters for body-text extraction.
//!
//! App-marketplace pages bury the description in a deep, site-specific
//! element, while ordinary sites carry their text in paragraphs. Adapters are
//! tried in priority order; [`GenericAdapter`] is the always-last fallback.

mod generic;
mod marketplace;

use scraper::Html;
use url::Url;

pub use generic::GenericAdapter;
pub use marketplace::{AppStoreAdapter, PlayStoreAdapter};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Trait for site-specific body extraction.
pub trait SiteAdapter: Send + Sync {
    /// Whether this adapter handles pages at `url`.
    fn detect(&self, url: &Url) -> bool;

    /// Extract the body text. `None` means the expected element was absent.
    fn extract_body(&self, doc: &Html) -> Option<String>;

    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds registered adapters in priority order.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn SiteAdapter>>,
}

impl AdapterRegistry {
    /// Create a registry with all built-in adapters (marketplaces first, generic last).
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Box::new(AppStoreAdapter),
                Box::new(PlayStoreAdapter),
                Box::new(GenericAdapter),
            ],
        }
    }

    /// Detect the adapter for a URL. Always returns one.
    pub fn detect(&self, url: &Url) -> &dyn SiteAdapter {
        self.adapters
            .iter()
            .find(|a| a.detect(url))
            .map(|a| a.as_ref())
            .unwrap_or(&GenericAdapter)
    }

    /// Extract body text with the detected adapter, falling back to
    /// paragraph text when a site-specific element is missing.
    pub fn extract_body(&self, url: &Url, doc: &Html) -> String {
        let adapter = self.detect(url);
        match adapter.extract_body(doc) {
            Some(body) => body,
            None => {
                tracing::debug!(adapter = adapter.name(), "override element missing, using paragraphs");
                GenericAdapter.extract_body(doc).unwrap_or_default()
            }
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Whitespace-normalized text of an element.
pub(crate) fn element_text(el: scraper::ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
