//! App-marketplace adapters.
//!
//! Store listings wrap every app in the same chrome, so their paragraphs say
//! more about the store than the app. These adapters read the description
//! block instead.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use super::{SiteAdapter, element_text};

static APP_STORE_DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| {
    sel("body > div.ember-view > main > div.animation-wrapper.is-visible > section:nth-child(4) > div")
});

static PLAY_STORE_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| sel(r#"div[data-g-id="description"]"#));

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e}"))
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

fn host_is(url: &Url, host: &str) -> bool {
    url.host_str() == Some(host)
}

/// Apple App Store listings.
pub struct AppStoreAdapter;

impl SiteAdapter for AppStoreAdapter {
    fn detect(&self, url: &Url) -> bool {
        host_is(url, "apps.apple.com")
    }

    fn extract_body(&self, doc: &Html) -> Option<String> {
        first_text(doc, &APP_STORE_DESCRIPTION)
    }

    fn name(&self) -> &str {
        "app-store"
    }
}

/// Google Play listings.
pub struct PlayStoreAdapter;

impl SiteAdapter for PlayStoreAdapter {
    fn detect(&self, url: &Url) -> bool {
        host_is(url, "play.google.com")
    }

    fn extract_body(&self, doc: &Html) -> Option<String> {
        first_text(doc, &PLAY_STORE_DESCRIPTION)
    }

    fn name(&self) -> &str {
        "play-store"
    }
}
