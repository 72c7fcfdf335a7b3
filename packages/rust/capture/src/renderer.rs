//! Page rendering seam.
//!
//! Everything that needs a rendered page goes through [`PageRenderer`], so the
//! capture and pipeline code can run against a real browser or a test double.

use async_trait::async_trait;
use toolharvest_shared::Result;

/// What to collect while a page is open.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Take a PNG screenshot clipped to the viewport.
    pub screenshot: bool,
}

/// A page after navigation and settling.
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    /// URL after redirects.
    pub final_url: String,
    /// HTTP status of the main document, when the browser reported one.
    pub status: Option<u16>,
    /// Serialized DOM after scripts ran.
    pub html: String,
    /// `document.body.innerText`.
    pub body_text: String,
    /// PNG screenshot, when requested.
    pub screenshot_png: Option<Vec<u8>>,
}

/// Loads a URL in a browser-like environment.
///
/// Implementations own page lifetime: a page is opened per call and torn
/// down before returning, on success and on error.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, opts: RenderOptions) -> Result<RenderedPage>;
}
