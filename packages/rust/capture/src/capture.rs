//! Per-item content capture.
//!
//! Renders a candidate's page, classifies hard and soft failures, and turns
//! the rest into a [`CapturedContent`]: concatenated text signal, a JPEG
//! screenshot and an optional base64 favicon.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::adapters::AdapterRegistry;
use crate::favicon::FaviconResolver;
use crate::imaging::encode_jpeg;
use crate::renderer::{PageRenderer, RenderOptions, RenderedPage};

/// Case-insensitive substrings that mark a 4xx page as a real "not found".
const SOFT_404_MARKERS: &[&str] = &[
    "404",
    "not found",
    "error",
    "unavailable",
    "could not",
    // Korean
    "찾을 수 없",
    "존재하지 않",
    "오류",
    // Japanese
    "見つかりません",
    "存在しません",
    "エラー",
];

static TITLE: LazyLock<Selector> = LazyLock::new(|| sel("title"));

/// Head metadata read into the text signal, in order.
static META_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        r#"meta[name="description"]"#,
        r#"meta[name="keywords"]"#,
        r#"meta[property="og:title"]"#,
        r#"meta[property="og:description"]"#,
        r#"meta[name="twitter:title"]"#,
        r#"meta[name="twitter:description"]"#,
    ]
    .into_iter()
    .map(sel)
    .collect()
});

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e}"))
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Text signal, screenshot and icon for one page.
#[derive(Debug, Clone, Default)]
pub struct CapturedContent {
    /// Title, metadata and body text, newline separated.
    pub contents: String,
    /// JPEG screenshot. Empty if the screenshot could not be taken.
    pub screenshot: Vec<u8>,
    /// Base64-encoded icon.
    pub favicon: Option<String>,
}

/// Result of capturing one page.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// Content was captured.
    Captured(CapturedContent),
    /// The target is permanently unavailable (5xx or soft 404).
    Unavailable { status: u16, reason: String },
    /// Navigation or extraction failed, or the page had no text.
    Empty { reason: String },
}

// ---------------------------------------------------------------------------
// ContentCapture
// ---------------------------------------------------------------------------

/// Captures content for candidates through a shared renderer.
pub struct ContentCapture {
    adapters: AdapterRegistry,
    favicons: FaviconResolver,
    jpeg_quality: u8,
}

impl ContentCapture {
    pub fn new(favicons: FaviconResolver, jpeg_quality: u8) -> Self {
        Self {
            adapters: AdapterRegistry::new(),
            favicons,
            jpeg_quality,
        }
    }

    /// The resolver used for icons, for callers that only need favicons.
    pub fn favicons(&self) -> &FaviconResolver {
        &self.favicons
    }

    /// Render `url` and capture its content.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn capture(&self, renderer: &dyn PageRenderer, url: &str) -> CaptureOutcome {
        let page = match renderer.render(url, RenderOptions { screenshot: true }).await {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "render failed");
                return CaptureOutcome::Empty {
                    reason: e.to_string(),
                };
            }
        };

        if let Some(outcome) = classify_status(&page) {
            return outcome;
        }

        let page_url = Url::parse(&page.final_url)
            .or_else(|_| Url::parse(url))
            .ok();
        let Some(page_url) = page_url else {
            return CaptureOutcome::Empty {
                reason: format!("unparseable page URL {}", page.final_url),
            };
        };

        let contents = self.extract_text(&page_url, &page);
        if contents.trim().is_empty() {
            info!("page has no text content");
            return CaptureOutcome::Empty {
                reason: "no text content".into(),
            };
        }

        let screenshot = match page.screenshot_png.as_deref() {
            Some(png) => encode_jpeg(png, self.jpeg_quality).unwrap_or_else(|e| {
                warn!(error = %e, "screenshot re-encoding failed");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let favicon = self
            .favicons
            .resolve(&page_url, &page.html)
            .await
            .map(|icon| icon.to_base64());

        debug!(
            chars = contents.chars().count(),
            screenshot_bytes = screenshot.len(),
            has_favicon = favicon.is_some(),
            "content captured"
        );

        CaptureOutcome::Captured(CapturedContent {
            contents,
            screenshot,
            favicon,
        })
    }

    /// Title, head metadata, then adapter body text. Falls back to the
    /// rendered body text when the page has no paragraphs.
    fn extract_text(&self, page_url: &Url, page: &RenderedPage) -> String {
        let doc = Html::parse_document(&page.html);
        let mut parts: Vec<String> = Vec::new();

        if let Some(title) = doc.select(&TITLE).next() {
            parts.push(title.text().collect::<String>().trim().to_string());
        }
        for selector in META_SELECTORS.iter() {
            if let Some(content) = doc
                .select(selector)
                .next()
                .and_then(|m| m.value().attr("content"))
            {
                parts.push(content.trim().to_string());
            }
        }

        let mut body = self.adapters.extract_body(page_url, &doc);
        if body.trim().is_empty() {
            body = page.body_text.trim().to_string();
        }
        parts.push(body);

        parts.retain(|p| !p.is_empty());
        parts.join("\n")
    }
}

/// Map a response status to a terminal outcome, if it is one.
fn classify_status(page: &RenderedPage) -> Option<CaptureOutcome> {
    let status = page.status?;

    if status >= 500 {
        warn!(status, "server error, target unavailable");
        return Some(CaptureOutcome::Unavailable {
            status,
            reason: format!("HTTP {status}"),
        });
    }

    if (400..500).contains(&status) {
        if let Some(marker) = soft_404_marker(&page.body_text) {
            warn!(status, marker, "soft 404 detected");
            return Some(CaptureOutcome::Unavailable {
                status,
                reason: format!("HTTP {status} page mentions \"{marker}\""),
            });
        }
        debug!(status, "client error without not-found markers, continuing");
    }

    None
}

/// First soft-404 marker found in the body text.
pub fn soft_404_marker(body_text: &str) -> Option<&'static str> {
    let lower = body_text.to_lowercase();
    SOFT_404_MARKERS.iter().copied().find(|m| lower.contains(m))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::imaging::tests::tiny_png;
    use async_trait::async_trait;
    use std::time::Duration;
    use toolharvest_shared::{FaviconConfig, Result, ToolHarvestError};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Renderer double returning a fixed page.
    pub(crate) struct StaticRenderer {
        pub page: Option<RenderedPage>,
    }

    #[async_trait]
    impl PageRenderer for StaticRenderer {
        async fn render(&self, url: &str, _opts: RenderOptions) -> Result<RenderedPage> {
            match &self.page {
                Some(page) => Ok(RenderedPage {
                    final_url: if page.final_url.is_empty() {
                        url.to_string()
                    } else {
                        page.final_url.clone()
                    },
                    ..page.clone()
                }),
                None => Err(ToolHarvestError::Browser("navigation failed".into())),
            }
        }
    }

    fn capture() -> ContentCapture {
        let favicons = FaviconResolver::new(&FaviconConfig {
            timeout: Duration::from_secs(5),
            max_redirects: 5,
            user_agent: "toolharvest-test".into(),
            site_rules: vec![],
        })
        .unwrap();
        ContentCapture::new(favicons, 70)
    }

    fn page(status: u16, html: &str, body_text: &str) -> RenderedPage {
        RenderedPage {
            final_url: String::new(),
            status: Some(status),
            html: html.into(),
            body_text: body_text.into(),
            screenshot_png: Some(tiny_png()),
        }
    }

    #[tokio::test]
    async fn captures_text_screenshot_and_favicon() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/favicon.ico"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/icon.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(tiny_png()))
            .mount(&server)
            .await;

        let html = r#"<html><head><title>Example</title>
            <meta name="description" content="Tools for X">
            <meta property="og:title" content="Example OG">
            <link rel="icon" href="/icon.png"></head>
            <body><p>Welcome to Example — the leading tool for X</p></body></html>"#;
        let renderer = StaticRenderer {
            page: Some(page(200, html, "Welcome to Example — the leading tool for X")),
        };

        let outcome = capture().capture(&renderer, &format!("{}/", server.uri())).await;
        let CaptureOutcome::Captured(content) = outcome else {
            panic!("expected captured content, got {outcome:?}");
        };
        assert_eq!(
            content.contents,
            "Example\nTools for X\nExample OG\nWelcome to Example — the leading tool for X"
        );
        assert_eq!(&content.screenshot[..2], &[0xFF, 0xD8]);
        assert!(content.favicon.is_some());
    }

    #[tokio::test]
    async fn not_found_page_is_unavailable() {
        let renderer = StaticRenderer {
            page: Some(page(404, "<p>Page not found</p>", "Page not found")),
        };
        let outcome = capture().capture(&renderer, "https://gone.example.com/").await;
        assert!(matches!(outcome, CaptureOutcome::Unavailable { status: 404, .. }));
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let renderer = StaticRenderer {
            page: Some(page(503, "<p>Fine</p>", "Fine")),
        };
        let outcome = capture().capture(&renderer, "https://down.example.com/").await;
        assert!(matches!(outcome, CaptureOutcome::Unavailable { status: 503, .. }));
    }

    #[tokio::test]
    async fn render_failure_is_empty() {
        let renderer = StaticRenderer { page: None };
        let outcome = capture().capture(&renderer, "https://x.example.com/").await;
        assert!(matches!(outcome, CaptureOutcome::Empty { .. }));
    }

    #[tokio::test]
    async fn page_without_text_is_empty() {
        let renderer = StaticRenderer {
            page: Some(page(200, "<html><body><div></div></body></html>", "")),
        };
        let outcome = capture().capture(&renderer, "http://127.0.0.1:9/").await;
        assert!(matches!(outcome, CaptureOutcome::Empty { .. }));
    }

    #[test]
    fn soft_404_markers_are_case_insensitive_and_localized() {
        assert_eq!(soft_404_marker("Sorry, Page Not Found"), Some("not found"));
        assert_eq!(soft_404_marker("요청하신 페이지를 찾을 수 없습니다"), Some("찾을 수 없"));
        assert_eq!(soft_404_marker("ページが見つかりません"), Some("見つかりません"));
        assert_eq!(soft_404_marker("Please sign in to continue"), None);
    }

    #[test]
    fn client_error_without_markers_continues() {
        let p = page(403, "<p>Members only</p>", "Members only");
        assert!(classify_status(&p).is_none());
    }
}
