//! Favicon resolution cascade.
//!
//! Strategies run in a fixed order and the first one that yields bytes wins:
//!
//! 1. **Site rule**: for configured URL prefixes (app marketplaces), read the
//!    icon `<img>`/`<source>` named by the rule's selector.
//! 2. **Default**: `<origin>/favicon.ico`, only when no site rule matched.
//! 3. **Link elements**: every `<link rel*="icon">` in document order.
//!
//! Every fetch is bounded by a timeout and a redirect limit, and rejects HTML
//! and empty bodies. SVG icons are rasterized to PNG when possible.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use scraper::{Html, Selector};
use toolharvest_shared::{FaviconConfig, FaviconSiteRule, Result, ToolHarvestError};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::imaging::{looks_like_svg, svg_to_png};

static ICON_LINK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"link[rel*="icon"]"#).unwrap_or_else(|e| panic!("invalid link selector: {e}"))
});

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which strategy produced an icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaviconSource {
    SiteRule,
    DefaultIco,
    LinkElement,
    DataUri,
}

/// A resolved site icon.
#[derive(Debug, Clone)]
pub struct Favicon {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub source: FaviconSource,
}

impl Favicon {
    /// Base64 (standard alphabet) encoding of the icon bytes.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    SiteRule,
    DefaultIco,
    LinkElements,
}

impl Strategy {
    const ORDER: [Strategy; 3] = [Self::SiteRule, Self::DefaultIco, Self::LinkElements];
}

/// A `<link rel*="icon">` candidate.
#[derive(Debug, Clone)]
struct IconLink {
    href: String,
    link_type: Option<String>,
}

/// Everything the cascade needs from the page, read up front.
#[derive(Debug, Default)]
struct PageIcons {
    rule_src: Option<String>,
    links: Vec<IconLink>,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolves a site icon for a rendered page.
pub struct FaviconResolver {
    client: Client,
    site_rules: Vec<FaviconSiteRule>,
}

impl FaviconResolver {
    pub fn new(config: &FaviconConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(config.timeout)
            .build()
            .map_err(|e| ToolHarvestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            site_rules: config.site_rules.clone(),
        })
    }

    /// Run the cascade for `page_url` whose rendered markup is `html`.
    /// Returns `None` when every strategy came up empty.
    #[instrument(skip_all, fields(url = %page_url))]
    pub async fn resolve(&self, page_url: &Url, html: &str) -> Option<Favicon> {
        let rule = self
            .site_rules
            .iter()
            .find(|r| page_url.as_str().starts_with(&r.url_prefix));
        let icons = scan_page(html, page_url, rule);

        for strategy in Strategy::ORDER {
            let found = match strategy {
                Strategy::SiteRule => match (rule, &icons.rule_src) {
                    (Some(_), Some(src)) => self.try_url(src, None, FaviconSource::SiteRule).await,
                    (Some(r), None) => {
                        debug!(selector = %r.selector, "site rule matched but no icon element");
                        None
                    }
                    (None, _) => continue,
                },
                Strategy::DefaultIco => {
                    if rule.is_some() {
                        continue;
                    }
                    match page_url.join("/favicon.ico") {
                        Ok(ico) => self.try_url(ico.as_str(), None, FaviconSource::DefaultIco).await,
                        Err(_) => None,
                    }
                }
                Strategy::LinkElements => self.try_links(page_url, &icons.links).await,
            };

            if let Some(icon) = found {
                info!(source = ?icon.source, bytes = icon.bytes.len(), "favicon resolved");
                return Some(icon);
            }
            debug!(?strategy, "favicon strategy came up empty");
        }

        warn!("no favicon found");
        None
    }

    async fn try_links(&self, page_url: &Url, links: &[IconLink]) -> Option<Favicon> {
        debug!(count = links.len(), "trying link elements");
        for link in links {
            if link
                .link_type
                .as_deref()
                .is_some_and(|t| t.to_ascii_lowercase().contains("css"))
            {
                debug!(href = %link.href, "skipping stylesheet-typed link");
                continue;
            }

            if link.href.starts_with("data:") {
                match decode_data_uri(&link.href) {
                    Some(icon) => return Some(icon),
                    None => {
                        debug!("undecodable data URI");
                        continue;
                    }
                }
            }

            let Ok(icon_url) = page_url.join(&link.href) else {
                debug!(href = %link.href, "unresolvable icon href");
                continue;
            };
            if let Some(icon) = self
                .try_url(icon_url.as_str(), link.link_type.as_deref(), FaviconSource::LinkElement)
                .await
            {
                return Some(icon);
            }
        }
        None
    }

    /// Fetch one candidate URL. Any failure is logged and yields `None`.
    async fn try_url(
        &self,
        url: &str,
        declared_type: Option<&str>,
        source: FaviconSource,
    ) -> Option<Favicon> {
        match self.fetch(url).await {
            Ok((bytes, content_type)) => {
                let declared = declared_type.map(str::to_string).or(content_type);
                Some(finish(bytes, declared, source))
            }
            Err(e) => {
                debug!(url, error = %e, "favicon fetch rejected");
                None
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<(Vec<u8>, Option<String>)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolHarvestError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolHarvestError::Network(format!("{url}: HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());
        if content_type.as_deref().is_some_and(|t| t.contains("text/html")) {
            return Err(ToolHarvestError::validation(format!("{url}: got HTML, not an icon")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ToolHarvestError::Network(format!("{url}: failed to read body: {e}")))?;
        if bytes.is_empty() {
            return Err(ToolHarvestError::validation(format!("{url}: empty body")));
        }
        if looks_like_html(&bytes) {
            return Err(ToolHarvestError::validation(format!("{url}: body is HTML")));
        }

        Ok((bytes.to_vec(), content_type))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read the site-rule icon source and link candidates out of the page.
fn scan_page(html: &str, page_url: &Url, rule: Option<&FaviconSiteRule>) -> PageIcons {
    let doc = Html::parse_document(html);

    let rule_src = rule.and_then(|r| match Selector::parse(&r.selector) {
        Ok(sel) => doc.select(&sel).find_map(|el| {
            let v = el.value();
            v.attr("src")
                .map(str::to_string)
                .or_else(|| v.attr("srcset").and_then(first_srcset_candidate))
        }),
        Err(e) => {
            warn!(selector = %r.selector, error = %e, "invalid favicon site-rule selector");
            None
        }
    });
    let rule_src = rule_src.and_then(|src| page_url.join(src.trim()).ok().map(|u| u.to_string()));

    let links = doc
        .select(&ICON_LINK)
        .filter_map(|el| {
            let href = el.value().attr("href")?.trim();
            (!href.is_empty()).then(|| IconLink {
                href: href.to_string(),
                link_type: el.value().attr("type").map(str::to_string),
            })
        })
        .collect();

    PageIcons { rule_src, links }
}

/// First URL of a `srcset` attribute.
fn first_srcset_candidate(srcset: &str) -> Option<String> {
    srcset
        .split(',')
        .next()
        .and_then(|c| c.split_whitespace().next())
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

fn looks_like_html(bytes: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]).to_ascii_lowercase();
    let head = head.trim_start();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Decode a `data:` URI into icon bytes.
fn decode_data_uri(uri: &str) -> Option<Favicon> {
    let rest = uri.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let is_base64 = meta.ends_with(";base64");
    let mime = meta.trim_end_matches(";base64").split(';').next().unwrap_or_default();

    let bytes = if is_base64 {
        STANDARD.decode(payload.trim()).ok()?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };
    if bytes.is_empty() {
        return None;
    }

    let content_type = (!mime.is_empty()).then(|| mime.to_ascii_lowercase());
    Some(finish(bytes, content_type, FaviconSource::DataUri))
}

/// Rasterize SVG payloads, keeping the original bytes if that fails.
fn finish(bytes: Vec<u8>, content_type: Option<String>, source: FaviconSource) -> Favicon {
    let declared_svg = content_type.as_deref().is_some_and(|t| t.contains("svg"));
    if declared_svg || looks_like_svg(&bytes) {
        match svg_to_png(&bytes) {
            Ok(png) => {
                return Favicon {
                    bytes: png,
                    content_type: Some("image/png".into()),
                    source,
                };
            }
            Err(e) => debug!(error = %e, "svg conversion failed, keeping original bytes"),
        }
    }
    Favicon {
        bytes,
        content_type,
        source,
    }
}
