//! Listing page extraction.
//!
//! The listing page is a flat list of `div.tasks > li` containers, one per
//! tool, with the tool's identity carried in `data-*` attributes and a few
//! child anchors. [`extract_candidates`] turns the rendered markup into
//! [`CandidateRecord`]s; entries without a usable key or target URL are
//! dropped with a warning.

use std::sync::LazyLock;

use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use toolharvest_shared::CandidateRecord;
use tracing::{debug, info, warn};
use url::Url;

static ITEM: LazyLock<Selector> = LazyLock::new(|| sel("div.tasks > li"));
static USE_CASE: LazyLock<Selector> = LazyLock::new(|| sel("a.use_case"));
static LAUNCH_DATE: LazyLock<Selector> = LazyLock::new(|| sel("a.ai_launch_date"));
static THUMBNAIL: LazyLock<Selector> = LazyLock::new(|| sel("img"));
static AI_LINK: LazyLock<Selector> = LazyLock::new(|| sel("a.ai_link"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e}"))
}

/// Launch-date layouts seen on the listing, tried in order.
const DATE_FORMATS: &[&str] = &["%d %b %Y", "%b %d, %Y", "%b %d %Y", "%Y-%m-%d", "%d/%m/%Y"];

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract every candidate from a rendered listing page.
///
/// `page_url` resolves relative thumbnail and link hrefs.
pub fn extract_candidates(html: &str, page_url: &Url) -> Vec<CandidateRecord> {
    let doc = Html::parse_document(html);
    let mut candidates = Vec::new();
    let mut dropped = 0usize;

    for item in doc.select(&ITEM) {
        match extract_item(item, page_url) {
            Some(candidate) => candidates.push(candidate),
            None => dropped += 1,
        }
    }

    info!(
        found = candidates.len(),
        dropped,
        "extracted listing candidates"
    );
    candidates
}

fn extract_item(item: ElementRef<'_>, page_url: &Url) -> Option<CandidateRecord> {
    let attr = |name: &str| item.value().attr(name).unwrap_or_default().trim().to_string();

    let data_id = attr("data-id");
    let name = attr("data-name");
    if data_id.is_empty() {
        warn!(%name, "listing entry without data-id, dropping");
        return None;
    }

    let raw_url = attr("data-url");
    let Some(url) = normalize_target_url(&raw_url) else {
        warn!(%data_id, url = %raw_url, "listing entry without a valid URL, dropping");
        return None;
    };

    let launch_date_text = child_text(item, &LAUNCH_DATE);
    let launch_date = parse_launch_date(&launch_date_text);
    if launch_date.is_none() && !launch_date_text.is_empty() {
        debug!(%data_id, text = %launch_date_text, "unrecognized launch date");
    }

    let thumbnail_url = item
        .select(&THUMBNAIL)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(|src| strip_resize_query(&resolve(page_url, src)));

    let link_href = item
        .select(&AI_LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| resolve(page_url, href));

    Some(CandidateRecord {
        data_id,
        name,
        task: attr("data-task"),
        task_slug: attr("data-task_slug"),
        url,
        use_case: child_text(item, &USE_CASE),
        launch_date_text,
        launch_date,
        thumbnail_url,
        link_href,
    })
}

fn child_text(item: ElementRef<'_>, selector: &Selector) -> String {
    item.select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn resolve(base: &Url, href: &str) -> String {
    base.join(href.trim())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.trim().to_string())
}

// ---------------------------------------------------------------------------
// Field normalization
// ---------------------------------------------------------------------------

/// Validate a target URL, retrying with an `https://` prefix when the raw
/// value has no scheme. Only `http`/`https` URLs with a host are accepted.
pub fn normalize_target_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let is_web = |u: &Url| matches!(u.scheme(), "http" | "https") && u.host_str().is_some();

    if let Ok(url) = Url::parse(raw) {
        if is_web(&url) {
            return Some(url.to_string());
        }
    }

    Url::parse(&format!("https://{raw}"))
        .ok()
        .filter(is_web)
        .map(|u| u.to_string())
}

/// Parse the listing's launch-date text into a calendar date.
pub fn parse_launch_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Drop the listing CDN's `height` resize parameter from a thumbnail URL.
pub fn strip_resize_query(src: &str) -> String {
    let Ok(mut url) = Url::parse(src) else {
        return src.to_string();
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "height")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn listing_url() -> Url {
        Url::parse("https://listing.example.com/").unwrap()
    }

    #[test]
    fn extracts_valid_entries_in_document_order() {
        let html = load_fixture("listing.html");
        let candidates = extract_candidates(&html, &listing_url());

        let ids: Vec<&str> = candidates.iter().map(|c| c.data_id.as_str()).collect();
        assert_eq!(ids, vec!["1001", "1002", "1005"]);
    }

    #[test]
    fn extracts_all_fields() {
        let html = load_fixture("listing.html");
        let candidates = extract_candidates(&html, &listing_url());
        let pixelate = &candidates[0];

        assert_eq!(pixelate.name, "Pixelate");
        assert_eq!(pixelate.task, "Image generation");
        assert_eq!(pixelate.task_slug, "image-generation");
        assert_eq!(pixelate.url, "https://pixelate.example.com/?ref=listing");
        assert_eq!(pixelate.use_case, "Turn prompts into pixel art");
        assert_eq!(pixelate.launch_date_text, "15 Mar 2023");
        assert_eq!(pixelate.launch_date, NaiveDate::from_ymd_opt(2023, 3, 15));
        assert_eq!(
            pixelate.thumbnail_url.as_deref(),
            Some("https://media.example.com/pixelate.png")
        );
        assert_eq!(
            pixelate.link_href.as_deref(),
            Some("https://listing.example.com/ai/pixelate/")
        );
    }

    #[test]
    fn schemeless_url_gets_https() {
        let html = load_fixture("listing.html");
        let candidates = extract_candidates(&html, &listing_url());
        assert_eq!(candidates[1].url, "https://voicebox.example.com/");
        assert_eq!(candidates[1].launch_date, NaiveDate::from_ymd_opt(2023, 4, 2));
    }

    #[test]
    fn missing_optional_children_are_empty() {
        let html = load_fixture("listing.html");
        let candidates = extract_candidates(&html, &listing_url());
        let sheetwise = &candidates[2];
        assert!(sheetwise.thumbnail_url.is_none());
        assert!(sheetwise.link_href.is_none());
        assert_eq!(sheetwise.launch_date_text, "");
        assert!(sheetwise.launch_date.is_none());
    }

    #[test]
    fn empty_page_yields_nothing() {
        let candidates = extract_candidates("<html><body></body></html>", &listing_url());
        assert!(candidates.is_empty());
    }

    #[test]
    fn target_url_normalization() {
        assert_eq!(
            normalize_target_url("example.com/tool").as_deref(),
            Some("https://example.com/tool")
        );
        assert_eq!(
            normalize_target_url("http://example.com").as_deref(),
            Some("http://example.com/")
        );
        assert!(normalize_target_url("").is_none());
        assert!(normalize_target_url("not a url").is_none());
        assert!(normalize_target_url("mailto:someone@example.com").is_none());
    }

    #[test]
    fn resize_query_is_stripped() {
        assert_eq!(
            strip_resize_query("https://cdn.example.com/a.png?height=207"),
            "https://cdn.example.com/a.png"
        );
        assert_eq!(
            strip_resize_query("https://cdn.example.com/a.png?height=207&v=2"),
            "https://cdn.example.com/a.png?v=2"
        );
        assert_eq!(strip_resize_query("/relative.png"), "/relative.png");
    }

    #[test]
    fn launch_date_formats() {
        assert_eq!(parse_launch_date("2023-01-09"), NaiveDate::from_ymd_opt(2023, 1, 9));
        assert_eq!(parse_launch_date("Jan 9, 2023"), NaiveDate::from_ymd_opt(2023, 1, 9));
        assert_eq!(parse_launch_date("9 January 2023"), NaiveDate::from_ymd_opt(2023, 1, 9));
        assert!(parse_launch_date("soon").is_none());
    }
}
