//! Batch pipeline: listing page → per-item enrichment → keyed upsert.
//!
//! Items are processed one at a time. Each goes through the duplicate gate,
//! content capture, summary, categorization and keyword derivation before it
//! is stored. Per-item failures are reported as [`ItemOutcome`]s and never
//! stop the batch; only an unreadable listing page does.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use tracing::{info, instrument, warn};
use url::Url;

use toolharvest_capture::{CaptureOutcome, ContentCapture, PageRenderer, RenderOptions};
use toolharvest_shared::{
    CandidateRecord, EnrichedRecord, PipelineConfig, Result, ToolHarvestError, top_category_label,
};
use toolharvest_storage::Storage;

use crate::categorize::Categorizer;
use crate::gate::{GateDecision, check_duplicate};
use crate::keywords::build_keywords;
use crate::llm::CompletionClient;
use crate::store::RecordStore;
use crate::summarize::Summarizer;

// ---------------------------------------------------------------------------
// Context and outcomes
// ---------------------------------------------------------------------------

/// Collaborators for one batch. Everything is borrowed; the caller owns the
/// browser, the store and the LLM client and tears them down.
pub struct BatchContext<'a> {
    pub renderer: &'a dyn PageRenderer,
    pub capture: &'a ContentCapture,
    pub llm: &'a dyn CompletionClient,
    pub store: &'a dyn RecordStore,
    pub config: &'a PipelineConfig,
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Enriched and upserted.
    Stored,
    /// Key already in the store.
    Duplicate,
    /// Duplicate check failed under the fail-closed policy.
    Blocked,
    /// 5xx or soft 404.
    Unavailable { status: u16, reason: String },
    /// Navigation failed or the page had no text.
    EmptyContent { reason: String },
    /// The summary request failed or returned nothing.
    EmptySummary,
    /// The categorizer hit its attempt ceiling.
    Uncategorized { attempts: u32 },
    /// Any other error, including a failed upsert.
    Failed { error: String },
}

impl ItemOutcome {
    /// Short label for progress output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Duplicate => "duplicate",
            Self::Blocked => "blocked",
            Self::Unavailable { .. } => "unavailable",
            Self::EmptyContent { .. } => "empty content",
            Self::EmptySummary => "empty summary",
            Self::Uncategorized { .. } => "uncategorized",
            Self::Failed { .. } => "failed",
        }
    }

    /// Whether the item was skipped before anything was stored, as opposed
    /// to failing partway.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::Duplicate
                | Self::Blocked
                | Self::Unavailable { .. }
                | Self::EmptyContent { .. }
                | Self::EmptySummary
        )
    }
}

/// Counts for a finished batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub source_url: String,
    pub candidates: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl BatchReport {
    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Stored => self.stored += 1,
            ItemOutcome::Duplicate => self.duplicates += 1,
            o if o.is_skip() => self.skipped += 1,
            _ => self.failed += 1,
        }
    }

    /// Items that went through the pipeline rather than being skipped as duplicates.
    pub fn processed(&self) -> usize {
        self.candidates - self.duplicates
    }
}

fn serialize_millis<S: serde::Serializer>(
    d: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Progress callback for reporting batch status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before an item is processed. `index` is zero-based.
    fn item_started(&self, index: usize, total: usize, candidate: &CandidateRecord);
    /// Called after an item is processed.
    fn item_finished(
        &self,
        index: usize,
        total: usize,
        candidate: &CandidateRecord,
        outcome: &ItemOutcome,
    );
    /// Called when the batch completes.
    fn done(&self, report: &BatchReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_started(&self, _index: usize, _total: usize, _candidate: &CandidateRecord) {}
    fn item_finished(
        &self,
        _index: usize,
        _total: usize,
        _candidate: &CandidateRecord,
        _outcome: &ItemOutcome,
    ) {
    }
    fn done(&self, _report: &BatchReport) {}
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Run one batch over the listing page at `source_url`.
///
/// Fails only when the listing page cannot be rendered.
#[instrument(skip_all, fields(source = %source_url))]
pub async fn run_batch(
    ctx: &BatchContext<'_>,
    source_url: &Url,
    progress: &dyn ProgressReporter,
) -> Result<BatchReport> {
    let start = Instant::now();

    progress.phase("Rendering listing page");
    let listing = ctx
        .renderer
        .render(source_url.as_str(), RenderOptions::default())
        .await?;
    if let Some(status) = listing.status.filter(|s| *s >= 400) {
        return Err(ToolHarvestError::Network(format!(
            "listing page returned HTTP {status}"
        )));
    }
    let page_url = Url::parse(&listing.final_url).unwrap_or_else(|_| source_url.clone());
    let candidates = toolharvest_listing::extract_candidates(&listing.html, &page_url);

    let mut report = BatchReport {
        source_url: source_url.to_string(),
        candidates: candidates.len(),
        ..Default::default()
    };

    progress.phase("Enriching tools");
    let total = candidates.len();
    for (i, candidate) in candidates.iter().enumerate() {
        progress.item_started(i, total, candidate);
        let outcome = process_candidate(ctx, candidate).await;
        info!(data_id = %candidate.data_id, outcome = outcome.label(), "item finished");
        report.record(&outcome);
        progress.item_finished(i, total, candidate, &outcome);

        if i + 1 < total {
            tokio::time::sleep(item_delay(ctx.config)).await;
        }
    }

    report.elapsed = start.elapsed();
    progress.done(&report);
    info!(
        candidates = report.candidates,
        stored = report.stored,
        duplicates = report.duplicates,
        skipped = report.skipped,
        failed = report.failed,
        elapsed_ms = report.elapsed.as_millis(),
        "batch complete"
    );
    Ok(report)
}

/// Enrich and store one candidate.
#[instrument(skip_all, fields(data_id = %candidate.data_id, url = %candidate.url))]
pub async fn process_candidate(ctx: &BatchContext<'_>, candidate: &CandidateRecord) -> ItemOutcome {
    match check_duplicate(ctx.store, &candidate.data_id, ctx.config.duplicate_policy).await {
        GateDecision::Proceed => {}
        GateDecision::Duplicate => return ItemOutcome::Duplicate,
        GateDecision::Blocked => return ItemOutcome::Blocked,
    }

    let content = match ctx.capture.capture(ctx.renderer, &candidate.url).await {
        CaptureOutcome::Captured(content) => content,
        CaptureOutcome::Unavailable { status, reason } => {
            return ItemOutcome::Unavailable { status, reason };
        }
        CaptureOutcome::Empty { reason } => return ItemOutcome::EmptyContent { reason },
    };

    let summary = Summarizer::from(ctx.config)
        .summarize(ctx.llm, &content.contents)
        .await;
    if summary.is_empty() {
        return ItemOutcome::EmptySummary;
    }

    let categorization = match Categorizer::from(ctx.config)
        .categorize(ctx.llm, &candidate.task, &candidate.use_case, &summary)
        .await
    {
        Ok(c) => c,
        Err(ToolHarvestError::CategorizationExhausted { attempts }) => {
            return ItemOutcome::Uncategorized { attempts };
        }
        Err(e) => return ItemOutcome::Failed { error: e.to_string() },
    };

    let keywords = build_keywords(candidate, &summary, &categorization.scores);
    let record = EnrichedRecord {
        candidate: candidate.clone(),
        summary,
        screenshot: content.screenshot,
        favicon: content.favicon,
        category: top_category_label(&categorization.scores),
        categories: categorization.scores,
        keywords_raw: keywords.raw,
        keywords: keywords.filtered,
    };

    match ctx.store.upsert(&record).await {
        Ok(()) => ItemOutcome::Stored,
        Err(e) => {
            warn!(error = %e, "upsert failed");
            ItemOutcome::Failed { error: e.to_string() }
        }
    }
}

/// Uniformly random pause between items.
fn item_delay(config: &PipelineConfig) -> Duration {
    let min = config.delay_min.as_millis() as u64;
    let max = config.delay_max.as_millis() as u64;
    if max <= min {
        return config.delay_min;
    }
    Duration::from_millis(rand::rng().random_range(min..=max))
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

/// Counts for a maintenance pass over stored records.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceReport {
    pub examined: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Re-run the categorizer for stored tools whose ranking is missing or
/// invalid, and refresh the derived category and keyword fields.
#[instrument(skip_all)]
pub async fn recategorize_stored(
    storage: &Storage,
    llm: &dyn CompletionClient,
    config: &PipelineConfig,
    progress: &dyn ProgressReporter,
) -> Result<MaintenanceReport> {
    progress.phase("Finding tools to recategorize");
    let tools = storage.list_tools_needing_categories().await?;
    let categorizer = Categorizer::from(config);
    let mut report = MaintenanceReport {
        examined: tools.len(),
        ..Default::default()
    };

    progress.phase("Recategorizing");
    let total = tools.len();
    for (i, tool) in tools.iter().enumerate() {
        let record = &tool.record;
        let candidate = &record.candidate;
        progress.item_started(i, total, candidate);

        let outcome = match categorizer
            .categorize(llm, &candidate.task, &candidate.use_case, &record.summary)
            .await
        {
            Ok(categorization) => {
                let scores = categorization.scores;
                let keywords = build_keywords(candidate, &record.summary, &scores);
                match storage
                    .update_categories(
                        &candidate.data_id,
                        &scores,
                        &top_category_label(&scores),
                        &keywords.raw,
                        &keywords.filtered,
                    )
                    .await
                {
                    Ok(()) => ItemOutcome::Stored,
                    Err(e) => ItemOutcome::Failed { error: e.to_string() },
                }
            }
            Err(ToolHarvestError::CategorizationExhausted { attempts }) => {
                ItemOutcome::Uncategorized { attempts }
            }
            Err(e) => ItemOutcome::Failed { error: e.to_string() },
        };

        match outcome {
            ItemOutcome::Stored => report.updated += 1,
            _ => report.failed += 1,
        }
        progress.item_finished(i, total, candidate, &outcome);
    }

    info!(
        examined = report.examined,
        updated = report.updated,
        failed = report.failed,
        "recategorize complete"
    );
    Ok(report)
}

/// Resolve favicons for stored tools that have none. Each page is rendered
/// so icon links added by scripts are visible.
#[instrument(skip_all)]
pub async fn refresh_favicons(
    storage: &Storage,
    renderer: &dyn PageRenderer,
    capture: &ContentCapture,
    progress: &dyn ProgressReporter,
) -> Result<MaintenanceReport> {
    progress.phase("Finding tools without favicons");
    let missing = storage.list_missing_favicons().await?;
    let mut report = MaintenanceReport {
        examined: missing.len(),
        ..Default::default()
    };

    progress.phase("Resolving favicons");
    let total = missing.len();
    for (i, (data_id, url)) in missing.iter().enumerate() {
        let candidate = CandidateRecord {
            data_id: data_id.clone(),
            url: url.clone(),
            ..Default::default()
        };
        progress.item_started(i, total, &candidate);

        let outcome = match resolve_stored_favicon(storage, renderer, capture, data_id, url).await {
            Ok(true) => ItemOutcome::Stored,
            Ok(false) => ItemOutcome::EmptyContent {
                reason: "no favicon found".into(),
            },
            Err(e) => {
                warn!(%data_id, error = %e, "favicon refresh failed");
                ItemOutcome::Failed { error: e.to_string() }
            }
        };
        match outcome {
            ItemOutcome::Stored => report.updated += 1,
            ItemOutcome::Failed { .. } => report.failed += 1,
            _ => {}
        }
        progress.item_finished(i, total, &candidate, &outcome);
    }

    info!(
        examined = report.examined,
        updated = report.updated,
        failed = report.failed,
        "favicon refresh complete"
    );
    Ok(report)
}

async fn resolve_stored_favicon(
    storage: &Storage,
    renderer: &dyn PageRenderer,
    capture: &ContentCapture,
    data_id: &str,
    url: &str,
) -> Result<bool> {
    let page = renderer.render(url, RenderOptions::default()).await?;
    let page_url = Url::parse(&page.final_url)
        .or_else(|_| Url::parse(url))
        .map_err(|e| ToolHarvestError::validation(format!("invalid URL {url}: {e}")))?;

    match capture.favicons().resolve(&page_url, &page.html).await {
        Some(icon) => {
            storage.update_favicon(data_id, &icon.to_base64()).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}
