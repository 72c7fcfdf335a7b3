//! Core enrichment logic for ToolHarvest.
//!
//! Ties the listing extractor, page capture, language-model calls and the
//! store together into the batch pipeline and the maintenance passes.

pub mod categorize;
pub mod gate;
pub mod keywords;
pub mod llm;
pub mod pipeline;
pub mod store;
pub mod summarize;

pub use categorize::{Categorization, Categorizer};
pub use llm::{CompletionClient, CompletionRequest, OpenAiClient};
pub use pipeline::{
    BatchContext, BatchReport, ItemOutcome, MaintenanceReport, ProgressReporter, SilentProgress,
    process_candidate, recategorize_stored, refresh_favicons, run_batch,
};
pub use store::RecordStore;
pub use summarize::Summarizer;
