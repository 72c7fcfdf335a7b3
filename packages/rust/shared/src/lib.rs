//! Shared types, error model, and configuration for ToolHarvest.
//!
//! This crate is the foundation depended on by all other ToolHarvest crates.
//! It provides:
//! - [`ToolHarvestError`], the unified error type
//! - Domain types ([`CandidateRecord`], [`Category`], [`EnrichedRecord`])
//! - Configuration ([`AppConfig`], runtime configs, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrowserConfig, BrowserSettings, CategorizerSettings, DefaultsConfig,
    DuplicatePolicy, FaviconConfig, FaviconSettings, FaviconSiteRule, LlmClientConfig, LlmConfig,
    PipelineConfig, PipelineSettings, config_dir, config_file_path, expand_home, init_config,
    load_config, load_config_from, resolve_api_key, to_toml,
};
pub use error::{Result, ToolHarvestError};
pub use types::{
    CandidateRecord, Category, CategoryScore, EnrichedRecord, MAX_SCORE, MAX_SUMMARY_CHARS,
    MIN_TOP_SCORE, RANKED_CATEGORY_COUNT, TOP_CATEGORY_COUNT, is_valid_ranking,
    top_category_label,
};
