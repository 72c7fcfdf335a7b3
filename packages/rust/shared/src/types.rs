//! Core domain types: listing candidates, the category ontology, and
//! enriched tool records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Number of ranked categories a categorization result carries.
pub const RANKED_CATEGORY_COUNT: usize = 5;

/// Number of leading categories that form the derived `category` label
/// and must clear the minimum score.
pub const TOP_CATEGORY_COUNT: usize = 3;

/// Top categories must score strictly above this.
pub const MIN_TOP_SCORE: u32 = 10;

/// Upper bound for any category score.
pub const MAX_SCORE: u32 = 100;

/// Maximum summary length in characters.
pub const MAX_SUMMARY_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// CandidateRecord
// ---------------------------------------------------------------------------

/// A raw, unenriched entry scraped from the listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Business key, unique across the store.
    pub data_id: String,
    /// Display name of the tool.
    pub name: String,
    /// Task label (e.g. "Image generation").
    pub task: String,
    /// Slug form of the task label.
    pub task_slug: String,
    /// Target site URL.
    pub url: String,
    /// Short use-case text shown in the listing.
    pub use_case: String,
    /// Launch date as displayed in the listing.
    pub launch_date_text: String,
    /// Launch date parsed from `launch_date_text`, when recognizable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_date: Option<NaiveDate>,
    /// Thumbnail image URL from the listing (resize query stripped).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Related-link href on the listing site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_href: Option<String>,
}

// ---------------------------------------------------------------------------
// Category ontology
// ---------------------------------------------------------------------------

/// The closed set of 20 category labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Speeches,
    Images,
    #[serde(rename = "Data Analysis")]
    DataAnalysis,
    Videos,
    #[serde(rename = "NLP")]
    Nlp,
    Chatbots,
    Frameworks,
    Education,
    Health,
    #[serde(rename = "Financial Services")]
    FinancialServices,
    Logistics,
    Gaming,
    #[serde(rename = "Human Resources")]
    HumanResources,
    #[serde(rename = "CRM")]
    Crm,
    #[serde(rename = "Contents Creation")]
    ContentsCreation,
    Automation,
    Cybersecurity,
    #[serde(rename = "Social Media")]
    SocialMedia,
    Environment,
    #[serde(rename = "Smart Cities")]
    SmartCities,
}

impl Category {
    /// Every ontology member, in prompt order.
    pub const ALL: [Category; 20] = [
        Self::Speeches,
        Self::Images,
        Self::DataAnalysis,
        Self::Videos,
        Self::Nlp,
        Self::Chatbots,
        Self::Frameworks,
        Self::Education,
        Self::Health,
        Self::FinancialServices,
        Self::Logistics,
        Self::Gaming,
        Self::HumanResources,
        Self::Crm,
        Self::ContentsCreation,
        Self::Automation,
        Self::Cybersecurity,
        Self::SocialMedia,
        Self::Environment,
        Self::SmartCities,
    ];

    /// Canonical display label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Speeches => "Speeches",
            Self::Images => "Images",
            Self::DataAnalysis => "Data Analysis",
            Self::Videos => "Videos",
            Self::Nlp => "NLP",
            Self::Chatbots => "Chatbots",
            Self::Frameworks => "Frameworks",
            Self::Education => "Education",
            Self::Health => "Health",
            Self::FinancialServices => "Financial Services",
            Self::Logistics => "Logistics",
            Self::Gaming => "Gaming",
            Self::HumanResources => "Human Resources",
            Self::Crm => "CRM",
            Self::ContentsCreation => "Contents Creation",
            Self::Automation => "Automation",
            Self::Cybersecurity => "Cybersecurity",
            Self::SocialMedia => "Social Media",
            Self::Environment => "Environment",
            Self::SmartCities => "Smart Cities",
        }
    }

    /// Look up an ontology member by label. Matching ignores ASCII case,
    /// surrounding whitespace and stray dots.
    pub fn from_label(label: &str) -> Option<Self> {
        let cleaned = label.replace('.', "");
        let cleaned = cleaned.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.label().eq_ignore_ascii_case(cleaned))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One ranked category with its suitability score (0–100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: Category,
    pub score: u32,
}

/// Whether a ranking has the expected arity and every top category clears
/// the minimum score.
pub fn is_valid_ranking(scores: &[CategoryScore]) -> bool {
    scores.len() == RANKED_CATEGORY_COUNT
        && scores.iter().all(|s| s.score <= MAX_SCORE)
        && scores
            .iter()
            .take(TOP_CATEGORY_COUNT)
            .all(|s| s.score > MIN_TOP_SCORE)
}

/// Derived `category` label: the top three labels joined with `.`.
pub fn top_category_label(scores: &[CategoryScore]) -> String {
    scores
        .iter()
        .take(TOP_CATEGORY_COUNT)
        .map(|s| s.category.label())
        .collect::<Vec<_>>()
        .join(".")
}

// ---------------------------------------------------------------------------
// EnrichedRecord
// ---------------------------------------------------------------------------

/// A candidate plus everything the enrichment pipeline attached to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub candidate: CandidateRecord,
    /// LLM summary, at most [`MAX_SUMMARY_CHARS`] characters.
    pub summary: String,
    /// JPEG screenshot of the target page.
    #[serde(skip)]
    pub screenshot: Vec<u8>,
    /// Base64-encoded site icon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    /// Five ranked categories, most relevant first.
    pub categories: Vec<CategoryScore>,
    /// Top three category labels joined with `.`.
    pub category: String,
    /// Lowercased search fields joined with spaces, before filtering.
    pub keywords_raw: String,
    /// Deduplicated, stopword-free keyword index.
    pub keywords: String,
}

impl EnrichedRecord {
    /// Whether the stored categories form a valid ranking.
    pub fn has_valid_categories(&self) -> bool {
        is_valid_ranking(&self.categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking(scores: [(Category, u32); 5]) -> Vec<CategoryScore> {
        scores
            .into_iter()
            .map(|(category, score)| CategoryScore { category, score })
            .collect()
    }

    #[test]
    fn ontology_has_twenty_unique_labels() {
        let labels: std::collections::HashSet<_> =
            Category::ALL.iter().map(|c| c.label()).collect();
        assert_eq!(labels.len(), 20);
    }

    #[test]
    fn from_label_matches_loosely() {
        assert_eq!(Category::from_label("Data Analysis"), Some(Category::DataAnalysis));
        assert_eq!(Category::from_label(" nlp "), Some(Category::Nlp));
        assert_eq!(Category::from_label("Images."), Some(Category::Images));
        assert_eq!(Category::from_label("Foo"), None);
        assert_eq!(Category::from_label(""), None);
    }

    #[test]
    fn category_serializes_as_label() {
        let json = serde_json::to_string(&Category::SmartCities).unwrap();
        assert_eq!(json, r#""Smart Cities""#);
        let parsed: Category = serde_json::from_str(r#""CRM""#).unwrap();
        assert_eq!(parsed, Category::Crm);
    }

    #[test]
    fn ranking_validity() {
        let good = ranking([
            (Category::Images, 90),
            (Category::Videos, 80),
            (Category::Nlp, 70),
            (Category::Automation, 5),
            (Category::Health, 0),
        ]);
        assert!(is_valid_ranking(&good));

        let low_third = ranking([
            (Category::Images, 90),
            (Category::Videos, 80),
            (Category::Nlp, 10),
            (Category::Automation, 5),
            (Category::Health, 0),
        ]);
        assert!(!is_valid_ranking(&low_third));
        assert!(!is_valid_ranking(&good[..4]));
    }

    #[test]
    fn top_category_label_joins_three() {
        let scores = ranking([
            (Category::DataAnalysis, 90),
            (Category::Crm, 80),
            (Category::Chatbots, 70),
            (Category::Automation, 60),
            (Category::Health, 50),
        ]);
        assert_eq!(top_category_label(&scores), "Data Analysis.CRM.Chatbots");
    }

    #[test]
    fn enriched_record_json_skips_screenshot() {
        let record = EnrichedRecord {
            candidate: CandidateRecord {
                data_id: "42".into(),
                name: "Example".into(),
                task: "Testing".into(),
                task_slug: "testing".into(),
                url: "https://example.com".into(),
                use_case: "Test things".into(),
                launch_date_text: String::new(),
                launch_date: None,
                thumbnail_url: None,
                link_href: None,
            },
            summary: "A tool.".into(),
            screenshot: vec![1, 2, 3],
            favicon: None,
            categories: vec![],
            category: String::new(),
            keywords_raw: String::new(),
            keywords: String::new(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["data_id"], "42");
        assert!(json.get("screenshot").is_none());
    }
}
