//! Categorizer: ranks an item against the closed category ontology.
//!
//! Each attempt asks for five ranked `rank:category:score` entries and runs
//! the answer through a chain of checks. The failed check decides how the
//! sampling temperature moves before the next attempt:
//!
//! | check    | failure                          | temperature |
//! |----------|----------------------------------|-------------|
//! | grammar  | answer does not parse            | +0.1        |
//! | ontology | a name is not a known category   | +0.1, name excluded |
//! | scores   | a top-3 score outside (10, 100]  | -0.1        |
//! | arity    | not exactly five entries         | unchanged   |
//!
//! A temperature outside [0.1, 0.9] resets to 0.1 and clears exclusions. The
//! loop stops after a fixed number of attempts.

pub mod grammar;

use std::sync::LazyLock;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use toolharvest_shared::{
    Category, CategoryScore, MAX_SCORE, MIN_TOP_SCORE, PipelineConfig,
    Result, TOP_CATEGORY_COUNT, ToolHarvestError,
};

use crate::llm::{CompletionClient, CompletionRequest};
use grammar::{GrammarError, RankedEntry, parse_ranking};

const SYSTEM_ROLE: &str = "You are a helpful assistant that categorizes data.";

static INSTRUCTION: LazyLock<String> = LazyLock::new(|| {
    let categories = Category::ALL
        .iter()
        .map(|c| format!("'{}'", c.label()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Absolutely select the top 5 from the list below in order of highest relevance to the \
         provided data Task, useCaseText, summary, and Assign a suitability score from 0 to 100 \
         for each category, with 100 being the most suitable and 0 being the least suitable. \
         respond in the format of '1:{{category_name_1:suitability score}}, \
         2:{{category_name_2:suitability score}}, 3:{{category_name_3:suitability score}}, \
         4:{{category_name_4:suitability score}}, 5:{{category_name_5:suitability score}}'.\n\
         A list of valid categories: {categories}\n\
         \"Excluded categories\" are not valid categories and should never be included in a \
         response.\n"
    )
});

/// Temperature window, in tenths.
const MIN_TENTHS: i32 = 1;
const MAX_TENTHS: i32 = 9;

/// Unknown names shorter than this are not worth excluding.
const MIN_EXCLUDED_LEN: usize = 2;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Outcome of validating one answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Valid(Vec<CategoryScore>),
    Malformed(GrammarError),
    UnknownCategories(Vec<String>),
    ScoresOutOfRange,
}

/// Run an answer through grammar, ontology and score checks, in order.
///
/// Arity is fixed by the grammar.
pub fn validate(text: &str) -> Verdict {
    let entries = match parse_ranking(text) {
        Ok(entries) => entries,
        Err(e) => return Verdict::Malformed(e),
    };
    let scores = match check_ontology(&entries) {
        Ok(scores) => scores,
        Err(unknown) => return Verdict::UnknownCategories(unknown),
    };
    if !scores_in_range(&scores) {
        return Verdict::ScoresOutOfRange;
    }
    Verdict::Valid(scores)
}

/// Map names onto the ontology, or return every name that is not in it.
fn check_ontology(entries: &[RankedEntry]) -> std::result::Result<Vec<CategoryScore>, Vec<String>> {
    let mut scores = Vec::with_capacity(entries.len());
    let mut unknown = Vec::new();
    for entry in entries {
        match Category::from_label(&entry.name) {
            Some(category) => scores.push(CategoryScore {
                category,
                score: entry.score,
            }),
            None => unknown.push(entry.name.clone()),
        }
    }
    if unknown.is_empty() {
        Ok(scores)
    } else {
        Err(unknown)
    }
}

/// Top three strictly above the floor, none above the ceiling.
fn scores_in_range(scores: &[CategoryScore]) -> bool {
    scores.iter().all(|s| s.score <= MAX_SCORE)
        && scores
            .iter()
            .take(TOP_CATEGORY_COUNT)
            .all(|s| s.score > MIN_TOP_SCORE)
}

// ---------------------------------------------------------------------------
// Retry state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct RetryState {
    tenths: i32,
    excluded: Vec<String>,
}

impl RetryState {
    fn new(initial_temperature: f32) -> Self {
        Self {
            tenths: (initial_temperature * 10.0).round() as i32,
            excluded: Vec::new(),
        }
    }

    fn temperature(&self) -> f32 {
        self.tenths as f32 / 10.0
    }

    /// Reset to the floor and forget exclusions once outside the window.
    fn normalize(&mut self) {
        if !(MIN_TENTHS..=MAX_TENTHS).contains(&self.tenths) {
            debug!(temperature = self.temperature(), "temperature out of window, resetting");
            self.tenths = MIN_TENTHS;
            self.excluded.clear();
        }
    }

    fn raise(&mut self) {
        self.tenths += 1;
    }

    fn lower(&mut self) {
        self.tenths -= 1;
    }

    fn exclude(&mut self, names: Vec<String>) {
        for name in names {
            if name.chars().count() >= MIN_EXCLUDED_LEN && !self.excluded.contains(&name) {
                self.excluded.push(name);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Categorizer
// ---------------------------------------------------------------------------

/// A successful categorization.
#[derive(Debug, Clone, PartialEq)]
pub struct Categorization {
    /// Exactly five scores, most relevant first.
    pub scores: Vec<CategoryScore>,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct Categorizer {
    max_attempts: u32,
    retry_delay: Duration,
    initial_temperature: f32,
    max_tokens: u32,
}

impl Categorizer {
    pub fn new(
        max_attempts: u32,
        retry_delay: Duration,
        initial_temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
            initial_temperature,
            max_tokens,
        }
    }

    /// Rank `task`, `use_case` and `summary` against the ontology.
    ///
    /// Returns [`ToolHarvestError::CategorizationExhausted`] when no attempt
    /// produced a valid answer. A failed request still uses an attempt.
    #[instrument(skip_all, fields(task = %task))]
    pub async fn categorize(
        &self,
        client: &dyn CompletionClient,
        task: &str,
        use_case: &str,
        summary: &str,
    ) -> Result<Categorization> {
        let mut state = RetryState::new(self.initial_temperature);

        for attempt in 1..=self.max_attempts {
            state.normalize();
            let request = CompletionRequest {
                system: SYSTEM_ROLE.to_string(),
                instruction: INSTRUCTION.clone(),
                input: format!(
                    "Task:{task}\nuseCaseText:{use_case}\nsummary:{summary}\nCategories to be excluded:{}",
                    state.excluded.join(", ")
                ),
                temperature: state.temperature(),
                max_tokens: self.max_tokens,
            };

            match client.complete(&request).await {
                Err(e) => {
                    warn!(attempt, error = %e, "categorize request failed");
                }
                Ok(completion) => {
                    debug!(attempt, answer = %completion.text, "categorize answer");
                    match validate(&completion.text) {
                        Verdict::Valid(scores) => {
                            info!(attempt, temperature = state.temperature(), "categorized");
                            return Ok(Categorization {
                                scores,
                                attempts: attempt,
                            });
                        }
                        Verdict::Malformed(e) => {
                            warn!(attempt, temperature = state.temperature(), error = %e, "answer does not parse");
                            state.raise();
                        }
                        Verdict::UnknownCategories(names) => {
                            warn!(attempt, temperature = state.temperature(), unknown = ?names, "unknown categories");
                            state.exclude(names);
                            state.raise();
                        }
                        Verdict::ScoresOutOfRange => {
                            warn!(attempt, temperature = state.temperature(), "top scores out of range");
                            state.lower();
                        }
                    }
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        warn!(attempts = self.max_attempts, "categorization exhausted");
        Err(ToolHarvestError::CategorizationExhausted {
            attempts: self.max_attempts,
        })
    }
}

impl From<&PipelineConfig> for Categorizer {
    fn from(config: &PipelineConfig) -> Self {
        Self::new(
            config.categorizer_max_attempts,
            config.categorizer_retry_delay,
            config.categorizer_initial_temperature,
            config.categorize_max_tokens,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tests::ScriptedClient;

    const VALID: &str = "1:Images:90, 2:NLP:80, 3:Automation:70, 4:Health:60, 5:Gaming:50";

    fn categorizer(max_attempts: u32, initial_temperature: f32) -> Categorizer {
        Categorizer::new(max_attempts, Duration::ZERO, initial_temperature, 3000)
    }

    fn temperatures(client: &ScriptedClient) -> Vec<f32> {
        client.requests().iter().map(|r| r.temperature).collect()
    }

    #[test]
    fn validation_order() {
        assert!(matches!(validate(VALID), Verdict::Valid(s) if s.len() == 5));
        assert!(matches!(validate("Images, NLP"), Verdict::Malformed(_)));
        assert_eq!(
            validate("1:Foo:90, 2:Images:80, 3:NLP:70, 4:Automation:60, 5:Health:50"),
            Verdict::UnknownCategories(vec!["Foo".into()])
        );
        assert_eq!(
            validate("1:Images:90, 2:NLP:10, 3:Automation:70, 4:Health:60, 5:Gaming:50"),
            Verdict::ScoresOutOfRange
        );
        assert_eq!(
            validate("1:Images:90, 2:NLP:80, 3:Automation:70, 4:Health:60, 5:Gaming:500"),
            Verdict::ScoresOutOfRange
        );
    }

    #[test]
    fn wrong_entry_count_is_malformed() {
        assert!(matches!(
            validate("1:Images:90, 2:NLP:80, 3:Automation:70, 4:Health:60"),
            Verdict::Malformed(_)
        ));
        assert!(matches!(
            validate("1:Images:90, 2:NLP:80, 3:Automation:70, 4:Health:60, 5:Gaming:50, 6:Music:40"),
            Verdict::Malformed(GrammarError::TrailingInput { .. })
        ));
    }

    #[test]
    fn ontology_match_ignores_case() {
        let Verdict::Valid(scores) =
            validate("1:images:90, 2:nlp:80, 3:data analysis:70, 4:HEALTH:60, 5:Gaming:5")
        else {
            panic!("expected valid");
        };
        assert_eq!(scores[2].category, Category::DataAnalysis);
        assert_eq!(scores[4].score, 5);
    }

    #[test]
    fn instruction_lists_every_category() {
        for category in Category::ALL {
            assert!(INSTRUCTION.contains(&format!("'{}'", category.label())));
        }
    }

    #[tokio::test]
    async fn unknown_category_is_excluded_and_temperature_raised() {
        let client = ScriptedClient::new([
            Some("1:Foo:90, 2:Images:80, 3:NLP:70, 4:Automation:60, 5:Health:50"),
            Some(VALID),
        ]);
        let result = categorizer(20, 0.4)
            .categorize(&client, "Image generation", "Make art", "A tool")
            .await
            .unwrap();

        assert_eq!(result.attempts, 2);
        assert_eq!(result.scores[0].category, Category::Images);
        assert_eq!(temperatures(&client), [0.4, 0.5]);
        let requests = client.requests();
        assert!(requests[0].input.ends_with("Categories to be excluded:"));
        assert!(requests[1].input.ends_with("Categories to be excluded:Foo"));
        assert!(requests[1].input.starts_with("Task:Image generation\nuseCaseText:Make art\nsummary:A tool\n"));
    }

    #[tokio::test]
    async fn low_scores_lower_temperature() {
        let client = ScriptedClient::new([
            Some("1:Images:9, 2:NLP:8, 3:Automation:7, 4:Health:6, 5:Gaming:5"),
            Some(VALID),
        ]);
        categorizer(20, 0.4)
            .categorize(&client, "t", "u", "s")
            .await
            .unwrap();
        assert_eq!(temperatures(&client), [0.4, 0.3]);
    }

    #[tokio::test]
    async fn leaving_the_window_resets_temperature_and_exclusions() {
        let client = ScriptedClient::new([
            Some("1:Foo:90, 2:Images:80, 3:NLP:70, 4:Automation:60, 5:Health:50"),
            Some(VALID),
        ]);
        categorizer(20, 0.9)
            .categorize(&client, "t", "u", "s")
            .await
            .unwrap();

        assert_eq!(temperatures(&client), [0.9, 0.1]);
        assert!(client.requests()[1].input.ends_with("Categories to be excluded:"));
    }

    #[tokio::test]
    async fn failed_request_counts_as_attempt_without_temperature_change() {
        let client = ScriptedClient::new([None, Some(VALID.to_string())]);
        let result = categorizer(20, 0.4)
            .categorize(&client, "t", "u", "s")
            .await
            .unwrap();
        assert_eq!(result.attempts, 2);
        assert_eq!(temperatures(&client), [0.4, 0.4]);
    }

    #[tokio::test]
    async fn gives_up_at_the_attempt_ceiling() {
        let client = ScriptedClient::new(std::iter::repeat_n(Some("not a ranking"), 10));
        let err = categorizer(3, 0.4)
            .categorize(&client, "t", "u", "s")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ToolHarvestError::CategorizationExhausted { attempts: 3 }
        ));
        assert_eq!(client.requests().len(), 3);
        assert_eq!(temperatures(&client), [0.4, 0.5, 0.6]);
    }
}
