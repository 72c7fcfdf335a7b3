//! Summarizer: one completion call per item.
//!
//! An empty summary means the item cannot be enriched and is skipped.

use tracing::{instrument, warn};

use toolharvest_shared::{MAX_SUMMARY_CHARS, PipelineConfig};

use crate::llm::{CompletionClient, CompletionRequest};

const SYSTEM_ROLE: &str =
    "You are a helpful assistant that summarizes and organizes website content.";

const INSTRUCTION: &str = "Please provide a brief and concise summary (less than 500 characters) \
in English of the following website content, focusing on the main purpose and features of the \
site. Exclude any copyright information, contact details, and unrelated external website links: ";

const TEMPERATURE: f32 = 0.5;

/// Produces bounded-length summaries of captured page text.
#[derive(Debug, Clone)]
pub struct Summarizer {
    input_chars: usize,
    max_tokens: u32,
}

impl Summarizer {
    pub fn new(input_chars: usize, max_tokens: u32) -> Self {
        Self {
            input_chars,
            max_tokens,
        }
    }

    /// Summarize `contents`. Returns an empty string when the request fails.
    #[instrument(skip_all, fields(input_chars = contents.chars().count()))]
    pub async fn summarize(&self, client: &dyn CompletionClient, contents: &str) -> String {
        let request = CompletionRequest {
            system: SYSTEM_ROLE.to_string(),
            instruction: INSTRUCTION.to_string(),
            input: truncate_chars(contents, self.input_chars).to_string(),
            temperature: TEMPERATURE,
            max_tokens: self.max_tokens,
        };

        match client.complete(&request).await {
            Ok(completion) => truncate_chars(completion.text.trim(), MAX_SUMMARY_CHARS)
                .trim_end()
                .to_string(),
            Err(e) => {
                warn!(error = %e, "summary request failed");
                String::new()
            }
        }
    }
}

impl From<&PipelineConfig> for Summarizer {
    fn from(config: &PipelineConfig) -> Self {
        Self::new(config.summary_input_chars, config.summary_max_tokens)
    }
}

/// The first `max` characters of `s`.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tests::ScriptedClient;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("찾을 수 없", 2), "찾을");
    }

    #[tokio::test]
    async fn sends_truncated_input_with_fixed_prompt() {
        let client = ScriptedClient::new([Some("Example is a tool for X.")]);
        let summarizer = Summarizer::new(10, 2048);
        let summary = summarizer.summarize(&client, "Welcome to Example, the leading tool").await;
        assert_eq!(summary, "Example is a tool for X.");

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].input, "Welcome to");
        assert_eq!(requests[0].system, SYSTEM_ROLE);
        assert!((requests[0].temperature - 0.5).abs() < f32::EPSILON);
        assert_eq!(requests[0].max_tokens, 2048);
    }

    #[tokio::test]
    async fn long_summaries_are_bounded() {
        let client = ScriptedClient::new([Some("x".repeat(900))]);
        let summary = Summarizer::new(1000, 2048).summarize(&client, "text").await;
        assert_eq!(summary.chars().count(), MAX_SUMMARY_CHARS);
    }

    #[tokio::test]
    async fn failure_yields_empty_summary() {
        let client = ScriptedClient::new([None::<String>]);
        let summary = Summarizer::new(1000, 2048).summarize(&client, "text").await;
        assert!(summary.is_empty());
    }
}
