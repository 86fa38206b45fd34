//! Knowledge-extractor output.
//!
//! The extractor is an LLM call that runs after a tagged conversation. Its
//! reply is expected to hold one JSON object, but may be wrapped in prose or
//! a fenced code block. Proposals that do not match the wire schema (for
//! example a confidence of 140) are dropped individually with a warning; the
//! rest of the payload is kept.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::ProposedUpdate;

/// Error types for extraction payload parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    /// No `{ ... }` object anywhere in the text
    #[error("no JSON object found in extractor output")]
    NoJsonObject,

    #[error("invalid extractor JSON: {0}")]
    InvalidJson(String),
}

/// A general observation about the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    #[serde(default)]
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub evidence: String,
}

/// A knowledge snippet proposed for the retrieval index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalEntry {
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// An exemplary exchange for a future fine-tuning set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FineTuningExample {
    #[serde(alias = "input", alias = "userMessage")]
    pub prompt: String,
    #[serde(alias = "output", alias = "idealResponse")]
    pub completion: String,
}

/// Parsed extractor output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionPayload {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default)]
    pub prompt_updates: Vec<ProposedUpdate>,
    #[serde(default)]
    pub rag_entries: Vec<RetrievalEntry>,
    #[serde(default)]
    pub fine_tuning_examples: Vec<FineTuningExample>,
    /// Proposals dropped during parsing, with the reason
    #[serde(skip)]
    pub skipped: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    insights: Vec<Value>,
    #[serde(default)]
    prompt_updates: Vec<Value>,
    #[serde(default)]
    rag_entries: Vec<Value>,
    #[serde(default)]
    fine_tuning_examples: Vec<Value>,
}

impl ExtractionPayload {
    /// Parse raw extractor output.
    pub fn parse(raw: &str) -> Result<Self, ExtractionError> {
        let json = extract_json_object(raw).ok_or(ExtractionError::NoJsonObject)?;
        let payload: RawPayload =
            serde_json::from_str(json).map_err(|e| ExtractionError::InvalidJson(e.to_string()))?;

        let mut skipped = Vec::new();
        let prompt_updates = keep_valid("promptUpdates", payload.prompt_updates, &mut skipped);
        let insights = keep_valid("insights", payload.insights, &mut skipped);
        let rag_entries = keep_valid("ragEntries", payload.rag_entries, &mut skipped);
        let fine_tuning_examples =
            keep_valid("fineTuningExamples", payload.fine_tuning_examples, &mut skipped);

        debug!(
            proposals = prompt_updates.len(),
            insights = insights.len(),
            skipped = skipped.len(),
            "Parsed extraction payload"
        );

        Ok(Self {
            topic: payload.topic,
            insights,
            prompt_updates,
            rag_entries,
            fine_tuning_examples,
            skipped,
        })
    }
}

fn keep_valid<T: serde::de::DeserializeOwned>(
    field: &str,
    values: Vec<Value>,
    skipped: &mut Vec<String>,
) -> Vec<T> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(field, index = i, error = %e, "Dropping malformed extraction entry");
                skipped.push(format!("{field}[{i}]: {e}"));
                None
            }
        })
        .collect()
}

/// The outermost `{ ... }` span of the text, which also strips code fences.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROPOSAL: &str = r#"{
        "section": "domainExpertise.mission",
        "suggestedAddition": "Ask about timelines.",
        "reasoning": "r",
        "priority": "medium",
        "constitutionalCheck": {
            "elevation": {"passes": true, "reasoning": ""},
            "transparency": {"passes": true, "reasoning": ""},
            "agency": {"passes": true, "reasoning": ""},
            "growth": {"passes": true, "reasoning": ""}
        },
        "confidence": 80,
        "evidenceFromSession": "e",
        "riskLevel": "low",
        "riskReasoning": "",
        "autoApplyRecommendation": false
    }"#;

    #[test]
    fn test_parse_fenced_block() {
        let raw = format!(
            "Here is the analysis:\n```json\n{{\"topic\": \"Salary negotiation\", \"promptUpdates\": [{PROPOSAL}], \"insights\": [{{\"category\": \"gap\", \"content\": \"Users ask about equity\"}}]}}\n```\nLet me know."
        );

        let payload = ExtractionPayload::parse(&raw).unwrap();
        assert_eq!(payload.topic, "Salary negotiation");
        assert_eq!(payload.prompt_updates.len(), 1);
        assert_eq!(payload.prompt_updates[0].confidence.value(), 80);
        assert_eq!(payload.insights[0].content, "Users ask about equity");
        assert!(payload.skipped.is_empty());
    }

    #[test]
    fn test_missing_arrays_default_to_empty() {
        let payload = ExtractionPayload::parse("{\"topic\": \"t\"}").unwrap();
        assert!(payload.prompt_updates.is_empty());
        assert!(payload.rag_entries.is_empty());
        assert!(payload.fine_tuning_examples.is_empty());
    }

    #[test]
    fn test_drops_malformed_proposal() {
        let bad = PROPOSAL.replace("\"confidence\": 80", "\"confidence\": 140");
        let raw = format!("{{\"promptUpdates\": [{bad}, {PROPOSAL}]}}");

        let payload = ExtractionPayload::parse(&raw).unwrap();
        assert_eq!(payload.prompt_updates.len(), 1);
        assert_eq!(payload.skipped.len(), 1);
        assert!(payload.skipped[0].starts_with("promptUpdates[0]"));
    }

    #[test]
    fn test_fine_tuning_aliases() {
        let raw = r#"{"fineTuningExamples": [{"input": "q", "output": "a"}],
                      "ragEntries": [{"title": "t", "content": "c", "tags": ["x"]}]}"#;
        let payload = ExtractionPayload::parse(raw).unwrap();
        assert_eq!(payload.fine_tuning_examples[0].prompt, "q");
        assert_eq!(payload.fine_tuning_examples[0].completion, "a");
        assert_eq!(payload.rag_entries[0].tags, vec!["x".to_string()]);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            ExtractionPayload::parse("no json here"),
            Err(ExtractionError::NoJsonObject)
        );
        assert!(matches!(
            ExtractionPayload::parse("{ not json }"),
            Err(ExtractionError::InvalidJson(_))
        ));
    }
}
