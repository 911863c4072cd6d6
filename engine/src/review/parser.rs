//! Agent response parsing
//!
//! Model output is untrusted. Parsing never fails outright: a payload that
//! cannot be decoded at all becomes a [`AgentParse::ParseError`], which turns
//! into a conservative needs-work review carrying a recognisable marker.

use crate::llm::strip_code_fence;
use sdk::types::Verdict;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix marking a review synthesised from an undecodable response.
pub const PARSE_FAILURE_MARKER: &str = "[parse-failure]";

/// Characters of raw output kept in a parse-failure rationale.
pub const RAW_PREFIX_CHARS: usize = 200;

const DEFAULT_SCORE: u8 = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rationale {
    pub observation: String,
    pub reflection: String,
    pub plan: String,
    pub action: String,
}

/// How a review came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictSource {
    /// Decoded from the model's structured answer
    Parsed,
    /// The answer could not be decoded; conservative default
    ParseFailure,
    /// The completion service could not be reached
    Unavailable,
}

/// One reviewer's structured verdict for one component in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReview {
    pub agent_id: String,
    pub verdict: Verdict,
    pub score: u8,
    pub rationale: Rationale,
    pub analysis: String,
    pub citations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_approval: Option<String>,
    pub source: VerdictSource,
    /// The payload as received, when there was one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl AgentReview {
    /// Review recorded when the completion service failed.
    pub fn unavailable(agent_id: &str, error: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            verdict: Verdict::Unavailable,
            score: 0,
            rationale: Rationale {
                observation: format!("Completion service unavailable: {}", error),
                ..Default::default()
            },
            analysis: String::new(),
            citations: Vec::new(),
            conditional_approval: None,
            source: VerdictSource::Unavailable,
            raw: None,
        }
    }

    /// Conservative review for a payload that could not be decoded.
    pub fn parse_failure(agent_id: &str, raw: &str, reason: &str) -> Self {
        let prefix: String = raw.chars().take(RAW_PREFIX_CHARS).collect();
        Self {
            agent_id: agent_id.to_string(),
            verdict: Verdict::NeedsWork,
            score: 0,
            rationale: Rationale {
                observation: format!(
                    "{} Response could not be decoded ({}). Raw prefix: {}",
                    PARSE_FAILURE_MARKER, reason, prefix
                ),
                ..Default::default()
            },
            analysis: String::new(),
            citations: Vec::new(),
            conditional_approval: None,
            source: VerdictSource::ParseFailure,
            raw: Some(Value::String(raw.to_string())),
        }
    }

    /// Short summary for ledger records.
    pub fn summary(&self) -> String {
        let text = if !self.analysis.is_empty() {
            &self.analysis
        } else {
            &self.rationale.observation
        };
        text.chars().take(RAW_PREFIX_CHARS).collect()
    }
}

/// Outcome of decoding one agent response.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentParse {
    Ok(AgentReview),
    ParseError { raw: String, reason: String },
}

impl AgentParse {
    pub fn into_review(self, agent_id: &str) -> AgentReview {
        match self {
            AgentParse::Ok(review) => review,
            AgentParse::ParseError { raw, reason } => {
                tracing::warn!("Reviewer {} returned undecodable output: {}", agent_id, reason);
                AgentReview::parse_failure(agent_id, &raw, &reason)
            }
        }
    }
}

/// Decode a free-text response, tolerating a surrounding code fence.
pub fn parse_agent_text(agent_id: &str, raw: &str) -> AgentParse {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return parse_agent_value(agent_id, &value);
    }

    let body = strip_code_fence(raw);
    if body.is_empty() {
        return AgentParse::ParseError {
            raw: raw.to_string(),
            reason: "empty response".to_string(),
        };
    }

    match serde_json::from_str::<Value>(body) {
        Ok(value) => parse_agent_value(agent_id, &value),
        Err(e) => AgentParse::ParseError {
            raw: raw.to_string(),
            reason: format!("not JSON: {}", e),
        },
    }
}

/// Decode an already-parsed JSON payload (e.g. forced tool input).
pub fn parse_agent_value(agent_id: &str, value: &Value) -> AgentParse {
    let Some(object) = value.as_object() else {
        return AgentParse::ParseError {
            raw: value.to_string(),
            reason: "expected a JSON object".to_string(),
        };
    };

    let verdict = object
        .get("verdict")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Verdict>().ok())
        .unwrap_or(Verdict::NeedsWork);

    let score = object.get("score").map_or(DEFAULT_SCORE, clamp_score);

    // Rationale fields may be nested or flattened into the top level
    let nested = object.get("rationale").and_then(Value::as_object);
    let field = |name: &str| -> String {
        nested
            .and_then(|r| r.get(name))
            .or_else(|| object.get(name))
            .map(text_of)
            .unwrap_or_default()
    };

    let conditional_approval = object
        .get("conditional_approval")
        .or_else(|| object.get("conditionalApproval"))
        .map(text_of)
        .filter(|s| !s.trim().is_empty());

    let citations = match object.get("citations") {
        Some(Value::Array(items)) => items.iter().map(text_of).collect(),
        Some(Value::String(single)) if !single.is_empty() => vec![single.clone()],
        _ => Vec::new(),
    };

    AgentParse::Ok(AgentReview {
        agent_id: agent_id.to_string(),
        verdict,
        score,
        rationale: Rationale {
            observation: field("observation"),
            reflection: field("reflection"),
            plan: field("plan"),
            action: field("action"),
        },
        analysis: object.get("analysis").map(text_of).unwrap_or_default(),
        citations,
        conditional_approval,
        source: VerdictSource::Parsed,
        raw: Some(value.clone()),
    })
}

fn clamp_score(value: &Value) -> u8 {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => n.round().clamp(0.0, 100.0) as u8,
        _ => DEFAULT_SCORE,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(parse: AgentParse) -> AgentReview {
        match parse {
            AgentParse::Ok(review) => review,
            AgentParse::ParseError { reason, .. } => panic!("unexpected parse error: {}", reason),
        }
    }

    #[test]
    fn test_backticks_inside_values_survive() {
        let raw = "{\n \"analysis\": \"wrap tokens in ``` blocks\",\n \"verdict\": \"approved\",\n \"score\": 90\n}";
        let review = ok(parse_agent_text("ts", raw));
        assert_eq!(review.verdict, Verdict::Approved);
        assert_eq!(review.score, 90);
        assert_eq!(review.analysis, "wrap tokens in ``` blocks");
    }

    #[test]
    fn test_well_formed_response() {
        let raw = r#"```json
{"verdict": "approved", "score": 88,
 "rationale": {"observation": "Tokens only", "reflection": "Good", "plan": "None", "action": "Approve"},
 "analysis": "Clean token usage.", "citations": ["style.css:3"], "conditional_approval": ""}
```"#;
        let review = ok(parse_agent_text("ts", raw));

        assert_eq!(review.verdict, Verdict::Approved);
        assert_eq!(review.score, 88);
        assert_eq!(review.rationale.action, "Approve");
        assert_eq!(review.citations, vec!["style.css:3"]);
        assert!(review.conditional_approval.is_none());
        assert_eq!(review.source, VerdictSource::Parsed);
        assert!(review.raw.is_some());
    }

    #[test]
    fn test_missing_and_illegal_fields_default() {
        let review = ok(parse_agent_value("pl", &json!({"verdict": "maybe"})));

        assert_eq!(review.verdict, Verdict::NeedsWork);
        assert_eq!(review.score, 50);
        assert_eq!(review.rationale, Rationale::default());
        assert_eq!(review.analysis, "");
    }

    #[test]
    fn test_model_cannot_claim_unavailable() {
        let review = ok(parse_agent_value("ca", &json!({"verdict": "unavailable"})));
        assert_eq!(review.verdict, Verdict::NeedsWork);
    }

    #[test]
    fn test_score_is_clamped() {
        assert_eq!(ok(parse_agent_value("a", &json!({"score": 250}))).score, 100);
        assert_eq!(ok(parse_agent_value("a", &json!({"score": -4}))).score, 0);
        assert_eq!(ok(parse_agent_value("a", &json!({"score": "71"}))).score, 71);
        assert_eq!(ok(parse_agent_value("a", &json!({"score": null}))).score, 50);
    }

    #[test]
    fn test_flattened_rationale() {
        let review = ok(parse_agent_value(
            "px",
            &json!({"verdict": "needs_work", "observation": "No empty state", "plan": "Add one"}),
        ));
        assert_eq!(review.verdict, Verdict::NeedsWork);
        assert_eq!(review.rationale.observation, "No empty state");
        assert_eq!(review.rationale.plan, "Add one");
    }

    #[test]
    fn test_non_json_falls_back() {
        let raw = "I think this component looks great, approve!";
        let parse = parse_agent_text("ag", raw);
        assert!(matches!(parse, AgentParse::ParseError { .. }));

        let review = parse.into_review("ag");
        assert_eq!(review.verdict, Verdict::NeedsWork);
        assert_eq!(review.score, 0);
        assert!(review.rationale.observation.starts_with(PARSE_FAILURE_MARKER));
        assert!(review.rationale.observation.contains("looks great"));
        assert_eq!(review.source, VerdictSource::ParseFailure);
    }

    #[test]
    fn test_raw_prefix_is_bounded() {
        let raw = "é".repeat(1000);
        let review = parse_agent_text("ag", &raw).into_review("ag");
        let kept = review.rationale.observation.matches('é').count();
        assert_eq!(kept, RAW_PREFIX_CHARS);
    }

    #[test]
    fn test_array_payload_is_a_parse_error() {
        assert!(matches!(
            parse_agent_text("ts", "[1, 2, 3]"),
            AgentParse::ParseError { .. }
        ));
    }
}
