//! Role prompts and the structured verdict schema

use super::prechecks::{Artifacts, StaticFindings};
use super::reviewers::{zone_posture, ReviewerProfile};
use crate::ledger::DecisionRecord;
use crate::llm::{CompletionRequest, Message, ToolChoice, ToolSchema};
use crate::pipeline::Component;
use sdk::types::Zone;
use serde_json::json;
use std::fmt::Write;

pub const SUBMIT_REVIEW_TOOL: &str = "submit_review";

/// Artifact text beyond this many characters is cut before prompting.
const ARTIFACT_CHARS: usize = 12_000;

/// Tool whose input schema is the verdict schema.
pub fn submit_review_tool() -> ToolSchema {
    ToolSchema {
        name: SUBMIT_REVIEW_TOOL.to_string(),
        description: "Submit your review of the component. Call exactly once.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "verdict": {
                    "type": "string",
                    "enum": ["approved", "needs-work", "vetoed"],
                    "description": "Your verdict. Only the accessibility guardian's veto is binding."
                },
                "score": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": 100,
                    "description": "Overall quality in your area"
                },
                "rationale": {
                    "type": "object",
                    "properties": {
                        "observation": {"type": "string"},
                        "reflection": {"type": "string"},
                        "plan": {"type": "string"},
                        "action": {"type": "string"}
                    },
                    "required": ["observation", "reflection", "plan", "action"]
                },
                "analysis": {"type": "string"},
                "citations": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "file:line references backing your analysis"
                },
                "conditional_approval": {
                    "type": "string",
                    "description": "Conditions under which you would approve, if any"
                }
            },
            "required": ["verdict", "score", "rationale", "analysis"]
        }),
    }
}

/// Everything one reviewer sees.
pub struct ReviewContext<'a> {
    pub component: &'a Component,
    pub zone: Zone,
    pub artifacts: &'a Artifacts,
    pub findings: &'a StaticFindings,
    pub prior_decisions: &'a [DecisionRecord],
    pub tone: Option<&'a str>,
}

pub fn system_prompt(profile: &ReviewerProfile, zone: Zone, tone: Option<&str>) -> String {
    let mut prompt = format!(
        "You are {} ({}), reviewing design-system components for {}.\n\nYour ruleset:\n",
        profile.name, profile.id, profile.focus
    );
    for rule in profile.ruleset {
        let _ = writeln!(prompt, "- {}", rule);
    }
    let _ = write!(prompt, "\n{}\n", zone_posture(zone));
    if profile.holds_veto() {
        prompt.push_str(
            "\nYou hold the veto. Use `vetoed` only for problems that would exclude users.\n",
        );
    }
    if let Some(tone) = tone.filter(|t| !t.trim().is_empty()) {
        let _ = write!(prompt, "\n{}\n", tone.trim());
    }
    let _ = write!(
        prompt,
        "\nJudge only your area. Submit your review with the `{}` tool.",
        SUBMIT_REVIEW_TOOL
    );
    prompt
}

pub fn user_prompt(ctx: &ReviewContext<'_>) -> String {
    let c = ctx.component;
    let mut prompt = format!(
        "Component: {} (#{})\nCategory: {}\nZone under review: {}\nDescription: {}\n",
        c.name,
        c.id,
        if c.category.is_empty() { "-" } else { c.category.as_str() },
        ctx.zone,
        if c.description.is_empty() { "-" } else { c.description.as_str() },
    );

    push_artifact(&mut prompt, "spec.md", ctx.artifacts.spec.as_deref());
    push_artifact(&mut prompt, "style.css", ctx.artifacts.style.as_deref());

    prompt.push_str("\n## Static analysis\n");
    if ctx.findings.issues.is_empty() {
        prompt.push_str("No issues.\n");
    }
    for issue in &ctx.findings.issues {
        match issue.line {
            Some(line) => {
                let _ = writeln!(prompt, "- [{}] line {}: {}", issue.rule, line, issue.message);
            }
            None => {
                let _ = writeln!(prompt, "- [{}] {}", issue.rule, issue.message);
            }
        }
    }
    if !ctx.findings.passes.is_empty() {
        let _ = writeln!(prompt, "Passed: {}", ctx.findings.passes.join(", "));
    }

    prompt.push_str("\n## Prior decisions\n");
    if ctx.prior_decisions.is_empty() {
        prompt.push_str("None.\n");
    }
    for decision in ctx.prior_decisions {
        let _ = writeln!(
            prompt,
            "- {} {} in {}: {}",
            decision.timestamp.format("%Y-%m-%d"),
            if decision.outcome.passed { "passed" } else { "failed" },
            decision.zone,
            decision.outcome.reason
        );
    }

    prompt
}

fn push_artifact(prompt: &mut String, name: &str, content: Option<&str>) {
    let _ = write!(prompt, "\n## {}\n", name);
    match content {
        Some(text) => {
            let cut: String = text.chars().take(ARTIFACT_CHARS).collect();
            prompt.push_str(&cut);
            if cut.len() < text.len() {
                prompt.push_str("\n[truncated]");
            }
            prompt.push('\n');
        }
        None => prompt.push_str("(missing)\n"),
    }
}

/// Request forcing a single `submit_review` call.
pub fn review_request(profile: &ReviewerProfile, ctx: &ReviewContext<'_>) -> CompletionRequest {
    CompletionRequest {
        system: system_prompt(profile, ctx.zone, ctx.tone),
        messages: vec![Message::user(user_prompt(ctx))],
        tools: vec![submit_review_tool()],
        tool_choice: ToolChoice::Tool(SUBMIT_REVIEW_TOOL.to_string()),
        max_tokens: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{DecisionKind, DecisionOutcome};
    use crate::pipeline::maturity_for;
    use crate::review::prechecks::Finding;
    use crate::review::reviewers::profile;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn component() -> Component {
        Component {
            id: 3,
            name: "Toggle".to_string(),
            category: "input".to_string(),
            description: "Binary switch".to_string(),
            current_zone: Zone::Workshop,
            maturity: maturity_for(Zone::Workshop),
            created_at: Utc::now(),
            moved_at: Utc::now(),
            reviews: BTreeMap::new(),
            shielded: false,
            revived_from: None,
        }
    }

    #[test]
    fn test_system_prompt_carries_ruleset_posture_and_tone() {
        let ag = profile("ag").unwrap();
        let prompt = system_prompt(ag, Zone::Canopy, Some("Speak plainly."));

        assert!(prompt.contains("Accessibility Guardian"));
        assert!(prompt.contains("WCAG AA"));
        assert!(prompt.contains("Canopy"));
        assert!(prompt.contains("You hold the veto"));
        assert!(prompt.ends_with("`submit_review` tool."));
        assert!(prompt.contains("Speak plainly."));

        let ts = profile("ts").unwrap();
        assert!(!system_prompt(ts, Zone::Canopy, None).contains("You hold the veto"));
    }

    #[test]
    fn test_user_prompt_includes_findings_and_history() {
        let component = component();
        let artifacts = Artifacts {
            slug: "toggle".to_string(),
            spec: Some("# Toggle".to_string()),
            style: None,
        };
        let findings = StaticFindings {
            issues: vec![Finding {
                rule: "hardcoded-color".to_string(),
                message: "hardcoded colour #fff".to_string(),
                line: Some(4),
            }],
            passes: vec!["naming".to_string()],
        };
        let prior = vec![DecisionRecord::new(
            DecisionKind::Review,
            Zone::Workshop,
            DecisionOutcome {
                passed: false,
                reason: "Majority not reached: 2/5 approvals (needed 3)".to_string(),
            },
        )];
        let ctx = ReviewContext {
            component: &component,
            zone: Zone::Workshop,
            artifacts: &artifacts,
            findings: &findings,
            prior_decisions: &prior,
            tone: None,
        };

        let prompt = user_prompt(&ctx);
        assert!(prompt.contains("Toggle (#3)"));
        assert!(prompt.contains("[hardcoded-color] line 4"));
        assert!(prompt.contains("## style.css\n(missing)"));
        assert!(prompt.contains("2/5 approvals"));

        let request = review_request(profile("ts").unwrap(), &ctx);
        assert_eq!(
            request.tool_choice,
            ToolChoice::Tool(SUBMIT_REVIEW_TOOL.to_string())
        );
        assert_eq!(request.tools.len(), 1);
    }
}
