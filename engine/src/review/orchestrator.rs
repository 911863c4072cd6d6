//! One multi-agent review cycle per component

use super::parser::{parse_agent_text, parse_agent_value, AgentReview};
use super::prechecks::{Artifacts, StaticAnalyzer, StaticFindings};
use super::prompt::{review_request, ReviewContext, SUBMIT_REVIEW_TOOL};
use super::reviewers::{profile, roster, ReviewerProfile};
use crate::config::ReviewConfig;
use crate::fs_guard::PathValidator;
use crate::ledger::{
    ActivityKind, ActivityRecord, AgentSummary, DecisionKind, DecisionOutcome, DecisionRecord,
    Ledgers,
};
use crate::llm::CompletionService;
use crate::pipeline::{Component, PipelineStore, ReviewSnapshot};
use crate::rules::{evaluate_approval, Approval};
use crate::secrets::scrub_secrets;
use chrono::Utc;
use sdk::errors::EngineError;
use sdk::types::{Verdict, Zone};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a review cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewReport {
    pub component: Component,
    pub zone: Zone,
    pub findings: StaticFindings,
    pub reviews: Vec<AgentReview>,
    /// Absent for single-agent reviews, which are not aggregated
    pub approval: Option<Approval>,
    pub decision_id: Option<String>,
}

pub struct ReviewOrchestrator {
    service: Arc<dyn CompletionService>,
    pipeline: Arc<PipelineStore>,
    ledgers: Ledgers,
    analyzer: Arc<dyn StaticAnalyzer>,
    paths: Arc<dyn PathValidator>,
    roster: Vec<&'static ReviewerProfile>,
    tones: BTreeMap<String, String>,
    history_window: usize,
}

struct Prepared {
    component: Component,
    zone: Zone,
    artifacts: Artifacts,
    findings: StaticFindings,
    prior: Vec<crate::ledger::DecisionRecord>,
}

impl ReviewOrchestrator {
    pub fn new(
        service: Arc<dyn CompletionService>,
        pipeline: Arc<PipelineStore>,
        ledgers: Ledgers,
        analyzer: Arc<dyn StaticAnalyzer>,
        paths: Arc<dyn PathValidator>,
        config: &ReviewConfig,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            service,
            pipeline,
            ledgers,
            analyzer,
            paths,
            roster: roster(&config.reviewers)?,
            tones: config.tones.clone(),
            history_window: config.history_window,
        })
    }

    pub fn reviewer_ids(&self) -> Vec<&'static str> {
        self.roster.iter().map(|r| r.id).collect()
    }

    /// Run every reviewer, aggregate under the zone's rules and record the decision.
    ///
    /// `zone` defaults to the component's current zone. Reviewers run strictly
    /// in roster order; a reviewer whose call fails is recorded as unavailable.
    /// Only an unknown component or an unreviewable zone is an error before
    /// persistence.
    pub async fn review(&self, query: &str, zone: Option<Zone>) -> Result<ReviewReport, EngineError> {
        let prepared = self.prepare(query, zone).await?;
        info!(
            "Review cycle for '{}' (#{}) in {} with {} reviewers",
            prepared.component.name,
            prepared.component.id,
            prepared.zone,
            self.roster.len()
        );

        let mut reviews = Vec::with_capacity(self.roster.len());
        for reviewer in &self.roster {
            reviews.push(self.call_reviewer(reviewer, &prepared).await);
        }

        let verdicts: BTreeMap<String, Verdict> = reviews
            .iter()
            .map(|r| (r.agent_id.clone(), r.verdict))
            .collect();
        let approval = evaluate_approval(prepared.zone, &verdicts);
        info!(
            "Review of '{}' in {}: {} ({})",
            prepared.component.name,
            prepared.zone,
            if approval.passed { "passed" } else { "failed" },
            approval.reason
        );

        let mut record = DecisionRecord::new(
            DecisionKind::Review,
            prepared.zone,
            DecisionOutcome {
                passed: approval.passed,
                reason: approval.reason.clone(),
            },
        )
        .for_component(prepared.component.id, &prepared.component.name);
        record.agents = reviews
            .iter()
            .map(|r| AgentSummary {
                agent_id: r.agent_id.clone(),
                verdict: r.verdict,
                score: r.score,
                summary: r.summary(),
            })
            .collect();
        record.static_analysis = Some(prepared.findings.clone());
        self.ledgers.decisions.append(&record).await?;

        let component = self.store_snapshot(&prepared, &reviews).await?;
        self.ledgers
            .record_activity(
                ActivityRecord::new(
                    ActivityKind::Reviewed,
                    format!(
                        "{} reviewed in {}: {}",
                        component.name,
                        prepared.zone,
                        if approval.passed { "passed" } else { "failed" }
                    ),
                )
                .component(component.id)
                .zones(Some(prepared.zone), None),
            )
            .await;

        Ok(ReviewReport {
            component,
            zone: prepared.zone,
            findings: prepared.findings,
            reviews,
            approval: Some(approval),
            decision_id: Some(record.id),
        })
    }

    /// Run one reviewer. Updates the component's snapshot and the activity
    /// feed but writes no decision record.
    pub async fn review_single(
        &self,
        query: &str,
        agent_id: &str,
        zone: Option<Zone>,
    ) -> Result<ReviewReport, EngineError> {
        let reviewer = profile(agent_id)
            .filter(|p| self.roster.iter().any(|r| r.id == p.id))
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "'{}' is not a configured reviewer (expected one of: {})",
                    agent_id,
                    self.reviewer_ids().join(", ")
                ))
            })?;

        let prepared = self.prepare(query, zone).await?;
        let review = self.call_reviewer(reviewer, &prepared).await;
        let reviews = vec![review];

        let component = self.store_snapshot(&prepared, &reviews).await?;
        self.ledgers
            .record_activity(
                ActivityRecord::new(
                    ActivityKind::Reviewed,
                    format!(
                        "{} reviewed {} in {}: {}",
                        reviewer.id, component.name, prepared.zone, reviews[0].verdict
                    ),
                )
                .component(component.id)
                .zones(Some(prepared.zone), None),
            )
            .await;

        Ok(ReviewReport {
            component,
            zone: prepared.zone,
            findings: prepared.findings,
            reviews,
            approval: None,
            decision_id: None,
        })
    }

    async fn prepare(&self, query: &str, zone: Option<Zone>) -> Result<Prepared, EngineError> {
        let component = self
            .pipeline
            .find(query)
            .await
            .ok_or_else(|| EngineError::ComponentNotFound(query.to_string()))?;

        let zone = zone.unwrap_or(component.current_zone);
        if !zone.is_active() || !component.current_zone.is_active() {
            return Err(EngineError::InvalidTransition(format!(
                "{} (#{}) is archived; archived components are not reviewed",
                component.name, component.id
            )));
        }

        let artifacts = self.load_artifacts(&component.slug()).await;
        let findings = self.analyzer.analyze(&artifacts);
        debug!(
            "Static analysis for '{}': {} issues, {} passes",
            component.name,
            findings.issues.len(),
            findings.passes.len()
        );

        let prior = self
            .ledgers
            .recent_decisions_for(component.id, self.history_window)
            .await?;

        Ok(Prepared {
            component,
            zone,
            artifacts,
            findings,
            prior,
        })
    }

    async fn load_artifacts(&self, slug: &str) -> Artifacts {
        let dir = Path::new("components").join(slug);
        Artifacts {
            slug: slug.to_string(),
            spec: self.read_artifact(&dir.join("spec.md")).await,
            style: self.read_artifact(&dir.join("style.css")).await,
        }
    }

    async fn read_artifact(&self, relative: &Path) -> Option<String> {
        let path = match self.paths.validate_read(relative) {
            Ok(path) => path,
            Err(EngineError::PathCanonicalization(..)) => return None,
            Err(e) => {
                warn!("Artifact {:?} refused: {}", relative, e);
                return None;
            }
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Some(contents),
            Err(e) => {
                warn!("Failed to read artifact {:?}: {}", path, e);
                None
            }
        }
    }

    async fn call_reviewer(&self, reviewer: &ReviewerProfile, prepared: &Prepared) -> AgentReview {
        let ctx = ReviewContext {
            component: &prepared.component,
            zone: prepared.zone,
            artifacts: &prepared.artifacts,
            findings: &prepared.findings,
            prior_decisions: &prepared.prior,
            tone: self.tones.get(reviewer.id).map(String::as_str),
        };
        let request = review_request(reviewer, &ctx);

        match self.service.complete(&request).await {
            Ok(response) => {
                let parse = match response.tool_input(SUBMIT_REVIEW_TOOL) {
                    Some(input) => parse_agent_value(reviewer.id, input),
                    None => parse_agent_text(reviewer.id, &response.text()),
                };
                let review = parse.into_review(reviewer.id);
                debug!(
                    "Reviewer {} -> {} ({})",
                    reviewer.id, review.verdict, review.score
                );
                review
            }
            Err(e) if e.is_unavailable() => {
                let reason = scrub_secrets(&e.to_string());
                warn!("Reviewer {} unavailable: {}", reviewer.id, reason);
                AgentReview::unavailable(reviewer.id, &reason)
            }
            Err(e) => {
                warn!("Reviewer {} returned an unreadable reply: {}", reviewer.id, e);
                AgentReview::parse_failure(reviewer.id, "", &e.to_string())
            }
        }
    }

    async fn store_snapshot(
        &self,
        prepared: &Prepared,
        reviews: &[AgentReview],
    ) -> Result<Component, EngineError> {
        let now = Utc::now();
        let snapshot = reviews
            .iter()
            .map(|r| {
                (
                    r.agent_id.clone(),
                    ReviewSnapshot {
                        verdict: r.verdict,
                        score: r.score,
                        zone: prepared.zone,
                        reviewed_at: now,
                    },
                )
            })
            .collect();
        self.pipeline
            .record_reviews(prepared.component.id, snapshot)
            .await
    }
}
