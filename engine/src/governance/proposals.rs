//! Proposals
//!
//! A proposal lives in memory until it reaches a terminal status (staged,
//! rejected or archived). At that point one decision record of kind
//! `proposal` is appended and the proposal is forgotten. If the append
//! fails the proposal stays open, unchanged.

use crate::ledger::{DecisionKind, DecisionOutcome, DecisionRecord, Ledger};
use crate::rules::{approvals_needed, ZoneRules, VETO_AGENT};
use sdk::errors::EngineError;
use sdk::types::Zone;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProposalKind {
    /// Move a component into the target zone
    Promotion,
    /// Retire a component into the seed vault
    Deprecation,
    /// Change shared tokens or conventions that apply in the target zone
    Amendment,
}

impl FromStr for ProposalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "promotion" | "promote" => Ok(ProposalKind::Promotion),
            "deprecation" | "deprecate" | "archive" => Ok(ProposalKind::Deprecation),
            "amendment" | "amend" | "change" => Ok(ProposalKind::Amendment),
            other => Err(format!(
                "illegal proposal kind '{}' (promotion, deprecation, amendment)",
                other
            )),
        }
    }
}

impl fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProposalKind::Promotion => "promotion",
            ProposalKind::Deprecation => "deprecation",
            ProposalKind::Amendment => "amendment",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProposalStatus {
    Pending,
    AutoApproved,
    Approved,
    Staged,
    Rejected,
    Archived,
}

impl ProposalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProposalStatus::Staged | ProposalStatus::Rejected | ProposalStatus::Archived
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::AutoApproved => "auto-approved",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Staged => "staged",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Proposal {
    pub id: String,
    pub kind: ProposalKind,
    pub proposer: String,
    pub target_zone: Zone,
    pub summary: String,
    pub component_id: Option<u64>,
    pub approvals_needed: usize,
    pub approvals_received: BTreeSet<String>,
    pub objections: BTreeSet<String>,
    pub vetoed_by: Option<String>,
    pub status: ProposalStatus,
}

/// Fields for a new proposal.
#[derive(Debug, Clone)]
pub struct ProposalDraft {
    pub kind: ProposalKind,
    pub proposer: String,
    pub target_zone: Zone,
    pub summary: String,
    pub component_id: Option<u64>,
}

/// In-memory proposal registry backed by the decision ledger for resolutions.
pub struct ProposalBook {
    reviewers: Vec<String>,
    decisions: Ledger<DecisionRecord>,
    state: Mutex<BookState>,
}

#[derive(Default)]
struct BookState {
    next_seq: u64,
    open: BTreeMap<String, Proposal>,
}

impl ProposalBook {
    pub fn new(reviewers: Vec<String>, decisions: Ledger<DecisionRecord>) -> Self {
        Self {
            reviewers,
            decisions,
            state: Mutex::new(BookState::default()),
        }
    }

    pub async fn open_proposals(&self) -> Vec<Proposal> {
        self.state.lock().await.open.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<Proposal> {
        self.state.lock().await.open.get(id).cloned()
    }

    /// Register a proposal. Permissive target zones approve it immediately.
    pub async fn submit(&self, draft: ProposalDraft) -> Result<Proposal, EngineError> {
        if draft.proposer.trim().is_empty() {
            return Err(EngineError::Validation("proposer must not be empty".to_string()));
        }
        if !draft.target_zone.is_active() {
            return Err(EngineError::Validation(format!(
                "proposals cannot target {}",
                draft.target_zone
            )));
        }

        let needed = approvals_needed(draft.target_zone, self.reviewers.len());
        let status = if needed == 0 {
            ProposalStatus::AutoApproved
        } else {
            ProposalStatus::Pending
        };

        let mut state = self.state.lock().await;
        state.next_seq += 1;
        let proposal = Proposal {
            id: format!("prop-{}", state.next_seq),
            kind: draft.kind,
            proposer: draft.proposer.trim().to_string(),
            target_zone: draft.target_zone,
            summary: draft.summary,
            component_id: draft.component_id,
            approvals_needed: needed,
            approvals_received: BTreeSet::new(),
            objections: BTreeSet::new(),
            vetoed_by: None,
            status,
        };
        state.open.insert(proposal.id.clone(), proposal.clone());

        info!(
            "Proposal {} ({}) for {} submitted by {}: {}",
            proposal.id,
            proposal.kind,
            proposal.target_zone,
            proposal.proposer,
            proposal.status.as_str()
        );
        Ok(proposal)
    }

    /// Record one reviewer's vote.
    ///
    /// A rejection from the veto agent in a veto-active zone rejects the
    /// proposal outright; otherwise the proposal is rejected once the
    /// remaining voters can no longer reach the threshold.
    pub async fn vote(&self, id: &str, agent: &str, approve: bool) -> Result<Proposal, EngineError> {
        if !self.reviewers.iter().any(|r| r == agent) {
            return Err(EngineError::Validation(format!(
                "'{}' is not a reviewer (expected one of: {})",
                agent,
                self.reviewers.join(", ")
            )));
        }

        let mut state = self.state.lock().await;
        let mut proposal = state
            .open
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::ProposalNotFound(id.to_string()))?;
        if proposal.status != ProposalStatus::Pending {
            return Err(EngineError::InvalidTransition(format!(
                "proposal {} is {}, votes are closed",
                id,
                proposal.status.as_str()
            )));
        }

        if approve {
            proposal.objections.remove(agent);
            proposal.approvals_received.insert(agent.to_string());
        } else {
            proposal.approvals_received.remove(agent);
            proposal.objections.insert(agent.to_string());
        }

        let rules = ZoneRules::for_zone(proposal.target_zone);
        let received = proposal.approvals_received.len();
        let undecided = self
            .reviewers
            .len()
            .saturating_sub(received + proposal.objections.len());

        if !approve && rules.veto_active && agent == VETO_AGENT {
            proposal.vetoed_by = Some(agent.to_string());
            proposal.status = ProposalStatus::Rejected;
        } else if received >= proposal.approvals_needed {
            proposal.status = ProposalStatus::Approved;
        } else if received + undecided < proposal.approvals_needed {
            proposal.status = ProposalStatus::Rejected;
        }

        // The book only changes once the resolution is on disk
        if proposal.status.is_terminal() {
            self.resolve(&proposal).await?;
            state.open.remove(id);
        } else {
            state.open.insert(id.to_string(), proposal.clone());
        }
        Ok(proposal)
    }

    /// Stage an approved proposal.
    pub async fn stage(&self, id: &str) -> Result<Proposal, EngineError> {
        let mut state = self.state.lock().await;
        let mut proposal = state
            .open
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::ProposalNotFound(id.to_string()))?;
        if !matches!(
            proposal.status,
            ProposalStatus::Approved | ProposalStatus::AutoApproved
        ) {
            return Err(EngineError::InvalidTransition(format!(
                "proposal {} is {}, only approved proposals can be staged",
                id,
                proposal.status.as_str()
            )));
        }

        proposal.status = ProposalStatus::Staged;
        self.resolve(&proposal).await?;
        state.open.remove(id);
        Ok(proposal)
    }

    /// Withdraw an open proposal.
    pub async fn withdraw(&self, id: &str) -> Result<Proposal, EngineError> {
        let mut state = self.state.lock().await;
        let mut proposal = state
            .open
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::ProposalNotFound(id.to_string()))?;

        proposal.status = ProposalStatus::Archived;
        self.resolve(&proposal).await?;
        state.open.remove(id);
        Ok(proposal)
    }

    async fn resolve(&self, proposal: &Proposal) -> Result<(), EngineError> {
        let mut reason = format!(
            "Proposal {} ({}) {}: {}/{} approvals",
            proposal.id,
            proposal.kind,
            proposal.status.as_str(),
            proposal.approvals_received.len(),
            proposal.approvals_needed
        );
        if let Some(agent) = &proposal.vetoed_by {
            reason.push_str(&format!(", vetoed by {}", agent));
        }
        if !proposal.summary.is_empty() {
            reason.push_str(&format!(" - {}", proposal.summary));
        }

        let mut record = DecisionRecord::new(
            DecisionKind::Proposal,
            proposal.target_zone,
            DecisionOutcome {
                passed: proposal.status == ProposalStatus::Staged,
                reason,
            },
        )
        .with_actor(&proposal.proposer);
        record.component_id = proposal.component_id;

        self.decisions.append(&record).await?;
        info!("Proposal {} resolved as {}", proposal.id, proposal.status.as_str());
        Ok(())
    }
}
