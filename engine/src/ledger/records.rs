//! Record types stored in the ledgers

use crate::review::prechecks::StaticFindings;
use chrono::{DateTime, Utc};
use sdk::types::{Verdict, Zone};
use serde::{Deserialize, Serialize};

/// Short unique id for a ledger record, prefixed by record family.
pub fn new_record_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &uuid[..12])
}

/// What produced a decision record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionKind {
    /// A full multi-agent review cycle
    Review,
    /// An out-of-band veto override
    Override,
    /// Rationale for moving a component into the seed vault
    Archive,
    /// Terminal resolution of a proposal
    Proposal,
}

/// Aggregated outcome of a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub passed: bool,
    pub reason: String,
}

/// One reviewer's contribution to a decision, as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub verdict: Verdict,
    pub score: u8,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: DecisionKind,
    pub zone: Zone,
    #[serde(default)]
    pub component_id: Option<u64>,
    #[serde(default)]
    pub component_name: Option<String>,
    pub outcome: DecisionOutcome,
    #[serde(default)]
    pub agents: Vec<AgentSummary>,
    #[serde(default)]
    pub static_analysis: Option<StaticFindings>,
    /// Who acted, for overrides and proposals
    #[serde(default)]
    pub actor: Option<String>,
}

impl DecisionRecord {
    pub fn new(kind: DecisionKind, zone: Zone, outcome: DecisionOutcome) -> Self {
        Self {
            id: new_record_id("dec"),
            timestamp: Utc::now(),
            kind,
            zone,
            component_id: None,
            component_name: None,
            outcome,
            agents: Vec::new(),
            static_analysis: None,
            actor: None,
        }
    }

    pub fn for_component(mut self, id: u64, name: &str) -> Self {
        self.component_id = Some(id);
        self.component_name = Some(name.to_string());
        self
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    /// Whether this record gates promotion out of its zone.
    pub fn is_gate(&self) -> bool {
        matches!(self.kind, DecisionKind::Review | DecisionKind::Override)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
    Renamed,
}

impl std::str::FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "added" | "add" | "created" => Ok(ChangeType::Added),
            "modified" | "modify" | "updated" => Ok(ChangeType::Modified),
            "removed" | "remove" | "deleted" => Ok(ChangeType::Removed),
            "renamed" | "rename" | "moved" => Ok(ChangeType::Renamed),
            other => Err(format!(
                "illegal change type '{}' (added, modified, removed, renamed)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BreakageRisk {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl std::str::FromStr for BreakageRisk {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(BreakageRisk::None),
            "low" => Ok(BreakageRisk::Low),
            "medium" => Ok(BreakageRisk::Medium),
            "high" => Ok(BreakageRisk::High),
            other => Err(format!(
                "illegal breakage risk '{}' (none, low, medium, high)",
                other
            )),
        }
    }
}

/// A file change, optionally caused by an earlier change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub file: String,
    pub change_type: ChangeType,
    pub description: String,
    #[serde(default)]
    pub breakage_risk: BreakageRisk,
    #[serde(default)]
    pub caused_by: Option<String>,
}

impl ChangeRecord {
    pub fn new(file: &str, change_type: ChangeType, description: &str) -> Self {
        Self {
            id: new_record_id("chg"),
            timestamp: Utc::now(),
            file: file.to_string(),
            change_type,
            description: description.to_string(),
            breakage_risk: BreakageRisk::None,
            caused_by: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    Created,
    Promoted,
    Archived,
    Revived,
    Reviewed,
    Shielded,
    ArtifactWritten,
    InitiativeCreated,
    ProposalResolved,
}

/// One human-readable line in the activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: ActivityKind,
    #[serde(default)]
    pub component_id: Option<u64>,
    #[serde(default)]
    pub from_zone: Option<Zone>,
    #[serde(default)]
    pub to_zone: Option<Zone>,
    pub message: String,
}

impl ActivityRecord {
    pub fn new(kind: ActivityKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            component_id: None,
            from_zone: None,
            to_zone: None,
            message: message.into(),
        }
    }

    pub fn component(mut self, id: u64) -> Self {
        self.component_id = Some(id);
        self
    }

    pub fn zones(mut self, from: Option<Zone>, to: Option<Zone>) -> Self {
        self.from_zone = from;
        self.to_zone = to;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum InitiativeStatus {
    #[default]
    Proposed,
    Active,
    Done,
    Dropped,
}

impl std::str::FromStr for InitiativeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proposed" => Ok(InitiativeStatus::Proposed),
            "active" => Ok(InitiativeStatus::Active),
            "done" => Ok(InitiativeStatus::Done),
            "dropped" => Ok(InitiativeStatus::Dropped),
            other => Err(format!(
                "illegal initiative status '{}' (proposed, active, done, dropped)",
                other
            )),
        }
    }
}

/// A cross-component effort. Later records with the same id supersede earlier ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiativeRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: InitiativeStatus,
}

impl InitiativeRecord {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            id: new_record_id("ini"),
            timestamp: Utc::now(),
            title: title.to_string(),
            description: description.to_string(),
            status: InitiativeStatus::Proposed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_ids_are_prefixed_and_unique() {
        let a = new_record_id("dec");
        let b = new_record_id("dec");
        assert!(a.starts_with("dec-"));
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn test_decision_record_tolerates_missing_optional_fields() {
        let line = r#"{"id":"dec-1","timestamp":"2024-05-01T10:00:00Z","kind":"review","zone":"workshop","outcome":{"passed":true,"reason":"ok"}}"#;
        let record: DecisionRecord = serde_json::from_str(line).unwrap();

        assert_eq!(record.zone, Zone::Workshop);
        assert!(record.agents.is_empty());
        assert!(record.component_id.is_none());
        assert!(record.is_gate());
    }

    #[test]
    fn test_change_type_aliases() {
        assert_eq!("Deleted".parse::<ChangeType>().unwrap(), ChangeType::Removed);
        assert!("exploded".parse::<ChangeType>().is_err());
    }

    #[test]
    fn test_breakage_risk_ordering() {
        assert!(BreakageRisk::High > BreakageRisk::Low);
        assert_eq!(BreakageRisk::default(), BreakageRisk::None);
    }
}
