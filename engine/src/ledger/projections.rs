//! Projections folded from ledger records

use super::records::{ChangeRecord, DecisionRecord, InitiativeRecord};
use super::Projection;
use sdk::types::Zone;
use std::collections::{HashMap, HashSet};

/// Latest gating decision per (component, zone).
///
/// Only review and override records gate promotion; archive and proposal
/// records are ignored.
#[derive(Debug, Default)]
pub struct LatestDecisions {
    latest: HashMap<(u64, Zone), DecisionRecord>,
}

impl LatestDecisions {
    pub fn get(&self, component_id: u64, zone: Zone) -> Option<&DecisionRecord> {
        self.latest.get(&(component_id, zone))
    }
}

impl Projection<DecisionRecord> for LatestDecisions {
    fn apply(&mut self, record: &DecisionRecord) {
        if !record.is_gate() {
            return;
        }
        if let Some(id) = record.component_id {
            self.latest.insert((id, record.zone), record.clone());
        }
    }
}

/// All changes in ledger order, queryable as cause→effect chains.
#[derive(Debug, Default)]
pub struct ChangeGraph {
    changes: Vec<ChangeRecord>,
}

impl ChangeGraph {
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn contains(&self, change_id: &str) -> bool {
        self.changes.iter().any(|c| c.id == change_id)
    }

    /// Changes touching `file`, followed by every change transitively caused
    /// by them, in ledger order.
    pub fn chain_for(&self, file: &str) -> Vec<ChangeRecord> {
        let mut in_chain: HashSet<&str> = self
            .changes
            .iter()
            .filter(|c| c.file == file)
            .map(|c| c.id.as_str())
            .collect();

        // caused_by always points backwards, so one ordered pass closes the set
        for change in &self.changes {
            if let Some(cause) = change.caused_by.as_deref() {
                if in_chain.contains(cause) {
                    in_chain.insert(change.id.as_str());
                }
            }
        }

        let (direct, dependent): (Vec<&ChangeRecord>, Vec<&ChangeRecord>) = self
            .changes
            .iter()
            .filter(|c| in_chain.contains(c.id.as_str()))
            .partition(|c| c.file == file);

        direct.into_iter().chain(dependent).cloned().collect()
    }
}

impl Projection<ChangeRecord> for ChangeGraph {
    fn apply(&mut self, record: &ChangeRecord) {
        self.changes.push(record.clone());
    }
}

/// Latest state of every initiative, in order of first appearance.
#[derive(Debug, Default)]
pub struct InitiativeBoard {
    order: Vec<String>,
    latest: HashMap<String, InitiativeRecord>,
}

impl InitiativeBoard {
    pub fn initiatives(&self) -> Vec<&InitiativeRecord> {
        self.order
            .iter()
            .filter_map(|id| self.latest.get(id))
            .collect()
    }
}

impl Projection<InitiativeRecord> for InitiativeBoard {
    fn apply(&mut self, record: &InitiativeRecord) {
        if !self.latest.contains_key(&record.id) {
            self.order.push(record.id.clone());
        }
        self.latest.insert(record.id.clone(), record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::records::{
        ChangeType, DecisionKind, DecisionOutcome, InitiativeStatus,
    };

    fn change(id: &str, file: &str, caused_by: Option<&str>) -> ChangeRecord {
        let mut record = ChangeRecord::new(file, ChangeType::Modified, "edit");
        record.id = id.to_string();
        record.caused_by = caused_by.map(str::to_string);
        record
    }

    fn fold<R, P: Projection<R> + Default>(records: &[R]) -> P {
        let mut projection = P::default();
        for record in records {
            projection.apply(record);
        }
        projection
    }

    #[test]
    fn test_latest_decision_wins() {
        let outcome = |passed| DecisionOutcome {
            passed,
            reason: String::new(),
        };
        let records = vec![
            DecisionRecord::new(DecisionKind::Review, Zone::Workshop, outcome(false))
                .for_component(1, "Toggle"),
            DecisionRecord::new(DecisionKind::Review, Zone::Workshop, outcome(true))
                .for_component(1, "Toggle"),
            DecisionRecord::new(DecisionKind::Archive, Zone::Workshop, outcome(false))
                .for_component(1, "Toggle"),
        ];

        let latest: LatestDecisions = fold(&records);
        assert!(latest.get(1, Zone::Workshop).unwrap().outcome.passed);
        assert!(latest.get(1, Zone::Canopy).is_none());
    }

    #[test]
    fn test_change_chain_follows_causes() {
        let records = vec![
            change("c1", "tokens.css", None),
            change("c2", "button/style.css", Some("c1")),
            change("c3", "unrelated.css", None),
            change("c4", "toggle/style.css", Some("c2")),
            change("c5", "tokens.css", None),
        ];

        let graph: ChangeGraph = fold(&records);
        let chain: Vec<String> = graph
            .chain_for("tokens.css")
            .into_iter()
            .map(|c| c.id)
            .collect();

        assert_eq!(chain, vec!["c1", "c5", "c2", "c4"]);
    }

    #[test]
    fn test_change_chain_for_unknown_file_is_empty() {
        let graph: ChangeGraph = fold(&[change("c1", "a.css", None)]);
        assert!(graph.chain_for("b.css").is_empty());
    }

    #[test]
    fn test_initiative_board_keeps_latest_status() {
        let first = InitiativeRecord::new("Dark mode", "");
        let mut update = first.clone();
        update.status = InitiativeStatus::Active;
        let other = InitiativeRecord::new("Density", "");

        let board: InitiativeBoard = fold(&[first, other, update]);
        let listed = board.initiatives();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "Dark mode");
        assert_eq!(listed[0].status, InitiativeStatus::Active);
    }
}
