//! The pipeline document: per-zone component arrays plus the id counter.

use chrono::{DateTime, Utc};
use sdk::types::{Verdict, Zone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maturity a component reaches on entering a zone.
pub fn maturity_for(zone: Zone) -> u8 {
    match zone {
        Zone::Nursery => 10,
        Zone::Workshop => 40,
        Zone::Canopy => 70,
        Zone::Stable => 100,
        Zone::SeedVault => 0,
    }
}

/// Latest verdict one reviewer gave a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSnapshot {
    pub verdict: Verdict,
    pub score: u8,
    pub zone: Zone,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub current_zone: Zone,
    pub maturity: u8,
    pub created_at: DateTime<Utc>,
    pub moved_at: DateTime<Utc>,
    /// agent id → latest verdict
    #[serde(default)]
    pub reviews: BTreeMap<String, ReviewSnapshot>,
    #[serde(default)]
    pub shielded: bool,
    /// Vaulted component this one was revived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revived_from: Option<u64>,
}

impl Component {
    /// Directory name for the component's artifacts under `components/`.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }
}

/// Lowercase kebab-case form of a component name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDocument {
    #[serde(default)]
    pub nursery: Vec<Component>,
    #[serde(default)]
    pub workshop: Vec<Component>,
    #[serde(default)]
    pub canopy: Vec<Component>,
    #[serde(default)]
    pub stable: Vec<Component>,
    #[serde(default)]
    pub seed_vault: Vec<Component>,
    #[serde(default = "first_id")]
    pub next_id: u64,
}

fn first_id() -> u64 {
    1
}

/// Search order for lookups: active zones first, the vault last.
const ALL_ZONES: [Zone; 5] = [
    Zone::Nursery,
    Zone::Workshop,
    Zone::Canopy,
    Zone::Stable,
    Zone::SeedVault,
];

impl PipelineDocument {
    pub fn new() -> Self {
        Self {
            next_id: first_id(),
            ..Default::default()
        }
    }

    pub fn zone(&self, zone: Zone) -> &[Component] {
        match zone {
            Zone::Nursery => &self.nursery,
            Zone::Workshop => &self.workshop,
            Zone::Canopy => &self.canopy,
            Zone::Stable => &self.stable,
            Zone::SeedVault => &self.seed_vault,
        }
    }

    pub fn zone_mut(&mut self, zone: Zone) -> &mut Vec<Component> {
        match zone {
            Zone::Nursery => &mut self.nursery,
            Zone::Workshop => &mut self.workshop,
            Zone::Canopy => &mut self.canopy,
            Zone::Stable => &mut self.stable,
            Zone::SeedVault => &mut self.seed_vault,
        }
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        ALL_ZONES.iter().flat_map(move |z| self.zone(*z).iter())
    }

    /// Position of the component with `id`.
    pub fn locate(&self, id: u64) -> Option<(Zone, usize)> {
        ALL_ZONES.iter().find_map(|zone| {
            self.zone(*zone)
                .iter()
                .position(|c| c.id == id)
                .map(|index| (*zone, index))
        })
    }

    pub fn get(&self, id: u64) -> Option<&Component> {
        self.locate(id).map(|(zone, index)| &self.zone(zone)[index])
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Component> {
        let (zone, index) = self.locate(id)?;
        self.zone_mut(zone).get_mut(index)
    }

    /// Exact id match, then case-insensitive name match.
    pub fn find(&self, query: &str) -> Option<&Component> {
        let query = query.trim().trim_start_matches('#');
        if let Ok(id) = query.parse::<u64>() {
            if let Some(component) = self.get(id) {
                return Some(component);
            }
        }
        self.components().find(|c| c.matches_name(query))
    }

    pub fn allocate_id(&mut self) -> u64 {
        let max_seen = self.components().map(|c| c.id).max().unwrap_or(0);
        let id = self.next_id.max(max_seen + 1);
        self.next_id = id + 1;
        id
    }

    /// Components whose zone field disagrees with the array holding them.
    pub fn misplaced(&self) -> Vec<(Zone, u64)> {
        ALL_ZONES
            .iter()
            .flat_map(|zone| {
                self.zone(*zone)
                    .iter()
                    .filter(move |c| c.current_zone != *zone)
                    .map(move |c| (*zone, c.id))
            })
            .collect()
    }

    /// Move `id` from its array into `to`, keeping the zone field in step.
    pub(crate) fn relocate(&mut self, id: u64, to: Zone, at: DateTime<Utc>) -> Option<Zone> {
        let (from, index) = self.locate(id)?;
        let mut component = self.zone_mut(from).remove(index);
        component.current_zone = to;
        component.maturity = maturity_for(to);
        component.moved_at = at;
        self.zone_mut(to).push(component);
        Some(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(id: u64, name: &str, zone: Zone) -> Component {
        let now = Utc::now();
        Component {
            id,
            name: name.to_string(),
            category: "input".to_string(),
            description: String::new(),
            current_zone: zone,
            maturity: maturity_for(zone),
            created_at: now,
            moved_at: now,
            reviews: BTreeMap::new(),
            shielded: false,
            revived_from: None,
        }
    }

    #[test]
    fn test_document_uses_camel_case_keys() {
        let mut doc = PipelineDocument::new();
        doc.seed_vault.push(component(3, "Old", Zone::SeedVault));
        let json = serde_json::to_value(&doc).unwrap();

        assert!(json.get("seedVault").is_some());
        assert_eq!(json["nextId"], 1);
        assert_eq!(json["seedVault"][0]["currentZone"], "seed-vault");
    }

    #[test]
    fn test_empty_document_parses() {
        let doc: PipelineDocument = serde_json::from_str("{}").unwrap();
        assert_eq!(doc.next_id, 1);
        assert_eq!(doc.components().count(), 0);
    }

    #[test]
    fn test_find_by_id_or_name() {
        let mut doc = PipelineDocument::new();
        doc.workshop.push(component(7, "Toggle", Zone::Workshop));

        assert_eq!(doc.find("7").unwrap().name, "Toggle");
        assert_eq!(doc.find("#7").unwrap().name, "Toggle");
        assert_eq!(doc.find("tOGGLE").unwrap().id, 7);
        assert!(doc.find("Slider").is_none());
        assert!(doc.find("8").is_none());
    }

    #[test]
    fn test_allocate_id_never_reuses() {
        let mut doc = PipelineDocument::new();
        doc.nursery.push(component(12, "Card", Zone::Nursery));

        assert_eq!(doc.allocate_id(), 13);
        assert_eq!(doc.allocate_id(), 14);
    }

    #[test]
    fn test_relocate_keeps_zone_field_in_step() {
        let mut doc = PipelineDocument::new();
        doc.nursery.push(component(1, "Toggle", Zone::Nursery));

        let from = doc.relocate(1, Zone::Workshop, Utc::now());
        assert_eq!(from, Some(Zone::Nursery));
        assert!(doc.nursery.is_empty());
        assert_eq!(doc.workshop[0].current_zone, Zone::Workshop);
        assert_eq!(doc.workshop[0].maturity, 40);
        assert!(doc.misplaced().is_empty());
    }

    #[test]
    fn test_misplaced_detects_disagreement() {
        let mut doc = PipelineDocument::new();
        doc.canopy.push(component(4, "Tabs", Zone::Workshop));
        assert_eq!(doc.misplaced(), vec![(Zone::Canopy, 4)]);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Toggle"), "toggle");
        assert_eq!(slugify("  Date Picker v2 "), "date-picker-v2");
        assert_eq!(slugify("Icon/Button"), "icon-button");
    }
}
