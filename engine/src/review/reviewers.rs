//! Reviewer roster and zone postures

use crate::rules::VETO_AGENT;
use sdk::errors::EngineError;
use sdk::types::Zone;

/// A reviewer role: who it is and what it checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewerProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub focus: &'static str,
    pub ruleset: &'static [&'static str],
}

impl ReviewerProfile {
    pub fn holds_veto(&self) -> bool {
        self.id == VETO_AGENT
    }
}

pub const REVIEWERS: [ReviewerProfile; 5] = [
    ReviewerProfile {
        id: "ts",
        name: "Token Steward",
        focus: "design tokens and theming",
        ruleset: &[
            "Every colour, space, radius and type value comes from a semantic token.",
            "Primitive or raw tokens are never referenced directly by a component.",
            "The component renders correctly under every supported theme.",
        ],
    },
    ReviewerProfile {
        id: "ag",
        name: "Accessibility Guardian",
        focus: "accessibility",
        ruleset: &[
            "Text and interactive boundaries meet WCAG AA contrast.",
            "Every interactive state is reachable and operable by keyboard.",
            "Focus is always visible and never trapped.",
            "Roles, names and states are exposed to assistive technology.",
            "Motion respects reduced-motion preferences.",
        ],
    },
    ReviewerProfile {
        id: "pl",
        name: "Pattern Librarian",
        focus: "consistency with the existing library",
        ruleset: &[
            "The component does not duplicate an existing pattern.",
            "Naming follows library conventions: kebab-case, prefixed with the component slug.",
            "spec.md documents purpose, anatomy, variants and usage guidance.",
        ],
    },
    ReviewerProfile {
        id: "ca",
        name: "Component Architect",
        focus: "API and structure",
        ruleset: &[
            "Props and variants are minimal, orthogonal and named for intent.",
            "Every state (default, hover, focus, active, disabled, error) is specified.",
            "The component composes with others without overriding their styles.",
        ],
    },
    ReviewerProfile {
        id: "px",
        name: "Product Experience",
        focus: "usability in real product flows",
        ruleset: &[
            "The component solves a concrete product need named in spec.md.",
            "Interaction feedback is immediate and unambiguous.",
            "Copy and labels are clear for first-time users.",
        ],
    },
];

pub fn profile(id: &str) -> Option<&'static ReviewerProfile> {
    REVIEWERS.iter().find(|r| r.id == id)
}

/// Resolve configured reviewer ids to profiles, keeping the configured order.
pub fn roster(ids: &[String]) -> Result<Vec<&'static ReviewerProfile>, EngineError> {
    ids.iter()
        .map(|id| {
            profile(id).ok_or_else(|| {
                EngineError::Config(format!(
                    "Unknown reviewer '{}'. Must be one of: {}",
                    id,
                    REVIEWERS.iter().map(|r| r.id).collect::<Vec<_>>().join(", ")
                ))
            })
        })
        .collect()
}

/// How strictly reviewers should judge work in a zone.
pub fn zone_posture(zone: Zone) -> &'static str {
    match zone {
        Zone::Nursery => {
            "Nursery: early exploration. Be encouraging and point out the most important \
             next steps. Nothing you say blocks promotion here."
        }
        Zone::Workshop => {
            "Workshop: active iteration. Approve when the work is sound enough to refine \
             further. A majority of reviewers must approve to move on."
        }
        Zone::Canopy => {
            "Canopy: release candidate. Approve only when nothing in your area remains \
             open. Every reviewer must approve and the accessibility veto is binding."
        }
        Zone::Stable => {
            "Stable: shipped and depended upon. Judge changes by the risk they pose to \
             existing consumers. Every reviewer must approve and the accessibility veto is binding."
        }
        Zone::SeedVault => "Seed vault: archived. No review applies.",
    }
}
