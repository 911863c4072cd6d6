//! Zone, verdict and chat event types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A governance-lifecycle stage with its own approval policy.
///
/// Active zones form a fixed line: nursery → workshop → canopy → stable.
/// The seed vault is absorbing: components enter it from any active zone and
/// never transition out (revival creates a fresh component instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Zone {
    Nursery,
    Workshop,
    Canopy,
    Stable,
    SeedVault,
}

impl Zone {
    /// Active zones in lifecycle order
    pub const ACTIVE: [Zone; 4] = [Zone::Nursery, Zone::Workshop, Zone::Canopy, Zone::Stable];

    /// The zone a promotion moves into, or `None` when no promotion is possible
    pub fn next(self) -> Option<Zone> {
        match self {
            Zone::Nursery => Some(Zone::Workshop),
            Zone::Workshop => Some(Zone::Canopy),
            Zone::Canopy => Some(Zone::Stable),
            Zone::Stable | Zone::SeedVault => None,
        }
    }

    pub fn is_active(self) -> bool {
        !matches!(self, Zone::SeedVault)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Zone::Nursery => "nursery",
            Zone::Workshop => "workshop",
            Zone::Canopy => "canopy",
            Zone::Stable => "stable",
            Zone::SeedVault => "seed-vault",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a zone name cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown zone '{0}'. Must be one of: nursery, workshop, canopy, stable, seed-vault")]
pub struct ParseZoneError(pub String);

impl FromStr for Zone {
    type Err = ParseZoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "nursery" => Ok(Zone::Nursery),
            "workshop" => Ok(Zone::Workshop),
            "canopy" => Ok(Zone::Canopy),
            "stable" => Ok(Zone::Stable),
            "seed-vault" | "seedvault" | "vault" => Ok(Zone::SeedVault),
            _ => Err(ParseZoneError(s.to_string())),
        }
    }
}

/// One reviewer's outcome for one component in one cycle.
///
/// `Unavailable` means the completion service could not be reached. It is
/// distinct from every real verdict and always counts as non-approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Approved,
    NeedsWork,
    Vetoed,
    Unavailable,
}

impl Verdict {
    pub fn is_approval(self) -> bool {
        matches!(self, Verdict::Approved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Approved => "approved",
            Verdict::NeedsWork => "needs-work",
            Verdict::Vetoed => "vetoed",
            Verdict::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    /// Accepts the canonical kebab-case names plus `_`/space separated variants.
    /// `unavailable` is deliberately not parseable: only the engine assigns it.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "approved" | "approve" => Ok(Verdict::Approved),
            "needs-work" => Ok(Verdict::NeedsWork),
            "vetoed" | "veto" => Ok(Verdict::Vetoed),
            other => Err(format!("illegal verdict '{}'", other)),
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace(['_', ' '], "-")
}

/// Events streamed to a conversational client during one chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChatEvent {
    /// A fragment of assistant text
    Token { text: String },

    /// A tool call is about to execute
    ToolStart {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// A tool call finished; `preview` is bounded
    ToolResult {
        id: String,
        name: String,
        ok: bool,
        preview: String,
    },

    /// The conversation turn ended in natural language
    Done {
        session_id: String,
        turns: usize,
        forced_final: bool,
    },

    /// The loop was aborted
    Error { message: String },
}
