//! Multi-agent review
//!
//! A review cycle resolves a component, loads its `spec.md` and `style.css`
//! from `components/<slug>/` in the workspace, runs the static pre-checks,
//! asks each reviewer in turn for a structured verdict and aggregates the
//! verdicts under the zone's approval rules.

pub mod orchestrator;
pub mod parser;
pub mod prechecks;
pub mod prompt;
pub mod reviewers;

pub use orchestrator::{ReviewOrchestrator, ReviewReport};
pub use parser::{AgentParse, AgentReview, Rationale, VerdictSource};
pub use prechecks::{Artifacts, Finding, StaticAnalyzer, StaticFindings, StyleLinter};
pub use reviewers::{ReviewerProfile, REVIEWERS};
