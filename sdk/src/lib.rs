//! Arbor SDK
//!
//! Shared vocabulary for Arbor components: the engine-wide error taxonomy and
//! the small set of domain types (zones, verdicts, chat events) that cross the
//! boundary between the engine and whatever transport layer fronts it.

/// Error types and handling
pub mod errors;

/// Zone, verdict and chat event types
pub mod types;

// Re-export commonly used types
pub use errors::{ArborErrorExt, EngineError};
pub use types::{ChatEvent, ParseZoneError, Verdict, Zone};
