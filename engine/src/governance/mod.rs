//! Governance actions layered over the pipeline
//!
//! - Veto overrides ("shield"): the recorded out-of-band action that lets a
//!   component leave a zone its latest review did not pass.
//! - Gated promotion: the promotion path used by conversational clients,
//!   which requires a passing decision, a shield, or a permissive zone.
//! - Proposals: see [`proposals`].

pub mod proposals;

pub use proposals::{Proposal, ProposalBook, ProposalDraft, ProposalKind, ProposalStatus};

use crate::ledger::{
    ActivityKind, ActivityRecord, DecisionKind, DecisionOutcome, DecisionRecord, LatestDecisions,
    Ledgers,
};
use crate::pipeline::{Component, PipelineStore, TransitionResult};
use crate::rules::ZoneRules;
use sdk::errors::EngineError;
use tracing::{info, warn};

/// Override a failing review for a component's current zone.
///
/// The override decision is appended before the shield is raised; if the
/// ledger write fails the component is left unshielded.
pub async fn shield(
    pipeline: &PipelineStore,
    ledgers: &Ledgers,
    id: u64,
    actor: &str,
    reason: &str,
) -> Result<Component, EngineError> {
    let actor = actor.trim();
    if actor.is_empty() {
        return Err(EngineError::Validation(
            "an override must name who is acting".to_string(),
        ));
    }

    let component = pipeline
        .get(id)
        .await
        .ok_or_else(|| EngineError::ComponentNotFound(id.to_string()))?;
    if !component.current_zone.is_active() {
        return Err(EngineError::InvalidTransition(format!(
            "{} (#{}) is archived and cannot be shielded",
            component.name, id
        )));
    }

    let record = DecisionRecord::new(
        DecisionKind::Override,
        component.current_zone,
        DecisionOutcome {
            passed: true,
            reason: format!("Veto overridden by {}: {}", actor, reason.trim()),
        },
    )
    .for_component(id, &component.name)
    .with_actor(actor);
    ledgers.decisions.append(&record).await?;

    let shielded = pipeline.set_shielded(id, true).await?;
    warn!(
        "'{}' (#{}) shielded in {} by {}",
        shielded.name, id, shielded.current_zone, actor
    );
    ledgers
        .record_activity(
            ActivityRecord::new(
                ActivityKind::Shielded,
                format!("{} shielded by {}", shielded.name, actor),
            )
            .component(id)
            .zones(Some(shielded.current_zone), None),
        )
        .await;

    Ok(shielded)
}

/// Promote only when the component has earned it.
///
/// Allowed when the zone is permissive, the component is shielded, or the
/// latest review/override decision for the current zone passed. Absent and
/// terminal components come back as tagged outcomes like [`PipelineStore::promote`].
pub async fn gated_promote(
    pipeline: &PipelineStore,
    ledgers: &Ledgers,
    id: u64,
) -> Result<TransitionResult, EngineError> {
    let Some(component) = pipeline.get(id).await else {
        return Ok(TransitionResult::NotFound { id });
    };
    let zone = component.current_zone;

    if ZoneRules::for_zone(zone).is_permissive() || component.shielded {
        return pipeline.promote(id).await;
    }

    let latest: LatestDecisions = ledgers.decisions.project().await?;
    match latest.get(id, zone) {
        Some(decision) if decision.outcome.passed => {
            info!("Promotion of #{} gated on decision {}", id, decision.id);
            pipeline.promote(id).await
        }
        Some(decision) => Err(EngineError::InvalidTransition(format!(
            "{} (#{}) did not pass review in {}: {}",
            component.name, id, zone, decision.outcome.reason
        ))),
        None if component.current_zone.next().is_none() => {
            Ok(TransitionResult::Terminal { component })
        }
        None => Err(EngineError::InvalidTransition(format!(
            "{} (#{}) has not been reviewed in {}",
            component.name, id, zone
        ))),
    }
}
