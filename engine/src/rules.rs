//! Zone approval rules
//!
//! A pure function from (zone, agent → verdict) to pass/fail with a reason.
//! Zone topology and thresholds are fixed in code.

use sdk::types::{Verdict, Zone};
use serde::Serialize;
use std::collections::BTreeMap;

/// The reviewer whose veto is binding in veto-active zones.
pub const VETO_AGENT: &str = "ag";

/// Approval policy flags for one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoneRules {
    pub rejection_allowed: bool,
    pub majority_required: bool,
    pub unanimity_required: bool,
    pub veto_active: bool,
}

impl ZoneRules {
    pub const fn for_zone(zone: Zone) -> Self {
        match zone {
            Zone::Nursery => ZoneRules {
                rejection_allowed: false,
                majority_required: false,
                unanimity_required: false,
                veto_active: false,
            },
            Zone::Workshop => ZoneRules {
                rejection_allowed: true,
                majority_required: true,
                unanimity_required: false,
                veto_active: false,
            },
            Zone::Canopy | Zone::Stable => ZoneRules {
                rejection_allowed: true,
                majority_required: false,
                unanimity_required: true,
                veto_active: true,
            },
            Zone::SeedVault => ZoneRules {
                rejection_allowed: true,
                majority_required: false,
                unanimity_required: false,
                veto_active: false,
            },
        }
    }

    /// A zone where no verdict combination can fail.
    pub const fn is_permissive(&self) -> bool {
        !self.rejection_allowed
    }
}

/// Approvals needed out of `total` reviewers for the zone's policy.
pub fn approvals_needed(zone: Zone, total: usize) -> usize {
    let rules = ZoneRules::for_zone(zone);
    if rules.is_permissive() {
        0
    } else if rules.unanimity_required {
        total
    } else if rules.majority_required {
        total.div_ceil(2)
    } else {
        0
    }
}

/// Which rule settled the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecidingRule {
    Veto,
    Permissive,
    Unanimity,
    Majority,
    NoVerdicts,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Approval {
    pub passed: bool,
    pub reason: String,
    pub rule: DecidingRule,
}

impl Approval {
    fn pass(rule: DecidingRule, reason: String) -> Self {
        Self {
            passed: true,
            reason,
            rule,
        }
    }

    fn fail(rule: DecidingRule, reason: String) -> Self {
        Self {
            passed: false,
            reason,
            rule,
        }
    }
}

/// Evaluate the zone's policy over a verdict map.
///
/// Rules apply in order: binding veto, permissive zone, unanimity, majority,
/// default pass. A zone that requires approvals fails on an empty map.
/// `Unavailable` and a non-binding `Vetoed` both count as non-approval.
pub fn evaluate_approval(zone: Zone, verdicts: &BTreeMap<String, Verdict>) -> Approval {
    let rules = ZoneRules::for_zone(zone);

    if rules.veto_active && verdicts.get(VETO_AGENT) == Some(&Verdict::Vetoed) {
        return Approval::fail(DecidingRule::Veto, format!("Vetoed by {}", VETO_AGENT));
    }

    if rules.is_permissive() {
        return Approval::pass(
            DecidingRule::Permissive,
            format!("{} does not allow rejection", zone),
        );
    }

    let total = verdicts.len();
    let approved = verdicts.values().filter(|v| v.is_approval()).count();

    if (rules.unanimity_required || rules.majority_required) && total == 0 {
        return Approval::fail(
            DecidingRule::NoVerdicts,
            format!("No verdicts recorded for {}", zone),
        );
    }

    if rules.unanimity_required {
        let missing: Vec<&str> = verdicts
            .iter()
            .filter(|(_, v)| !v.is_approval())
            .map(|(agent, _)| agent.as_str())
            .collect();

        return if missing.is_empty() {
            Approval::pass(
                DecidingRule::Unanimity,
                format!("Unanimous approval: {}/{}", approved, total),
            )
        } else {
            Approval::fail(
                DecidingRule::Unanimity,
                format!(
                    "Unanimous approval required; missing approvals from: {}",
                    missing.join(", ")
                ),
            )
        };
    }

    if rules.majority_required {
        let needed = total.div_ceil(2);
        return if approved >= needed {
            Approval::pass(
                DecidingRule::Majority,
                format!(
                    "Majority reached: {}/{} approvals (needed {})",
                    approved, total, needed
                ),
            )
        } else {
            Approval::fail(
                DecidingRule::Majority,
                format!(
                    "Majority not reached: {}/{} approvals (needed {})",
                    approved, total, needed
                ),
            )
        };
    }

    Approval::pass(
        DecidingRule::Default,
        format!("No approval policy applies in {}", zone),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdicts(pairs: &[(&str, Verdict)]) -> BTreeMap<String, Verdict> {
        pairs.iter().map(|(a, v)| (a.to_string(), *v)).collect()
    }

    fn toggle_verdicts() -> BTreeMap<String, Verdict> {
        verdicts(&[
            ("ts", Verdict::Approved),
            ("ag", Verdict::NeedsWork),
            ("pl", Verdict::Approved),
            ("ca", Verdict::NeedsWork),
            ("px", Verdict::Approved),
        ])
    }

    #[test]
    fn test_workshop_majority_passes() {
        let approval = evaluate_approval(Zone::Workshop, &toggle_verdicts());

        assert!(approval.passed);
        assert!(approval.reason.contains("3/5"));
        assert_eq!(approval.rule, DecidingRule::Majority);
    }

    #[test]
    fn test_canopy_unanimity_names_missing() {
        let approval = evaluate_approval(Zone::Canopy, &toggle_verdicts());

        assert!(!approval.passed);
        assert!(approval.reason.contains("ag"));
        assert!(approval.reason.contains("ca"));
        assert!(!approval.reason.contains("ts"));
    }

    #[test]
    fn test_binding_veto_fails_even_with_other_approvals() {
        let mut map = toggle_verdicts();
        map.insert("ag".to_string(), Verdict::Vetoed);
        for agent in ["ts", "pl", "ca", "px"] {
            map.insert(agent.to_string(), Verdict::Approved);
        }

        let approval = evaluate_approval(Zone::Stable, &map);
        assert!(!approval.passed);
        assert_eq!(approval.rule, DecidingRule::Veto);
        assert_eq!(approval.reason, "Vetoed by ag");
    }

    #[test]
    fn test_veto_outside_veto_zone_is_plain_non_approval() {
        let map = verdicts(&[
            ("ts", Verdict::Approved),
            ("ag", Verdict::Vetoed),
            ("pl", Verdict::Approved),
        ]);

        let approval = evaluate_approval(Zone::Workshop, &map);
        assert!(approval.passed);
        assert_eq!(approval.rule, DecidingRule::Majority);
    }

    #[test]
    fn test_nursery_is_permissive_even_when_empty() {
        let approval = evaluate_approval(Zone::Nursery, &BTreeMap::new());
        assert!(approval.passed);

        let all_vetoed = verdicts(&[("ag", Verdict::Vetoed), ("ts", Verdict::Vetoed)]);
        assert!(evaluate_approval(Zone::Nursery, &all_vetoed).passed);
    }

    #[test]
    fn test_empty_map_fails_in_strict_zones() {
        for zone in [Zone::Workshop, Zone::Canopy, Zone::Stable] {
            let approval = evaluate_approval(zone, &BTreeMap::new());
            assert!(!approval.passed, "{} should fail on no verdicts", zone);
            assert_eq!(approval.rule, DecidingRule::NoVerdicts);
        }
    }

    #[test]
    fn test_majority_threshold_at_five() {
        let two = verdicts(&[
            ("ts", Verdict::Approved),
            ("ag", Verdict::Approved),
            ("pl", Verdict::NeedsWork),
            ("ca", Verdict::Unavailable),
            ("px", Verdict::NeedsWork),
        ]);

        let approval = evaluate_approval(Zone::Workshop, &two);
        assert!(!approval.passed);
        assert_eq!(approval.reason, "Majority not reached: 2/5 approvals (needed 3)");
    }

    #[test]
    fn test_approvals_needed() {
        assert_eq!(approvals_needed(Zone::Nursery, 5), 0);
        assert_eq!(approvals_needed(Zone::Workshop, 5), 3);
        assert_eq!(approvals_needed(Zone::Workshop, 4), 2);
        assert_eq!(approvals_needed(Zone::Canopy, 5), 5);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let map = toggle_verdicts();
        for zone in Zone::ACTIVE {
            assert_eq!(evaluate_approval(zone, &map), evaluate_approval(zone, &map));
        }
    }
}
