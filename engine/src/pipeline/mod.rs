//! Pipeline state machine
//!
//! Authoritative component → zone assignment. Components move
//! nursery → workshop → canopy → stable, and may be archived into the seed
//! vault from any active zone. Revival creates a fresh nursery component.
//!
//! Every mutation rewrites the whole pipeline document and then appends one
//! activity line. The two writes are not atomic with each other: a crash in
//! between leaves the document updated and the activity line missing. The
//! same holds for the rationale decision written by `archive`.
//! Mutations are applied to a copy and only swapped in after the document
//! has been written, so a failed write leaves memory and disk in agreement.

pub mod document;

pub use document::{maturity_for, slugify, Component, PipelineDocument, ReviewSnapshot};

use crate::ledger::{
    ActivityKind, ActivityRecord, DecisionKind, DecisionOutcome, DecisionRecord, Ledgers,
};
use chrono::Utc;
use sdk::errors::EngineError;
use sdk::types::Zone;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Outcome of a zone transition. Absent and terminal components are ordinary
/// outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum TransitionResult {
    Moved {
        component: Component,
        from: Zone,
        to: Zone,
    },
    NotFound {
        id: u64,
    },
    Terminal {
        component: Component,
    },
}

impl TransitionResult {
    pub fn moved(&self) -> Option<&Component> {
        match self {
            TransitionResult::Moved { component, .. } => Some(component),
            _ => None,
        }
    }

    /// Convert the tagged outcome into an error for callers that need one.
    pub fn into_result(self) -> Result<(Component, Zone, Zone), EngineError> {
        match self {
            TransitionResult::Moved {
                component,
                from,
                to,
            } => Ok((component, from, to)),
            TransitionResult::NotFound { id } => Err(EngineError::ComponentNotFound(id.to_string())),
            TransitionResult::Terminal { component } => Err(EngineError::TerminalZone(format!(
                "{} (#{}) in {}",
                component.name, component.id, component.current_zone
            ))),
        }
    }
}

pub struct PipelineStore {
    path: PathBuf,
    document: Mutex<PipelineDocument>,
    ledgers: Ledgers,
}

impl PipelineStore {
    /// Open `pipeline.json` under `data_dir`, starting empty if absent.
    pub async fn open(data_dir: &Path, ledgers: Ledgers) -> Result<Self, EngineError> {
        let path = data_dir.join("pipeline.json");

        let document = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str::<PipelineDocument>(&contents).map_err(|e| {
                EngineError::Persistence(format!("Pipeline document {:?} is corrupt: {}", path, e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No pipeline document at {:?}, starting empty", path);
                PipelineDocument::new()
            }
            Err(e) => {
                return Err(EngineError::Persistence(format!(
                    "Failed to read pipeline document {:?}: {}",
                    path, e
                )))
            }
        };

        for (zone, id) in document.misplaced() {
            warn!(
                "Component #{} sits in the {} array but names another zone",
                id, zone
            );
        }

        Ok(Self {
            path,
            document: Mutex::new(document),
            ledgers,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> PipelineDocument {
        self.document.lock().await.clone()
    }

    pub async fn find(&self, query: &str) -> Option<Component> {
        self.document.lock().await.find(query).cloned()
    }

    pub async fn get(&self, id: u64) -> Option<Component> {
        self.document.lock().await.get(id).cloned()
    }

    /// Create a component in the nursery.
    ///
    /// Names are not unique; `find` by name resolves to the first match.
    pub async fn create(
        &self,
        name: &str,
        category: &str,
        description: &str,
    ) -> Result<Component, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation(
                "component name must not be empty".to_string(),
            ));
        }

        let mut guard = self.document.lock().await;
        if guard.find(name).is_some() {
            debug!("'{}' already exists, name lookups resolve to the first", name);
        }

        let mut next = guard.clone();
        let component = insert_new(&mut next, name, category, description, None);
        self.persist(&next).await?;
        *guard = next;
        drop(guard);

        info!("Created component '{}' (#{})", component.name, component.id);
        self.ledgers
            .record_activity(
                ActivityRecord::new(
                    ActivityKind::Created,
                    format!("{} created in nursery", component.name),
                )
                .component(component.id)
                .zones(None, Some(Zone::Nursery)),
            )
            .await;

        Ok(component)
    }

    /// Move a component to the next zone. Clears its shield.
    pub async fn promote(&self, id: u64) -> Result<TransitionResult, EngineError> {
        let mut guard = self.document.lock().await;
        let Some(current) = guard.get(id).cloned() else {
            return Ok(TransitionResult::NotFound { id });
        };
        let Some(to) = current.current_zone.next() else {
            return Ok(TransitionResult::Terminal { component: current });
        };

        let mut next = guard.clone();
        let from = next
            .relocate(id, to, Utc::now())
            .ok_or_else(|| EngineError::ComponentNotFound(id.to_string()))?;
        if let Some(moved) = next.get_mut(id) {
            moved.shielded = false;
        }
        let component = next
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::ComponentNotFound(id.to_string()))?;

        self.persist(&next).await?;
        *guard = next;
        drop(guard);

        info!("Promoted '{}' (#{}) {} -> {}", component.name, id, from, to);
        self.ledgers
            .record_activity(
                ActivityRecord::new(
                    ActivityKind::Promoted,
                    format!("{} promoted from {} to {}", component.name, from, to),
                )
                .component(id)
                .zones(Some(from), Some(to)),
            )
            .await;

        Ok(TransitionResult::Moved {
            component,
            from,
            to,
        })
    }

    /// Move a component from any active zone into the seed vault.
    ///
    /// The rationale is written to the decision ledger only, after the move
    /// is persisted. A failed rationale append is logged and the move stands.
    pub async fn archive(&self, id: u64, reason: &str) -> Result<TransitionResult, EngineError> {
        let mut guard = self.document.lock().await;
        let Some(current) = guard.get(id).cloned() else {
            return Ok(TransitionResult::NotFound { id });
        };
        if !current.current_zone.is_active() {
            return Ok(TransitionResult::Terminal { component: current });
        }

        let mut next = guard.clone();
        let from = next
            .relocate(id, Zone::SeedVault, Utc::now())
            .ok_or_else(|| EngineError::ComponentNotFound(id.to_string()))?;
        if let Some(vaulted) = next.get_mut(id) {
            vaulted.shielded = false;
        }
        let component = next
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::ComponentNotFound(id.to_string()))?;

        self.persist(&next).await?;
        *guard = next;
        drop(guard);

        info!("Archived '{}' (#{}) from {}", component.name, id, from);

        let rationale = DecisionRecord::new(
            DecisionKind::Archive,
            from,
            DecisionOutcome {
                passed: false,
                reason: format!("Archived: {}", reason.trim()),
            },
        )
        .for_component(id, &component.name);
        if let Err(e) = self.ledgers.decisions.append(&rationale).await {
            error!("Archive rationale for #{} not recorded: {}", id, e);
        }

        self.ledgers
            .record_activity(
                ActivityRecord::new(
                    ActivityKind::Archived,
                    format!("{} archived from {}", component.name, from),
                )
                .component(id)
                .zones(Some(from), Some(Zone::SeedVault)),
            )
            .await;

        Ok(TransitionResult::Moved {
            component,
            from,
            to: Zone::SeedVault,
        })
    }

    /// Re-enter a vaulted component as a fresh nursery component.
    ///
    /// The vaulted entry stays where it is. A vaulted entry has at most one
    /// live revival.
    pub async fn revive(&self, id: u64) -> Result<Component, EngineError> {
        let mut guard = self.document.lock().await;
        let vaulted = guard
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::ComponentNotFound(id.to_string()))?;
        if vaulted.current_zone != Zone::SeedVault {
            return Err(EngineError::InvalidTransition(format!(
                "{} (#{}) is in {}, only seed-vault components can be revived",
                vaulted.name, id, vaulted.current_zone
            )));
        }
        if let Some(revival) = guard
            .components()
            .find(|c| c.current_zone.is_active() && c.revived_from == Some(id))
        {
            return Err(EngineError::Validation(format!(
                "{} (#{}) was already revived as #{}",
                vaulted.name, id, revival.id
            )));
        }

        let mut next = guard.clone();
        let component = insert_new(
            &mut next,
            &vaulted.name,
            &vaulted.category,
            &vaulted.description,
            Some(id),
        );
        self.persist(&next).await?;
        *guard = next;
        drop(guard);

        info!(
            "Revived '{}' from #{} as #{}",
            component.name, id, component.id
        );
        self.ledgers
            .record_activity(
                ActivityRecord::new(
                    ActivityKind::Revived,
                    format!("{} revived from the seed vault", component.name),
                )
                .component(component.id)
                .zones(Some(Zone::SeedVault), Some(Zone::Nursery)),
            )
            .await;

        Ok(component)
    }

    /// Set or clear the veto shield without touching any ledger.
    pub async fn set_shielded(&self, id: u64, shielded: bool) -> Result<Component, EngineError> {
        self.update(id, |component| component.shielded = shielded)
            .await
    }

    /// Replace per-agent snapshot entries with the verdicts of a review.
    pub async fn record_reviews(
        &self,
        id: u64,
        reviews: BTreeMap<String, ReviewSnapshot>,
    ) -> Result<Component, EngineError> {
        self.update(id, move |component| component.reviews.extend(reviews))
            .await
    }

    async fn update<F>(&self, id: u64, apply: F) -> Result<Component, EngineError>
    where
        F: FnOnce(&mut Component),
    {
        let mut guard = self.document.lock().await;
        let mut next = guard.clone();
        let component = next
            .get_mut(id)
            .ok_or_else(|| EngineError::ComponentNotFound(id.to_string()))?;
        apply(component);
        let updated = component.clone();

        self.persist(&next).await?;
        *guard = next;
        Ok(updated)
    }

    /// Rewrite the whole document through a temporary file and rename.
    async fn persist(&self, document: &PipelineDocument) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(document).map_err(|e| {
            EngineError::Persistence(format!("Failed to encode pipeline document: {}", e))
        })?;

        let tmp = self.path.with_extension("json.tmp");
        let result = async {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&tmp, json.as_bytes()).await?;
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        result.map_err(|e| {
            tracing::error!("Pipeline document write failed: {}", e);
            EngineError::Persistence(format!(
                "Failed to write pipeline document {:?}: {}",
                self.path, e
            ))
        })
    }
}

fn insert_new(
    document: &mut PipelineDocument,
    name: &str,
    category: &str,
    description: &str,
    revived_from: Option<u64>,
) -> Component {
    let now = Utc::now();
    let component = Component {
        id: document.allocate_id(),
        name: name.to_string(),
        category: category.trim().to_string(),
        description: description.trim().to_string(),
        current_zone: Zone::Nursery,
        maturity: maturity_for(Zone::Nursery),
        created_at: now,
        moved_at: now,
        reviews: BTreeMap::new(),
        shielded: false,
        revived_from,
    };
    document.nursery.push(component.clone());
    component
}
