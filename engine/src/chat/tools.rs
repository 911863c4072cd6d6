//! Tool registry for the conversational loop
//!
//! Every tool is a real operation on the pipeline or the ledgers. Input is
//! decoded into a typed struct first; anything that does not decode is an
//! `InvalidToolInput` error that the loop reports back to the model as a
//! failed tool result. Tools that touch workspace files validate the path
//! before any storage is read or written.

use crate::fs_guard::PathValidator;
use crate::governance::{gated_promote, ProposalBook, ProposalDraft, ProposalKind};
use crate::ledger::{
    ActivityKind, ActivityRecord, BreakageRisk, ChangeGraph, ChangeRecord, ChangeType,
    InitiativeRecord, InitiativeStatus, Ledgers,
};
use crate::llm::ToolSchema;
use crate::pipeline::{Component, PipelineStore};
use sdk::errors::EngineError;
use sdk::types::Zone;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of records returned by the read tools.
const DEFAULT_LIMIT: usize = 20;

/// Largest artifact `read_artifact` hands back to the model.
const MAX_ARTIFACT_BYTES: usize = 64 * 1024;

pub const TOOL_NAMES: [&str; 16] = [
    "get_pipeline",
    "find_component",
    "create_component",
    "promote_component",
    "archive_component",
    "read_decisions",
    "read_activity",
    "log_change",
    "trace_changes",
    "read_artifact",
    "write_artifact",
    "create_initiative",
    "submit_proposal",
    "vote_proposal",
    "stage_proposal",
    "withdraw_proposal",
];

#[derive(Deserialize)]
struct FindInput {
    query: String,
}

#[derive(Deserialize)]
struct CreateInput {
    name: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct IdInput {
    id: u64,
}

#[derive(Deserialize)]
struct ArchiveInput {
    id: u64,
    reason: String,
}

#[derive(Deserialize)]
struct DecisionsInput {
    #[serde(default)]
    component_id: Option<u64>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct ActivityInput {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct LogChangeInput {
    file: String,
    change_type: String,
    description: String,
    #[serde(default)]
    breakage_risk: Option<String>,
    #[serde(default)]
    caused_by: Option<String>,
}

#[derive(Deserialize)]
struct TraceInput {
    file: String,
}

#[derive(Deserialize)]
struct ReadArtifactInput {
    path: String,
}

#[derive(Deserialize)]
struct WriteArtifactInput {
    path: String,
    content: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    breakage_risk: Option<String>,
}

#[derive(Deserialize)]
struct InitiativeInput {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct ProposalInput {
    kind: String,
    proposer: String,
    target_zone: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    component_id: Option<u64>,
}

#[derive(Deserialize)]
struct ProposalIdInput {
    proposal_id: String,
}

#[derive(Deserialize)]
struct VoteInput {
    proposal_id: String,
    agent: String,
    approve: bool,
}

/// The fixed set of tools a conversation may invoke.
pub struct ToolRegistry {
    pipeline: Arc<PipelineStore>,
    ledgers: Ledgers,
    proposals: Arc<ProposalBook>,
    paths: Arc<dyn PathValidator>,
}

impl ToolRegistry {
    pub fn new(
        pipeline: Arc<PipelineStore>,
        ledgers: Ledgers,
        proposals: Arc<ProposalBook>,
        paths: Arc<dyn PathValidator>,
    ) -> Self {
        Self {
            pipeline,
            ledgers,
            proposals,
            paths,
        }
    }

    /// Name, description and JSON input schema for every tool.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        vec![
            schema(
                "get_pipeline",
                "List every component grouped by zone.",
                json!({"type": "object", "properties": {}}),
            ),
            schema(
                "find_component",
                "Look up a component by numeric id or case-insensitive name.",
                json!({
                    "type": "object",
                    "properties": {"query": {"type": "string", "description": "Id (e.g. 3 or #3) or name"}},
                    "required": ["query"]
                }),
            ),
            schema(
                "create_component",
                "Create a new component in the nursery.",
                json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "category": {"type": "string"},
                        "description": {"type": "string"}
                    },
                    "required": ["name"]
                }),
            ),
            schema(
                "promote_component",
                "Promote a component to the next zone. Requires a passing review in \
                 the current zone unless the zone is permissive or the component is shielded.",
                json!({
                    "type": "object",
                    "properties": {"id": {"type": "integer", "minimum": 1}},
                    "required": ["id"]
                }),
            ),
            schema(
                "archive_component",
                "Move a component into the seed vault. The reason is kept in the decision ledger.",
                json!({
                    "type": "object",
                    "properties": {
                        "id": {"type": "integer", "minimum": 1},
                        "reason": {"type": "string"}
                    },
                    "required": ["id", "reason"]
                }),
            ),
            schema(
                "read_decisions",
                "Recent decision records, newest last, optionally for one component.",
                json!({
                    "type": "object",
                    "properties": {
                        "component_id": {"type": "integer"},
                        "limit": {"type": "integer", "minimum": 1}
                    }
                }),
            ),
            schema(
                "read_activity",
                "Recent lines of the activity feed, newest last.",
                json!({
                    "type": "object",
                    "properties": {"limit": {"type": "integer", "minimum": 1}}
                }),
            ),
            schema(
                "log_change",
                "Record a change to a workspace file in the change ledger.",
                json!({
                    "type": "object",
                    "properties": {
                        "file": {"type": "string", "description": "Workspace-relative path"},
                        "change_type": {"type": "string", "enum": ["added", "modified", "removed", "renamed"]},
                        "description": {"type": "string"},
                        "breakage_risk": {"type": "string", "enum": ["none", "low", "medium", "high"]},
                        "caused_by": {"type": "string", "description": "Id of an earlier change that caused this one"}
                    },
                    "required": ["file", "change_type", "description"]
                }),
            ),
            schema(
                "trace_changes",
                "Changes touching a file, followed by the changes they caused.",
                json!({
                    "type": "object",
                    "properties": {"file": {"type": "string"}},
                    "required": ["file"]
                }),
            ),
            schema(
                "read_artifact",
                "Read a file from the workspace, e.g. components/toggle/spec.md.",
                json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}},
                    "required": ["path"]
                }),
            ),
            schema(
                "write_artifact",
                "Write a file in a writable workspace directory and record the change.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "content": {"type": "string"},
                        "description": {"type": "string"},
                        "breakage_risk": {"type": "string", "enum": ["none", "low", "medium", "high"]}
                    },
                    "required": ["path", "content"]
                }),
            ),
            schema(
                "create_initiative",
                "Start a cross-component initiative.",
                json!({
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "description": {"type": "string"},
                        "status": {"type": "string", "enum": ["proposed", "active", "done", "dropped"]}
                    },
                    "required": ["title"]
                }),
            ),
            schema(
                "submit_proposal",
                "Submit a governance proposal for reviewers to vote on.",
                json!({
                    "type": "object",
                    "properties": {
                        "kind": {"type": "string", "enum": ["promotion", "deprecation", "amendment"]},
                        "proposer": {"type": "string"},
                        "target_zone": {"type": "string", "enum": ["nursery", "workshop", "canopy", "stable"]},
                        "summary": {"type": "string"},
                        "component_id": {"type": "integer"}
                    },
                    "required": ["kind", "proposer", "target_zone"]
                }),
            ),
            schema(
                "vote_proposal",
                "Cast a reviewer's vote on an open proposal.",
                json!({
                    "type": "object",
                    "properties": {
                        "proposal_id": {"type": "string"},
                        "agent": {"type": "string", "enum": ["ts", "ag", "pl", "ca", "px"]},
                        "approve": {"type": "boolean"}
                    },
                    "required": ["proposal_id", "agent", "approve"]
                }),
            ),
            schema(
                "stage_proposal",
                "Stage an approved proposal. Records its resolution in the decision ledger.",
                json!({
                    "type": "object",
                    "properties": {"proposal_id": {"type": "string"}},
                    "required": ["proposal_id"]
                }),
            ),
            schema(
                "withdraw_proposal",
                "Withdraw an open proposal. It is archived and its resolution recorded.",
                json!({
                    "type": "object",
                    "properties": {"proposal_id": {"type": "string"}},
                    "required": ["proposal_id"]
                }),
            ),
        ]
    }

    /// Execute one tool call.
    pub async fn dispatch(&self, name: &str, input: &Value) -> Result<Value, EngineError> {
        debug!("Dispatching tool '{}' with input: {}", name, input);

        match name {
            "get_pipeline" => self.get_pipeline().await,
            "find_component" => {
                let args: FindInput = decode(name, input)?;
                let component = self
                    .pipeline
                    .find(&args.query)
                    .await
                    .ok_or(EngineError::ComponentNotFound(args.query))?;
                to_value(&component)
            }
            "create_component" => {
                let args: CreateInput = decode(name, input)?;
                let component = self
                    .pipeline
                    .create(&args.name, &args.category, &args.description)
                    .await?;
                to_value(&component)
            }
            "promote_component" => {
                let args: IdInput = decode(name, input)?;
                let (component, from, to) = gated_promote(&self.pipeline, &self.ledgers, args.id)
                    .await?
                    .into_result()?;
                Ok(json!({"component": component, "from": from, "to": to}))
            }
            "archive_component" => {
                let args: ArchiveInput = decode(name, input)?;
                if args.reason.trim().is_empty() {
                    return Err(invalid(name, "reason must not be empty"));
                }
                let (component, from, to) = self
                    .pipeline
                    .archive(args.id, &args.reason)
                    .await?
                    .into_result()?;
                Ok(json!({"component": component, "from": from, "to": to}))
            }
            "read_decisions" => {
                let args: DecisionsInput = decode(name, input)?;
                let limit = args.limit.unwrap_or(DEFAULT_LIMIT);
                let decisions = match args.component_id {
                    Some(id) => self.ledgers.recent_decisions_for(id, limit).await?,
                    None => self.ledgers.decisions.tail(limit).await?,
                };
                to_value(&decisions)
            }
            "read_activity" => {
                let args: ActivityInput = decode(name, input)?;
                let lines = self
                    .ledgers
                    .activity
                    .tail(args.limit.unwrap_or(DEFAULT_LIMIT))
                    .await?;
                to_value(&lines)
            }
            "log_change" => {
                let args: LogChangeInput = decode(name, input)?;
                self.log_change(args).await
            }
            "trace_changes" => {
                let args: TraceInput = decode(name, input)?;
                let graph: ChangeGraph = self.ledgers.changes.project().await?;
                let chain = graph.chain_for(args.file.trim());
                Ok(json!({"file": args.file, "chain": chain}))
            }
            "read_artifact" => {
                let args: ReadArtifactInput = decode(name, input)?;
                self.read_artifact(&args.path).await
            }
            "write_artifact" => {
                let args: WriteArtifactInput = decode(name, input)?;
                self.write_artifact(args).await
            }
            "create_initiative" => {
                let args: InitiativeInput = decode(name, input)?;
                self.create_initiative(args).await
            }
            "submit_proposal" => {
                let args: ProposalInput = decode(name, input)?;
                let kind = args
                    .kind
                    .parse::<ProposalKind>()
                    .map_err(|e| invalid(name, &e))?;
                let target_zone = args
                    .target_zone
                    .parse::<Zone>()
                    .map_err(|e| invalid(name, &e.to_string()))?;
                let proposal = self
                    .proposals
                    .submit(ProposalDraft {
                        kind,
                        proposer: args.proposer,
                        target_zone,
                        summary: args.summary,
                        component_id: args.component_id,
                    })
                    .await?;
                to_value(&proposal)
            }
            "vote_proposal" => {
                let args: VoteInput = decode(name, input)?;
                let proposal = self
                    .proposals
                    .vote(&args.proposal_id, args.agent.trim(), args.approve)
                    .await?;
                to_value(&proposal)
            }
            "stage_proposal" => {
                let args: ProposalIdInput = decode(name, input)?;
                let proposal = self.proposals.stage(args.proposal_id.trim()).await?;
                to_value(&proposal)
            }
            "withdraw_proposal" => {
                let args: ProposalIdInput = decode(name, input)?;
                let proposal = self.proposals.withdraw(args.proposal_id.trim()).await?;
                to_value(&proposal)
            }
            _ => {
                warn!("Unknown tool requested: {}", name);
                Err(EngineError::UnknownTool(format!(
                    "{} (available: {})",
                    name,
                    TOOL_NAMES.join(", ")
                )))
            }
        }
    }

    async fn get_pipeline(&self) -> Result<Value, EngineError> {
        let document = self.pipeline.snapshot().await;
        let mut zones = serde_json::Map::new();
        for zone in Zone::ACTIVE.into_iter().chain([Zone::SeedVault]) {
            let entries: Vec<Value> = document.zone(zone).iter().map(summary).collect();
            zones.insert(zone.as_str().to_string(), Value::Array(entries));
        }
        Ok(Value::Object(zones))
    }

    async fn log_change(&self, args: LogChangeInput) -> Result<Value, EngineError> {
        const TOOL: &str = "log_change";
        let file = args.file.trim();
        if file.is_empty() {
            return Err(invalid(TOOL, "file must not be empty"));
        }
        self.paths.validate_write(Path::new(file))?;

        let change_type = args
            .change_type
            .parse::<ChangeType>()
            .map_err(|e| invalid(TOOL, &e))?;
        let mut record = ChangeRecord::new(file, change_type, &args.description);
        if let Some(risk) = args.breakage_risk {
            record.breakage_risk = risk.parse::<BreakageRisk>().map_err(|e| invalid(TOOL, &e))?;
        }
        if let Some(cause) = args.caused_by.filter(|c| !c.trim().is_empty()) {
            let graph: ChangeGraph = self.ledgers.changes.project().await?;
            if !graph.contains(cause.trim()) {
                return Err(invalid(TOOL, &format!("no change with id '{}'", cause.trim())));
            }
            record.caused_by = Some(cause.trim().to_string());
        }

        self.ledgers.changes.append(&record).await?;
        info!("Change {} logged for {}", record.id, record.file);
        to_value(&record)
    }

    async fn read_artifact(&self, path: &str) -> Result<Value, EngineError> {
        let resolved = self.paths.validate_read(Path::new(path))?;
        let content = tokio::fs::read_to_string(&resolved).await?;
        if content.len() > MAX_ARTIFACT_BYTES {
            let mut end = MAX_ARTIFACT_BYTES;
            while !content.is_char_boundary(end) {
                end -= 1;
            }
            return Ok(json!({
                "path": path,
                "content": &content[..end],
                "truncated": true,
            }));
        }
        Ok(json!({"path": path, "content": content, "truncated": false}))
    }

    async fn write_artifact(&self, args: WriteArtifactInput) -> Result<Value, EngineError> {
        const TOOL: &str = "write_artifact";
        let relative = args.path.trim();
        if relative.is_empty() {
            return Err(invalid(TOOL, "path must not be empty"));
        }
        let risk = match args.breakage_risk {
            Some(risk) => risk.parse::<BreakageRisk>().map_err(|e| invalid(TOOL, &e))?,
            None => BreakageRisk::None,
        };

        let resolved = self.paths.validate_write(Path::new(relative))?;
        let existed = tokio::fs::try_exists(&resolved).await?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&resolved, args.content.as_bytes()).await?;

        let change_type = if existed {
            ChangeType::Modified
        } else {
            ChangeType::Added
        };
        let description = args
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("{} via write_artifact", relative));
        let mut record = ChangeRecord::new(relative, change_type, &description);
        record.breakage_risk = risk;
        self.ledgers.changes.append(&record).await?;

        info!("Artifact {} written ({} bytes)", relative, args.content.len());
        self.ledgers
            .record_activity(ActivityRecord::new(
                ActivityKind::ArtifactWritten,
                format!("{} {}", relative, if existed { "updated" } else { "created" }),
            ))
            .await;

        Ok(json!({
            "path": relative,
            "bytes": args.content.len(),
            "change": record,
        }))
    }

    async fn create_initiative(&self, args: InitiativeInput) -> Result<Value, EngineError> {
        const TOOL: &str = "create_initiative";
        let title = args.title.trim();
        if title.is_empty() {
            return Err(invalid(TOOL, "title must not be empty"));
        }
        let mut record = InitiativeRecord::new(title, args.description.trim());
        if let Some(status) = args.status {
            record.status = status
                .parse::<InitiativeStatus>()
                .map_err(|e| invalid(TOOL, &e))?;
        }

        self.ledgers.initiatives.append(&record).await?;
        self.ledgers
            .record_activity(ActivityRecord::new(
                ActivityKind::InitiativeCreated,
                format!("Initiative '{}' created", record.title),
            ))
            .await;
        to_value(&record)
    }

    /// Whether a tool changes state. Used for logging only.
    pub fn is_write(name: &str) -> bool {
        matches!(
            name,
            "create_component"
                | "promote_component"
                | "archive_component"
                | "log_change"
                | "write_artifact"
                | "create_initiative"
                | "submit_proposal"
                | "vote_proposal"
                | "stage_proposal"
                | "withdraw_proposal"
        )
    }
}

fn schema(name: &str, description: &str, input_schema: Value) -> ToolSchema {
    ToolSchema {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn decode<T: DeserializeOwned>(tool: &str, input: &Value) -> Result<T, EngineError> {
    // A model sometimes sends `null` for a tool without arguments
    let input = if input.is_null() { json!({}) } else { input.clone() };
    serde_json::from_value(input).map_err(|e| invalid(tool, &e.to_string()))
}

fn invalid(tool: &str, reason: &str) -> EngineError {
    EngineError::InvalidToolInput {
        tool: tool.to_string(),
        reason: reason.to_string(),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, EngineError> {
    serde_json::to_value(value)
        .map_err(|e| EngineError::Persistence(format!("Failed to encode tool result: {}", e)))
}

fn summary(component: &Component) -> Value {
    json!({
        "id": component.id,
        "name": component.name,
        "category": component.category,
        "maturity": component.maturity,
        "shielded": component.shielded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_guard::FileSystemGuard;
    use crate::ledger::DecisionKind;
    use std::collections::HashSet;
    use tempfile::TempDir;

    async fn registry(temp: &TempDir) -> (ToolRegistry, Ledgers) {
        let workspace = temp.path().join("ws");
        let data = temp.path().join("data");
        std::fs::create_dir_all(workspace.join("components")).unwrap();
        let ledgers = Ledgers::open(&data);
        let pipeline = Arc::new(PipelineStore::open(&data, ledgers.clone()).await.unwrap());
        let proposals = Arc::new(ProposalBook::new(
            vec!["ts".to_string(), "ag".to_string()],
            ledgers.decisions.clone(),
        ));
        let guard: Arc<dyn PathValidator> = Arc::new(
            FileSystemGuard::new(&workspace, &["components".to_string()], &[]).unwrap(),
        );
        (
            ToolRegistry::new(pipeline, ledgers.clone(), proposals, guard),
            ledgers,
        )
    }

    #[tokio::test]
    async fn test_schemas_match_tool_names() {
        let temp = TempDir::new().unwrap();
        let (tools, _) = registry(&temp).await;

        let schemas = tools.schemas();
        let names: HashSet<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, TOOL_NAMES.iter().copied().collect::<HashSet<_>>());
        for schema in &schemas {
            assert_eq!(schema.input_schema["type"], "object", "{}", schema.name);
            assert!(!schema.description.is_empty());
        }
    }

    #[tokio::test]
    async fn test_null_input_and_bad_arguments() {
        let temp = TempDir::new().unwrap();
        let (tools, _) = registry(&temp).await;

        let zones = tools.dispatch("get_pipeline", &Value::Null).await.unwrap();
        assert!(zones["nursery"].as_array().unwrap().is_empty());

        let missing = tools.dispatch("create_component", &json!({})).await;
        assert!(matches!(
            missing,
            Err(EngineError::InvalidToolInput { ref tool, .. }) if tool == "create_component"
        ));

        tools
            .dispatch("create_component", &json!({"name": "Toggle"}))
            .await
            .unwrap();
        let blank_reason = tools
            .dispatch("archive_component", &json!({"id": 1, "reason": " "}))
            .await;
        assert!(matches!(blank_reason, Err(EngineError::InvalidToolInput { .. })));

        let unknown = tools.dispatch("find_component", &json!({"query": "Ghost"})).await;
        assert!(matches!(unknown, Err(EngineError::ComponentNotFound(_))));
    }

    #[tokio::test]
    async fn test_log_change_and_trace() {
        let temp = TempDir::new().unwrap();
        let (tools, _) = registry(&temp).await;

        let root = tools
            .dispatch(
                "log_change",
                &json!({
                    "file": "components/button/style.css",
                    "change_type": "modified",
                    "description": "new focus ring",
                    "breakage_risk": "medium"
                }),
            )
            .await
            .unwrap();
        let root_id = root["id"].as_str().unwrap().to_string();
        assert_eq!(root["breakage_risk"], "medium");

        tools
            .dispatch(
                "log_change",
                &json!({
                    "file": "components/link/style.css",
                    "change_type": "modified",
                    "description": "match button focus ring",
                    "caused_by": root_id
                }),
            )
            .await
            .unwrap();

        let dangling = tools
            .dispatch(
                "log_change",
                &json!({
                    "file": "components/link/style.css",
                    "change_type": "modified",
                    "description": "x",
                    "caused_by": "chg-missing"
                }),
            )
            .await;
        assert!(matches!(dangling, Err(EngineError::InvalidToolInput { .. })));

        let illegal = tools
            .dispatch(
                "log_change",
                &json!({"file": "components/a.css", "change_type": "exploded", "description": "x"}),
            )
            .await;
        assert!(matches!(illegal, Err(EngineError::InvalidToolInput { .. })));

        let outside = tools
            .dispatch(
                "log_change",
                &json!({"file": "README.md", "change_type": "added", "description": "x"}),
            )
            .await;
        assert!(matches!(outside, Err(EngineError::PathDenied(_))));

        let trace = tools
            .dispatch("trace_changes", &json!({"file": "components/button/style.css"}))
            .await
            .unwrap();
        let chain = trace["chain"].as_array().unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1]["file"], "components/link/style.css");
    }

    #[tokio::test]
    async fn test_proposal_veto_is_recorded() {
        let temp = TempDir::new().unwrap();
        let (tools, ledgers) = registry(&temp).await;

        let proposal = tools
            .dispatch(
                "submit_proposal",
                &json!({
                    "kind": "promotion",
                    "proposer": "ts",
                    "target_zone": "canopy",
                    "summary": "Toggle is ready"
                }),
            )
            .await
            .unwrap();
        assert_eq!(proposal["status"], "pending");
        assert_eq!(proposal["approvals_needed"], 2);
        let id = proposal["id"].as_str().unwrap().to_string();

        let after_ts = tools
            .dispatch(
                "vote_proposal",
                &json!({"proposal_id": id, "agent": "ts", "approve": true}),
            )
            .await
            .unwrap();
        assert_eq!(after_ts["status"], "pending");

        let after_ag = tools
            .dispatch(
                "vote_proposal",
                &json!({"proposal_id": id, "agent": "ag", "approve": false}),
            )
            .await
            .unwrap();
        assert_eq!(after_ag["status"], "rejected");
        assert_eq!(after_ag["vetoed_by"], "ag");

        let decisions = ledgers.decisions.read_all().await.unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].kind, DecisionKind::Proposal);
        assert!(!decisions[0].outcome.passed);

        let listed = tools.dispatch("read_decisions", &json!({})).await.unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let bad_zone = tools
            .dispatch(
                "submit_proposal",
                &json!({"kind": "promotion", "proposer": "ts", "target_zone": "attic"}),
            )
            .await;
        assert!(matches!(bad_zone, Err(EngineError::InvalidToolInput { .. })));
    }

    #[tokio::test]
    async fn test_stage_and_withdraw_resolve_proposals() {
        let temp = TempDir::new().unwrap();
        let (tools, ledgers) = registry(&temp).await;

        let submit = |zone: &str| {
            json!({"kind": "amendment", "proposer": "pl", "target_zone": zone, "summary": "tokens"})
        };
        let auto = tools.dispatch("submit_proposal", &submit("nursery")).await.unwrap();
        assert_eq!(auto["status"], "auto-approved");
        let pending = tools.dispatch("submit_proposal", &submit("workshop")).await.unwrap();

        let early = tools
            .dispatch("stage_proposal", &json!({"proposal_id": pending["id"]}))
            .await;
        assert!(matches!(early, Err(EngineError::InvalidTransition(_))));

        let staged = tools
            .dispatch("stage_proposal", &json!({"proposal_id": auto["id"]}))
            .await
            .unwrap();
        assert_eq!(staged["status"], "staged");
        let withdrawn = tools
            .dispatch("withdraw_proposal", &json!({"proposal_id": pending["id"]}))
            .await
            .unwrap();
        assert_eq!(withdrawn["status"], "archived");

        let again = tools
            .dispatch("withdraw_proposal", &json!({"proposal_id": pending["id"]}))
            .await;
        assert!(matches!(again, Err(EngineError::ProposalNotFound(_))));

        let decisions = ledgers.decisions.read_all().await.unwrap();
        assert_eq!(
            decisions.iter().map(|d| d.outcome.passed).collect::<Vec<_>>(),
            vec![true, false]
        );
    }

    #[tokio::test]
    async fn test_create_initiative() {
        let temp = TempDir::new().unwrap();
        let (tools, ledgers) = registry(&temp).await;

        let bad = tools
            .dispatch("create_initiative", &json!({"title": "Dark mode", "status": "someday"}))
            .await;
        assert!(matches!(bad, Err(EngineError::InvalidToolInput { .. })));

        let created = tools
            .dispatch("create_initiative", &json!({"title": "Dark mode", "status": "active"}))
            .await
            .unwrap();
        assert_eq!(created["status"], "active");
        assert_eq!(ledgers.initiatives.read_all().await.unwrap().len(), 1);

        let activity = tools.dispatch("read_activity", &json!({"limit": 5})).await.unwrap();
        assert_eq!(activity.as_array().unwrap().len(), 1);
    }
}
