//! Engine context
//!
//! Owns every long-lived piece of the engine: configuration, the secret
//! cache, the ledgers, the pipeline store, the proposal book, the review
//! orchestrator and the chat loop with its session sweeper.
//!
//! Lifecycle: [`EngineContext::init`] builds everything, [`invalidate`]
//! drops cached secrets, [`teardown`] stops background tasks.
//!
//! [`invalidate`]: EngineContext::invalidate
//! [`teardown`]: EngineContext::teardown

use crate::chat::{ChatLoop, SessionStore, ToolRegistry};
use crate::config::Config;
use crate::fs_guard::{FileSystemGuard, PathValidator};
use crate::governance::ProposalBook;
use crate::ledger::Ledgers;
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::CompletionService;
use crate::pipeline::PipelineStore;
use crate::review::{ReviewOrchestrator, StaticAnalyzer, StyleLinter};
use crate::secrets::{SecretCache, SecretManager};
use sdk::errors::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Keychain service under which API keys are stored.
pub const KEYCHAIN_SERVICE: &str = "arbor";

pub struct EngineContext {
    config: Config,
    secrets: Arc<SecretCache>,
    ledgers: Ledgers,
    pipeline: Arc<PipelineStore>,
    proposals: Arc<ProposalBook>,
    orchestrator: ReviewOrchestrator,
    chat: ChatLoop,
    sweeper: Option<JoinHandle<()>>,
}

impl EngineContext {
    /// Build a context backed by the configured completion provider.
    pub async fn init(config: Config) -> Result<Self, EngineError> {
        let secrets = Arc::new(SecretCache::new(Arc::new(SecretManager::new(
            KEYCHAIN_SERVICE,
        ))));
        let service: Arc<dyn CompletionService> = match config.llm.provider.as_str() {
            "anthropic" => Arc::new(AnthropicProvider::new(
                config.llm.anthropic.clone(),
                Arc::clone(&secrets),
            )),
            other => {
                return Err(EngineError::Config(format!(
                    "Unsupported completion provider '{}'",
                    other
                )))
            }
        };
        Self::with_service(config, service, secrets).await
    }

    /// Build a context around an explicit completion service.
    pub async fn with_service(
        config: Config,
        service: Arc<dyn CompletionService>,
        secrets: Arc<SecretCache>,
    ) -> Result<Self, EngineError> {
        let data_dir = config.core.data_dir.clone();
        let ledgers = Ledgers::open(&data_dir);
        let pipeline = Arc::new(PipelineStore::open(&data_dir, ledgers.clone()).await?);
        let proposals = Arc::new(ProposalBook::new(
            config.review.reviewers.clone(),
            ledgers.decisions.clone(),
        ));

        let guard: Arc<dyn PathValidator> = Arc::new(
            FileSystemGuard::new(
                &config.core.workspace,
                &config.security.writable_dirs,
                &config.security.deny_list,
            )?
            .protect(&data_dir),
        );
        let analyzer: Arc<dyn StaticAnalyzer> = Arc::new(StyleLinter);

        let orchestrator = ReviewOrchestrator::new(
            Arc::clone(&service),
            Arc::clone(&pipeline),
            ledgers.clone(),
            analyzer,
            Arc::clone(&guard),
            &config.review,
        )?;

        let tools = Arc::new(ToolRegistry::new(
            Arc::clone(&pipeline),
            ledgers.clone(),
            Arc::clone(&proposals),
            guard,
        ));
        let sessions = SessionStore::new(Duration::from_secs(config.chat.session_ttl_secs));
        let sweeper = sessions.spawn_sweeper(Duration::from_secs(config.chat.sweep_interval_secs));
        let chat = ChatLoop::new(
            Arc::clone(&service),
            tools,
            sessions,
            config.chat.max_turns,
            config.chat.preview_chars,
        );

        info!(
            "Engine ready: provider {}, workspace {:?}, data {:?}",
            service.name(),
            config.core.workspace,
            data_dir
        );

        Ok(Self {
            config,
            secrets,
            ledgers,
            pipeline,
            proposals,
            orchestrator,
            chat,
            sweeper: Some(sweeper),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledgers(&self) -> &Ledgers {
        &self.ledgers
    }

    pub fn pipeline(&self) -> &Arc<PipelineStore> {
        &self.pipeline
    }

    pub fn proposals(&self) -> &Arc<ProposalBook> {
        &self.proposals
    }

    pub fn orchestrator(&self) -> &ReviewOrchestrator {
        &self.orchestrator
    }

    pub fn chat(&self) -> &ChatLoop {
        &self.chat
    }

    /// Drop cached secrets so the next call re-reads them.
    pub fn invalidate(&self) {
        debug!("Invalidating cached secrets");
        self.secrets.invalidate();
    }

    /// Stop background tasks. Safe to call more than once.
    pub async fn teardown(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
            // Aborted tasks resolve with a cancellation error
            let _ = sweeper.await;
            debug!("Session sweeper stopped");
        }
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}
