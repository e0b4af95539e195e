use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use hostline_core::config::AppConfig;
use hostline_core::extraction::RuleBasedExtractor;
use hostline_db::DbPool;

use crate::commitments::CommitmentService;
use crate::decisions::DecisionService;
use crate::extraction::{ExtractionPipeline, ModelExtractor};
use crate::llm::{HttpLlmClient, LlmClient};
use crate::locks::ConversationLocks;
use crate::operations::OperationsService;

/// The engine's services wired to one pool and one set of conversation locks.
#[derive(Clone)]
pub struct AgentRuntime {
    pub commitments: CommitmentService,
    pub operations: OperationsService,
    pub decisions: DecisionService,
}

impl AgentRuntime {
    pub fn new(pool: DbPool, config: &AppConfig, llm: Option<Arc<dyn LlmClient>>) -> Self {
        let locks = ConversationLocks::new();
        let pipeline = ExtractionPipeline::new(llm.map(ModelExtractor::new), &config.extraction);

        Self {
            commitments: CommitmentService::new(pool.clone(), Arc::new(pipeline), locks.clone()),
            operations: OperationsService::new(pool.clone(), config.operations.clone(), locks),
            decisions: DecisionService::new(
                pool,
                RuleBasedExtractor::from_config(&config.extraction),
                config.decision.clone(),
            ),
        }
    }

    /// Builds the HTTP model client when `llm.enabled` is set; otherwise extraction is
    /// rule-based only.
    pub fn from_config(pool: DbPool, config: &AppConfig) -> Result<Self> {
        let llm: Option<Arc<dyn LlmClient>> = if config.llm.enabled {
            Some(Arc::new(HttpLlmClient::from_config(&config.llm)?))
        } else {
            None
        };
        info!(
            event_name = "runtime.initialized",
            llm_enabled = llm.is_some(),
            llm_provider = config.llm.provider.as_str(),
            safety_guard = config.decision.safety_guard.is_some(),
            "agent runtime initialized"
        );
        Ok(Self::new(pool, config, llm))
    }
}

#[cfg(test)]
mod tests {
    use hostline_core::config::{AppConfig, LlmProvider};
    use hostline_db::connect;

    use super::AgentRuntime;

    #[tokio::test]
    async fn llm_misconfiguration_is_reported_at_startup() {
        let pool = connect("sqlite::memory:").await.expect("connect");
        let mut config = AppConfig::default();
        assert!(AgentRuntime::from_config(pool.clone(), &config).is_ok());

        config.llm.enabled = true;
        config.llm.provider = LlmProvider::Anthropic;
        config.llm.api_key = None;
        assert!(AgentRuntime::from_config(pool, &config).is_err());
    }
}
