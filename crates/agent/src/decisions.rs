use chrono::Utc;
use tracing::{error, info, warn};

use hostline_core::config::DecisionConfig;
use hostline_core::decision::{evaluate, evaluation_failed, EvaluationContext};
use hostline_core::domain::decision::{
    AutomationPatternStats, DecisionLog, DecisionLogId, DecisionResult, DraftId, EvidencePackage,
    HumanAction,
};
use hostline_core::errors::ApplicationError;
use hostline_core::extraction::RuleBasedExtractor;
use hostline_db::repositories::{
    SqlAutomationStatsRepository, SqlCommitmentRepository, SqlDecisionLogRepository,
    SqlPolicyRuleRepository,
};
use hostline_db::{DbPool, RepositoryError, UnitOfWork};

use crate::retry::retry_on_conflict;

#[derive(Clone)]
pub struct DecisionService {
    pool: DbPool,
    rules: RuleBasedExtractor,
    config: DecisionConfig,
}

impl DecisionService {
    pub fn new(pool: DbPool, rules: RuleBasedExtractor, config: DecisionConfig) -> Self {
        Self { pool, rules, config }
    }

    /// Never fails: anything that goes wrong yields REQUIRE_REVIEW with `EVALUATION_FAILED`.
    pub async fn evaluate_draft(&self, package: &EvidencePackage) -> DecisionResult {
        match retry_on_conflict("evaluate_draft", || self.evaluate_once(package)).await {
            Ok(result) => result,
            Err(failure) => {
                error!(
                    event_name = "decisions.evaluation.failed",
                    draft_id = %package.draft_id.0,
                    conversation_id = %package.conversation_id,
                    error = %failure,
                    "draft evaluation failed, routing to review"
                );
                evaluation_failed(&failure.to_string())
            }
        }
    }

    async fn evaluate_once(&self, package: &EvidencePackage) -> Result<DecisionResult, ApplicationError> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;

        if let Some(open) = SqlDecisionLogRepository::find_open_by_draft(uow.conn(), &package.draft_id).await? {
            info!(
                event_name = "decisions.evaluation.reused",
                draft_id = %package.draft_id.0,
                decision_log_id = %open.id.0,
                "open decision log exists for draft"
            );
            return Ok(open.to_result());
        }

        let policy_rules = SqlPolicyRuleRepository::list_enabled(uow.conn()).await?;
        let pattern_stats = match package.answer_key.as_deref() {
            Some(answer_key) => {
                SqlAutomationStatsRepository::find(uow.conn(), &package.property_code, answer_key).await?
            }
            None => None,
        };
        let draft_commitments = self.rules.extract_commitments(&package.draft_content);

        // stored commitments of the conversation take part even when the caller sent none
        let stored = SqlCommitmentRepository::get_active(uow.conn(), &package.conversation_id).await?;
        let mut package = package.clone();
        for commitment in stored {
            if !package.active_commitments.iter().any(|known| known.id == commitment.id) {
                package.active_commitments.push(commitment);
            }
        }
        let package = &package;

        let evaluation = evaluate(
            package,
            &EvaluationContext {
                policy_rules: &policy_rules,
                draft_commitments: &draft_commitments,
                pattern_stats: pattern_stats.as_ref(),
                safety_guard: self.config.safety_guard.as_ref(),
            },
        );

        let mut result = evaluation.result;
        let log = DecisionLog {
            id: DecisionLogId::generate(),
            draft_id: package.draft_id.clone(),
            conversation_id: package.conversation_id.clone(),
            property_code: package.property_code.clone(),
            decision: result.decision,
            reason_codes: result.reason_codes.clone(),
            confidence: result.confidence,
            decision_details: evaluation.details,
            matched_pattern: result.matched_pattern.clone(),
            human_action: HumanAction::Pending,
            actor: None,
            edited_content: None,
            comment: None,
            acted_at: None,
            was_sent: false,
            final_content: None,
            sent_at: None,
            created_at: Utc::now(),
        };
        SqlDecisionLogRepository::insert(uow.conn(), &log).await?;
        uow.commit().await?;

        if !evaluation.guard.passed && evaluation.eligible {
            warn!(
                event_name = "decisions.safety_guard.failed",
                draft_id = %package.draft_id.0,
                failures = ?evaluation.guard.failures,
                "eligible draft held back by the safety guard"
            );
        }
        info!(
            event_name = "decisions.evaluation.completed",
            draft_id = %package.draft_id.0,
            conversation_id = %package.conversation_id,
            decision_log_id = %log.id.0,
            decision = result.decision.as_str(),
            confidence = result.confidence,
            reason_codes = ?result.reason_codes,
            "draft evaluated"
        );

        result.decision_log_id = Some(log.id);
        Ok(result)
    }

    /// Stores the verdict and folds it into the matched pattern's statistics in one transaction.
    pub async fn record_human_action(
        &self,
        log_id: &DecisionLogId,
        action: HumanAction,
        actor: &str,
        edited_content: Option<String>,
        comment: Option<String>,
    ) -> Result<DecisionLog, ApplicationError> {
        let now = Utc::now();
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let mut log = SqlDecisionLogRepository::find_by_id(uow.conn(), log_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("decision log {}", log_id.0)))?;
        log.record_human_action(action, actor, edited_content, comment, now)?;
        SqlDecisionLogRepository::save_human_action(uow.conn(), &log).await?;

        if let Some(answer_key) = log.matched_pattern.as_deref() {
            let mut stats =
                SqlAutomationStatsRepository::find(uow.conn(), &log.property_code, answer_key)
                    .await?
                    .unwrap_or_else(|| AutomationPatternStats::new(&log.property_code, answer_key, now));
            if stats.record(action, &self.config.eligibility, now) {
                SqlAutomationStatsRepository::save(uow.conn(), &stats).await?;
                info!(
                    event_name = "decisions.pattern_stats.updated",
                    property_code = %stats.property_code,
                    answer_key = %stats.answer_key,
                    sample_count = stats.sample_count,
                    approval_rate = stats.approval_rate,
                    eligible = stats.eligible,
                    "automation pattern statistics updated"
                );
            }
        }
        uow.commit().await?;

        info!(
            event_name = "decisions.human_action.recorded",
            decision_log_id = %log.id.0,
            draft_id = %log.draft_id.0,
            action = action.as_str(),
            actor,
            "human action recorded"
        );
        Ok(log)
    }

    pub async fn record_sent(
        &self,
        log_id: &DecisionLogId,
        final_content: &str,
    ) -> Result<DecisionLog, ApplicationError> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let mut log = SqlDecisionLogRepository::find_by_id(uow.conn(), log_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("decision log {}", log_id.0)))?;
        log.mark_sent(final_content.to_string(), Utc::now())?;
        SqlDecisionLogRepository::save_sent(uow.conn(), &log).await?;
        uow.commit().await?;

        info!(
            event_name = "decisions.sent.recorded",
            decision_log_id = %log.id.0,
            draft_id = %log.draft_id.0,
            decision = log.decision.as_str(),
            "reply marked as sent"
        );
        Ok(log)
    }

    pub async fn history(&self, draft_id: &DraftId) -> Result<Vec<DecisionLog>, ApplicationError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(SqlDecisionLogRepository::list_by_draft(&mut conn, draft_id).await?)
    }
}
