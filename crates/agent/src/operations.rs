use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use hostline_core::config::OperationsConfig;
use hostline_core::domain::conversation::ConversationId;
use hostline_core::domain::operational::{
    OcAction, OperationalCommitment, OperationalCommitmentId, StaffAction, StaffNotificationItem,
};
use hostline_core::errors::{ApplicationError, DomainError};
use hostline_core::operations::{
    build_notifications, plan_guest_resolution, plan_host_resolution, PlannedResolution,
};
use hostline_db::repositories::SqlOperationalRepository;
use hostline_db::{DbPool, RepositoryError, UnitOfWork};

use crate::locks::ConversationLocks;
use crate::retry::retry_on_conflict;

#[derive(Clone)]
pub struct OperationsService {
    pool: DbPool,
    phrases: OperationsConfig,
    locks: ConversationLocks,
}

impl OperationsService {
    pub fn new(pool: DbPool, phrases: OperationsConfig, locks: ConversationLocks) -> Self {
        Self { pool, phrases, locks }
    }

    /// Guest reply: cancellation resolves matching OCs, a vague acknowledgment suggests resolving
    /// the single open one.
    pub async fn process_guest_message(
        &self,
        text: &str,
        conversation_id: &ConversationId,
    ) -> Result<Vec<(OperationalCommitment, OcAction)>, ApplicationError> {
        let _guard = self.locks.acquire(conversation_id).await;
        retry_on_conflict("process_guest_message", || {
            self.apply_reply(text, conversation_id, Reply::Guest)
        })
        .await
    }

    /// Host follow-up: a confirmation only ever suggests resolving.
    pub async fn process_host_followup(
        &self,
        text: &str,
        conversation_id: &ConversationId,
    ) -> Result<Vec<(OperationalCommitment, OcAction)>, ApplicationError> {
        let _guard = self.locks.acquire(conversation_id).await;
        retry_on_conflict("process_host_followup", || {
            self.apply_reply(text, conversation_id, Reply::Host)
        })
        .await
    }

    async fn apply_reply(
        &self,
        text: &str,
        conversation_id: &ConversationId,
        reply: Reply,
    ) -> Result<Vec<(OperationalCommitment, OcAction)>, ApplicationError> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let mut active =
            SqlOperationalRepository::get_active_by_conversation(uow.conn(), conversation_id).await?;
        let plans = match reply {
            Reply::Guest => plan_guest_resolution(text, &active, &self.phrases),
            Reply::Host => plan_host_resolution(text, &active, &self.phrases),
        };

        let now = Utc::now();
        let mut applied = Vec::with_capacity(plans.len());
        for plan in plans {
            let Some(position) = active.iter().position(|oc| oc.id == plan.oc_id) else {
                continue;
            };
            let mut oc = active.remove(position);
            apply_resolution(&mut oc, &plan, text, now)?;
            SqlOperationalRepository::save_state(uow.conn(), &oc).await?;
            info!(
                event_name = "operations.oc.reply_transition",
                conversation_id = %conversation_id,
                oc_id = %oc.id.0,
                topic = oc.topic.as_str(),
                action = plan.action.as_str(),
                source = reply.as_str(),
                "operational commitment transitioned from reply"
            );
            applied.push((oc, plan.action));
        }
        uow.commit().await?;
        Ok(applied)
    }

    pub async fn staff_action(
        &self,
        oc_id: &OperationalCommitmentId,
        action: StaffAction,
        actor: &str,
    ) -> Result<OperationalCommitment, ApplicationError> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let mut oc = SqlOperationalRepository::find_by_id(uow.conn(), oc_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("operational commitment {}", oc_id.0)))?;
        oc.apply(action, actor, Utc::now())?;
        SqlOperationalRepository::save_state(uow.conn(), &oc).await?;
        uow.commit().await?;

        info!(
            event_name = "operations.oc.staff_action",
            conversation_id = %oc.conversation_id,
            oc_id = %oc.id.0,
            action = action.as_str(),
            actor,
            status = oc.status.as_str(),
            "staff action applied"
        );
        Ok(oc)
    }

    pub async fn mark_done(
        &self,
        oc_id: &OperationalCommitmentId,
        actor: &str,
    ) -> Result<OperationalCommitment, ApplicationError> {
        self.staff_action(oc_id, StaffAction::MarkDone, actor).await
    }

    pub async fn confirm_suggested_resolve(
        &self,
        oc_id: &OperationalCommitmentId,
        actor: &str,
    ) -> Result<OperationalCommitment, ApplicationError> {
        self.staff_action(oc_id, StaffAction::ConfirmSuggestedResolve, actor).await
    }

    pub async fn reject_resolve(
        &self,
        oc_id: &OperationalCommitmentId,
        actor: &str,
    ) -> Result<OperationalCommitment, ApplicationError> {
        self.staff_action(oc_id, StaffAction::RejectResolve, actor).await
    }

    pub async fn confirm_candidate(
        &self,
        oc_id: &OperationalCommitmentId,
        actor: &str,
    ) -> Result<OperationalCommitment, ApplicationError> {
        self.staff_action(oc_id, StaffAction::ConfirmCandidate, actor).await
    }

    pub async fn reject_candidate(
        &self,
        oc_id: &OperationalCommitmentId,
        actor: &str,
    ) -> Result<OperationalCommitment, ApplicationError> {
        self.staff_action(oc_id, StaffAction::RejectCandidate, actor).await
    }

    pub async fn get_staff_notifications(
        &self,
        today: NaiveDate,
        property_code: Option<&str>,
    ) -> Result<Vec<StaffNotificationItem>, ApplicationError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        let active = SqlOperationalRepository::list_active(&mut conn, property_code).await?;
        Ok(build_notifications(&active, today))
    }

    pub async fn list_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<OperationalCommitment>, ApplicationError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(SqlOperationalRepository::list_by_conversation(&mut conn, conversation_id).await?)
    }
}

#[derive(Clone, Copy, Debug)]
enum Reply {
    Guest,
    Host,
}

impl Reply {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Host => "host",
        }
    }
}

fn apply_resolution(
    oc: &mut OperationalCommitment,
    plan: &PlannedResolution,
    evidence: &str,
    at: DateTime<Utc>,
) -> Result<(), DomainError> {
    match plan.action {
        OcAction::AutoResolved => oc.resolve_cancelled(evidence, at),
        OcAction::SuggestedResolve => oc.suggest_resolve(plan.reason, evidence, at),
        other => Err(DomainError::InvalidOcTransition {
            from: oc.status,
            action: other.as_str().to_string(),
        }),
    }
}
