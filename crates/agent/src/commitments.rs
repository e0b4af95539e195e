//! Sent-message processing: commitment persistence with conflict arbitration and OC derivation,
//! all inside one unit of work per message.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use hostline_core::conflict::{self, CommitmentConflict};
use hostline_core::domain::commitment::{Commitment, CommitmentCandidate, CommitmentId};
use hostline_core::domain::conversation::ConversationId;
use hostline_core::domain::operational::{
    GuestStay, OcStatus, OperationalCommitment, OperationalCommitmentId,
};
use hostline_core::domain::risk::{RiskSeverity, RiskSignal, RiskSignalId, RiskSignalType};
use hostline_core::errors::ApplicationError;
use hostline_core::extraction::{ExtractedCandidates, ExtractionRequest, ExtractionSource};
use hostline_core::operations::{plan_ocs, PlannedOc};
use hostline_db::repositories::commitment::CommitmentOrigin;
use hostline_db::repositories::{
    SqlCommitmentRepository, SqlOperationalRepository, SqlRiskSignalRepository,
};
use hostline_db::{DbPool, UnitOfWork};

use crate::extraction::ExtractionPipeline;
use crate::locks::ConversationLocks;
use crate::retry::retry_on_conflict;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub sent_text: String,
    pub conversation_id: ConversationId,
    pub airbnb_thread_id: String,
    pub property_code: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub conversation_context: Option<String>,
    #[serde(default)]
    pub guest_checkin_date: Option<NaiveDate>,
    #[serde(default)]
    pub guest_checkout_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SentMessageOutcome {
    pub extraction_source: ExtractionSource,
    pub commitments: Vec<Commitment>,
    pub superseded: Vec<CommitmentId>,
    pub risk_signals: Vec<RiskSignal>,
    pub operational_commitments: Vec<OperationalCommitment>,
}

impl SentMessageOutcome {
    fn empty(extraction_source: ExtractionSource) -> Self {
        Self {
            extraction_source,
            commitments: Vec::new(),
            superseded: Vec::new(),
            risk_signals: Vec::new(),
            operational_commitments: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct CommitmentService {
    pool: DbPool,
    extraction: Arc<ExtractionPipeline>,
    locks: ConversationLocks,
}

impl CommitmentService {
    pub fn new(pool: DbPool, extraction: Arc<ExtractionPipeline>, locks: ConversationLocks) -> Self {
        Self { pool, extraction, locks }
    }

    pub async fn process_sent_message(
        &self,
        message: &SentMessage,
    ) -> Result<SentMessageOutcome, ApplicationError> {
        if message.sent_text.trim().is_empty() {
            debug!(
                event_name = "commitments.sent_message.empty",
                conversation_id = %message.conversation_id,
                "sent message has no text"
            );
            return Ok(SentMessageOutcome::empty(ExtractionSource::RuleBased));
        }

        let now = Utc::now();
        let request = ExtractionRequest {
            text: message.sent_text.clone(),
            conversation_context: message.conversation_context.clone(),
            guest_checkin_date: message.guest_checkin_date,
            today: now.date_naive(),
        };
        // the model call stays outside the transaction
        let candidates = self.extraction.extract(&request).await;

        let _guard = self.locks.acquire(&message.conversation_id).await;
        let outcome = retry_on_conflict("process_sent_message", || {
            self.persist_sent(message, &candidates, now)
        })
        .await?;

        info!(
            event_name = "commitments.sent_message.processed",
            conversation_id = %message.conversation_id,
            source = outcome.extraction_source.as_str(),
            commitments = outcome.commitments.len(),
            superseded = outcome.superseded.len(),
            risk_signals = outcome.risk_signals.len(),
            operational = outcome.operational_commitments.len(),
            "sent message processed"
        );
        Ok(outcome)
    }

    async fn persist_sent(
        &self,
        message: &SentMessage,
        candidates: &ExtractedCandidates,
        at: DateTime<Utc>,
    ) -> Result<SentMessageOutcome, ApplicationError> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let mut outcome = SentMessageOutcome::empty(candidates.source);
        let conversation_id = &message.conversation_id;

        let mut active = SqlCommitmentRepository::get_active(uow.conn(), conversation_id).await?;
        repair_duplicate_actives(&mut uow, &mut active, &mut outcome, at).await?;

        let origin = CommitmentOrigin {
            conversation_id,
            airbnb_thread_id: &message.airbnb_thread_id,
            property_code: &message.property_code,
            provenance_message_id: message.message_id.as_deref(),
        };

        let mut fresh: Vec<CommitmentCandidate> = Vec::new();
        let mut fresh_ids: Vec<CommitmentId> = Vec::new();
        for candidate in &candidates.commitments {
            if conflict::restates_existing(candidate, &active) {
                debug!(
                    event_name = "commitments.candidate.restated",
                    conversation_id = %conversation_id,
                    topic = candidate.topic().as_str(),
                    "candidate restates an active commitment"
                );
                continue;
            }

            let found = conflict::detect(candidate, &active).into_conflict();
            let new_id = CommitmentId::generate();
            let topic = candidate.topic();

            if let Some(position) = active.iter().position(|existing| existing.topic() == topic) {
                let previous = active.remove(position);
                SqlCommitmentRepository::supersede(uow.conn(), &previous.id, &new_id, at).await?;
                outcome.superseded.push(previous.id);
            }

            let created =
                SqlCommitmentRepository::create(uow.conn(), new_id, candidate, &origin, at).await?;

            if let Some(found) = found {
                let signal = conflict_signal(conversation_id, &created, &found, at);
                SqlRiskSignalRepository::insert(uow.conn(), &signal).await?;
                warn!(
                    event_name = "commitments.conflict.detected",
                    conversation_id = %conversation_id,
                    conflict_type = found.conflict_type.as_str(),
                    severity = found.severity.as_str(),
                    existing_commitment_id = %found.existing_commitment_id.0,
                    new_commitment_id = %created.id.0,
                    "new commitment conflicts with an active one"
                );
                outcome.risk_signals.push(signal);
            }

            fresh_ids.push(created.id.clone());
            fresh.push(candidate.clone());
            active.push(created.clone());
            outcome.commitments.push(created);
        }

        let stay = GuestStay::new(message.guest_checkin_date, message.guest_checkout_date);
        for planned in plan_ocs(&fresh, &candidates.operational, at.date_naive(), &stay) {
            let commitment_id =
                planned.commitment_index.and_then(|index| fresh_ids.get(index).cloned());
            let oc = create_oc(&mut uow, message, planned, commitment_id, stay, at).await?;
            outcome.operational_commitments.push(oc);
        }

        uow.commit().await?;
        Ok(outcome)
    }

    /// Conversation-closed sweep.
    pub async fn expire_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<u64, ApplicationError> {
        let _guard = self.locks.acquire(conversation_id).await;
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let expired =
            SqlCommitmentRepository::expire_by_conversation(uow.conn(), conversation_id, Utc::now())
                .await?;
        uow.commit().await?;

        info!(
            event_name = "commitments.conversation.expired",
            conversation_id = %conversation_id,
            expired,
            "active commitments expired"
        );
        Ok(expired)
    }

    pub async fn resolve_risk_signal(
        &self,
        id: &RiskSignalId,
        actor: &str,
    ) -> Result<RiskSignal, ApplicationError> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let mut signal = SqlRiskSignalRepository::find_by_id(uow.conn(), id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("risk signal {}", id.0)))?;
        signal.resolve(actor, Utc::now())?;
        SqlRiskSignalRepository::save_resolution(uow.conn(), &signal).await?;
        uow.commit().await?;

        info!(
            event_name = "commitments.risk_signal.resolved",
            risk_signal_id = %id.0,
            conversation_id = %signal.conversation_id,
            actor,
            "risk signal acknowledged"
        );
        Ok(signal)
    }

    pub async fn active_commitments(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Commitment>, ApplicationError> {
        let mut conn = self.pool.acquire().await.map_err(hostline_db::RepositoryError::from)?;
        Ok(SqlCommitmentRepository::get_active(&mut conn, conversation_id).await?)
    }

    pub async fn list_commitments(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Commitment>, ApplicationError> {
        let mut conn = self.pool.acquire().await.map_err(hostline_db::RepositoryError::from)?;
        Ok(SqlCommitmentRepository::list_by_conversation(&mut conn, conversation_id).await?)
    }

    pub async fn unresolved_risk_signals(
        &self,
        conversation_id: Option<&ConversationId>,
    ) -> Result<Vec<RiskSignal>, ApplicationError> {
        let mut conn = self.pool.acquire().await.map_err(hostline_db::RepositoryError::from)?;
        let signals = match conversation_id {
            Some(conversation_id) => {
                SqlRiskSignalRepository::list_by_conversation(&mut conn, conversation_id)
                    .await?
                    .into_iter()
                    .filter(|signal| !signal.resolved)
                    .collect()
            }
            None => SqlRiskSignalRepository::list_unresolved(&mut conn).await?,
        };
        Ok(signals)
    }
}

/// Two active rows for one topic should be impossible; if it happens the older rows are
/// superseded by the newest and a low-severity signal records the repair.
async fn repair_duplicate_actives(
    uow: &mut UnitOfWork,
    active: &mut Vec<Commitment>,
    outcome: &mut SentMessageOutcome,
    at: DateTime<Utc>,
) -> Result<(), ApplicationError> {
    for (older, newest) in conflict::duplicate_active_repairs(active) {
        let Some(position) = active.iter().position(|commitment| commitment.id == older) else {
            continue;
        };
        let stale = active.remove(position);
        SqlCommitmentRepository::supersede(uow.conn(), &older, &newest, at).await?;

        let signal = RiskSignal {
            id: RiskSignalId::generate(),
            conversation_id: stale.conversation_id.clone(),
            signal_type: RiskSignalType::InvariantViolation,
            severity: RiskSeverity::Low,
            message: format!(
                "duplicate active commitments for topic {}; superseded the older one",
                stale.topic().as_str()
            ),
            related_commitment_id: Some(older.clone()),
            details: json!({
                "topic": stale.topic(),
                "superseded_commitment_id": older,
                "kept_commitment_id": newest,
            }),
            resolved: false,
            resolved_by: None,
            resolved_at: None,
            created_at: at,
        };
        SqlRiskSignalRepository::insert(uow.conn(), &signal).await?;
        warn!(
            event_name = "commitments.invariant.repaired",
            conversation_id = %stale.conversation_id,
            topic = stale.topic().as_str(),
            superseded = %older.0,
            kept = %newest.0,
            "repaired duplicate active commitments"
        );
        outcome.superseded.push(older);
        outcome.risk_signals.push(signal);
    }
    Ok(())
}

fn conflict_signal(
    conversation_id: &ConversationId,
    created: &Commitment,
    found: &CommitmentConflict,
    at: DateTime<Utc>,
) -> RiskSignal {
    RiskSignal {
        id: RiskSignalId::generate(),
        conversation_id: conversation_id.clone(),
        signal_type: RiskSignalType::CommitmentConflict,
        severity: found.severity,
        message: found.message.clone(),
        related_commitment_id: Some(created.id.clone()),
        details: json!({
            "conflict_type": found.conflict_type,
            "existing_commitment_id": found.existing_commitment_id,
            "existing_topic": found.existing_topic,
            "new_commitment_id": created.id,
            "topic": found.topic,
        }),
        resolved: false,
        resolved_by: None,
        resolved_at: None,
        created_at: at,
    }
}

/// Supersedes the prior active OC of the same topic, then inserts the new one.
async fn create_oc(
    uow: &mut UnitOfWork,
    message: &SentMessage,
    planned: PlannedOc,
    commitment_id: Option<CommitmentId>,
    stay: GuestStay,
    at: DateTime<Utc>,
) -> Result<OperationalCommitment, ApplicationError> {
    if let Some(mut prior) = SqlOperationalRepository::get_active_by_topic(
        uow.conn(),
        &message.conversation_id,
        planned.topic,
    )
    .await?
    {
        prior.supersede(at)?;
        SqlOperationalRepository::save_state(uow.conn(), &prior).await?;
        info!(
            event_name = "operations.oc.superseded",
            conversation_id = %message.conversation_id,
            oc_id = %prior.id.0,
            topic = prior.topic.as_str(),
            "prior operational commitment superseded"
        );
    }

    let oc = OperationalCommitment {
        id: OperationalCommitmentId::generate(),
        commitment_id,
        conversation_id: message.conversation_id.clone(),
        property_code: message.property_code.clone(),
        topic: planned.topic,
        description: planned.description,
        is_candidate_only: planned.is_candidate_only,
        target: planned.target,
        stay,
        status: OcStatus::Pending,
        resolution_reason: None,
        resolved_by: None,
        evidence_quote: Some(planned.evidence_quote),
        created_at: at,
        updated_at: at,
    };
    SqlOperationalRepository::insert(uow.conn(), &oc).await?;
    info!(
        event_name = "operations.oc.created",
        conversation_id = %oc.conversation_id,
        oc_id = %oc.id.0,
        topic = oc.topic.as_str(),
        candidate_only = oc.is_candidate_only,
        "operational commitment created"
    );
    Ok(oc)
}
