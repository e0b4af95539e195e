use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::commitment::CommitmentId;
use crate::domain::conversation::ConversationId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RiskSignalId(pub String);

impl RiskSignalId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSignalType {
    CommitmentConflict,
    InvariantViolation,
}

impl RiskSignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommitmentConflict => "commitment_conflict",
            Self::InvariantViolation => "invariant_violation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "commitment_conflict" => Some(Self::CommitmentConflict),
            "invariant_violation" => Some(Self::InvariantViolation),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskSignal {
    pub id: RiskSignalId,
    pub conversation_id: ConversationId,
    pub signal_type: RiskSignalType,
    pub severity: RiskSeverity,
    pub message: String,
    pub related_commitment_id: Option<CommitmentId>,
    pub details: Value,
    pub resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RiskSignal {
    pub fn resolve(&mut self, actor: &str, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.resolved {
            return Err(DomainError::InvariantViolation(format!(
                "risk signal {} is already resolved",
                self.id.0
            )));
        }
        if actor.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "risk signal resolution requires an actor".to_string(),
            ));
        }
        self.resolved = true;
        self.resolved_by = Some(actor.to_string());
        self.resolved_at = Some(at);
        Ok(())
    }
}
