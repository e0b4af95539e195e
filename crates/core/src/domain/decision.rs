use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::conflict::CommitmentConflict;
use crate::config::EligibilityPolicy;
use crate::domain::commitment::{Commitment, CommitmentTopic};
use crate::domain::conversation::ConversationId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionLogId(pub String);

impl DecisionLogId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    AutoSend,
    SuggestSend,
    RequireReview,
    RequireEdit,
    Block,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoSend => "AUTO_SEND",
            Self::SuggestSend => "SUGGEST_SEND",
            Self::RequireReview => "REQUIRE_REVIEW",
            Self::RequireEdit => "REQUIRE_EDIT",
            Self::Block => "BLOCK",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AUTO_SEND" => Some(Self::AutoSend),
            "SUGGEST_SEND" => Some(Self::SuggestSend),
            "REQUIRE_REVIEW" => Some(Self::RequireReview),
            "REQUIRE_EDIT" => Some(Self::RequireEdit),
            "BLOCK" => Some(Self::Block),
            _ => None,
        }
    }

    /// BLOCK and AUTO_SEND need no human step before send eligibility is known.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AutoSend | Self::Block)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    HighRiskKeywords,
    SafetyConcern,
    PolicyViolation,
    PersonalInfo,
    FinancialMention,
    SensitiveTopic,
    LowConfidence,
    MissingInformation,
    NewCommitment,
    CommitmentConflict,
    ComplaintDetected,
    NeedsFollowUp,
    GroundedAnswer,
    SafeContent,
    SimpleInquiry,
    ClosingMessage,
    EvaluationFailed,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 17] = [
        Self::HighRiskKeywords,
        Self::SafetyConcern,
        Self::PolicyViolation,
        Self::PersonalInfo,
        Self::FinancialMention,
        Self::SensitiveTopic,
        Self::LowConfidence,
        Self::MissingInformation,
        Self::NewCommitment,
        Self::CommitmentConflict,
        Self::ComplaintDetected,
        Self::NeedsFollowUp,
        Self::GroundedAnswer,
        Self::SafeContent,
        Self::SimpleInquiry,
        Self::ClosingMessage,
        Self::EvaluationFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighRiskKeywords => "HIGH_RISK_KEYWORDS",
            Self::SafetyConcern => "SAFETY_CONCERN",
            Self::PolicyViolation => "POLICY_VIOLATION",
            Self::PersonalInfo => "PERSONAL_INFO",
            Self::FinancialMention => "FINANCIAL_MENTION",
            Self::SensitiveTopic => "SENSITIVE_TOPIC",
            Self::LowConfidence => "LOW_CONFIDENCE",
            Self::MissingInformation => "MISSING_INFORMATION",
            Self::NewCommitment => "NEW_COMMITMENT",
            Self::CommitmentConflict => "COMMITMENT_CONFLICT",
            Self::ComplaintDetected => "COMPLAINT_DETECTED",
            Self::NeedsFollowUp => "NEEDS_FOLLOW_UP",
            Self::GroundedAnswer => "GROUNDED_ANSWER",
            Self::SafeContent => "SAFE_CONTENT",
            Self::SimpleInquiry => "SIMPLE_INQUIRY",
            Self::ClosingMessage => "CLOSING_MESSAGE",
            Self::EvaluationFailed => "EVALUATION_FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|code| code.as_str() == normalized)
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::HighRiskKeywords | Self::SafetyConcern | Self::PolicyViolation)
    }

    pub fn requires_edit(&self) -> bool {
        matches!(self, Self::PersonalInfo | Self::FinancialMention)
    }

    pub fn requires_review(&self) -> bool {
        matches!(
            self,
            Self::SensitiveTopic
                | Self::LowConfidence
                | Self::MissingInformation
                | Self::NewCommitment
                | Self::CommitmentConflict
                | Self::ComplaintDetected
                | Self::EvaluationFailed
        )
    }

    pub fn confidence_delta(&self) -> f64 {
        match self {
            Self::GroundedAnswer | Self::SafeContent | Self::SimpleInquiry | Self::ClosingMessage => {
                0.05
            }
            Self::MissingInformation
            | Self::SensitiveTopic
            | Self::NewCommitment
            | Self::FinancialMention => -0.10,
            _ => 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLabel {
    Ok,
    UnderReview,
    Low,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLabel {
    Safe,
    Sensitive,
    HighRisk,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Answer,
    NeedsFollowUp,
    Closing,
    Clarification,
}

impl QualityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::UnderReview => "under_review",
            Self::Low => "low",
        }
    }
}

impl SafetyLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Sensitive => "sensitive",
            Self::HighRisk => "high_risk",
        }
    }
}

/// Upstream classification of the draft produced alongside generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeLabel {
    pub quality: QualityLabel,
    pub safety: SafetyLabel,
    pub response_kind: ResponseKind,
    #[serde(default)]
    pub grounded: bool,
    #[serde(default)]
    pub missing_information: bool,
    #[serde(default)]
    pub policy_violation: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidencePackage {
    pub draft_id: DraftId,
    pub conversation_id: ConversationId,
    pub property_code: String,
    pub draft_content: String,
    pub guest_message: String,
    #[serde(default)]
    pub outcome_label: Option<OutcomeLabel>,
    /// FAQ answer key the draft was generated from, if any.
    #[serde(default)]
    pub answer_key: Option<String>,
    #[serde(default)]
    pub active_commitments: Vec<Commitment>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub decision: Decision,
    pub reason_codes: Vec<ReasonCode>,
    pub confidence: f64,
    pub warnings: Vec<String>,
    pub commitment_conflicts: Vec<CommitmentConflict>,
    pub matched_pattern: Option<String>,
    pub decision_log_id: Option<DecisionLogId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanAction {
    Pending,
    ApprovedAsIs,
    ApprovedWithEdit,
    Rejected,
    Escalated,
}

impl HumanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ApprovedAsIs => "approved_as_is",
            Self::ApprovedWithEdit => "approved_with_edit",
            Self::Rejected => "rejected",
            Self::Escalated => "escalated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pending" => Some(Self::Pending),
            "approved_as_is" => Some(Self::ApprovedAsIs),
            "approved_with_edit" => Some(Self::ApprovedWithEdit),
            "rejected" => Some(Self::Rejected),
            "escalated" => Some(Self::Escalated),
            _ => None,
        }
    }

    pub fn is_approval(&self) -> bool {
        matches!(self, Self::ApprovedAsIs | Self::ApprovedWithEdit)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionLog {
    pub id: DecisionLogId,
    pub draft_id: DraftId,
    pub conversation_id: ConversationId,
    pub property_code: String,
    pub decision: Decision,
    pub reason_codes: Vec<ReasonCode>,
    pub confidence: f64,
    pub decision_details: Value,
    pub matched_pattern: Option<String>,
    pub human_action: HumanAction,
    pub actor: Option<String>,
    pub edited_content: Option<String>,
    pub comment: Option<String>,
    pub acted_at: Option<DateTime<Utc>>,
    pub was_sent: bool,
    pub final_content: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DecisionLog {
    /// Not sent and still waiting for a human.
    pub fn is_open(&self) -> bool {
        !self.was_sent && self.human_action == HumanAction::Pending
    }

    pub fn record_human_action(
        &mut self,
        action: HumanAction,
        actor: &str,
        edited_content: Option<String>,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if action == HumanAction::Pending {
            return Err(DomainError::InvalidDecisionAction(
                "pending is not a human action".to_string(),
            ));
        }
        if !self.is_open() {
            return Err(DomainError::InvalidDecisionAction(format!(
                "decision log {} is closed (human_action={}, was_sent={})",
                self.id.0,
                self.human_action.as_str(),
                self.was_sent
            )));
        }
        let has_edit = edited_content.as_deref().is_some_and(|content| !content.trim().is_empty());
        if action == HumanAction::ApprovedWithEdit && !has_edit {
            return Err(DomainError::InvalidDecisionAction(
                "approved_with_edit requires edited content".to_string(),
            ));
        }
        self.human_action = action;
        self.actor = Some(actor.to_string());
        self.edited_content = edited_content;
        self.comment = comment;
        self.acted_at = Some(at);
        Ok(())
    }

    pub fn can_send(&self) -> bool {
        !self.was_sent
            && (self.decision == Decision::AutoSend || self.human_action.is_approval())
    }

    pub fn mark_sent(&mut self, final_content: String, at: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.can_send() {
            return Err(DomainError::InvalidDecisionAction(format!(
                "decision log {} is not eligible to send (decision={}, human_action={}, was_sent={})",
                self.id.0,
                self.decision.as_str(),
                self.human_action.as_str(),
                self.was_sent
            )));
        }
        self.was_sent = true;
        self.final_content = Some(final_content);
        self.sent_at = Some(at);
        Ok(())
    }

    pub fn warnings(&self) -> Vec<String> {
        self.decision_details
            .get("warnings")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn commitment_conflicts(&self) -> Vec<CommitmentConflict> {
        self.decision_details
            .get("commitment_conflicts")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    pub fn to_result(&self) -> DecisionResult {
        DecisionResult {
            decision: self.decision,
            reason_codes: self.reason_codes.clone(),
            confidence: self.confidence,
            warnings: self.warnings(),
            commitment_conflicts: self.commitment_conflicts(),
            matched_pattern: self.matched_pattern.clone(),
            decision_log_id: Some(self.id.clone()),
        }
    }
}

/// Running approval statistics for one FAQ answer pattern at one property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomationPatternStats {
    pub property_code: String,
    pub answer_key: String,
    pub sample_count: u32,
    pub approved_count: u32,
    pub edited_count: u32,
    pub rejected_count: u32,
    pub approval_rate: f64,
    pub eligible: bool,
    pub updated_at: DateTime<Utc>,
}

impl AutomationPatternStats {
    pub fn new(property_code: &str, answer_key: &str, at: DateTime<Utc>) -> Self {
        Self {
            property_code: property_code.to_string(),
            answer_key: answer_key.to_string(),
            sample_count: 0,
            approved_count: 0,
            edited_count: 0,
            rejected_count: 0,
            approval_rate: 0.0,
            eligible: false,
            updated_at: at,
        }
    }

    /// Folds one human verdict into the counters. Escalations say nothing about draft quality
    /// and are ignored. Returns whether the counters changed.
    pub fn record(
        &mut self,
        action: HumanAction,
        policy: &EligibilityPolicy,
        at: DateTime<Utc>,
    ) -> bool {
        match action {
            HumanAction::Pending | HumanAction::Escalated => return false,
            HumanAction::ApprovedAsIs => self.approved_count += 1,
            HumanAction::ApprovedWithEdit => self.edited_count += 1,
            HumanAction::Rejected => self.rejected_count += 1,
        }
        self.sample_count += 1;
        self.approval_rate = f64::from(self.approved_count) / f64::from(self.sample_count);
        self.eligible = policy.is_eligible(self.sample_count, self.approved_count);
        self.updated_at = at;
        true
    }
}

/// Operator-defined rule that adds a reason code when a keyword or commitment topic is present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
    pub topics: Vec<CommitmentTopic>,
    pub reason_code: ReasonCode,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl PolicyRule {
    pub fn matches(&self, lowered_text: &str, active_topics: &[CommitmentTopic]) -> bool {
        if !self.enabled {
            return false;
        }
        let keyword_hit = self
            .keywords
            .iter()
            .filter(|keyword| !keyword.trim().is_empty())
            .any(|keyword| lowered_text.contains(&keyword.to_lowercase()));
        keyword_hit || self.topics.iter().any(|topic| active_topics.contains(topic))
    }
}
