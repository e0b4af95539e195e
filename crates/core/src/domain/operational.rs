use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::commitment::CommitmentId;
use crate::domain::conversation::ConversationId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationalCommitmentId(pub String);

impl OperationalCommitmentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcTopic {
    EarlyCheckin,
    LateCheckout,
    Amenity,
    FacilityIssue,
    FollowUp,
    ReservationChange,
    SpecialRequest,
    Refund,
    Payment,
    Compensation,
}

impl OcTopic {
    pub const ALL: [OcTopic; 10] = [
        Self::EarlyCheckin,
        Self::LateCheckout,
        Self::Amenity,
        Self::FacilityIssue,
        Self::FollowUp,
        Self::ReservationChange,
        Self::SpecialRequest,
        Self::Refund,
        Self::Payment,
        Self::Compensation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EarlyCheckin => "early_checkin",
            Self::LateCheckout => "late_checkout",
            Self::Amenity => "amenity",
            Self::FacilityIssue => "facility_issue",
            Self::FollowUp => "follow_up",
            Self::ReservationChange => "reservation_change",
            Self::SpecialRequest => "special_request",
            Self::Refund => "refund",
            Self::Payment => "payment",
            Self::Compensation => "compensation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|topic| topic.as_str() == normalized)
    }

    /// Money-moving topics only ever produce candidates that a human has to confirm.
    pub fn is_sensitive(&self) -> bool {
        matches!(self, Self::Refund | Self::Payment | Self::Compensation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcStatus {
    Pending,
    SuggestedResolve,
    Done,
    Resolved,
}

impl OcStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::SuggestedResolve => "suggested_resolve",
            Self::Done => "done",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "suggested_resolve" => Some(Self::SuggestedResolve),
            "done" => Some(Self::Done),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::SuggestedResolve)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionReason {
    GuestCancelled,
    Superseded,
    HostConfirmed,
    CandidateRejected,
}

impl ResolutionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GuestCancelled => "guest_cancelled",
            Self::Superseded => "superseded",
            Self::HostConfirmed => "host_confirmed",
            Self::CandidateRejected => "candidate_rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "guest_cancelled" => Some(Self::GuestCancelled),
            "superseded" => Some(Self::Superseded),
            "host_confirmed" => Some(Self::HostConfirmed),
            "candidate_rejected" => Some(Self::CandidateRejected),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetTimeType {
    Explicit,
    Implicit,
}

impl TargetTimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Implicit => "implicit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "explicit" => Some(Self::Explicit),
            "implicit" => Some(Self::Implicit),
            _ => None,
        }
    }
}

/// When the staff action is due. An explicit target always carries its date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target_time_type", rename_all = "snake_case")]
pub enum TargetTime {
    Explicit { target_date: NaiveDate },
    Implicit,
}

impl TargetTime {
    pub fn time_type(&self) -> TargetTimeType {
        match self {
            Self::Explicit { .. } => TargetTimeType::Explicit,
            Self::Implicit => TargetTimeType::Implicit,
        }
    }

    pub fn target_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Explicit { target_date } => Some(*target_date),
            Self::Implicit => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestStay {
    pub checkin_date: Option<NaiveDate>,
    pub checkout_date: Option<NaiveDate>,
}

impl GuestStay {
    pub fn new(checkin_date: Option<NaiveDate>, checkout_date: Option<NaiveDate>) -> Self {
        Self { checkin_date, checkout_date }
    }

    pub fn checks_in_on(&self, day: NaiveDate) -> bool {
        self.checkin_date == Some(day)
    }

    /// Guest arrived before `day` and has not checked out yet. An unknown checkout leaves the
    /// stay open-ended.
    pub fn is_in_house(&self, day: NaiveDate) -> bool {
        self.checkin_date.is_some_and(|checkin| {
            checkin < day && self.checkout_date.map_or(true, |checkout| day <= checkout)
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcPriority {
    Immediate,
    Upcoming,
    Pending,
}

impl OcPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Upcoming => "upcoming",
            Self::Pending => "pending",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffAction {
    MarkDone,
    ConfirmSuggestedResolve,
    RejectResolve,
    ConfirmCandidate,
    RejectCandidate,
}

impl StaffAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarkDone => "mark_done",
            Self::ConfirmSuggestedResolve => "confirm_suggested_resolve",
            Self::RejectResolve => "reject_resolve",
            Self::ConfirmCandidate => "confirm_candidate",
            Self::RejectCandidate => "reject_candidate",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "mark_done" | "done" => Some(Self::MarkDone),
            "confirm_suggested_resolve" | "confirm_resolve" => Some(Self::ConfirmSuggestedResolve),
            "reject_resolve" => Some(Self::RejectResolve),
            "confirm_candidate" => Some(Self::ConfirmCandidate),
            "reject_candidate" => Some(Self::RejectCandidate),
            _ => None,
        }
    }
}

/// What happened to an OC as a result of a message or staff action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcAction {
    Created,
    Superseded,
    AutoResolved,
    SuggestedResolve,
    MarkedDone,
    ConfirmedResolve,
    RejectedResolve,
    ConfirmedCandidate,
    RejectedCandidate,
}

impl OcAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Superseded => "superseded",
            Self::AutoResolved => "auto_resolved",
            Self::SuggestedResolve => "suggested_resolve",
            Self::MarkedDone => "marked_done",
            Self::ConfirmedResolve => "confirmed_resolve",
            Self::RejectedResolve => "rejected_resolve",
            Self::ConfirmedCandidate => "confirmed_candidate",
            Self::RejectedCandidate => "rejected_candidate",
        }
    }
}

impl From<StaffAction> for OcAction {
    fn from(value: StaffAction) -> Self {
        match value {
            StaffAction::MarkDone => Self::MarkedDone,
            StaffAction::ConfirmSuggestedResolve => Self::ConfirmedResolve,
            StaffAction::RejectResolve => Self::RejectedResolve,
            StaffAction::ConfirmCandidate => Self::ConfirmedCandidate,
            StaffAction::RejectCandidate => Self::RejectedCandidate,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationalCommitment {
    pub id: OperationalCommitmentId,
    pub commitment_id: Option<CommitmentId>,
    pub conversation_id: ConversationId,
    pub property_code: String,
    pub topic: OcTopic,
    pub description: String,
    pub is_candidate_only: bool,
    pub target: TargetTime,
    pub stay: GuestStay,
    pub status: OcStatus,
    pub resolution_reason: Option<ResolutionReason>,
    pub resolved_by: Option<String>,
    pub evidence_quote: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OperationalCommitment {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn apply(
        &mut self,
        action: StaffAction,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        match action {
            StaffAction::MarkDone => {
                if self.status != OcStatus::Pending || self.is_candidate_only {
                    return Err(self.invalid(action));
                }
                self.status = OcStatus::Done;
            }
            StaffAction::ConfirmSuggestedResolve => {
                if self.status != OcStatus::SuggestedResolve {
                    return Err(self.invalid(action));
                }
                self.status = OcStatus::Resolved;
                self.resolution_reason =
                    Some(self.resolution_reason.unwrap_or(ResolutionReason::HostConfirmed));
            }
            StaffAction::RejectResolve => {
                if self.status != OcStatus::SuggestedResolve {
                    return Err(self.invalid(action));
                }
                self.status = OcStatus::Pending;
                self.resolution_reason = None;
            }
            StaffAction::ConfirmCandidate => {
                if !self.is_candidate_only || !self.is_active() {
                    return Err(self.invalid(action));
                }
                self.is_candidate_only = false;
            }
            StaffAction::RejectCandidate => {
                if !self.is_candidate_only || !self.is_active() {
                    return Err(self.invalid(action));
                }
                self.status = OcStatus::Resolved;
                self.resolution_reason = Some(ResolutionReason::CandidateRejected);
            }
        }
        self.resolved_by = Some(actor.to_string());
        self.updated_at = at;
        Ok(())
    }

    /// Guest explicitly called the request off.
    pub fn resolve_cancelled(&mut self, evidence: &str, at: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.is_active() {
            return Err(DomainError::InvalidOcTransition {
                from: self.status,
                action: "resolve_guest_cancelled".to_string(),
            });
        }
        self.status = OcStatus::Resolved;
        self.resolution_reason = Some(ResolutionReason::GuestCancelled);
        self.evidence_quote = Some(evidence.to_string());
        self.updated_at = at;
        Ok(())
    }

    pub fn suggest_resolve(
        &mut self,
        reason: Option<ResolutionReason>,
        evidence: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status != OcStatus::Pending {
            return Err(DomainError::InvalidOcTransition {
                from: self.status,
                action: "suggest_resolve".to_string(),
            });
        }
        self.status = OcStatus::SuggestedResolve;
        self.resolution_reason = reason;
        self.evidence_quote = Some(evidence.to_string());
        self.updated_at = at;
        Ok(())
    }

    pub fn supersede(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.is_active() {
            return Err(DomainError::InvalidOcTransition {
                from: self.status,
                action: "supersede".to_string(),
            });
        }
        self.status = OcStatus::Resolved;
        self.resolution_reason = Some(ResolutionReason::Superseded);
        self.updated_at = at;
        Ok(())
    }

    fn invalid(&self, action: StaffAction) -> DomainError {
        DomainError::InvalidOcTransition { from: self.status, action: action.as_str().to_string() }
    }
}

/// Follow-up action proposed by extraction, before trigger rules and deduplication run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OcCandidate {
    pub topic: OcTopic,
    pub action_promise: bool,
    pub description: String,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub target_phrase: Option<String>,
    pub evidence_quote: String,
    pub confidence: f64,
}

/// One row of the staff follow-up board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffNotificationItem {
    pub oc_id: OperationalCommitmentId,
    pub conversation_id: ConversationId,
    pub property_code: String,
    pub topic: OcTopic,
    pub description: String,
    pub status: OcStatus,
    pub priority: OcPriority,
    pub target_date: Option<NaiveDate>,
    pub is_candidate_only: bool,
    pub evidence_quote: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::{
        GuestStay, OcStatus, OcTopic, OperationalCommitment, OperationalCommitmentId,
        ResolutionReason, StaffAction, TargetTime,
    };
    use crate::domain::conversation::ConversationId;
    use crate::errors::DomainError;

    fn oc(topic: OcTopic) -> OperationalCommitment {
        let now = Utc::now();
        OperationalCommitment {
            id: OperationalCommitmentId("oc-1".to_string()),
            commitment_id: None,
            conversation_id: ConversationId("conv-1".to_string()),
            property_code: "SEOUL-01".to_string(),
            topic,
            description: "샤워기 수리".to_string(),
            is_candidate_only: topic.is_sensitive(),
            target: TargetTime::Implicit,
            stay: GuestStay::default(),
            status: OcStatus::Pending,
            resolution_reason: None,
            resolved_by: None,
            evidence_quote: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn confirm_suggested_resolve_only_from_suggested() {
        let mut item = oc(OcTopic::FacilityIssue);
        let result = item.apply(StaffAction::ConfirmSuggestedResolve, "staff:kim", Utc::now());
        assert!(matches!(result, Err(DomainError::InvalidOcTransition { .. })));

        item.suggest_resolve(None, "괜찮아요", Utc::now()).expect("suggest");
        item.apply(StaffAction::ConfirmSuggestedResolve, "staff:kim", Utc::now()).expect("confirm");
        assert_eq!(item.status, OcStatus::Resolved);
        assert_eq!(item.resolution_reason, Some(ResolutionReason::HostConfirmed));
    }

    #[test]
    fn reject_resolve_returns_to_pending() {
        let mut item = oc(OcTopic::FacilityIssue);
        item.suggest_resolve(Some(ResolutionReason::HostConfirmed), "수리 완료했습니다", Utc::now())
            .expect("suggest");
        item.apply(StaffAction::RejectResolve, "staff:kim", Utc::now()).expect("reject");
        assert_eq!(item.status, OcStatus::Pending);
        assert_eq!(item.resolution_reason, None);
    }

    #[test]
    fn mark_done_is_rejected_once_resolution_is_suggested() {
        let mut item = oc(OcTopic::FacilityIssue);
        item.suggest_resolve(Some(ResolutionReason::HostConfirmed), "수리 완료했습니다", Utc::now())
            .expect("suggest");
        let error = item.apply(StaffAction::MarkDone, "staff:kim", Utc::now()).unwrap_err();
        assert!(matches!(error, DomainError::InvalidOcTransition { .. }));
        assert_eq!(item.status, OcStatus::SuggestedResolve);

        item.apply(StaffAction::RejectResolve, "staff:kim", Utc::now()).expect("reject");
        item.apply(StaffAction::MarkDone, "staff:kim", Utc::now()).expect("done");
        assert_eq!(item.status, OcStatus::Done);
    }

    #[test]
    fn candidate_actions_require_candidate_flag() {
        let mut refund = oc(OcTopic::Refund);
        assert!(refund.is_candidate_only);
        assert!(refund.apply(StaffAction::MarkDone, "staff:kim", Utc::now()).is_err());
        refund.apply(StaffAction::ConfirmCandidate, "staff:kim", Utc::now()).expect("confirm");
        assert!(!refund.is_candidate_only);
        assert!(refund.apply(StaffAction::RejectCandidate, "staff:kim", Utc::now()).is_err());
        refund.apply(StaffAction::MarkDone, "staff:kim", Utc::now()).expect("done");
        assert_eq!(refund.status, OcStatus::Done);

        let mut facility = oc(OcTopic::FacilityIssue);
        assert!(facility.apply(StaffAction::ConfirmCandidate, "staff:kim", Utc::now()).is_err());
    }

    #[test]
    fn reject_candidate_resolves_with_reason() {
        let mut payment = oc(OcTopic::Payment);
        payment.apply(StaffAction::RejectCandidate, "staff:kim", Utc::now()).expect("reject");
        assert_eq!(payment.status, OcStatus::Resolved);
        assert_eq!(payment.resolution_reason, Some(ResolutionReason::CandidateRejected));
    }

    #[test]
    fn in_house_covers_open_ended_stays() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 18).expect("date");
        let stay = GuestStay::new(day.pred_opt(), day.succ_opt());
        assert!(stay.is_in_house(day));
        assert!(!stay.checks_in_on(day));
        assert!(GuestStay::new(day.pred_opt(), None).is_in_house(day));
        assert!(!GuestStay::new(day.pred_opt(), day.pred_opt()).is_in_house(day));
        assert!(!GuestStay::new(Some(day), None).is_in_house(day));
        assert!(!GuestStay::new(None, day.succ_opt()).is_in_house(day));
        assert!(GuestStay::new(Some(day), None).checks_in_on(day));
    }
}
