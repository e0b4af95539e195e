use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::conversation::ConversationId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitmentId(pub String);

impl CommitmentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Closed set of promise topics. The wire names are the snake_case strings stored in the
/// `commitment.topic` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentTopic {
    EarlyCheckin,
    LateCheckout,
    CheckinTime,
    CheckoutTime,
    GuestCountChange,
    FreeProvision,
    ExtraFee,
    ReservationChange,
    PetPolicy,
    SpecialRequest,
    Other,
}

impl CommitmentTopic {
    pub const ALL: [CommitmentTopic; 11] = [
        Self::EarlyCheckin,
        Self::LateCheckout,
        Self::CheckinTime,
        Self::CheckoutTime,
        Self::GuestCountChange,
        Self::FreeProvision,
        Self::ExtraFee,
        Self::ReservationChange,
        Self::PetPolicy,
        Self::SpecialRequest,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EarlyCheckin => "early_checkin",
            Self::LateCheckout => "late_checkout",
            Self::CheckinTime => "checkin_time",
            Self::CheckoutTime => "checkout_time",
            Self::GuestCountChange => "guest_count_change",
            Self::FreeProvision => "free_provision",
            Self::ExtraFee => "extra_fee",
            Self::ReservationChange => "reservation_change",
            Self::PetPolicy => "pet_policy",
            Self::SpecialRequest => "special_request",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|topic| topic.as_str() == normalized)
    }

    pub fn is_time_bearing(&self) -> bool {
        matches!(
            self,
            Self::EarlyCheckin | Self::LateCheckout | Self::CheckinTime | Self::CheckoutTime
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentType {
    Allowance,
    Prohibition,
    Fee,
    Change,
    Condition,
}

impl CommitmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowance => "allowance",
            Self::Prohibition => "prohibition",
            Self::Fee => "fee",
            Self::Change => "change",
            Self::Condition => "condition",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allowance" => Some(Self::Allowance),
            "prohibition" => Some(Self::Prohibition),
            "fee" => Some(Self::Fee),
            "change" => Some(Self::Change),
            "condition" => Some(Self::Condition),
            _ => None,
        }
    }

    /// Allowance and prohibition are the only pair that can reverse each other.
    pub fn is_reversal_of(&self, other: &CommitmentType) -> bool {
        matches!(
            (self, other),
            (Self::Allowance, Self::Prohibition) | (Self::Prohibition, Self::Allowance)
        )
    }
}

/// Typed payload of a commitment. The variant *is* the topic, so a time can never be attached
/// to a fee commitment and the conflict rules can match exhaustively.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum CommitmentTerms {
    EarlyCheckin {
        #[serde(default)]
        time: Option<NaiveTime>,
    },
    LateCheckout {
        #[serde(default)]
        time: Option<NaiveTime>,
    },
    CheckinTime {
        #[serde(default)]
        time: Option<NaiveTime>,
    },
    CheckoutTime {
        #[serde(default)]
        time: Option<NaiveTime>,
    },
    GuestCountChange {
        #[serde(default)]
        count: Option<u32>,
    },
    FreeProvision {
        #[serde(default)]
        item: Option<String>,
    },
    ExtraFee {
        #[serde(default)]
        amount: Option<Decimal>,
        #[serde(default)]
        description: Option<String>,
    },
    ReservationChange {
        #[serde(default)]
        description: Option<String>,
    },
    PetPolicy {
        #[serde(default)]
        allowed: Option<bool>,
    },
    SpecialRequest {
        #[serde(default)]
        description: Option<String>,
    },
    Other {
        #[serde(default)]
        description: Option<String>,
    },
}

impl CommitmentTerms {
    pub fn topic(&self) -> CommitmentTopic {
        match self {
            Self::EarlyCheckin { .. } => CommitmentTopic::EarlyCheckin,
            Self::LateCheckout { .. } => CommitmentTopic::LateCheckout,
            Self::CheckinTime { .. } => CommitmentTopic::CheckinTime,
            Self::CheckoutTime { .. } => CommitmentTopic::CheckoutTime,
            Self::GuestCountChange { .. } => CommitmentTopic::GuestCountChange,
            Self::FreeProvision { .. } => CommitmentTopic::FreeProvision,
            Self::ExtraFee { .. } => CommitmentTopic::ExtraFee,
            Self::ReservationChange { .. } => CommitmentTopic::ReservationChange,
            Self::PetPolicy { .. } => CommitmentTopic::PetPolicy,
            Self::SpecialRequest { .. } => CommitmentTopic::SpecialRequest,
            Self::Other { .. } => CommitmentTopic::Other,
        }
    }

    /// Terms for `topic` with every payload field unset.
    pub fn empty(topic: CommitmentTopic) -> Self {
        match topic {
            CommitmentTopic::EarlyCheckin => Self::EarlyCheckin { time: None },
            CommitmentTopic::LateCheckout => Self::LateCheckout { time: None },
            CommitmentTopic::CheckinTime => Self::CheckinTime { time: None },
            CommitmentTopic::CheckoutTime => Self::CheckoutTime { time: None },
            CommitmentTopic::GuestCountChange => Self::GuestCountChange { count: None },
            CommitmentTopic::FreeProvision => Self::FreeProvision { item: None },
            CommitmentTopic::ExtraFee => Self::ExtraFee { amount: None, description: None },
            CommitmentTopic::ReservationChange => Self::ReservationChange { description: None },
            CommitmentTopic::PetPolicy => Self::PetPolicy { allowed: None },
            CommitmentTopic::SpecialRequest => Self::SpecialRequest { description: None },
            CommitmentTopic::Other => Self::Other { description: None },
        }
    }

    pub fn time(&self) -> Option<NaiveTime> {
        match self {
            Self::EarlyCheckin { time }
            | Self::LateCheckout { time }
            | Self::CheckinTime { time }
            | Self::CheckoutTime { time } => *time,
            _ => None,
        }
    }

    /// Free-text part of the payload, if the variant carries one.
    pub fn description(&self) -> Option<&str> {
        match self {
            Self::FreeProvision { item } => item.as_deref(),
            Self::ExtraFee { description, .. }
            | Self::ReservationChange { description }
            | Self::SpecialRequest { description }
            | Self::Other { description } => description.as_deref(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentStatus {
    Active,
    Superseded,
    Expired,
}

impl CommitmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Superseded => "superseded",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "superseded" => Some(Self::Superseded),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// A promise proposed by extraction that has not been persisted yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitmentCandidate {
    pub terms: CommitmentTerms,
    pub commitment_type: CommitmentType,
    pub provenance_text: String,
    pub confidence: f64,
}

impl CommitmentCandidate {
    pub fn topic(&self) -> CommitmentTopic {
        self.terms.topic()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Commitment {
    pub id: CommitmentId,
    pub conversation_id: ConversationId,
    pub airbnb_thread_id: String,
    pub property_code: String,
    pub provenance_message_id: Option<String>,
    pub terms: CommitmentTerms,
    pub commitment_type: CommitmentType,
    pub status: CommitmentStatus,
    pub provenance_text: String,
    pub extraction_confidence: f64,
    pub superseded_by: Option<CommitmentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Commitment {
    pub fn topic(&self) -> CommitmentTopic {
        self.terms.topic()
    }

    pub fn is_active(&self) -> bool {
        self.status == CommitmentStatus::Active
    }

    pub fn supersede(&mut self, by: CommitmentId, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != CommitmentStatus::Active {
            return Err(DomainError::InvalidCommitmentTransition {
                from: self.status,
                to: CommitmentStatus::Superseded,
            });
        }
        if by == self.id {
            return Err(DomainError::InvariantViolation(format!(
                "commitment {} cannot supersede itself",
                self.id.0
            )));
        }
        self.status = CommitmentStatus::Superseded;
        self.superseded_by = Some(by);
        self.updated_at = at;
        Ok(())
    }

    pub fn expire(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != CommitmentStatus::Active {
            return Err(DomainError::InvalidCommitmentTransition {
                from: self.status,
                to: CommitmentStatus::Expired,
            });
        }
        self.status = CommitmentStatus::Expired;
        self.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, Utc};

    use super::{
        Commitment, CommitmentId, CommitmentStatus, CommitmentTerms, CommitmentTopic,
        CommitmentType,
    };
    use crate::domain::conversation::ConversationId;
    use crate::errors::DomainError;

    fn commitment(id: &str) -> Commitment {
        let now = Utc::now();
        Commitment {
            id: CommitmentId(id.to_string()),
            conversation_id: ConversationId("conv-1".to_string()),
            airbnb_thread_id: "thread-1".to_string(),
            property_code: "SEOUL-01".to_string(),
            provenance_message_id: None,
            terms: CommitmentTerms::EarlyCheckin { time: NaiveTime::from_hms_opt(14, 0, 0) },
            commitment_type: CommitmentType::Allowance,
            status: CommitmentStatus::Active,
            provenance_text: "14시에 입실 가능합니다".to_string(),
            extraction_confidence: 0.7,
            superseded_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn terms_serialize_with_topic_tag() {
        let terms = CommitmentTerms::EarlyCheckin { time: NaiveTime::from_hms_opt(14, 0, 0) };
        let json = terms.to_json();
        assert_eq!(json["topic"], "early_checkin");
        assert_eq!(json["time"], "14:00:00");

        let parsed: CommitmentTerms =
            serde_json::from_value(serde_json::json!({ "topic": "pet_policy" })).expect("parse");
        assert_eq!(parsed, CommitmentTerms::PetPolicy { allowed: None });
    }

    #[test]
    fn topic_parse_accepts_dashes_and_spaces() {
        assert_eq!(CommitmentTopic::parse("early-checkin"), Some(CommitmentTopic::EarlyCheckin));
        assert_eq!(CommitmentTopic::parse("Guest Count Change"), Some(CommitmentTopic::GuestCountChange));
        assert_eq!(CommitmentTopic::parse("breakfast"), None);
        for topic in CommitmentTopic::ALL {
            assert_eq!(CommitmentTerms::empty(topic).topic(), topic);
        }
    }

    #[test]
    fn supersede_is_only_valid_from_active() {
        let mut first = commitment("c-1");
        first.supersede(CommitmentId("c-2".to_string()), Utc::now()).expect("supersede");
        assert_eq!(first.status, CommitmentStatus::Superseded);
        assert_eq!(first.superseded_by, Some(CommitmentId("c-2".to_string())));

        let again = first.supersede(CommitmentId("c-3".to_string()), Utc::now());
        assert!(matches!(again, Err(DomainError::InvalidCommitmentTransition { .. })));
    }

    #[test]
    fn supersede_rejects_self_reference() {
        let mut first = commitment("c-1");
        let result = first.supersede(CommitmentId("c-1".to_string()), Utc::now());
        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
        assert!(first.is_active());
    }
}
