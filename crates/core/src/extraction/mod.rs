//! Candidate extraction contract shared by the model stage and the rule-based fallback.
//!
//! Both stages produce [`ExtractedCandidates`]; everything coming from a model passes through
//! the coercion and provenance checks here before it reaches the stores.

pub mod rules;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::commitment::{CommitmentCandidate, CommitmentTopic, CommitmentType};
use crate::domain::operational::{OcCandidate, OcTopic};

pub use rules::RuleBasedExtractor;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub text: String,
    #[serde(default)]
    pub conversation_context: Option<String>,
    #[serde(default)]
    pub guest_checkin_date: Option<NaiveDate>,
    pub today: NaiveDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    Model,
    RuleBased,
}

impl ExtractionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::RuleBased => "rule_based",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractedCandidates {
    pub commitments: Vec<CommitmentCandidate>,
    pub operational: Vec<OcCandidate>,
    pub source: ExtractionSource,
}

impl ExtractedCandidates {
    pub fn empty(source: ExtractionSource) -> Self {
        Self { commitments: Vec::new(), operational: Vec::new(), source }
    }

    pub fn is_empty(&self) -> bool {
        self.commitments.is_empty() && self.operational.is_empty()
    }

    /// Drops commitment and OC candidates under `threshold`.
    pub fn retain_confident(&mut self, threshold: f64) {
        self.commitments.retain(|candidate| candidate.confidence >= threshold);
        self.operational.retain(|candidate| candidate.confidence >= threshold);
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("model extraction timed out after {0}s")]
    Timeout(u64),
    #[error("model client failed: {0}")]
    Client(String),
    #[error("model output could not be parsed: {0}")]
    Parse(String),
    #[error("model returned no candidates")]
    Empty,
    #[error("model extraction is disabled")]
    Disabled,
}

impl ExtractionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Client(_) => "client",
            Self::Parse(_) => "parse",
            Self::Empty => "empty",
            Self::Disabled => "disabled",
        }
    }
}

pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// `quote` must appear verbatim in `text`; blank quotes never qualify.
pub fn is_verbatim(text: &str, quote: &str) -> bool {
    let quote = quote.trim();
    !quote.is_empty() && text.contains(quote)
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase().replace(['-', ' '], "_")
}

const TOPIC_ALIASES: [(&str, CommitmentTopic); 24] = [
    ("early_check_in", CommitmentTopic::EarlyCheckin),
    ("얼리체크인", CommitmentTopic::EarlyCheckin),
    ("late_check_out", CommitmentTopic::LateCheckout),
    ("레이트체크아웃", CommitmentTopic::LateCheckout),
    ("check_in", CommitmentTopic::CheckinTime),
    ("checkin", CommitmentTopic::CheckinTime),
    ("check_in_time", CommitmentTopic::CheckinTime),
    ("check_out", CommitmentTopic::CheckoutTime),
    ("checkout", CommitmentTopic::CheckoutTime),
    ("check_out_time", CommitmentTopic::CheckoutTime),
    ("guest_count", CommitmentTopic::GuestCountChange),
    ("headcount", CommitmentTopic::GuestCountChange),
    ("occupancy", CommitmentTopic::GuestCountChange),
    ("amenity", CommitmentTopic::FreeProvision),
    ("complimentary", CommitmentTopic::FreeProvision),
    ("free_item", CommitmentTopic::FreeProvision),
    ("fee", CommitmentTopic::ExtraFee),
    ("surcharge", CommitmentTopic::ExtraFee),
    ("extra_charge", CommitmentTopic::ExtraFee),
    ("booking_change", CommitmentTopic::ReservationChange),
    ("date_change", CommitmentTopic::ReservationChange),
    ("pet", CommitmentTopic::PetPolicy),
    ("pets", CommitmentTopic::PetPolicy),
    ("request", CommitmentTopic::SpecialRequest),
];

const TOPIC_FRAGMENTS: [(&str, CommitmentTopic); 12] = [
    ("early", CommitmentTopic::EarlyCheckin),
    ("late", CommitmentTopic::LateCheckout),
    ("checkin", CommitmentTopic::CheckinTime),
    ("check_in", CommitmentTopic::CheckinTime),
    ("checkout", CommitmentTopic::CheckoutTime),
    ("check_out", CommitmentTopic::CheckoutTime),
    ("guest", CommitmentTopic::GuestCountChange),
    ("free", CommitmentTopic::FreeProvision),
    ("fee", CommitmentTopic::ExtraFee),
    ("reserv", CommitmentTopic::ReservationChange),
    ("pet", CommitmentTopic::PetPolicy),
    ("request", CommitmentTopic::SpecialRequest),
];

/// Exact name, then alias, then fragment containment, then `other`.
pub fn coerce_topic(raw: &str) -> CommitmentTopic {
    let normalized = normalize(raw);
    if let Some(topic) = CommitmentTopic::parse(&normalized) {
        return topic;
    }
    if let Some((_, topic)) = TOPIC_ALIASES.iter().find(|(alias, _)| *alias == normalized) {
        return *topic;
    }
    TOPIC_FRAGMENTS
        .iter()
        .find(|(fragment, _)| normalized.contains(fragment))
        .map(|(_, topic)| *topic)
        .unwrap_or(CommitmentTopic::Other)
}

pub fn coerce_commitment_type(raw: &str) -> CommitmentType {
    let normalized = normalize(raw);
    if let Some(commitment_type) = CommitmentType::parse(&normalized) {
        return commitment_type;
    }
    match normalized.as_str() {
        "allow" | "allowed" | "permit" | "permitted" | "permission" => CommitmentType::Allowance,
        "deny" | "denied" | "prohibit" | "prohibited" | "forbidden" | "not_allowed" => {
            CommitmentType::Prohibition
        }
        "charge" | "cost" | "price" | "payment" => CommitmentType::Fee,
        "modify" | "modification" | "update" => CommitmentType::Change,
        "conditional" | "requirement" => CommitmentType::Condition,
        other if other.contains("prohib") || other.contains("deny") || other.starts_with("not") => {
            CommitmentType::Prohibition
        }
        _ => CommitmentType::Allowance,
    }
}

pub fn coerce_oc_topic(raw: &str) -> OcTopic {
    let normalized = normalize(raw);
    if let Some(topic) = OcTopic::parse(&normalized) {
        return topic;
    }
    match normalized.as_str() {
        "amenities" | "supplies" | "towel" | "towels" | "free_provision" => OcTopic::Amenity,
        "repair" | "maintenance" | "facility" | "broken" => OcTopic::FacilityIssue,
        "followup" | "check" | "confirm" | "confirmation" => OcTopic::FollowUp,
        "reservation" | "booking" | "guest_count_change" => OcTopic::ReservationChange,
        "request" => OcTopic::SpecialRequest,
        "charge" | "fee" | "extra_fee" => OcTopic::Payment,
        "discount" => OcTopic::Compensation,
        other if other.contains("early") => OcTopic::EarlyCheckin,
        other if other.contains("late") => OcTopic::LateCheckout,
        other if other.contains("refund") => OcTopic::Refund,
        other if other.contains("pay") => OcTopic::Payment,
        _ => OcTopic::FollowUp,
    }
}
