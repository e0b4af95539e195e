//! Commitment conflict detection.
//!
//! Compares a freshly extracted candidate against the commitments that are still active in the
//! conversation. Rules run in a fixed order and the first match wins:
//! type reversal, then topic-specific value mismatch, then implicit cross-topic conflict.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::commitment::{
    Commitment, CommitmentCandidate, CommitmentId, CommitmentTerms, CommitmentTopic,
};
use crate::domain::risk::RiskSeverity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    TypeReversal,
    ValueMismatch,
    Implicit,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeReversal => "TYPE_REVERSAL",
            Self::ValueMismatch => "VALUE_MISMATCH",
            Self::Implicit => "IMPLICIT",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentConflict {
    pub existing_commitment_id: CommitmentId,
    pub existing_topic: CommitmentTopic,
    pub topic: CommitmentTopic,
    pub conflict_type: ConflictType,
    pub severity: RiskSeverity,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConflictResult {
    NoConflict,
    Conflict(CommitmentConflict),
}

impl ConflictResult {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn into_conflict(self) -> Option<CommitmentConflict> {
        match self {
            Self::Conflict(conflict) => Some(conflict),
            Self::NoConflict => None,
        }
    }
}

const MEDIUM_TIME_DIFF_MINUTES: i64 = 30;
const HIGH_TIME_DIFF_MINUTES: i64 = 60;

/// Topic pairs that contradict each other across topics: something promised for free that is
/// later charged for, in either order.
const IMPLICIT_PAIRS: [(CommitmentTopic, CommitmentTopic); 2] = [
    (CommitmentTopic::FreeProvision, CommitmentTopic::ExtraFee),
    (CommitmentTopic::ExtraFee, CommitmentTopic::FreeProvision),
];

pub fn detect(candidate: &CommitmentCandidate, existing_active: &[Commitment]) -> ConflictResult {
    let topic = candidate.topic();

    if let Some(existing) = existing_active.iter().find(|c| c.is_active() && c.topic() == topic) {
        if let Some(conflict) = type_reversal(candidate, existing) {
            return ConflictResult::Conflict(conflict);
        }
        if let Some(conflict) = value_mismatch(candidate, existing) {
            return ConflictResult::Conflict(conflict);
        }
    }

    for existing in existing_active.iter().filter(|c| c.is_active()) {
        if let Some(conflict) = implicit_conflict(candidate, existing) {
            return ConflictResult::Conflict(conflict);
        }
    }

    ConflictResult::NoConflict
}

/// Runs `detect` for every candidate; candidates without a conflict are omitted.
pub fn detect_all(
    candidates: &[CommitmentCandidate],
    existing_active: &[Commitment],
) -> Vec<CommitmentConflict> {
    candidates
        .iter()
        .filter_map(|candidate| detect(candidate, existing_active).into_conflict())
        .collect()
}

/// True when the candidate restates an active commitment with the same type and terms.
pub fn restates_existing(candidate: &CommitmentCandidate, existing_active: &[Commitment]) -> bool {
    existing_active.iter().any(|existing| {
        existing.is_active()
            && existing.commitment_type == candidate.commitment_type
            && existing.terms == candidate.terms
    })
}

/// For every topic holding more than one active commitment, pairs each older row with the
/// newest one so the older rows can be superseded.
pub fn duplicate_active_repairs(active: &[Commitment]) -> Vec<(CommitmentId, CommitmentId)> {
    let mut by_topic: BTreeMap<CommitmentTopic, Vec<&Commitment>> = BTreeMap::new();
    for commitment in active.iter().filter(|c| c.is_active()) {
        by_topic.entry(commitment.topic()).or_default().push(commitment);
    }

    let mut repairs = Vec::new();
    for (_, mut group) in by_topic {
        if group.len() < 2 {
            continue;
        }
        group.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let Some(newest) = group.last() else {
            continue;
        };
        let newest_id = newest.id.clone();
        for older in &group[..group.len() - 1] {
            repairs.push((older.id.clone(), newest_id.clone()));
        }
    }
    repairs
}

fn type_reversal(candidate: &CommitmentCandidate, existing: &Commitment) -> Option<CommitmentConflict> {
    if !candidate.commitment_type.is_reversal_of(&existing.commitment_type) {
        return None;
    }
    Some(CommitmentConflict {
        existing_commitment_id: existing.id.clone(),
        existing_topic: existing.topic(),
        topic: candidate.topic(),
        conflict_type: ConflictType::TypeReversal,
        severity: RiskSeverity::High,
        message: format!(
            "{} was previously a {} and is now a {}: \"{}\" vs \"{}\"",
            candidate.topic().as_str(),
            existing.commitment_type.as_str(),
            candidate.commitment_type.as_str(),
            existing.provenance_text,
            candidate.provenance_text
        ),
    })
}

fn value_mismatch(candidate: &CommitmentCandidate, existing: &Commitment) -> Option<CommitmentConflict> {
    let (severity, detail) = match (&existing.terms, &candidate.terms) {
        (
            CommitmentTerms::EarlyCheckin { time: Some(before) },
            CommitmentTerms::EarlyCheckin { time: Some(after) },
        )
        | (
            CommitmentTerms::LateCheckout { time: Some(before) },
            CommitmentTerms::LateCheckout { time: Some(after) },
        )
        | (
            CommitmentTerms::CheckinTime { time: Some(before) },
            CommitmentTerms::CheckinTime { time: Some(after) },
        )
        | (
            CommitmentTerms::CheckoutTime { time: Some(before) },
            CommitmentTerms::CheckoutTime { time: Some(after) },
        ) => {
            let diff = (*after - *before).num_minutes().abs();
            let severity = if diff >= HIGH_TIME_DIFF_MINUTES {
                RiskSeverity::High
            } else if diff >= MEDIUM_TIME_DIFF_MINUTES {
                RiskSeverity::Medium
            } else {
                return None;
            };
            (
                severity,
                format!(
                    "time changed from {} to {} ({diff} min)",
                    before.format("%H:%M"),
                    after.format("%H:%M")
                ),
            )
        }
        (
            CommitmentTerms::ExtraFee { amount: Some(before), .. },
            CommitmentTerms::ExtraFee { amount: Some(after), .. },
        ) => {
            if before == after {
                return None;
            }
            (RiskSeverity::Critical, format!("fee changed from {before} to {after}"))
        }
        (
            CommitmentTerms::GuestCountChange { count: Some(before) },
            CommitmentTerms::GuestCountChange { count: Some(after) },
        ) => {
            if before == after {
                return None;
            }
            (RiskSeverity::High, format!("guest count changed from {before} to {after}"))
        }
        _ => return None,
    };

    Some(CommitmentConflict {
        existing_commitment_id: existing.id.clone(),
        existing_topic: existing.topic(),
        topic: candidate.topic(),
        conflict_type: ConflictType::ValueMismatch,
        severity,
        message: format!("{}: {detail}", candidate.topic().as_str()),
    })
}

fn implicit_conflict(
    candidate: &CommitmentCandidate,
    existing: &Commitment,
) -> Option<CommitmentConflict> {
    let pair = (existing.topic(), candidate.topic());
    if !IMPLICIT_PAIRS.contains(&pair) {
        return None;
    }

    let existing_keywords = keywords(existing.terms.description(), &existing.provenance_text);
    let candidate_keywords = keywords(candidate.terms.description(), &candidate.provenance_text);
    let shared: Vec<&String> = existing_keywords.intersection(&candidate_keywords).collect();
    if shared.is_empty() {
        return None;
    }

    Some(CommitmentConflict {
        existing_commitment_id: existing.id.clone(),
        existing_topic: existing.topic(),
        topic: candidate.topic(),
        conflict_type: ConflictType::Implicit,
        severity: RiskSeverity::High,
        message: format!(
            "{} contradicts earlier {} on {}",
            candidate.topic().as_str(),
            existing.topic().as_str(),
            shared.iter().map(|keyword| keyword.as_str()).collect::<Vec<_>>().join(", ")
        ),
    })
}

const PARTICLES: [&str; 14] =
    ["으로", "에서", "까지", "부터", "은", "는", "이", "가", "을", "를", "도", "로", "에", "와"];

const STOPWORDS: [&str; 22] = [
    "무료", "추가", "요금", "비용", "제공", "제공해", "드립니다", "드려요", "됩니다", "있습니다",
    "가능합니다", "있어요", "free", "fee", "extra", "charge", "the", "for", "and", "will", "you",
    "of",
];

fn keywords(description: Option<&str>, provenance: &str) -> BTreeSet<String> {
    let mut text = provenance.to_lowercase();
    if let Some(description) = description {
        text.push(' ');
        text.push_str(&description.to_lowercase());
    }

    text.split(|ch: char| ch.is_whitespace() || (ch.is_ascii_punctuation() && ch != ','))
        .map(strip_particle)
        .filter(|token| token.chars().count() >= 2)
        .filter(|token| !token.chars().all(|ch| ch.is_ascii_digit() || ch == ','))
        .filter(|token| !STOPWORDS.contains(&token.as_str()))
        .collect()
}

fn strip_particle(token: &str) -> String {
    for particle in PARTICLES {
        if let Some(stem) = token.strip_suffix(particle) {
            if stem.chars().count() >= 2 {
                return stem.to_string();
            }
        }
    }
    token.to_string()
}
