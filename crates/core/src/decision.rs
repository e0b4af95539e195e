//! Draft evaluation: reason codes, safety guard, confidence and the final decision.
//!
//! `evaluate` is pure. The caller loads policy rules and pattern stats, runs it, and persists
//! the resulting decision log.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::SafetyGuardConfig;
use crate::conflict::{self, CommitmentConflict};
use crate::domain::commitment::{CommitmentCandidate, CommitmentTopic};
use crate::domain::decision::{
    AutomationPatternStats, Decision, DecisionResult, EvidencePackage, OutcomeLabel, PolicyRule,
    QualityLabel, ReasonCode, ResponseKind, SafetyLabel,
};

const HIGH_RISK_KEYWORDS: [&str; 14] = [
    "경찰", "소송", "고소", "화재", "불이 났", "응급", "구급차", "다쳤", "police", "lawsuit",
    "lawyer", "fire", "emergency", "injured",
];

const FINANCIAL_KEYWORDS: [&str; 13] = [
    "환불", "결제", "입금", "송금", "보상", "계좌", "위약금", "refund", "payment", "deposit",
    "compensation", "reimburse", "chargeback",
];

const COMPLAINT_KEYWORDS: [&str; 13] = [
    "불만", "실망", "최악", "더러", "냄새", "벌레", "화가", "complaint", "disappointed", "dirty",
    "terrible", "worst", "smell",
];

const SIMPLE_INQUIRY_KEYWORDS: [&str; 12] = [
    "와이파이", "비밀번호", "주차", "분리수거", "쓰레기", "체크인 시간", "체크아웃 시간", "wifi",
    "wi-fi", "password", "parking", "trash",
];

/// Phone numbers (`010-1234-5678`, `02 123 4567`), long bare digit runs, dashed account numbers
/// and email addresses. Dates such as `2026-10-18 15시` stay clear of every branch.
const PERSONAL_INFO_PATTERN: &str = r"(?:^|\D)(?:0\d{1,2}[- ]?\d{3,4}[- ]?\d{4}|\d{10,}|\d{3,6}-\d{2,6}-\d{4,8})(?:\D|$)|[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";

static PERSONAL_INFO: OnceLock<Option<Regex>> = OnceLock::new();

/// Hangul keywords match as substrings (particles attach directly to the stem); ASCII keywords
/// match whole words so `fire` stays out of `fireplace`.
struct KeywordTable {
    keywords: &'static [&'static str],
    code: ReasonCode,
    words: OnceLock<Option<Regex>>,
}

impl KeywordTable {
    const fn new(keywords: &'static [&'static str], code: ReasonCode) -> Self {
        Self { keywords, code, words: OnceLock::new() }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|keyword| !keyword.is_ascii() && lowered.contains(keyword))
            || self.word_pattern().is_some_and(|pattern| pattern.is_match(lowered))
    }

    fn word_pattern(&self) -> Option<&Regex> {
        self.words
            .get_or_init(|| {
                let alternation = self
                    .keywords
                    .iter()
                    .filter(|keyword| keyword.is_ascii())
                    .map(|keyword| regex::escape(keyword))
                    .collect::<Vec<_>>()
                    .join("|");
                if alternation.is_empty() {
                    return None;
                }
                // ASCII boundaries: `wifi는` still names wifi
                Regex::new(&format!(r"(?:^|[^a-z0-9])(?:{alternation})s?(?:[^a-z0-9]|$)")).ok()
            })
            .as_ref()
    }
}

static KEYWORD_TABLES: [KeywordTable; 4] = [
    KeywordTable::new(&HIGH_RISK_KEYWORDS, ReasonCode::HighRiskKeywords),
    KeywordTable::new(&FINANCIAL_KEYWORDS, ReasonCode::FinancialMention),
    KeywordTable::new(&COMPLAINT_KEYWORDS, ReasonCode::ComplaintDetected),
    KeywordTable::new(&SIMPLE_INQUIRY_KEYWORDS, ReasonCode::SimpleInquiry),
];

/// Everything `evaluate` needs besides the evidence package.
#[derive(Clone, Debug)]
pub struct EvaluationContext<'a> {
    pub policy_rules: &'a [PolicyRule],
    /// Commitments the rule extractor finds in the draft itself.
    pub draft_commitments: &'a [CommitmentCandidate],
    pub pattern_stats: Option<&'a AutomationPatternStats>,
    pub safety_guard: Option<&'a SafetyGuardConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardOutcome {
    pub passed: bool,
    pub pattern_id: Option<String>,
    pub failures: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub result: DecisionResult,
    pub guard: GuardOutcome,
    pub eligible: bool,
    /// Snapshot stored as `decision_log.decision_details`.
    pub details: Value,
}

pub fn evaluate(package: &EvidencePackage, context: &EvaluationContext<'_>) -> Evaluation {
    let (reason_codes, conflicts) = collect_reason_codes(package, context);
    let guard = check_safety_guard(
        context.safety_guard,
        package.outcome_label.as_ref(),
        &package.draft_content,
        &reason_codes,
    );
    let eligible = context.pattern_stats.is_some_and(|stats| stats.eligible);
    let decision = resolve_decision(&reason_codes, guard.passed, eligible, !conflicts.is_empty());
    let confidence = compute_confidence(package.outcome_label.as_ref(), &reason_codes);

    let mut warnings: Vec<String> =
        conflicts.iter().map(|conflict| conflict.message.clone()).collect();
    if eligible && decision != Decision::AutoSend && decision != Decision::Block {
        if reason_codes.contains(&ReasonCode::NeedsFollowUp) {
            warnings.push("auto-send skipped: draft needs follow-up".to_string());
        } else if !guard.passed {
            warnings.push(format!("auto-send withheld: {}", guard.failures.join("; ")));
        }
    }

    let matched_pattern = package.answer_key.clone();
    let details = json!({
        "warnings": warnings,
        "commitment_conflicts": conflicts,
        "matched_pattern": matched_pattern,
        "safety_guard": guard,
        "eligibility": context.pattern_stats.map(|stats| json!({
            "answer_key": stats.answer_key,
            "sample_count": stats.sample_count,
            "approved_count": stats.approved_count,
            "approval_rate": stats.approval_rate,
            "eligible": stats.eligible,
        })),
    });

    Evaluation {
        result: DecisionResult {
            decision,
            reason_codes,
            confidence,
            warnings,
            commitment_conflicts: conflicts,
            matched_pattern,
            decision_log_id: None,
        },
        guard,
        eligible,
        details,
    }
}

/// Ordered, deduplicated reason codes plus the conflicts found in the draft's own promises.
pub fn collect_reason_codes(
    package: &EvidencePackage,
    context: &EvaluationContext<'_>,
) -> (Vec<ReasonCode>, Vec<CommitmentConflict>) {
    let mut codes: BTreeSet<ReasonCode> = BTreeSet::new();

    if let Some(label) = &package.outcome_label {
        codes.extend(label_reason_codes(label));
    }

    let combined = format!("{}\n{}", package.draft_content, package.guest_message);
    codes.extend(scan_keywords(&combined));

    let lowered = combined.to_lowercase();
    let active_topics: Vec<CommitmentTopic> = package
        .active_commitments
        .iter()
        .filter(|commitment| commitment.is_active())
        .map(|commitment| commitment.topic())
        .collect();
    codes.extend(
        context
            .policy_rules
            .iter()
            .filter(|rule| rule.matches(&lowered, &active_topics))
            .map(|rule| rule.reason_code),
    );

    let mut conflicts = Vec::new();
    for candidate in context.draft_commitments {
        if conflict::restates_existing(candidate, &package.active_commitments) {
            continue;
        }
        match conflict::detect(candidate, &package.active_commitments).into_conflict() {
            Some(found) => {
                codes.insert(ReasonCode::CommitmentConflict);
                conflicts.push(found);
            }
            None => {
                codes.insert(ReasonCode::NewCommitment);
            }
        }
    }

    (codes.into_iter().collect(), conflicts)
}

pub fn label_reason_codes(label: &OutcomeLabel) -> Vec<ReasonCode> {
    let mut codes = Vec::new();
    codes.push(match label.safety {
        SafetyLabel::HighRisk => ReasonCode::SafetyConcern,
        SafetyLabel::Sensitive => ReasonCode::SensitiveTopic,
        SafetyLabel::Safe => ReasonCode::SafeContent,
    });
    if label.quality == QualityLabel::Low {
        codes.push(ReasonCode::LowConfidence);
    }
    if label.grounded {
        codes.push(ReasonCode::GroundedAnswer);
    }
    if label.missing_information {
        codes.push(ReasonCode::MissingInformation);
    }
    if label.policy_violation {
        codes.push(ReasonCode::PolicyViolation);
    }
    match label.response_kind {
        ResponseKind::Closing => codes.push(ReasonCode::ClosingMessage),
        ResponseKind::NeedsFollowUp => codes.push(ReasonCode::NeedsFollowUp),
        ResponseKind::Answer | ResponseKind::Clarification => {}
    }
    codes
}

pub fn scan_keywords(text: &str) -> Vec<ReasonCode> {
    let lowered = text.to_lowercase();
    let mut codes: Vec<ReasonCode> = KEYWORD_TABLES
        .iter()
        .filter(|table| table.matches(&lowered))
        .map(|table| table.code)
        .collect();
    if contains_personal_info(text) {
        codes.push(ReasonCode::PersonalInfo);
    }
    codes
}

fn contains_personal_info(text: &str) -> bool {
    PERSONAL_INFO
        .get_or_init(|| Regex::new(PERSONAL_INFO_PATTERN).ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(text))
}

/// Fails closed: no config, a disabled guard, or a missing label all fail.
pub fn check_safety_guard(
    guard: Option<&SafetyGuardConfig>,
    label: Option<&OutcomeLabel>,
    draft: &str,
    reason_codes: &[ReasonCode],
) -> GuardOutcome {
    let Some(guard) = guard else {
        return GuardOutcome {
            passed: false,
            pattern_id: None,
            failures: vec!["safety guard is not configured".to_string()],
        };
    };

    let mut failures = Vec::new();
    if !guard.enabled {
        failures.push("safety guard is disabled".to_string());
    }
    match label {
        None => failures.push("no outcome label".to_string()),
        Some(label) => {
            if label.quality != QualityLabel::Ok {
                failures.push(format!("quality is {}", label.quality.as_str()));
            }
            if label.safety != SafetyLabel::Safe {
                failures.push(format!("safety is {}", label.safety.as_str()));
            }
        }
    }

    let trimmed = draft.trim();
    if trimmed.is_empty() {
        failures.push("draft is empty".to_string());
    } else if trimmed.chars().count() > guard.max_draft_chars {
        failures.push(format!("draft exceeds {} characters", guard.max_draft_chars));
    }

    let lowered = draft.to_lowercase();
    for keyword in &guard.blocked_keywords {
        if !keyword.trim().is_empty() && lowered.contains(&keyword.to_lowercase()) {
            failures.push(format!("blocked keyword `{keyword}`"));
        }
    }
    for code in reason_codes {
        if guard.disallowed_reason_codes.contains(code) {
            failures.push(format!("disallowed reason code {}", code.as_str()));
        }
    }

    GuardOutcome { passed: failures.is_empty(), pattern_id: Some(guard.pattern_id.clone()), failures }
}

pub fn compute_confidence(label: Option<&OutcomeLabel>, reason_codes: &[ReasonCode]) -> f64 {
    let base = match label.map(|label| label.quality) {
        Some(QualityLabel::Ok) => 0.85,
        Some(QualityLabel::UnderReview) | None => 0.65,
        Some(QualityLabel::Low) => 0.40,
    };
    let total = reason_codes.iter().fold(base, |acc, code| acc + code.confidence_delta());
    total.clamp(0.0, 1.0)
}

/// First match wins: block, auto-send, edit, review, suggest.
pub fn resolve_decision(
    reason_codes: &[ReasonCode],
    guard_passed: bool,
    eligible: bool,
    has_conflicts: bool,
) -> Decision {
    if reason_codes.iter().any(ReasonCode::is_blocking) {
        return Decision::Block;
    }
    let needs_follow_up = reason_codes.contains(&ReasonCode::NeedsFollowUp);
    if !needs_follow_up && guard_passed && eligible {
        return Decision::AutoSend;
    }
    if reason_codes.iter().any(ReasonCode::requires_edit) {
        return Decision::RequireEdit;
    }
    if has_conflicts || reason_codes.iter().any(ReasonCode::requires_review) {
        return Decision::RequireReview;
    }
    Decision::SuggestSend
}

/// Result returned when evaluation itself could not complete.
pub fn evaluation_failed(error: &str) -> DecisionResult {
    DecisionResult {
        decision: Decision::RequireReview,
        reason_codes: vec![ReasonCode::EvaluationFailed],
        confidence: 0.0,
        warnings: vec![format!("evaluation failed: {error}")],
        commitment_conflicts: Vec::new(),
        matched_pattern: None,
        decision_log_id: None,
    }
}
