//! Operational commitment derivation and scheduling.
//!
//! Everything here is pure: callers load the active OCs, ask for a plan, and apply it inside
//! their own unit of work.

use std::cmp::Ordering;

use chrono::{Datelike, Duration, NaiveDate};

use crate::config::OperationsConfig;
use crate::domain::commitment::{CommitmentCandidate, CommitmentTopic, CommitmentType};
use crate::domain::operational::{
    GuestStay, OcAction, OcCandidate, OcPriority, OcStatus, OcTopic, OperationalCommitment,
    OperationalCommitmentId, ResolutionReason, StaffNotificationItem, TargetTime,
};

/// An OC to be created for one message, one per topic.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedOc {
    pub topic: OcTopic,
    pub description: String,
    pub is_candidate_only: bool,
    pub target: TargetTime,
    pub evidence_quote: String,
    /// Index into the commitment candidates this OC was derived from.
    pub commitment_index: Option<usize>,
}

/// A transition chosen from a guest or host reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedResolution {
    pub oc_id: OperationalCommitmentId,
    pub action: OcAction,
    pub reason: Option<ResolutionReason>,
}

pub fn should_create_oc(candidate: &OcCandidate) -> bool {
    candidate.action_promise || candidate.topic.is_sensitive()
}

/// OC topic a commitment maps to, if the commitment implies staff work.
pub fn commitment_oc_topic(candidate: &CommitmentCandidate) -> Option<OcTopic> {
    if candidate.commitment_type == CommitmentType::Fee {
        return Some(OcTopic::Payment);
    }
    if !matches!(candidate.commitment_type, CommitmentType::Allowance | CommitmentType::Change) {
        return None;
    }
    match candidate.topic() {
        CommitmentTopic::EarlyCheckin => Some(OcTopic::EarlyCheckin),
        CommitmentTopic::LateCheckout => Some(OcTopic::LateCheckout),
        CommitmentTopic::FreeProvision => Some(OcTopic::Amenity),
        CommitmentTopic::SpecialRequest => Some(OcTopic::SpecialRequest),
        CommitmentTopic::GuestCountChange | CommitmentTopic::ReservationChange => {
            Some(OcTopic::ReservationChange)
        }
        _ => None,
    }
}

pub fn plan_ocs(
    commitments: &[CommitmentCandidate],
    oc_candidates: &[OcCandidate],
    today: NaiveDate,
    stay: &GuestStay,
) -> Vec<PlannedOc> {
    let mut planned: Vec<PlannedOc> = Vec::new();

    for (index, candidate) in commitments.iter().enumerate() {
        let Some(topic) = commitment_oc_topic(candidate) else {
            continue;
        };
        if planned.iter().any(|oc| oc.topic == topic) {
            continue;
        }
        planned.push(PlannedOc {
            topic,
            description: commitment_description(candidate),
            is_candidate_only: topic.is_sensitive(),
            target: resolve_target_date(None, Some(&candidate.provenance_text), topic, today, stay),
            evidence_quote: candidate.provenance_text.clone(),
            commitment_index: Some(index),
        });
    }

    for candidate in oc_candidates.iter().filter(|candidate| should_create_oc(candidate)) {
        if planned.iter().any(|oc| oc.topic == candidate.topic) {
            continue;
        }
        let phrase = candidate.target_phrase.as_deref().or(Some(candidate.evidence_quote.as_str()));
        planned.push(PlannedOc {
            topic: candidate.topic,
            description: candidate.description.clone(),
            is_candidate_only: candidate.topic.is_sensitive(),
            target: resolve_target_date(candidate.target_date, phrase, candidate.topic, today, stay),
            evidence_quote: candidate.evidence_quote.clone(),
            commitment_index: None,
        });
    }

    planned
}

fn commitment_description(candidate: &CommitmentCandidate) -> String {
    let detail = match (candidate.terms.time(), candidate.terms.description()) {
        (Some(time), _) => format!(" {}", time.format("%H:%M")),
        (None, Some(description)) => format!(" {description}"),
        (None, None) => String::new(),
    };
    format!(
        "{} {}{detail}: {}",
        candidate.topic().as_str(),
        candidate.commitment_type.as_str(),
        candidate.provenance_text
    )
}

/// Explicit date first, then a relative phrase, then the stay window. Anything else is implicit.
pub fn resolve_target_date(
    explicit: Option<NaiveDate>,
    phrase: Option<&str>,
    topic: OcTopic,
    today: NaiveDate,
    stay: &GuestStay,
) -> TargetTime {
    if let Some(target_date) = explicit {
        return TargetTime::Explicit { target_date };
    }
    if let Some(target_date) = phrase.and_then(|phrase| date_from_phrase(phrase, today, stay)) {
        return TargetTime::Explicit { target_date };
    }
    let stay_default = match topic {
        OcTopic::EarlyCheckin => stay.checkin_date,
        OcTopic::LateCheckout => stay.checkout_date,
        _ => None,
    };
    match stay_default {
        Some(target_date) => TargetTime::Explicit { target_date },
        None => TargetTime::Implicit,
    }
}

const RELATIVE_DAYS: [(&str, i64); 8] = [
    ("내일모레", 2),
    ("day after tomorrow", 2),
    ("모레", 2),
    ("내일", 1),
    ("tomorrow", 1),
    ("오늘", 0),
    ("today", 0),
    ("tonight", 0),
];

const CHECKIN_DAY_PHRASES: [&str; 4] = ["체크인 당일", "입실 당일", "check-in day", "on arrival"];

fn date_from_phrase(phrase: &str, today: NaiveDate, stay: &GuestStay) -> Option<NaiveDate> {
    let lowered = phrase.to_lowercase();

    if let Some(date) = iso_date(&lowered) {
        return Some(date);
    }
    if let Some(date) = month_day(&lowered, today) {
        return Some(date);
    }
    if CHECKIN_DAY_PHRASES.iter().any(|p| lowered.contains(p)) {
        if let Some(checkin) = stay.checkin_date {
            return Some(checkin);
        }
    }
    RELATIVE_DAYS
        .iter()
        .find(|(p, _)| lowered.contains(p))
        .map(|(_, days)| today + Duration::days(*days))
}

fn iso_date(text: &str) -> Option<NaiveDate> {
    let bytes = text.as_bytes();
    if bytes.len() < 10 {
        return None;
    }
    (0..=bytes.len() - 10).find_map(|start| {
        let slice = text.get(start..start + 10)?;
        NaiveDate::parse_from_str(slice, "%Y-%m-%d").ok()
    })
}

/// `3월 15일` style dates; a date already behind `today` rolls to next year.
fn month_day(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let (month_part, rest) = text.split_once('월')?;
    let (day_part, _) = rest.split_once('일')?;
    let month: u32 = trailing_digits(month_part)?.parse().ok()?;
    let day: u32 = day_part.trim().parse().ok()?;
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year < today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(this_year)
    }
}

fn trailing_digits(text: &str) -> Option<&str> {
    let trimmed = text.trim_end();
    let start = trimmed
        .char_indices()
        .rev()
        .take_while(|(_, ch)| ch.is_ascii_digit())
        .last()
        .map(|(index, _)| index)?;
    Some(&trimmed[start..])
}

pub fn calculate_priority(target: &TargetTime, stay: &GuestStay, today: NaiveDate) -> OcPriority {
    if stay.checks_in_on(today) || stay.is_in_house(today) {
        return OcPriority::Immediate;
    }
    match target {
        TargetTime::Explicit { target_date } => match (*target_date - today).num_days() {
            days if days <= 0 => OcPriority::Immediate,
            1 => OcPriority::Upcoming,
            _ => OcPriority::Pending,
        },
        TargetTime::Implicit => OcPriority::Immediate,
    }
}

pub fn topic_keywords(topic: OcTopic) -> &'static [&'static str] {
    match topic {
        OcTopic::EarlyCheckin => {
            &["얼리체크인", "얼리 체크인", "일찍 입실", "early check-in", "early checkin"]
        }
        OcTopic::LateCheckout => &[
            "레이트체크아웃",
            "레이트 체크아웃",
            "늦은 퇴실",
            "late checkout",
            "late check-out",
        ],
        OcTopic::Amenity => &[
            "수건", "타월", "어메니티", "세면도구", "칫솔", "샴푸", "휴지", "이불", "베개", "towel",
            "amenity", "toiletries", "blanket", "pillow",
        ],
        OcTopic::FacilityIssue => &[
            "고장", "수리", "온수", "보일러", "에어컨", "누수", "broken", "repair", "leak",
            "hot water", "heater",
        ],
        OcTopic::FollowUp => &["확인", "연락", "follow up", "check on"],
        OcTopic::ReservationChange => {
            &["예약 변경", "날짜 변경", "일정 변경", "인원", "reservation", "booking", "dates"]
        }
        OcTopic::SpecialRequest => &["요청", "부탁", "케이크", "꽃", "request", "surprise"],
        OcTopic::Refund => &["환불", "refund"],
        OcTopic::Payment => &["결제", "입금", "추가 요금", "payment", "pay", "charge"],
        OcTopic::Compensation => &["보상", "할인", "compensation", "discount"],
    }
}

fn mentions_topic(text: &str, topic: OcTopic) -> bool {
    topic_keywords(topic).iter().any(|keyword| text.contains(keyword))
}

fn contains_any(text: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|phrase| !phrase.trim().is_empty() && text.contains(&phrase.to_lowercase()))
}

fn auto_touchable(oc: &OperationalCommitment) -> bool {
    oc.is_active() && !oc.is_candidate_only
}

pub fn plan_guest_resolution(
    text: &str,
    active: &[OperationalCommitment],
    phrases: &OperationsConfig,
) -> Vec<PlannedResolution> {
    let lowered = text.to_lowercase();

    if contains_any(&lowered, &phrases.cancellation_phrases) {
        let cancelled: Vec<PlannedResolution> = active
            .iter()
            .filter(|oc| auto_touchable(oc) && mentions_topic(&lowered, oc.topic))
            .map(|oc| PlannedResolution {
                oc_id: oc.id.clone(),
                action: OcAction::AutoResolved,
                reason: Some(ResolutionReason::GuestCancelled),
            })
            .collect();
        if !cancelled.is_empty() {
            return cancelled;
        }
    }

    let open: Vec<&OperationalCommitment> = active.iter().filter(|oc| oc.is_active()).collect();
    if open.len() == 1 && contains_any(&lowered, &phrases.acknowledgment_phrases) {
        let oc = open[0];
        if auto_touchable(oc) && oc.status == OcStatus::Pending {
            return vec![PlannedResolution {
                oc_id: oc.id.clone(),
                action: OcAction::SuggestedResolve,
                reason: None,
            }];
        }
    }

    Vec::new()
}

pub fn plan_host_resolution(
    text: &str,
    active: &[OperationalCommitment],
    phrases: &OperationsConfig,
) -> Vec<PlannedResolution> {
    let lowered = text.to_lowercase();
    if !contains_any(&lowered, &phrases.host_confirmation_phrases) {
        return Vec::new();
    }

    let suggestible: Vec<&OperationalCommitment> = active
        .iter()
        .filter(|oc| auto_touchable(oc) && oc.status == OcStatus::Pending)
        .collect();
    let matched: Vec<&OperationalCommitment> =
        suggestible.iter().copied().filter(|oc| mentions_topic(&lowered, oc.topic)).collect();

    let targets = if !matched.is_empty() {
        matched
    } else if active.iter().filter(|oc| oc.is_active()).count() == 1 {
        suggestible
    } else {
        Vec::new()
    };

    targets
        .into_iter()
        .map(|oc| PlannedResolution {
            oc_id: oc.id.clone(),
            action: OcAction::SuggestedResolve,
            reason: Some(ResolutionReason::HostConfirmed),
        })
        .collect()
}

pub fn notification_item(oc: &OperationalCommitment, today: NaiveDate) -> StaffNotificationItem {
    StaffNotificationItem {
        oc_id: oc.id.clone(),
        conversation_id: oc.conversation_id.clone(),
        property_code: oc.property_code.clone(),
        topic: oc.topic,
        description: oc.description.clone(),
        status: oc.status,
        priority: calculate_priority(&oc.target, &oc.stay, today),
        target_date: oc.target.target_date(),
        is_candidate_only: oc.is_candidate_only,
        evidence_quote: oc.evidence_quote.clone(),
        created_at: oc.created_at,
    }
}

/// Active OCs as board rows: priority, then target date (undated last), then age.
pub fn build_notifications(
    ocs: &[OperationalCommitment],
    today: NaiveDate,
) -> Vec<StaffNotificationItem> {
    let mut items: Vec<StaffNotificationItem> = ocs
        .iter()
        .filter(|oc| oc.is_active())
        .map(|oc| notification_item(oc, today))
        .collect();
    items.sort_by(compare_notifications);
    items
}

fn compare_notifications(a: &StaffNotificationItem, b: &StaffNotificationItem) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| match (a.target_date, b.target_date) {
            (Some(left), Some(right)) => left.cmp(&right),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.created_at.cmp(&b.created_at))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveTime, Utc};
    use rust_decimal::Decimal;

    use super::{
        build_notifications, calculate_priority, commitment_oc_topic, plan_guest_resolution,
        plan_host_resolution, plan_ocs, resolve_target_date, should_create_oc,
    };
    use crate::config::OperationsConfig;
    use crate::domain::commitment::{CommitmentCandidate, CommitmentTerms, CommitmentType};
    use crate::domain::conversation::ConversationId;
    use crate::domain::operational::{
        GuestStay, OcAction, OcCandidate, OcPriority, OcStatus, OcTopic, OperationalCommitment,
        OperationalCommitmentId, ResolutionReason, TargetTime,
    };

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("date")
    }

    fn oc(id: &str, topic: OcTopic) -> OperationalCommitment {
        let now = Utc::now();
        OperationalCommitment {
            id: OperationalCommitmentId(id.to_string()),
            commitment_id: None,
            conversation_id: ConversationId("conv-1".to_string()),
            property_code: "SEOUL-01".to_string(),
            topic,
            description: format!("{} follow-up", topic.as_str()),
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

    fn oc_candidate(topic: OcTopic, action_promise: bool, quote: &str) -> OcCandidate {
        OcCandidate {
            topic,
            action_promise,
            description: quote.to_string(),
            target_date: None,
            target_phrase: None,
            evidence_quote: quote.to_string(),
            confidence: 0.7,
        }
    }

    #[test]
    fn priority_table_follows_target_distance() {
        let today = day("2026-10-18");
        let stay = GuestStay::default();
        let explicit = |offset: i64| TargetTime::Explicit { target_date: today + Duration::days(offset) };

        assert_eq!(calculate_priority(&explicit(0), &stay, today), OcPriority::Immediate);
        assert_eq!(calculate_priority(&explicit(-2), &stay, today), OcPriority::Immediate);
        assert_eq!(calculate_priority(&explicit(1), &stay, today), OcPriority::Upcoming);
        assert_eq!(calculate_priority(&explicit(5), &stay, today), OcPriority::Pending);
        assert_eq!(calculate_priority(&TargetTime::Implicit, &stay, today), OcPriority::Immediate);
    }

    #[test]
    fn guests_arriving_or_in_house_are_immediate() {
        let today = day("2026-10-18");
        let far = TargetTime::Explicit { target_date: today + Duration::days(5) };

        let arriving = GuestStay::new(Some(today), Some(today + Duration::days(2)));
        assert_eq!(calculate_priority(&far, &arriving, today), OcPriority::Immediate);

        let in_house = GuestStay::new(Some(today - Duration::days(1)), Some(today + Duration::days(1)));
        assert_eq!(calculate_priority(&far, &in_house, today), OcPriority::Immediate);

        let checkin_only = GuestStay::new(Some(today - Duration::days(1)), None);
        assert_eq!(calculate_priority(&far, &checkin_only, today), OcPriority::Immediate);

        let checked_out = GuestStay::new(Some(today - Duration::days(3)), Some(today - Duration::days(1)));
        assert_eq!(calculate_priority(&far, &checked_out, today), OcPriority::Pending);

        let future = GuestStay::new(Some(today + Duration::days(3)), Some(today + Duration::days(5)));
        assert_eq!(calculate_priority(&far, &future, today), OcPriority::Pending);
    }

    #[test]
    fn target_date_resolves_phrases_and_stay_defaults() {
        let today = day("2026-10-18");
        let stay = GuestStay::new(Some(day("2026-10-25")), Some(day("2026-10-27")));

        let tomorrow = resolve_target_date(None, Some("내일 수건 더 준비해 드리겠습니다"), OcTopic::Amenity, today, &stay);
        assert_eq!(tomorrow.target_date(), Some(day("2026-10-19")));

        let overmorrow = resolve_target_date(None, Some("내일모레 확인해 드리겠습니다"), OcTopic::FollowUp, today, &stay);
        assert_eq!(overmorrow.target_date(), Some(day("2026-10-20")));

        let arrival = resolve_target_date(None, Some("체크인 당일 준비해 드리겠습니다"), OcTopic::Amenity, today, &stay);
        assert_eq!(arrival.target_date(), Some(day("2026-10-25")));

        let iso = resolve_target_date(None, Some("on 2026-11-02 we will fix it"), OcTopic::FacilityIssue, today, &stay);
        assert_eq!(iso.target_date(), Some(day("2026-11-02")));

        let month_day = resolve_target_date(None, Some("3월 15일에 환불해 드리겠습니다"), OcTopic::Refund, today, &stay);
        assert_eq!(month_day.target_date(), Some(day("2027-03-15")));

        let early = resolve_target_date(None, Some("14시에 입실 가능합니다"), OcTopic::EarlyCheckin, today, &stay);
        assert_eq!(early.target_date(), Some(day("2026-10-25")));

        let vague = resolve_target_date(None, Some("확인해 드리겠습니다"), OcTopic::FollowUp, today, &stay);
        assert_eq!(vague, TargetTime::Implicit);
    }

    #[test]
    fn trigger_rules_cover_promises_and_sensitive_topics() {
        assert!(should_create_oc(&oc_candidate(OcTopic::FacilityIssue, true, "수리해 드리겠습니다")));
        assert!(should_create_oc(&oc_candidate(OcTopic::Refund, false, "환불 문의")));
        assert!(!should_create_oc(&oc_candidate(OcTopic::FollowUp, false, "좋은 하루 되세요")));

        let fee = CommitmentCandidate {
            terms: CommitmentTerms::ExtraFee { amount: Some(Decimal::new(20_000, 0)), description: None },
            commitment_type: CommitmentType::Fee,
            provenance_text: "추가 인원은 20,000원입니다".to_string(),
            confidence: 0.7,
        };
        assert_eq!(commitment_oc_topic(&fee), Some(OcTopic::Payment));

        let pets = CommitmentCandidate {
            terms: CommitmentTerms::PetPolicy { allowed: Some(false) },
            commitment_type: CommitmentType::Prohibition,
            provenance_text: "반려동물 불가합니다".to_string(),
            confidence: 0.65,
        };
        assert_eq!(commitment_oc_topic(&pets), None);
    }

    #[test]
    fn one_oc_per_topic_with_commitment_winning() {
        let today = day("2026-10-18");
        let early = CommitmentCandidate {
            terms: CommitmentTerms::EarlyCheckin { time: NaiveTime::from_hms_opt(14, 0, 0) },
            commitment_type: CommitmentType::Allowance,
            provenance_text: "14시에 입실 가능합니다".to_string(),
            confidence: 0.7,
        };
        let bare = oc_candidate(OcTopic::EarlyCheckin, true, "얼리체크인 준비해 드리겠습니다");
        let refund = oc_candidate(OcTopic::Refund, true, "환불해드리겠습니다");

        let planned = plan_ocs(&[early], &[bare, refund], today, &GuestStay::default());
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].topic, OcTopic::EarlyCheckin);
        assert_eq!(planned[0].commitment_index, Some(0));
        assert!(planned[0].description.contains("14:00"));
        assert_eq!(planned[1].topic, OcTopic::Refund);
        assert!(planned[1].is_candidate_only);
    }

    #[test]
    fn vague_acknowledgment_needs_exactly_one_active_oc() {
        let phrases = OperationsConfig::default();

        let single = vec![oc("oc-1", OcTopic::Amenity)];
        let plan = plan_guest_resolution("괜찮아요", &single, &phrases);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].action, OcAction::SuggestedResolve);

        let two = vec![oc("oc-1", OcTopic::Amenity), oc("oc-2", OcTopic::FacilityIssue)];
        assert!(plan_guest_resolution("괜찮아요", &two, &phrases).is_empty());
    }

    #[test]
    fn cancellation_needs_topic_keyword_and_skips_candidates() {
        let phrases = OperationsConfig::default();
        let active = vec![
            oc("oc-1", OcTopic::EarlyCheckin),
            oc("oc-2", OcTopic::Amenity),
            oc("oc-3", OcTopic::Refund),
        ];

        let plan = plan_guest_resolution("얼리체크인은 취소할게요", &active, &phrases);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].oc_id.0, "oc-1");
        assert_eq!(plan[0].reason, Some(ResolutionReason::GuestCancelled));

        assert!(plan_guest_resolution("환불 취소할게요", &active, &phrases).is_empty());
    }

    #[test]
    fn host_confirmation_suggests_matching_ocs_only() {
        let phrases = OperationsConfig::default();
        let active = vec![oc("oc-1", OcTopic::Amenity), oc("oc-2", OcTopic::FacilityIssue)];

        let plan = plan_host_resolution("수건 준비 완료했습니다", &active, &phrases);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].oc_id.0, "oc-1");
        assert_eq!(plan[0].action, OcAction::SuggestedResolve);
        assert_eq!(plan[0].reason, Some(ResolutionReason::HostConfirmed));

        assert!(plan_host_resolution("완료했습니다", &active, &phrases).is_empty());
        assert!(plan_host_resolution("수건 곧 갖다 드릴게요", &active, &phrases).is_empty());

        let single = vec![oc("oc-9", OcTopic::FollowUp)];
        assert_eq!(plan_host_resolution("처리했습니다", &single, &phrases).len(), 1);
    }

    #[test]
    fn notifications_sort_by_priority_then_date() {
        let today = day("2026-10-18");
        let mut later = oc("oc-later", OcTopic::Amenity);
        later.target = TargetTime::Explicit { target_date: today + Duration::days(6) };
        let mut tomorrow = oc("oc-tomorrow", OcTopic::FacilityIssue);
        tomorrow.target = TargetTime::Explicit { target_date: today + Duration::days(1) };
        let mut due = oc("oc-due", OcTopic::FollowUp);
        due.target = TargetTime::Explicit { target_date: today };
        let undated = oc("oc-undated", OcTopic::SpecialRequest);
        let mut done = oc("oc-done", OcTopic::LateCheckout);
        done.status = OcStatus::Done;

        let items = build_notifications(&[later, undated, done, tomorrow, due], today);
        let order: Vec<&str> = items.iter().map(|item| item.oc_id.0.as_str()).collect();
        assert_eq!(order, vec!["oc-due", "oc-undated", "oc-tomorrow", "oc-later"]);
    }
}
