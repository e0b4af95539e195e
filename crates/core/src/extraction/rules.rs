//! Keyword and pattern based extraction. Pure and infallible, so it doubles as the fallback
//! whenever the model stage fails.

use chrono::NaiveTime;
use rust_decimal::Decimal;

use crate::config::ExtractionConfig;
use crate::domain::commitment::{CommitmentCandidate, CommitmentTerms, CommitmentTopic, CommitmentType};
use crate::domain::operational::{OcCandidate, OcTopic};
use crate::extraction::{ExtractedCandidates, ExtractionRequest, ExtractionSource};

const PAYLOAD_CONFIDENCE: f64 = 0.7;
const BASE_CONFIDENCE: f64 = 0.65;

const TOPIC_KEYWORDS: [(CommitmentTopic, &[&str]); 10] = [
    (
        CommitmentTopic::EarlyCheckin,
        &["얼리체크인", "얼리 체크인", "조기 입실", "일찍 입실", "early check-in", "early checkin"],
    ),
    (
        CommitmentTopic::LateCheckout,
        &["레이트체크아웃", "레이트 체크아웃", "늦은 퇴실", "늦게 퇴실", "late checkout", "late check-out"],
    ),
    (CommitmentTopic::PetPolicy, &["반려동물", "애완", "강아지", "고양이", "pets", "pet", "dog", "dogs"]),
    (CommitmentTopic::FreeProvision, &["무료", "무상", "free of charge", "complimentary", "for free"]),
    (CommitmentTopic::ExtraFee, &["요금", "비용", "수수료", "fee", "charge", "surcharge"]),
    (
        CommitmentTopic::GuestCountChange,
        &["인원", "명까지", "guests", "people", "persons", "guest count"],
    ),
    (CommitmentTopic::CheckinTime, &["입실", "체크인", "check-in", "check in", "checkin"]),
    (CommitmentTopic::CheckoutTime, &["퇴실", "체크아웃", "check-out", "check out", "checkout"]),
    (
        CommitmentTopic::ReservationChange,
        &["예약 변경", "날짜 변경", "일정 변경", "숙박 연장", "reservation change", "change your reservation", "extend your stay"],
    ),
    (
        CommitmentTopic::SpecialRequest,
        &["요청하신", "말씀하신", "special request", "as requested"],
    ),
];

/// Checked before allowance phrases: `불가능` contains `가능`.
const PROHIBITION_PHRASES: [&str; 12] = [
    "불가능",
    "불가",
    "안 됩니다",
    "안됩니다",
    "어렵습니다",
    "금지",
    "not possible",
    "not allowed",
    "cannot",
    "can't",
    "unable",
    "unfortunately",
];

const ALLOWANCE_PHRASES: [&str; 12] = [
    "가능",
    "됩니다",
    "괜찮습니다",
    "허용",
    "드릴게요",
    "드리겠습니다",
    "해드릴",
    "allowed",
    "possible",
    "welcome",
    "of course",
    "no problem",
];

const CHANGE_PHRASES: [&str; 4] = ["변경", "연장", "change", "extend"];

const PROMISE_PHRASES: [&str; 10] = [
    "드리겠습니다",
    "드릴게요",
    "드릴께요",
    "해드릴",
    "하겠습니다",
    "i will",
    "i'll",
    "we will",
    "we'll",
    "will be",
];

const OC_KEYWORDS: [(OcTopic, &[&str]); 9] = [
    (OcTopic::Refund, &["환불", "refund"]),
    (OcTopic::Compensation, &["보상", "할인", "compensat", "discount"]),
    (OcTopic::Payment, &["결제", "입금", "추가 요금", "payment", "charge"]),
    (
        OcTopic::FacilityIssue,
        &["수리", "고장", "온수", "보일러", "에어컨", "누수", "repair", "fix", "broken", "hot water"],
    ),
    (
        OcTopic::Amenity,
        &["수건", "타월", "어메니티", "세면도구", "칫솔", "휴지", "이불", "베개", "towel", "blanket", "pillow", "toiletries"],
    ),
    (OcTopic::EarlyCheckin, &["얼리체크인", "얼리 체크인", "early check-in", "early checkin"]),
    (OcTopic::LateCheckout, &["레이트체크아웃", "레이트 체크아웃", "late checkout", "late check-out"]),
    (OcTopic::ReservationChange, &["예약 변경", "날짜 변경", "일정 변경", "reservation", "booking"]),
    (OcTopic::SpecialRequest, &["요청", "케이크", "꽃", "request", "surprise"]),
];

const DATE_PHRASES: [&str; 11] = [
    "체크인 당일",
    "입실 당일",
    "내일모레",
    "모레",
    "내일",
    "오늘",
    "day after tomorrow",
    "tomorrow",
    "today",
    "tonight",
    "check-in day",
];

#[derive(Clone, Debug)]
pub struct RuleBasedExtractor {
    standard_checkin: NaiveTime,
    standard_checkout: NaiveTime,
}

impl Default for RuleBasedExtractor {
    fn default() -> Self {
        Self::new(
            NaiveTime::from_hms_opt(15, 0, 0).unwrap_or_default(),
            NaiveTime::from_hms_opt(11, 0, 0).unwrap_or_default(),
        )
    }
}

impl RuleBasedExtractor {
    pub fn new(standard_checkin: NaiveTime, standard_checkout: NaiveTime) -> Self {
        Self { standard_checkin, standard_checkout }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.standard_checkin, config.standard_checkout)
    }

    pub fn extract(&self, request: &ExtractionRequest) -> ExtractedCandidates {
        ExtractedCandidates {
            commitments: self.extract_commitments(&request.text),
            operational: self.extract_operational(&request.text),
            source: ExtractionSource::RuleBased,
        }
    }

    /// At most one candidate per topic; a sentence with a parsed payload beats one without.
    pub fn extract_commitments(&self, text: &str) -> Vec<CommitmentCandidate> {
        let mut candidates: Vec<CommitmentCandidate> = Vec::new();
        for sentence in sentences(text) {
            let Some(candidate) = self.commitment_from_sentence(sentence) else {
                continue;
            };
            match candidates.iter_mut().find(|existing| existing.topic() == candidate.topic()) {
                Some(existing) if candidate.confidence > existing.confidence => *existing = candidate,
                Some(_) => {}
                None => candidates.push(candidate),
            }
        }
        candidates
    }

    pub fn extract_operational(&self, text: &str) -> Vec<OcCandidate> {
        let mut candidates: Vec<OcCandidate> = Vec::new();
        for sentence in sentences(text) {
            let lowered = sentence.to_lowercase();
            let action_promise = contains_any(&lowered, &PROMISE_PHRASES);
            let topic = oc_topic(&lowered);

            let keep = match topic {
                Some(topic) if topic.is_sensitive() => {
                    action_promise || !contains_any(&lowered, &PROHIBITION_PHRASES)
                }
                _ => action_promise,
            };
            if !keep {
                continue;
            }
            let topic = topic.unwrap_or(OcTopic::FollowUp);
            if candidates.iter().any(|existing| existing.topic == topic) {
                continue;
            }

            candidates.push(OcCandidate {
                topic,
                action_promise,
                description: sentence.to_string(),
                target_date: None,
                target_phrase: DATE_PHRASES
                    .iter()
                    .find(|phrase| lowered.contains(*phrase))
                    .map(|phrase| (*phrase).to_string()),
                evidence_quote: sentence.to_string(),
                confidence: if action_promise { PAYLOAD_CONFIDENCE } else { BASE_CONFIDENCE },
            });
        }
        candidates
    }

    fn commitment_from_sentence(&self, sentence: &str) -> Option<CommitmentCandidate> {
        let lowered = sentence.to_lowercase();
        let mut topic = TOPIC_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|keyword| mentions(&lowered, keyword)))
            .map(|(topic, _)| *topic)?;

        let time = parse_time(&lowered);
        match (topic, time) {
            (CommitmentTopic::CheckinTime, Some(time)) if time < self.standard_checkin => {
                topic = CommitmentTopic::EarlyCheckin;
            }
            (CommitmentTopic::CheckoutTime, Some(time)) if time > self.standard_checkout => {
                topic = CommitmentTopic::LateCheckout;
            }
            _ => {}
        }

        let prohibited = contains_any(&lowered, &PROHIBITION_PHRASES);
        let allowed = !prohibited && contains_any(&lowered, &ALLOWANCE_PHRASES);
        let commitment_type = match topic {
            CommitmentTopic::ExtraFee => CommitmentType::Fee,
            CommitmentTopic::ReservationChange if !prohibited => CommitmentType::Change,
            _ if prohibited => CommitmentType::Prohibition,
            _ if allowed => CommitmentType::Allowance,
            CommitmentTopic::GuestCountChange if contains_any(&lowered, &CHANGE_PHRASES) => {
                CommitmentType::Change
            }
            _ if topic.is_time_bearing() && time.is_some() => CommitmentType::Condition,
            _ => return None,
        };

        let terms = match topic {
            CommitmentTopic::EarlyCheckin => CommitmentTerms::EarlyCheckin { time },
            CommitmentTopic::LateCheckout => CommitmentTerms::LateCheckout { time },
            CommitmentTopic::CheckinTime => CommitmentTerms::CheckinTime { time },
            CommitmentTopic::CheckoutTime => CommitmentTerms::CheckoutTime { time },
            CommitmentTopic::GuestCountChange => {
                CommitmentTerms::GuestCountChange { count: parse_count(&lowered) }
            }
            CommitmentTopic::FreeProvision => {
                CommitmentTerms::FreeProvision { item: leading_noun(sentence) }
            }
            CommitmentTopic::ExtraFee => CommitmentTerms::ExtraFee {
                amount: parse_amount(&lowered),
                description: Some(sentence.to_string()),
            },
            CommitmentTopic::PetPolicy => {
                CommitmentTerms::PetPolicy { allowed: Some(commitment_type != CommitmentType::Prohibition) }
            }
            CommitmentTopic::ReservationChange => {
                CommitmentTerms::ReservationChange { description: Some(sentence.to_string()) }
            }
            CommitmentTopic::SpecialRequest => {
                CommitmentTerms::SpecialRequest { description: Some(sentence.to_string()) }
            }
            CommitmentTopic::Other => CommitmentTerms::Other { description: Some(sentence.to_string()) },
        };

        Some(CommitmentCandidate {
            confidence: if has_payload(&terms) { PAYLOAD_CONFIDENCE } else { BASE_CONFIDENCE },
            terms,
            commitment_type,
            provenance_text: sentence.to_string(),
        })
    }
}

fn has_payload(terms: &CommitmentTerms) -> bool {
    match terms {
        CommitmentTerms::EarlyCheckin { time }
        | CommitmentTerms::LateCheckout { time }
        | CommitmentTerms::CheckinTime { time }
        | CommitmentTerms::CheckoutTime { time } => time.is_some(),
        CommitmentTerms::GuestCountChange { count } => count.is_some(),
        CommitmentTerms::ExtraFee { amount, .. } => amount.is_some(),
        _ => false,
    }
}

/// Sentences split on `.`, `!`, `?` and newlines, trimmed; each is a verbatim slice of `text`.
pub fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?', '\n']).map(str::trim).filter(|sentence| !sentence.is_empty())
}

fn contains_any(lowered: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| lowered.contains(phrase))
}

/// ASCII keywords must sit on word boundaries so `pet` does not hit `carpet`.
fn mentions(lowered: &str, keyword: &str) -> bool {
    if !keyword.is_ascii() {
        return lowered.contains(keyword);
    }
    lowered.match_indices(keyword).any(|(start, _)| {
        let before = lowered[..start].chars().next_back();
        let after = lowered[start + keyword.len()..].chars().next();
        !before.is_some_and(|ch| ch.is_ascii_alphanumeric())
            && !after.is_some_and(|ch| ch.is_ascii_alphanumeric())
    })
}

/// First matching topic wins; money topics are listed first.
fn oc_topic(lowered: &str) -> Option<OcTopic> {
    OC_KEYWORDS
        .iter()
        .find(|(_, keywords)| contains_any(lowered, keywords))
        .map(|(topic, _)| *topic)
}

fn leading_noun(sentence: &str) -> Option<String> {
    let first = sentence.split_whitespace().next()?;
    let stem = ["은", "는", "이", "가", "을", "를", "도"]
        .iter()
        .find_map(|particle| first.strip_suffix(particle).filter(|stem| !stem.is_empty()))
        .unwrap_or(first);
    Some(stem.to_string())
}

fn read_number(chars: &[char], start: usize) -> (String, usize) {
    let mut digits = String::new();
    let mut index = start;
    while index < chars.len() && (chars[index].is_ascii_digit() || chars[index] == ',') {
        if chars[index] != ',' {
            digits.push(chars[index]);
        }
        index += 1;
    }
    (digits, index)
}

fn skip_spaces(chars: &[char], mut index: usize) -> usize {
    while index < chars.len() && chars[index] == ' ' {
        index += 1;
    }
    index
}

/// `word` at `index`, not followed by another letter.
fn word_at(chars: &[char], index: usize, word: &str) -> bool {
    starts_with_at(chars, index, word)
        && !chars.get(index + word.chars().count()).is_some_and(|ch| ch.is_ascii_alphabetic())
}

fn starts_with_at(chars: &[char], index: usize, needle: &str) -> bool {
    let mut position = index;
    for expected in needle.chars() {
        if chars.get(position) != Some(&expected) {
            return false;
        }
        position += 1;
    }
    true
}

/// `14시`, `14시 30분`, `2시 반`, `오후 2시`, `14:30`, `2pm`, `2:30 pm`.
pub fn parse_time(lowered: &str) -> Option<NaiveTime> {
    let chars: Vec<char> = lowered.chars().collect();
    let mut index = 0;
    while index < chars.len() {
        if !chars[index].is_ascii_digit() || (index > 0 && chars[index - 1].is_ascii_digit()) {
            index += 1;
            continue;
        }
        let (digits, end) = read_number(&chars, index);
        let Ok(mut hour) = digits.parse::<u32>() else {
            index = end;
            continue;
        };
        let mut minute = 0;
        let mut cursor = end;
        let mut matched = false;

        if chars.get(cursor) == Some(&':') {
            let (minute_digits, minute_end) = read_number(&chars, cursor + 1);
            if minute_digits.len() == 2 {
                minute = minute_digits.parse().unwrap_or(0);
                cursor = minute_end;
                matched = true;
            }
        }

        let after = skip_spaces(&chars, cursor);
        if !matched && chars.get(after) == Some(&'시') {
            matched = true;
            cursor = skip_spaces(&chars, after + 1);
            if chars.get(cursor) == Some(&'반') {
                minute = 30;
            } else {
                let (minute_digits, minute_end) = read_number(&chars, cursor);
                if !minute_digits.is_empty() && chars.get(minute_end) == Some(&'분') {
                    minute = minute_digits.parse().unwrap_or(0);
                }
            }
        }

        let suffix = skip_spaces(&chars, cursor);
        let pm = word_at(&chars, suffix, "pm") || starts_with_at(&chars, suffix, "p.m");
        let am = word_at(&chars, suffix, "am") || starts_with_at(&chars, suffix, "a.m");
        matched = matched || pm || am;

        if matched {
            let prefix: String = chars[..index].iter().collect();
            let prefix = prefix.trim_end();
            let korean_pm = ["오후", "저녁", "밤"].iter().any(|word| prefix.ends_with(word));
            if (pm || korean_pm) && hour < 12 {
                hour += 12;
            }
            if am && hour == 12 {
                hour = 0;
            }
            if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
                return Some(time);
            }
        }
        index = end.max(index + 1);
    }
    None
}

/// `3만원`, `3만 원`, `5천원`, `50,000원`, `$40`, `40 dollars`.
pub fn parse_amount(lowered: &str) -> Option<Decimal> {
    let chars: Vec<char> = lowered.chars().collect();
    let mut index = 0;
    while index < chars.len() {
        if !chars[index].is_ascii_digit() || (index > 0 && chars[index - 1].is_ascii_digit()) {
            index += 1;
            continue;
        }
        let (digits, end) = read_number(&chars, index);
        let Ok(value) = digits.parse::<i64>() else {
            index = end;
            continue;
        };
        let dollar_prefix = index > 0 && chars[index - 1] == '$';
        let after = skip_spaces(&chars, end);

        let multiplier = match chars.get(after).copied() {
            Some('만') => Some(10_000),
            Some('천') => Some(1_000),
            Some('원') => Some(1),
            _ if dollar_prefix => Some(1),
            _ if starts_with_at(&chars, after, "dollar") || starts_with_at(&chars, after, "달러") => {
                Some(1)
            }
            _ => None,
        };
        // amounts too large for i64 are not amounts we can act on
        if let Some(amount) = multiplier.and_then(|multiplier| value.checked_mul(multiplier)) {
            return Some(Decimal::from(amount));
        }
        index = end;
    }
    None
}

/// `4명`, `4 people`, `up to 4 guests`.
pub fn parse_count(lowered: &str) -> Option<u32> {
    let chars: Vec<char> = lowered.chars().collect();
    let mut index = 0;
    while index < chars.len() {
        if !chars[index].is_ascii_digit() || (index > 0 && chars[index - 1].is_ascii_digit()) {
            index += 1;
            continue;
        }
        let (digits, end) = read_number(&chars, index);
        let after = skip_spaces(&chars, end);
        let is_count = chars.get(after) == Some(&'명')
            || ["people", "guests", "persons", "adults"]
                .iter()
                .any(|word| starts_with_at(&chars, after, word));
        if is_count {
            if let Ok(count) = digits.parse::<u32>() {
                return Some(count);
            }
        }
        index = end;
    }
    None
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;

    use super::{parse_amount, parse_count, parse_time, sentences, RuleBasedExtractor};
    use crate::domain::commitment::{CommitmentTerms, CommitmentTopic, CommitmentType};
    use crate::domain::operational::OcTopic;
    use crate::extraction::{is_verbatim, ExtractionRequest, ExtractionSource};

    fn hm(hour: u32, minute: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(hour, minute, 0)
    }

    #[test]
    fn parses_korean_and_english_times() {
        assert_eq!(parse_time("14시에 입실 가능합니다"), hm(14, 0));
        assert_eq!(parse_time("14시 30분까지"), hm(14, 30));
        assert_eq!(parse_time("오후 2시 반에"), hm(14, 30));
        assert_eq!(parse_time("check-in at 14:30"), hm(14, 30));
        assert_eq!(parse_time("you can arrive at 2pm"), hm(14, 0));
        assert_eq!(parse_time("12 am"), hm(0, 0));
        assert_eq!(parse_time("4명까지 가능합니다"), None);
    }

    #[test]
    fn parses_amounts_and_counts() {
        assert_eq!(parse_amount("3만원입니다"), Some(Decimal::new(30_000, 0)));
        assert_eq!(parse_amount("추가 인원 요금은 20,000원입니다"), Some(Decimal::new(20_000, 0)));
        assert_eq!(parse_amount("the fee is $40"), Some(Decimal::new(40, 0)));
        assert_eq!(parse_amount("4명까지"), None);
        assert_eq!(parse_count("4명까지 가능합니다"), Some(4));
        assert_eq!(parse_count("up to 6 guests"), Some(6));
        assert_eq!(parse_count("14시"), None);
    }

    #[test]
    fn oversized_amount_is_skipped_instead_of_overflowing() {
        assert_eq!(parse_amount("추가 요금은 99999999999999999만원입니다"), None);
        assert_eq!(
            parse_amount("99999999999999999만원 말고 3만원입니다"),
            Some(Decimal::new(30_000, 0))
        );

        // the whole extractor stays total on the same text
        let candidates =
            RuleBasedExtractor::default().extract_commitments("추가 요금은 99999999999999999만원입니다");
        assert!(candidates.iter().all(|candidate| !matches!(
            candidate.terms,
            CommitmentTerms::ExtraFee { amount: Some(_), .. }
        )));
    }

    #[test]
    fn early_checkin_allowance_then_prohibition() {
        let extractor = RuleBasedExtractor::default();

        let allowed = extractor.extract_commitments("14시에 입실 가능합니다");
        assert_eq!(allowed.len(), 1);
        assert_eq!(allowed[0].terms, CommitmentTerms::EarlyCheckin { time: hm(14, 0) });
        assert_eq!(allowed[0].commitment_type, CommitmentType::Allowance);
        assert!((allowed[0].confidence - 0.7).abs() < f64::EPSILON);

        let denied = extractor.extract_commitments("얼리체크인 불가합니다");
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].topic(), CommitmentTopic::EarlyCheckin);
        assert_eq!(denied[0].commitment_type, CommitmentType::Prohibition);
        assert!((denied[0].confidence - 0.65).abs() < f64::EPSILON);

        let impossible = extractor.extract_commitments("얼리체크인은 불가능합니다");
        assert_eq!(impossible[0].commitment_type, CommitmentType::Prohibition);
    }

    #[test]
    fn checkout_after_standard_time_becomes_late_checkout() {
        let extractor = RuleBasedExtractor::default();
        let late = extractor.extract_commitments("퇴실은 13시까지 괜찮습니다");
        assert_eq!(late[0].terms, CommitmentTerms::LateCheckout { time: hm(13, 0) });

        let standard = extractor.extract_commitments("체크아웃은 11시입니다");
        assert_eq!(standard[0].terms, CommitmentTerms::CheckoutTime { time: hm(11, 0) });
        assert_eq!(standard[0].commitment_type, CommitmentType::Condition);
    }

    #[test]
    fn fees_free_items_and_pets() {
        let extractor = RuleBasedExtractor::default();
        let text = "주차는 무료로 이용 가능합니다. 추가 인원 요금은 20,000원입니다. 반려동물은 동반 불가합니다.";
        let candidates = extractor.extract_commitments(text);
        assert_eq!(candidates.len(), 3);

        assert_eq!(candidates[0].terms, CommitmentTerms::FreeProvision { item: Some("주차".to_string()) });
        assert_eq!(candidates[1].commitment_type, CommitmentType::Fee);
        assert!(matches!(
            candidates[1].terms,
            CommitmentTerms::ExtraFee { amount: Some(amount), .. } if amount == Decimal::new(20_000, 0)
        ));
        assert_eq!(candidates[2].terms, CommitmentTerms::PetPolicy { allowed: Some(false) });
        assert!(candidates.iter().all(|candidate| is_verbatim(text, &candidate.provenance_text)));
    }

    #[test]
    fn plain_greetings_yield_nothing() {
        let extractor = RuleBasedExtractor::default();
        assert!(extractor.extract_commitments("감사합니다! 좋은 하루 되세요").is_empty());
        assert!(extractor.extract_operational("감사합니다! 좋은 하루 되세요").is_empty());
        assert!(extractor.extract_commitments("I love the carpet").is_empty());
    }

    #[test]
    fn action_promises_become_oc_candidates_with_date_phrase() {
        let extractor = RuleBasedExtractor::default();
        let candidates =
            extractor.extract_operational("샤워기는 내일 수리해 드리겠습니다. 환불해드리겠습니다.");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].topic, OcTopic::FacilityIssue);
        assert_eq!(candidates[0].target_phrase.as_deref(), Some("내일"));
        assert!(candidates[0].action_promise);
        assert_eq!(candidates[1].topic, OcTopic::Refund);

        let unspecific = extractor.extract_operational("확인해 드리겠습니다");
        assert_eq!(unspecific[0].topic, OcTopic::FollowUp);
    }

    #[test]
    fn full_request_is_tagged_rule_based() {
        let extractor = RuleBasedExtractor::default();
        let request = ExtractionRequest {
            text: "얼리체크인 가능합니다. 14시에 입실 가능합니다.".to_string(),
            conversation_context: None,
            guest_checkin_date: None,
            today: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap_or_default(),
        };
        let extracted = extractor.extract(&request);
        assert_eq!(extracted.source, ExtractionSource::RuleBased);
        assert_eq!(extracted.commitments.len(), 1);
        assert_eq!(extracted.commitments[0].terms, CommitmentTerms::EarlyCheckin { time: hm(14, 0) });
        assert_eq!(sentences(&request.text).count(), 2);
    }
}
