//! Two-stage candidate extraction: a language-model stage bounded by a timeout, composed with
//! the pure rule-based extractor as fallback.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use hostline_core::config::ExtractionConfig;
use hostline_core::domain::commitment::{CommitmentCandidate, CommitmentTerms, CommitmentTopic};
use hostline_core::domain::operational::OcCandidate;
use hostline_core::extraction::rules::{parse_amount, parse_count, parse_time};
use hostline_core::extraction::{
    clamp_confidence, coerce_commitment_type, coerce_oc_topic, coerce_topic, is_verbatim,
    ExtractedCandidates, ExtractionError, ExtractionRequest, ExtractionSource, RuleBasedExtractor,
};

use crate::llm::LlmClient;

const PROMPT_HEADER: &str = "You extract host commitments from a short-term rental message.
Return only a JSON object of the form
{\"commitments\": [{\"topic\": str, \"type\": str, \"value\": object, \"provenance_text\": str, \"confidence\": number}],
 \"operational\": [{\"topic\": str, \"action_promise\": bool, \"description\": str, \"target_date\": \"YYYY-MM-DD\" | null, \"target_phrase\": str | null, \"evidence_quote\": str, \"confidence\": number}]}
Commitment topics: early_checkin, late_checkout, checkin_time, checkout_time, guest_count_change, free_provision, extra_fee, reservation_change, pet_policy, special_request, other.
Commitment types: allowance, prohibition, fee, change, condition.
Value keys by topic: time (\"HH:MM\"), count, item, amount, description, allowed.
Operational topics: early_checkin, late_checkout, amenity, facility_issue, follow_up, reservation_change, special_request, refund, payment, compensation.
provenance_text and evidence_quote must be copied verbatim from the message.";

/// Candidates stay raw here so one malformed entry cannot sink the others.
#[derive(Debug, Default, Deserialize)]
struct ModelOutput {
    #[serde(default)]
    commitments: Vec<Value>,
    #[serde(default)]
    operational: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ModelCommitment {
    topic: String,
    #[serde(rename = "type", default)]
    commitment_type: String,
    #[serde(default)]
    value: ModelValue,
    #[serde(default)]
    provenance_text: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Default, Deserialize)]
struct ModelValue {
    time: Option<String>,
    count: Option<Value>,
    item: Option<String>,
    amount: Option<Value>,
    description: Option<String>,
    allowed: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ModelOc {
    topic: String,
    #[serde(default)]
    action_promise: bool,
    #[serde(default)]
    description: String,
    target_date: Option<String>,
    target_phrase: Option<String>,
    #[serde(default)]
    evidence_quote: String,
    #[serde(default)]
    confidence: f64,
}

pub struct ModelExtractor {
    client: Arc<dyn LlmClient>,
}

impl ModelExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    pub async fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> Result<ExtractedCandidates, ExtractionError> {
        let raw = self
            .client
            .complete(&build_prompt(request))
            .await
            .map_err(|error| ExtractionError::Client(error.to_string()))?;
        parse_model_output(&raw, &request.text)
    }
}

pub fn build_prompt(request: &ExtractionRequest) -> String {
    let mut prompt = format!("{PROMPT_HEADER}\nToday: {}\n", request.today);
    if let Some(checkin) = request.guest_checkin_date {
        prompt.push_str(&format!("Guest check-in date: {checkin}\n"));
    }
    if let Some(context) = request.conversation_context.as_deref() {
        prompt.push_str(&format!("Conversation so far:\n{context}\n"));
    }
    prompt.push_str(&format!("Message:\n{}\n", request.text));
    prompt
}

/// Parses model output and applies coercion and provenance checks. Candidates whose quote does
/// not appear verbatim in `source_text` are dropped.
pub fn parse_model_output(
    raw: &str,
    source_text: &str,
) -> Result<ExtractedCandidates, ExtractionError> {
    let json = json_object_span(raw)
        .ok_or_else(|| ExtractionError::Parse("no JSON object in model output".to_string()))?;
    let output: ModelOutput =
        serde_json::from_str(json).map_err(|error| ExtractionError::Parse(error.to_string()))?;

    let mut candidates = ExtractedCandidates::empty(ExtractionSource::Model);

    for raw in decode_each::<ModelCommitment>("commitment", output.commitments) {
        if !is_verbatim(source_text, &raw.provenance_text) {
            warn!(
                event_name = "extraction.candidate.rejected",
                kind = "commitment",
                topic = %raw.topic,
                provenance = %raw.provenance_text,
                "provenance is not a verbatim quote of the message"
            );
            continue;
        }
        let topic = coerce_topic(&raw.topic);
        candidates.commitments.push(CommitmentCandidate {
            terms: terms_from_value(topic, raw.value),
            commitment_type: coerce_commitment_type(&raw.commitment_type),
            provenance_text: raw.provenance_text.trim().to_string(),
            confidence: clamp_confidence(raw.confidence),
        });
    }

    for raw in decode_each::<ModelOc>("operational", output.operational) {
        if !is_verbatim(source_text, &raw.evidence_quote) {
            warn!(
                event_name = "extraction.candidate.rejected",
                kind = "operational",
                topic = %raw.topic,
                evidence = %raw.evidence_quote,
                "evidence is not a verbatim quote of the message"
            );
            continue;
        }
        candidates.operational.push(OcCandidate {
            topic: coerce_oc_topic(&raw.topic),
            action_promise: raw.action_promise,
            description: raw.description,
            target_date: raw
                .target_date
                .as_deref()
                .and_then(|value| NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()),
            target_phrase: raw.target_phrase.filter(|phrase| !phrase.trim().is_empty()),
            evidence_quote: raw.evidence_quote.trim().to_string(),
            confidence: clamp_confidence(raw.confidence),
        });
    }

    Ok(candidates)
}

/// Entries that do not fit the expected shape are logged and skipped.
fn decode_each<T: DeserializeOwned>(kind: &'static str, entries: Vec<Value>) -> Vec<T> {
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(candidate) => Some(candidate),
            Err(error) => {
                warn!(
                    event_name = "extraction.candidate.invalid",
                    kind,
                    error = %error,
                    "model candidate failed validation"
                );
                None
            }
        })
        .collect()
}

/// Models like to wrap JSON in prose or code fences.
fn json_object_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

fn terms_from_value(topic: CommitmentTopic, value: ModelValue) -> CommitmentTerms {
    let time = value.time.as_deref().and_then(model_time);
    match topic {
        CommitmentTopic::EarlyCheckin => CommitmentTerms::EarlyCheckin { time },
        CommitmentTopic::LateCheckout => CommitmentTerms::LateCheckout { time },
        CommitmentTopic::CheckinTime => CommitmentTerms::CheckinTime { time },
        CommitmentTopic::CheckoutTime => CommitmentTerms::CheckoutTime { time },
        CommitmentTopic::GuestCountChange => {
            CommitmentTerms::GuestCountChange { count: value.count.as_ref().and_then(model_count) }
        }
        CommitmentTopic::FreeProvision => {
            CommitmentTerms::FreeProvision { item: value.item.or(value.description) }
        }
        CommitmentTopic::ExtraFee => CommitmentTerms::ExtraFee {
            amount: value.amount.as_ref().and_then(model_amount),
            description: value.description.or(value.item),
        },
        CommitmentTopic::ReservationChange => {
            CommitmentTerms::ReservationChange { description: value.description }
        }
        CommitmentTopic::PetPolicy => CommitmentTerms::PetPolicy { allowed: value.allowed },
        CommitmentTopic::SpecialRequest => {
            CommitmentTerms::SpecialRequest { description: value.description.or(value.item) }
        }
        CommitmentTopic::Other => CommitmentTerms::Other { description: value.description },
    }
}

fn model_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .ok()
        .or_else(|| parse_time(&trimmed.to_lowercase()))
}

fn model_count(raw: &Value) -> Option<u32> {
    match raw {
        Value::Number(number) => number.as_u64().and_then(|count| u32::try_from(count).ok()),
        Value::String(text) => {
            text.trim().parse().ok().or_else(|| parse_count(&text.to_lowercase()))
        }
        _ => None,
    }
}

fn model_amount(raw: &Value) -> Option<Decimal> {
    match raw {
        Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        Value::String(text) => Decimal::from_str(text.trim().replace(',', "").as_str())
            .ok()
            .or_else(|| parse_amount(&text.to_lowercase())),
        _ => None,
    }
}

/// Model stage first, rule stage on any failure. Never fails.
pub struct ExtractionPipeline {
    model: Option<ModelExtractor>,
    rules: RuleBasedExtractor,
    timeout: Duration,
    confidence_threshold: f64,
}

impl ExtractionPipeline {
    pub fn new(model: Option<ModelExtractor>, config: &ExtractionConfig) -> Self {
        Self {
            model,
            rules: RuleBasedExtractor::from_config(config),
            timeout: Duration::from_secs(config.timeout_secs),
            confidence_threshold: config.confidence_threshold,
        }
    }

    pub fn rules_only(config: &ExtractionConfig) -> Self {
        Self::new(None, config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rules(&self) -> &RuleBasedExtractor {
        &self.rules
    }

    /// Candidates under the confidence threshold are dropped.
    pub async fn extract(&self, request: &ExtractionRequest) -> ExtractedCandidates {
        let mut candidates = self
            .model_stage(request)
            .await
            .unwrap_or_else(|error| self.rule_stage(request, &error));
        candidates.retain_confident(self.confidence_threshold);

        info!(
            event_name = "extraction.completed",
            source = candidates.source.as_str(),
            commitments = candidates.commitments.len(),
            operational = candidates.operational.len(),
            "candidate extraction completed"
        );
        candidates
    }

    async fn model_stage(
        &self,
        request: &ExtractionRequest,
    ) -> Result<ExtractedCandidates, ExtractionError> {
        let model = self.model.as_ref().ok_or(ExtractionError::Disabled)?;
        let candidates = tokio::time::timeout(self.timeout, model.extract(request))
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout.as_secs()))??;
        if candidates.is_empty() {
            return Err(ExtractionError::Empty);
        }
        Ok(candidates)
    }

    fn rule_stage(&self, request: &ExtractionRequest, error: &ExtractionError) -> ExtractedCandidates {
        match error {
            ExtractionError::Disabled => {
                debug!(event_name = "extraction.model.skipped", "model extraction disabled")
            }
            other => warn!(
                event_name = "extraction.model.fallback",
                error_kind = other.kind(),
                error = %other,
                "model extraction failed, using rule-based extractor"
            ),
        }
        self.rules.extract(request)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;

    use hostline_core::config::AppConfig;
    use hostline_core::domain::commitment::{CommitmentTerms, CommitmentType};
    use hostline_core::domain::operational::OcTopic;
    use hostline_core::extraction::{ExtractionError, ExtractionRequest, ExtractionSource};

    use super::{parse_model_output, ExtractionPipeline, ModelExtractor};
    use crate::llm::LlmClient;

    enum Reply {
        Text(&'static str),
        Fail(&'static str),
        Hang,
    }

    struct ScriptedLlm {
        replies: Mutex<VecDeque<Reply>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies.into()) })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            let reply = self.replies.lock().expect("lock").pop_front();
            match reply {
                Some(Reply::Text(text)) => Ok(text.to_string()),
                Some(Reply::Fail(message)) => Err(anyhow!(message)),
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok("{}".to_string())
                }
                None => Err(anyhow!("script exhausted")),
            }
        }
    }

    fn request(text: &str) -> ExtractionRequest {
        ExtractionRequest {
            text: text.to_string(),
            conversation_context: None,
            guest_checkin_date: None,
            today: NaiveDate::from_ymd_opt(2026, 10, 18).expect("date"),
        }
    }

    fn pipeline(replies: Vec<Reply>) -> ExtractionPipeline {
        let config = AppConfig::default().extraction;
        ExtractionPipeline::new(Some(ModelExtractor::new(ScriptedLlm::new(replies))), &config)
            .with_timeout(Duration::from_millis(50))
    }

    #[test]
    fn model_output_is_coerced_and_provenance_checked() {
        let text = "14시에 입실 가능합니다. 추가 인원은 2만원입니다.";
        let raw = r#"```json
        {"commitments": [
            {"topic": "Early-Check-In", "type": "permitted", "value": {"time": "14:00"},
             "provenance_text": "14시에 입실 가능합니다", "confidence": 1.4},
            {"topic": "surcharge", "type": "fee", "value": {"amount": "20,000"},
             "provenance_text": "추가 인원은 2만원입니다", "confidence": 0.8},
            {"topic": "pet_policy", "type": "prohibition", "value": {},
             "provenance_text": "반려동물은 안 됩니다", "confidence": 0.9}
        ],
        "operational": [
            {"topic": "maintenance", "action_promise": true, "description": "x",
             "evidence_quote": "not in the message", "confidence": 0.9}
        ]}
        ```"#;

        let parsed = parse_model_output(raw, text).expect("parse");
        assert_eq!(parsed.source, ExtractionSource::Model);
        assert_eq!(parsed.commitments.len(), 2, "pet candidate quotes text that is not there");
        assert!(parsed.operational.is_empty());

        let early = &parsed.commitments[0];
        assert_eq!(early.terms, CommitmentTerms::EarlyCheckin { time: NaiveTime::from_hms_opt(14, 0, 0) });
        assert_eq!(early.commitment_type, CommitmentType::Allowance);
        assert_eq!(early.confidence, 1.0);

        let fee = &parsed.commitments[1];
        assert_eq!(
            fee.terms,
            CommitmentTerms::ExtraFee { amount: Some(Decimal::from(20_000)), description: None }
        );
    }

    #[test]
    fn one_malformed_candidate_does_not_discard_the_rest() {
        let text = "성인 2명으로 변경해 드렸습니다. 14시에 입실 가능합니다. 수건은 무료로 드립니다.";
        let raw = r#"{"commitments": [
            {"topic": "guest_count_change", "type": "change", "value": {"count": "2"},
             "provenance_text": "성인 2명으로 변경해 드렸습니다", "confidence": 0.9},
            {"topic": "early_checkin", "type": "allowance", "value": {"time": "14:00"},
             "provenance_text": "14시에 입실 가능합니다", "confidence": "high"},
            {"topic": "free_provision", "type": "allowance", "value": {"item": "수건"},
             "provenance_text": "수건은 무료로 드립니다", "confidence": 0.8}
        ],
        "operational": [
            {"topic": "amenity", "action_promise": "yes", "evidence_quote": "수건은 무료로 드립니다"},
            {"topic": "amenity", "action_promise": true, "description": "수건 제공",
             "evidence_quote": "수건은 무료로 드립니다", "confidence": 0.8}
        ]}"#;

        let parsed = parse_model_output(raw, text).expect("parse");
        assert_eq!(parsed.commitments.len(), 2);
        assert_eq!(parsed.commitments[0].terms, CommitmentTerms::GuestCountChange { count: Some(2) });
        assert_eq!(
            parsed.commitments[1].terms,
            CommitmentTerms::FreeProvision { item: Some("수건".to_string()) }
        );
        assert_eq!(parsed.operational.len(), 1);
        assert_eq!(parsed.operational[0].topic, OcTopic::Amenity);
    }

    #[test]
    fn unparseable_output_is_a_parse_error() {
        assert!(matches!(
            parse_model_output("I cannot help with that", "text"),
            Err(ExtractionError::Parse(_))
        ));
        assert!(matches!(
            parse_model_output("{\"commitments\": 3}", "text"),
            Err(ExtractionError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn model_candidates_are_used_when_valid() {
        let text = "내일 수건 더 가져다 드리겠습니다.";
        let pipeline = pipeline(vec![Reply::Text(
            r#"{"operational": [{"topic": "amenity", "action_promise": true, "description": "extra towels",
                "target_phrase": "내일", "evidence_quote": "내일 수건 더 가져다 드리겠습니다", "confidence": 0.9}]}"#,
        )]);

        let candidates = pipeline.extract(&request(text)).await;
        assert_eq!(candidates.source, ExtractionSource::Model);
        assert_eq!(candidates.operational.len(), 1);
        assert_eq!(candidates.operational[0].topic, OcTopic::Amenity);
    }

    #[tokio::test]
    async fn failures_fall_back_to_rules() {
        let text = "14시에 입실 가능합니다.";
        for reply in [
            Reply::Fail("connection refused"),
            Reply::Text("not json"),
            Reply::Text("{\"commitments\": [], \"operational\": []}"),
            Reply::Hang,
        ] {
            let candidates = pipeline(vec![reply]).extract(&request(text)).await;
            assert_eq!(candidates.source, ExtractionSource::RuleBased);
            assert_eq!(candidates.commitments.len(), 1);
            assert_eq!(
                candidates.commitments[0].terms,
                CommitmentTerms::EarlyCheckin { time: NaiveTime::from_hms_opt(14, 0, 0) }
            );
        }
    }

    #[tokio::test]
    async fn low_confidence_model_candidates_are_dropped() {
        let text = "체크아웃은 12시까지 괜찮습니다.";
        let pipeline = pipeline(vec![Reply::Text(
            r#"{"commitments": [{"topic": "late_checkout", "type": "allowance", "value": {"time": "12:00"},
                "provenance_text": "체크아웃은 12시까지 괜찮습니다", "confidence": 0.3}]}"#,
        )]);

        let candidates = pipeline.extract(&request(text)).await;
        assert_eq!(candidates.source, ExtractionSource::Model);
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn disabled_model_uses_rules_directly() {
        let config = AppConfig::default().extraction;
        let candidates = ExtractionPipeline::rules_only(&config)
            .extract(&request("얼리체크인은 불가합니다."))
            .await;
        assert_eq!(candidates.source, ExtractionSource::RuleBased);
        assert_eq!(candidates.commitments[0].commitment_type, CommitmentType::Prohibition);
    }
}
