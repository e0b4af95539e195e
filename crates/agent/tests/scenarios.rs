use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveTime, Utc};

use hostline_agent::{AgentRuntime, LlmClient, SentMessage};
use hostline_core::config::AppConfig;
use hostline_core::conflict::ConflictType;
use hostline_core::domain::commitment::{CommitmentStatus, CommitmentTerms, CommitmentType};
use hostline_core::domain::conversation::ConversationId;
use hostline_core::domain::decision::{
    AutomationPatternStats, Decision, DraftId, EvidencePackage, OutcomeLabel, QualityLabel,
    ReasonCode, ResponseKind, SafetyLabel,
};
use hostline_core::domain::operational::{OcAction, OcStatus, OcTopic};
use hostline_core::domain::risk::RiskSeverity;
use hostline_core::extraction::ExtractionSource;
use hostline_db::repositories::SqlAutomationStatsRepository;
use hostline_db::{connect, migrations, DbPool};

struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
}

impl ScriptedLlm {
    fn new(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
        let replies = replies
            .into_iter()
            .map(|reply| reply.map(str::to_string).map_err(str::to_string))
            .collect();
        Arc::new(Self { replies: Mutex::new(replies) })
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        let next = self.replies.lock().expect("lock").pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

async fn pool() -> DbPool {
    let pool = connect("sqlite::memory:").await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    pool
}

fn sent(conversation: &str, text: &str) -> SentMessage {
    SentMessage {
        sent_text: text.to_string(),
        conversation_id: ConversationId(conversation.to_string()),
        airbnb_thread_id: format!("thread-{conversation}"),
        property_code: "SEOUL-01".to_string(),
        message_id: None,
        conversation_context: None,
        guest_checkin_date: None,
        guest_checkout_date: None,
    }
}

#[tokio::test]
async fn allowance_then_prohibition_is_a_type_reversal() {
    let pool = pool().await;
    let llm = ScriptedLlm::new(vec![
        Ok(r#"{"commitments": [{"topic": "early_checkin", "type": "allowance", "value": {"time": "14:00"},
              "provenance_text": "14시에 입실 가능합니다", "confidence": 0.92}]}"#),
        // the model is down for the second message; rules take over
        Err("503 service unavailable"),
    ]);
    let runtime = AgentRuntime::new(pool, &AppConfig::default(), Some(llm));

    let first = runtime
        .commitments
        .process_sent_message(&sent("conv-a", "네, 14시에 입실 가능합니다."))
        .await
        .expect("first message");
    assert_eq!(first.extraction_source, ExtractionSource::Model);
    assert_eq!(
        first.commitments[0].terms,
        CommitmentTerms::EarlyCheckin { time: NaiveTime::from_hms_opt(14, 0, 0) }
    );

    let second = runtime
        .commitments
        .process_sent_message(&sent("conv-a", "죄송합니다. 얼리체크인 불가합니다."))
        .await
        .expect("second message");
    assert_eq!(second.extraction_source, ExtractionSource::RuleBased);
    assert_eq!(second.commitments[0].commitment_type, CommitmentType::Prohibition);
    assert_eq!(second.risk_signals.len(), 1);
    assert_eq!(second.risk_signals[0].severity, RiskSeverity::High);
    assert_eq!(second.risk_signals[0].details["conflict_type"], ConflictType::TypeReversal.as_str());

    let history = runtime
        .commitments
        .list_commitments(&ConversationId("conv-a".to_string()))
        .await
        .expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, CommitmentStatus::Superseded);
    assert_eq!(history[0].superseded_by.as_ref(), Some(&history[1].id));
    assert_eq!(history[1].status, CommitmentStatus::Active);
}

#[tokio::test]
async fn refund_draft_for_an_eligible_pattern_requires_edit() {
    let pool = pool().await;
    let config = AppConfig::default();
    let mut stats = AutomationPatternStats::new("SEOUL-01", "refund_policy", Utc::now());
    for _ in 0..12 {
        stats.record(
            hostline_core::domain::decision::HumanAction::ApprovedAsIs,
            &config.decision.eligibility,
            Utc::now(),
        );
    }
    assert!(stats.eligible);
    {
        let mut conn = pool.acquire().await.expect("acquire");
        SqlAutomationStatsRepository::save(&mut conn, &stats).await.expect("save stats");
    }
    let runtime = AgentRuntime::new(pool, &config, None);

    let package = EvidencePackage {
        draft_id: DraftId("draft-refund".to_string()),
        conversation_id: ConversationId("conv-b".to_string()),
        property_code: "SEOUL-01".to_string(),
        draft_content: "환불해드리겠습니다".to_string(),
        guest_message: "예약을 취소하고 싶어요".to_string(),
        outcome_label: Some(OutcomeLabel {
            quality: QualityLabel::Ok,
            safety: SafetyLabel::Safe,
            response_kind: ResponseKind::Answer,
            grounded: true,
            missing_information: false,
            policy_violation: false,
        }),
        answer_key: Some("refund_policy".to_string()),
        active_commitments: Vec::new(),
    };

    let result = runtime.decisions.evaluate_draft(&package).await;
    assert_eq!(result.decision, Decision::RequireEdit);
    assert!(result.reason_codes.contains(&ReasonCode::FinancialMention));
    assert!(!result.warnings.is_empty());

    let again = runtime.decisions.evaluate_draft(&package).await;
    assert_eq!(again.decision_log_id, result.decision_log_id);
}

#[tokio::test]
async fn vague_acknowledgment_depends_on_open_oc_count() {
    let pool = pool().await;
    let runtime = AgentRuntime::new(pool, &AppConfig::default(), None);

    runtime
        .commitments
        .process_sent_message(&sent("conv-one", "온수는 오늘 수리해 드리겠습니다."))
        .await
        .expect("one promise");
    let single = runtime
        .operations
        .process_guest_message("괜찮아요", &ConversationId("conv-one".to_string()))
        .await
        .expect("guest reply");
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].1, OcAction::SuggestedResolve);
    assert_eq!(single[0].0.topic, OcTopic::FacilityIssue);
    assert_eq!(single[0].0.status, OcStatus::SuggestedResolve);
    assert_eq!(single[0].0.evidence_quote.as_deref(), Some("괜찮아요"));

    runtime
        .commitments
        .process_sent_message(&sent(
            "conv-two",
            "내일 수건 더 가져다 드리겠습니다. 온수는 오늘 수리해 드리겠습니다.",
        ))
        .await
        .expect("two promises");
    let several = runtime
        .operations
        .process_guest_message("괜찮아요", &ConversationId("conv-two".to_string()))
        .await
        .expect("guest reply");
    assert!(several.is_empty());

    let board = runtime
        .operations
        .get_staff_notifications(Utc::now().date_naive(), Some("SEOUL-01"))
        .await
        .expect("board");
    assert_eq!(board.len(), 3);
}
