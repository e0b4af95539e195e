use std::path::Path;

use hostline_agent::SentMessage;
use hostline_core::domain::commitment::Commitment;
use hostline_core::domain::conversation::ConversationId;
use hostline_core::domain::operational::OperationalCommitment;
use hostline_core::domain::risk::{RiskSignal, RiskSignalId};
use serde::Serialize;

use crate::commands::{execute, invalid_input, read_json_input, CommandResult};

/// Extracts and persists the commitments in a sent host message read from `input`.
pub fn process_sent(input: &Path) -> CommandResult {
    let message: SentMessage = match read_json_input(input) {
        Ok(message) => message,
        Err(error) => return invalid_input("process-sent", error),
    };

    execute("process-sent", |engine| async move {
        let outcome = engine.commitments.process_sent_message(&message).await?;
        let summary = format!(
            "{} commitment(s) via {}, {} superseded, {} risk signal(s), {} operational commitment(s)",
            outcome.commitments.len(),
            outcome.extraction_source.as_str(),
            outcome.superseded.len(),
            outcome.risk_signals.len(),
            outcome.operational_commitments.len()
        );
        Ok((summary, outcome))
    })
}

pub fn expire_conversation(conversation_id: &str) -> CommandResult {
    let conversation_id = ConversationId(conversation_id.to_string());
    execute("expire-conversation", |engine| async move {
        let expired = engine.commitments.expire_conversation(&conversation_id).await?;
        Ok((format!("expired {expired} active commitment(s)"), ExpiredOutput { expired }))
    })
}

pub fn resolve_risk(risk_signal_id: &str, actor: &str) -> CommandResult {
    let id = RiskSignalId(risk_signal_id.to_string());
    let actor = actor.to_string();
    execute("resolve-risk", |engine| async move {
        let signal = engine.commitments.resolve_risk_signal(&id, &actor).await?;
        Ok((format!("risk signal {} resolved by {actor}", signal.id.0), signal))
    })
}

/// Full commitment history plus unresolved risk signals for one conversation.
pub fn show(conversation_id: &str) -> CommandResult {
    let conversation_id = ConversationId(conversation_id.to_string());
    execute("commitments", |engine| async move {
        let commitments = engine.commitments.list_commitments(&conversation_id).await?;
        let risk_signals =
            engine.commitments.unresolved_risk_signals(Some(&conversation_id)).await?;
        let operational = engine.operations.list_by_conversation(&conversation_id).await?;
        let summary = format!(
            "{} commitment(s), {} unresolved risk signal(s)",
            commitments.len(),
            risk_signals.len()
        );
        Ok((summary, ConversationView { commitments, risk_signals, operational }))
    })
}

#[derive(Serialize)]
struct ExpiredOutput {
    expired: u64,
}

#[derive(Serialize)]
struct ConversationView {
    commitments: Vec<Commitment>,
    risk_signals: Vec<RiskSignal>,
    operational: Vec<OperationalCommitment>,
}
