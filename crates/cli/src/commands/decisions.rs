use std::path::Path;

use hostline_core::domain::decision::{DecisionLogId, DraftId, EvidencePackage, HumanAction};

use crate::commands::{execute, invalid_input, read_json_input, CommandResult};

/// Evaluates a reply draft read from `input`. Evaluation never fails outright; internal errors
/// surface as a review decision with an `EVALUATION_FAILED` reason.
pub fn evaluate_draft(input: &Path) -> CommandResult {
    let package: EvidencePackage = match read_json_input(input) {
        Ok(package) => package,
        Err(error) => return invalid_input("evaluate-draft", error),
    };

    execute("evaluate-draft", |engine| async move {
        let result = engine.decisions.evaluate_draft(&package).await;
        let reasons =
            result.reason_codes.iter().map(|code| code.as_str()).collect::<Vec<_>>().join(", ");
        let message = if reasons.is_empty() {
            format!("decision {}", result.decision.as_str())
        } else {
            format!("decision {} ({reasons})", result.decision.as_str())
        };
        Ok((message, result))
    })
}

pub struct HumanActionInput {
    pub decision_log_id: String,
    pub action: HumanAction,
    pub actor: String,
    pub edited_content: Option<String>,
    pub comment: Option<String>,
}

pub fn human_action(input: HumanActionInput) -> CommandResult {
    let log_id = DecisionLogId(input.decision_log_id);

    execute("human-action", |engine| async move {
        let log = engine
            .decisions
            .record_human_action(
                &log_id,
                input.action,
                &input.actor,
                input.edited_content,
                input.comment,
            )
            .await?;
        Ok((format!("{} recorded on {}", input.action.as_str(), log.id.0), log))
    })
}

pub fn mark_sent(decision_log_id: &str, final_content: &str) -> CommandResult {
    let log_id = DecisionLogId(decision_log_id.to_string());
    let final_content = final_content.to_string();

    execute("mark-sent", |engine| async move {
        let log = engine.decisions.record_sent(&log_id, &final_content).await?;
        Ok((format!("decision log {} marked as sent", log.id.0), log))
    })
}

pub fn history(draft_id: &str) -> CommandResult {
    let draft_id = DraftId(draft_id.to_string());

    execute("decision-history", |engine| async move {
        let logs = engine.decisions.history(&draft_id).await?;
        Ok((format!("{} decision log(s) for draft {}", logs.len(), draft_id.0), logs))
    })
}
