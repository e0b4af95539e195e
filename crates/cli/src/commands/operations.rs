use chrono::NaiveDate;
use hostline_core::domain::conversation::ConversationId;
use hostline_core::domain::operational::{
    OcAction, OperationalCommitment, OperationalCommitmentId, StaffAction,
};
use serde::Serialize;

use crate::commands::{execute, CommandResult};

#[derive(Clone, Copy, Debug)]
pub enum ReplySource {
    Guest,
    Host,
}

#[derive(Serialize)]
struct AppliedAction {
    action: OcAction,
    operational_commitment: OperationalCommitment,
}

/// Feeds a guest reply or host follow-up through reply-based OC resolution.
pub fn reply(source: ReplySource, conversation_id: &str, text: &str) -> CommandResult {
    let command = match source {
        ReplySource::Guest => "guest-message",
        ReplySource::Host => "host-followup",
    };
    let conversation_id = ConversationId(conversation_id.to_string());
    let text = text.to_string();

    execute(command, |engine| async move {
        let applied = match source {
            ReplySource::Guest => {
                engine.operations.process_guest_message(&text, &conversation_id).await?
            }
            ReplySource::Host => {
                engine.operations.process_host_followup(&text, &conversation_id).await?
            }
        };
        let applied = applied
            .into_iter()
            .map(|(operational_commitment, action)| AppliedAction { action, operational_commitment })
            .collect::<Vec<_>>();
        Ok((format!("{} operational commitment(s) changed", applied.len()), applied))
    })
}

pub fn staff_action(action: StaffAction, oc_id: &str, actor: &str) -> CommandResult {
    let oc_id = OperationalCommitmentId(oc_id.to_string());
    let actor = actor.to_string();

    execute("oc", |engine| async move {
        let oc = engine.operations.staff_action(&oc_id, action, &actor).await?;
        let message =
            format!("{} applied to {}; status is now {}", action.as_str(), oc.id.0, oc.status.as_str());
        Ok((message, oc))
    })
}

/// Staff board: active OCs ordered by priority then target date.
pub fn notifications(today: Option<NaiveDate>, property_code: Option<String>) -> CommandResult {
    let today = today.unwrap_or_else(|| chrono::Utc::now().date_naive());

    execute("notifications", |engine| async move {
        let items =
            engine.operations.get_staff_notifications(today, property_code.as_deref()).await?;
        Ok((format!("{} item(s) for {today}", items.len()), items))
    })
}
