use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use hostline_core::domain::conversation::ConversationId;
use hostline_core::domain::decision::{
    Decision, DecisionLog, DecisionLogId, DraftId, HumanAction, ReasonCode,
};

use super::{
    format_timestamp, parse_json, parse_optional_timestamp, parse_timestamp, to_json,
    RepositoryError,
};

const DECISION_LOG_COLUMNS: &str = "id,
    draft_id,
    conversation_id,
    property_code,
    decision,
    reason_codes_json,
    confidence,
    decision_details_json,
    matched_pattern,
    human_action,
    actor,
    edited_content,
    comment,
    acted_at,
    was_sent,
    final_content,
    sent_at,
    created_at";

pub struct SqlDecisionLogRepository;

impl SqlDecisionLogRepository {
    pub async fn insert(conn: &mut SqliteConnection, log: &DecisionLog) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO decision_log (
                id,
                draft_id,
                conversation_id,
                property_code,
                decision,
                reason_codes_json,
                confidence,
                decision_details_json,
                matched_pattern,
                human_action,
                actor,
                edited_content,
                comment,
                acted_at,
                was_sent,
                final_content,
                sent_at,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&log.id.0)
        .bind(&log.draft_id.0)
        .bind(&log.conversation_id.0)
        .bind(&log.property_code)
        .bind(log.decision.as_str())
        .bind(to_json("reason_codes_json", &log.reason_codes)?)
        .bind(log.confidence)
        .bind(to_json("decision_details_json", &log.decision_details)?)
        .bind(log.matched_pattern.as_deref())
        .bind(log.human_action.as_str())
        .bind(log.actor.as_deref())
        .bind(log.edited_content.as_deref())
        .bind(log.comment.as_deref())
        .bind(log.acted_at.map(format_timestamp))
        .bind(log.was_sent)
        .bind(log.final_content.as_deref())
        .bind(log.sent_at.map(format_timestamp))
        .bind(format_timestamp(log.created_at))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(
        conn: &mut SqliteConnection,
        id: &DecisionLogId,
    ) -> Result<Option<DecisionLog>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {DECISION_LOG_COLUMNS} FROM decision_log WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&mut *conn)
                .await?;

        row.map(log_from_row).transpose()
    }

    /// Most recent log for the draft that is neither sent nor acted on.
    pub async fn find_open_by_draft(
        conn: &mut SqliteConnection,
        draft_id: &DraftId,
    ) -> Result<Option<DecisionLog>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DECISION_LOG_COLUMNS}
             FROM decision_log
             WHERE draft_id = ? AND was_sent = 0 AND human_action = 'pending'
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(&draft_id.0)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(log_from_row).transpose()
    }

    pub async fn list_by_draft(
        conn: &mut SqliteConnection,
        draft_id: &DraftId,
    ) -> Result<Vec<DecisionLog>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DECISION_LOG_COLUMNS}
             FROM decision_log
             WHERE draft_id = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&draft_id.0)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(log_from_row).collect()
    }

    pub async fn list_by_conversation(
        conn: &mut SqliteConnection,
        conversation_id: &ConversationId,
    ) -> Result<Vec<DecisionLog>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DECISION_LOG_COLUMNS}
             FROM decision_log
             WHERE conversation_id = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&conversation_id.0)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(log_from_row).collect()
    }

    /// Persists a human verdict. Only an open row is updated, so a concurrent second verdict
    /// finds nothing to change.
    pub async fn save_human_action(
        conn: &mut SqliteConnection,
        log: &DecisionLog,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE decision_log
             SET human_action = ?, actor = ?, edited_content = ?, comment = ?, acted_at = ?
             WHERE id = ? AND human_action = 'pending' AND was_sent = 0",
        )
        .bind(log.human_action.as_str())
        .bind(log.actor.as_deref())
        .bind(log.edited_content.as_deref())
        .bind(log.comment.as_deref())
        .bind(log.acted_at.map(format_timestamp))
        .bind(&log.id.0)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("open decision log {}", log.id.0)));
        }
        Ok(())
    }

    pub async fn save_sent(conn: &mut SqliteConnection, log: &DecisionLog) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE decision_log
             SET was_sent = 1, final_content = ?, sent_at = ?
             WHERE id = ? AND was_sent = 0",
        )
        .bind(log.final_content.as_deref())
        .bind(log.sent_at.map(format_timestamp))
        .bind(&log.id.0)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("unsent decision log {}", log.id.0)));
        }
        Ok(())
    }
}

fn log_from_row(row: SqliteRow) -> Result<DecisionLog, RepositoryError> {
    let decision_raw = row.try_get::<String, _>("decision")?;
    let decision = Decision::parse(&decision_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown decision `{decision_raw}`")))?;
    let action_raw = row.try_get::<String, _>("human_action")?;
    let human_action = HumanAction::parse(&action_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown human action `{action_raw}`")))?;
    let reason_codes: Vec<ReasonCode> =
        parse_json("reason_codes_json", &row.try_get::<String, _>("reason_codes_json")?)?;

    Ok(DecisionLog {
        id: DecisionLogId(row.try_get("id")?),
        draft_id: DraftId(row.try_get("draft_id")?),
        conversation_id: ConversationId(row.try_get("conversation_id")?),
        property_code: row.try_get("property_code")?,
        decision,
        reason_codes,
        confidence: row.try_get("confidence")?,
        decision_details: parse_json(
            "decision_details_json",
            &row.try_get::<String, _>("decision_details_json")?,
        )?,
        matched_pattern: row.try_get("matched_pattern")?,
        human_action,
        actor: row.try_get("actor")?,
        edited_content: row.try_get("edited_content")?,
        comment: row.try_get("comment")?,
        acted_at: parse_optional_timestamp("acted_at", row.try_get("acted_at")?)?,
        was_sent: row.try_get("was_sent")?,
        final_content: row.try_get("final_content")?,
        sent_at: parse_optional_timestamp("sent_at", row.try_get("sent_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
