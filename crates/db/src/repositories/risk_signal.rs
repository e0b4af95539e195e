use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use hostline_core::domain::commitment::CommitmentId;
use hostline_core::domain::conversation::ConversationId;
use hostline_core::domain::risk::{RiskSeverity, RiskSignal, RiskSignalId, RiskSignalType};

use super::{
    format_timestamp, parse_json, parse_optional_timestamp, parse_timestamp, to_json,
    RepositoryError,
};

const RISK_SIGNAL_COLUMNS: &str = "id,
    conversation_id,
    signal_type,
    severity,
    message,
    related_commitment_id,
    details_json,
    resolved,
    resolved_by,
    resolved_at,
    created_at";

pub struct SqlRiskSignalRepository;

impl SqlRiskSignalRepository {
    pub async fn insert(conn: &mut SqliteConnection, signal: &RiskSignal) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO risk_signal (
                id,
                conversation_id,
                signal_type,
                severity,
                message,
                related_commitment_id,
                details_json,
                resolved,
                resolved_by,
                resolved_at,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&signal.id.0)
        .bind(&signal.conversation_id.0)
        .bind(signal.signal_type.as_str())
        .bind(signal.severity.as_str())
        .bind(&signal.message)
        .bind(signal.related_commitment_id.as_ref().map(|id| id.0.as_str()))
        .bind(to_json("details_json", &signal.details)?)
        .bind(signal.resolved)
        .bind(signal.resolved_by.as_deref())
        .bind(signal.resolved_at.map(format_timestamp))
        .bind(format_timestamp(signal.created_at))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(
        conn: &mut SqliteConnection,
        id: &RiskSignalId,
    ) -> Result<Option<RiskSignal>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RISK_SIGNAL_COLUMNS} FROM risk_signal WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&mut *conn)
            .await?;

        row.map(signal_from_row).transpose()
    }

    pub async fn list_by_conversation(
        conn: &mut SqliteConnection,
        conversation_id: &ConversationId,
    ) -> Result<Vec<RiskSignal>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RISK_SIGNAL_COLUMNS}
             FROM risk_signal
             WHERE conversation_id = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&conversation_id.0)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(signal_from_row).collect()
    }

    pub async fn list_unresolved(
        conn: &mut SqliteConnection,
    ) -> Result<Vec<RiskSignal>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RISK_SIGNAL_COLUMNS}
             FROM risk_signal
             WHERE resolved = 0
             ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(signal_from_row).collect()
    }

    /// Persists the resolution fields of a signal already resolved in memory.
    pub async fn save_resolution(
        conn: &mut SqliteConnection,
        signal: &RiskSignal,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE risk_signal
             SET resolved = ?, resolved_by = ?, resolved_at = ?
             WHERE id = ? AND resolved = 0",
        )
        .bind(signal.resolved)
        .bind(signal.resolved_by.as_deref())
        .bind(signal.resolved_at.map(format_timestamp))
        .bind(&signal.id.0)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("unresolved risk signal {}", signal.id.0)));
        }
        Ok(())
    }
}

fn signal_from_row(row: SqliteRow) -> Result<RiskSignal, RepositoryError> {
    let type_raw = row.try_get::<String, _>("signal_type")?;
    let signal_type = RiskSignalType::parse(&type_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown risk signal type `{type_raw}`")))?;
    let severity_raw = row.try_get::<String, _>("severity")?;
    let severity = RiskSeverity::parse(&severity_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown severity `{severity_raw}`")))?;

    Ok(RiskSignal {
        id: RiskSignalId(row.try_get("id")?),
        conversation_id: ConversationId(row.try_get("conversation_id")?),
        signal_type,
        severity,
        message: row.try_get("message")?,
        related_commitment_id: row
            .try_get::<Option<String>, _>("related_commitment_id")?
            .map(CommitmentId),
        details: parse_json("details_json", &row.try_get::<String, _>("details_json")?)?,
        resolved: row.try_get("resolved")?,
        resolved_by: row.try_get("resolved_by")?,
        resolved_at: parse_optional_timestamp("resolved_at", row.try_get("resolved_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
