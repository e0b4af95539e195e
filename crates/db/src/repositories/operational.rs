use chrono::NaiveDate;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use hostline_core::domain::commitment::CommitmentId;
use hostline_core::domain::conversation::ConversationId;
use hostline_core::domain::operational::{
    GuestStay, OcStatus, OcTopic, OperationalCommitment, OperationalCommitmentId,
    ResolutionReason, TargetTime, TargetTimeType,
};

use super::{format_timestamp, parse_optional_date, parse_timestamp, RepositoryError};

const OC_COLUMNS: &str = "id,
    commitment_id,
    conversation_id,
    property_code,
    topic,
    description,
    is_candidate_only,
    target_time_type,
    target_date,
    guest_checkin_date,
    guest_checkout_date,
    status,
    resolution_reason,
    resolved_by,
    evidence_quote,
    created_at,
    updated_at";

pub struct SqlOperationalRepository;

impl SqlOperationalRepository {
    pub async fn insert(
        conn: &mut SqliteConnection,
        oc: &OperationalCommitment,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO operational_commitment (
                id,
                commitment_id,
                conversation_id,
                property_code,
                topic,
                description,
                is_candidate_only,
                target_time_type,
                target_date,
                guest_checkin_date,
                guest_checkout_date,
                status,
                resolution_reason,
                resolved_by,
                evidence_quote,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&oc.id.0)
        .bind(oc.commitment_id.as_ref().map(|id| id.0.as_str()))
        .bind(&oc.conversation_id.0)
        .bind(&oc.property_code)
        .bind(oc.topic.as_str())
        .bind(&oc.description)
        .bind(oc.is_candidate_only)
        .bind(oc.target.time_type().as_str())
        .bind(oc.target.target_date().map(format_date))
        .bind(oc.stay.checkin_date.map(format_date))
        .bind(oc.stay.checkout_date.map(format_date))
        .bind(oc.status.as_str())
        .bind(oc.resolution_reason.as_ref().map(ResolutionReason::as_str))
        .bind(oc.resolved_by.as_deref())
        .bind(oc.evidence_quote.as_deref())
        .bind(format_timestamp(oc.created_at))
        .bind(format_timestamp(oc.updated_at))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Writes back the mutable state of an OC after a transition.
    pub async fn save_state(
        conn: &mut SqliteConnection,
        oc: &OperationalCommitment,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE operational_commitment
             SET status = ?,
                 is_candidate_only = ?,
                 resolution_reason = ?,
                 resolved_by = ?,
                 evidence_quote = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(oc.status.as_str())
        .bind(oc.is_candidate_only)
        .bind(oc.resolution_reason.as_ref().map(ResolutionReason::as_str))
        .bind(oc.resolved_by.as_deref())
        .bind(oc.evidence_quote.as_deref())
        .bind(format_timestamp(oc.updated_at))
        .bind(&oc.id.0)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("operational commitment {}", oc.id.0)));
        }
        Ok(())
    }

    pub async fn find_by_id(
        conn: &mut SqliteConnection,
        id: &OperationalCommitmentId,
    ) -> Result<Option<OperationalCommitment>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {OC_COLUMNS} FROM operational_commitment WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(oc_from_row).transpose()
    }

    pub async fn get_active_by_conversation(
        conn: &mut SqliteConnection,
        conversation_id: &ConversationId,
    ) -> Result<Vec<OperationalCommitment>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {OC_COLUMNS}
             FROM operational_commitment
             WHERE conversation_id = ? AND status IN ('pending', 'suggested_resolve')
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&conversation_id.0)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(oc_from_row).collect()
    }

    pub async fn get_active_by_topic(
        conn: &mut SqliteConnection,
        conversation_id: &ConversationId,
        topic: OcTopic,
    ) -> Result<Option<OperationalCommitment>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {OC_COLUMNS}
             FROM operational_commitment
             WHERE conversation_id = ? AND topic = ? AND status IN ('pending', 'suggested_resolve')
             LIMIT 1"
        ))
        .bind(&conversation_id.0)
        .bind(topic.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        row.map(oc_from_row).transpose()
    }

    /// Active OCs across conversations, optionally for one property. Ordering for staff is
    /// applied by the caller because it depends on `today`.
    pub async fn list_active(
        conn: &mut SqliteConnection,
        property_code: Option<&str>,
    ) -> Result<Vec<OperationalCommitment>, RepositoryError> {
        let rows = if let Some(property_code) = property_code {
            sqlx::query(&format!(
                "SELECT {OC_COLUMNS}
                 FROM operational_commitment
                 WHERE status IN ('pending', 'suggested_resolve') AND property_code = ?
                 ORDER BY created_at ASC, id ASC"
            ))
            .bind(property_code)
            .fetch_all(&mut *conn)
            .await?
        } else {
            sqlx::query(&format!(
                "SELECT {OC_COLUMNS}
                 FROM operational_commitment
                 WHERE status IN ('pending', 'suggested_resolve')
                 ORDER BY created_at ASC, id ASC"
            ))
            .fetch_all(&mut *conn)
            .await?
        };

        rows.into_iter().map(oc_from_row).collect()
    }

    pub async fn list_by_conversation(
        conn: &mut SqliteConnection,
        conversation_id: &ConversationId,
    ) -> Result<Vec<OperationalCommitment>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {OC_COLUMNS}
             FROM operational_commitment
             WHERE conversation_id = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&conversation_id.0)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(oc_from_row).collect()
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn oc_from_row(row: SqliteRow) -> Result<OperationalCommitment, RepositoryError> {
    let topic_raw = row.try_get::<String, _>("topic")?;
    let topic = OcTopic::parse(&topic_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown oc topic `{topic_raw}`")))?;
    let status_raw = row.try_get::<String, _>("status")?;
    let status = OcStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown oc status `{status_raw}`")))?;
    let resolution_reason = row
        .try_get::<Option<String>, _>("resolution_reason")?
        .map(|value| {
            ResolutionReason::parse(&value).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown resolution reason `{value}`"))
            })
        })
        .transpose()?;

    let time_type_raw = row.try_get::<String, _>("target_time_type")?;
    let time_type = TargetTimeType::parse(&time_type_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown target time type `{time_type_raw}`"))
    })?;
    let target_date = parse_optional_date("target_date", row.try_get("target_date")?)?;
    let target = match (time_type, target_date) {
        (TargetTimeType::Explicit, Some(target_date)) => TargetTime::Explicit { target_date },
        (TargetTimeType::Implicit, None) => TargetTime::Implicit,
        (time_type, date) => {
            return Err(RepositoryError::Decode(format!(
                "target_time_type `{}` inconsistent with target_date {date:?}",
                time_type.as_str()
            )))
        }
    };

    Ok(OperationalCommitment {
        id: OperationalCommitmentId(row.try_get("id")?),
        commitment_id: row.try_get::<Option<String>, _>("commitment_id")?.map(CommitmentId),
        conversation_id: ConversationId(row.try_get("conversation_id")?),
        property_code: row.try_get("property_code")?,
        topic,
        description: row.try_get("description")?,
        is_candidate_only: row.try_get("is_candidate_only")?,
        target,
        stay: GuestStay::new(
            parse_optional_date("guest_checkin_date", row.try_get("guest_checkin_date")?)?,
            parse_optional_date("guest_checkout_date", row.try_get("guest_checkout_date")?)?,
        ),
        status,
        resolution_reason,
        resolved_by: row.try_get("resolved_by")?,
        evidence_quote: row.try_get("evidence_quote")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
