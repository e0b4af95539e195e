use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use hostline_core::domain::commitment::{
    Commitment, CommitmentCandidate, CommitmentId, CommitmentStatus, CommitmentTerms,
    CommitmentTopic, CommitmentType,
};
use hostline_core::domain::conversation::ConversationId;

use super::{format_timestamp, parse_json, parse_timestamp, to_json, RepositoryError};

const COMMITMENT_COLUMNS: &str = "id,
    conversation_id,
    airbnb_thread_id,
    property_code,
    provenance_message_id,
    topic,
    terms_json,
    commitment_type,
    status,
    provenance_text,
    extraction_confidence,
    superseded_by,
    created_at,
    updated_at";

/// Where a commitment was promised.
#[derive(Clone, Debug)]
pub struct CommitmentOrigin<'a> {
    pub conversation_id: &'a ConversationId,
    pub airbnb_thread_id: &'a str,
    pub property_code: &'a str,
    pub provenance_message_id: Option<&'a str>,
}

pub struct SqlCommitmentRepository;

impl SqlCommitmentRepository {
    /// Inserts a new active commitment. `id` is chosen by the caller so an older row can point
    /// at it before the insert happens.
    pub async fn create(
        conn: &mut SqliteConnection,
        id: CommitmentId,
        candidate: &CommitmentCandidate,
        origin: &CommitmentOrigin<'_>,
        at: DateTime<Utc>,
    ) -> Result<Commitment, RepositoryError> {
        let commitment = Commitment {
            id,
            conversation_id: origin.conversation_id.clone(),
            airbnb_thread_id: origin.airbnb_thread_id.to_string(),
            property_code: origin.property_code.to_string(),
            provenance_message_id: origin.provenance_message_id.map(str::to_string),
            terms: candidate.terms.clone(),
            commitment_type: candidate.commitment_type,
            status: CommitmentStatus::Active,
            provenance_text: candidate.provenance_text.clone(),
            extraction_confidence: candidate.confidence.clamp(0.0, 1.0),
            superseded_by: None,
            created_at: at,
            updated_at: at,
        };
        Self::insert(conn, &commitment).await?;
        Ok(commitment)
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        commitment: &Commitment,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO commitment (
                id,
                conversation_id,
                airbnb_thread_id,
                property_code,
                provenance_message_id,
                topic,
                terms_json,
                commitment_type,
                status,
                provenance_text,
                extraction_confidence,
                superseded_by,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&commitment.id.0)
        .bind(&commitment.conversation_id.0)
        .bind(&commitment.airbnb_thread_id)
        .bind(&commitment.property_code)
        .bind(commitment.provenance_message_id.as_deref())
        .bind(commitment.topic().as_str())
        .bind(to_json("terms_json", &commitment.terms)?)
        .bind(commitment.commitment_type.as_str())
        .bind(commitment.status.as_str())
        .bind(&commitment.provenance_text)
        .bind(commitment.extraction_confidence)
        .bind(commitment.superseded_by.as_ref().map(|id| id.0.as_str()))
        .bind(format_timestamp(commitment.created_at))
        .bind(format_timestamp(commitment.updated_at))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(
        conn: &mut SqliteConnection,
        id: &CommitmentId,
    ) -> Result<Option<Commitment>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COMMITMENT_COLUMNS} FROM commitment WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&mut *conn)
            .await?;

        row.map(commitment_from_row).transpose()
    }

    pub async fn get_active(
        conn: &mut SqliteConnection,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Commitment>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMITMENT_COLUMNS}
             FROM commitment
             WHERE conversation_id = ? AND status = 'active'
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&conversation_id.0)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(commitment_from_row).collect()
    }

    pub async fn get_active_by_topic(
        conn: &mut SqliteConnection,
        conversation_id: &ConversationId,
        topic: CommitmentTopic,
    ) -> Result<Option<Commitment>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {COMMITMENT_COLUMNS}
             FROM commitment
             WHERE conversation_id = ? AND topic = ? AND status = 'active'
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(&conversation_id.0)
        .bind(topic.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        row.map(commitment_from_row).transpose()
    }

    /// Every commitment of the conversation regardless of status, oldest first.
    pub async fn list_by_conversation(
        conn: &mut SqliteConnection,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Commitment>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMITMENT_COLUMNS}
             FROM commitment
             WHERE conversation_id = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&conversation_id.0)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(commitment_from_row).collect()
    }

    /// Marks an active commitment as superseded by `new_id`. The new row may be inserted later
    /// in the same transaction because the foreign key is deferred.
    pub async fn supersede(
        conn: &mut SqliteConnection,
        old_id: &CommitmentId,
        new_id: &CommitmentId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE commitment
             SET status = 'superseded', superseded_by = ?, updated_at = ?
             WHERE id = ? AND status = 'active'",
        )
        .bind(&new_id.0)
        .bind(format_timestamp(at))
        .bind(&old_id.0)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("active commitment {}", old_id.0)));
        }
        Ok(())
    }

    pub async fn expire_by_conversation(
        conn: &mut SqliteConnection,
        conversation_id: &ConversationId,
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE commitment
             SET status = 'expired', updated_at = ?
             WHERE conversation_id = ? AND status = 'active'",
        )
        .bind(format_timestamp(at))
        .bind(&conversation_id.0)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }
}

fn commitment_from_row(row: SqliteRow) -> Result<Commitment, RepositoryError> {
    let topic_raw = row.try_get::<String, _>("topic")?;
    let terms: CommitmentTerms = parse_json("terms_json", &row.try_get::<String, _>("terms_json")?)?;
    if terms.topic().as_str() != topic_raw {
        return Err(RepositoryError::Decode(format!(
            "commitment topic `{topic_raw}` does not match terms topic `{}`",
            terms.topic().as_str()
        )));
    }

    let type_raw = row.try_get::<String, _>("commitment_type")?;
    let commitment_type = CommitmentType::parse(&type_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown commitment type `{type_raw}`"))
    })?;
    let status_raw = row.try_get::<String, _>("status")?;
    let status = CommitmentStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown commitment status `{status_raw}`"))
    })?;

    Ok(Commitment {
        id: CommitmentId(row.try_get("id")?),
        conversation_id: ConversationId(row.try_get("conversation_id")?),
        airbnb_thread_id: row.try_get("airbnb_thread_id")?,
        property_code: row.try_get("property_code")?,
        provenance_message_id: row.try_get("provenance_message_id")?,
        terms,
        commitment_type,
        status,
        provenance_text: row.try_get("provenance_text")?,
        extraction_confidence: row.try_get("extraction_confidence")?,
        superseded_by: row.try_get::<Option<String>, _>("superseded_by")?.map(CommitmentId),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::NaiveTime;
    use rust_decimal::Decimal;

    use hostline_core::domain::commitment::{
        CommitmentCandidate, CommitmentId, CommitmentStatus, CommitmentTerms, CommitmentTopic,
        CommitmentType,
    };
    use hostline_core::domain::conversation::ConversationId;

    use super::{CommitmentOrigin, SqlCommitmentRepository};
    use crate::repositories::test_support::{parse_ts, setup_pool};
    use crate::repositories::RepositoryError;
    use crate::UnitOfWork;

    fn early_checkin(hour: u32, commitment_type: CommitmentType) -> CommitmentCandidate {
        CommitmentCandidate {
            terms: CommitmentTerms::EarlyCheckin { time: NaiveTime::from_hms_opt(hour, 0, 0) },
            commitment_type,
            provenance_text: format!("{hour}시에 입실 가능합니다"),
            confidence: 0.7,
        }
    }

    fn origin(conversation_id: &ConversationId) -> CommitmentOrigin<'_> {
        CommitmentOrigin {
            conversation_id,
            airbnb_thread_id: "thread-1",
            property_code: "SEOUL-01",
            provenance_message_id: Some("msg-1"),
        }
    }

    #[tokio::test]
    async fn create_and_read_back_typed_terms() {
        let pool = setup_pool().await;
        let conversation = ConversationId("conv-1".to_string());
        let mut conn = pool.acquire().await.expect("acquire");

        let fee = CommitmentCandidate {
            terms: CommitmentTerms::ExtraFee {
                amount: Some(Decimal::new(30_000, 0)),
                description: Some("추가 인원".to_string()),
            },
            commitment_type: CommitmentType::Fee,
            provenance_text: "추가 인원은 3만원입니다".to_string(),
            confidence: 0.7,
        };
        let created = SqlCommitmentRepository::create(
            &mut conn,
            CommitmentId("c-fee".to_string()),
            &fee,
            &origin(&conversation),
            parse_ts("2026-10-18T09:00:00Z"),
        )
        .await
        .expect("create");

        let found = SqlCommitmentRepository::find_by_id(&mut conn, &created.id)
            .await
            .expect("find")
            .expect("present");
        assert_eq!(found, created);

        let by_topic =
            SqlCommitmentRepository::get_active_by_topic(&mut conn, &conversation, CommitmentTopic::ExtraFee)
                .await
                .expect("by topic");
        assert_eq!(by_topic.map(|c| c.id), Some(created.id));
    }

    #[tokio::test]
    async fn second_active_commitment_for_a_topic_is_rejected() {
        let pool = setup_pool().await;
        let conversation = ConversationId("conv-1".to_string());
        let mut conn = pool.acquire().await.expect("acquire");
        let at = parse_ts("2026-10-18T09:00:00Z");

        SqlCommitmentRepository::create(
            &mut conn,
            CommitmentId("c-1".to_string()),
            &early_checkin(14, CommitmentType::Allowance),
            &origin(&conversation),
            at,
        )
        .await
        .expect("first");

        let duplicate = SqlCommitmentRepository::create(
            &mut conn,
            CommitmentId("c-2".to_string()),
            &early_checkin(13, CommitmentType::Allowance),
            &origin(&conversation),
            at,
        )
        .await;
        assert!(matches!(duplicate, Err(RepositoryError::Conflict(_))));

        let other_conversation = ConversationId("conv-2".to_string());
        SqlCommitmentRepository::create(
            &mut conn,
            CommitmentId("c-3".to_string()),
            &early_checkin(13, CommitmentType::Allowance),
            &origin(&other_conversation),
            at,
        )
        .await
        .expect("other conversation is independent");
    }

    #[tokio::test]
    async fn supersede_chain_is_linear_and_ends_at_the_active_row() {
        let pool = setup_pool().await;
        let conversation = ConversationId("conv-1".to_string());

        let ids = ["c-1", "c-2", "c-3"];
        for (index, id) in ids.iter().enumerate() {
            let mut uow = UnitOfWork::begin(&pool).await.expect("begin");
            let new_id = CommitmentId(id.to_string());
            let at = parse_ts(&format!("2026-10-18T09:0{index}:00Z"));
            if let Some(old) = SqlCommitmentRepository::get_active_by_topic(
                uow.conn(),
                &conversation,
                CommitmentTopic::EarlyCheckin,
            )
            .await
            .expect("lookup")
            {
                SqlCommitmentRepository::supersede(uow.conn(), &old.id, &new_id, at)
                    .await
                    .expect("supersede before insert");
            }
            SqlCommitmentRepository::create(
                uow.conn(),
                new_id,
                &early_checkin(12 + index as u32, CommitmentType::Allowance),
                &origin(&conversation),
                at,
            )
            .await
            .expect("create");
            uow.commit().await.expect("commit");
        }

        let mut conn = pool.acquire().await.expect("acquire");
        let all = SqlCommitmentRepository::list_by_conversation(&mut conn, &conversation)
            .await
            .expect("list");
        assert_eq!(all.len(), 3);
        assert_eq!(all.iter().filter(|c| c.is_active()).count(), 1);

        let mut cursor = all[0].clone();
        let mut seen = HashSet::new();
        while let Some(next) = cursor.superseded_by.clone() {
            assert_eq!(cursor.status, CommitmentStatus::Superseded);
            assert!(seen.insert(cursor.id.clone()), "cycle at {}", cursor.id.0);
            cursor = SqlCommitmentRepository::find_by_id(&mut conn, &next)
                .await
                .expect("find")
                .expect("no dangling pointer");
        }
        assert_eq!(cursor.id, CommitmentId("c-3".to_string()));
        assert!(cursor.is_active());
    }

    #[tokio::test]
    async fn abandoned_supersede_leaves_the_old_commitment_active() {
        let pool = setup_pool().await;
        let conversation = ConversationId("conv-1".to_string());
        let at = parse_ts("2026-10-18T09:00:00Z");
        {
            let mut conn = pool.acquire().await.expect("acquire");
            SqlCommitmentRepository::create(
                &mut conn,
                CommitmentId("c-1".to_string()),
                &early_checkin(14, CommitmentType::Allowance),
                &origin(&conversation),
                at,
            )
            .await
            .expect("create");
        }

        {
            let mut uow = UnitOfWork::begin(&pool).await.expect("begin");
            SqlCommitmentRepository::supersede(
                uow.conn(),
                &CommitmentId("c-1".to_string()),
                &CommitmentId("c-2".to_string()),
                at,
            )
            .await
            .expect("supersede");
        }

        let mut conn = pool.acquire().await.expect("acquire");
        let active = SqlCommitmentRepository::get_active(&mut conn, &conversation).await.expect("active");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, CommitmentId("c-1".to_string()));

        let missing = SqlCommitmentRepository::supersede(
            &mut conn,
            &CommitmentId("c-404".to_string()),
            &CommitmentId("c-1".to_string()),
            at,
        )
        .await;
        assert!(matches!(missing, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn expire_sweeps_only_active_rows_of_the_conversation() {
        let pool = setup_pool().await;
        let conversation = ConversationId("conv-1".to_string());
        let other = ConversationId("conv-2".to_string());
        let at = parse_ts("2026-10-18T09:00:00Z");
        let mut conn = pool.acquire().await.expect("acquire");

        SqlCommitmentRepository::create(
            &mut conn,
            CommitmentId("c-1".to_string()),
            &early_checkin(14, CommitmentType::Allowance),
            &origin(&conversation),
            at,
        )
        .await
        .expect("create");
        SqlCommitmentRepository::create(
            &mut conn,
            CommitmentId("c-2".to_string()),
            &early_checkin(14, CommitmentType::Allowance),
            &origin(&other),
            at,
        )
        .await
        .expect("create other");

        let expired = SqlCommitmentRepository::expire_by_conversation(&mut conn, &conversation, at)
            .await
            .expect("expire");
        assert_eq!(expired, 1);
        assert!(SqlCommitmentRepository::get_active(&mut conn, &conversation).await.expect("active").is_empty());
        assert_eq!(SqlCommitmentRepository::get_active(&mut conn, &other).await.expect("active").len(), 1);
    }
}
