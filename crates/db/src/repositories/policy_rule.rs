use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use hostline_core::domain::commitment::CommitmentTopic;
use hostline_core::domain::decision::{PolicyRule, ReasonCode};

use super::{format_timestamp, parse_json, parse_timestamp, to_json, RepositoryError};

pub struct SqlPolicyRuleRepository;

impl SqlPolicyRuleRepository {
    pub async fn save(conn: &mut SqliteConnection, rule: &PolicyRule) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO policy_rule (
                id,
                name,
                keywords_json,
                topics_json,
                reason_code,
                enabled,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                keywords_json = excluded.keywords_json,
                topics_json = excluded.topics_json,
                reason_code = excluded.reason_code,
                enabled = excluded.enabled",
        )
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(to_json("keywords_json", &rule.keywords)?)
        .bind(to_json("topics_json", &rule.topics)?)
        .bind(rule.reason_code.as_str())
        .bind(rule.enabled)
        .bind(format_timestamp(rule.created_at))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn list_enabled(conn: &mut SqliteConnection) -> Result<Vec<PolicyRule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, keywords_json, topics_json, reason_code, enabled, created_at
             FROM policy_rule
             WHERE enabled = 1
             ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(rule_from_row).collect()
    }
}

fn rule_from_row(row: SqliteRow) -> Result<PolicyRule, RepositoryError> {
    let code_raw = row.try_get::<String, _>("reason_code")?;
    let reason_code = ReasonCode::parse(&code_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown reason code `{code_raw}`")))?;
    let topics: Vec<CommitmentTopic> =
        parse_json("topics_json", &row.try_get::<String, _>("topics_json")?)?;

    Ok(PolicyRule {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        keywords: parse_json("keywords_json", &row.try_get::<String, _>("keywords_json")?)?,
        topics,
        reason_code,
        enabled: row.try_get("enabled")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
