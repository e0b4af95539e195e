use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use hostline_core::domain::decision::AutomationPatternStats;

use super::{format_timestamp, parse_timestamp, parse_u32, RepositoryError};

pub struct SqlAutomationStatsRepository;

impl SqlAutomationStatsRepository {
    pub async fn find(
        conn: &mut SqliteConnection,
        property_code: &str,
        answer_key: &str,
    ) -> Result<Option<AutomationPatternStats>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                property_code,
                answer_key,
                sample_count,
                approved_count,
                edited_count,
                rejected_count,
                approval_rate,
                eligible,
                updated_at
             FROM automation_pattern_stats
             WHERE property_code = ? AND answer_key = ?",
        )
        .bind(property_code)
        .bind(answer_key)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(stats_from_row).transpose()
    }

    pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<AutomationPatternStats>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                property_code,
                answer_key,
                sample_count,
                approved_count,
                edited_count,
                rejected_count,
                approval_rate,
                eligible,
                updated_at
             FROM automation_pattern_stats
             ORDER BY property_code ASC, answer_key ASC",
        )
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(stats_from_row).collect()
    }

    pub async fn save(
        conn: &mut SqliteConnection,
        stats: &AutomationPatternStats,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO automation_pattern_stats (
                property_code,
                answer_key,
                sample_count,
                approved_count,
                edited_count,
                rejected_count,
                approval_rate,
                eligible,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(property_code, answer_key) DO UPDATE SET
                sample_count = excluded.sample_count,
                approved_count = excluded.approved_count,
                edited_count = excluded.edited_count,
                rejected_count = excluded.rejected_count,
                approval_rate = excluded.approval_rate,
                eligible = excluded.eligible,
                updated_at = excluded.updated_at",
        )
        .bind(&stats.property_code)
        .bind(&stats.answer_key)
        .bind(i64::from(stats.sample_count))
        .bind(i64::from(stats.approved_count))
        .bind(i64::from(stats.edited_count))
        .bind(i64::from(stats.rejected_count))
        .bind(stats.approval_rate)
        .bind(stats.eligible)
        .bind(format_timestamp(stats.updated_at))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

fn stats_from_row(row: SqliteRow) -> Result<AutomationPatternStats, RepositoryError> {
    Ok(AutomationPatternStats {
        property_code: row.try_get("property_code")?,
        answer_key: row.try_get("answer_key")?,
        sample_count: parse_u32("sample_count", row.try_get("sample_count")?)?,
        approved_count: parse_u32("approved_count", row.try_get("approved_count")?)?,
        edited_count: parse_u32("edited_count", row.try_get("edited_count")?)?,
        rejected_count: parse_u32("rejected_count", row.try_get("rejected_count")?)?,
        approval_rate: row.try_get("approval_rate")?,
        eligible: row.try_get("eligible")?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
