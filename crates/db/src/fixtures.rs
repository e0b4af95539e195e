use chrono::{DateTime, Utc};
use serde::Serialize;

use hostline_core::domain::commitment::CommitmentTopic;
use hostline_core::domain::decision::{AutomationPatternStats, PolicyRule, ReasonCode};

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlAutomationStatsRepository, SqlPolicyRuleRepository};
use crate::UnitOfWork;

/// FAQ answer patterns seeded with enough approvals to be auto-send eligible.
const SEED_PATTERNS: &[SeedPattern] = &[
    SeedPattern { property_code: "DEMO-01", answer_key: "wifi_password", samples: 24, approved: 23 },
    SeedPattern { property_code: "DEMO-01", answer_key: "parking_info", samples: 15, approved: 14 },
    SeedPattern { property_code: "DEMO-01", answer_key: "refund_policy", samples: 12, approved: 11 },
    SeedPattern { property_code: "DEMO-01", answer_key: "checkin_guide", samples: 4, approved: 4 },
];

const SEED_RULES: &[SeedRule] = &[
    SeedRule {
        id: "demo-rule-pets",
        name: "pet questions need a human",
        keywords: &["반려동물", "반려견", "강아지", "pet", "dog"],
        topics: &[CommitmentTopic::PetPolicy],
        reason_code: ReasonCode::SensitiveTopic,
    },
    SeedRule {
        id: "demo-rule-party",
        name: "parties are a policy violation",
        keywords: &["파티", "party"],
        topics: &[],
        reason_code: ReasonCode::PolicyViolation,
    },
];

struct SeedPattern {
    property_code: &'static str,
    answer_key: &'static str,
    samples: u32,
    approved: u32,
}

struct SeedRule {
    id: &'static str,
    name: &'static str,
    keywords: &'static [&'static str],
    topics: &'static [CommitmentTopic],
    reason_code: ReasonCode,
}

/// Demo property data: automation pattern statistics and policy rules.
pub struct DemoSeed;

impl DemoSeed {
    pub const PROPERTY_CODE: &'static str = "DEMO-01";

    /// Eligibility is computed with the given thresholds, so the seeded rows agree with the
    /// running configuration.
    pub async fn load(
        pool: &DbPool,
        min_samples: u32,
        min_approval_rate: f64,
        at: DateTime<Utc>,
    ) -> Result<SeedResult, RepositoryError> {
        let mut uow = UnitOfWork::begin(pool).await?;
        let mut patterns = Vec::new();
        for seed in SEED_PATTERNS {
            let approval_rate = f64::from(seed.approved) / f64::from(seed.samples);
            let stats = AutomationPatternStats {
                property_code: seed.property_code.to_string(),
                answer_key: seed.answer_key.to_string(),
                sample_count: seed.samples,
                approved_count: seed.approved,
                edited_count: seed.samples - seed.approved,
                rejected_count: 0,
                approval_rate,
                eligible: seed.samples >= min_samples && approval_rate >= min_approval_rate,
                updated_at: at,
            };
            SqlAutomationStatsRepository::save(uow.conn(), &stats).await?;
            patterns.push(SeededPattern {
                answer_key: seed.answer_key,
                eligible: stats.eligible,
            });
        }

        for seed in SEED_RULES {
            let rule = PolicyRule {
                id: seed.id.to_string(),
                name: seed.name.to_string(),
                keywords: seed.keywords.iter().map(|keyword| keyword.to_string()).collect(),
                topics: seed.topics.to_vec(),
                reason_code: seed.reason_code,
                enabled: true,
                created_at: at,
            };
            SqlPolicyRuleRepository::save(uow.conn(), &rule).await?;
        }
        uow.commit().await?;

        Ok(SeedResult {
            property_code: Self::PROPERTY_CODE,
            patterns,
            policy_rules: SEED_RULES.iter().map(|rule| rule.id).collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();
        for seed in SEED_PATTERNS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM automation_pattern_stats WHERE property_code = ?1 AND answer_key = ?2 AND sample_count = ?3)",
            )
            .bind(seed.property_code)
            .bind(seed.answer_key)
            .bind(i64::from(seed.samples))
            .fetch_one(pool)
            .await?;
            checks.push((seed.answer_key, exists == 1));
        }
        for seed in SEED_RULES {
            let exists: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM policy_rule WHERE id = ?1)")
                    .bind(seed.id)
                    .fetch_one(pool)
                    .await?;
            checks.push((seed.id, exists == 1));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut uow = UnitOfWork::begin(pool).await?;
        sqlx::query("DELETE FROM automation_pattern_stats WHERE property_code = ?1")
            .bind(Self::PROPERTY_CODE)
            .execute(uow.conn())
            .await?;
        for seed in SEED_RULES {
            sqlx::query("DELETE FROM policy_rule WHERE id = ?1")
                .bind(seed.id)
                .execute(uow.conn())
                .await?;
        }
        uow.commit().await
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SeedResult {
    pub property_code: &'static str,
    pub patterns: Vec<SeededPattern>,
    pub policy_rules: Vec<&'static str>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SeededPattern {
    pub answer_key: &'static str,
    pub eligible: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
