use chrono::Utc;
use hostline_core::config::{AppConfig, LoadOptions};
use hostline_db::fixtures::{SeedResult, VerificationResult};
use hostline_db::{connect_with_config, migrations, DemoSeed};

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SeedMode {
    #[default]
    Load,
    VerifyOnly,
    Clean,
}

pub fn run(mode: SeedMode) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let run_result = match mode {
            SeedMode::Clean => DemoSeed::clean(&pool)
                .await
                .map(|()| format!("removed demo data for {}", DemoSeed::PROPERTY_CODE))
                .map_err(|error| ("seed_execution", error.to_string(), 5u8)),
            SeedMode::VerifyOnly => DemoSeed::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8))
                .and_then(|verification| {
                    check_verification(&verification).map(|()| {
                        format!("demo data for {} is present", DemoSeed::PROPERTY_CODE)
                    })
                }),
            SeedMode::Load => {
                let eligibility = config.decision.eligibility;
                match DemoSeed::load(
                    &pool,
                    eligibility.min_samples,
                    eligibility.min_approval_rate,
                    Utc::now(),
                )
                .await
                {
                    Ok(seeded) => DemoSeed::verify(&pool)
                        .await
                        .map_err(|error| ("seed_verification", error.to_string(), 6u8))
                        .and_then(|verification| check_verification(&verification))
                        .map(|()| describe(&seeded)),
                    Err(error) => Err(("seed_execution", error.to_string(), 5u8)),
                }
            }
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(message) => CommandResult::success("seed", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn check_verification(
    verification: &VerificationResult,
) -> Result<(), (&'static str, String, u8)> {
    if verification.all_present {
        return Ok(());
    }
    Err(("seed_verification", verification_failure_message(&verification.checks), 6))
}

fn verification_failure_message(checks: &[(&str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

fn describe(seeded: &SeedResult) -> String {
    let mut lines = vec![format!("demo data loaded for {}:", seeded.property_code)];
    for pattern in &seeded.patterns {
        let state = if pattern.eligible { "eligible" } else { "not eligible" };
        lines.push(format!("  - pattern {}: {state}", pattern.answer_key));
    }
    for rule in &seeded.policy_rules {
        lines.push(format!("  - policy rule {rule}"));
    }
    lines.join("\n")
}
