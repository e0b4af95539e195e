use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use hostline_cli::commands::operations::{self, ReplySource};
use hostline_cli::commands::seed::{self, SeedMode};
use hostline_cli::commands::{commitments, decisions, migrate};
use hostline_core::domain::decision::HumanAction;
use hostline_core::domain::operational::StaffAction;
use serde_json::{json, Value};
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_database(|_| {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_override() {
    with_env(&[("HOSTLINE_DATABASE_MAX_CONNECTIONS", "many")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_load_verify_and_clean() {
    with_database(|_| {
        let loaded = seed::run(SeedMode::Load);
        assert_eq!(loaded.exit_code, 0, "expected seed success: {}", loaded.output);
        let message = parse_payload(&loaded.output)["message"].as_str().unwrap_or("").to_string();
        assert!(message.contains("demo data loaded for DEMO-01"));
        assert!(message.contains("  - pattern refund_policy: eligible"));
        assert!(message.contains("  - pattern checkin_guide: not eligible"));

        // loading twice is idempotent
        assert_eq!(seed::run(SeedMode::Load).exit_code, 0);
        assert_eq!(seed::run(SeedMode::VerifyOnly).exit_code, 0);

        assert_eq!(seed::run(SeedMode::Clean).exit_code, 0);
        let verify = seed::run(SeedMode::VerifyOnly);
        assert_eq!(verify.exit_code, 6, "expected verification failure after clean");
        assert_eq!(parse_payload(&verify.output)["error_class"], "seed_verification");
    });
}

#[test]
fn sent_promise_shows_up_on_the_staff_board_until_done() {
    with_database(|dir| {
        let input = write_json(
            dir,
            "sent.json",
            &json!({
                "sent_text": "내일 수건 더 가져다 드리겠습니다.",
                "conversation_id": "conv-cli",
                "airbnb_thread_id": "thread-cli",
                "property_code": "SEOUL-01"
            }),
        );

        let processed = commitments::process_sent(&input);
        assert_eq!(processed.exit_code, 0, "{}", processed.output);
        let payload = parse_payload(&processed.output);
        assert_eq!(payload["command"], "process-sent");
        let ocs = payload["data"]["operational_commitments"].as_array().cloned().unwrap_or_default();
        assert_eq!(ocs.len(), 1);
        let oc_id = ocs[0]["id"].as_str().unwrap_or_default().to_string();

        let board = operations::notifications(None, Some("SEOUL-01".to_string()));
        assert_eq!(parse_payload(&board.output)["data"].as_array().map(Vec::len), Some(1));

        let done = operations::staff_action(StaffAction::MarkDone, &oc_id, "staff-kim");
        assert_eq!(done.exit_code, 0, "{}", done.output);
        assert_eq!(parse_payload(&done.output)["data"]["status"], "done");

        let board = operations::notifications(None, Some("SEOUL-01".to_string()));
        assert_eq!(parse_payload(&board.output)["data"].as_array().map(Vec::len), Some(0));

        let view = commitments::show("conv-cli");
        assert_eq!(parse_payload(&view.output)["data"]["operational"][0]["status"], "done");
    });
}

#[test]
fn guest_reply_without_open_tasks_changes_nothing() {
    with_database(|_| {
        let result = operations::reply(ReplySource::Guest, "conv-empty", "괜찮아요");
        assert_eq!(result.exit_code, 0);
        assert_eq!(parse_payload(&result.output)["data"], json!([]));
    });
}

#[test]
fn unknown_operational_commitment_is_not_found() {
    with_database(|_| {
        let result = operations::staff_action(StaffAction::MarkDone, "oc-missing", "staff-kim");
        assert_eq!(result.exit_code, 7);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "oc");
        assert_eq!(payload["error_class"], "not_found");
    });
}

#[test]
fn draft_lifecycle_from_evaluation_to_sent() {
    with_database(|dir| {
        let input = write_json(
            dir,
            "draft.json",
            &json!({
                "draft_id": "draft-cli",
                "conversation_id": "conv-cli",
                "property_code": "SEOUL-01",
                "draft_content": "와이파이 비밀번호는 냉장고 옆에 적혀 있습니다.",
                "guest_message": "와이파이 비밀번호가 뭔가요?",
                "answer_key": "wifi_password"
            }),
        );

        let evaluated = decisions::evaluate_draft(&input);
        assert_eq!(evaluated.exit_code, 0, "{}", evaluated.output);
        let payload = parse_payload(&evaluated.output);
        assert_ne!(payload["data"]["decision"], "AUTO_SEND", "no statistics yet");
        let log_id = payload["data"]["decision_log_id"].as_str().unwrap_or_default().to_string();
        assert!(!log_id.is_empty());

        // evaluating the same draft again reuses the open log
        let again = parse_payload(&decisions::evaluate_draft(&input).output);
        assert_eq!(again["data"]["decision_log_id"], log_id.as_str());

        let approved = decisions::human_action(decisions::HumanActionInput {
            decision_log_id: log_id.clone(),
            action: HumanAction::ApprovedAsIs,
            actor: "host-lee".to_string(),
            edited_content: None,
            comment: None,
        });
        assert_eq!(approved.exit_code, 0, "{}", approved.output);
        assert_eq!(parse_payload(&approved.output)["data"]["human_action"], "approved_as_is");

        let sent = decisions::mark_sent(&log_id, "와이파이 비밀번호는 냉장고 옆에 적혀 있습니다.");
        assert_eq!(sent.exit_code, 0, "{}", sent.output);

        let twice = decisions::mark_sent(&log_id, "again");
        assert_eq!(twice.exit_code, 7);
        assert_eq!(parse_payload(&twice.output)["error_class"], "domain");

        let history = decisions::history("draft-cli");
        assert_eq!(parse_payload(&history.output)["data"].as_array().map(Vec::len), Some(1));
    });
}

#[test]
fn malformed_input_is_rejected_before_touching_the_database() {
    with_database(|dir| {
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").expect("write input");

        let result = commitments::process_sent(&path);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn write_json(dir: &TempDir, name: &str, value: &Value) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, value.to_string()).expect("write input");
    path
}

/// Runs `test_fn` against a fresh on-disk database; every command opens its own pool.
fn with_database(test_fn: impl FnOnce(&TempDir)) {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(dir.path());
    with_env(&[("HOSTLINE_DATABASE_URL", url.as_str())], || test_fn(&dir));
}

fn database_url(dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", dir.join("hostline-test.db").display())
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "HOSTLINE_DATABASE_URL",
        "HOSTLINE_DATABASE_MAX_CONNECTIONS",
        "HOSTLINE_DATABASE_TIMEOUT_SECS",
        "HOSTLINE_LLM_ENABLED",
        "HOSTLINE_LLM_PROVIDER",
        "HOSTLINE_LLM_API_KEY",
        "HOSTLINE_LLM_BASE_URL",
        "HOSTLINE_LLM_MODEL",
        "HOSTLINE_LLM_TIMEOUT_SECS",
        "HOSTLINE_LLM_MAX_RETRIES",
        "HOSTLINE_EXTRACTION_CONFIDENCE_THRESHOLD",
        "HOSTLINE_EXTRACTION_TIMEOUT_SECS",
        "HOSTLINE_DECISION_MIN_SAMPLES",
        "HOSTLINE_DECISION_MIN_APPROVAL_RATE",
        "HOSTLINE_SAFETY_GUARD_ENABLED",
        "HOSTLINE_LOGGING_LEVEL",
        "HOSTLINE_LOGGING_FORMAT",
        "HOSTLINE_LOG_LEVEL",
        "HOSTLINE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
