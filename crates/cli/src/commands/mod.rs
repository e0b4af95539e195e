pub mod commitments;
pub mod config;
pub mod decisions;
pub mod doctor;
pub mod migrate;
pub mod operations;
pub mod seed;

use std::fs;
use std::future::Future;
use std::io::{self, Read};
use std::path::Path;

use anyhow::Context;
use hostline_agent::AgentRuntime;
use hostline_core::config::{AppConfig, LoadOptions};
use hostline_core::errors::ApplicationError;
use hostline_db::{connect_with_config, migrations};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// Exit code for failures raised by the engine itself (unknown ids, invalid transitions).
pub const ENGINE_EXIT_CODE: u8 = 7;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: &impl Serialize,
    ) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => {
                let payload = CommandOutcome {
                    command: command.to_string(),
                    status: "ok".to_string(),
                    error_class: None,
                    message: message.into(),
                    data: Some(data),
                };
                Self { exit_code: 0, output: serialize_payload(payload) }
            }
            Err(error) => Self::failure(command, "serialization", error.to_string(), 1),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn application_error_class(error: &ApplicationError) -> &'static str {
    match error {
        ApplicationError::Domain(_) => "domain",
        ApplicationError::NotFound(_) => "not_found",
        ApplicationError::Persistence(_) => "persistence",
        ApplicationError::Conflict(_) => "conflict",
        ApplicationError::Integration(_) => "integration",
        ApplicationError::Configuration(_) => "configuration",
    }
}

/// Loads configuration, opens the database (applying pending migrations), wires the engine and
/// runs `work` on a current-thread runtime. The returned value becomes the `data` field.
pub(crate) fn execute<T, F, Fut>(command: &str, work: F) -> CommandResult
where
    T: Serialize,
    F: FnOnce(AgentRuntime) -> Fut,
    Fut: Future<Output = Result<(String, T), ApplicationError>>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
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
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure(command, "db_connectivity", error.to_string(), 4);
            }
        };
        if let Err(error) = migrations::run_pending(&pool).await {
            pool.close().await;
            return CommandResult::failure(command, "migration", error.to_string(), 5);
        }
        let engine = match AgentRuntime::from_config(pool.clone(), &config) {
            Ok(engine) => engine,
            Err(error) => {
                pool.close().await;
                return CommandResult::failure(command, "llm_configuration", error.to_string(), 2);
            }
        };

        let outcome = work(engine).await;
        pool.close().await;
        match outcome {
            Ok((message, data)) => {
                debug!(event_name = "cli.command.completed", command, "command completed");
                CommandResult::success_with_data(command, message, &data)
            }
            Err(error) => {
                let correlation_id = Uuid::new_v4().to_string();
                let interface = error.clone().into_interface(correlation_id.as_str());
                warn!(
                    event_name = "cli.command.failed",
                    command,
                    correlation_id = %correlation_id,
                    error_class = application_error_class(&error),
                    interface_class = interface.error_class(),
                    error = %error,
                    "{}",
                    interface.user_message()
                );
                CommandResult::failure(
                    command,
                    application_error_class(&error),
                    error.to_string(),
                    ENGINE_EXIT_CODE,
                )
            }
        }
    })
}

/// Reads a JSON document from `path`, or from stdin when `path` is `-`.
pub(crate) fn read_json_input<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer).context("failed to read stdin")?;
        buffer
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read `{}`", path.display()))?
    };
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in `{}`", path.display()))
}

/// Input problems are reported before any engine work starts.
pub(crate) fn invalid_input(command: &str, error: anyhow::Error) -> CommandResult {
    CommandResult::failure(command, "invalid_input", format!("{error:#}"), 2)
}

#[cfg(test)]
mod tests {
    use hostline_core::errors::{ApplicationError, DomainError};
    use serde_json::Value;

    use super::{application_error_class, CommandResult};

    #[test]
    fn data_is_omitted_from_plain_outcomes() {
        let result = CommandResult::success("migrate", "applied pending migrations");
        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert!(payload.get("data").is_none());

        let result = CommandResult::success_with_data("notifications", "0 items", &Vec::<u8>::new());
        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(payload["data"], Value::Array(Vec::new()));
    }

    #[test]
    fn application_errors_keep_their_class() {
        assert_eq!(
            application_error_class(&ApplicationError::NotFound("oc x".to_string())),
            "not_found"
        );
        assert_eq!(
            application_error_class(&ApplicationError::Domain(DomainError::InvariantViolation(
                "x".to_string()
            ))),
            "domain"
        );
    }
}
