use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use hostline_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// One rendered setting: dotted key, display value and the env keys that can override it.
struct Setting {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Setting {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(&config) {
        let source = field_source(
            setting.key,
            setting.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(setting.key, &setting.value, source));
    }
    lines.join("\n")
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    let guard = config.decision.safety_guard.as_ref();
    vec![
        Setting::new("database.url", config.database.url.clone(), &["HOSTLINE_DATABASE_URL"]),
        Setting::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["HOSTLINE_DATABASE_MAX_CONNECTIONS"],
        ),
        Setting::new(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["HOSTLINE_DATABASE_TIMEOUT_SECS"],
        ),
        Setting::new("llm.enabled", config.llm.enabled.to_string(), &["HOSTLINE_LLM_ENABLED"]),
        Setting::new("llm.provider", config.llm.provider.as_str(), &["HOSTLINE_LLM_PROVIDER"]),
        Setting::new("llm.model", config.llm.model.clone(), &["HOSTLINE_LLM_MODEL"]),
        Setting::new(
            "llm.base_url",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
            &["HOSTLINE_LLM_BASE_URL"],
        ),
        Setting::new(
            "llm.api_key",
            if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" },
            &["HOSTLINE_LLM_API_KEY"],
        ),
        Setting::new(
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            &["HOSTLINE_LLM_TIMEOUT_SECS"],
        ),
        Setting::new(
            "llm.max_retries",
            config.llm.max_retries.to_string(),
            &["HOSTLINE_LLM_MAX_RETRIES"],
        ),
        Setting::new(
            "extraction.confidence_threshold",
            config.extraction.confidence_threshold.to_string(),
            &["HOSTLINE_EXTRACTION_CONFIDENCE_THRESHOLD"],
        ),
        Setting::new(
            "extraction.timeout_secs",
            config.extraction.timeout_secs.to_string(),
            &["HOSTLINE_EXTRACTION_TIMEOUT_SECS"],
        ),
        Setting::new(
            "extraction.standard_checkin",
            config.extraction.standard_checkin.format("%H:%M").to_string(),
            &[],
        ),
        Setting::new(
            "extraction.standard_checkout",
            config.extraction.standard_checkout.format("%H:%M").to_string(),
            &[],
        ),
        Setting::new(
            "decision.min_samples",
            config.decision.eligibility.min_samples.to_string(),
            &["HOSTLINE_DECISION_MIN_SAMPLES"],
        ),
        Setting::new(
            "decision.min_approval_rate",
            config.decision.eligibility.min_approval_rate.to_string(),
            &["HOSTLINE_DECISION_MIN_APPROVAL_RATE"],
        ),
        Setting::new(
            "decision.safety_guard.enabled",
            guard.map_or_else(|| "<unset>".to_string(), |guard| guard.enabled.to_string()),
            &["HOSTLINE_SAFETY_GUARD_ENABLED"],
        ),
        Setting::new(
            "decision.safety_guard.max_draft_chars",
            guard.map_or_else(|| "<unset>".to_string(), |guard| guard.max_draft_chars.to_string()),
            &[],
        ),
        Setting::new(
            "operations.acknowledgment_phrases",
            format!("{} phrases", config.operations.acknowledgment_phrases.len()),
            &[],
        ),
        Setting::new(
            "operations.cancellation_phrases",
            format!("{} phrases", config.operations.cancellation_phrases.len()),
            &[],
        ),
        Setting::new(
            "operations.host_confirmation_phrases",
            format!("{} phrases", config.operations.host_confirmation_phrases.len()),
            &[],
        ),
        Setting::new(
            "logging.level",
            config.logging.level.clone(),
            &["HOSTLINE_LOGGING_LEVEL", "HOSTLINE_LOG_LEVEL"],
        ),
        Setting::new(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["HOSTLINE_LOGGING_FORMAT", "HOSTLINE_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("hostline.toml"), PathBuf::from("config/hostline.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
