use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::decision::ReasonCode;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub extraction: ExtractionConfig,
    pub decision: DecisionConfig,
    pub operations: OperationsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionConfig {
    /// Candidates below this confidence are dropped before persistence.
    pub confidence_threshold: f64,
    /// Upper bound on the model stage before falling back to rules.
    pub timeout_secs: u64,
    pub standard_checkin: NaiveTime,
    pub standard_checkout: NaiveTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecisionConfig {
    pub eligibility: EligibilityPolicy,
    /// `None` means no guard is configured and auto-send is never allowed.
    pub safety_guard: Option<SafetyGuardConfig>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EligibilityPolicy {
    pub min_samples: u32,
    pub min_approval_rate: f64,
}

impl EligibilityPolicy {
    pub fn is_eligible(&self, sample_count: u32, approved_count: u32) -> bool {
        if sample_count == 0 || sample_count < self.min_samples {
            return false;
        }
        f64::from(approved_count) / f64::from(sample_count) >= self.min_approval_rate
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SafetyGuardConfig {
    pub enabled: bool,
    pub pattern_id: String,
    pub max_draft_chars: usize,
    pub blocked_keywords: Vec<String>,
    pub disallowed_reason_codes: Vec<ReasonCode>,
}

/// Phrase lists driving reply-based OC resolution. Matching is case-insensitive substring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationsConfig {
    pub acknowledgment_phrases: Vec<String>,
    pub cancellation_phrases: Vec<String>,
    pub host_confirmation_phrases: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_enabled: Option<bool>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub safety_guard_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

fn phrases(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            acknowledgment_phrases: phrases(&[
                "괜찮아요",
                "괜찮습니다",
                "알겠습니다",
                "알겠어요",
                "no problem",
                "sounds good",
                "that's fine",
            ]),
            cancellation_phrases: phrases(&[
                "취소",
                "안 해도",
                "필요 없",
                "필요없",
                "안 주셔도",
                "cancel",
                "no longer need",
                "don't need",
                "never mind",
            ]),
            host_confirmation_phrases: phrases(&[
                "완료",
                "준비해 두었",
                "준비해 뒀",
                "준비했습니다",
                "처리했습니다",
                "수리했습니다",
                "고쳤습니다",
                "all set",
                "fixed",
                "taken care of",
            ]),
        }
    }
}

impl Default for SafetyGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pattern_id: "default".to_string(),
            max_draft_chars: 500,
            blocked_keywords: phrases(&["계좌", "현금", "직접 송금", "bank transfer", "cash"]),
            disallowed_reason_codes: vec![
                ReasonCode::FinancialMention,
                ReasonCode::PersonalInfo,
                ReasonCode::ComplaintDetected,
                ReasonCode::SensitiveTopic,
                ReasonCode::NewCommitment,
                ReasonCode::MissingInformation,
                ReasonCode::LowConfidence,
                ReasonCode::NeedsFollowUp,
                ReasonCode::CommitmentConflict,
            ],
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://hostline.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                enabled: false,
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            extraction: ExtractionConfig {
                confidence_threshold: 0.6,
                timeout_secs: 15,
                standard_checkin: NaiveTime::from_hms_opt(15, 0, 0).unwrap_or_default(),
                standard_checkout: NaiveTime::from_hms_opt(11, 0, 0).unwrap_or_default(),
            },
            decision: DecisionConfig {
                eligibility: EligibilityPolicy { min_samples: 10, min_approval_rate: 0.9 },
                safety_guard: Some(SafetyGuardConfig::default()),
            },
            operations: OperationsConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("hostline.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(enabled) = llm.enabled {
                self.llm.enabled = enabled;
            }
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(extraction) = patch.extraction {
            if let Some(threshold) = extraction.confidence_threshold {
                self.extraction.confidence_threshold = threshold;
            }
            if let Some(timeout_secs) = extraction.timeout_secs {
                self.extraction.timeout_secs = timeout_secs;
            }
            if let Some(value) = extraction.standard_checkin {
                self.extraction.standard_checkin = parse_clock("extraction.standard_checkin", &value)?;
            }
            if let Some(value) = extraction.standard_checkout {
                self.extraction.standard_checkout =
                    parse_clock("extraction.standard_checkout", &value)?;
            }
        }

        if let Some(decision) = patch.decision {
            if let Some(min_samples) = decision.min_samples {
                self.decision.eligibility.min_samples = min_samples;
            }
            if let Some(min_approval_rate) = decision.min_approval_rate {
                self.decision.eligibility.min_approval_rate = min_approval_rate;
            }
            if let Some(guard_patch) = decision.safety_guard {
                let mut guard = self.decision.safety_guard.take().unwrap_or_default();
                if let Some(enabled) = guard_patch.enabled {
                    guard.enabled = enabled;
                }
                if let Some(pattern_id) = guard_patch.pattern_id {
                    guard.pattern_id = pattern_id;
                }
                if let Some(max_draft_chars) = guard_patch.max_draft_chars {
                    guard.max_draft_chars = max_draft_chars;
                }
                if let Some(blocked_keywords) = guard_patch.blocked_keywords {
                    guard.blocked_keywords = blocked_keywords;
                }
                if let Some(codes) = guard_patch.disallowed_reason_codes {
                    guard.disallowed_reason_codes = codes
                        .iter()
                        .map(|code| {
                            ReasonCode::parse(code).ok_or_else(|| {
                                ConfigError::Validation(format!(
                                    "decision.safety_guard.disallowed_reason_codes contains unknown code `{code}`"
                                ))
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                }
                self.decision.safety_guard = Some(guard);
            }
        }

        if let Some(operations) = patch.operations {
            if let Some(values) = operations.acknowledgment_phrases {
                self.operations.acknowledgment_phrases = values;
            }
            if let Some(values) = operations.cancellation_phrases {
                self.operations.cancellation_phrases = values;
            }
            if let Some(values) = operations.host_confirmation_phrases {
                self.operations.host_confirmation_phrases = values;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HOSTLINE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("HOSTLINE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("HOSTLINE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("HOSTLINE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("HOSTLINE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HOSTLINE_LLM_ENABLED") {
            self.llm.enabled = parse_bool("HOSTLINE_LLM_ENABLED", &value)?;
        }
        if let Some(value) = read_env("HOSTLINE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("HOSTLINE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("HOSTLINE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("HOSTLINE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("HOSTLINE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("HOSTLINE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HOSTLINE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("HOSTLINE_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("HOSTLINE_EXTRACTION_CONFIDENCE_THRESHOLD") {
            self.extraction.confidence_threshold =
                parse_f64("HOSTLINE_EXTRACTION_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("HOSTLINE_EXTRACTION_TIMEOUT_SECS") {
            self.extraction.timeout_secs = parse_u64("HOSTLINE_EXTRACTION_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HOSTLINE_DECISION_MIN_SAMPLES") {
            self.decision.eligibility.min_samples =
                parse_u32("HOSTLINE_DECISION_MIN_SAMPLES", &value)?;
        }
        if let Some(value) = read_env("HOSTLINE_DECISION_MIN_APPROVAL_RATE") {
            self.decision.eligibility.min_approval_rate =
                parse_f64("HOSTLINE_DECISION_MIN_APPROVAL_RATE", &value)?;
        }
        if let Some(value) = read_env("HOSTLINE_SAFETY_GUARD_ENABLED") {
            let enabled = parse_bool("HOSTLINE_SAFETY_GUARD_ENABLED", &value)?;
            self.decision.safety_guard.get_or_insert_with(SafetyGuardConfig::default).enabled =
                enabled;
        }

        let log_level =
            read_env("HOSTLINE_LOGGING_LEVEL").or_else(|| read_env("HOSTLINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HOSTLINE_LOGGING_FORMAT").or_else(|| read_env("HOSTLINE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(enabled) = overrides.llm_enabled {
            self.llm.enabled = enabled;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(enabled) = overrides.safety_guard_enabled {
            self.decision.safety_guard.get_or_insert_with(SafetyGuardConfig::default).enabled =
                enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_extraction(&self.extraction)?;
        validate_decision(&self.decision)?;
        validate_operations(&self.operations)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("hostline.toml"), PathBuf::from("config/hostline.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !llm.enabled {
        return Ok(());
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_extraction(extraction: &ExtractionConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&extraction.confidence_threshold) {
        return Err(ConfigError::Validation(
            "extraction.confidence_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }
    if extraction.timeout_secs == 0 || extraction.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "extraction.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if extraction.standard_checkout >= extraction.standard_checkin {
        return Err(ConfigError::Validation(
            "extraction.standard_checkout must be earlier than extraction.standard_checkin"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_decision(decision: &DecisionConfig) -> Result<(), ConfigError> {
    if decision.eligibility.min_samples == 0 {
        return Err(ConfigError::Validation(
            "decision.min_samples must be greater than zero".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&decision.eligibility.min_approval_rate) {
        return Err(ConfigError::Validation(
            "decision.min_approval_rate must be in range 0.0..=1.0".to_string(),
        ));
    }
    if let Some(guard) = &decision.safety_guard {
        if guard.max_draft_chars == 0 {
            return Err(ConfigError::Validation(
                "decision.safety_guard.max_draft_chars must be greater than zero".to_string(),
            ));
        }
        if guard.pattern_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "decision.safety_guard.pattern_id must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_operations(operations: &OperationsConfig) -> Result<(), ConfigError> {
    let lists = [
        ("acknowledgment_phrases", &operations.acknowledgment_phrases),
        ("cancellation_phrases", &operations.cancellation_phrases),
        ("host_confirmation_phrases", &operations.host_confirmation_phrases),
    ];
    for (name, values) in lists {
        if values.iter().any(|value| value.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "operations.{name} must not contain blank phrases"
            )));
        }
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_clock(key: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| {
        ConfigError::Validation(format!("{key} must be a HH:MM clock time, got `{value}`"))
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    extraction: Option<ExtractionPatch>,
    decision: Option<DecisionPatch>,
    operations: Option<OperationsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    enabled: Option<bool>,
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractionPatch {
    confidence_threshold: Option<f64>,
    timeout_secs: Option<u64>,
    standard_checkin: Option<String>,
    standard_checkout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DecisionPatch {
    min_samples: Option<u32>,
    min_approval_rate: Option<f64>,
    safety_guard: Option<SafetyGuardPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SafetyGuardPatch {
    enabled: Option<bool>,
    pattern_id: Option<String>,
    max_draft_chars: Option<usize>,
    blocked_keywords: Option<Vec<String>>,
    disallowed_reason_codes: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct OperationsPatch {
    acknowledgment_phrases: Option<Vec<String>>,
    cancellation_phrases: Option<Vec<String>>,
    host_confirmation_phrases: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
