//! Configuration types, read from the environment once at startup.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::mailbox::ImapConfig;

/// Triage run configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Rule store file.
    pub rules_path: PathBuf,
    /// Audit log for newly registered categories.
    pub audit_log_path: PathBuf,
    pub unsubscribe_log_path: PathBuf,
    /// Upper bound on messages handled per run.
    pub max_messages: usize,
    /// Optional JSON array of few-shot examples.
    pub examples_path: Option<PathBuf>,
    /// Accept categories the model proposes outside the vocabulary.
    pub allow_new_categories: bool,
    /// Derive the unpaid-newsletter signal and act on it.
    pub auto_unsubscribe: bool,
    /// Senders whose newsletters are paid for and never unsubscribed.
    pub paid_senders: Vec<String>,
    /// Also write logs to a daily file in this directory.
    pub log_dir: Option<PathBuf>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            rules_path: PathBuf::from("regeln.json"),
            audit_log_path: PathBuf::from("mail_log.txt"),
            unsubscribe_log_path: PathBuf::from("unsubscribe_log.txt"),
            max_messages: 10,
            examples_path: None,
            allow_new_categories: false,
            auto_unsubscribe: false,
            paid_senders: Vec::new(),
            log_dir: None,
        }
    }
}

impl TriageConfig {
    /// Build config from `TRIAGE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let path = |key: &str| var(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        let max_messages = match var("TRIAGE_MAX_MESSAGES") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "TRIAGE_MAX_MESSAGES".into(),
                        message: format!("'{raw}' is not a positive integer"),
                    });
                }
            },
            None => defaults.max_messages,
        };

        let paid_senders = var("TRIAGE_PAID_SENDERS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            rules_path: path("TRIAGE_RULES_PATH").unwrap_or(defaults.rules_path),
            audit_log_path: path("TRIAGE_AUDIT_LOG_PATH").unwrap_or(defaults.audit_log_path),
            unsubscribe_log_path: path("TRIAGE_UNSUBSCRIBE_LOG_PATH")
                .unwrap_or(defaults.unsubscribe_log_path),
            max_messages,
            examples_path: path("TRIAGE_EXAMPLES_PATH"),
            allow_new_categories: parse_flag(
                "TRIAGE_ALLOW_NEW_CATEGORIES",
                var("TRIAGE_ALLOW_NEW_CATEGORIES"),
            )?,
            auto_unsubscribe: parse_flag("TRIAGE_AUTO_UNSUBSCRIBE", var("TRIAGE_AUTO_UNSUBSCRIBE"))?,
            paid_senders,
            log_dir: path("TRIAGE_LOG_DIR"),
        })
    }
}

impl LlmConfig {
    /// Build config from `TRIAGE_LLM_BACKEND`, `TRIAGE_MODEL` and the
    /// backend's API key variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend: LlmBackend = match var("TRIAGE_LLM_BACKEND") {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => LlmBackend::Gemini,
        };

        let key_var = backend.api_key_var();
        let api_key = var(key_var)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: key_var.to_string(),
                hint: format!("Set {key_var} to an API key for the configured model backend"),
            })?;

        let model = var("TRIAGE_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| backend.default_model().to_string());

        Ok(Self {
            backend,
            api_key: SecretString::from(api_key),
            model,
        })
    }
}

fn parse_flag(key: &str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(raw) = value else {
        return Ok(false);
    };
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}' is not a boolean"),
        }),
    }
}

/// Everything the binary needs to start a run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub triage: TriageConfig,
    pub llm: LlmConfig,
    pub imap: ImapConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            triage: TriageConfig::from_env()?,
            llm: LlmConfig::from_env()?,
            imap: ImapConfig::from_env()?,
        })
    }
}
