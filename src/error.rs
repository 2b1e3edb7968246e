//! Error types for mail triage.

/// Top-level error type for a triage run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rule store error: {0}")]
    RuleStore(#[from] RuleStoreError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Unsubscribe error: {0}")]
    Unsubscribe(#[from] UnsubscribeError),
}

/// Configuration-related errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Rule store errors.
///
/// Loading never produces one of these: an unreadable store is treated as
/// empty.
#[derive(Debug, thiserror::Error)]
pub enum RuleStoreError {
    #[error("Invalid category: {0:?}")]
    InvalidCategory(String),

    #[error("Failed to write rule store {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize rule store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only log file errors.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Failed to append to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Mailbox transport errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("IMAP command {command} failed: {reason}")]
    Protocol { command: String, reason: String },

    #[error("Message {id} not found")]
    NotFound { id: String },

    #[error("Failed to parse message {id}")]
    Parse { id: String },

    #[error("Mailbox task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Unsubscribe execution errors.
#[derive(Debug, thiserror::Error)]
pub enum UnsubscribeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unsubscribe endpoint returned status {status}")]
    Status { status: u16 },

    #[error("No usable target in List-Unsubscribe header")]
    NoTarget,

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),
}

/// Failure of a single message inside a batch.
///
/// Caught at the per-message boundary of the runner; never aborts a run.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Rule store error: {0}")]
    Rules(#[from] RuleStoreError),
}

/// Result type alias for triage.
pub type Result<T> = std::result::Result<T, Error>;
