//! Value types produced and consumed by the classification engine.

use serde::{Deserialize, Serialize};

/// Outcome of classifying one message.
///
/// `category == None` means no category was assigned; the message is left
/// where it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Option<String>,
    pub is_newsletter: bool,
    /// Reserved for a signal source outside the model; the engine leaves it `false`.
    pub is_unpaid: bool,
    pub unsubscribe_url: Option<String>,
}

impl ClassificationResult {
    /// A result with no category and every flag at its default.
    pub fn unclassified() -> Self {
        Self::default()
    }
}

/// A previously labeled message shown to the model as a few-shot example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub label: String,
    pub subject: String,
    pub sender: String,
    #[serde(default)]
    pub body: String,
}

/// How a raw model response was resolved against the vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Normalized response equals a vocabulary entry; carries the entry as stored.
    Exact(String),
    /// The model answered the `unknown` sentinel.
    Unknown,
    /// Closest vocabulary entry at or above the similarity threshold.
    Fuzzy { entry: String, score: f64 },
    /// A new category proposed by the model (open-vocabulary mode only).
    Novel(String),
    /// Nothing usable in the response.
    Unexpected,
}

impl Decision {
    /// The category this decision assigns, if any.
    pub fn category(&self) -> Option<&str> {
        match self {
            Self::Exact(entry) | Self::Fuzzy { entry, .. } | Self::Novel(entry) => Some(entry),
            Self::Unknown | Self::Unexpected => None,
        }
    }
}

/// Non-fatal observations recorded while classifying.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A near-miss response was mapped onto a vocabulary entry.
    FuzzyCorrected {
        raw: String,
        corrected: String,
        score: f64,
    },
    /// The response matched nothing and was discarded.
    UnexpectedOutput { raw: String },
    /// The response was accepted as a new category.
    NovelCategory { raw: String, category: String },
    /// The remote call failed; the message stays unclassified.
    ModelFailure { reason: String },
}

impl Diagnostic {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FuzzyCorrected { .. } => "fuzzy_corrected",
            Self::UnexpectedOutput { .. } => "unexpected_output",
            Self::NovelCategory { .. } => "novel_category",
            Self::ModelFailure { .. } => "model_failure",
        }
    }
}

/// Result of `Classifier::classify`: the decision plus what happened on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyOutcome {
    pub result: ClassificationResult,
    pub diagnostic: Option<Diagnostic>,
}

impl ClassifyOutcome {
    /// True when the remote call itself failed.
    pub fn is_model_failure(&self) -> bool {
        matches!(self.diagnostic, Some(Diagnostic::ModelFailure { .. }))
    }
}
