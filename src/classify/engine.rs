//! Classification engine: one model call per message, then a local
//! decision against the vocabulary.
//!
//! Decision order:
//! 1. Exact match (trimmed, case-insensitive) → vocabulary entry as stored
//! 2. `unknown` sentinel → no category
//! 3. Fuzzy match (similarity ≥ threshold) → closest entry, diagnostic recorded
//! 4. Open-vocabulary mode only: a single plausible token → new category
//! 5. Anything else → no category, diagnostic recorded
//!
//! Model failures never escape: they produce an unclassified result with a
//! `ModelFailure` diagnostic.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classify::similarity::FuzzyMatcher;
use crate::classify::types::{
    ClassificationResult, ClassifyOutcome, Decision, Diagnostic, FewShotExample,
};
use crate::classify::vocabulary::normalize;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Characters of the message body included in the prompt.
pub const BODY_CHAR_LIMIT: usize = 2000;

/// Characters of each few-shot example body included in the prompt.
pub const EXAMPLE_BODY_CHAR_LIMIT: usize = 200;

/// Sentinel the model returns when no category applies.
pub const UNKNOWN: &str = "unknown";

/// Category that marks a message as a newsletter.
pub const NEWSLETTER: &str = "newsletter";

/// Longest accepted new category name in open-vocabulary mode.
const MAX_NOVEL_CATEGORY_CHARS: usize = 32;

/// The expected answer is a single word.
const CLASSIFY_MAX_TOKENS: u32 = 16;

const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// Classifies messages through an explicitly owned model client.
pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
    matcher: FuzzyMatcher,
    allow_new_categories: bool,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            matcher: FuzzyMatcher::default(),
            allow_new_categories: false,
        }
    }

    /// Replace the fuzzy matcher (algorithm and threshold).
    pub fn with_matcher(mut self, matcher: FuzzyMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Let the model propose categories outside the vocabulary.
    pub fn allow_new_categories(mut self, allow: bool) -> Self {
        self.allow_new_categories = allow;
        self
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Classify one message against `vocabulary`.
    pub async fn classify(
        &self,
        subject: &str,
        sender: &str,
        body: &str,
        vocabulary: &[String],
        examples: Option<&[FewShotExample]>,
    ) -> ClassifyOutcome {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_system_prompt(vocabulary, self.allow_new_categories)),
            ChatMessage::user(build_user_prompt(subject, sender, body, examples)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let raw = match self.llm.complete(request).await {
            Ok(response) => response.content,
            Err(e) => {
                warn!(
                    model = %self.llm.model_name(),
                    error = %e,
                    "Classification call failed, leaving message unclassified"
                );
                return ClassifyOutcome {
                    result: ClassificationResult::unclassified(),
                    diagnostic: Some(Diagnostic::ModelFailure {
                        reason: e.to_string(),
                    }),
                };
            }
        };

        let decision = self.resolve(&raw, vocabulary);
        debug!(raw = %raw.trim(), ?decision, "Resolved model response");

        let diagnostic = match &decision {
            Decision::Fuzzy { entry, score } => {
                info!(
                    raw = %raw.trim(),
                    corrected = %entry,
                    score = %format!("{score:.2}"),
                    "Corrected near-miss category"
                );
                Some(Diagnostic::FuzzyCorrected {
                    raw: raw.trim().to_string(),
                    corrected: entry.clone(),
                    score: *score,
                })
            }
            Decision::Novel(category) => {
                info!(category = %category, "Model proposed a new category");
                Some(Diagnostic::NovelCategory {
                    raw: raw.trim().to_string(),
                    category: category.clone(),
                })
            }
            Decision::Unexpected => {
                warn!(raw = %raw.trim(), "Unexpected classifier output");
                Some(Diagnostic::UnexpectedOutput {
                    raw: raw.trim().to_string(),
                })
            }
            Decision::Exact(_) | Decision::Unknown => None,
        };

        let category = decision.category().map(str::to_string);
        let is_newsletter = category.as_deref().is_some_and(|c| normalize(c) == NEWSLETTER);

        ClassifyOutcome {
            result: ClassificationResult {
                category,
                is_newsletter,
                is_unpaid: false,
                unsubscribe_url: None,
            },
            diagnostic,
        }
    }

    /// Map a raw response onto a decision. Pure; no model call.
    pub fn resolve(&self, raw: &str, vocabulary: &[String]) -> Decision {
        resolve_response(raw, vocabulary, &self.matcher, self.allow_new_categories)
    }
}

/// Decision policy as a free function over an explicit matcher.
pub fn resolve_response(
    raw: &str,
    vocabulary: &[String],
    matcher: &FuzzyMatcher,
    allow_new_categories: bool,
) -> Decision {
    let response = clean_response(raw);
    if response.is_empty() {
        return Decision::Unexpected;
    }

    if let Some(entry) = vocabulary.iter().find(|v| normalize(v) == response) {
        return Decision::Exact(entry.clone());
    }

    if response == UNKNOWN {
        return Decision::Unknown;
    }

    if let Some((entry, score)) = matcher.best_match(&response, vocabulary) {
        return Decision::Fuzzy {
            entry: entry.to_string(),
            score,
        };
    }

    if allow_new_categories && is_plausible_category(&response) {
        return Decision::Novel(response);
    }

    Decision::Unexpected
}

/// Lowercase, trim, and strip wrapping quotes/backticks and trailing punctuation.
fn clean_response(raw: &str) -> String {
    normalize(raw)
        .trim_end_matches(['.', '!'])
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*'))
        .trim_end_matches(['.', '!'])
        .trim()
        .to_string()
}

fn is_plausible_category(response: &str) -> bool {
    response.chars().count() <= MAX_NOVEL_CATEGORY_CHARS
        && response
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

/// First `limit` chars of `text`.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_system_prompt(vocabulary: &[String], allow_new_categories: bool) -> String {
    let categories = vocabulary
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = format!(
        "You are an email classifier. Assign the email to exactly one of these categories: [{categories}].\n\
         Answer with exactly one category name from the list, or \"{UNKNOWN}\" if none applies.\n"
    );
    if allow_new_categories {
        prompt.push_str(
            "If no listed category fits but a clear category exists, you may answer with one new \
             short lowercase category name (a single word) instead.\n",
        );
    }
    prompt.push_str("Return only that single word, without quotes, punctuation or explanation.");
    prompt
}

fn build_user_prompt(
    subject: &str,
    sender: &str,
    body: &str,
    examples: Option<&[FewShotExample]>,
) -> String {
    let mut prompt = String::with_capacity(BODY_CHAR_LIMIT + 512);

    if let Some(examples) = examples.filter(|e| !e.is_empty()) {
        prompt.push_str("Examples of already labeled emails:\n\n");
        for (i, example) in examples.iter().enumerate() {
            prompt.push_str(&format!(
                "[{}] Label: {}\nSubject: {}\nFrom: {}\nBody: {}\n\n",
                i + 1,
                example.label,
                example.subject,
                example.sender,
                truncate_chars(&example.body, EXAMPLE_BODY_CHAR_LIMIT),
            ));
        }
        prompt.push_str("Email to classify:\n");
    }

    prompt.push_str(&format!("Subject: {subject}\n"));
    prompt.push_str(&format!("From: {sender}\n"));
    prompt.push_str(&format!(
        "Body:\n{}",
        truncate_chars(body, BODY_CHAR_LIMIT)
    ));
    prompt
}
