//! Message classification.
//!
//! - `vocabulary`: merges rule keys with mailbox labels into the candidate set
//! - `similarity`: pluggable fuzzy matching for near-miss responses
//! - `engine`: prompt, single model call, decision policy
//! - `examples`: optional few-shot examples from disk

pub mod engine;
pub mod examples;
pub mod similarity;
pub mod types;
pub mod vocabulary;

pub use engine::{Classifier, NEWSLETTER, UNKNOWN, resolve_response};
pub use examples::load_examples;
pub use similarity::{FuzzyMatcher, NormalizedLevenshtein, Similarity};
pub use types::{ClassificationResult, ClassifyOutcome, Decision, Diagnostic, FewShotExample};
pub use vocabulary::{Vocabulary, build_vocabulary, normalize};
