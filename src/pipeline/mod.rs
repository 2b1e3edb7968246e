//! Orchestration of a triage run.
//!
//! `TriageRunner::run()` lists unread mail, then per message:
//! 1. fetch and classify against the run's category vocabulary
//! 2. reconcile the category into the rule store
//! 3. look up or create the label and move the message
//! 4. unsubscribe from unpaid newsletters

pub mod runner;
pub mod types;

pub use runner::TriageRunner;
pub use types::{MessageOutcome, ProcessedMessage, RunSummary};
