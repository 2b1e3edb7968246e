//! Mail triage: classify unread mail with a language model, file it under
//! category labels, and grow the category rules as new categories appear.

pub mod classify;
pub mod config;
pub mod error;
pub mod journal;
pub mod llm;
pub mod mailbox;
pub mod pipeline;
pub mod rules;
pub mod unsubscribe;
