//! Per-message outcomes and the run summary.

use serde::Serialize;

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    /// Classified and moved into the category's label.
    Moved {
        category: String,
        label: String,
        /// The category was registered by this message.
        new_category: bool,
        unsubscribed: bool,
    },
    /// Left in the inbox.
    Skipped { reason: String },
    /// Processing raised an error; the batch continued.
    Failed { error: String },
}

/// One message's id and outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedMessage {
    pub id: String,
    pub outcome: MessageOutcome,
}

/// Counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Unread messages listed (after the batch cap).
    pub found: usize,
    pub classified: usize,
    pub skipped: usize,
    pub failed: usize,
    pub new_categories: usize,
    pub unsubscribed: usize,
    pub messages: Vec<ProcessedMessage>,
}

impl RunSummary {
    pub fn record(&mut self, id: &str, outcome: MessageOutcome) {
        match &outcome {
            MessageOutcome::Moved {
                new_category,
                unsubscribed,
                ..
            } => {
                self.classified += 1;
                self.new_categories += usize::from(*new_category);
                self.unsubscribed += usize::from(*unsubscribed);
            }
            MessageOutcome::Skipped { .. } => self.skipped += 1,
            MessageOutcome::Failed { .. } => self.failed += 1,
        }
        self.messages.push(ProcessedMessage {
            id: id.to_string(),
            outcome,
        });
    }

    pub fn outcome(&self, id: &str) -> Option<&MessageOutcome> {
        self.messages
            .iter()
            .find(|m| m.id == id)
            .map(|m| &m.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_counts_each_outcome() {
        let mut summary = RunSummary {
            found: 4,
            ..Default::default()
        };
        summary.record(
            "1",
            MessageOutcome::Moved {
                category: "rechnung".into(),
                label: "Rechnung".into(),
                new_category: true,
                unsubscribed: false,
            },
        );
        summary.record(
            "2",
            MessageOutcome::Moved {
                category: "newsletter".into(),
                label: "Newsletter".into(),
                new_category: false,
                unsubscribed: true,
            },
        );
        summary.record("3", MessageOutcome::Skipped { reason: "unknown".into() });
        summary.record("4", MessageOutcome::Failed { error: "boom".into() });

        assert_eq!(summary.classified, 2);
        assert_eq!(summary.new_categories, 1);
        assert_eq!(summary.unsubscribed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.messages.len(), 4);
        assert!(matches!(summary.outcome("3"), Some(MessageOutcome::Skipped { .. })));
        assert!(summary.outcome("9").is_none());
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_value(MessageOutcome::Skipped {
            reason: "unknown".into(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["reason"], "unknown");
    }
}
