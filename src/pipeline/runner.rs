//! Drives one triage run over the unread inbox.
//!
//! Messages are handled one at a time in listing order:
//! fetch → classify → reconcile → label → move → unsubscribe if applicable.
//! Any error inside a message is caught at the per-message boundary and
//! recorded as [`MessageOutcome::Failed`]; only listing failures abort a run.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::classify::{
    ClassificationResult, Classifier, Diagnostic, FewShotExample, Vocabulary, load_examples,
};
use crate::config::TriageConfig;
use crate::error::{MailboxError, Result, TriageError};
use crate::journal::{AuditLog, Provenance, UnsubscribeLog};
use crate::llm::LlmProvider;
use crate::mailbox::{MailMessage, Mailbox, label_id_for};
use crate::pipeline::types::{MessageOutcome, RunSummary};
use crate::rules::{RuleReconciler, RuleStore};
use crate::unsubscribe::{UnsubscribeTarget, Unsubscriber, is_sender_listed};

pub struct TriageRunner {
    mailbox: Arc<dyn Mailbox>,
    classifier: Classifier,
    rules: RuleStore,
    reconciler: RuleReconciler,
    unsubscriber: Unsubscriber,
    examples: Vec<FewShotExample>,
    max_messages: usize,
    auto_unsubscribe: bool,
    paid_senders: Vec<String>,
}

impl TriageRunner {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        classifier: Classifier,
        rules: RuleStore,
        reconciler: RuleReconciler,
        unsubscriber: Unsubscriber,
    ) -> Self {
        Self {
            mailbox,
            classifier,
            rules,
            reconciler,
            unsubscriber,
            examples: Vec::new(),
            max_messages: TriageConfig::default().max_messages,
            auto_unsubscribe: false,
            paid_senders: Vec::new(),
        }
    }

    /// Wire a runner from configuration: loads the rule store and examples.
    pub async fn from_config(
        config: &TriageConfig,
        mailbox: Arc<dyn Mailbox>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        let rules = RuleStore::load(&config.rules_path).await;
        let examples = match &config.examples_path {
            Some(path) => load_examples(path).await,
            None => Vec::new(),
        };
        let classifier = Classifier::new(llm).allow_new_categories(config.allow_new_categories);
        let reconciler = RuleReconciler::new(AuditLog::new(&config.audit_log_path));
        let unsubscriber = Unsubscriber::new(UnsubscribeLog::new(&config.unsubscribe_log_path))?;

        Ok(Self::new(mailbox, classifier, rules, reconciler, unsubscriber)
            .with_examples(examples)
            .with_max_messages(config.max_messages)
            .with_auto_unsubscribe(config.auto_unsubscribe, config.paid_senders.clone()))
    }

    pub fn with_examples(mut self, examples: Vec<FewShotExample>) -> Self {
        self.examples = examples;
        self
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages.max(1);
        self
    }

    /// Treat newsletters from senders not in `paid_senders` as unpaid.
    pub fn with_auto_unsubscribe(mut self, enabled: bool, paid_senders: Vec<String>) -> Self {
        self.auto_unsubscribe = enabled;
        self.paid_senders = paid_senders;
        self
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    /// Process up to `max_messages` unread messages.
    pub async fn run(&mut self) -> std::result::Result<RunSummary, MailboxError> {
        let ids = self.mailbox.list_unread(self.max_messages).await?;
        let mut summary = RunSummary {
            found: ids.len(),
            ..Default::default()
        };
        info!(count = ids.len(), "Unread messages found");
        if ids.is_empty() {
            return Ok(summary);
        }

        let labels = self.mailbox.list_labels().await?;
        let vocabulary = Vocabulary::build(self.rules.keys(), labels.iter().map(|l| &l.name));
        info!(
            size = vocabulary.len(),
            from_labels = vocabulary.label_count(),
            model = %self.classifier.model_name(),
            "Category vocabulary ready"
        );

        for id in &ids {
            let outcome = match self.process_message(id, &vocabulary).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(id = %id, error = %e, "Failed to process message");
                    MessageOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            summary.record(id, outcome);
        }

        info!(
            found = summary.found,
            classified = summary.classified,
            skipped = summary.skipped,
            failed = summary.failed,
            new_categories = summary.new_categories,
            unsubscribed = summary.unsubscribed,
            "Triage run complete"
        );
        Ok(summary)
    }

    async fn process_message(
        &mut self,
        id: &str,
        vocabulary: &Vocabulary,
    ) -> std::result::Result<MessageOutcome, TriageError> {
        let message = self.mailbox.fetch(id).await?;
        let examples = (!self.examples.is_empty()).then_some(self.examples.as_slice());

        let outcome = self
            .classifier
            .classify(
                &message.subject,
                &message.sender,
                &message.body,
                vocabulary.entries(),
                examples,
            )
            .await;

        let Some(category) = outcome.result.category.clone() else {
            let reason = skip_reason(outcome.diagnostic.as_ref());
            warn!(id = %id, subject = %message.subject, reason = %reason, "No category, leaving message in inbox");
            return Ok(MessageOutcome::Skipped { reason });
        };
        let result = self.with_newsletter_signals(outcome.result, &message);

        let reconciliation = self
            .reconciler
            .reconcile(&category, &mut self.rules, provenance_for(vocabulary))
            .await?;

        let label = reconciliation.rule.label.clone();
        let label_id = label_id_for(self.mailbox.as_ref(), &label).await?;
        self.mailbox.move_to_label(id, &label_id).await?;
        info!(
            id = %id,
            subject = %message.subject,
            category = %reconciliation.key,
            label = %label,
            "Message moved"
        );

        let unsubscribed = match &message.list_unsubscribe {
            Some(header) if result.is_newsletter && result.is_unpaid => self
                .unsubscriber
                .try_unsubscribe(&message.subject, header)
                .await
                .is_some(),
            _ => false,
        };

        Ok(MessageOutcome::Moved {
            category: reconciliation.key,
            label,
            new_category: reconciliation.is_new,
            unsubscribed,
        })
    }

    /// Fill the unpaid flag and unsubscribe URL, which the model never sets.
    fn with_newsletter_signals(
        &self,
        mut result: ClassificationResult,
        message: &MailMessage,
    ) -> ClassificationResult {
        result.unsubscribe_url = message
            .list_unsubscribe
            .as_deref()
            .and_then(UnsubscribeTarget::parse)
            .map(|t| t.to_string());
        result.is_unpaid = result.is_newsletter
            && self.auto_unsubscribe
            && !is_sender_listed(&self.paid_senders, &message.sender);
        result
    }
}

/// The classification saw mailbox labels whenever any entered the vocabulary.
fn provenance_for(vocabulary: &Vocabulary) -> Provenance {
    if vocabulary.label_count() > 0 {
        Provenance::ModelResponseAndLabels
    } else {
        Provenance::ModelResponse
    }
}

fn skip_reason(diagnostic: Option<&Diagnostic>) -> String {
    match diagnostic {
        None => "model answered unknown".to_string(),
        Some(Diagnostic::ModelFailure { reason }) => format!("model call failed: {reason}"),
        Some(Diagnostic::UnexpectedOutput { raw }) => format!("unexpected model output '{raw}'"),
        Some(other) => other.label().to_string(),
    }
}
