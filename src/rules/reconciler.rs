//! Registers novel categories as rules.
//!
//! A category is novel when no existing key matches it under trimmed,
//! case-insensitive comparison. Novel categories are inserted under their
//! original spelling, persisted immediately, then audited.

use tracing::{info, warn};

use crate::classify::normalize;
use crate::error::RuleStoreError;
use crate::journal::{AuditLog, Provenance};
use crate::rules::store::{Rule, RuleStore};

/// What `reconcile` resolved a category to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Key as stored in the rule store.
    pub key: String,
    pub rule: Rule,
    /// True if this call created the rule.
    pub is_new: bool,
}

pub struct RuleReconciler {
    audit: AuditLog,
}

impl RuleReconciler {
    pub fn new(audit: AuditLog) -> Self {
        Self { audit }
    }

    /// Return the rule for `category`, creating it if absent.
    ///
    /// If persisting fails the insertion is rolled back and the error
    /// returned, so the in-memory store never runs ahead of the file.
    /// A failed audit write is only logged.
    pub async fn reconcile(
        &self,
        category: &str,
        store: &mut RuleStore,
        provenance: Provenance,
    ) -> Result<Reconciliation, RuleStoreError> {
        if normalize(category).is_empty() {
            return Err(RuleStoreError::InvalidCategory(category.to_string()));
        }

        if let Some((key, rule)) = store.find(category) {
            return Ok(Reconciliation {
                key: key.to_string(),
                rule: rule.clone(),
                is_new: false,
            });
        }

        let rule = Rule::for_category(category);
        store.insert(category.to_string(), rule.clone());
        if let Err(e) = store.persist().await {
            store.remove(category);
            return Err(e);
        }

        info!(
            category = %category,
            label = %rule.label,
            source = %provenance,
            "New category registered"
        );
        if let Err(e) = self
            .audit
            .record_new_category(category, &rule.label, provenance)
            .await
        {
            warn!(category = %category, error = %e, "Failed to write audit log entry");
        }

        Ok(Reconciliation {
            key: category.to_string(),
            rule,
            is_new: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        dir: tempfile::TempDir,
        reconciler: RuleReconciler,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let reconciler = RuleReconciler::new(AuditLog::new(dir.path().join("mail_log.txt")));
            Self { dir, reconciler }
        }

        fn store(&self) -> RuleStore {
            RuleStore::empty(self.dir.path().join("regeln.json"))
        }

        fn audit_text(&self) -> String {
            std::fs::read_to_string(self.dir.path().join("mail_log.txt")).unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn new_category_is_inserted_persisted_and_audited() {
        let fx = Fixture::new();
        let mut store = fx.store();

        let rec = fx
            .reconciler
            .reconcile("rechnung", &mut store, Provenance::ModelResponse)
            .await
            .unwrap();

        assert!(rec.is_new);
        assert_eq!(rec.key, "rechnung");
        assert_eq!(rec.rule.label, "Rechnung");
        assert!(rec.rule.keywords.is_empty());

        let on_disk = RuleStore::load(store.path()).await;
        assert_eq!(on_disk.get("rechnung"), Some(&rec.rule));

        let audit = fx.audit_text();
        assert_eq!(audit.matches("New category").count(), 1);
        assert!(audit.contains("- Category: rechnung"));
        assert!(audit.contains("- Source: model response\n"));
    }

    #[tokio::test]
    async fn second_call_is_idempotent() {
        let fx = Fixture::new();
        let mut store = fx.store();

        let first = fx
            .reconciler
            .reconcile("rechnung", &mut store, Provenance::ModelResponse)
            .await
            .unwrap();
        let second = fx
            .reconciler
            .reconcile("rechnung", &mut store, Provenance::ModelResponse)
            .await
            .unwrap();

        assert!(first.is_new);
        assert!(!second.is_new);
        assert_eq!(first.rule, second.rule);
        assert_eq!(store.len(), 1);
        assert_eq!(fx.audit_text().matches("New category").count(), 1);
    }

    #[tokio::test]
    async fn existing_key_matched_case_insensitively() {
        let fx = Fixture::new();
        let mut store = fx.store();
        store.insert(
            "newsletter".into(),
            Rule {
                keywords: vec![],
                label: "Newsletter".into(),
            },
        );

        let rec = fx
            .reconciler
            .reconcile(" Newsletter ", &mut store, Provenance::ModelResponse)
            .await
            .unwrap();

        assert!(!rec.is_new);
        assert_eq!(rec.key, "newsletter");
        assert_eq!(store.len(), 1);
        assert!(fx.audit_text().is_empty());
        // nothing was written
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn original_spelling_kept_as_key() {
        let fx = Fixture::new();
        let mut store = fx.store();
        let rec = fx
            .reconciler
            .reconcile("Privat", &mut store, Provenance::ModelResponseAndLabels)
            .await
            .unwrap();

        assert_eq!(rec.key, "Privat");
        assert!(store.get("Privat").is_some());
        assert!(fx.audit_text().contains("model response + mailbox labels"));
    }

    #[tokio::test]
    async fn blank_category_rejected() {
        let fx = Fixture::new();
        let mut store = fx.store();
        let result = fx
            .reconciler
            .reconcile("   ", &mut store, Provenance::ModelResponse)
            .await;
        assert!(matches!(result, Err(RuleStoreError::InvalidCategory(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn failed_persist_rolls_back() {
        let fx = Fixture::new();
        let path = fx.dir.path().join("regeln.json");
        std::fs::create_dir(&path).unwrap();
        let mut store = RuleStore::empty(&path);

        let result = fx
            .reconciler
            .reconcile("rechnung", &mut store, Provenance::ModelResponse)
            .await;

        assert!(result.is_err());
        assert!(store.is_empty());
        assert!(fx.audit_text().is_empty());
    }
}
