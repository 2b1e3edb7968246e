//! Candidate category set offered to the model.
//!
//! Rule store keys come first in stored order, followed by mailbox label
//! names that are not already present. Comparison is trimmed and
//! case-insensitive.

/// Normalize a category or label for comparison.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Ordered, de-duplicated candidate categories for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    entries: Vec<String>,
    normalized: Vec<String>,
    /// Entries before this index came from the rule store.
    rule_count: usize,
}

impl Vocabulary {
    /// Merge rule keys with mailbox label names.
    ///
    /// Rule keys keep their stored spelling; labels are added lowercased and
    /// trimmed. Blank labels are dropped.
    pub fn build<K, L>(
        rule_keys: impl IntoIterator<Item = K>,
        mailbox_labels: impl IntoIterator<Item = L>,
    ) -> Self
    where
        K: AsRef<str>,
        L: AsRef<str>,
    {
        let mut vocabulary = Self::default();
        for key in rule_keys {
            vocabulary.push(key.as_ref().to_string());
        }
        vocabulary.rule_count = vocabulary.entries.len();
        for label in mailbox_labels {
            let label = normalize(label.as_ref());
            if !label.is_empty() {
                vocabulary.push(label);
            }
        }
        vocabulary
    }

    fn push(&mut self, entry: String) {
        let key = normalize(&entry);
        if key.is_empty() || self.normalized.contains(&key) {
            return;
        }
        self.normalized.push(key);
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by normalized comparison, returning its stored spelling.
    pub fn find(&self, category: &str) -> Option<&str> {
        let key = normalize(category);
        self.normalized
            .iter()
            .position(|n| *n == key)
            .map(|i| self.entries[i].as_str())
    }

    /// True if `category` is only in the vocabulary because of a mailbox label.
    pub fn is_label_derived(&self, category: &str) -> bool {
        let key = normalize(category);
        self.normalized
            .iter()
            .position(|n| *n == key)
            .is_some_and(|i| i >= self.rule_count)
    }

    /// Number of entries contributed by mailbox labels.
    pub fn label_count(&self) -> usize {
        self.entries.len() - self.rule_count
    }
}

/// Plain-sequence form of [`Vocabulary::build`].
pub fn build_vocabulary<K, L>(
    rule_keys: impl IntoIterator<Item = K>,
    mailbox_labels: impl IntoIterator<Item = L>,
) -> Vec<String>
where
    K: AsRef<str>,
    L: AsRef<str>,
{
    Vocabulary::build(rule_keys, mailbox_labels).into_entries()
}
