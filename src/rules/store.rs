//! Persisted category → rule mapping.
//!
//! On disk this is a JSON object keyed by category, values
//! `{"keywords": [...], "label": "..."}`, written pretty-printed with
//! non-ASCII characters kept literally. Key order is preserved.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::classify::normalize;
use crate::error::RuleStoreError;

/// A category's rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Reserved for local heuristics; written empty by the reconciler.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Mailbox label name used for this category.
    #[serde(default)]
    pub label: String,
}

impl Rule {
    /// A fresh rule for `category`: no keywords, capitalized label.
    pub fn for_category(category: &str) -> Self {
        Self {
            keywords: Vec::new(),
            label: capitalize(category.trim()),
        }
    }
}

/// Uppercase the first character, leave the rest untouched.
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Ordered mapping from category key to [`Rule`], bound to a file.
#[derive(Debug, Clone)]
pub struct RuleStore {
    path: PathBuf,
    rules: Vec<(String, Rule)>,
}

impl RuleStore {
    /// An empty store that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rules: Vec::new(),
        }
    }

    /// Load the store from `path`.
    ///
    /// A missing, unreadable or malformed file yields an empty store and a
    /// warning. Entries that are not rule objects are skipped; entries with a
    /// blank label get the capitalized key as label.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Rules could not be loaded, starting empty");
                return Self::empty(path);
            }
        };

        match parse_rules(&content) {
            Ok(rules) => {
                debug!(path = %path.display(), count = rules.len(), "Loaded rules");
                Self { path, rules }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Rules file is invalid, starting empty");
                Self::empty(path)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Category keys in stored order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(k, _)| k.as_str())
    }

    /// Exact-key lookup.
    pub fn get(&self, key: &str) -> Option<&Rule> {
        self.rules.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }

    /// Lookup by normalized comparison; returns the stored key and rule.
    pub fn find(&self, category: &str) -> Option<(&str, &Rule)> {
        let wanted = normalize(category);
        self.rules
            .iter()
            .find(|(k, _)| normalize(k) == wanted)
            .map(|(k, r)| (k.as_str(), r))
    }

    /// Append a rule. Existing keys are never overwritten.
    pub(crate) fn insert(&mut self, key: String, rule: Rule) -> bool {
        if self.get(&key).is_some() {
            return false;
        }
        self.rules.push((key, rule));
        true
    }

    /// Undo an `insert` whose persistence failed.
    pub(crate) fn remove(&mut self, key: &str) {
        self.rules.retain(|(k, _)| k != key);
    }

    /// Pretty-printed JSON of the whole store.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut map = serde_json::Map::with_capacity(self.rules.len());
        for (key, rule) in &self.rules {
            map.insert(key.clone(), serde_json::to_value(rule)?);
        }
        serde_json::to_string_pretty(&serde_json::Value::Object(map))
    }

    /// Write the store to its file.
    ///
    /// Writes a sibling temp file and renames it over the target so a crash
    /// never leaves a half-written store.
    pub async fn persist(&self) -> Result<(), RuleStoreError> {
        let json = self.to_json()?;
        let io_err = |source| RuleStoreError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, json.as_bytes()).await.map_err(io_err)?;
        fs::rename(&tmp_path, &self.path).await.map_err(io_err)?;
        debug!(path = %self.path.display(), count = self.rules.len(), "Persisted rules");
        Ok(())
    }
}

fn parse_rules(content: &str) -> Result<Vec<(String, Rule)>, serde_json::Error> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(content)?;
    let mut rules = Vec::with_capacity(map.len());
    for (key, value) in map {
        if normalize(&key).is_empty() {
            warn!("Skipping rule with blank category key");
            continue;
        }
        match serde_json::from_value::<Rule>(value) {
            Ok(mut rule) => {
                if rule.label.trim().is_empty() {
                    rule.label = capitalize(key.trim());
                }
                rules.push((key, rule));
            }
            Err(e) => {
                warn!(category = %key, error = %e, "Skipping malformed rule");
            }
        }
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalize_first_char_only() {
        assert_eq!(capitalize("rechnung"), "Rechnung");
        assert_eq!(capitalize("ärzte"), "Ärzte");
        assert_eq!(capitalize("newsLetter"), "NewsLetter");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn rule_for_category() {
        let rule = Rule::for_category("rechnung");
        assert!(rule.keywords.is_empty());
        assert_eq!(rule.label, "Rechnung");
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::load(dir.path().join("regeln.json")).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regeln.json");
        std::fs::write(&path, "{ this is not json").unwrap();
        let store = RuleStore::load(&path).await;
        assert!(store.is_empty());
        assert_eq!(store.path(), path);
    }

    #[tokio::test]
    async fn non_object_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regeln.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(RuleStore::load(&path).await.is_empty());
    }

    #[tokio::test]
    async fn load_preserves_order_and_fills_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regeln.json");
        std::fs::write(
            &path,
            r#"{
                "zeitung": {"keywords": [], "label": "Zeitung"},
                "arbeit": {"keywords": ["meeting"]},
                "kaputt": 42,
                "bank": {"keywords": [], "label": "Bank"}
            }"#,
        )
        .unwrap();

        let store = RuleStore::load(&path).await;
        let keys: Vec<&str> = store.keys().collect();
        assert_eq!(keys, vec!["zeitung", "arbeit", "bank"]);
        assert_eq!(store.get("arbeit").unwrap().label, "Arbeit");
        assert_eq!(store.get("arbeit").unwrap().keywords, vec!["meeting"]);
    }

    #[test]
    fn find_is_case_and_space_insensitive() {
        let mut store = RuleStore::empty("unused.json");
        store.insert("Rechnung".into(), Rule::for_category("Rechnung"));
        let (key, rule) = store.find("  rechnung ").unwrap();
        assert_eq!(key, "Rechnung");
        assert_eq!(rule.label, "Rechnung");
        assert!(store.get("rechnung").is_none());
    }

    #[test]
    fn insert_never_overwrites() {
        let mut store = RuleStore::empty("unused.json");
        assert!(store.insert("a".into(), Rule::for_category("a")));
        let changed = Rule {
            keywords: vec!["x".into()],
            label: "Other".into(),
        };
        assert!(!store.insert("a".into(), changed));
        assert_eq!(store.get("a").unwrap().label, "A");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn persist_round_trips_non_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regeln.json");
        let mut store = RuleStore::empty(&path);
        store.insert("bücher".into(), Rule::for_category("bücher"));
        store.insert("arzt".into(), Rule::for_category("arzt"));
        store.persist().await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"Bücher\""));
        assert!(raw.contains("\n  \"bücher\": {"));
        assert!(raw.find("bücher").unwrap() < raw.find("arzt").unwrap());

        let reloaded = RuleStore::load(&path).await;
        let keys: Vec<&str> = reloaded.keys().collect();
        assert_eq!(keys, vec!["bücher", "arzt"]);
        assert!(!dir.path().join("regeln.json.tmp").exists());
    }

    #[tokio::test]
    async fn persist_to_unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be
        let path = dir.path().join("regeln.json");
        std::fs::create_dir(&path).unwrap();
        let mut store = RuleStore::empty(&path);
        store.insert("a".into(), Rule::for_category("a"));
        assert!(matches!(store.persist().await, Err(RuleStoreError::Io { .. })));
    }
}
