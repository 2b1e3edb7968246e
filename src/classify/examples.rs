//! Loading few-shot examples from disk.

use std::path::Path;

use tokio::fs;
use tracing::{info, warn};

use crate::classify::types::FewShotExample;

/// Load a JSON array of examples.
///
/// A missing or malformed file yields no examples; classification then runs
/// without an examples section.
pub async fn load_examples(path: &Path) -> Vec<FewShotExample> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read few-shot examples");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<FewShotExample>>(&content) {
        Ok(examples) => {
            info!(path = %path.display(), count = examples.len(), "Loaded few-shot examples");
            examples
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Invalid few-shot examples file");
            Vec::new()
        }
    }
}
