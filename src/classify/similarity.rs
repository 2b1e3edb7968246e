//! String similarity used to salvage near-miss model responses.

use super::vocabulary::normalize;

/// Default minimum similarity for a fuzzy match.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Absorbs float rounding so that a score of exactly the threshold passes.
const SCORE_EPSILON: f64 = 1e-9;

/// A normalized similarity score in `[0.0, 1.0]`; 1.0 means identical.
pub trait Similarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// `1 - levenshtein(a, b) / max(len(a), len(b))`, counted in chars.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedLevenshtein;

impl Similarity for NormalizedLevenshtein {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let longest = a.len().max(b.len());
        if longest == 0 {
            return 1.0;
        }
        1.0 - levenshtein(&a, &b) as f64 / longest as f64
    }
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Finds the closest candidate above a threshold.
pub struct FuzzyMatcher {
    similarity: Box<dyn Similarity>,
    threshold: f64,
}

impl FuzzyMatcher {
    pub fn new(similarity: Box<dyn Similarity>, threshold: f64) -> Self {
        Self {
            similarity,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Best-scoring candidate with `score >= threshold`.
    ///
    /// Candidates are compared in normalized form but returned as given.
    /// On a tie the earlier candidate wins.
    pub fn best_match<'a>(&self, needle: &str, candidates: &'a [String]) -> Option<(&'a str, f64)> {
        let needle = normalize(needle);
        let mut best: Option<(&'a str, f64)> = None;
        for candidate in candidates {
            let score = self.similarity.score(&needle, &normalize(candidate));
            if score + SCORE_EPSILON < self.threshold {
                continue;
            }
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((candidate.as_str(), score));
            }
        }
        best
    }
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new(Box::new(NormalizedLevenshtein), DEFAULT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(NormalizedLevenshtein.score("rechnung", "rechnung"), 1.0);
        assert_eq!(NormalizedLevenshtein.score("", ""), 1.0);
    }

    #[test]
    fn single_substitution() {
        let score = NormalizedLevenshtein.score("newslatter", "newsletter");
        assert!((score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn counts_chars_not_bytes() {
        // one substitution over six chars, although "ü" is two bytes
        let score = NormalizedLevenshtein.score("bücher", "bucher");
        assert!((score - (1.0 - 1.0 / 6.0)).abs() < 1e-9);
    }

    #[test]
    fn completely_different() {
        assert_eq!(NormalizedLevenshtein.score("abc", "xyz"), 0.0);
        assert_eq!(NormalizedLevenshtein.score("", "abc"), 0.0);
    }

    #[test]
    fn matcher_finds_typo() {
        let matcher = FuzzyMatcher::default();
        let vocab = candidates(&["newsletter", "rechnung"]);
        let (entry, score) = matcher.best_match("newslatter", &vocab).unwrap();
        assert_eq!(entry, "newsletter");
        assert!(score >= DEFAULT_THRESHOLD);
    }

    #[test]
    fn matcher_rejects_below_threshold() {
        let matcher = FuzzyMatcher::default();
        let vocab = candidates(&["newsletter", "rechnung"]);
        assert!(matcher.best_match("werbung", &vocab).is_none());
    }

    #[test]
    fn matcher_threshold_is_inclusive() {
        // "abcde" vs "abcdx": 1 - 1/5 = 0.8 exactly
        let matcher = FuzzyMatcher::default();
        let vocab = candidates(&["abcdx"]);
        assert!(matcher.best_match("abcde", &vocab).is_some());
    }

    #[test]
    fn matcher_prefers_higher_score() {
        let matcher = FuzzyMatcher::new(Box::new(NormalizedLevenshtein), 0.5);
        let vocab = candidates(&["rechnungen", "rechnung"]);
        let (entry, _) = matcher.best_match("rechnunk", &vocab).unwrap();
        assert_eq!(entry, "rechnung");
    }

    #[test]
    fn matcher_returns_original_spelling() {
        let matcher = FuzzyMatcher::default();
        let vocab = candidates(&["Newsletter"]);
        let (entry, _) = matcher.best_match("newslatter", &vocab).unwrap();
        assert_eq!(entry, "Newsletter");
    }

    struct AlwaysHalf;

    impl Similarity for AlwaysHalf {
        fn score(&self, _a: &str, _b: &str) -> f64 {
            0.5
        }
    }

    #[test]
    fn matcher_accepts_custom_similarity() {
        let matcher = FuzzyMatcher::new(Box::new(AlwaysHalf), 0.5);
        let vocab = candidates(&["first", "second"]);
        // tie → first candidate
        assert_eq!(matcher.best_match("zzz", &vocab).unwrap().0, "first");
        assert_eq!(matcher.threshold(), 0.5);
    }
}
