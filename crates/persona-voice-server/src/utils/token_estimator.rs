//! Approximate token counting for the context budget check.
//!
//! Neither strategy is a real tokenizer. Both are cheap, deterministic
//! estimates that only need to be monotone enough to decide when the stored
//! history should be compacted.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::config::EstimatorKind;

/// Words and JSON punctuation, ASCII word characters only.
static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9_]+|[{}\[\]:,]").expect("valid token pattern"));

pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// Counts word runs and structural JSON characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternEstimator;

impl TokenEstimator for PatternEstimator {
    fn estimate(&self, text: &str) -> usize {
        TOKEN_PATTERN.find_iter(text).count()
    }
}

/// Whitespace words times 1.3, plus a small formatting overhead.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordRatioEstimator;

impl TokenEstimator for WordRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let words = text.split_whitespace().count();
        ((words as f64 * 1.3) + 5.0).ceil() as usize
    }
}

pub fn estimator_for(kind: EstimatorKind) -> Arc<dyn TokenEstimator> {
    match kind {
        EstimatorKind::Pattern => Arc::new(PatternEstimator),
        EstimatorKind::WordRatio => Arc::new(WordRatioEstimator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_counts_words_and_punctuation() {
        // { " userInput " : [ ] , " modelResponse " : [ ] }
        let text = r#"{"userInput":[],"modelResponse":[]}"#;
        // words: userInput, modelResponse; punctuation: { : [ ] , : [ ] }
        assert_eq!(PatternEstimator.estimate(text), 11);
    }

    #[test]
    fn test_pattern_ignores_quotes_and_spaces() {
        assert_eq!(PatternEstimator.estimate("hello   world"), 2);
        assert_eq!(PatternEstimator.estimate("\"hi\" . !"), 1);
        assert_eq!(PatternEstimator.estimate(""), 0);
    }

    #[test]
    fn test_word_ratio_estimation() {
        let text = "Ini adalah dokumen test yang berisi informasi";
        // 7 * 1.3 + 5 = 14.1 -> 15
        assert_eq!(WordRatioEstimator.estimate(text), 15);
    }

    #[test]
    fn test_word_ratio_empty_string() {
        assert_eq!(WordRatioEstimator.estimate(""), 0);
    }

    #[test]
    fn test_estimator_for_kind() {
        let text = "one two three";
        assert_eq!(estimator_for(EstimatorKind::Pattern).estimate(text), 3);
        assert_eq!(estimator_for(EstimatorKind::WordRatio).estimate(text), 9);
    }
}
