//! Topic-exchange binding patterns.
//!
//! Routing keys are dot-separated words. In a binding pattern `*` matches
//! exactly one word and `#` matches zero or more words, so `stock.#` matches
//! `stock`, `stock.bajo` and `stock.lote.danado`, while `stock.*` only matches
//! the two-word keys.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("binding pattern must not be empty")]
    Empty,

    #[error("binding pattern {0:?} contains an empty word")]
    EmptyWord(String),
}

/// A validated binding pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingPattern(String);

impl BindingPattern {
    pub fn new(pattern: impl Into<String>) -> Result<Self, PatternError> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        if pattern.split('.').any(str::is_empty) {
            return Err(PatternError::EmptyWord(pattern));
        }
        Ok(Self(pattern))
    }

    /// Pattern matching every routing key.
    pub fn all() -> Self {
        Self("#".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, routing_key: &str) -> bool {
        topic_matches(&self.0, routing_key)
    }
}

impl core::fmt::Display for BindingPattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for BindingPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Pure topic-exchange match of `routing_key` against `pattern`.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.split_first(), key.split_first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some((&"#", rest)), _) => {
            match_words(rest, key) || (!key.is_empty() && match_words(pattern, &key[1..]))
        }
        (Some(_), None) => false,
        (Some((&"*", rest)), Some((_, key_rest))) => match_words(rest, key_rest),
        (Some((word, rest)), Some((key_word, key_rest))) => {
            word == key_word && match_words(rest, key_rest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn literal_patterns_match_exactly() {
        assert!(topic_matches("stock.bajo", "stock.bajo"));
        assert!(!topic_matches("stock.bajo", "stock.lote_danado"));
        assert!(!topic_matches("stock.bajo", "stock.bajo.extra"));
    }

    #[test]
    fn star_matches_exactly_one_word() {
        assert!(topic_matches("orden.*", "orden.generada"));
        assert!(!topic_matches("orden.*", "orden"));
        assert!(!topic_matches("orden.*", "orden.generada.extra"));
        assert!(topic_matches("*.stock.bajo", "external.stock.bajo"));
    }

    #[test]
    fn hash_matches_zero_or_more_words() {
        assert!(topic_matches("#", "anything.at.all"));
        assert!(topic_matches("external.#", "external"));
        assert!(topic_matches("external.#", "external.alerta.inventario"));
        assert!(topic_matches("proveedor.#.actualizada", "proveedor.evaluacion.actualizada"));
        assert!(topic_matches("proveedor.#.actualizada", "proveedor.actualizada"));
        assert!(!topic_matches("external.#", "stock.bajo"));
    }

    #[test]
    fn validation_rejects_empty_words() {
        assert_eq!(BindingPattern::new(""), Err(PatternError::Empty));
        assert!(matches!(BindingPattern::new("stock..bajo"), Err(PatternError::EmptyWord(_))));
        assert!(BindingPattern::new("stock.#").is_ok());
    }

    proptest! {
        /// Property: a key always matches itself and `#`.
        #[test]
        fn key_matches_itself_and_wildcard(words in prop::collection::vec("[a-z_]{1,8}", 1..5)) {
            let key = words.join(".");
            prop_assert!(topic_matches(&key, &key));
            prop_assert!(topic_matches("#", &key));
            let first_then_hash = format!("{}.#", words[0]);
            prop_assert!(topic_matches(&first_then_hash, &key));
        }

        /// Property: `*`-only patterns match exactly keys with the same word count.
        #[test]
        fn stars_count_words(words in prop::collection::vec("[a-z]{1,6}", 1..5), stars in 1usize..5) {
            let key = words.join(".");
            let pattern = vec!["*"; stars].join(".");
            prop_assert_eq!(topic_matches(&pattern, &key), stars == words.len());
        }
    }
}
