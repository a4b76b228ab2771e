//! Blocklist moderation for questions and responses
//!
//! A single case-insensitive, whole-word regular expression is built from
//! the built-in list plus any operator-supplied terms. A term must be
//! delimited by the text edges or by non-word characters, so punctuated
//! terms such as `c++` match too. Any match blocks the whole text; nothing
//! is partially redacted.

use crate::error::{Result, WagptError};
use regex::Regex;

/// Built-in blocked terms
pub const DEFAULT_BLOCKED_WORDS: &[&str] = &[
    "lgbt",
    "lesbian",
    "gay",
    "homosexual",
    "homoseksual",
    "bisexual",
    "biseksual",
    "transgender",
    "fuck",
    "sex",
    "ngentot",
    "entot",
    "ngewe",
    "ewe",
    "masturbate",
    "masturbasi",
    "coli",
    "colmek",
    "jilmek",
    "cock",
    "penis",
    "kontol",
    "vagina",
    "memek",
    "porn",
    "porno",
    "bokep",
];

/// Whole-word blocklist matcher
#[derive(Debug, Clone)]
pub struct ModerationFilter {
    pattern: Regex,
}

impl ModerationFilter {
    /// Build a filter from the built-in list and an optional pipe-separated
    /// extension (e.g. `"foo|bar baz"`).
    ///
    /// # Errors
    ///
    /// Returns [`WagptError::Config`] if the combined pattern fails to compile
    ///
    /// # Examples
    ///
    /// ```
    /// use wagpt::moderation::ModerationFilter;
    ///
    /// let filter = ModerationFilter::new(Some("spoiler")).unwrap();
    /// assert!(filter.is_blocked("no SPOILER please"));
    /// assert!(!filter.is_blocked("spoilers are fine"));
    /// ```
    pub fn new(extra: Option<&str>) -> Result<Self> {
        let mut words: Vec<String> = DEFAULT_BLOCKED_WORDS
            .iter()
            .map(|word| word.to_string())
            .collect();

        if let Some(extra) = extra {
            words.extend(
                extra
                    .split('|')
                    .map(|word| word.trim().to_lowercase())
                    .filter(|word| !word.is_empty()),
            );
        }

        let alternation = words
            .iter()
            .map(|word| regex::escape(word))
            .collect::<Vec<_>>()
            .join("|");

        let pattern = Regex::new(&format!(r"(?i)(?:^|\W)(?:{})(?:\W|$)", alternation))
            .map_err(|e| WagptError::Config(format!("Invalid blocked word list: {}", e)))?;

        Ok(Self { pattern })
    }

    /// Returns true if `text` contains any blocked word between non-word delimiters
    pub fn is_blocked(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> ModerationFilter {
        ModerationFilter::new(None).unwrap()
    }

    #[test]
    fn test_blocks_builtin_word_case_insensitive() {
        assert!(filter().is_blocked("show me PORN"));
        assert!(filter().is_blocked("Porno?"));
    }

    #[test]
    fn test_whole_word_only() {
        let filter = filter();
        assert!(!filter.is_blocked("Sussex is a county"));
        assert!(!filter.is_blocked("the sextant is old"));
        assert!(!filter.is_blocked("sewer"));
        assert!(filter.is_blocked("what is sex education"));
    }

    #[test]
    fn test_clean_text_passes() {
        assert!(!filter().is_blocked("what is 2+2"));
        assert!(!filter().is_blocked(""));
    }

    #[test]
    fn test_extra_words_are_lowercased_and_trimmed() {
        let filter = ModerationFilter::new(Some(" Crypto | | NFT ")).unwrap();
        assert!(filter.is_blocked("buy crypto now"));
        assert!(filter.is_blocked("my nft"));
        assert!(!filter.is_blocked("cryptography"));
    }

    #[test]
    fn test_extra_words_are_escaped() {
        let filter = ModerationFilter::new(Some("a.b")).unwrap();
        assert!(filter.is_blocked("say a.b"));
        assert!(!filter.is_blocked("say axb"));
    }

    #[test]
    fn test_punctuated_extra_words_match() {
        let filter = ModerationFilter::new(Some("c++|#nsfw")).unwrap();
        assert!(filter.is_blocked("teach me c++ today"));
        assert!(filter.is_blocked("teach me C++"));
        assert!(filter.is_blocked("#NSFW"));
        assert!(filter.is_blocked("any #nsfw, pics?"));
        assert!(!filter.is_blocked("teach me c"));
        assert!(!filter.is_blocked("tag#nsfw"));
    }
}
