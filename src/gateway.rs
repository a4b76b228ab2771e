//! Backend-agnostic question answering
//!
//! [`GptGateway`] is the single `respond(question)` capability the router
//! talks to. It wraps whichever [`Provider`] was selected at startup and
//! applies moderation to the question before the call and to the
//! normalized answer after it.

use crate::config::GptConfig;
use crate::error::Result;
use crate::moderation::ModerationFilter;
use crate::providers::{create_provider, Provider};

/// Returned whenever a question or answer hits the blocklist
pub const BLOCKED_RESPONSE: &str =
    "Sorry, the AI can not response due to it is containing some blocked word 🥺";

/// Returned when the backend fails or produces nothing usable
pub const FALLBACK_RESPONSE: &str =
    "Sorry, the AI can not response for this time. Please try again after a few moment 🥺";

/// Strip artifacts some models emit before real content
///
/// Trims outer whitespace, then removes any run of leading `?`, `!`, `'`,
/// `.`, `:` and whitespace (newlines included). The result never starts or
/// ends with whitespace, so normalizing twice changes nothing.
///
/// # Examples
///
/// ```
/// use wagpt::gateway::normalize_response;
///
/// assert_eq!(normalize_response("\n\nHello!"), "Hello!");
/// assert_eq!(normalize_response("?\n!\nSure."), "Sure.");
/// ```
pub fn normalize_response(text: &str) -> String {
    text.trim()
        .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '?' | '!' | '\'' | '.' | ':'))
        .to_string()
}

/// Moderated, normalized front for one generative backend
pub struct GptGateway {
    provider: Box<dyn Provider>,
    filter: ModerationFilter,
}

impl GptGateway {
    /// Wrap an already constructed provider
    pub fn new(provider: Box<dyn Provider>, filter: ModerationFilter) -> Self {
        Self { provider, filter }
    }

    /// Select the provider and build the blocklist from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the provider or blocklist cannot be built
    pub fn from_config(config: &GptConfig) -> Result<Self> {
        let provider = create_provider(config)?;
        let filter = ModerationFilter::new(config.blocked_words.as_deref())?;
        Ok(Self::new(provider, filter))
    }

    /// Name of the wrapped provider
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Answer `question`
    ///
    /// Blocked questions return [`BLOCKED_RESPONSE`] without touching the
    /// backend. A blocked answer is discarded whole and replaced with the
    /// same string. An empty answer becomes [`FALLBACK_RESPONSE`].
    ///
    /// # Errors
    ///
    /// Propagates provider failures; the router turns them into an apology
    ///
    /// # Examples
    ///
    /// ```
    /// use async_trait::async_trait;
    /// use wagpt::error::Result;
    /// use wagpt::gateway::{GptGateway, BLOCKED_RESPONSE};
    /// use wagpt::moderation::ModerationFilter;
    /// use wagpt::providers::Provider;
    ///
    /// struct Canned;
    ///
    /// #[async_trait]
    /// impl Provider for Canned {
    ///     fn name(&self) -> &str { "canned" }
    ///     async fn generate(&self, _question: &str) -> Result<String> {
    ///         Ok(":\nFour.".to_string())
    ///     }
    /// }
    ///
    /// let gateway = GptGateway::new(Box::new(Canned), ModerationFilter::new(None).unwrap());
    /// tokio_test::block_on(async {
    ///     assert_eq!(gateway.respond("what is 2+2").await.unwrap(), "Four.");
    ///     assert_eq!(gateway.respond("porn please").await.unwrap(), BLOCKED_RESPONSE);
    /// });
    /// ```
    pub async fn respond(&self, question: &str) -> Result<String> {
        if self.filter.is_blocked(question) {
            tracing::info!(provider = self.provider.name(), "Question blocked by moderation");
            return Ok(BLOCKED_RESPONSE.to_string());
        }

        let raw = self.provider.generate(question).await?;
        let answer = normalize_response(&raw);

        if answer.is_empty() {
            tracing::warn!(provider = self.provider.name(), "Backend returned an empty answer");
            return Ok(FALLBACK_RESPONSE.to_string());
        }

        if self.filter.is_blocked(&answer) {
            tracing::info!(provider = self.provider.name(), "Answer blocked by moderation");
            return Ok(BLOCKED_RESPONSE.to_string());
        }

        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WagptError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        reply: std::result::Result<String, String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _question: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .map_err(|e| WagptError::Backend(e).into())
        }
    }

    fn gateway(reply: std::result::Result<&str, &str>) -> (GptGateway, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Scripted {
            reply: reply.map(str::to_string).map_err(str::to_string),
            calls: Arc::clone(&calls),
        };
        let gateway = GptGateway::new(
            Box::new(provider),
            ModerationFilter::new(Some("forbidden")).unwrap(),
        );
        (gateway, calls)
    }

    #[test]
    fn test_normalize_strips_leading_artifacts() {
        assert_eq!(normalize_response("\n\nHello!"), "Hello!");
        assert_eq!(normalize_response("  '.\nAnswer  "), "Answer");
        assert_eq!(normalize_response("?"), "");
        assert_eq!(normalize_response("Hello?"), "Hello?");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "\n\nHello!",
            "? ! Hello",
            ":\n: \n'x'",
            "   ",
            "plain text.",
            "!\n\n  . Answer: yes\n",
        ];
        for sample in samples {
            let once = normalize_response(sample);
            assert_eq!(normalize_response(&once), once, "sample {:?}", sample);
        }
    }

    #[tokio::test]
    async fn test_blocked_question_short_circuits() {
        let (gateway, calls) = gateway(Ok("fine"));
        let answer = gateway.respond("tell me something FORBIDDEN").await.unwrap();
        assert_eq!(answer, BLOCKED_RESPONSE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blocked_answer_is_replaced() {
        let (gateway, calls) = gateway(Ok("this is forbidden content"));
        let answer = gateway.respond("anything").await.unwrap();
        assert_eq!(answer, BLOCKED_RESPONSE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_answer_is_normalized() {
        let (gateway, _) = gateway(Ok("\n\nHello!"));
        assert_eq!(gateway.respond("hi").await.unwrap(), "Hello!");
    }

    #[tokio::test]
    async fn test_empty_answer_falls_back() {
        let (gateway, _) = gateway(Ok("\n ? \n"));
        assert_eq!(gateway.respond("hi").await.unwrap(), FALLBACK_RESPONSE);
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let (gateway, _) = gateway(Err("boom"));
        let err = gateway.respond("hi").await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
