//! Teaching-Aid Fetcher
//!
//! Holt genau einen Gesprächsimpuls vom externen Generator und fällt bei
//! Fehlern, Timeouts, kaputten Daten oder Duplikaten auf den festen Pool zurück.

use super::prompt::{pick_fallback, Prompt, PromptRequest, PromptValidationError};
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Content generator is not configured")]
    NotConfigured,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Generator API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Generator returned no candidates")]
    EmptyResponse,

    #[error("Invalid prompt: {0}")]
    Invalid(#[from] PromptValidationError),

    #[error("Generator timed out after {0:?}")]
    Timeout(Duration),
}

// ============================================================================
// CONTENT GENERATOR
// ============================================================================

/// Externer Generator für Gesprächsimpulse
pub trait ContentGenerator: Send + Sync {
    fn generate_prompt(&self, request: PromptRequest) -> BoxFuture<'static, Result<Prompt, GeneratorError>>;
}

/// Generator ohne Backend, liefert immer `NotConfigured`
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredGenerator;

impl ContentGenerator for UnconfiguredGenerator {
    fn generate_prompt(&self, _request: PromptRequest) -> BoxFuture<'static, Result<Prompt, GeneratorError>> {
        Box::pin(async { Err(GeneratorError::NotConfigured) })
    }
}

// ============================================================================
// FETCHER
// ============================================================================

/// Herkunft eines gelieferten Impulses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptSource {
    Generated,
    /// Fallback-Pool, `reason` wird als dezenter Hinweis angezeigt
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedPrompt {
    pub prompt: Prompt,
    pub source: PromptSource,
}

#[derive(Clone)]
pub struct TeachingAidFetcher {
    generator: Arc<dyn ContentGenerator>,
    timeout: Duration,
}

impl TeachingAidFetcher {
    pub fn new(generator: Arc<dyn ContentGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Liefert immer einen Impuls
    pub async fn fetch(&self, request: PromptRequest) -> FetchedPrompt {
        let difficulty = request.difficulty;
        let excluding = request.excluding.clone();

        let result = tokio::time::timeout(self.timeout, self.generator.generate_prompt(request))
            .await
            .unwrap_or(Err(GeneratorError::Timeout(self.timeout)));

        let result = result.map(|mut prompt| {
            prompt.question = prompt.question.trim().to_string();
            prompt
        });

        let reason = match result {
            Ok(prompt) if prompt.question.is_empty() => {
                "generator returned an empty question".to_string()
            }
            Ok(prompt) if excluding.iter().any(|q| q == &prompt.question) => {
                format!("generator repeated a prompt: {}", prompt.question)
            }
            Ok(prompt) => {
                tracing::debug!("Generated teaching prompt: {}", prompt.question);
                return FetchedPrompt {
                    prompt,
                    source: PromptSource::Generated,
                };
            }
            Err(e) => e.to_string(),
        };

        tracing::warn!("Using fallback teaching prompt ({})", reason);
        FetchedPrompt {
            prompt: pick_fallback(difficulty, &excluding),
            source: PromptSource::Fallback { reason },
        }
    }
}

impl std::fmt::Debug for TeachingAidFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeachingAidFetcher")
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teaching_aid::prompt::{fallback_prompts, Difficulty};

    struct FixedGenerator(Prompt);

    impl ContentGenerator for FixedGenerator {
        fn generate_prompt(&self, _request: PromptRequest) -> BoxFuture<'static, Result<Prompt, GeneratorError>> {
            let prompt = self.0.clone();
            Box::pin(async move { Ok(prompt) })
        }
    }

    struct HangingGenerator;

    impl ContentGenerator for HangingGenerator {
        fn generate_prompt(&self, _request: PromptRequest) -> BoxFuture<'static, Result<Prompt, GeneratorError>> {
            Box::pin(futures::future::pending::<Result<Prompt, GeneratorError>>())
        }
    }

    fn request(excluding: Vec<String>) -> PromptRequest {
        PromptRequest {
            interests: vec!["cooking".to_string()],
            language: Some("Spanish".to_string()),
            difficulty: Difficulty::Medium,
            excluding,
        }
    }

    #[tokio::test]
    async fn test_generated_prompt_is_returned() {
        let prompt = Prompt::new("¿Qué cocinaste ayer?", "Cooking", Difficulty::Medium);
        let fetcher = TeachingAidFetcher::new(
            Arc::new(FixedGenerator(prompt.clone())),
            Duration::from_secs(1),
        );

        let fetched = fetcher.fetch(request(vec![])).await;
        assert_eq!(fetched.prompt, prompt);
        assert_eq!(fetched.source, PromptSource::Generated);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let fetcher = TeachingAidFetcher::new(Arc::new(HangingGenerator), Duration::from_millis(20));

        let fetched = fetcher.fetch(request(vec![])).await;
        assert!(matches!(fetched.source, PromptSource::Fallback { .. }));
        assert!(fallback_prompts().contains(&fetched.prompt));
    }

    #[tokio::test]
    async fn test_unconfigured_generator_falls_back() {
        let fetcher = TeachingAidFetcher::new(Arc::new(UnconfiguredGenerator), Duration::from_secs(1));
        let fetched = fetcher.fetch(request(vec![])).await;
        assert!(!fetched.prompt.question.is_empty());
    }

    #[tokio::test]
    async fn test_blank_question_falls_back() {
        let blank = Prompt::new("   ", "context only", Difficulty::Medium);
        let fetcher = TeachingAidFetcher::new(Arc::new(FixedGenerator(blank)), Duration::from_secs(1));

        let fetched = fetcher.fetch(request(vec![])).await;
        assert!(matches!(fetched.source, PromptSource::Fallback { .. }));
        assert!(fallback_prompts().contains(&fetched.prompt));
    }

    #[tokio::test]
    async fn test_generated_question_is_trimmed() {
        let padded = Prompt::new("  ¿Qué cocinaste ayer?\n", "Cooking", Difficulty::Medium);
        let fetcher = TeachingAidFetcher::new(Arc::new(FixedGenerator(padded)), Duration::from_secs(1));

        let fetched = fetcher.fetch(request(vec![])).await;
        assert_eq!(fetched.source, PromptSource::Generated);
        assert_eq!(fetched.prompt.question, "¿Qué cocinaste ayer?");
    }

    #[tokio::test]
    async fn test_duplicate_from_generator_falls_back_to_unused() {
        let repeated = Prompt::new("Tell me about your hometown.", "", Difficulty::Medium);
        let fetcher = TeachingAidFetcher::new(
            Arc::new(FixedGenerator(repeated.clone())),
            Duration::from_secs(1),
        );

        let excluding = vec![repeated.question.clone()];
        let fetched = fetcher.fetch(request(excluding.clone())).await;
        assert!(matches!(fetched.source, PromptSource::Fallback { .. }));
        assert!(!excluding.contains(&fetched.prompt.question));
    }
}
