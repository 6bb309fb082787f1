//! Gemini Content Generator
//!
//! Ruft `generateContent` der Generative Language API auf. Die Antwort wird
//! per `responseSchema` auf das Prompt-JSON beschränkt und danach trotzdem
//! validiert.

use super::fetcher::{ContentGenerator, GeneratorError};
use super::prompt::{Prompt, PromptRequest, PromptValidationError};
use crate::config::GeneratorConfig;
use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

// ============================================================================
// GENERATOR
// ============================================================================

#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, GeneratorError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(GeneratorError::NotConfigured)?;

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    /// Baut den Anweisungstext für das Modell
    pub fn instruction(request: &PromptRequest) -> String {
        let mut text = String::from(
            "You help two people in a language exchange call. \
             Suggest one open conversation question the teaching partner can ask.",
        );

        if let Some(language) = &request.language {
            text.push_str(&format!(" Write the question in {}.", language));
        }

        if request.interests.is_empty() {
            text.push_str(" The topic can be anything from everyday life.");
        } else {
            text.push_str(&format!(
                " Base it on these interests: {}.",
                request.interests.join(", ")
            ));
        }

        text.push_str(&format!(
            " Difficulty: {}. Add a short context hint for the teaching partner.",
            request.difficulty.as_str()
        ));

        if !request.excluding.is_empty() {
            text.push_str(" Do not repeat any of these questions:");
            for question in &request.excluding {
                text.push_str(&format!("\n- {}", question));
            }
        }

        text
    }

    fn request_body(request: &PromptRequest) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: Self::instruction(request),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: json!({
                    "type": "OBJECT",
                    "properties": {
                        "question": { "type": "STRING" },
                        "context": { "type": "STRING" },
                        "difficulty": { "type": "STRING", "enum": ["easy", "medium", "hard"] }
                    },
                    "required": ["question", "context", "difficulty"]
                }),
                temperature: 0.9,
            },
        }
    }

    /// Extrahiert und validiert den Prompt aus der API-Antwort
    fn parse_response(body: &str) -> Result<Prompt, GeneratorError> {
        let response: GeminiResponse = serde_json::from_str(body)
            .map_err(|e| PromptValidationError::Malformed(e.to_string()))?;

        let text = response
            .candidates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .next()
            .ok_or(GeneratorError::EmptyResponse)?;

        Ok(Prompt::from_generated_json(&text)?)
    }
}

impl ContentGenerator for GeminiGenerator {
    fn generate_prompt(&self, request: PromptRequest) -> BoxFuture<'static, Result<Prompt, GeneratorError>> {
        let this = self.clone();
        Box::pin(async move {
            let resp = this
                .client
                .post(this.endpoint())
                .query(&[("key", this.api_key.as_str())])
                .json(&Self::request_body(&request))
                .send()
                .await?;

            let status = resp.status();
            let body = resp.text().await?;
            if !status.is_success() {
                return Err(GeneratorError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            Self::parse_response(&body)
        })
    }
}

impl std::fmt::Debug for GeminiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGenerator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teaching_aid::prompt::Difficulty;
    use std::time::Duration;

    fn config(api_key: Option<&str>) -> GeneratorConfig {
        GeneratorConfig {
            base_url: "https://generativelanguage.googleapis.com/".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key: api_key.map(str::to_string),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            GeminiGenerator::new(&config(None)),
            Err(GeneratorError::NotConfigured)
        ));
        assert!(matches!(
            GeminiGenerator::new(&config(Some("  "))),
            Err(GeneratorError::NotConfigured)
        ));
    }

    #[test]
    fn test_endpoint() {
        let generator = GeminiGenerator::new(&config(Some("key"))).unwrap();
        assert_eq!(
            generator.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn test_instruction_mentions_interests_and_exclusions() {
        let request = PromptRequest {
            interests: vec!["football".to_string(), "jazz".to_string()],
            language: Some("German".to_string()),
            difficulty: Difficulty::Hard,
            excluding: vec!["Was hast du gestern gemacht?".to_string()],
        };

        let text = GeminiGenerator::instruction(&request);
        assert!(text.contains("football, jazz"));
        assert!(text.contains("in German"));
        assert!(text.contains("Difficulty: hard"));
        assert!(text.contains("- Was hast du gestern gemacht?"));
    }

    #[test]
    fn test_request_body_uses_json_schema() {
        let body = serde_json::to_value(GeminiGenerator::request_body(&PromptRequest::default())).unwrap();
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(
            body["generationConfig"]["responseSchema"]["required"],
            json!(["question", "context", "difficulty"])
        );
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": "{\"question\":\"Quel est ton plat préféré ?\",\"context\":\"Food\",\"difficulty\":\"easy\"}" }]
                }
            }]
        })
        .to_string();

        let prompt = GeminiGenerator::parse_response(&body).unwrap();
        assert_eq!(prompt.question, "Quel est ton plat préféré ?");
        assert_eq!(prompt.difficulty, Difficulty::Easy);
    }

    #[test]
    fn test_parse_empty_or_malformed_response() {
        assert!(matches!(
            GeminiGenerator::parse_response(r#"{"candidates": []}"#),
            Err(GeneratorError::EmptyResponse)
        ));
        assert!(matches!(
            GeminiGenerator::parse_response(r#"{"candidates": [{"content": {"parts": [{"text": "sure!"}]}}]}"#),
            Err(GeneratorError::Invalid(_))
        ));
    }
}
