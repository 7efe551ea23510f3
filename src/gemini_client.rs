// src/gemini_client.rs
use crate::error::RagError;
use crate::llm::{ChatModel, TextEmbedder, EMBEDDING_DIMENSION};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(60);
const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Embedding,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
        }
    }

    pub async fn generate_text(&self, prompt: &str, temperature: f32) -> Result<String, RagError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
                role: Some("user".to_string()),
            }],
            generation_config: GenerationConfig {
                temperature,
                top_k: 40,
                top_p: 0.95,
                max_output_tokens: 2048,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(GENERATE_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::ModelInvocation(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::ModelInvocation(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| RagError::ModelInvocation(format!("error decoding response body: {}", e)))?;

        let text = result
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(RagError::ModelInvocation(
                "Gemini returned no candidates".to_string(),
            ));
        }

        Ok(text)
    }

    pub async fn embed_content(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let url = format!(
            "{}/models/text-embedding-004:embedContent?key={}",
            self.base_url, self.api_key
        );

        let request = EmbedContentRequest {
            model: "models/text-embedding-004".to_string(),
            content: EmbedContent {
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
            output_dimensionality: Some(EMBEDDING_DIMENSION),
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(EMBED_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "Gemini Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let result: EmbedContentResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("error decoding response body: {}", e)))?;

        Ok(result.embedding.values)
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, RagError> {
        self.generate_text(prompt, temperature).await
    }
}

#[async_trait]
impl TextEmbedder for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.embed_content(text).await
    }
}
