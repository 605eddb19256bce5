//! Ollama-backed explainer.
//!
//! Sends the evidence summary to `POST {base_url}/api/generate` with
//! streaming disabled and returns the generated text. Timeouts are applied
//! by the engine, not here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use triage::explain::evidence_summary;
use triage::{CollaboratorError, Explainer, ExplanationContext, FailureRecord};

use crate::config::LlmConfig;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

pub struct OllamaExplainer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaExplainer {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

/// Prompt asking for a short root-cause analysis of the evidence.
pub fn build_prompt(record: &FailureRecord, context: &ExplanationContext<'_>) -> String {
    format!(
        "You are an expert QA engineer analyzing CI test failures.\n\n\
         {evidence}\n\
         Explain the most likely root cause of the current failure in 2-4 sentences. \
         Reference the similar past failures when they apply. Do not invent log lines.",
        evidence = evidence_summary(record, context)
    )
}

#[async_trait]
impl Explainer for OllamaExplainer {
    async fn explain(
        &self,
        record: &FailureRecord,
        context: &ExplanationContext<'_>,
    ) -> Result<String, CollaboratorError> {
        let prompt = build_prompt(record, context);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| CollaboratorError::Unreachable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Unreachable(format!(
                "{} returned HTTP {status}",
                self.generate_url()
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Malformed(e.to_string()))?;
        tracing::debug!(
            model = %self.model,
            chars = parsed.response.len(),
            "Explanation generated"
        );
        Ok(parsed.response.trim().to_string())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Check whether an Ollama server answers `GET /api/tags`.
pub async fn check_endpoint(base_url: &str) -> bool {
    let tags_url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&tags_url)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
