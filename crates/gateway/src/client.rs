//! HTTP client for an Ollama-compatible model server.

use crate::error::{GatewayError, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Model server root, e.g. `http://localhost:11434`
    pub base_url: String,

    /// Budget for a whole request, generation included
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for the model server's `/api/tags` and `/api/generate`.
///
/// Keeps the last fetched model list and the selected model so callers
/// can generate without naming a model every time.
#[derive(Debug)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: Url,
    models: RwLock<Vec<String>>,
    current_model: RwLock<Option<String>>,
}

impl OllamaClient {
    /// Create a client; no request is made until a method is called
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let invalid = |reason: String| GatewayError::InvalidUrl {
            url: config.base_url.clone(),
            reason,
        };

        let base_url = Url::parse(config.base_url.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", base_url.scheme())));
        }

        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            models: RwLock::new(Vec::new()),
            current_model: RwLock::new(None),
        })
    }

    /// Server root this client talks to
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path)
    }

    /// Fetch the model names the server offers and cache them
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.endpoint("api/tags"))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Model list request failed");
            return Err(GatewayError::Status(status.as_u16()));
        }

        let tags: TagsResponse = response.json().await.map_err(transport_error)?;
        let names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
        debug!(count = names.len(), "Fetched model list");

        *self.models.write().unwrap_or_else(PoisonError::into_inner) = names.clone();
        Ok(names)
    }

    /// Models seen by the last successful [`list_models`](Self::list_models)
    pub fn available_models(&self) -> Vec<String> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make `model` the default for [`generate`](Self::generate)
    pub fn select_model(&self, model: impl Into<String>) {
        let model = model.into();
        info!(model = %model, "Model selected");
        *self
            .current_model
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(model);
    }

    /// Currently selected model
    pub fn current_model(&self) -> Option<String> {
        self.current_model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Generate a completion for `prompt`.
    ///
    /// `model` overrides the selected model for this call only.
    pub async fn generate(&self, prompt: &str, model: Option<&str>) -> Result<String> {
        let model = match model.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) => m.to_string(),
            None => self.current_model().ok_or(GatewayError::ModelNotSelected)?,
        };

        let request = GenerateRequest {
            model: &model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint("api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            warn!(model = %model, status = status.as_u16(), "Generate request failed");
            return Err(GatewayError::Status(status.as_u16()));
        }

        let body: GenerateResponse = response.json().await.map_err(transport_error)?;
        debug!(model = %model, chars = body.response.len(), "Generated response");
        Ok(body.response)
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_decode() {
        GatewayError::Decode(err.to_string())
    } else {
        GatewayError::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_base_url() {
        let err = OllamaClient::new(GatewayConfig {
            base_url: "not a url".to_string(),
            ..GatewayConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidUrl { .. }));

        let err = OllamaClient::new(GatewayConfig {
            base_url: "ftp://localhost:11434".to_string(),
            ..GatewayConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidUrl { .. }));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = OllamaClient::new(GatewayConfig {
            base_url: "http://localhost:11434/".to_string(),
            ..GatewayConfig::default()
        })
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.endpoint("api/tags"), "http://localhost:11434/api/tags");
    }

    #[test]
    fn test_model_selection() {
        let client = OllamaClient::new(GatewayConfig::default()).unwrap();
        assert!(client.current_model().is_none());
        assert!(client.available_models().is_empty());

        client.select_model("llama3");
        assert_eq!(client.current_model().as_deref(), Some("llama3"));
    }

    #[tokio::test]
    async fn test_generate_without_model() {
        let client = OllamaClient::new(GatewayConfig::default()).unwrap();
        let err = client.generate("hello", None).await.unwrap_err();
        assert_eq!(err, GatewayError::ModelNotSelected);

        // Blank override counts as no override
        let err = client.generate("hello", Some("  ")).await.unwrap_err();
        assert_eq!(err, GatewayError::ModelNotSelected);
    }
}
