//! Minimal client for OpenAI-compatible HTTP APIs, shared by the chat and
//! transcription providers.

use crate::config::OpenAiConfig;
use crate::error::{ensure_success, ProviderError};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct OpenAiClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Config("OpenAI API key is empty".to_string()));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                api_key: config.api_key.clone(),
                base_url: config.base_url.trim_end_matches('/').to_string(),
            }),
        })
    }

    pub(crate) fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.inner
            .http
            .post(self.url(path))
            .bearer_auth(&self.inner.api_key)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// Lists model ids whose name contains `needle`, sorted.
    pub async fn list_models(&self, needle: &str) -> Result<Vec<String>, ProviderError> {
        let response = self
            .inner
            .http
            .get(self.url("/models"))
            .bearer_auth(&self.inner.api_key)
            .send()
            .await?;
        let list: ModelList = ensure_success(response).await?.json().await?;
        let mut models: Vec<String> = list
            .data
            .into_iter()
            .map(|m| m.id)
            .filter(|id| id.contains(needle))
            .collect();
        models.sort();
        tracing::debug!(needle, count = models.len(), "listed models");
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_key() {
        assert!(matches!(
            OpenAiClient::new(&OpenAiConfig::default()),
            Err(ProviderError::Config(_))
        ));
    }

    #[test]
    fn joins_paths_without_double_slash() {
        let config = OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: "http://localhost:9000/v1/".to_string(),
        };
        let client = OpenAiClient::new(&config).unwrap();
        assert_eq!(client.url("/models"), "http://localhost:9000/v1/models");
    }
}
