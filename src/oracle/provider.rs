//! Document analysis providers
//!
//! Defines the analyzer trait and the Google Document AI implementation.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use super::types::{OracleDocument, OracleError, ProcessRequest, ProcessResponse, RawDocument};
use crate::config::OracleConfig;

/// Document analysis trait
///
/// One call per analyze request, no retries.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &str;

    /// Submit raw file bytes and return text plus layout
    async fn process(&self, data: &[u8], mime_type: &str) -> Result<OracleDocument, OracleError>;
}

/// Google Document AI processor called over REST
pub struct DocumentAiProvider {
    client: reqwest::Client,
    config: OracleConfig,
}

impl DocumentAiProvider {
    pub fn new(config: OracleConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn process_url(&self) -> Result<String, OracleError> {
        let project = self
            .config
            .project_id
            .as_deref()
            .ok_or_else(|| OracleError::NotConfigured("DOCUMENT_AI_PROJECT_ID is not set".to_string()))?;
        let processor = self
            .config
            .processor_id
            .as_deref()
            .ok_or_else(|| OracleError::NotConfigured("DOCUMENT_AI_PROCESSOR_ID is not set".to_string()))?;

        Ok(format!(
            "{}/v1/projects/{}/locations/{}/processors/{}:process",
            self.config.endpoint.trim_end_matches('/'),
            project,
            self.config.location,
            processor
        ))
    }
}

#[async_trait]
impl DocumentAnalyzer for DocumentAiProvider {
    fn name(&self) -> &str {
        "document-ai"
    }

    async fn process(&self, data: &[u8], mime_type: &str) -> Result<OracleDocument, OracleError> {
        let url = self.process_url()?;
        let token = self
            .config
            .access_token
            .as_deref()
            .ok_or_else(|| OracleError::NotConfigured("DOCUMENT_AI_ACCESS_TOKEN is not set".to_string()))?;

        let request = ProcessRequest {
            raw_document: RawDocument {
                content: BASE64.encode(data),
                mime_type: mime_type.to_string(),
            },
        };

        tracing::debug!("Submitting {} bytes to {}", data.len(), url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api { status, body });
        }

        let result: ProcessResponse = response
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(format!("Failed to parse response: {}", e)))?;

        result.document.ok_or(OracleError::EmptyDocument)
    }
}

/// Mock analyzer for testing
#[cfg(test)]
pub struct MockAnalyzer {
    pub document: Option<OracleDocument>,
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockAnalyzer {
    pub fn returning(document: OracleDocument) -> Self {
        Self {
            document: Some(document),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            document: None,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl DocumentAnalyzer for MockAnalyzer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn process(&self, _data: &[u8], _mime_type: &str) -> Result<OracleDocument, OracleError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.document
            .clone()
            .ok_or_else(|| OracleError::Transport("connection refused".to_string()))
    }
}
