use crate::batch::{BatchClient, BatchConfig, EntrySink, LogEntry};
use crate::client::{BatchLogger, ClientBuilder, ClientError};
use crate::config::StackdriverOptions;
use crate::metadata::MetadataProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;

/// Public Cloud Logging API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://logging.googleapis.com";

/// [`EntrySink`] that talks to the Cloud Logging REST API
/// (`POST /v2/entries:write`) with a bearer token.
#[derive(Clone)]
pub struct CloudLoggingSink {
    client: Client,
    endpoint: String,
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteEntriesRequest<'a> {
    entries: &'a [LogEntry],
    partial_success: bool,
}

impl CloudLoggingSink {
    /// **Parameters**
    /// - `endpoint`: API base URL, usually [`DEFAULT_ENDPOINT`].
    /// - `access_token`: OAuth2 token with the `logging.write` scope.
    pub fn new(endpoint: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            access_token: access_token.into(),
        }
    }

    fn url(&self) -> String {
        format!("{}/v2/entries:write", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl EntrySink for CloudLoggingSink {
    async fn write_entries(&self, entries: &[LogEntry]) -> Result<(), ClientError> {
        let body = WriteEntriesRequest {
            entries,
            partial_success: true,
        };

        let resp = self
            .client
            .post(self.url())
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(ClientError::Http { status, body })
        }
    }
}

/// Default [`ClientBuilder`]: a [`BatchClient`] over a
/// [`CloudLoggingSink`], configured from the writer options.
///
/// Requires `accessToken` in the options ([`ClientError::Auth`] otherwise)
/// and a running Tokio runtime ([`ClientError::Transport`] otherwise).
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudLoggingBuilder;

impl ClientBuilder for CloudLoggingBuilder {
    fn build(
        &self,
        options: &StackdriverOptions,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Result<Box<dyn BatchLogger>, ClientError> {
        let token = options
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::Auth("no access token configured".to_string()))?;

        let endpoint = options.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let sink = CloudLoggingSink::new(endpoint, token);

        let (client, _flusher) = BatchClient::spawn(
            Arc::new(sink),
            &options.log_name,
            metadata,
            BatchConfig::from_options(options),
        )?;

        tracing::debug!(log_name = %options.log_name, endpoint, "cloud logging client ready");
        Ok(Box::new(client))
    }
}
