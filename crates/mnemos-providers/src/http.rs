//! Shared plumbing for OpenAI-compatible JSON endpoints.

use mnemos_memory::ProviderError;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Connection settings for one endpoint family.
#[derive(Debug, Clone)]
pub(crate) struct Endpoint {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    headers: Vec<(String, String)>,
}

impl Endpoint {
    pub(crate) fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout,
            headers: Vec::new(),
        }
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn set_api_key(&mut self, api_key: Option<String>) {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
    }

    pub(crate) fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub(crate) fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let mut request = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .timeout(self.timeout);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }

    /// POST `body` as JSON to `path` and decode the JSON answer.
    pub(crate) async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: serde::Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .post(path)
            .json(body)
            .send()
            .await
            .map_err(|err| self.map_transport(err))?;
        self.decode(response).await
    }

    async fn decode<R: DeserializeOwned>(&self, response: Response) -> Result<R, ProviderError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| self.map_transport(err))?;
        if !status.is_success() {
            let body = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|err| {
            ProviderError::InvalidResponse(format!("failed to decode response: {err}"))
        })
    }

    fn map_transport(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else {
            ProviderError::Request(err.to_string())
        }
    }
}
