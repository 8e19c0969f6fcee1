//! HTTP client abstraction for the model backends.
//!
//! Backends only ever POST a JSON body and read the reply text, so that is
//! all the trait exposes. Tests inject canned replies instead of making
//! network requests.

use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Upper bound for one model round trip. Local models can be slow to answer.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// The only request shape a backend needs.
///
/// ```ignore
/// let reply = http
///     .post_json(&url, &[("x-api-key", key)], &json!({"model": "m"}))
///     .await?;
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// POSTs `body` as JSON and hands back the reply body.
    ///
    /// Non-2xx replies are returned as text too; providers put their error
    /// details in the body.
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<String>;
}

/// Production client backed by a shared reqwest connection pool.
#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
    inner: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<String> {
        let request = headers.iter().fold(
            self.inner
                .post(url)
                .timeout(REQUEST_TIMEOUT)
                .header("user-agent", concat!("nuwa-terminal/", env!("CARGO_PKG_VERSION"))),
            |req, (name, value)| req.header(*name, *value),
        );

        let response = request.json(body).send().await?;
        debug!(url, status = %response.status(), "model endpoint replied");
        Ok(response.text().await?)
    }
}
