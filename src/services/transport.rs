//! HTTP transport seam.

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

/// Status code, final URL and raw body of one response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Location the response was served from after redirects.
    pub url: Url,
    pub body: Vec<u8>,
}

/// Performs a single GET. Network-level failures (connect, timeout, broken
/// body) are returned as `Err` with a description.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, token: Option<&str>) -> Result<RawResponse, String>;
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url, token: Option<&str>) -> Result<RawResponse, String> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(|e| e.to_string())?;

        Ok(RawResponse {
            status,
            url,
            body: body.to_vec(),
        })
    }
}
