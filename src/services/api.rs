// src/services/api.rs

//! Remote API client: single-request fetcher and lazy paginator.
//!
//! The fetcher never logs; it only classifies. Callers decide what a
//! `FetchError` means for their unit.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream, TryStreamExt};
use serde::{Deserialize, de::DeserializeOwned};
use url::Url;

use super::{FetchError, RawResponse, ReqwestTransport, Transport};
use crate::error::Result;
use crate::models::Config;
use crate::utils::http;

/// Paged list envelope: `{"data": [...], "total": N, "limit": L, "offset": O}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Map a raw response onto a decoded payload or a `FetchError`.
pub fn classify<T: DeserializeOwned>(response: RawResponse) -> std::result::Result<T, FetchError> {
    match response.status {
        200..=299 => serde_json::from_slice(&response.body)
            .map_err(|e| FetchError::Transient(format!("malformed JSON: {e}"))),
        404 => Err(FetchError::NotFound),
        429 => Err(FetchError::Transient("rate limited (HTTP 429)".to_string())),
        status @ 400..=499 => Err(FetchError::ClientError { status }),
        status => Err(FetchError::Transient(format!("HTTP {status}"))),
    }
}

/// Client for the remote catalog and collection API.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    base: Url,
    site: Option<Url>,
    token: Option<String>,
    page_size: usize,
    page_delay: Duration,
}

impl ApiClient {
    /// Create a client over an arbitrary transport with default paging.
    pub fn new(transport: Arc<dyn Transport>, base: Url) -> Self {
        Self {
            transport,
            base,
            site: None,
            token: None,
            page_size: 40,
            page_delay: Duration::from_millis(500),
        }
    }

    /// Build the production client from configuration.
    pub fn from_config(config: &Config, token: Option<String>) -> Result<Self> {
        let client = http::create_client(&config.api)?;
        let base = Url::parse(&config.api.base_url)?;
        let mut api = Self::new(Arc::new(ReqwestTransport::new(client)), base)
            .with_token(token)
            .with_paging(config.harvest.page_size, config.harvest.page_delay());
        if !config.api.site_url.is_empty() {
            api = api.with_site(Url::parse(&config.api.site_url)?);
        }
        Ok(api)
    }

    /// Profile site used to look up usernames.
    pub fn with_site(mut self, site: Url) -> Self {
        self.site = Some(site);
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_paging(mut self, page_size: usize, page_delay: Duration) -> Self {
        self.page_size = page_size.max(1);
        self.page_delay = page_delay;
        self
    }

    /// Join a relative path onto the API base and append query pairs.
    pub fn endpoint(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<Url, FetchError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| FetchError::Transient(format!("invalid endpoint '{path}': {e}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// Perform one GET and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
    ) -> std::result::Result<T, FetchError> {
        let response = self
            .transport
            .get(url, self.token.as_deref())
            .await
            .map_err(FetchError::Transient)?;
        classify(response)
    }

    /// Username behind a numeric account id.
    ///
    /// `{site}/user/{id}` redirects to `/user/{name}`; the last path segment
    /// of the final location is the name. Any failure, or a page that stays
    /// on the numeric path, yields `None`.
    pub async fn username(&self, user_id: u64) -> Option<String> {
        let site = self.site.as_ref()?;
        let id = user_id.to_string();
        let url = site.join(&format!("user/{id}")).ok()?;
        let response = self.transport.get(&url, None).await.ok()?;
        if !(200..300).contains(&response.status) {
            return None;
        }

        let mut segments = response.url.path_segments()?;
        match (segments.next(), segments.next()) {
            (Some("user"), Some(name)) if !name.is_empty() && name != id => Some(name.to_string()),
            _ => None,
        }
    }

    /// Walk a paged query lazily, one item per page.
    ///
    /// Stops after a short page, after `offset + limit` reaches the reported
    /// total, or on a client error (end of results). A not-found or
    /// transient failure is yielded once and ends the stream. Restarting a
    /// query means calling `paginate` again from offset zero.
    pub fn paginate<'a, T>(
        &'a self,
        url: Url,
    ) -> impl Stream<Item = std::result::Result<Vec<T>, FetchError>> + Send + 'a
    where
        T: DeserializeOwned + Send + 'a,
    {
        let limit = self.page_size;
        stream::unfold(Some((url, 0usize)), move |state| async move {
            let (url, offset) = state?;
            if offset > 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let mut page_url = url.clone();
            page_url
                .query_pairs_mut()
                .append_pair("limit", &limit.to_string())
                .append_pair("offset", &offset.to_string());

            match self.get_json::<Page<T>>(&page_url).await {
                Ok(page) => {
                    let next = offset + limit;
                    let exhausted = page.data.len() < limit
                        || page.total.is_some_and(|total| next as u64 >= total);
                    let state = (!exhausted).then_some((url, next));
                    Some((Ok(page.data), state))
                }
                Err(FetchError::ClientError { .. }) => None,
                Err(error) => Some((Err(error), None)),
            }
        })
    }

    /// Drain a paged query into one list.
    pub async fn collect_pages<T>(&self, url: Url) -> std::result::Result<Vec<T>, FetchError>
    where
        T: DeserializeOwned + Send,
    {
        self.paginate(url).try_concat().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{Reply, ScriptedTransport};

    fn page(ids: std::ops::Range<u64>, total: Option<u64>) -> Reply {
        let data: Vec<_> = ids.map(|id| serde_json::json!({ "id": id })).collect();
        let mut body = serde_json::json!({ "data": data });
        if let Some(total) = total {
            body["total"] = total.into();
        }
        Reply::ok(body.to_string())
    }

    fn client(transport: ScriptedTransport) -> (Arc<ScriptedTransport>, ApiClient) {
        let transport = Arc::new(transport);
        let client = ApiClient::new(
            transport.clone(),
            Url::parse("https://api.example.test/v0/").unwrap(),
        )
        .with_paging(2, Duration::ZERO);
        (transport, client)
    }

    #[derive(Debug, Deserialize)]
    struct Item {
        id: u64,
    }

    #[test]
    fn classify_maps_statuses() {
        let raw = |status: u16, body: &str| RawResponse {
            status,
            url: Url::parse("https://api.example.test/v0/x").unwrap(),
            body: body.as_bytes().to_vec(),
        };
        assert!(classify::<serde_json::Value>(raw(200, "{}")).is_ok());
        assert_eq!(
            classify::<serde_json::Value>(raw(404, "")).unwrap_err(),
            FetchError::NotFound
        );
        assert_eq!(
            classify::<serde_json::Value>(raw(400, "")).unwrap_err(),
            FetchError::ClientError { status: 400 }
        );
        assert!(classify::<serde_json::Value>(raw(429, "")).unwrap_err().is_transient());
        assert!(classify::<serde_json::Value>(raw(503, "")).unwrap_err().is_transient());
        assert!(classify::<serde_json::Value>(raw(200, "{oops")).unwrap_err().is_transient());
    }

    #[test]
    fn endpoint_joins_path_and_query() {
        let (_, client) = client(ScriptedTransport::new());
        let url = client
            .endpoint("subjects", &[("type", "2".to_string()), ("year", "2024".to_string())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.test/v0/subjects?type=2&year=2024"
        );
    }

    #[tokio::test]
    async fn paginate_stops_on_client_error_after_full_pages() {
        let (transport, client) = client(
            ScriptedTransport::new()
                .route("/v0/list?limit=2&offset=0", vec![page(0..2, None)])
                .route("/v0/list?limit=2&offset=2", vec![page(2..4, None)])
                .route("/v0/list?limit=2&offset=4", vec![page(4..6, None)])
                .route(
                    "/v0/list?limit=2&offset=6",
                    vec![Reply::Status(400, "{}".into())],
                ),
        );

        let url = client.endpoint("list", &[]).unwrap();
        let items: Vec<Item> = client.collect_pages(url).await.unwrap();

        assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), [0, 1, 2, 3, 4, 5]);
        assert_eq!(transport.requests().len(), 4);
    }

    #[tokio::test]
    async fn paginate_stops_on_short_page_and_total() {
        let (transport, client) = client(
            ScriptedTransport::new()
                .route("/v0/list?limit=2&offset=0", vec![page(0..2, None)])
                .route("/v0/list?limit=2&offset=2", vec![page(2..3, None)]),
        );
        let url = client.endpoint("list", &[]).unwrap();
        let items: Vec<Item> = client.collect_pages(url).await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(transport.requests().len(), 2);

        let (transport, client) = client_with_total();
        let url = client.endpoint("list", &[]).unwrap();
        let items: Vec<Item> = client.collect_pages(url).await.unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(transport.requests().len(), 2);
    }

    fn client_with_total() -> (Arc<ScriptedTransport>, ApiClient) {
        client(
            ScriptedTransport::new()
                .route("/v0/list?limit=2&offset=0", vec![page(0..2, Some(4))])
                .route("/v0/list?limit=2&offset=2", vec![page(2..4, Some(4))]),
        )
    }

    #[tokio::test]
    async fn paginate_propagates_transient_failure() {
        let (_, client) = client(
            ScriptedTransport::new()
                .route("/v0/list?limit=2&offset=0", vec![page(0..2, None)])
                .route(
                    "/v0/list?limit=2&offset=2",
                    vec![Reply::Status(502, String::new())],
                ),
        );
        let url = client.endpoint("list", &[]).unwrap();
        let result = client.collect_pages::<Item>(url).await;
        assert_eq!(result.unwrap_err(), FetchError::Transient("HTTP 502".into()));
    }

    #[tokio::test]
    async fn network_error_is_transient() {
        let (_, client) = client(
            ScriptedTransport::new()
                .route("/v0/one", vec![Reply::Network("connection reset".into())]),
        );
        let url = client.endpoint("one", &[]).unwrap();
        let result = client.get_json::<serde_json::Value>(&url).await;
        assert_eq!(
            result.unwrap_err(),
            FetchError::Transient("connection reset".into())
        );
    }

    #[tokio::test]
    async fn username_follows_profile_redirect() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .route("/user/7", vec![Reply::Redirect("/user/sai".into())])
                .route("/user/8", vec![Reply::ok("<html></html>")])
                .route("/user/9", vec![Reply::Network("timeout".into())]),
        );
        let client = ApiClient::new(
            transport.clone(),
            Url::parse("https://api.example.test/v0/").unwrap(),
        )
        .with_site(Url::parse("https://site.example.test/").unwrap());

        assert_eq!(client.username(7).await.as_deref(), Some("sai"));
        assert_eq!(client.username(8).await, None);
        assert_eq!(client.username(9).await, None);
        assert_eq!(client.username(10).await, None);

        let (transport, without_site) = client_with_total();
        assert_eq!(without_site.username(7).await, None);
        assert!(transport.requests().is_empty());
    }
}
