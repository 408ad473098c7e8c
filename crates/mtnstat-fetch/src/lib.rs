//! Fetcher: shared HTTP client wrapper enforcing per-request timeout,
//! user-agent override, header merge, and cancellation.

use mtnstat_common::{MtnError, Result};
use reqwest::{header::HeaderMap, Client, Method};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A completed fetch: status code, response headers, and raw body bytes.
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Shared HTTP client used by every strategy, centralizing timeout,
/// user-agent, and cancellation handling behind one `reqwest::Client`.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(8)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(MtnError::from)?;
        Ok(Self { client })
    }

    #[instrument(skip(self, headers, cancel), fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &str,
        method: Method,
        headers: &HashMap<String, String>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse> {
        let mut header_map = HeaderMap::new();
        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::try_from(k.as_str()),
                reqwest::header::HeaderValue::try_from(v.as_str()),
            ) {
                header_map.insert(name, value);
            }
        }

        let request = self
            .client
            .request(method, url)
            .headers(header_map)
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT));

        let send_fut = request.send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MtnError::Cancelled),
            result = send_fut => result.map_err(MtnError::from)?,
        };

        let status = response.status();
        let status_u16 = status.as_u16();
        let resp_headers = response.headers().clone();

        let body_fut = response.bytes();
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MtnError::Cancelled),
            result = body_fut => result.map_err(MtnError::from)?,
        };

        if status.as_u16() >= 400 {
            return Err(MtnError::UpstreamError {
                status: status_u16,
                message: format!("request to {url} failed with status {status_u16}"),
            });
        }

        Ok(FetchResponse {
            status: status_u16,
            headers: resp_headers,
            body: body.to_vec(),
        })
    }

    /// Convenience GET used by the JSON-API and static-HTML strategies.
    pub async fn get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse> {
        self.fetch(url, Method::GET, headers, None, cancel).await
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new().expect("reqwest client construction should not fail")
    }
}
