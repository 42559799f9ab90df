//! HTTP layer shared by the upstream adapters.
//!
//! This is the ONLY place that interprets status codes. Every call is a
//! single attempt; retries belong to [`crate::retry::Retrier`].

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{FinderError, FinderResult};

pub const FLAKEFINDER_USER_AGENT: &str = concat!("flakefinder/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in an `UnexpectedStatus` message.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpBackend {
    pub(crate) fn new(timeout: Duration, token: Option<String>) -> FinderResult<Self> {
        Self::with_headers(timeout, token, HeaderMap::new())
    }

    pub(crate) fn with_headers(
        timeout: Duration,
        token: Option<String>,
        mut default_headers: HeaderMap,
    ) -> FinderResult<Self> {
        default_headers.insert(USER_AGENT, HeaderValue::from_static(FLAKEFINDER_USER_AGENT));
        default_headers
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| FinderError::Config {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self { client, token })
    }

    /// GET `url` and decode a JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &str) -> FinderResult<T> {
        let body = self.get_bytes(url).await?;
        serde_json::from_slice(&body).map_err(|e| FinderError::InvalidResponse {
            message: format!("{url}: {e}"),
        })
    }

    /// GET `url` and return the raw body.
    pub(crate) async fn get_bytes(&self, url: &str) -> FinderResult<Vec<u8>> {
        let response = self.get(url).await?;
        let body = response.bytes().await?;
        Ok(body.to_vec())
    }

    async fn get(&self, url: &str) -> FinderResult<reqwest::Response> {
        debug!(url, "GET");
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => Ok(response),

            404 => Err(FinderError::NotFound {
                resource: url.to_string(),
            }),

            408 | 429 | 502 | 503 | 504 => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);

                Err(FinderError::Unavailable {
                    message: format!("HTTP {} from {url}", status.as_u16()),
                    retry_after,
                })
            }

            _ => {
                let mut message = response.text().await.unwrap_or_else(|_| status.to_string());
                if message.len() > MAX_ERROR_BODY {
                    let mut end = MAX_ERROR_BODY;
                    while !message.is_char_boundary(end) {
                        end -= 1;
                    }
                    message.truncate(end);
                }
                Err(FinderError::UnexpectedStatus {
                    status: status.as_u16(),
                    resource: url.to_string(),
                    message,
                })
            }
        }
    }
}

/// Percent-encode each `/`-separated segment of a path.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_path_keeps_separators() {
        assert_eq!(
            encode_path("exported artifacts/junit.functest.xml"),
            "exported%20artifacts/junit.functest.xml"
        );
    }

    #[test]
    fn trim_base_drops_trailing_slashes() {
        assert_eq!(trim_base("http://ci.example//"), "http://ci.example");
    }
}
