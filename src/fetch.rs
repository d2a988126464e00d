use reqwest::header::USER_AGENT;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

use crate::error::{FetchError, FetchErrorKind};

pub const DEFAULT_USER_AGENT: &str = concat!("tvlinker/", env!("CARGO_PKG_VERSION"));

/// Issues single GET requests with a caller-supplied user agent.
///
/// Failures are reported once; retrying is the caller's decision and means
/// starting a new task.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Client with a whole-request timeout, for pages and API calls.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::new(FetchErrorKind::Network, e.to_string()))?;

        Ok(Self { client })
    }

    /// Client for long transfers: only connecting is bounded, reading is left
    /// to the caller's idle timeout.
    pub fn streaming(connect_timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| FetchError::new(FetchErrorKind::Network, e.to_string()))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GET `url` and return the response once its status is known to be 2xx.
    pub async fn fetch(&self, url: &str, user_agent: &str) -> Result<Response, FetchError> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .send()
            .await?;

        check_status(response)
    }

    pub async fn fetch_text(&self, url: &str, user_agent: &str) -> Result<String, FetchError> {
        let response = self.fetch(url, user_agent).await?;
        Ok(response.text().await?)
    }
}

pub(crate) fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::status(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_reported_not_raised() {
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch("not a url", "test-agent").await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::InvalidUrl);
        assert_eq!(err.code, None);
    }

    #[tokio::test]
    async fn test_status_error_carries_code_and_reason() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .match_header("user-agent", "tvlinker-test")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher
            .fetch(&format!("{}/missing", server.url()), "tvlinker-test")
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind, FetchErrorKind::HttpStatus);
        assert_eq!(err.code, Some(404));
        assert_eq!(err.message, "Not Found");
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Port 9 (discard) is closed on any sane test host
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher
            .fetch("http://127.0.0.1:9/", "test-agent")
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind,
            FetchErrorKind::Network | FetchErrorKind::Timeout
        ));
    }
}
