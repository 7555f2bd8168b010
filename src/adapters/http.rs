use crate::domain::ports::ConfigProvider;
use crate::utils::error::{Result, WranglerError};
use reqwest::Client;
use std::time::Duration;

/// What callers need from an upstream response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Media type without parameters, lower-cased.
    pub fn media_type(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|c| c.split(';').next())
            .map(|c| c.trim().to_lowercase())
    }

    /// Turn a non-2xx response into an `UpstreamError`.
    pub fn error_for_status(self, service: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(WranglerError::UpstreamError {
                service: service.to_string(),
                status: self.status,
                message: format!("GET {}", self.url),
            })
        }
    }
}

/// reqwest wrapper with a request timeout and fixed-delay retries on
/// connection errors and 5xx responses.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration, retry_attempts: u32, retry_delay: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("metadata-wrangler/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            retry_attempts,
            retry_delay,
        })
    }

    pub fn from_config(config: &dyn ConfigProvider) -> Result<Self> {
        Self::new(
            config.request_timeout(),
            config.retry_attempts(),
            config.retry_delay(),
        )
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.get_with_query(url, &[]).await
    }

    /// GET with query parameters; repeated keys are sent repeatedly.
    pub async fn get_with_query(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpResponse> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.client.get(url).query(query).send().await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    tracing::debug!("GET {} -> {}", response.url(), status);
                    if status.is_server_error() && attempt <= self.retry_attempts {
                        tracing::warn!(
                            "⚠️ {} returned {}, retrying ({}/{})",
                            url,
                            status,
                            attempt,
                            self.retry_attempts
                        );
                        tokio::time::sleep(self.retry_delay).await;
                        continue;
                    }
                    let final_url = response.url().to_string();
                    let content_type = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let body = response.text().await?;
                    return Ok(HttpResponse {
                        url: final_url,
                        status: status.as_u16(),
                        content_type,
                        body,
                    });
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt <= self.retry_attempts => {
                    tracing::warn!(
                        "⚠️ Request to {} failed: {}, retrying ({}/{})",
                        url,
                        e,
                        attempt,
                        self.retry_attempts
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(retries: u32) -> HttpClient {
        HttpClient::new(Duration::from_secs(5), retries, Duration::from_millis(1)).unwrap()
    }

    #[tokio::test]
    async fn test_get_returns_body_and_media_type() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/feed").query_param("urn", "urn:isbn:1");
            then.status(200)
                .header("content-type", "application/atom+xml; charset=utf-8")
                .body("<feed/>");
        });

        let response = client(0)
            .get_with_query(&server.url("/feed"), &[("urn", "urn:isbn:1")])
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response.body, "<feed/>");
        assert_eq!(response.media_type().as_deref(), Some("application/atom+xml"));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503);
        });

        let response = client(2).get(&server.url("/flaky")).await.unwrap();

        mock.assert_hits(3);
        assert_eq!(response.status, 503);
        assert!(matches!(
            response.error_for_status("test"),
            Err(WranglerError::UpstreamError { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        });

        let response = client(2).get(&server.url("/missing")).await.unwrap();

        mock.assert_hits(1);
        assert_eq!(response.status, 404);
    }
}
