use crate::adapters::http::HttpClient;
use crate::adapters::opds::OpdsFeed;
use crate::utils::error::{Result, WranglerError};

pub const SERVICE_NAME: &str = "Content Server";
pub const OPDS_MEDIA_TYPE: &str = "application/atom+xml";

/// Looks identifiers up on the open-access content server.
pub struct ContentServerClient {
    http: HttpClient,
    base_url: String,
}

impl ContentServerClient {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn lookup_url(&self) -> String {
        format!("{}/lookup", self.base_url)
    }

    /// `GET {base}/lookup?urn=..&urn=..`. Anything but a 200 Atom
    /// response is an `UpstreamError`.
    pub async fn lookup(&self, urns: &[String]) -> Result<OpdsFeed> {
        let query: Vec<(&str, &str)> = urns.iter().map(|u| ("urn", u.as_str())).collect();
        let response = self.http.get_with_query(&self.lookup_url(), &query).await?;

        if response.status != 200 {
            return Err(WranglerError::UpstreamError {
                service: SERVICE_NAME.to_string(),
                status: response.status,
                message: "Underlying license source returned error.".to_string(),
            });
        }
        let media_type = response.media_type().unwrap_or_default();
        if !media_type.starts_with(OPDS_MEDIA_TYPE) {
            return Err(WranglerError::UpstreamError {
                service: SERVICE_NAME.to_string(),
                status: response.status,
                message: format!(
                    "Underlying license source served unhandlable media type ({}).",
                    media_type
                ),
            });
        }
        OpdsFeed::parse(&response.body)
    }

    /// Fetch one feed page by absolute URL.
    pub async fn get_feed(&self, url: &str) -> Result<OpdsFeed> {
        let response = self.http.get(url).await?.error_for_status(SERVICE_NAME)?;
        OpdsFeed::parse(&response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn client(server: &MockServer) -> ContentServerClient {
        let http = HttpClient::new(Duration::from_secs(5), 0, Duration::from_millis(1)).unwrap();
        ContentServerClient::new(http, &server.base_url())
    }

    #[tokio::test]
    async fn test_lookup_sends_every_urn() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/lookup")
                .query_param("urn", "urn:isbn:9780141439518")
                .query_param("urn", "urn:librarysimplified.org/terms/id/Gutenberg%20ID/1342");
            then.status(200)
                .header("content-type", "application/atom+xml;profile=opds-catalog")
                .body(r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry><id>urn:isbn:9780141439518</id><title>P</title></entry></feed>"#);
        });

        let feed = client(&server)
            .lookup(&[
                "urn:isbn:9780141439518".to_string(),
                "urn:librarysimplified.org/terms/id/Gutenberg%20ID/1342".to_string(),
            ])
            .await
            .unwrap();

        mock.assert();
        assert_eq!(feed.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_media_type_is_upstream_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/lookup");
            then.status(200).header("content-type", "text/html").body("<html/>");
        });

        let err = client(&server).lookup(&["urn:isbn:1".to_string()]).await.unwrap_err();

        match err {
            WranglerError::UpstreamError { message, .. } => {
                assert!(message.contains("unhandlable media type (text/html)"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_status_is_upstream_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/lookup");
            then.status(404);
        });

        let err = client(&server).lookup(&["urn:isbn:1".to_string()]).await.unwrap_err();

        assert!(matches!(err, WranglerError::UpstreamError { status: 404, .. }));
    }
}
