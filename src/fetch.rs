use std::sync::Arc;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::Error;

/// JSON-over-HTTPS GET on top of a shared [`reqwest::Client`].
///
/// Timeout, proxy, and TLS configuration live on the client the caller (or
/// [`crate::JwksClientBuilder`]) constructed; they pass through untouched.
#[derive(Clone)]
pub struct Fetcher {
    http_client: Client,
}

impl Fetcher {
    pub fn new(http_client: Client) -> Self {
        Fetcher { http_client }
    }

    /// Fetches `url` and parses the response body as JSON.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!(%url, "fetching JSON document");
        let response = self.http_client.get(url).send().await.map_err(Error::from)?;

        let status_code = response.status();
        if !status_code.is_success() {
            return Err(Error::ErrorResponse { status_code });
        }

        let body = response.text().await.map_err(Error::from)?;
        serde_json::from_str(&body).map_err(|error| Error::Parse(Arc::new(error)))
    }
}

#[cfg(test)]
mod test {
    use http::StatusCode;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::Fetcher;
    use crate::Error;

    #[tokio::test]
    async fn maps_error_statuses_and_bodies_to_error_variants() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/garbled"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(reqwest::Client::new());

        let missing = fetcher
            .fetch_json::<serde_json::Value>(format!("{}/missing", server.uri()).parse().unwrap())
            .await;
        assert!(matches!(
            missing,
            Err(Error::ErrorResponse { status_code }) if status_code == StatusCode::NOT_FOUND
        ));

        let garbled = fetcher
            .fetch_json::<serde_json::Value>(format!("{}/garbled", server.uri()).parse().unwrap())
            .await;
        assert!(matches!(garbled, Err(Error::Parse(_))));
    }
}
