use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::source::Item;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request error: {0}")]
    Request(String),
    #[error("Invalid response payload: {0}")]
    Payload(String),
}

/// Transport-agnostic remote suggestion protocol: send the endpoint
/// identifier, the current term and any extra request parameters, get back a
/// list of structurally opaque items.
#[async_trait]
pub trait SuggestTransport: Send + Sync {
    async fn fetch(
        &self,
        endpoint: &str,
        term: &str,
        params: &HashMap<String, String>,
    ) -> Result<Vec<Item>, TransportError>;
}

#[cfg(feature = "transport-http")]
pub use self::http::HttpTransport;

#[cfg(feature = "transport-http")]
mod http {
    use super::*;
    use std::time::Duration;

    const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Fetches suggestions over HTTP GET: the term goes into the `term` query
    /// parameter, extra parameters are appended as-is, and the endpoint is
    /// expected to answer with a JSON array.
    pub struct HttpTransport {
        client: reqwest::Client,
    }

    impl HttpTransport {
        pub fn new() -> Self {
            let client = reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build HTTP client");
            HttpTransport { client }
        }
    }

    impl Default for HttpTransport {
        fn default() -> Self {
            HttpTransport::new()
        }
    }

    #[async_trait]
    impl SuggestTransport for HttpTransport {
        async fn fetch(
            &self,
            endpoint: &str,
            term: &str,
            params: &HashMap<String, String>,
        ) -> Result<Vec<Item>, TransportError> {
            let mut query: Vec<(&str, &str)> = vec![("term", term)];
            for (key, value) in params {
                query.push((key, value));
            }

            let response = self
                .client
                .get(endpoint)
                .query(&query)
                .send()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?
                .error_for_status()
                .map_err(|e| TransportError::Request(e.to_string()))?;

            response
                .json()
                .await
                .map_err(|e| TransportError::Payload(e.to_string()))
        }
    }
}
