use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, Result};
use crate::transport::{ByteStream, Transport, cancellable};
use crate::types::ChatRequest;

const DEFAULT_ENDPOINT: &str = "http://localhost:5001/getMessageWeb";
const ENDPOINT_ENV: &str = "SHISHAN_ENDPOINT";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the assistant's streaming chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: ReqwestClient,
    endpoint: Url,
    connect_timeout: Duration,
}

impl ChatClient {
    /// Create a new chat client.
    ///
    /// The endpoint can be provided directly or read from the SHISHAN_ENDPOINT environment
    /// variable; otherwise the local development server is used.
    pub fn new(endpoint: Option<String>) -> Result<Self> {
        Self::with_options(endpoint, None)
    }

    /// Create a new client with custom settings.
    ///
    /// Only the connection phase is bounded here.  The body of a streamed answer may take
    /// minutes, so inactivity is policed by the chat session instead of the HTTP client.
    pub fn with_options(endpoint: Option<String>, connect_timeout: Option<Duration>) -> Result<Self> {
        let endpoint = match endpoint {
            Some(endpoint) => endpoint,
            None => env::var(ENDPOINT_ENV).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
        };
        let endpoint = Url::parse(&endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::url(
                format!("unsupported endpoint scheme: {}", endpoint.scheme()),
                None,
            ));
        }

        let connect_timeout = connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            endpoint,
            connect_timeout,
        })
    }

    /// The endpoint requests are POSTed to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Create and return default headers for chat requests.
    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/plain, */*"));
        headers
    }

    /// Convert a non-success response into an error carrying its status and body.
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();
        match response.text().await {
            Ok(body) => Error::api(status_code, body),
            Err(e) => Error::http_client(
                format!("Failed to read error response: {}", e),
                Some(Box::new(e)),
            ),
        }
    }

    fn classify(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                None,
                Some(self.connect_timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    /// POST `request` and return the raw response body as it arrives.
    ///
    /// The returned stream stops delivering chunks once `cancel` is signaled.
    pub async fn stream(&self, request: &ChatRequest, cancel: CancellationToken) -> Result<ByteStream> {
        let send = self
            .client
            .post(self.endpoint.clone())
            .headers(Self::default_headers())
            .json(request)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::abort("request cancelled before the server answered"));
            }
            response = send => response.map_err(|e| self.classify(e))?,
        };

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let body = response.bytes_stream().map(|result| {
            result.map_err(|e| {
                Error::streaming(format!("Error in HTTP stream: {}", e), Some(Box::new(e)))
            })
        });

        Ok(cancellable(body, cancel))
    }
}

#[async_trait]
impl Transport for ChatClient {
    async fn send(&self, request: &ChatRequest, cancel: CancellationToken) -> Result<ByteStream> {
        self.stream(request, cancel).await
    }
}
