//! Client for the server's HTTP interface.

use async_trait::async_trait;
use futures::StreamExt;
use querybench_core::{
    codes, ClientError, DatabaseClient, QuerySettings, QueryStream, StreamEvent,
};
use reqwest::{Client, RequestBuilder, Response};

use crate::config::ClientConfig;
use crate::streaming::{parse_exception_code, ProgressParser};

/// Header carrying the error code of a failed query
pub const EXCEPTION_CODE_HEADER: &str = "X-ClickHouse-Exception-Code";

/// Output format that interleaves rows with progress objects
pub const PROGRESS_FORMAT: &str = "JSONEachRowWithProgress";

/// Makes the server kill a read-only query once its response is dropped
pub const CANCEL_ON_CLIENT_CLOSE: &str = "cancel_http_readonly_queries_on_client_close";

/// [`DatabaseClient`] over HTTP(S).
///
/// Queries are POSTed in the request body. Database, credentials and
/// settings travel as URL parameters.
pub struct HttpDatabaseClient {
    config: ClientConfig,
    client: Client,
    endpoint: String,
}

impl HttpDatabaseClient {
    /// Create a client from a validated configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config
            .validate()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        let endpoint = config.base_url();

        tracing::debug!(endpoint = %endpoint, database = %config.database, "Created HTTP client");

        Ok(Self {
            config,
            client,
            endpoint,
        })
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn request(&self, body: String, settings: &QuerySettings) -> RequestBuilder {
        let mut params: Vec<(&str, &str)> = vec![
            ("database", self.config.database.as_str()),
            ("user", self.config.user.as_str()),
        ];
        if !self.config.password.is_empty() {
            params.push(("password", self.config.password.as_str()));
        }
        params.extend(settings.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        self.client.post(&self.endpoint).query(&params).body(body)
    }

    async fn send(&self, body: String, settings: &QuerySettings) -> Result<Response, ClientError> {
        let response = self
            .request(body, settings)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let header_code = response
            .headers()
            .get(EXCEPTION_CODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i32>().ok());
        let message = response.text().await.unwrap_or_default().trim().to_string();
        let code = header_code
            .or_else(|| parse_exception_code(&message))
            .unwrap_or(codes::NETWORK_ERROR);

        tracing::debug!(status = %status, code, "Server rejected query");
        Err(ClientError::Server {
            code,
            message: if message.is_empty() {
                status.to_string()
            } else {
                message
            },
        })
    }

    /// Run a query and return its whole text response.
    async fn scalar(&self, query: &str) -> Result<String, ClientError> {
        let response = self.send(query.to_string(), &QuerySettings::new()).await?;
        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        Ok(text.trim().to_string())
    }

    fn map_transport_error(&self, error: reqwest::Error) -> ClientError {
        if error.is_timeout() {
            ClientError::Timeout(self.config.request_timeout)
        } else {
            ClientError::Http(error)
        }
    }
}

/// Settings for a streamed query.
///
/// Cancelling a [`QueryStream`] drops the response body; without
/// [`CANCEL_ON_CLIENT_CLOSE`] the server would keep executing the query.
/// An explicit value in `settings` wins.
pub fn streaming_settings(settings: &QuerySettings) -> QuerySettings {
    let mut settings = settings.clone();
    settings
        .entry(CANCEL_ON_CLIENT_CLOSE.to_string())
        .or_insert_with(|| "1".to_string());
    settings
}

/// Append the progress format to a query, dropping trailing semicolons.
pub fn with_progress_format(query: &str) -> String {
    let trimmed = query.trim_end().trim_end_matches(';').trim_end();
    format!("{}\nFORMAT {}", trimmed, PROGRESS_FORMAT)
}

#[async_trait]
impl DatabaseClient for HttpDatabaseClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn server_version(&self) -> Result<String, ClientError> {
        self.scalar("SELECT version()").await
    }

    async fn execute_streaming(
        &self,
        query: &str,
        settings: &QuerySettings,
    ) -> Result<QueryStream, ClientError> {
        let settings = streaming_settings(settings);
        let response = self.send(with_progress_format(query), &settings).await?;
        let timeout = self.config.request_timeout;

        let mut parser = ProgressParser::new();
        let events = response
            .bytes_stream()
            .map(move |chunk| -> Vec<Result<StreamEvent, ClientError>> {
                match chunk {
                    Ok(bytes) => parser.feed(&bytes),
                    Err(e) if e.is_timeout() => vec![Err(ClientError::Timeout(timeout))],
                    Err(e) => vec![Err(ClientError::Http(e))],
                }
            })
            .flat_map(futures::stream::iter);

        Ok(QueryStream::new(events))
    }

    async fn exists_object(&self, name: &str) -> Result<bool, ClientError> {
        let answer = self.scalar(&format!("EXISTS TABLE {}", name)).await?;
        match answer.as_str() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(ClientError::Protocol(format!(
                "unexpected EXISTS answer: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Debug for HttpDatabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDatabaseClient")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .finish()
    }
}
