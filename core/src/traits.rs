//! Core traits for database clients
//!
//! The trait lives in core so the orchestrator and precondition gate can be
//! driven by any transport. The HTTP implementation lives in querybench-client.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::error::codes;

// ============================================================================
// Database Client Trait
// ============================================================================

/// Client for the database under test
///
/// Implementations own the connection details (host, credentials, TLS) and
/// present a streaming read with progress notifications to the orchestrator.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Human-readable endpoint (e.g. "http://localhost:8123")
    fn endpoint(&self) -> &str;

    /// Server version string, e.g. "23.8.2"
    async fn server_version(&self) -> Result<String, ClientError>;

    /// Start executing a query and return its event stream
    ///
    /// Progress events carry deltas since the previous event.
    async fn execute_streaming(
        &self,
        query: &str,
        settings: &QuerySettings,
    ) -> Result<QueryStream, ClientError>;

    /// Synchronously check whether a named object (table) exists
    async fn exists_object(&self, name: &str) -> Result<bool, ClientError>;
}

/// Settings forwarded to the server with every query
pub type QuerySettings = BTreeMap<String, String>;

/// Event produced while a query streams back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// Server-side read progress since the previous event
    Progress {
        /// Rows read
        rows: u64,
        /// Uncompressed bytes read
        bytes: u64,
    },
    /// A block of result data arrived
    Data {
        /// Rows in the block
        rows: u64,
    },
}

type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ClientError>> + Send>>;

/// Streaming read of a single query
///
/// Calling [`cancel`](QueryStream::cancel) drops the underlying transport and
/// makes every later [`next`](QueryStream::next) return `None`. It is safe to
/// call while handling an event from the same stream.
pub struct QueryStream {
    events: Option<EventStream>,
}

impl QueryStream {
    /// Wrap a stream of events
    pub fn new<S>(events: S) -> Self
    where
        S: Stream<Item = Result<StreamEvent, ClientError>> + Send + 'static,
    {
        Self {
            events: Some(Box::pin(events)),
        }
    }

    /// Next event, or `None` once the stream is exhausted or cancelled
    pub async fn next(&mut self) -> Option<Result<StreamEvent, ClientError>> {
        let events = self.events.as_mut()?;
        let event = events.next().await;
        if event.is_none() {
            self.events = None;
        }
        event
    }

    /// Request early termination of the read
    pub fn cancel(&mut self) {
        if self.events.take().is_some() {
            tracing::debug!("Query stream cancelled");
        }
    }

    /// Whether the stream was cancelled or ran to completion
    pub fn is_closed(&self) -> bool {
        self.events.is_none()
    }
}

impl std::fmt::Debug for QueryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStream")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Database client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP/network error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected or failed the query
    #[error("server error {code}: {message}")]
    Server {
        /// Server error code
        code: i32,
        /// Error text returned by the server
        message: String,
    },

    /// Response could not be decoded
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Request timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Numeric error code, the server's own when it reported one
    pub fn code(&self) -> i32 {
        match self {
            ClientError::Server { code, .. } => *code,
            ClientError::Http(_) | ClientError::Timeout(_) => codes::NETWORK_ERROR,
            ClientError::Protocol(_) => codes::LOGICAL_ERROR,
            ClientError::Config(_) => codes::BAD_ARGUMENTS,
        }
    }
}
