//! Runlog HTTP Client
//!
//! A typed HTTP client for the runlog server, used by job executors to ship
//! log lines and by the CLI to follow them.
//!
//! # Example
//!
//! ```no_run
//! use runlog_client::LogStreamClient;
//! use runlog_core::domain::job::JobId;
//! use runlog_core::domain::log::LogRecord;
//!
//! # async fn example() -> runlog_client::Result<()> {
//! let client = LogStreamClient::new("http://localhost:8080");
//! let job = JobId::from(7);
//!
//! client.setup_consumer_groups(&job).await?;
//! let report = client
//!     .append_logs(vec![LogRecord::new(job, "plan", 1, "Initializing")])
//!     .await?;
//!
//! println!("appended {} lines", report.appended.len());
//! # Ok(())
//! # }
//! ```

pub mod error;
mod groups;
mod logs;
pub mod settle;
pub mod shipper;
pub mod sink;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use settle::{SettleOptions, wait_for_stream_settle};
pub use shipper::LogShipper;
pub use sink::LogSink;

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the runlog server API
///
/// Methods are grouped by audience:
/// - Producers: append batches, set up consumer groups
/// - Consumers: group reads, acknowledgements, reclaim, pending summaries
/// - Inspection: replay and stream info
#[derive(Debug, Clone)]
pub struct LogStreamClient {
    /// Base URL of the server (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl LogStreamClient {
    /// Create a new client
    ///
    /// # Example
    /// ```
    /// use runlog_client::LogStreamClient;
    ///
    /// let client = LogStreamClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// Blocking group reads hold the request open for up to `blockMs`, so a
    /// configured request timeout should exceed the longest block used.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(
                status.as_u16(),
                error_message(error_text),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

/// Pull the message out of a `{"error": "..."}` body, or keep the raw text
fn error_message(body: String) -> String {
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = LogStreamClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/logs"), "http://localhost:8080/logs");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":"group missing"}"#.to_string()),
            "group missing"
        );
        assert_eq!(error_message("plain text".to_string()), "plain text");
    }
}
