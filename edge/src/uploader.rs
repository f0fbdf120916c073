//! HTTPS batch uploader posting buffered samples to the ingest endpoint.
//!
//! Each cycle peeks a batch from the spool, POSTs it to `/v1/ingest` with
//! bearer authentication, and acknowledges the rows only on an HTTP 200
//! with a well-formed body. Rows are never dropped and never reordered:
//! a failed cycle leaves the spool untouched and the next cycle re-peeks
//! from the head.
//!
//! TLS certificate verification is always enabled; the base URL is
//! validated as HTTPS at construction and never relaxed afterwards.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::spool::Spool;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors constructing the uploader.
#[derive(Debug, Error)]
pub enum UploaderError {
    #[error("server base URL must use HTTPS (got '{0}')")]
    InsecureUrl(String),
    #[error("invalid server base URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Exponential backoff state: doubles on failure up to a cap, resets on
/// success.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(max: Duration) -> Self {
        Self {
            current: INITIAL_BACKOFF,
            max,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    fn advance(&mut self) {
        self.current = (self.current * 2).min(self.max);
    }

    fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }
}

#[derive(Debug, Deserialize)]
struct IngestAck {
    inserted: u64,
}

/// Batch uploader with private backoff state.
pub struct Uploader {
    client: reqwest::Client,
    ingest_url: Url,
    token: String,
    batch_size: usize,
    backoff: Backoff,
}

impl Uploader {
    /// Builds an uploader for `{base_url}/v1/ingest`. Rejects non-HTTPS
    /// base URLs.
    pub fn new(
        base_url: &str,
        token: String,
        batch_size: usize,
        max_backoff: Duration,
    ) -> Result<Self, UploaderError> {
        if !base_url.to_lowercase().starts_with("https://") {
            return Err(UploaderError::InsecureUrl(base_url.to_string()));
        }

        let ingest_url = Url::parse(&format!("{}/v1/ingest", base_url.trim_end_matches('/')))
            .map_err(|source| UploaderError::InvalidUrl {
                url: base_url.to_string(),
                source,
            })?;

        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            ingest_url,
            token,
            batch_size,
            backoff: Backoff::new(max_backoff),
        })
    }

    /// Current backoff delay; the upload loop waits at least this long
    /// after a failed cycle.
    pub fn current_backoff(&self) -> Duration {
        self.backoff.current()
    }

    /// Executes one upload cycle: peek, POST, ack on success.
    ///
    /// Returns `true` when a batch was uploaded and acknowledged, `false`
    /// when the spool was empty or the upload failed (rows kept, backoff
    /// doubled).
    pub async fn upload_once(&mut self, spool: &Spool) -> bool {
        let rows = match spool.peek(self.batch_size).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(error = %err, "spool peek failed");
                return false;
            }
        };

        if rows.is_empty() {
            tracing::debug!("spool empty, skipping upload");
            return false;
        }

        let mut rowids = Vec::with_capacity(rows.len());
        let mut samples = Vec::with_capacity(rows.len());
        for (rowid, payload) in rows {
            match serde_json::from_str::<serde_json::Value>(&payload) {
                Ok(value) => {
                    rowids.push(rowid);
                    samples.push(value);
                }
                Err(err) => {
                    // A corrupt row would block the head forever; keep it
                    // and surface loudly rather than dropping data.
                    tracing::error!(rowid, error = %err, "unparsable spool payload");
                    return false;
                }
            }
        }

        let response = self
            .client
            .post(self.ingest_url.clone())
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "samples": samples }))
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "upload failed (network error)");
                self.backoff.advance();
                return false;
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::warn!(
                status = status.as_u16(),
                retry_in_s = self.backoff.current().as_secs(),
                "upload failed, will retry after backoff"
            );
            self.backoff.advance();
            return false;
        }

        // A 200 only counts with a well-formed acknowledgment body.
        let ack: IngestAck = match response.json().await {
            Ok(ack) => ack,
            Err(err) => {
                tracing::warn!(error = %err, "upload returned 200 with malformed body");
                self.backoff.advance();
                return false;
            }
        };

        if let Err(err) = spool.ack(rowids.clone()).await {
            // The server has the rows; the next cycle re-sends them and the
            // ingest conflict rule makes the replay harmless.
            tracing::error!(error = %err, "failed to ack uploaded rows");
            return false;
        }

        tracing::info!(
            uploaded = samples.len(),
            inserted = ack.inserted,
            first_rowid = rowids.first().copied(),
            last_rowid = rowids.last().copied(),
            "uploaded sample batch"
        );
        self.backoff.reset();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_http_base_url() {
        let result = Uploader::new(
            "http://solar.example.com",
            "tok".to_string(),
            30,
            Duration::from_secs(300),
        );
        assert!(matches!(result, Err(UploaderError::InsecureUrl(_))));
    }

    #[test]
    fn accepts_https_and_builds_ingest_url() {
        let uploader = Uploader::new(
            "https://solar.example.com/",
            "tok".to_string(),
            30,
            Duration::from_secs(300),
        )
        .unwrap();
        assert_eq!(
            uploader.ingest_url.as_str(),
            "https://solar.example.com/v1/ingest"
        );
    }

    #[test]
    fn backoff_doubles_to_cap_and_resets() {
        let mut backoff = Backoff::new(Duration::from_secs(300));
        assert_eq!(backoff.current(), Duration::from_secs(1));

        let expected = [2u64, 4, 8, 16, 32, 64, 128, 256, 300, 300];
        for secs in expected {
            backoff.advance();
            assert_eq!(backoff.current(), Duration::from_secs(secs));
        }

        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn empty_spool_is_not_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::open(&dir.path().join("spool.db")).unwrap();
        let mut uploader = Uploader::new(
            "https://solar.example.com",
            "tok".to_string(),
            30,
            Duration::from_secs(300),
        )
        .unwrap();

        assert!(!uploader.upload_once(&spool).await);
        // An empty cycle neither grows nor resets the backoff.
        assert_eq!(uploader.current_backoff(), Duration::from_secs(1));
    }
}
