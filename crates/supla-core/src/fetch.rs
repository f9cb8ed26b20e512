//! Per-device HTTP retrieval with failure classification.
//!
//! A fetch always yields a [`DeviceRecord`]. Transport errors, non-200
//! statuses, body-read errors and undecodable pages are classified into a
//! [`PollFailure`] and degraded into a down record for that device only.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT_ENCODING;
use reqwest::{Response, StatusCode, Version};
use tracing::{debug, warn};

use crate::counter::AttemptCounter;
use crate::error::{BuildError, PollFailure};
use crate::extract::Extractor;
use crate::types::{DeviceRecord, DeviceTarget, PageFields};

const USER_AGENT: &str = concat!("supla-exporter/", env!("CARGO_PKG_VERSION"));

/// HTTP fetcher shared by all workers of a cycle.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    extractor: Arc<Extractor>,
}

impl Fetcher {
    /// Create a fetcher whose requests are bounded by `timeout`.
    pub fn new(timeout: Duration, extractor: Extractor) -> Result<Self, BuildError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            extractor: Arc::new(extractor),
        })
    }

    /// Fetch and extract one target. Counts exactly one attempt.
    pub async fn fetch(&self, target: &DeviceTarget, counter: &AttemptCounter) -> DeviceRecord {
        counter.increment();

        match self.poll(target).await {
            Ok(fields) => {
                let record = DeviceRecord::online(&target.url, fields);
                debug!(
                    url = %record.url,
                    name = %record.name,
                    firmware = %record.firmware,
                    "parsed device info"
                );
                record
            }
            Err(failure) => {
                debug!(url = %target.url, "device down: {failure}");
                DeviceRecord::from_failure(&target.url, &failure)
            }
        }
    }

    async fn poll(&self, target: &DeviceTarget) -> Result<PageFields, PollFailure> {
        let resp = self
            .client
            .get(&target.url)
            .basic_auth(&target.username, Some(&target.password))
            .send()
            .await
            .map_err(|e| PollFailure::Transport(e.to_string()))?;

        if resp.status() != StatusCode::OK {
            return Err(PollFailure::from_status(resp.status().as_u16()));
        }

        let body = self.read_body(target, resp).await?;
        Ok(self.extractor.parse_page(&body)?)
    }

    /// Read a 200 body, retrying once without chunked or compressed framing
    /// when the transfer encoding was malformed.
    async fn read_body(&self, target: &DeviceTarget, resp: Response) -> Result<Vec<u8>, PollFailure> {
        let err = match resp.bytes().await {
            Ok(body) => return Ok(body.to_vec()),
            Err(e) => e,
        };

        if !is_malformed_transfer(&err) {
            warn!(url = %target.url, "failed to read response body: {err}");
            return Err(PollFailure::BodyRead(err.to_string()));
        }

        warn!(
            url = %target.url,
            "malformed transfer encoding, retrying with identity encoding"
        );

        let retry = self
            .client
            .get(&target.url)
            .basic_auth(&target.username, Some(&target.password))
            .header(ACCEPT_ENCODING, "identity")
            .version(Version::HTTP_10)
            .send()
            .await
            .map_err(|e| PollFailure::BodyRead(e.to_string()))?;

        if retry.status() != StatusCode::OK {
            return Err(PollFailure::BodyRead(format!(
                "retry returned HTTP {}",
                retry.status().as_u16()
            )));
        }

        match retry.bytes().await {
            Ok(body) => Ok(body.to_vec()),
            Err(e) => {
                warn!(url = %target.url, "retry failed to read response body: {e}");
                Err(PollFailure::BodyRead(e.to_string()))
            }
        }
    }
}

/// Whether a body error (or any error in its source chain) comes from broken
/// chunked or transfer-encoding framing.
pub fn is_malformed_transfer(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let msg = e.to_string().to_ascii_lowercase();
        if msg.contains("chunk")
            || msg.contains("transfer-encoding")
            || msg.contains("transfer encoding")
        {
            return true;
        }
        current = e.source();
    }
    false
}
