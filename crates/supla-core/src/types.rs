//! Core data types for polled devices and their per-cycle records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PollFailure;

/// One configured device endpoint plus its credentials.
///
/// The `url` is the identity key: a record produced for this target always
/// carries the same `url`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTarget {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl DeviceTarget {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTarget")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Fields recovered from a device status page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageFields {
    pub name: String,
    pub state: String,
    pub firmware: String,
    pub guid: String,
    pub mac: String,
    pub mode: String,
    /// Free memory in kilobytes.
    pub free_mem_kb: f64,
}

/// The outcome of polling one target for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub url: String,
    pub up: bool,
    pub name: String,
    pub state: String,
    pub firmware: String,
    pub guid: String,
    pub mac: String,
    pub mode: String,
    pub free_mem_kb: f64,
}

impl DeviceRecord {
    /// Record for a device that answered and whose page was extracted.
    pub fn online(url: impl Into<String>, fields: PageFields) -> Self {
        Self {
            url: url.into(),
            up: true,
            name: fields.name,
            state: fields.state,
            firmware: fields.firmware,
            guid: fields.guid,
            mac: fields.mac,
            mode: fields.mode,
            free_mem_kb: fields.free_mem_kb,
        }
    }

    /// Degraded record for a device that could not be polled.
    ///
    /// `up` is always false and `free_mem_kb` is always 0; `state` (and for
    /// some failures `name` or `mode`) carries a short reason.
    pub fn from_failure(url: impl Into<String>, failure: &PollFailure) -> Self {
        let url = url.into();
        let mut record = Self {
            url,
            ..Self::default()
        };

        match failure {
            PollFailure::Transport(_) => {}
            PollFailure::Unauthorized => {
                record.state = "Unauthorized - check credentials".to_string();
            }
            PollFailure::Forbidden => {
                record.state = "Forbidden - access denied".to_string();
            }
            PollFailure::NotFound => {
                record.state = "Not found - check URL".to_string();
            }
            PollFailure::ServerError => {
                record.state = "Internal server error".to_string();
            }
            PollFailure::Status(code) => {
                record.name = record.url.clone();
                record.state = format!("HTTP error {code}");
            }
            PollFailure::BodyRead(_) => {
                record.state = "Timeout".to_string();
                record.mode = "ERROR".to_string();
            }
            PollFailure::Extraction(e) => {
                record.state = format!("Error parsing HTML: {e}");
            }
        }

        record
    }
}
