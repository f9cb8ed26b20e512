//! Recover device telemetry from a status page without a machine-readable API.
//!
//! Device firmware renders its diagnostics as free-form prose inside generic
//! text containers, e.g.
//!
//! ```text
//! <span>LAST STATE: Ready<br>Firmware: GG v24.09.24a<br>GUID: 7F3A...<br>MAC: 2C:F4:32:AA:BB:CC</span>
//! <span>Free Mem: 28.34kB Mode: NORMAL</span>
//! ```
//!
//! Values are recovered by ordered marker scanning: a [`MarkerBlock`] is
//! entered when a container's text holds its anchor, and each marker's value
//! runs up to the next marker of the block. Missing markers leave their field
//! at the default instead of failing the page.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, ExtractError};
use crate::types::PageFields;

/// A page field a marker value is written into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    State,
    Firmware,
    Guid,
    Mac,
    FreeMem,
    Mode,
}

impl Field {
    /// Write the raw text found after this field's marker into `fields`.
    fn apply(self, raw: &str, fields: &mut PageFields) {
        match self {
            Field::State => fields.state = raw.trim().to_string(),
            Field::Firmware => fields.firmware = sanitize_firmware(raw.trim()).to_string(),
            Field::Guid => fields.guid = raw.trim().to_string(),
            Field::Mac => {
                if let Some(mac) = find_mac(raw) {
                    fields.mac = mac.to_string();
                }
            }
            Field::FreeMem => {
                if let Some(kb) = parse_free_mem(raw) {
                    fields.free_mem_kb = kb;
                }
            }
            Field::Mode => fields.mode = raw.trim().to_string(),
        }
    }
}

/// One label inside a block and the field its value belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMarker {
    pub marker: String,
    pub field: Field,
}

impl FieldMarker {
    pub fn new(marker: impl Into<String>, field: Field) -> Self {
        Self {
            marker: marker.into(),
            field,
        }
    }
}

/// Markers that appear together, in rendering order, in one text container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerBlock {
    /// Text whose presence marks a container as holding this block.
    pub anchor: String,
    pub markers: Vec<FieldMarker>,
}

impl MarkerBlock {
    /// Scan `text` and write every marker value found into `fields`.
    fn scan(&self, text: &str, fields: &mut PageFields) {
        if !text.contains(&self.anchor) {
            return;
        }

        for (i, current) in self.markers.iter().enumerate() {
            let Some(pos) = text.find(&current.marker) else {
                continue;
            };
            let rest = &text[pos + current.marker.len()..];
            let end = self.markers[i + 1..]
                .iter()
                .filter_map(|next| rest.find(&next.marker))
                .min()
                .unwrap_or(rest.len());
            current.field.apply(&rest[..end], fields);
        }
    }
}

/// Where the extractor looks and which markers it scans for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerLayout {
    /// CSS selector of the element holding the device name.
    pub heading: String,
    /// CSS selector of the text containers holding marker blocks.
    pub container: String,
    pub blocks: Vec<MarkerBlock>,
}

impl Default for MarkerLayout {
    fn default() -> Self {
        Self {
            heading: "h1".to_string(),
            container: "span".to_string(),
            blocks: vec![
                MarkerBlock {
                    anchor: "LAST STATE:".to_string(),
                    markers: vec![
                        FieldMarker::new("LAST STATE:", Field::State),
                        FieldMarker::new("Firmware:", Field::Firmware),
                        FieldMarker::new("GUID:", Field::Guid),
                        FieldMarker::new("MAC:", Field::Mac),
                    ],
                },
                MarkerBlock {
                    anchor: "Free Mem:".to_string(),
                    markers: vec![
                        FieldMarker::new("Free Mem:", Field::FreeMem),
                        FieldMarker::new("Mode:", Field::Mode),
                    ],
                },
            ],
        }
    }
}

/// Compiled [`MarkerLayout`], shareable across workers.
#[derive(Debug, Clone)]
pub struct Extractor {
    heading: Selector,
    container: Selector,
    blocks: Vec<MarkerBlock>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(MarkerLayout::default()).expect("default layout selectors are valid")
    }
}

impl Extractor {
    pub fn new(layout: MarkerLayout) -> Result<Self, BuildError> {
        Ok(Self {
            heading: parse_selector(&layout.heading)?,
            container: parse_selector(&layout.container)?,
            blocks: layout.blocks,
        })
    }

    /// Decode a response body and extract its fields.
    ///
    /// Bytes that are not valid UTF-8 (legacy code pages in device names)
    /// are replaced, not rejected. Only a body carrying NUL bytes is refused,
    /// since that is binary content rather than a status page.
    pub fn parse_page(&self, body: &[u8]) -> Result<PageFields, ExtractError> {
        if let Some(offset) = body.iter().position(|&b| b == 0) {
            return Err(ExtractError::BinaryContent { offset });
        }
        Ok(self.extract(&String::from_utf8_lossy(body)))
    }

    /// Extract fields from page markup. Pure: same input, same output.
    pub fn extract(&self, html: &str) -> PageFields {
        let document = Html::parse_document(html);
        let mut fields = PageFields::default();

        if let Some(heading) = document.select(&self.heading).next() {
            fields.name = heading.text().collect::<String>().trim().to_string();
        }

        for container in document.select(&self.container) {
            let text: String = container.text().collect();
            for block in &self.blocks {
                block.scan(&text, &mut fields);
            }
        }

        fields
    }
}

fn parse_selector(selector: &str) -> Result<Selector, BuildError> {
    Selector::parse(selector).map_err(|e| BuildError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Drop the descriptive prefix before the first `v<digit>`.
///
/// `"GG v24.09.24a"` becomes `"v24.09.24a"`; text without the pattern is
/// returned unchanged.
pub fn sanitize_firmware(firmware: &str) -> &str {
    static VERSION_RE: OnceLock<Regex> = OnceLock::new();
    let re = VERSION_RE.get_or_init(|| Regex::new(r"v\d").expect("version regex is valid"));
    match re.find(firmware) {
        Some(m) => &firmware[m.start()..],
        None => firmware,
    }
}

/// First six-group hex MAC address (colon or hyphen separated) in `text`.
pub fn find_mac(text: &str) -> Option<&str> {
    static MAC_RE: OnceLock<Regex> = OnceLock::new();
    let re = MAC_RE.get_or_init(|| {
        Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}[0-9A-Fa-f]{2}").expect("MAC regex is valid")
    });
    re.find(text).map(|m| m.as_str())
}

/// Parse a free memory reading such as `"28.34kB"` or `"15 KB"` into kilobytes.
pub fn parse_free_mem(raw: &str) -> Option<f64> {
    static UNIT_RE: OnceLock<Regex> = OnceLock::new();
    let re = UNIT_RE.get_or_init(|| Regex::new(r"(?i)kb?$").expect("unit regex is valid"));
    let number = re.replace(raw.trim(), "");
    number
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|kb| kb.is_finite())
}
