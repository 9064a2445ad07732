//! Device error decoding
//!
//! The robot reports errors as `(timestamp, source, code)` triples. This
//! module turns them into readable text and flags codes that are known to
//! affect stability.
//!
//! Criticality is a best-effort heuristic over a fixed allow-list of codes.
//! It is not exhaustive: an unlisted code is reported as non-critical even if
//! the robot treats it as severe.

use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{Error, Result};

/// Codes at or above this value are composite codes with no single source
pub const COMPLEX_CODE_THRESHOLD: u64 = 100_000;

/// Source category used for composite codes
pub const COMPLEX_SOURCE: u32 = 900;

/// Codes known to affect stability, as upper-case hex without prefix
const CRITICAL_CODES: &[&str] = &[
    "67924D46", // balance / stability
    "135",      // motor or actuator
    "10",       // basic system error
];

/// Source category texts
const SOURCE_TEXT: &[(u32, &str)] = &[
    (100, "Communication firmware malfunction"),
    (200, "Communication firmware malfunction"),
    (300, "Motor malfunction"),
    (400, "Radar malfunction"),
    (500, "UWB malfunction"),
    (600, "Motion control"),
    (700, "Wheel motor malfunction"),
    (COMPLEX_SOURCE, "Complex error"),
];

/// Code texts keyed by source category and upper-case hex code
const CODE_TEXT: &[(u32, &str, &str)] = &[
    (100, "1", "DDS message timeout"),
    (100, "2", "Distribution switch abnormal"),
    (100, "10", "Battery communication error"),
    (100, "20", "Abnormal mote control communication"),
    (100, "40", "MCU communication error"),
    (100, "80", "Motor communication error"),
    (200, "1", "Rear left fan jammed"),
    (200, "2", "Rear right fan jammed"),
    (200, "4", "Front fan jammed"),
    (300, "1", "Overcurrent"),
    (300, "2", "Overvoltage"),
    (300, "4", "Driver overheating"),
    (300, "8", "Generatrix undervoltage"),
    (300, "10", "Winding overheating"),
    (300, "20", "Encoder abnormal"),
    (300, "100", "Motor communication interruption"),
    (400, "1", "Motor rotate speed abnormal"),
    (400, "2", "PointCloud data abnormal"),
    (400, "4", "Serial port data abnormal"),
    (400, "10", "Dirt index abnormal"),
    (500, "1", "UWB serial port open abnormal"),
    (500, "2", "Robot dog information retrieval abnormal"),
    (600, "4", "Overheating software protection"),
    (600, "8", "Low battery software protection"),
    (700, "1", "Wheel motor overcurrent"),
    (700, "2", "Wheel motor overvoltage"),
    (700, "4", "Wheel driver overheating"),
    (700, "8", "Wheel generatrix undervoltage"),
    (700, "10", "Wheel winding overheating"),
    (700, "20", "Wheel encoder abnormal"),
    (700, "40", "Wheel calibration data abnormal"),
];

/// One error reported by the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceErrorRecord {
    /// Seconds since the Unix epoch
    pub timestamp: u64,
    /// Raw error source
    pub source: u32,
    /// Raw error code
    pub code: u64,
}

impl DeviceErrorRecord {
    pub fn new(timestamp: u64, source: u32, code: u64) -> Self {
        Self {
            timestamp,
            source,
            code,
        }
    }

    /// Source category: the source rounded down to the hundred, or the
    /// complex category for composite codes
    pub fn source_category(&self) -> u32 {
        if self.code >= COMPLEX_CODE_THRESHOLD {
            COMPLEX_SOURCE
        } else {
            self.source / 100 * 100
        }
    }

    /// Code as upper-case hex without prefix
    pub fn code_hex(&self) -> String {
        format!("{:X}", self.code)
    }
}

/// Readable form of a [`DeviceErrorRecord`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Source category the texts were looked up under
    pub source: u32,
    /// Text for the source category, or the category number
    pub source_text: String,
    /// Text for the code, or `"{source}-{code}"`
    pub code_text: String,
    /// Whether the code is on the critical allow-list
    pub critical: bool,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = if self.critical { "CRITICAL" } else { "error" };
        write!(f, "{} [{}] {}", severity, self.source_text, self.code_text)
    }
}

/// Classify a record. Never fails: unknown sources and codes fall back to
/// their numeric forms.
pub fn classify(record: &DeviceErrorRecord) -> Classification {
    let source = record.source_category();
    let code_hex = record.code_hex();

    let source_text = SOURCE_TEXT
        .iter()
        .find(|(s, _)| *s == source)
        .map(|(_, text)| text.to_string())
        .unwrap_or_else(|| source.to_string());

    let code_text = CODE_TEXT
        .iter()
        .find(|(s, c, _)| *s == source && *c == code_hex)
        .map(|(_, _, text)| text.to_string())
        .unwrap_or_else(|| format!("{}-{}", source, code_hex));

    Classification {
        source,
        source_text,
        code_text,
        critical: is_critical(record.code),
    }
}

/// Check a raw code against the critical allow-list
pub fn is_critical(code: u64) -> bool {
    let hex = format!("{:X}", code);
    CRITICAL_CODES.iter().any(|c| *c == hex)
}

/// Decode the `data` field of an error report.
///
/// `data` is either a single entry or a list of entries, where an entry is
/// a `[timestamp, source, code]` triple or a bare code. Bare codes get
/// source 0 and the current time. Each entry yields its own result so one
/// malformed entry does not hide the others.
pub fn decode_error_report(data: &Value) -> Vec<Result<DeviceErrorRecord>> {
    match data {
        Value::Array(items) => items.iter().map(decode_entry).collect(),
        other => vec![decode_entry(other)],
    }
}

fn decode_entry(entry: &Value) -> Result<DeviceErrorRecord> {
    match entry {
        Value::Array(items) if items.len() == 3 => {
            let timestamp = as_u64(&items[0])?;
            let source = as_u64(&items[1])?;
            let code = as_u64(&items[2])?;
            let source = u32::try_from(source)
                .map_err(|_| Error::DecodeError(format!("error source out of range: {}", source)))?;
            Ok(DeviceErrorRecord::new(timestamp, source, code))
        }
        Value::Number(_) => Ok(DeviceErrorRecord::new(now_secs(), 0, as_u64(entry)?)),
        other => Err(Error::DecodeError(format!(
            "unrecognized error entry: {}",
            other
        ))),
    }
}

fn as_u64(value: &Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| Error::DecodeError(format!("expected a non-negative integer, got {}", value)))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
