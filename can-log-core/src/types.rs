//! Core types for the CAN log analyzer library
//!
//! This module defines the fundamental types shared by the parsers, the
//! decoder and the dataset index: raw frames as read from a log file, the
//! immutable records a dataset owns, decoded signal values, and the error and
//! warning taxonomy.

use crate::signals::database::{MessageDefinition, SignalDefinition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Result type for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Largest payload carried by any supported frame type (CAN FD)
pub const MAX_PAYLOAD: usize = 64;

/// Mask of the 29 identifier bits of an extended CAN identifier
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

/// Largest 11-bit standard identifier
pub const CAN_SFF_MAX: u32 = 0x7FF;

/// Maps a CAN FD data length code to the number of payload bytes.
pub fn dlc_to_len(dlc: u8) -> usize {
    const FD_LENGTHS: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];
    FD_LENGTHS[(dlc & 0x0F) as usize]
}

/// Frame direction as recorded by the logger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    /// Parse the ASC direction token (`Rx` / `Tx`)
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "Rx" | "rx" | "RX" => Some(Direction::Rx),
            "Tx" | "tx" | "TX" => Some(Direction::Tx),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "Rx"),
            Direction::Tx => write!(f, "Tx"),
        }
    }
}

/// Fixed-capacity frame payload
///
/// Stores up to [`MAX_PAYLOAD`] bytes inline so a dataset of many records
/// does not hold one heap allocation per frame. The length is always the
/// number of bytes actually captured.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Payload {
    len: u8,
    bytes: [u8; MAX_PAYLOAD],
}

impl Payload {
    /// Build a payload from captured bytes. Anything past 64 bytes is dropped.
    pub fn new(data: &[u8]) -> Self {
        debug_assert!(data.len() <= MAX_PAYLOAD, "payload longer than {MAX_PAYLOAD} bytes");
        let len = data.len().min(MAX_PAYLOAD);
        let mut bytes = [0u8; MAX_PAYLOAD];
        bytes[..len].copy_from_slice(&data[..len]);
        Self {
            len: len as u8,
            bytes,
        }
    }

    pub fn empty() -> Self {
        Self::new(&[])
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Uppercase hex, bytes separated by single spaces (`"0A 1B"`)
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.len() * 3);
        for (i, b) in self.as_slice().iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&format!("{:02X}", b));
        }
        out
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload[{}]", self.to_hex())
    }
}

/// Raw CAN frame from a log file (ASC, BLF)
///
/// This represents a single CAN frame as read from the log file,
/// before any signal decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct CanFrame {
    /// Seconds since the start of the measurement
    pub timestamp: f64,
    /// CAN channel number as written by the logger
    pub channel: u16,
    /// CAN message ID (11-bit or 29-bit, flag bits removed)
    pub can_id: u32,
    /// True if this is an extended (29-bit) CAN ID
    pub is_extended: bool,
    /// True if this is a CAN-FD frame
    pub is_fd: bool,
    pub direction: Direction,
    pub payload: Payload,
}

impl CanFrame {
    /// Get the data length - number of captured data bytes
    pub fn dlc(&self) -> usize {
        self.payload.len()
    }

    pub fn data(&self) -> &[u8] {
        self.payload.as_slice()
    }
}

/// One immutable entry of a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Position in origin order, strictly increasing across the dataset
    pub sequence: u64,
    pub frame: CanFrame,
}

/// A record together with the signal values decoded for it
///
/// Returned by the dataset accessors. `signals` is `None` when no active
/// database defines the record's identifier.
#[derive(Debug, Clone)]
pub struct RecordView<'a> {
    pub record: &'a LogRecord,
    pub signals: Option<Arc<DecodedMessage>>,
}

impl<'a> RecordView<'a> {
    pub fn sequence(&self) -> u64 {
        self.record.sequence
    }

    pub fn frame(&self) -> &'a CanFrame {
        &self.record.frame
    }

    /// Name of the matching message definition, if any
    pub fn message_name(&self) -> Option<&str> {
        self.signals.as_ref().map(|m| m.definition.name.as_str())
    }

    /// Look up one decoded signal by name
    pub fn signal(&self, name: &str) -> Option<SignalReading<'_>> {
        self.signals.as_ref().and_then(|m| m.get(name))
    }

    /// All decoded signals in definition order (empty if nothing decoded)
    pub fn readings(&self) -> impl Iterator<Item = SignalReading<'_>> {
        self.signals.iter().flat_map(|m| m.readings())
    }
}

/// A decoded value stored per record: index of the signal in its message
/// definition plus raw and physical values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedValue {
    pub signal_index: u16,
    pub raw: i64,
    pub physical: f64,
}

/// All signals decoded from one frame under one message definition
///
/// The signal set for an identifier is fixed once a database is active, so
/// values are kept as a small ordered list referencing the shared definition
/// instead of a per-record name map.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub definition: Arc<MessageDefinition>,
    pub values: Vec<DecodedValue>,
    /// Active multiplexer value (if message is multiplexed)
    pub multiplexer_value: Option<u64>,
}

impl DecodedMessage {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn readings(&self) -> impl Iterator<Item = SignalReading<'_>> {
        self.values.iter().filter_map(move |v| self.reading(v))
    }

    pub fn get(&self, name: &str) -> Option<SignalReading<'_>> {
        self.readings().find(|r| r.definition.name == name)
    }

    fn reading<'s>(&'s self, value: &DecodedValue) -> Option<SignalReading<'s>> {
        let definition = self.definition.signals.get(value.signal_index as usize)?;
        Some(SignalReading {
            definition,
            raw: value.raw,
            physical: value.physical,
        })
    }
}

/// A decoded signal value borrowed together with its definition
#[derive(Debug, Clone, Copy)]
pub struct SignalReading<'a> {
    pub definition: &'a SignalDefinition,
    pub raw: i64,
    pub physical: f64,
}

impl<'a> SignalReading<'a> {
    pub fn name(&self) -> &'a str {
        &self.definition.name
    }

    pub fn unit(&self) -> Option<&'a str> {
        self.definition.unit.as_deref()
    }

    /// Value description from the signal's value table (e.g. "Park")
    pub fn label(&self) -> Option<&'a str> {
        self.definition
            .value_table
            .as_ref()
            .and_then(|table| table.get(&self.raw))
            .map(String::as_str)
    }

    /// Display form used by search and listings: the label when the value
    /// table has one, otherwise the physical value (integers without
    /// fraction, others rounded to two decimals).
    pub fn display_value(&self) -> String {
        if let Some(label) = self.label() {
            return label.to_string();
        }
        format_physical(self.physical)
    }
}

impl fmt::Display for SignalReading<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit() {
            Some(unit) => write!(f, "{}: {} {}", self.name(), self.display_value(), unit),
            None => write!(f, "{}: {}", self.name(), self.display_value()),
        }
    }
}

fn format_physical(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", (value * 100.0).round() / 100.0)
    }
}

/// Errors that abort an import or load operation
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported log format: {0}")]
    Format(String),

    #[error("Failed to parse definitions {path:?}: {reason}")]
    Definitions { path: PathBuf, reason: String },

    #[error("Unknown definitions database: {0}")]
    UnknownDatabase(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Worker failed: {0}")]
    Worker(String),
}

impl AnalyzerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnalyzerError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Where in the source a parse warning was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningLocation {
    /// 1-based line number of a text log
    Line(usize),
    /// Byte offset into a binary log
    Offset(u64),
}

impl fmt::Display for WarningLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningLocation::Line(n) => write!(f, "line {}", n),
            WarningLocation::Offset(o) => write!(f, "offset 0x{:X}", o),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseWarningKind {
    MalformedLine,
    InvalidHeader,
    TruncatedObject,
    BadObjectSignature,
    ObjectTooShort,
    DecompressionFailed,
    UnsupportedCompression,
    ReadFailure,
}

/// A recoverable per-line or per-object anomaly, collected rather than raised
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseWarning {
    pub location: WarningLocation,
    pub kind: ParseWarningKind,
    pub message: String,
}

impl ParseWarning {
    pub fn new(location: WarningLocation, kind: ParseWarningKind, message: impl Into<String>) -> Self {
        Self {
            location,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}: {}", self.location, self.kind, self.message)
    }
}

/// A message or signal block dropped while loading a definitions source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefinitionWarning {
    /// Message (or `Message.Signal`) the block described, as far as known
    pub block: String,
    pub reason: String,
}

impl fmt::Display for DefinitionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.block, self.reason)
    }
}
