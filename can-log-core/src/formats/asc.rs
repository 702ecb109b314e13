//! ASC (Vector ASCII trace) parser
//!
//! Line oriented. Header lines set up the identifier radix, the timestamp mode
//! and the measurement start; every other line is classified as a classic
//! data frame, a CAN FD data frame, a recognised non-frame event (skipped
//! and counted) or a malformed line (skipped with a warning).
//!
//! ```text
//! date Mon Nov 1 10:30:00.000 2021
//! base hex  timestamps absolute
//!    0.010000 1  123             Rx   d 8 00 01 02 03 04 05 06 07
//!    0.020000 1  18FEF100x       Tx   d 3 AA BB CC
//!    0.030000 CANFD   1 Rx        1A0  EngineFd 1 0 9 12 00 01 02 03 04 05 06 07 08 09 0A 0B
//! ```

use crate::formats::{FrameSource, LogFormat, ParseSummary};
use crate::types::{
    AnalyzerError, CanFrame, Direction, ParseWarning, ParseWarningKind, Payload, Result, WarningLocation,
    CAN_EFF_MASK, CAN_SFF_MAX, MAX_PAYLOAD,
};
use chrono::NaiveDateTime;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Header keywords that may open an ASC file
const HEADER_KEYWORDS: &[&str] = &[
    "date ",
    "base ",
    "timestamps ",
    "//",
    "begin triggerblock",
    "end triggerblock",
    "internal events logged",
    "no internal events logged",
];

/// Accepted layouts of the `date` header (after the keyword)
const DATE_FORMATS: &[&str] = &[
    "%a %b %d %I:%M:%S%.f %p %Y",
    "%a %b %d %I:%M:%S %p %Y",
    "%a %b %d %H:%M:%S%.f %Y",
    "%a %b %d %H:%M:%S %Y",
];

/// True when the prefix looks like an ASC trace: text whose first non-blank
/// line is a known header or starts with a timestamp.
pub fn has_signature(prefix: &[u8]) -> bool {
    if prefix.iter().take(64).any(|&b| b == 0) {
        return false;
    }
    let text = String::from_utf8_lossy(prefix);
    let Some(first) = text.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return false;
    };
    let lower = first.to_ascii_lowercase();
    HEADER_KEYWORDS.iter().any(|kw| lower.starts_with(kw))
        || first
            .split_whitespace()
            .next()
            .is_some_and(|tok| tok.parse::<f64>().is_ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Radix {
    Hex,
    Dec,
}

impl Radix {
    fn value(self) -> u32 {
        match self {
            Radix::Hex => 16,
            Radix::Dec => 10,
        }
    }
}

/// What one line turned out to be
enum LineKind {
    Frame(CanFrame),
    Header,
    SkippedEvent,
    Malformed(String),
}

/// Streaming ASC parser
pub struct AscReader<R: BufRead> {
    reader: R,
    buffer: Vec<u8>,
    line_no: usize,
    radix: Radix,
    relative: bool,
    /// Absolute time of the previous event, for relative timestamps
    previous: f64,
    summary: ParseSummary,
    finished: bool,
}

impl AscReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        log::info!("Parsing ASC file: {:?}", path);
        let file = File::open(path).map_err(|e| AnalyzerError::io(path, e))?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> AscReader<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(256),
            line_no: 0,
            radix: Radix::Hex,
            relative: false,
            previous: 0.0,
            summary: ParseSummary::default(),
            finished: false,
        }
    }

    fn classify(&mut self, line: &str) -> LineKind {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return LineKind::Header;
        }

        let mut tokens = trimmed.split_whitespace();
        let first = tokens.next().unwrap_or("");
        let Ok(timestamp) = first.parse::<f64>() else {
            return self.header(trimmed);
        };
        // Relative deltas count on every timed line, skipped events included
        let timestamp = self.absolute(timestamp);
        let tokens: Vec<&str> = tokens.collect();

        match tokens.first().copied() {
            Some("CANFD") => self.fd_frame(timestamp, &tokens[1..]),
            Some(channel) if channel.parse::<u16>().is_ok() => match tokens.get(1).copied() {
                Some("ErrorFrame") | Some("Statistic:") => LineKind::SkippedEvent,
                Some(tok) if tok.starts_with("Status") || tok.starts_with("SV:") => LineKind::SkippedEvent,
                Some(_) => self.classic_frame(timestamp, &tokens),
                None => LineKind::Malformed("channel without frame".to_string()),
            },
            // Start of measurement, bus statistics of other buses, triggers
            Some(_) => LineKind::SkippedEvent,
            None => LineKind::Malformed("timestamp without event".to_string()),
        }
    }

    fn header(&mut self, line: &str) -> LineKind {
        let lower = line.to_ascii_lowercase();
        if let Some(rest) = line.strip_prefix("date ") {
            match parse_date(rest) {
                Some(start) => self.summary.start_time = Some(start),
                None => {
                    let warning = ParseWarning::new(
                        WarningLocation::Line(self.line_no),
                        ParseWarningKind::InvalidHeader,
                        format!("unrecognised date `{}`", rest.trim()),
                    );
                    self.summary.warn(warning);
                }
            }
            return LineKind::Header;
        }

        if lower.starts_with("base ") || lower.starts_with("timestamps ") {
            let words: Vec<&str> = lower.split_whitespace().collect();
            for pair in words.windows(2) {
                match (pair[0], pair[1]) {
                    ("base", "hex") => self.radix = Radix::Hex,
                    ("base", "dec") => self.radix = Radix::Dec,
                    ("timestamps", "relative") => self.relative = true,
                    ("timestamps", "absolute") => self.relative = false,
                    _ => {}
                }
            }
            return LineKind::Header;
        }

        if HEADER_KEYWORDS.iter().any(|kw| lower.starts_with(kw)) {
            return LineKind::Header;
        }
        LineKind::Malformed("no timestamp".to_string())
    }

    /// `<channel> <id>[x] <Rx|Tx> d <dlc> <bytes...> [annotations]`
    fn classic_frame(&mut self, timestamp: f64, tokens: &[&str]) -> LineKind {
        let [channel, id, direction, kind, rest @ ..] = tokens else {
            return LineKind::Malformed("too few columns".to_string());
        };
        if matches!(*direction, "TxRq") {
            return LineKind::SkippedEvent;
        }
        let Some(direction) = Direction::from_token(direction) else {
            return LineKind::Malformed(format!("unknown direction `{}`", direction));
        };
        match *kind {
            "d" | "D" => {}
            "r" | "R" => return LineKind::SkippedEvent,
            other => return LineKind::Malformed(format!("unknown frame type `{}`", other)),
        }
        let Some((can_id, is_extended)) = self.parse_id(id) else {
            return LineKind::Malformed(format!("bad identifier `{}`", id));
        };
        let Some(dlc) = rest.first().and_then(|t| u8::from_str_radix(t, 16).ok()) else {
            return LineKind::Malformed("missing data length".to_string());
        };
        let expected = (dlc as usize).min(8);
        let payload = match parse_bytes(&rest[1..], expected) {
            Ok(payload) => payload,
            Err(reason) => return LineKind::Malformed(reason),
        };
        let channel = channel.parse().unwrap_or_default();

        LineKind::Frame(CanFrame {
            timestamp,
            channel,
            can_id,
            is_extended,
            is_fd: false,
            direction,
            payload,
        })
    }

    /// `<channel> <Rx|Tx> <id>[x] [name] <brs> <esi> <dlc> <len> <bytes...>`
    fn fd_frame(&mut self, timestamp: f64, tokens: &[&str]) -> LineKind {
        let [channel, direction, id, rest @ ..] = tokens else {
            return LineKind::Malformed("too few CANFD columns".to_string());
        };
        let Ok(channel) = channel.parse::<u16>() else {
            return LineKind::Malformed(format!("bad channel `{}`", channel));
        };
        let Some(direction) = Direction::from_token(direction) else {
            return LineKind::Malformed(format!("unknown direction `{}`", direction));
        };
        let Some((can_id, is_extended)) = self.parse_id(id) else {
            return LineKind::Malformed(format!("bad identifier `{}`", id));
        };

        // A symbolic message name may sit between the identifier and the BRS flag
        let rest = match rest.first() {
            Some(tok) if *tok != "0" && *tok != "1" => &rest[1..],
            _ => rest,
        };
        let [_brs, _esi, dlc, length, bytes @ ..] = rest else {
            return LineKind::Malformed("too few CANFD columns".to_string());
        };
        if u8::from_str_radix(dlc, 16).is_err() {
            return LineKind::Malformed(format!("bad CANFD dlc `{}`", dlc));
        }
        let Ok(length) = length.parse::<usize>() else {
            return LineKind::Malformed(format!("bad CANFD data length `{}`", length));
        };
        if length > MAX_PAYLOAD {
            return LineKind::Malformed(format!("CANFD data length {} above 64", length));
        }
        let payload = match parse_bytes(bytes, length) {
            Ok(payload) => payload,
            Err(reason) => return LineKind::Malformed(reason),
        };

        LineKind::Frame(CanFrame {
            timestamp,
            channel,
            can_id,
            is_extended,
            is_fd: true,
            direction,
            payload,
        })
    }

    fn parse_id(&self, token: &str) -> Option<(u32, bool)> {
        let (digits, marked) = match token.strip_suffix(['x', 'X']) {
            Some(digits) => (digits, true),
            None => (token, false),
        };
        let id = u32::from_str_radix(digits, self.radix.value()).ok()?;
        let is_extended = marked || id > CAN_SFF_MAX;
        Some((id & CAN_EFF_MASK, is_extended))
    }

    fn absolute(&mut self, timestamp: f64) -> f64 {
        let absolute = if self.relative {
            self.previous + timestamp
        } else {
            timestamp
        };
        self.previous = absolute;
        absolute
    }
}

fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&text, fmt).ok())
}

/// Take exactly `expected` hex bytes; anything after them is annotation.
fn parse_bytes(tokens: &[&str], expected: usize) -> std::result::Result<Payload, String> {
    if tokens.len() < expected {
        return Err(format!("expected {} data bytes, found {}", expected, tokens.len()));
    }
    let mut bytes = [0u8; MAX_PAYLOAD];
    for (slot, tok) in bytes.iter_mut().zip(&tokens[..expected]) {
        if tok.len() > 2 {
            return Err(format!("bad data byte `{}`", tok));
        }
        *slot = u8::from_str_radix(tok, 16).map_err(|_| format!("bad data byte `{}`", tok))?;
    }
    Ok(Payload::new(&bytes[..expected]))
}

impl<R: BufRead + Send> Iterator for AscReader<R> {
    type Item = CanFrame;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.buffer.clear();
            match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => {
                    self.finished = true;
                    log::info!(
                        "ASC parse finished: {} frames, {} warnings, {} skipped events",
                        self.summary.frame_count,
                        self.summary.warnings.len(),
                        self.summary.skipped_events
                    );
                }
                Ok(_) => {
                    self.line_no += 1;
                    let line = String::from_utf8_lossy(&self.buffer).into_owned();
                    match self.classify(&line) {
                        LineKind::Frame(frame) => {
                            log::trace!("ASC line {}: ID 0x{:X}", self.line_no, frame.can_id);
                            self.summary.record(&frame);
                            return Some(frame);
                        }
                        LineKind::Header => {}
                        LineKind::SkippedEvent => self.summary.skipped_events += 1,
                        LineKind::Malformed(reason) => {
                            let warning = ParseWarning::new(
                                WarningLocation::Line(self.line_no),
                                ParseWarningKind::MalformedLine,
                                reason,
                            );
                            self.summary.warn(warning);
                        }
                    }
                }
                Err(e) => {
                    let warning = ParseWarning::new(
                        WarningLocation::Line(self.line_no + 1),
                        ParseWarningKind::ReadFailure,
                        e.to_string(),
                    );
                    self.summary.warn(warning);
                    self.finished = true;
                }
            }
        }
        None
    }
}

impl<R: BufRead + Send> FrameSource for AscReader<R> {
    fn format(&self) -> LogFormat {
        LogFormat::Asc
    }

    fn summary(&self) -> &ParseSummary {
        &self.summary
    }
}
