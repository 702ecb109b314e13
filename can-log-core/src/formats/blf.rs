//! BLF (Binary Log Format) file parser
//!
//! BLF is a proprietary format from Vector Informatik for storing CAN bus
//! data. A file is a `LOGG` header followed by `LOBJ` objects; most frames sit
//! inside zlib-compressed `LogContainer` objects, and an inner object may
//! continue in the next container.
//!
//! ## Supported Object Types
//! - Type 1 (CanMessage) and 86 (CanMessage2): CAN 2.0 frames
//! - Type 100 (CanFdMessage) and 101 (CanFdMessage64): CAN-FD frames
//! - Type 10 (LogContainer): stored or zlib-compressed, unpacked in place
//!
//! Every other type is skipped by its declared size. Corruption never aborts
//! the parse: a bad signature triggers a bounded forward scan for the next
//! object, and a truncated object ends the iteration with a warning.

use crate::config::{AnalyzerConfig, TimeResolution};
use crate::formats::{FrameSource, LogFormat, ParseSummary};
use crate::types::{
    AnalyzerError, CanFrame, Direction, ParseWarning, ParseWarningKind, Payload, Result, WarningLocation,
    CAN_EFF_MASK, MAX_PAYLOAD,
};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use chrono::{NaiveDate, NaiveDateTime};
use flate2::read::ZlibDecoder;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::Path;

pub const FILE_SIGNATURE: &[u8; 4] = b"LOGG";
pub const OBJECT_SIGNATURE: &[u8; 4] = b"LOBJ";

/// Fixed part of the file header; the declared header size is usually 144
const FILE_HEADER_LEN: usize = 72;
/// Signature, header size, header version, object size, object type
const OBJECT_BASE_LEN: usize = 16;
/// Base header plus the v1 extension (flags, client, version, timestamp)
const OBJECT_HEADER_V1_LEN: usize = 32;
/// Container method, padding and uncompressed size
const CONTAINER_HEADER_LEN: usize = 16;
/// Anything larger is treated as a corrupted size field
const MAX_OBJECT_SIZE: u32 = 64 * 1024 * 1024;

pub mod object_type {
    pub const CAN_MESSAGE: u32 = 1;
    pub const LOG_CONTAINER: u32 = 10;
    pub const CAN_MESSAGE2: u32 = 86;
    pub const CAN_FD_MESSAGE: u32 = 100;
    pub const CAN_FD_MESSAGE_64: u32 = 101;
}

const TIME_TEN_MICS: u32 = 0x1;
const TIME_ONE_NANS: u32 = 0x2;

const CAN_MSG_EXT: u32 = 0x8000_0000;
const DIR_TX: u8 = 0x1;
const REMOTE_FLAG: u8 = 0x80;
const FD_EDL: u8 = 0x1;
const FD64_REMOTE: u32 = 0x0010;
const FD64_EDL: u32 = 0x1000;

const COMPRESSION_NONE: u16 = 0;
const COMPRESSION_ZLIB: u16 = 2;

/// `LOGG` magic at offset 0
pub fn has_signature(prefix: &[u8]) -> bool {
    prefix.starts_with(FILE_SIGNATURE)
}

/// Decoded fixed part of the BLF file header
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub header_size: u32,
    pub application_id: u8,
    pub application_version: (u8, u8, u8),
    pub binlog_version: (u8, u8, u8, u8),
    pub file_size: u64,
    pub uncompressed_size: u64,
    pub object_count: u32,
    pub start_time: Option<NaiveDateTime>,
    pub stop_time: Option<NaiveDateTime>,
}

impl FileHeader {
    fn parse(buf: &[u8]) -> Result<Self> {
        if !has_signature(buf) {
            return Err(AnalyzerError::Format(format!(
                "invalid BLF file signature {:02X?}",
                &buf[..buf.len().min(4)]
            )));
        }
        if buf.len() < FILE_HEADER_LEN {
            return Err(AnalyzerError::Format(format!(
                "BLF file header truncated at {} bytes",
                buf.len()
            )));
        }
        let header_size = LittleEndian::read_u32(&buf[4..8]);
        if (header_size as usize) < FILE_HEADER_LEN {
            return Err(AnalyzerError::Format(format!(
                "unsupported BLF header size {}",
                header_size
            )));
        }
        Ok(Self {
            header_size,
            application_id: buf[8],
            application_version: (buf[9], buf[10], buf[11]),
            binlog_version: (buf[12], buf[13], buf[14], buf[15]),
            file_size: LittleEndian::read_u64(&buf[16..24]),
            uncompressed_size: LittleEndian::read_u64(&buf[24..32]),
            object_count: LittleEndian::read_u32(&buf[32..36]),
            start_time: system_time(&buf[40..56]),
            stop_time: system_time(&buf[56..72]),
        })
    }
}

/// Windows SYSTEMTIME: year, month, day of week, day, hour, minute, second, ms
fn system_time(buf: &[u8]) -> Option<NaiveDateTime> {
    let mut fields = [0u16; 8];
    LittleEndian::read_u16_into(buf, &mut fields);
    let [year, month, _weekday, day, hour, minute, second, millis] = fields;
    if year == 0 {
        return None;
    }
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?.and_hms_milli_opt(
        hour as u32,
        minute as u32,
        second as u32,
        millis as u32,
    )
}

/// What handling one object produced
enum Outcome {
    Frame(CanFrame),
    Nothing,
}

/// Streaming BLF parser
pub struct BlfReader<R: Read> {
    reader: R,
    /// Bytes given back after a resync scan, consumed before `reader`
    pushback: Vec<u8>,
    /// File offset of the next byte delivered by `fill`
    offset: u64,
    header: FileHeader,
    /// Unpacked container data not yet consumed
    container: Vec<u8>,
    container_pos: usize,
    /// File offset of the container currently being unpacked
    container_offset: u64,
    max_resync: usize,
    default_resolution: TimeResolution,
    warned_resolution: bool,
    skipped_types: HashSet<u32>,
    summary: ParseSummary,
    finished: bool,
}

impl BlfReader<BufReader<File>> {
    pub fn open(path: &Path, config: &AnalyzerConfig) -> Result<Self> {
        log::info!("Parsing BLF file: {:?}", path);
        let file = File::open(path).map_err(|e| AnalyzerError::io(path, e))?;
        Self::with_source(BufReader::new(file), path, config)
    }
}

impl<R: Read> BlfReader<R> {
    /// Read and validate the file header; objects are read lazily afterwards
    pub fn from_reader(reader: R, config: &AnalyzerConfig) -> Result<Self> {
        Self::with_source(reader, Path::new("<reader>"), config)
    }

    fn with_source(mut reader: R, source: &Path, config: &AnalyzerConfig) -> Result<Self> {
        let mut buf = [0u8; FILE_HEADER_LEN];
        let read = read_full(&mut reader, &mut buf).map_err(|e| AnalyzerError::io(source, e))?;
        let header = FileHeader::parse(&buf[..read])?;

        // Skip the rest of the declared header
        let extra = header.header_size as u64 - FILE_HEADER_LEN as u64;
        let skipped = io::copy(&mut (&mut reader).take(extra), &mut io::sink())
            .map_err(|e| AnalyzerError::io(source, e))?;
        if skipped < extra {
            return Err(AnalyzerError::Format(format!(
                "BLF file header truncated: declared {} bytes",
                header.header_size
            )));
        }

        log::info!(
            "BLF header: binlog {}.{}.{}.{}, {} objects declared",
            header.binlog_version.0,
            header.binlog_version.1,
            header.binlog_version.2,
            header.binlog_version.3,
            header.object_count
        );

        let summary = ParseSummary {
            start_time: header.start_time,
            declared_objects: Some(header.object_count),
            ..ParseSummary::default()
        };

        Ok(Self {
            reader,
            pushback: Vec::new(),
            offset: header.header_size as u64,
            header,
            container: Vec::new(),
            container_pos: 0,
            container_offset: 0,
            max_resync: config.blf_max_resync_bytes,
            default_resolution: config.blf_default_resolution,
            warned_resolution: false,
            skipped_types: HashSet::new(),
            summary,
            finished: false,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    fn warn(&mut self, offset: u64, kind: ParseWarningKind, message: impl Into<String>) {
        self.summary
            .warn(ParseWarning::new(WarningLocation::Offset(offset), kind, message));
    }

    /// Read into `buf` from the pushback buffer, then the reader
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let from_pending = self.pushback.len().min(buf.len());
        buf[..from_pending].copy_from_slice(&self.pushback[..from_pending]);
        self.pushback.drain(..from_pending);
        let read = from_pending + read_full(&mut self.reader, &mut buf[from_pending..])?;
        self.offset += read as u64;
        Ok(read)
    }

    fn unread(&mut self, bytes: Vec<u8>) {
        self.offset -= bytes.len() as u64;
        let mut pending = bytes;
        pending.extend_from_slice(&self.pushback);
        self.pushback = pending;
    }

    /// Scan forward for the next object signature. `consumed` are bytes
    /// already read that belong to the corrupted object.
    fn resync(&mut self, consumed: &[u8]) -> io::Result<bool> {
        let mut window: Vec<u8> = consumed.get(1..).unwrap_or_default().to_vec();
        let mut scanned = 0usize;
        loop {
            if let Some(pos) = window.windows(4).position(|w| w == OBJECT_SIGNATURE) {
                let rest = window.split_off(pos);
                self.unread(rest);
                return Ok(true);
            }
            if scanned >= self.max_resync {
                return Ok(false);
            }
            let keep_from = window.len().saturating_sub(3);
            window.drain(..keep_from);
            let mut chunk = [0u8; 512];
            let read = self.fill(&mut chunk)?;
            if read == 0 {
                return Ok(false);
            }
            scanned += read;
            window.extend_from_slice(&chunk[..read]);
        }
    }

    fn stop(&mut self, truncated: bool) {
        self.finished = true;
        self.summary.truncated |= truncated;
        log::info!(
            "BLF parse finished: {} frames, {} warnings{}",
            self.summary.frame_count,
            self.summary.warnings.len(),
            if self.summary.truncated { " (truncated)" } else { "" }
        );
    }

    /// Next object from the unpacked container data, if one is complete
    fn next_inner(&mut self) -> Option<Outcome> {
        loop {
            let available = &self.container[self.container_pos..];
            if available.len() < OBJECT_BASE_LEN {
                return None;
            }
            let location = self.container_offset;
            if &available[..4] != OBJECT_SIGNATURE {
                let skip = available[1..]
                    .windows(4)
                    .position(|w| w == OBJECT_SIGNATURE)
                    .map(|p| p + 1);
                self.warn(
                    location,
                    ParseWarningKind::BadObjectSignature,
                    "bad object signature inside container",
                );
                match skip {
                    Some(skip) => {
                        self.container_pos += skip;
                        continue;
                    }
                    None => {
                        self.container_pos = self.container.len();
                        return None;
                    }
                }
            }

            let header_size = LittleEndian::read_u16(&available[4..6]) as usize;
            let object_size = LittleEndian::read_u32(&available[8..12]);
            let kind = LittleEndian::read_u32(&available[12..16]);
            if (object_size as usize) < OBJECT_BASE_LEN.max(header_size) || object_size > MAX_OBJECT_SIZE {
                self.warn(
                    location,
                    ParseWarningKind::ObjectTooShort,
                    format!("inner object of type {} declares size {}", kind, object_size),
                );
                self.container_pos += 4;
                continue;
            }
            if available.len() < object_size as usize {
                // Continues in the next container
                return None;
            }

            let start = self.container_pos;
            let end = start + object_size as usize;
            self.container_pos = end;
            let object = self.container[start..end].to_vec();
            return Some(self.handle_object(&object, location));
        }
    }

    /// Read the next top-level object; `None` means the iteration ended
    fn next_top_level(&mut self) -> Option<Outcome> {
        let location = self.offset;
        let mut base = [0u8; OBJECT_BASE_LEN];
        let read = match self.fill(&mut base) {
            Ok(read) => read,
            Err(e) => {
                self.warn(location, ParseWarningKind::ReadFailure, e.to_string());
                self.stop(false);
                return None;
            }
        };
        if read == 0 {
            self.finish_container_data();
            self.stop(false);
            return None;
        }
        if read < OBJECT_BASE_LEN {
            self.warn(
                location,
                ParseWarningKind::TruncatedObject,
                format!("object header cut off after {} bytes", read),
            );
            self.stop(true);
            return None;
        }

        if &base[..4] != OBJECT_SIGNATURE {
            self.warn(
                location,
                ParseWarningKind::BadObjectSignature,
                format!("expected LOBJ, found {:02X?}", &base[..4]),
            );
            return self.resync_or_stop(&base);
        }

        let header_size = LittleEndian::read_u16(&base[4..6]) as usize;
        let object_size = LittleEndian::read_u32(&base[8..12]);
        let kind = LittleEndian::read_u32(&base[12..16]);
        if (object_size as usize) < OBJECT_BASE_LEN.max(header_size) || object_size > MAX_OBJECT_SIZE {
            self.warn(
                location,
                ParseWarningKind::ObjectTooShort,
                format!("object of type {} declares size {}", kind, object_size),
            );
            return self.resync_or_stop(&base);
        }

        let mut object = vec![0u8; object_size as usize];
        object[..OBJECT_BASE_LEN].copy_from_slice(&base);
        match self.fill(&mut object[OBJECT_BASE_LEN..]) {
            Ok(read) if read == object.len() - OBJECT_BASE_LEN => {}
            Ok(read) => {
                self.warn(
                    location,
                    ParseWarningKind::TruncatedObject,
                    format!(
                        "object of type {} cut off after {} of {} bytes",
                        kind,
                        read + OBJECT_BASE_LEN,
                        object_size
                    ),
                );
                self.stop(true);
                return None;
            }
            Err(e) => {
                self.warn(location, ParseWarningKind::ReadFailure, e.to_string());
                self.stop(false);
                return None;
            }
        }

        // Top-level objects are padded to a 4-byte boundary
        let padding = (object_size % 4) as usize;
        if padding > 0 {
            let mut pad = [0u8; 4];
            if let Err(e) = self.fill(&mut pad[..padding]) {
                self.warn(self.offset, ParseWarningKind::ReadFailure, e.to_string());
            }
        }

        Some(self.handle_object(&object, location))
    }

    fn resync_or_stop(&mut self, consumed: &[u8]) -> Option<Outcome> {
        match self.resync(consumed) {
            Ok(true) => Some(Outcome::Nothing),
            Ok(false) => {
                log::warn!("No object signature within {} bytes, stopping", self.max_resync);
                self.stop(false);
                None
            }
            Err(e) => {
                let location = self.offset;
                self.warn(location, ParseWarningKind::ReadFailure, e.to_string());
                self.stop(false);
                None
            }
        }
    }

    /// Leftover container bytes at end of file are a cut-off inner object
    fn finish_container_data(&mut self) {
        let leftover = self.container.len() - self.container_pos;
        if leftover > 0 {
            let location = self.container_offset;
            self.warn(
                location,
                ParseWarningKind::TruncatedObject,
                format!("{} bytes of an unfinished object in the last container", leftover),
            );
            self.summary.truncated = true;
        }
    }

    fn handle_object(&mut self, object: &[u8], location: u64) -> Outcome {
        let kind = LittleEndian::read_u32(&object[12..16]);
        match kind {
            object_type::LOG_CONTAINER => {
                self.unpack_container(object, location);
                Outcome::Nothing
            }
            object_type::CAN_MESSAGE
            | object_type::CAN_MESSAGE2
            | object_type::CAN_FD_MESSAGE
            | object_type::CAN_FD_MESSAGE_64 => match self.parse_frame(kind, object) {
                Ok(Some(frame)) => Outcome::Frame(frame),
                Ok(None) => {
                    self.summary.skipped_events += 1;
                    Outcome::Nothing
                }
                Err(e) => {
                    self.warn(
                        location,
                        ParseWarningKind::ObjectTooShort,
                        format!("object of type {} too short: {}", kind, e),
                    );
                    Outcome::Nothing
                }
            },
            other => {
                if self.skipped_types.insert(other) {
                    log::debug!(
                        "Skipping unsupported BLF object type {} (size {} bytes)",
                        other,
                        object.len()
                    );
                }
                Outcome::Nothing
            }
        }
    }

    fn unpack_container(&mut self, object: &[u8], location: u64) {
        if object.len() < OBJECT_BASE_LEN + CONTAINER_HEADER_LEN {
            self.warn(location, ParseWarningKind::ObjectTooShort, "log container without header");
            return;
        }
        let info = &object[OBJECT_BASE_LEN..OBJECT_BASE_LEN + CONTAINER_HEADER_LEN];
        let method = LittleEndian::read_u16(&info[0..2]);
        let uncompressed_size = LittleEndian::read_u32(&info[8..12]) as usize;
        let data = &object[OBJECT_BASE_LEN + CONTAINER_HEADER_LEN..];

        let unpacked = match method {
            COMPRESSION_NONE => data.to_vec(),
            COMPRESSION_ZLIB => {
                let mut out = Vec::with_capacity(uncompressed_size.min(MAX_OBJECT_SIZE as usize));
                let inflated = ZlibDecoder::new(data)
                    .take(uncompressed_size as u64)
                    .read_to_end(&mut out);
                if let Err(e) = inflated {
                    self.warn(
                        location,
                        ParseWarningKind::DecompressionFailed,
                        format!("zlib container: {}", e),
                    );
                    // The carried tail cannot be continued
                    self.container.clear();
                    self.container_pos = 0;
                    return;
                }
                out
            }
            other => {
                self.warn(
                    location,
                    ParseWarningKind::UnsupportedCompression,
                    format!("container compression method {}", other),
                );
                self.container.clear();
                self.container_pos = 0;
                return;
            }
        };

        log::debug!(
            "Unpacked container at 0x{:X}: {} -> {} bytes",
            location,
            data.len(),
            unpacked.len()
        );
        self.container.drain(..self.container_pos);
        self.container_pos = 0;
        self.container.extend_from_slice(&unpacked);
        self.container_offset = location;
    }

    /// Decode a frame object; `Ok(None)` for remote frames
    fn parse_frame(&mut self, kind: u32, object: &[u8]) -> io::Result<Option<CanFrame>> {
        let header_size = LittleEndian::read_u16(&object[4..6]) as usize;
        if object.len() < OBJECT_HEADER_V1_LEN || header_size < OBJECT_HEADER_V1_LEN || header_size > object.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("header size {} in {} bytes", header_size, object.len()),
            ));
        }
        // v1 and v2 headers both keep flags at 16 and the timestamp at 24
        let flags = LittleEndian::read_u32(&object[16..20]);
        let ticks = LittleEndian::read_u64(&object[24..32]);
        let timestamp = self.resolution(flags).ticks_to_seconds(ticks);

        let mut body = Cursor::new(&object[header_size..]);
        let frame = match kind {
            object_type::CAN_FD_MESSAGE => {
                let channel = body.read_u16::<LittleEndian>()?;
                let msg_flags = body.read_u8()?;
                let _dlc = body.read_u8()?;
                let raw_id = body.read_u32::<LittleEndian>()?;
                let _frame_length = body.read_u32::<LittleEndian>()?;
                let _bit_count = body.read_u8()?;
                let fd_flags = body.read_u8()?;
                let valid_bytes = body.read_u8()?;
                let mut reserved = [0u8; 5];
                body.read_exact(&mut reserved)?;
                let mut data = [0u8; MAX_PAYLOAD];
                body.read_exact(&mut data)?;
                if msg_flags & REMOTE_FLAG != 0 {
                    return Ok(None);
                }
                let len = (valid_bytes as usize).min(MAX_PAYLOAD);
                frame(timestamp, channel, raw_id, fd_flags & FD_EDL != 0, msg_flags & DIR_TX != 0, &data[..len])
            }
            object_type::CAN_FD_MESSAGE_64 => {
                let channel = body.read_u8()?;
                let _dlc = body.read_u8()?;
                let valid_bytes = body.read_u8()?;
                let _tx_count = body.read_u8()?;
                let raw_id = body.read_u32::<LittleEndian>()?;
                let _frame_length = body.read_u32::<LittleEndian>()?;
                let fd_flags = body.read_u32::<LittleEndian>()?;
                let mut timing = [0u8; 16];
                body.read_exact(&mut timing)?;
                let _bit_count = body.read_u16::<LittleEndian>()?;
                let dir = body.read_u8()?;
                let _ext_data_offset = body.read_u8()?;
                let _crc = body.read_u32::<LittleEndian>()?;
                let len = (valid_bytes as usize).min(MAX_PAYLOAD);
                let mut data = [0u8; MAX_PAYLOAD];
                body.read_exact(&mut data[..len])?;
                if fd_flags & FD64_REMOTE != 0 {
                    return Ok(None);
                }
                frame(timestamp, channel as u16, raw_id, fd_flags & FD64_EDL != 0, dir != 0, &data[..len])
            }
            _ => {
                let channel = body.read_u16::<LittleEndian>()?;
                let msg_flags = body.read_u8()?;
                let dlc = body.read_u8()?;
                let raw_id = body.read_u32::<LittleEndian>()?;
                let mut data = [0u8; 8];
                body.read_exact(&mut data)?;
                if msg_flags & REMOTE_FLAG != 0 {
                    return Ok(None);
                }
                let len = (dlc as usize).min(8);
                frame(timestamp, channel, raw_id, false, msg_flags & DIR_TX != 0, &data[..len])
            }
        };
        Ok(Some(frame))
    }

    fn resolution(&mut self, flags: u32) -> TimeResolution {
        if flags & TIME_ONE_NANS != 0 {
            TimeResolution::Nanoseconds
        } else if flags & TIME_TEN_MICS != 0 {
            TimeResolution::TenMicroseconds
        } else {
            if !self.warned_resolution {
                log::warn!(
                    "BLF object flags 0x{:X} name no time resolution, assuming {:?}",
                    flags,
                    self.default_resolution
                );
                self.warned_resolution = true;
            }
            self.default_resolution
        }
    }
}

fn frame(timestamp: f64, channel: u16, raw_id: u32, is_fd: bool, tx: bool, data: &[u8]) -> CanFrame {
    CanFrame {
        timestamp,
        channel,
        can_id: raw_id & CAN_EFF_MASK,
        is_extended: raw_id & CAN_MSG_EXT != 0,
        is_fd,
        direction: if tx { Direction::Tx } else { Direction::Rx },
        payload: Payload::new(data),
    }
}

/// Like `read_exact`, but reports how much was read instead of failing at EOF
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl<R: Read + Send> Iterator for BlfReader<R> {
    type Item = CanFrame;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let outcome = match self.next_inner() {
                Some(outcome) => outcome,
                None if self.finished => return None,
                None => self.next_top_level()?,
            };
            if let Outcome::Frame(frame) = outcome {
                log::trace!("BLF frame ID 0x{:X} at {:.6}", frame.can_id, frame.timestamp);
                self.summary.record(&frame);
                return Some(frame);
            }
        }
    }
}

impl<R: Read + Send> FrameSource for BlfReader<R> {
    fn format(&self) -> LogFormat {
        LogFormat::Blf
    }

    fn summary(&self) -> &ParseSummary {
        &self.summary
    }
}

/// Builders for synthetic BLF files
#[cfg(test)]
pub(crate) mod fixture {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    pub fn file_header(object_count: u32) -> Vec<u8> {
        let mut out = vec![0u8; 144];
        out[..4].copy_from_slice(FILE_SIGNATURE);
        LittleEndian::write_u32(&mut out[4..8], 144);
        LittleEndian::write_u32(&mut out[32..36], object_count);
        // 2024-03-05 08:30:15.250
        let start = [2024u16, 3, 2, 5, 8, 30, 15, 250];
        LittleEndian::write_u16_into(&start, &mut out[40..56]);
        out
    }

    fn object(kind: u32, header_ext: &[u8], body: &[u8]) -> Vec<u8> {
        let header_size = OBJECT_BASE_LEN + header_ext.len();
        let size = header_size + body.len();
        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(OBJECT_SIGNATURE);
        out.extend_from_slice(&(header_size as u16).to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&(size as u32).to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(header_ext);
        out.extend_from_slice(body);
        out
    }

    fn v1_header(time_flags: u32, ticks: u64) -> Vec<u8> {
        let mut ext = Vec::with_capacity(16);
        ext.extend_from_slice(&time_flags.to_le_bytes());
        ext.extend_from_slice(&0u16.to_le_bytes());
        ext.extend_from_slice(&0u16.to_le_bytes());
        ext.extend_from_slice(&ticks.to_le_bytes());
        ext
    }

    /// CAN_MESSAGE2 object (no padding applied)
    pub fn can_message(ns: u64, channel: u16, id: u32, tx: bool, data: &[u8]) -> Vec<u8> {
        can_message_ticks(TIME_ONE_NANS, ns, channel, id, tx, data)
    }

    /// CAN_MESSAGE2 object with explicit time flags
    pub fn can_message_ticks(time_flags: u32, ticks: u64, channel: u16, id: u32, tx: bool, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(24);
        body.extend_from_slice(&channel.to_le_bytes());
        body.push(if tx { DIR_TX } else { 0 });
        body.push(data.len() as u8);
        body.extend_from_slice(&id.to_le_bytes());
        let mut payload = [0u8; 8];
        payload[..data.len()].copy_from_slice(data);
        body.extend_from_slice(&payload);
        // frame length and bit count
        body.extend_from_slice(&[0u8; 8]);
        object(object_type::CAN_MESSAGE2, &v1_header(time_flags, ticks), &body)
    }

    /// CAN_FD_MESSAGE_64 object
    pub fn can_fd64_message(ns: u64, channel: u8, id: u32, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(40 + data.len());
        body.push(channel);
        body.push(0x0F);
        body.push(data.len() as u8);
        body.push(0);
        body.extend_from_slice(&id.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&FD64_EDL.to_le_bytes());
        body.extend_from_slice(&[0u8; 16]);
        body.extend_from_slice(&0u16.to_le_bytes());
        body.push(0);
        body.push(0);
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(data);
        object(object_type::CAN_FD_MESSAGE_64, &v1_header(TIME_ONE_NANS, ns), &body)
    }

    /// Any other object type, for skip tests
    pub fn opaque(kind: u32, len: usize) -> Vec<u8> {
        object(kind, &v1_header(TIME_ONE_NANS, 0), &vec![0xEE; len])
    }

    /// Append a top-level object with its alignment padding
    pub fn push_top_level(file: &mut Vec<u8>, obj: &[u8]) {
        file.extend_from_slice(obj);
        file.extend(std::iter::repeat(0u8).take(obj.len() % 4));
    }

    /// A LogContainer holding `inner`, zlib-compressed or stored
    pub fn container(inner: &[u8], compress: bool) -> Vec<u8> {
        let (method, data) = if compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(inner).unwrap();
            (COMPRESSION_ZLIB, encoder.finish().unwrap())
        } else {
            (COMPRESSION_NONE, inner.to_vec())
        };
        let mut info = Vec::with_capacity(CONTAINER_HEADER_LEN + data.len());
        info.extend_from_slice(&method.to_le_bytes());
        info.extend_from_slice(&[0u8; 6]);
        info.extend_from_slice(&(inner.len() as u32).to_le_bytes());
        info.extend_from_slice(&[0u8; 4]);
        info.extend_from_slice(&data);
        object(object_type::LOG_CONTAINER, &[], &info)
    }
}
