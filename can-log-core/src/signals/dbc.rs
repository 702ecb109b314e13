//! DBC file parser
//!
//! Parses Vector DBC files with the `can-dbc` grammar and converts them into
//! a [`DefinitionsDatabase`]. When the grammar rejects the file as a whole,
//! the text is split into `BO_` blocks which are parsed one at a time, so a
//! single malformed message or signal costs only itself.

use crate::signals::database::{
    ByteOrder, DefinitionsDatabase, MessageDefinition, MultiplexerInfo, SignalDefinition, ValueType,
};
use crate::types::{AnalyzerError, Result, CAN_EFF_MASK};
use std::collections::HashMap;
use std::path::Path;

/// Bit 31 of a DBC message id marks a 29-bit identifier
const DBC_EXTENDED_FLAG: u32 = 0x8000_0000;

/// Pseudo-message Vector tools use to park unassigned signals
const INDEPENDENT_SIGNALS: &str = "VECTOR__INDEPENDENT_SIG_MSG";

/// Minimal document head that lets a single block parse on its own
const FRAGMENT_PREAMBLE: &str = "VERSION \"\"\n\nNS_ :\n\nBS_:\n\nBU_: Vector__XXX\n\n";

/// Parse a DBC file into a loaded database
pub fn parse_dbc_file(path: &Path) -> Result<DefinitionsDatabase> {
    log::info!("Parsing DBC file: {:?}", path);

    let bytes = std::fs::read(path).map_err(|e| AnalyzerError::io(path, e))?;

    // Try UTF-8 first, then fall back to Latin-1 (compatible with Windows-1252)
    let content = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            log::warn!("DBC file {:?} is not UTF-8, trying Latin-1 encoding", path);
            err.into_bytes().iter().map(|&b| b as char).collect()
        }
    };

    parse_dbc_str(path, &content)
}

/// Parse DBC text; `source` names the database and its messages
pub fn parse_dbc_str(source: &Path, content: &str) -> Result<DefinitionsDatabase> {
    let source_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.dbc")
        .to_string();

    let mut db = DefinitionsDatabase::new(source);

    match can_dbc::DBC::from_slice(content.as_bytes()) {
        Ok(dbc) => {
            db.set_metadata(Some(dbc.version().0.clone()), node_count(&dbc));
            add_messages(&mut db, &dbc, &source_name);
        }
        Err(err) => {
            let reason = describe_error(&err);
            log::warn!(
                "DBC {:?} did not parse as a whole ({}), recovering per message block",
                source,
                reason
            );
            recover_blocks(&mut db, content, &source_name);
            if db.message_count() == 0 {
                return Err(AnalyzerError::Definitions {
                    path: source.to_path_buf(),
                    reason,
                });
            }
        }
    }

    log::info!(
        "Parsed {} messages from {:?} ({} warnings)",
        db.message_count(),
        source,
        db.warnings().len()
    );

    Ok(db)
}

fn node_count(dbc: &can_dbc::DBC) -> usize {
    dbc.nodes().iter().map(|node| node.0.len()).sum()
}

fn describe_error(err: &can_dbc::Error<'_>) -> String {
    match err {
        can_dbc::Error::Incomplete(_, rest) => {
            let line = rest.trim_start().lines().next().unwrap_or("");
            format!("unparsed input at `{}`", truncate(line, 80))
        }
        other => truncate(&format!("{:?}", other), 160),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Convert every message of a parsed document
fn add_messages(db: &mut DefinitionsDatabase, dbc: &can_dbc::DBC, source: &str) {
    for dbc_msg in dbc.messages() {
        if dbc_msg.message_name() == INDEPENDENT_SIGNALS {
            continue;
        }
        let message = convert_message(db, dbc, dbc_msg, source);
        db.add_message(message);
    }
}

/// Convert a can-dbc message to our MessageDefinition.
///
/// Signals that cannot be laid out are dropped with a warning on `db`.
fn convert_message(
    db: &mut DefinitionsDatabase,
    dbc: &can_dbc::DBC,
    dbc_msg: &can_dbc::Message,
    source: &str,
) -> MessageDefinition {
    let raw_id = dbc_msg.message_id().0;
    let id = if raw_id & DBC_EXTENDED_FLAG != 0 {
        raw_id & CAN_EFF_MASK
    } else {
        raw_id
    };

    let mut message = MessageDefinition::new(id, dbc_msg.message_name().as_str(), *dbc_msg.message_size() as usize)
        .with_source(source);
    if let can_dbc::Transmitter::NodeName(name) = dbc_msg.transmitter() {
        message = message.with_sender(name.as_str());
    }

    // First pass: identify multiplexer signal
    let multiplexer_name = dbc_msg
        .signals()
        .iter()
        .find(|sig| {
            matches!(
                sig.multiplexer_indicator(),
                can_dbc::MultiplexIndicator::Multiplexor
                    | can_dbc::MultiplexIndicator::MultiplexorAndMultiplexedSignal(_)
            )
        })
        .map(|sig| sig.name().to_string());

    for dbc_sig in dbc_msg.signals() {
        let value_table = value_table(dbc, raw_id, dbc_sig.name());
        match convert_signal(dbc_sig, multiplexer_name.as_deref(), value_table) {
            Ok(signal) => message = message.with_signal(signal),
            Err(reason) => {
                log::warn!("Skipping signal {}.{}: {}", dbc_msg.message_name(), dbc_sig.name(), reason);
                db.push_warning(format!("{}.{}", dbc_msg.message_name(), dbc_sig.name()), reason);
            }
        }
    }

    message
}

fn value_table(dbc: &can_dbc::DBC, raw_id: u32, signal_name: &str) -> HashMap<i64, String> {
    dbc.value_descriptions_for_signal(can_dbc::MessageId(raw_id), signal_name)
        .map(|descriptions| {
            descriptions
                .iter()
                .map(|d| (*d.a() as i64, d.b().clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Convert a can-dbc signal to our SignalDefinition
fn convert_signal(
    dbc_sig: &can_dbc::Signal,
    multiplexer_name: Option<&str>,
    value_table: HashMap<i64, String>,
) -> std::result::Result<SignalDefinition, String> {
    let byte_order = match *dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => ByteOrder::LittleEndian,
        can_dbc::ByteOrder::BigEndian => ByteOrder::BigEndian,
    };

    let value_type = match *dbc_sig.value_type() {
        can_dbc::ValueType::Signed => ValueType::Signed,
        can_dbc::ValueType::Unsigned => ValueType::Unsigned,
    };

    let start_bit = u16::try_from(*dbc_sig.start_bit())
        .map_err(|_| format!("start bit {} out of range", dbc_sig.start_bit()))?;
    let length = u16::try_from(*dbc_sig.signal_size())
        .map_err(|_| format!("signal size {} out of range", dbc_sig.signal_size()))?;

    let mut signal = SignalDefinition::new(dbc_sig.name().as_str(), start_bit, length, byte_order, value_type)?
        .with_scale(*dbc_sig.factor(), *dbc_sig.offset())
        .with_range(*dbc_sig.min(), *dbc_sig.max())
        .with_unit(dbc_sig.unit().as_str())
        .with_value_table(value_table);

    let switch_value = match *dbc_sig.multiplexer_indicator() {
        can_dbc::MultiplexIndicator::Multiplexor => {
            signal = signal.as_multiplexer();
            None
        }
        can_dbc::MultiplexIndicator::MultiplexorAndMultiplexedSignal(value) => {
            signal = signal.as_multiplexer();
            Some(value)
        }
        can_dbc::MultiplexIndicator::MultiplexedSignal(value) => Some(value),
        can_dbc::MultiplexIndicator::Plain => None,
    };

    if let Some(value) = switch_value {
        let multiplexer = multiplexer_name
            .filter(|name| *name != dbc_sig.name().as_str())
            .ok_or_else(|| "multiplexed signal but no multiplexer found".to_string())?;
        signal = signal.with_multiplexer(MultiplexerInfo {
            multiplexer_signal: multiplexer.to_string(),
            multiplexer_values: vec![value],
        });
    }

    Ok(signal)
}

/// A `BO_` header line with the `SG_` lines that follow it
struct MessageBlock<'a> {
    header: &'a str,
    signals: Vec<&'a str>,
    line: usize,
}

impl MessageBlock<'_> {
    fn raw_id(&self) -> Option<u32> {
        self.header.split_whitespace().nth(1)?.parse().ok()
    }

    fn label(&self) -> String {
        let name = self
            .header
            .split_whitespace()
            .nth(2)
            .map(|n| n.trim_end_matches(':'))
            .unwrap_or("?");
        format!("{} (line {})", name, self.line)
    }
}

/// Split DBC text into the preamble, the message blocks and the `VAL_` lines
fn split_blocks(content: &str) -> (&str, Vec<MessageBlock<'_>>, Vec<(u32, &str)>) {
    let mut preamble_end = None;
    let mut blocks: Vec<MessageBlock<'_>> = Vec::new();
    let mut value_lines = Vec::new();
    let mut in_block = false;
    let mut offset = 0;

    for (idx, line) in content.split_inclusive('\n').enumerate() {
        let start = offset;
        offset += line.len();
        let line = line.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim_start();

        if trimmed.starts_with("BO_ ") {
            preamble_end.get_or_insert(start);
            blocks.push(MessageBlock {
                header: line,
                signals: Vec::new(),
                line: idx + 1,
            });
            in_block = true;
        } else if trimmed.starts_with("SG_ ") && in_block {
            if let Some(block) = blocks.last_mut() {
                block.signals.push(line);
            }
        } else if trimmed.starts_with("VAL_ ") {
            preamble_end.get_or_insert(start);
            in_block = false;
            if let Some(id) = trimmed.split_whitespace().nth(1).and_then(|t| t.parse().ok()) {
                value_lines.push((id, line));
            }
        } else if !trimmed.is_empty() {
            if in_block || !blocks.is_empty() {
                preamble_end.get_or_insert(start);
            }
            in_block = false;
        }
    }

    let preamble = &content[..preamble_end.unwrap_or(content.len())];
    (preamble, blocks, value_lines)
}

fn fragment(header: &str, signals: &[&str], values: &[&str]) -> String {
    let mut doc = String::from(FRAGMENT_PREAMBLE);
    doc.push_str(header);
    doc.push('\n');
    for line in signals {
        doc.push_str(line);
        doc.push('\n');
    }
    if !values.is_empty() {
        doc.push('\n');
    }
    for line in values {
        doc.push_str(line);
        doc.push('\n');
    }
    doc
}

fn parse_fragment(doc: &str) -> std::result::Result<can_dbc::DBC, String> {
    can_dbc::DBC::from_slice(doc.as_bytes()).map_err(|e| describe_error(&e))
}

/// Parse each message block on its own, then each signal line on its own
fn recover_blocks(db: &mut DefinitionsDatabase, content: &str, source: &str) {
    let (preamble, blocks, value_lines) = split_blocks(content);

    if let Ok(head) = can_dbc::DBC::from_slice(preamble.as_bytes()) {
        db.set_metadata(Some(head.version().0.clone()), node_count(&head));
    }

    for block in &blocks {
        let values: Vec<&str> = match block.raw_id() {
            Some(id) => value_lines
                .iter()
                .filter(|(value_id, _)| *value_id == id)
                .map(|(_, line)| *line)
                .collect(),
            None => Vec::new(),
        };

        if let Ok(dbc) = parse_fragment(&fragment(block.header, &block.signals, &values)) {
            add_messages(db, &dbc, source);
            continue;
        }

        // The header alone decides whether anything of the block survives
        if let Err(reason) = parse_fragment(&fragment(block.header, &[], &[])) {
            log::warn!("Dropping message block {}: {}", block.label(), reason);
            db.push_warning(block.label(), format!("malformed message header: {}", reason));
            continue;
        }

        let mut good = Vec::new();
        for line in &block.signals {
            match parse_fragment(&fragment(block.header, &[line], &[])) {
                Ok(_) => good.push(*line),
                Err(reason) => {
                    let name = line.split_whitespace().nth(1).unwrap_or("?");
                    log::warn!("Dropping signal {} in {}: {}", name, block.label(), reason);
                    db.push_warning(
                        format!("{}.{}", block.label(), name),
                        format!("malformed signal: {}", reason),
                    );
                }
            }
        }

        let parsed = parse_fragment(&fragment(block.header, &good, &values)).or_else(|reason| {
            if values.is_empty() {
                return Err(reason);
            }
            db.push_warning(block.label(), format!("value table ignored: {}", reason));
            parse_fragment(&fragment(block.header, &good, &[]))
        });

        match parsed {
            Ok(dbc) => add_messages(db, &dbc, source),
            Err(reason) => db.push_warning(block.label(), reason),
        }
    }
}
