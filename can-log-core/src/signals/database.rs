//! Definitions database
//!
//! Message and signal definitions parsed from one definitions source, keyed by
//! CAN identifier. A database is immutable once built and shared behind an
//! `Arc` by the registry and every decode layer that uses it.

use crate::signals::layout::SignalLayout;
use crate::types::{DefinitionWarning, CAN_EFF_MASK};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A complete CAN message definition
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefinition {
    /// CAN message ID (29-bit at most, no flag bits)
    pub id: u32,
    /// Identifier bits that must match `id` (all 29 bits for a plain definition)
    pub id_mask: u32,
    pub name: String,
    /// Message size in bytes
    pub size: usize,
    /// Sender ECU name (optional)
    pub sender: Option<String>,
    /// All signals in this message, in definition order
    pub signals: Vec<SignalDefinition>,
    /// True if this message has multiplexed signals
    pub is_multiplexed: bool,
    /// Multiplexer signal name (if multiplexed)
    pub multiplexer_signal: Option<String>,
    /// Source file name
    pub source: String,
}

impl MessageDefinition {
    pub fn new(id: u32, name: impl Into<String>, size: usize) -> Self {
        Self {
            id: id & CAN_EFF_MASK,
            id_mask: CAN_EFF_MASK,
            name: name.into(),
            size,
            sender: None,
            signals: Vec::new(),
            is_multiplexed: false,
            multiplexer_signal: None,
            source: String::new(),
        }
    }

    /// Builder method: match every identifier equal to `id` under `mask`
    pub fn with_id_mask(mut self, mask: u32) -> Self {
        self.id_mask = mask & CAN_EFF_MASK;
        self.id &= self.id_mask;
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Append a signal, keeping the multiplexing flags in sync
    pub fn with_signal(mut self, signal: SignalDefinition) -> Self {
        if let Some(mux) = &signal.multiplexer_info {
            self.is_multiplexed = true;
            if self.multiplexer_signal.is_none() {
                self.multiplexer_signal = Some(mux.multiplexer_signal.clone());
            }
        }
        self.signals.push(signal);
        self
    }

    /// Identifier match under the message's mask
    pub fn matches(&self, can_id: u32) -> bool {
        (can_id & self.id_mask) == self.id
    }

    pub fn is_masked(&self) -> bool {
        self.id_mask != CAN_EFF_MASK
    }

    pub fn signal(&self, name: &str) -> Option<&SignalDefinition> {
        self.signals.iter().find(|s| s.name == name)
    }
}

/// A CAN signal definition
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDefinition {
    pub name: String,
    /// Start bit in the CAN frame (DBC numbering)
    pub start_bit: u16,
    /// Length in bits
    pub length: u16,
    pub byte_order: ByteOrder,
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Minimum physical value (advisory)
    pub min: f64,
    /// Maximum physical value (advisory)
    pub max: f64,
    /// Engineering unit (e.g., "km/h", "°C", "V")
    pub unit: Option<String>,
    /// Value table for enum-like values (raw_value -> description)
    pub value_table: Option<HashMap<i64, String>>,
    /// Multiplexer info (None if not multiplexed)
    pub multiplexer_info: Option<MultiplexerInfo>,
    /// Set on the multiplexor signal itself
    pub is_multiplexer: bool,
    layout: SignalLayout,
}

impl SignalDefinition {
    /// Create a signal with scale 1, offset 0 and no range, unit or table.
    ///
    /// Fails when the bit range cannot be laid out in a 64-byte payload.
    pub fn new(
        name: impl Into<String>,
        start_bit: u16,
        length: u16,
        byte_order: ByteOrder,
        value_type: ValueType,
    ) -> Result<Self, String> {
        let layout = SignalLayout::new(start_bit, length, byte_order)?;
        Ok(Self {
            name: name.into(),
            start_bit,
            length,
            byte_order,
            value_type,
            factor: 1.0,
            offset: 0.0,
            min: 0.0,
            max: 0.0,
            unit: None,
            value_table: None,
            multiplexer_info: None,
            is_multiplexer: false,
            layout,
        })
    }

    pub fn with_scale(mut self, factor: f64, offset: f64) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Empty unit strings are stored as `None`
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        let unit = unit.into();
        self.unit = if unit.is_empty() { None } else { Some(unit) };
        self
    }

    pub fn with_value_table(mut self, table: HashMap<i64, String>) -> Self {
        self.value_table = if table.is_empty() { None } else { Some(table) };
        self
    }

    pub fn with_multiplexer(mut self, info: MultiplexerInfo) -> Self {
        self.multiplexer_info = Some(info);
        self
    }

    pub fn as_multiplexer(mut self) -> Self {
        self.is_multiplexer = true;
        self
    }

    pub fn layout(&self) -> &SignalLayout {
        &self.layout
    }

    /// True when scaling leaves the raw integer untouched
    pub fn is_identity_scale(&self) -> bool {
        self.factor == 1.0 && self.offset == 0.0
    }
}

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Signed,
    Unsigned,
}

/// Multiplexer information for multiplexed signals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiplexerInfo {
    /// Name of the multiplexer signal that controls this signal
    pub multiplexer_signal: String,
    /// Multiplexer value(s) for which this signal is active
    pub multiplexer_values: Vec<u64>,
}

/// Whether a registered database has had its source parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Loaded,
    Unloaded,
}

/// Message and signal definitions from one definitions source
#[derive(Debug, Clone)]
pub struct DefinitionsDatabase {
    source: PathBuf,
    state: LoadState,
    version: Option<String>,
    node_count: usize,
    /// Exact-identifier definitions
    messages: HashMap<u32, Arc<MessageDefinition>>,
    /// Identifier+mask definitions, consulted after an exact miss
    masked: Vec<Arc<MessageDefinition>>,
    /// Definition order, for listings
    order: Vec<Arc<MessageDefinition>>,
    warnings: Vec<DefinitionWarning>,
}

impl DefinitionsDatabase {
    /// Create an empty, loaded database for `source`
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            state: LoadState::Loaded,
            version: None,
            node_count: 0,
            messages: HashMap::new(),
            masked: Vec::new(),
            order: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// A placeholder for a source that has not been parsed yet
    pub fn unloaded(source: impl Into<PathBuf>) -> Self {
        Self {
            state: LoadState::Unloaded,
            ..Self::new(source)
        }
    }

    /// Add a message definition. The first definition of an identifier wins;
    /// later duplicates are dropped with a warning.
    pub fn add_message(&mut self, message: MessageDefinition) {
        if !message.is_masked() {
            if let Some(existing) = self.messages.get(&message.id) {
                log::warn!(
                    "Duplicate definition for ID 0x{:X}: keeping {}, dropping {}",
                    message.id,
                    existing.name,
                    message.name
                );
                self.warnings.push(DefinitionWarning {
                    block: message.name.clone(),
                    reason: format!("duplicate identifier 0x{:X} (already defined by {})", message.id, existing.name),
                });
                return;
            }
        }

        let message = Arc::new(message);
        if message.is_masked() {
            self.masked.push(Arc::clone(&message));
        } else {
            self.messages.insert(message.id, Arc::clone(&message));
        }
        self.order.push(message);
    }

    /// Record a definition that was dropped while loading
    pub fn push_warning(&mut self, block: impl Into<String>, reason: impl Into<String>) {
        self.warnings.push(DefinitionWarning {
            block: block.into(),
            reason: reason.into(),
        });
    }

    pub(crate) fn set_metadata(&mut self, version: Option<String>, node_count: usize) {
        self.version = version.filter(|v| !v.is_empty());
        self.node_count = node_count;
    }

    /// Find the definition for a received identifier.
    ///
    /// Exact identifiers are tried first, then identifier+mask definitions in
    /// the order they were added. An unloaded database matches nothing.
    pub fn lookup(&self, can_id: u32) -> Option<&Arc<MessageDefinition>> {
        if self.state == LoadState::Unloaded {
            return None;
        }
        let can_id = can_id & CAN_EFF_MASK;
        self.messages
            .get(&can_id)
            .or_else(|| self.masked.iter().find(|m| m.matches(can_id)))
    }

    pub fn get_message_by_name(&self, name: &str) -> Option<&Arc<MessageDefinition>> {
        self.order.iter().find(|m| m.name == name)
    }

    /// Find all messages containing a specific signal name
    pub fn find_signal(&self, signal_name: &str) -> Vec<(u32, &SignalDefinition)> {
        self.order
            .iter()
            .filter_map(|msg| msg.signal(signal_name).map(|sig| (msg.id, sig)))
            .collect()
    }

    /// Messages in definition order
    pub fn messages(&self) -> impl Iterator<Item = &Arc<MessageDefinition>> {
        self.order.iter()
    }

    pub fn message_count(&self) -> usize {
        self.order.len()
    }

    /// Get all unique CAN IDs in the database
    pub fn all_can_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.order.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            num_messages: self.order.len(),
            num_signals: self.order.iter().map(|m| m.signals.len()).sum(),
            num_nodes: self.node_count,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn warnings(&self) -> &[DefinitionWarning] {
        &self.warnings
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of message definitions
    pub num_messages: usize,
    /// Total number of signal definitions
    pub num_signals: usize,
    /// Number of nodes (ECUs) declared by the source
    pub num_nodes: usize,
}
