//! Definitions databases and the DBC parser
//!
//! This module contains the DBC parser, the bit layout used for extraction,
//! the per-source database and the registry that tracks the active database.

pub mod database;
pub mod dbc;
pub mod layout;
pub mod registry;

pub use database::{
    ByteOrder, DatabaseStats, DefinitionsDatabase, LoadState, MessageDefinition, MultiplexerInfo,
    SignalDefinition, ValueType,
};
pub use layout::{BitSpan, SignalLayout};
pub use registry::{ActiveSelection, DatabaseId, DatabaseInfo, DatabaseRegistry, SelectionSnapshot};
