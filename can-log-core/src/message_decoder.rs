//! Message Decoding Engine
//!
//! Extracts signal values from raw CAN frames based on the definitions of the
//! active database. Handles bit extraction, signedness, multiplexing and
//! physical value conversion.

use crate::signals::database::{DefinitionsDatabase, MessageDefinition, SignalDefinition, ValueType};
use crate::types::{CanFrame, DecodedMessage, DecodedValue};
use std::sync::Arc;

/// Message decoder - extracts signals from CAN frames
pub struct MessageDecoder;

impl MessageDecoder {
    /// Decode a frame against a database.
    ///
    /// Returns `None` when the database has no definition for the frame's
    /// identifier. A matching definition always yields a message, possibly
    /// with fewer signals than defined when the payload is short.
    pub fn decode(database: &DefinitionsDatabase, frame: &CanFrame) -> Option<DecodedMessage> {
        let definition = database.lookup(frame.can_id)?;
        Some(Self::decode_message(definition, frame.data()))
    }

    /// Decode every signal of `definition` whose bit range fits in `data`
    pub fn decode_message(definition: &Arc<MessageDefinition>, data: &[u8]) -> DecodedMessage {
        let mut multiplexer_value: Option<u64> = None;

        // For multiplexed messages, first extract the multiplexer signal value
        if definition.is_multiplexed {
            multiplexer_value = definition
                .signals
                .iter()
                .find(|s| s.is_multiplexer)
                .and_then(|mux| Self::extract_raw(data, mux))
                .map(|raw| raw as u64);
        }

        let mut values = Vec::with_capacity(definition.signals.len());
        for (index, signal) in definition.signals.iter().enumerate() {
            if let Some(mux_info) = &signal.multiplexer_info {
                match multiplexer_value {
                    Some(current) if mux_info.multiplexer_values.contains(&current) => {}
                    _ => continue,
                }
            }

            if let Some(value) = Self::decode_signal(data, signal, index) {
                values.push(value);
            }
        }

        DecodedMessage {
            definition: Arc::clone(definition),
            values,
            multiplexer_value,
        }
    }

    fn decode_signal(data: &[u8], signal: &SignalDefinition, index: usize) -> Option<DecodedValue> {
        let bits = signal.layout().extract(data)?;
        let raw = Self::interpret(bits, signal);

        let unscaled = match signal.value_type {
            ValueType::Unsigned => bits as f64,
            ValueType::Signed => raw as f64,
        };
        let physical = if signal.is_identity_scale() {
            unscaled
        } else {
            unscaled * signal.factor + signal.offset
        };

        Some(DecodedValue {
            signal_index: index as u16,
            raw,
            physical,
        })
    }

    /// Raw integer of a signal, or `None` when its bits lie past the payload
    fn extract_raw(data: &[u8], signal: &SignalDefinition) -> Option<i64> {
        signal.layout().extract(data).map(|bits| Self::interpret(bits, signal))
    }

    fn interpret(bits: u64, signal: &SignalDefinition) -> i64 {
        match signal.value_type {
            ValueType::Unsigned => bits as i64,
            ValueType::Signed => Self::sign_extend(bits, signal.length as usize),
        }
    }

    /// Sign-extend a value from N bits to 64 bits
    ///
    /// If the value's MSB is 1, fill the upper bits with 1s.
    fn sign_extend(value: u64, bit_length: usize) -> i64 {
        if bit_length == 0 || bit_length >= 64 {
            return value as i64;
        }

        let sign_bit = 1u64 << (bit_length - 1);
        if (value & sign_bit) != 0 {
            let mask = !0u64 << bit_length;
            (value | mask) as i64
        } else {
            value as i64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::database::{ByteOrder, MultiplexerInfo};
    use crate::types::{Direction, Payload};
    use std::collections::HashMap;

    fn frame(can_id: u32, data: &[u8]) -> CanFrame {
        CanFrame {
            timestamp: 0.0,
            channel: 1,
            can_id,
            is_extended: false,
            is_fd: false,
            direction: Direction::Rx,
            payload: Payload::new(data),
        }
    }

    fn signal(name: &str, start: u16, len: u16, order: ByteOrder, vt: ValueType) -> SignalDefinition {
        SignalDefinition::new(name, start, len, order, vt).unwrap()
    }

    #[test]
    fn test_speed_scaled() {
        let mut db = DefinitionsDatabase::new("speed.dbc");
        db.add_message(MessageDefinition::new(0x123, "Vehicle", 8).with_signal(
            signal("Speed", 0, 16, ByteOrder::LittleEndian, ValueType::Unsigned).with_scale(0.1, 0.0),
        ));

        let decoded = MessageDecoder::decode(&db, &frame(0x123, &[0x10, 0x27, 0, 0, 0, 0, 0, 0])).unwrap();
        let speed = decoded.get("Speed").unwrap();
        assert_eq!(speed.raw, 10000);
        assert!((speed.physical - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_identity_scale_is_exact() {
        let def = Arc::new(MessageDefinition::new(0x10, "Wide", 8).with_signal(signal(
            "Counter",
            0,
            53,
            ByteOrder::LittleEndian,
            ValueType::Unsigned,
        )));
        let value: u64 = (1 << 53) - 1;
        let decoded = MessageDecoder::decode_message(&def, &value.to_le_bytes());
        assert_eq!(decoded.values[0].physical, value as f64);
        assert_eq!(decoded.values[0].raw, value as i64);
    }

    #[test]
    fn test_signed_and_offset() {
        let def = Arc::new(
            MessageDefinition::new(0x20, "Temps", 2)
                .with_signal(signal("Delta", 0, 8, ByteOrder::LittleEndian, ValueType::Signed))
                .with_signal(
                    signal("Coolant", 8, 8, ByteOrder::LittleEndian, ValueType::Unsigned).with_scale(1.0, -40.0),
                ),
        );
        let decoded = MessageDecoder::decode_message(&def, &[0xFF, 0x00]);
        assert_eq!(decoded.get("Delta").unwrap().physical, -1.0);
        assert_eq!(decoded.get("Coolant").unwrap().physical, -40.0);
    }

    #[test]
    fn test_signed_big_endian() {
        let def = Arc::new(MessageDefinition::new(0x400, "Climate", 8).with_signal(
            signal("Temp", 7, 12, ByteOrder::BigEndian, ValueType::Signed).with_scale(0.5, -40.0),
        ));

        // 0xFF0 as 12 bits is -16
        let decoded = MessageDecoder::decode_message(&def, &[0xFF, 0x00]);
        let temp = decoded.get("Temp").unwrap();
        assert_eq!(temp.raw, -16);
        assert_eq!(temp.physical, -48.0);

        let decoded = MessageDecoder::decode_message(&def, &[0x19, 0x0F]);
        let temp = decoded.get("Temp").unwrap();
        assert_eq!(temp.raw, 0x190);
        assert_eq!(temp.physical, 160.0);
    }

    #[test]
    fn test_overlapping_signals_both_decode() {
        let def = Arc::new(
            MessageDefinition::new(0x50, "Overlap", 4)
                .with_signal(signal("Word", 16, 16, ByteOrder::LittleEndian, ValueType::Unsigned))
                .with_signal(signal("LowByte", 16, 8, ByteOrder::LittleEndian, ValueType::Unsigned)),
        );
        let decoded = MessageDecoder::decode_message(&def, &[0, 0, 0x34, 0x12]);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.get("Word").unwrap().raw, 0x1234);
        assert_eq!(decoded.get("LowByte").unwrap().raw, 0x34);
    }

    #[test]
    fn test_short_payload_omits_signal() {
        let def = Arc::new(
            MessageDefinition::new(0x30, "Split", 8)
                .with_signal(signal("Low", 0, 8, ByteOrder::LittleEndian, ValueType::Unsigned))
                .with_signal(signal("High", 32, 16, ByteOrder::LittleEndian, ValueType::Unsigned)),
        );
        let decoded = MessageDecoder::decode_message(&def, &[0x05, 0x00]);
        assert_eq!(decoded.len(), 1);
        assert!(decoded.get("Low").is_some());
        assert!(decoded.get("High").is_none());
    }

    #[test]
    fn test_unknown_identifier() {
        let db = DefinitionsDatabase::new("empty.dbc");
        assert!(MessageDecoder::decode(&db, &frame(0x7FF, &[1, 2, 3])).is_none());
    }

    #[test]
    fn test_multiplexed_selection() {
        let mux = |values: Vec<u64>| MultiplexerInfo {
            multiplexer_signal: "Mode".to_string(),
            multiplexer_values: values,
        };
        let def = Arc::new(
            MessageDefinition::new(0x200, "Muxed", 8)
                .with_signal(signal("Mode", 0, 8, ByteOrder::LittleEndian, ValueType::Unsigned).as_multiplexer())
                .with_signal(
                    signal("SignalA", 8, 16, ByteOrder::LittleEndian, ValueType::Unsigned).with_multiplexer(mux(vec![0])),
                )
                .with_signal(
                    signal("SignalB", 8, 16, ByteOrder::LittleEndian, ValueType::Unsigned)
                        .with_scale(0.1, 0.0)
                        .with_multiplexer(mux(vec![1])),
                ),
        );

        let decoded = MessageDecoder::decode_message(&def, &[0x01, 0x64, 0x00]);
        assert_eq!(decoded.multiplexer_value, Some(1));
        assert!(decoded.get("SignalA").is_none());
        assert!((decoded.get("SignalB").unwrap().physical - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_value_table_label() {
        let table: HashMap<i64, String> = [(0, "Park"), (3, "Drive")]
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        let def = Arc::new(MessageDefinition::new(0x40, "Gear", 1).with_signal(
            signal("Gear", 0, 8, ByteOrder::LittleEndian, ValueType::Unsigned).with_value_table(table),
        ));
        let decoded = MessageDecoder::decode_message(&def, &[0x03]);
        let gear = decoded.get("Gear").unwrap();
        assert_eq!(gear.label(), Some("Drive"));
        assert_eq!(gear.display_value(), "Drive");
    }

    #[test]
    fn test_sign_extend_positive() {
        assert_eq!(MessageDecoder::sign_extend(0x7F, 8), 127);
    }

    #[test]
    fn test_sign_extend_negative() {
        assert_eq!(MessageDecoder::sign_extend(0xFF, 8), -1);
    }

    #[test]
    fn test_sign_extend_negative_16bit() {
        assert_eq!(MessageDecoder::sign_extend(0x8000, 16), -32768);
    }
}
