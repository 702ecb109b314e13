//! Bit layout of a signal inside a frame payload
//!
//! A signal's start bit, length and byte order are turned once, at load time,
//! into a list of per-byte spans. Decoding then only masks and shifts.

use crate::signals::database::ByteOrder;
use crate::types::MAX_PAYLOAD;

/// One contiguous run of bits within a single payload byte.
///
/// Take `num_bits` bits starting at `bit_offset` in `data[byte_index]` and
/// place them at `value_shift` in the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSpan {
    pub byte_index: u8,
    /// Lowest bit position within the byte (0..=7)
    pub bit_offset: u8,
    /// Number of bits in this span (1..=8)
    pub num_bits: u8,
    /// Shift of the extracted bits within the raw value
    pub value_shift: u8,
}

/// Precomputed mapping from a signal definition to payload bits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalLayout {
    segments: Vec<BitSpan>,
    bit_length: u16,
    required_bytes: usize,
}

impl SignalLayout {
    /// Build the layout for a signal.
    ///
    /// Intel (little-endian): `start_bit` is the LSB, counting upward through
    /// the bytes. Motorola (big-endian): `start_bit` is the MSB in the DBC
    /// sawtooth numbering, walking from bit 7 down to bit 0 of each byte and
    /// continuing at bit 7 of the next byte.
    pub fn new(start_bit: u16, length: u16, byte_order: ByteOrder) -> Result<Self, String> {
        if length == 0 || length > 64 {
            return Err(format!("signal length {} outside 1..=64 bits", length));
        }
        if start_bit as usize >= MAX_PAYLOAD * 8 {
            return Err(format!("start bit {} beyond a 64-byte payload", start_bit));
        }

        let mut segments = Vec::new();
        let mut byte_index = (start_bit / 8) as usize;
        let mut bit_index = (start_bit % 8) as u8;
        let mut remaining = length as u32;

        match byte_order {
            ByteOrder::BigEndian => {
                while remaining > 0 {
                    if byte_index >= MAX_PAYLOAD {
                        return Err(format!(
                            "big-endian signal at bit {} with {} bits runs past byte {}",
                            start_bit,
                            length,
                            MAX_PAYLOAD - 1
                        ));
                    }
                    let num_bits = (bit_index as u32 + 1).min(remaining) as u8;
                    let bit_offset = bit_index + 1 - num_bits;
                    remaining -= num_bits as u32;
                    segments.push(BitSpan {
                        byte_index: byte_index as u8,
                        bit_offset,
                        num_bits,
                        value_shift: remaining as u8,
                    });
                    byte_index += 1;
                    bit_index = 7;
                }
            }
            ByteOrder::LittleEndian => {
                let mut value_shift = 0u32;
                while remaining > 0 {
                    if byte_index >= MAX_PAYLOAD {
                        return Err(format!(
                            "little-endian signal at bit {} with {} bits runs past byte {}",
                            start_bit,
                            length,
                            MAX_PAYLOAD - 1
                        ));
                    }
                    let num_bits = (8 - bit_index as u32).min(remaining) as u8;
                    segments.push(BitSpan {
                        byte_index: byte_index as u8,
                        bit_offset: bit_index,
                        num_bits,
                        value_shift: value_shift as u8,
                    });
                    value_shift += num_bits as u32;
                    remaining -= num_bits as u32;
                    byte_index += 1;
                    bit_index = 0;
                }
            }
        }

        let required_bytes = segments
            .iter()
            .map(|s| s.byte_index as usize + 1)
            .max()
            .unwrap_or(0);

        Ok(Self {
            segments,
            bit_length: length,
            required_bytes,
        })
    }

    pub fn segments(&self) -> &[BitSpan] {
        &self.segments
    }

    pub fn bit_length(&self) -> u16 {
        self.bit_length
    }

    /// Number of payload bytes the signal's bit range touches
    pub fn required_bytes(&self) -> usize {
        self.required_bytes
    }

    /// Extract the raw unsigned value, or `None` if the payload is too short
    /// to hold the whole bit range.
    pub fn extract(&self, data: &[u8]) -> Option<u64> {
        if data.len() < self.required_bytes {
            return None;
        }
        let mut result: u64 = 0;
        for span in &self.segments {
            let mask = ((1u16 << span.num_bits) - 1) as u8;
            let bits = (data[span.byte_index as usize] >> span.bit_offset) & mask;
            result |= (bits as u64) << span.value_shift;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(start: u16, len: u16, order: ByteOrder, data: &[u8]) -> Option<u64> {
        SignalLayout::new(start, len, order).unwrap().extract(data)
    }

    #[test]
    fn test_extract_little_endian_simple() {
        let data = [0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(extract(0, 8, ByteOrder::LittleEndian, &data), Some(0xAB));
    }

    #[test]
    fn test_extract_little_endian_cross_byte() {
        let data = [0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(extract(0, 16, ByteOrder::LittleEndian, &data), Some(0xCDAB));
        // 12 bits starting mid-byte: low nibble of byte 0 is skipped
        assert_eq!(extract(4, 12, ByteOrder::LittleEndian, &data), Some(0xCDA));
    }

    #[test]
    fn test_extract_big_endian_simple() {
        let data = [0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(extract(7, 8, ByteOrder::BigEndian, &data), Some(0xAB));
    }

    #[test]
    fn test_extract_big_endian_sawtooth() {
        let data = [0xAB, 0xCD, 0xEF, 0x12];
        // MSB at bit 7 of byte 0, LSB at bit 0 of byte 1
        assert_eq!(extract(7, 16, ByteOrder::BigEndian, &data), Some(0xABCD));
        // MSB at bit 3 of byte 0: low nibble of byte 0 then all of byte 1
        assert_eq!(extract(3, 12, ByteOrder::BigEndian, &data), Some(0xBCD));
    }

    #[test]
    fn test_required_bytes_and_short_payload() {
        let layout = SignalLayout::new(0, 16, ByteOrder::LittleEndian).unwrap();
        assert_eq!(layout.required_bytes(), 2);
        assert_eq!(layout.extract(&[0x01]), None);

        let motorola = SignalLayout::new(7, 16, ByteOrder::BigEndian).unwrap();
        assert_eq!(motorola.required_bytes(), 2);
        assert_eq!(motorola.segments().len(), 2);
    }

    #[test]
    fn test_full_width_signal() {
        let data = [0xFF; 8];
        assert_eq!(extract(0, 64, ByteOrder::LittleEndian, &data), Some(u64::MAX));
        assert_eq!(extract(7, 64, ByteOrder::BigEndian, &data), Some(u64::MAX));
    }

    #[test]
    fn test_invalid_layouts() {
        assert!(SignalLayout::new(0, 0, ByteOrder::LittleEndian).is_err());
        assert!(SignalLayout::new(0, 65, ByteOrder::LittleEndian).is_err());
        assert!(SignalLayout::new(510, 8, ByteOrder::LittleEndian).is_err());
        assert!(SignalLayout::new(504, 16, ByteOrder::BigEndian).is_err());
    }
}
