//! Frame payload checksum
//!
//! VL units protect binary frame payloads with CRC-16/MODBUS (init 0xFFFF,
//! reflected, polynomial 0xA001 in shifted form). The header carries the
//! expected value little-endian; the payload alone is covered.

use crc::{Crc, CRC_16_MODBUS};

const CRC16_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the CRC-16/MODBUS checksum of a byte slice.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16_MODBUS.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_initial_value() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_reference_vector() {
        // Standard CRC-16/MODBUS check value
        assert_eq!(crc16(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_stable_for_fixed_payload() {
        let payload = [0x01, 0x02, 0x03, 0x04, 0x05];
        assert_eq!(crc16(&payload), crc16(&payload));
    }

    #[test]
    fn test_sensitive_to_single_bit() {
        let a = [0x10, 0x20, 0x30];
        let b = [0x10, 0x20, 0x31];
        assert_ne!(crc16(&a), crc16(&b));
    }
}
