//! Bitwise checksum routines.
//!
//! - FCS-16 for the serial binding: reflected polynomial 0x8408, initial
//!   value 0xFFFF, no final XOR (RFC 1662 / Linux `mctp-serial`).
//! - CRC-32 (ISO-HDLC) for the PLDM version data integrity check.

/// Initial FCS-16 value.
pub const FCS16_INIT: u16 = 0xFFFF;

/// Fold `data` into a running FCS-16.
pub fn fcs16_update(mut fcs: u16, data: &[u8]) -> u16 {
    for &b in data {
        fcs ^= u16::from(b);
        for _ in 0..8 {
            fcs = if fcs & 1 != 0 { (fcs >> 1) ^ 0x8408 } else { fcs >> 1 };
        }
    }
    fcs
}

/// FCS-16 of a complete buffer.
pub fn fcs16(data: &[u8]) -> u16 {
    fcs16_update(FCS16_INIT, data)
}

/// CRC-32 (ISO-HDLC: reflected 0xEDB88320, init and xorout 0xFFFFFFFF).
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in data {
        crc ^= u32::from(b);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
        }
    }
    !crc
}
