//! CRC-16/ARC
//!
//! Polynomial 0x8005 (processed reflected as 0xA001), initial value 0, no
//! final xor. A record stores the CRC of its data little-endian right after
//! the data, so running the CRC over data and CRC together yields zero.

const POLY_REFLECTED: u16 = 0xA001;

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLY_REFLECTED
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static TABLE: [u16; 256] = build_table();

/// Compute the CRC-16/ARC of `data`
///
/// # Example
///
/// ```
/// use comet_tape::framing::crc::crc16;
///
/// assert_eq!(crc16(b"123456789"), 0xBB3D);
/// ```
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ byte as u16) & 0xFF) as usize]
    })
}

/// Append the little-endian CRC of `data` to it
pub fn append_crc(data: &mut Vec<u8>) {
    let crc = crc16(data);
    data.extend_from_slice(&crc.to_le_bytes());
}
