//! Decoding of UTF-16 text embedded in image structures.


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Endianness {
    Little,
    Big,
}


/// Decodes `bytes` as UTF-16 in the given byte order.
///
/// Unpaired surrogates become U+FFFD. An odd trailing byte is ignored.
pub fn decode_utf16(bytes: &[u8], endianness: Endianness) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| match endianness {
            Endianness::Little => u16::from_le_bytes([pair[0], pair[1]]),
            Endianness::Big => u16::from_be_bytes([pair[0], pair[1]]),
        });
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

pub fn decode_utf16le(bytes: &[u8]) -> String {
    decode_utf16(bytes, Endianness::Little)
}

/// Returns the byte index of the first null code unit in `bytes`, stepping two bytes at a time.
pub fn find_null_terminator(bytes: &[u8]) -> Option<usize> {
    bytes
        .chunks_exact(2)
        .position(|pair| pair == [0, 0])
        .map(|unit_index| unit_index * 2)
}
