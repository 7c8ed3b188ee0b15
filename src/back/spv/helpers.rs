//! Small free functions shared by the instruction builder and module
//! assembly: word/byte conversions required by the SPIR-V binary format.

use spirv::Word;

/// Packs a little-endian byte slice into 32-bit words, as SPIR-V requires
/// for all multi-byte scalar literals (e.g. the version operand of
/// `OpSource`).
pub fn bytes_to_words(bytes: &[u8]) -> Vec<Word> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word_bytes = [0u8; 4];
            word_bytes[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word_bytes)
        })
        .collect()
}

/// Encodes a UTF-8 string as SPIR-V requires for literal string operands:
/// NUL-terminated, then zero-padded so the byte length is a multiple of 4.
pub fn string_to_words(source: &str) -> Vec<Word> {
    let mut bytes = source.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes_to_words(&bytes)
}
