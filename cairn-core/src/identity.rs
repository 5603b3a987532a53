//! Identifiers for locally created records

use rand::Rng;

/// Length of generated record ids.
pub const DEFAULT_ID_LENGTH: usize = 24;

const HEX_ALPHABET: &[u8; 16] = b"0123456789abcdef";

/// Generate a lowercase hexadecimal id of `length` characters.
///
/// Each character is drawn uniformly from the hex alphabet. Uniqueness is
/// probabilistic only; nothing checks for collisions.
pub fn generate_id(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| HEX_ALPHABET[rng.random_range(0..HEX_ALPHABET.len())] as char)
        .collect()
}

/// Check whether `id` looks like a generated id of `length` characters.
pub fn is_hex_id(id: &str, length: usize) -> bool {
    id.len() == length && id.bytes().all(|b| HEX_ALPHABET.contains(&b))
}
