//! Short room identifiers for sharing sessions.

use rand::Rng;

/// Characters that are hard to confuse when read aloud or retyped.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz23456789";

/// Length of a generated room ID.
pub const ROOM_ID_LEN: usize = 7;

/// Generates a random room ID such as `aK7pQz3`.
pub fn generate_room_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_ID_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
