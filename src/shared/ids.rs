//! Opaque identifier generation.

use rand::distr::Alphanumeric;
use rand::Rng;

/// Length of generated chat IDs. Stays under the 31 character cap that the
/// API boundary enforces on chat IDs.
pub const CHAT_ID_LEN: usize = 22;

/// Generate an opaque random chat ID
pub fn new_chat_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CHAT_ID_LEN)
        .map(char::from)
        .collect()
}
