//! Correlation token generation.
//!
//! Tokens are short, opaque, ASCII, and safe to echo back to the server.
//! Only uniqueness among currently pending actions is required, so a random
//! `uuid` slice is enough.

use uuid::Uuid;

/// Generate a fresh correlation token. 12 hex chars (48 bits) is enough
/// that a collision among concurrently pending actions is not a practical
/// concern.
pub fn generate() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    simple[..12].to_owned()
}
