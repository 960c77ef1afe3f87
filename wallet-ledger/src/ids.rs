//! Identifier generation
//!
//! IDs are 128 random bits encoded as unpadded URL-safe base64 (22 chars).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

/// Number of random bytes behind each ID
pub const ID_BYTES: usize = 16;

/// Source of fresh transaction and batch identifiers
pub trait IdSource: Send + Sync {
    /// Return a new, never-before-issued ID
    fn new_id(&self) -> String;
}

/// Random IDs drawn from the thread-local CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn new_id(&self) -> String {
        new_id()
    }
}

/// Generate a short, URL-safe, collision-resistant ID
pub fn new_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
