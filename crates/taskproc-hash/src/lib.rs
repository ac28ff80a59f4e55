//! Fingerprint hashing for task materialization: an ordered key list
//! folds into a 128-bit digest, with order-insensitive "bag" semantics
//! for unordered file sets and a `rehash` step for retry attempts.

mod digest;
mod error;
mod hasher;
mod input;

pub use digest::Digest;
pub use error::HashError;
pub use hasher::FingerprintHasher;
pub use input::HashInput;
