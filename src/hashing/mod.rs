//! Deterministic bucket hashing shared by every sketch and compressor.
//!
//! A bucket is a pure function of `(key, salt, range)`. Salts are fixed when a
//! structure is built and travel with its snapshots, so the same key always
//! lands in the same bucket for the structure's lifetime.

mod hash;
mod salt;

pub use hash::{bucket, mix, sign};
pub use salt::{Salt, SaltSource};
