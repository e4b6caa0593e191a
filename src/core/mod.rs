//! # Core Wire Components
//!
//! Low-level header packing and little-endian word access.
//!
//! This module is the foundation of the verifier protocol: everything above it
//! works in terms of [`header::CommandHeader`] and 4-byte words.
//!
//! ## Wire Format
//! ```text
//! [Header(4)] [Reserved gap(0|4)] [Payload(N * 4)]
//! ```
//!
//! ## Security
//! - Header decoding is total: no bit pattern panics or allocates
//! - Word reads are bounds-checked and return `None` past the end of a buffer

pub mod header;
pub mod wire;

pub use header::CommandHeader;
