//! # Sync Binary Format
//!
//! Codec for a compact binary serialization format with no embedded schema:
//! the wire only carries the data itself, so reader and writer must agree on
//! the order and type of every value.
//!
//! The wire types are as follows:
//!
//! - `number`: big-endian variable-length integer. The run of leading
//!   one-bits in the first byte selects a 1 to 7 byte token; `0xFE` starts a
//!   length-prefixed form for larger magnitudes and `0xFF` is null.
//! - `float`: fixed little-endian IEEE 754 bits, 4 or 8 bytes. One NaN
//!   payload per width is reserved as the null sentinel.
//! - `decimal`: 16 bytes of fixed layout, a 96-bit mantissa with scale and
//!   sign. All 16 bytes `0xFF` is null.
//! - `bits`: a bit field packed into little-endian bytes; the width travels
//!   out of band.
//! - `string`/`bytes`: byte-length `number` prefix followed by the raw data.
//! - `object`/`list`/`tuple`: bracketed sub-values. The ASCII markers around
//!   them are individually optional, and object braces alternate with
//!   nesting depth so a corrupt stream fails fast instead of resyncing on
//!   the wrong brace.
//! - back-references: repeated strings, byte arrays, and objects can be
//!   written once under a `#`-tagged ID and referenced by `@`-tagged IDs
//!   afterwards, which also makes cyclic graphs representable.
//!
//! [`Reader`] and [`Writer`] are exact mirrors: every operation borrows the
//! same [`Options`], and a stream written under one configuration must be
//! read back under the same one. Integers can switch to LEB128 encodings per
//! value via [`IntFormat`]; everything structural (length prefixes,
//! back-reference IDs) stays in the native format regardless.

// for benchmarks
#[cfg(test)]
use criterion as _;

mod decimal;
mod dedup;
mod error;
mod leb128;
mod nesting;
mod options;
pub mod read;
mod varint;
pub mod write;

pub use decimal::Decimal;
pub use dedup::Identity;
pub use error::{Error, ErrorKind, Result};
pub use options::{IntFormat, Markers, ObjectMode, Options, ReadOptions, WriteOptions};
pub use read::{IoScanner, Reader, Scanner, SliceScanner, SubObject};
pub use varint::Int;
pub use write::Writer;

/// Bit pattern of the NaN reserved as the 32-bit float null.
pub(crate) const NULL_F32_BITS: u32 = 0xFFF3_68E0;
/// Bit pattern of the NaN reserved as the 64-bit float null.
pub(crate) const NULL_F64_BITS: u64 = 0xFFFE_6C6C_756E_06FE;
