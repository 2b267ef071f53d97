//! Shared reader/writer configuration.
//!
//! [`Options`] is plain data owned by the caller and passed by reference to
//! every [`Reader`](crate::Reader) and [`Writer`](crate::Writer) call. The
//! codec never stores it, so callers may swap formats mid-stream, say to
//! read a length-prefixed LEB128 blob embedded in an otherwise native
//! stream, as long as both sides flip at the same point.

bitflags::bitflags! {
    /// Structural marker bytes emitted and expected around compound values.
    ///
    /// Markers make a stream partially human-readable and corruptions
    /// detectable early, at one byte per flag per value. Writer and reader
    /// must agree on the same set; a reader seeing a marker it did not
    /// expect fails with
    /// [`ErrorKind::MarkerMismatch`](crate::ErrorKind::MarkerMismatch).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct Markers: u8 {
        /// `(` or `{` before each sub-object, alternating by depth.
        const OBJECT_START = 1 << 0;
        /// `)` or `}` after each sub-object, matching the start pair.
        const OBJECT_END = 1 << 1;
        /// `[` before each list, string, or byte array.
        const LIST_START = 1 << 2;
        /// `]` after each list, string, or byte array.
        const LIST_END = 1 << 3;
        /// `[` before each tuple.
        const TUPLE_START = 1 << 4;
        /// `]` after each tuple.
        const TUPLE_END = 1 << 5;
        /// `T` before each type tag.
        const TYPE_TAG = 1 << 6;
    }
}

impl Default for Markers {
    /// Start markers plus object end markers, the set streams are written
    /// with unless configured otherwise.
    fn default() -> Self {
        Self::OBJECT_START | Self::OBJECT_END | Self::LIST_START | Self::TYPE_TAG
    }
}

bitflags::bitflags! {
    /// Per-value behavior flags for one compound read or write.
    ///
    /// An empty set means an ordinary non-list, nullable, non-deduplicated
    /// sub-object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct ObjectMode: u8 {
        /// The value is a variable-length list with a length prefix.
        const LIST = 1 << 0;
        /// The value is a fixed-size tuple; no length is written.
        ///
        /// Mutually exclusive with [`Self::LIST`].
        const TUPLE = 1 << 1;
        /// Deduplicate the value by identity: repeat occurrences are
        /// written as a back-reference to the first.
        const DEDUPLICATE = 1 << 2;
        /// A null value is an error rather than a one-byte sentinel.
        const NOT_NULL = 1 << 3;
    }
}

/// Wire format used for integer values.
///
/// Structural numbers, meaning lengths and dedup ids, always use the native
/// format regardless of this setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum IntFormat {
    /// The native big-endian prefix-length format. The only format with a
    /// null representation.
    #[default]
    Sync,
    /// Little-endian base-128 with two's complement signed values, as used
    /// by DWARF and WebAssembly.
    Leb128,
    /// Little-endian base-128 with zigzag-mapped signed values, as used by
    /// protobuf.
    Leb128Zigzag,
}

/// Flags that only affect reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Keep the low bits of a number that does not fit the requested type
    /// instead of failing with
    /// [`ErrorKind::Overflow`](crate::ErrorKind::Overflow).
    pub silently_truncate_large_numbers: bool,
    /// Turn a null read as a non-nullable primitive into that type's zero
    /// value instead of failing with
    /// [`ErrorKind::UnexpectedNull`](crate::ErrorKind::UnexpectedNull).
    pub null_as_default: bool,
}

/// Flags that only affect writing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Write a zero value in place of a null that the wire position cannot
    /// represent, such as a [`None`] under [`IntFormat::Leb128`].
    pub null_as_default: bool,
}

/// Configuration for a stream, owned by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Upper bound, in bytes, on the payload of one length-prefixed number
    /// token. Guards against corrupt or hostile length prefixes.
    pub max_number_size: usize,
    /// Structural marker bytes to emit and expect.
    pub markers: Markers,
    /// Wire format for integer values.
    pub int_format: IntFormat,
    /// Read-only behavior flags.
    pub read: ReadOptions,
    /// Write-only behavior flags.
    pub write: WriteOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_number_size: 4096,
            markers: Markers::default(),
            int_format: IntFormat::default(),
            read: ReadOptions::default(),
            write: WriteOptions::default(),
        }
    }
}
