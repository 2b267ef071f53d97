//! Error handling types.
//!
//! Everything here funnels into one shared [`Error`] type that pairs a
//! [`ErrorKind`] with the stream offset it happened at. And also a result
//! type.

use std::io;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, Error>;

/// An error raised while encoding or decoding the wire format.
///
/// Carries the absolute byte offset of the token that failed, counted from
/// the start of the stream.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} at offset {offset}")]
pub struct Error {
    kind: ErrorKind,
    offset: u64,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, offset: u64) -> Self {
        Self { kind, offset }
    }

    /// Moves the error to a different stream offset.
    ///
    /// Multi-step decodes report the offset of the token start rather than
    /// the byte that tripped the failure.
    pub(crate) fn at(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// The kind of failure.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The absolute byte offset the failure was detected at.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether this error leaves the stream position meaningless.
    ///
    /// Fatal errors poison the [`Reader`](crate::Reader) or
    /// [`Writer`](crate::Writer) that raised them: every later call fails
    /// with the same error. Non-fatal errors describe a bad value whose
    /// bytes were still fully consumed, so the caller may keep going.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::UnexpectedEof
                | ErrorKind::MalformedNumber(_)
                | ErrorKind::MarkerMismatch { .. }
                | ErrorKind::UnknownBackref(_)
                | ErrorKind::Io(_)
        )
    }
}

/// Potential failures to encounter when reading or writing binary data.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The input ended in the middle of a token.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// A number token breaks the encoding rules.
    #[error("malformed number: {0}")]
    MalformedNumber(&'static str),
    /// A decoded number does not fit the requested type.
    ///
    /// Reads can downgrade this to silent truncation via
    /// [`ReadOptions`](crate::ReadOptions).
    #[error("number does not fit into {0}")]
    Overflow(&'static str),
    /// A null was found where a non-nullable value was requested, or a null
    /// was written where one is not representable.
    #[error("unexpected null value")]
    UnexpectedNull,
    /// String data contained invalid UTF-8.
    #[error("invalid utf-8 in data for string")]
    InvalidUtf8,
    /// A char code was not a valid Unicode scalar value.
    #[error("invalid char code {0:#x}")]
    InvalidChar(u32),
    /// A structural marker byte did not match the expected one.
    #[error("expected {expected:?} marker, found byte {found:#04x}")]
    MarkerMismatch {
        /// The marker the current scope called for.
        expected: char,
        /// The byte actually found in the stream.
        found: u8,
    },
    /// A back-reference named an object id that was never registered.
    #[error("back-reference to unknown object id {0}")]
    UnknownBackref(u64),
    /// A scoped operation was called without an open sub-object.
    #[error("no sub-object is open")]
    NoOpenObject,
    /// A list tried to write itself without a length.
    #[error("lists must specify a length")]
    LengthRequired,
    /// The operation is not supported under the active options.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    /// The error originated from the [`io::Write`] or [`io::Read`]
    /// implementation.
    #[error("{0}")]
    Io(Arc<io::Error>),
}

impl From<io::Error> for ErrorKind {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}
