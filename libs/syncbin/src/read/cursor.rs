//! Windowed access to the input bytes.
//!
//! Decoding never sees the whole input. A [`Scanner`] exposes a window of
//! upcoming bytes and can slide it forward; the [`Cursor`] on top tracks
//! the consumed prefix of that window, requests more bytes as tokens need
//! them, and only commits consumption once a token decoded cleanly. A pin
//! keeps bytes from an in-progress object's start inside the window.

use std::io;

use crate::error::{Error, ErrorKind, Result};

/// A source of input bytes, viewed through a sliding window.
///
/// Implemented by [`SliceScanner`] and [`IoScanner`]; custom sources only
/// need these two methods.
pub trait Scanner {
    /// The bytes currently in the window.
    fn window(&self) -> &[u8];

    /// Drops the first `discard` window bytes for good, then tries to grow
    /// the window to at least `want` bytes.
    ///
    /// Returns the new window length, which stays below `want` only when
    /// the source is exhausted.
    fn refill(&mut self, discard: usize, want: usize) -> io::Result<usize>;
}

impl<S: Scanner> Scanner for &mut S {
    fn window(&self) -> &[u8] {
        (**self).window()
    }

    fn refill(&mut self, discard: usize, want: usize) -> io::Result<usize> {
        (**self).refill(discard, want)
    }
}

/// Zero-copy [`Scanner`] over a byte slice.
///
/// You cannot directly construct this type. Instead use
/// [`Reader::from_slice`](super::Reader::from_slice).
#[derive(Debug)]
pub struct SliceScanner<'a> {
    data: &'a [u8],
}

impl<'a> SliceScanner<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl Scanner for SliceScanner<'_> {
    fn window(&self) -> &[u8] {
        self.data
    }

    fn refill(&mut self, discard: usize, _want: usize) -> io::Result<usize> {
        // the whole input already is the window; it only ever shrinks
        self.data = self.data.get(discard..).unwrap_or_default();
        Ok(self.data.len())
    }
}

/// Buffering [`Scanner`] over an [`io::Read`] implementation.
///
/// You cannot directly construct this type. Instead use
/// [`Reader::from_reader`](super::Reader::from_reader).
#[derive(Debug)]
pub struct IoScanner<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: io::Read> IoScanner<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner, buf: Vec::new() }
    }
}

impl<R: io::Read> Scanner for IoScanner<R> {
    fn window(&self) -> &[u8] {
        &self.buf
    }

    fn refill(&mut self, discard: usize, want: usize) -> io::Result<usize> {
        use std::io::Read as _;

        if discard > 0 {
            self.buf.drain(..discard);
        }

        if let Some(missing) = want.checked_sub(self.buf.len()).filter(|&m| m > 0) {
            // don't reserve too much or incorrect data could lead to a DoS;
            // read_to_end grows further only as data actually arrives
            self.buf.reserve(missing.min(0x1000));
            let limit = u64::try_from(missing).unwrap_or(u64::MAX);
            self.inner.by_ref().take(limit).read_to_end(&mut self.buf)?;
        }

        Ok(self.buf.len())
    }
}

/// Tracks the decode position within a [`Scanner`] window.
pub(crate) struct Cursor<S> {
    scanner: S,
    /// Consumed bytes at the front of the window.
    pos: usize,
    /// Absolute stream offset of the window's first byte.
    base: u64,
    /// Absolute offset that must stay inside the window, if any.
    pin: Option<u64>,
}

impl<S: Scanner> Cursor<S> {
    /// Smallest byte count to request per refill, so that runs of tiny
    /// tokens don't hit the source once each.
    const MIN_SCAN: usize = 32;

    pub(crate) fn new(scanner: S) -> Self {
        Self { scanner, pos: 0, base: 0, pin: None }
    }

    /// Absolute offset of the next unconsumed byte.
    pub(crate) fn position(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// The available bytes, starting at [`Self::position`].
    pub(crate) fn data(&self) -> &[u8] {
        let window = self.scanner.window();
        window.get(self.pos..).unwrap_or_default()
    }

    /// Makes at least `n` bytes available at [`Self::data`], sliding the
    /// window as needed.
    ///
    /// Bytes at or past the pin survive sliding, so a failed token can be
    /// reported against its start and an object's opening bytes stay
    /// addressable while it is open.
    pub(crate) fn ensure(&mut self, n: usize) -> Result<()> {
        if self.available() >= n {
            return Ok(());
        }

        let keep_from = match self.pin {
            Some(pin) => usize::try_from(pin - self.base).unwrap_or(self.pos).min(self.pos),
            None => self.pos,
        };
        let want = (self.pos - keep_from) + n.max(Self::MIN_SCAN);
        let len = self
            .scanner
            .refill(keep_from, want)
            .map_err(|e| Error::new(e.into(), self.position()))?;

        self.base += keep_from as u64;
        self.pos -= keep_from;

        if len.saturating_sub(self.pos) >= n {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::UnexpectedEof, self.position()))
        }
    }

    /// Makes the next byte available and returns it without committing.
    pub(crate) fn peek(&mut self) -> Result<u8> {
        self.ensure(1)?;
        match self.data().first() {
            Some(&b) => Ok(b),
            None => Err(Error::new(ErrorKind::UnexpectedEof, self.position())),
        }
    }

    /// Commits `n` bytes as consumed. They must be available.
    pub(crate) fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.available(), "cannot advance past the window");
        self.pos += n;
    }

    /// Reads and commits a fixed-size chunk.
    pub(crate) fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.ensure(N)?;
        match self.data().split_first_chunk::<N>() {
            Some((chunk, _)) => {
                let out = *chunk;
                self.advance(N);
                Ok(out)
            }
            None => Err(Error::new(ErrorKind::UnexpectedEof, self.position())),
        }
    }

    /// Reads and commits `len` bytes into a new [`Vec`].
    pub(crate) fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        self.ensure(len)?;
        let out = self.data().get(..len).unwrap_or_default().to_vec();
        self.advance(len);
        Ok(out)
    }

    fn available(&self) -> usize {
        self.scanner.window().len().saturating_sub(self.pos)
    }

    /// Pins `offset` so the window keeps covering it. Only one pin exists
    /// at a time; the caller tracks which scope holds it.
    pub(crate) fn pin_at(&mut self, offset: u64) {
        debug_assert!(self.pin.is_none(), "pin is already held");
        debug_assert!(offset >= self.base, "cannot pin discarded bytes");
        self.pin = Some(offset);
    }

    pub(crate) fn clear_pin(&mut self) {
        self.pin = None;
    }

    pub(crate) fn has_pin(&self) -> bool {
        self.pin.is_some()
    }
}
