//! Exposes the stream reader and its data sources.

use std::any::{self, Any};
use std::fmt;
use std::io;
use std::rc::Rc;

use crate::decimal::{self, Decimal};
use crate::dedup::ObjectTable;
use crate::error::{Error, ErrorKind, Result};
use crate::leb128::{self, Leb};
use crate::nesting::{self, NestingStack, ScopeKind, StackEntry};
use crate::options::{IntFormat, Markers, ObjectMode, Options};
use crate::varint::{self, Header, Int};
use crate::{NULL_F32_BITS, NULL_F64_BITS};

mod cursor;

use cursor::Cursor;
pub use cursor::{IoScanner, Scanner, SliceScanner};

/// Result of opening a sub-object on the read side.
#[derive(Clone)]
pub enum SubObject {
    /// The stream holds a null in place of the object.
    Null,
    /// The object is a back-reference to one registered earlier via
    /// [`Reader::set_current_object`].
    Shared {
        /// The id the back-reference named.
        id: u64,
        /// The registered object.
        object: Rc<dyn Any>,
    },
    /// A fresh object begins; its contents follow in the stream.
    Begun {
        /// Id to register the decoded object under, when the stream
        /// deduplicates it.
        id: Option<u64>,
        /// Element count for list scopes; [`None`] for objects and tuples.
        len: Option<u64>,
    },
}

// manual impl since `dyn Any` has no `Debug`
impl fmt::Debug for SubObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Shared { id, .. } => {
                f.debug_struct("Shared").field("id", id).finish_non_exhaustive()
            }
            Self::Begun { id, len } => {
                f.debug_struct("Begun").field("id", id).field("len", len).finish()
            }
        }
    }
}

/// A streaming reader for this crate's binary format.
///
/// All state lives here: the nesting stack, the back-reference table, and
/// the input window. Configuration does not; each call borrows the caller's
/// [`Options`], so settings may change between values when both sides of
/// the stream coordinate such a switch.
///
/// A fatal error, in the sense of [`Error::is_fatal`], poisons the reader:
/// the error is kept and returned again from every later call without
/// touching the source. Recoverable errors leave it usable and positioned
/// past the bad value.
///
/// Holds [`Rc`] handles to decoded objects, so it is not [`Send`].
pub struct Reader<S> {
    cur: Cursor<S>,
    stack: NestingStack,
    objects: ObjectTable,
    poison: Option<Error>,
}

impl<'a> Reader<SliceScanner<'a>> {
    /// Creates a reader over a byte slice.
    ///
    /// # Examples
    ///
    /// ```
    /// # use syncbin::{Options, Reader};
    /// let opts = Options::default();
    /// let buf = [0x5B, 0x02, b'h', b'i'];
    /// let mut reader = Reader::from_slice(&buf);
    /// assert_eq!(reader.read_str(&opts)?.as_deref(), Some("hi"));
    /// # Ok::<(), syncbin::Error>(())
    /// ```
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self::new(SliceScanner::new(data))
    }
}

impl<R: io::Read> Reader<IoScanner<R>> {
    /// Creates a reader over an [`io::Read`] implementation.
    ///
    /// Bytes are pulled through an internal window as tokens need them. The
    /// source sees chunked requests, so wrapping it in an extra
    /// [`io::BufReader`] is only worth it when single calls are expensive.
    pub fn from_reader(reader: R) -> Self {
        Self::new(IoScanner::new(reader))
    }
}

impl<S: Scanner> Reader<S> {
    /// Whether this reader can resolve values out of stream order. It
    /// cannot; tokens are decoded strictly in sequence.
    pub const SUPPORTS_REORDERING: bool = false;
    /// Whether back-references to earlier objects are resolved.
    pub const SUPPORTS_DEDUPLICATION: bool = true;

    /// Creates a reader over any [`Scanner`].
    pub fn new(scanner: S) -> Self {
        Self {
            cur: Cursor::new(scanner),
            stack: NestingStack::new(),
            objects: ObjectTable::new(),
            poison: None,
        }
    }

    /// Absolute offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.cur.position()
    }

    /// Number of currently open sub-objects.
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    /// Reads a non-nullable integer.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::Overflow`] if the value does not fit `T` and truncation
    /// is not enabled, [`ErrorKind::UnexpectedNull`] on a null unless
    /// [`null_as_default`](crate::ReadOptions::null_as_default) maps it to
    /// zero, or a fatal error for corrupt data.
    pub fn read_int<T: Int>(&mut self, opts: &Options) -> Result<T> {
        self.guarded(|r| r.int_required::<T>(opts))
    }

    /// Reads a nullable integer.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::Unsupported`] under the LEB128 formats, which have no
    /// null representation; otherwise like [`Self::read_int`].
    pub fn read_int_opt<T: Int>(&mut self, opts: &Options) -> Result<Option<T>> {
        self.guarded(|r| r.int_optional::<T>(opts))
    }

    /// Reads a non-nullable bool. Any non-zero integer is true.
    pub fn read_bool(&mut self, opts: &Options) -> Result<bool> {
        self.guarded(|r| r.int_required::<i32>(opts).map(|v| v != 0))
    }

    /// Reads a nullable bool.
    pub fn read_bool_opt(&mut self, opts: &Options) -> Result<Option<bool>> {
        self.guarded(|r| Ok(r.int_optional::<i32>(opts)?.map(|v| v != 0)))
    }

    /// Reads a non-nullable char from its UTF-16 code unit.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::InvalidChar`] if the code unit is a surrogate.
    pub fn read_char(&mut self, opts: &Options) -> Result<char> {
        self.guarded(|r| {
            let start = r.cur.position();
            let code = r.int_required::<u16>(opts)?;
            char_from_code(code, start)
        })
    }

    /// Reads a nullable char.
    pub fn read_char_opt(&mut self, opts: &Options) -> Result<Option<char>> {
        self.guarded(|r| {
            let start = r.cur.position();
            match r.int_optional::<u16>(opts)? {
                Some(code) => char_from_code(code, start).map(Some),
                None => Ok(None),
            }
        })
    }

    /// Reads a non-nullable 32-bit float.
    ///
    /// The wire null sentinel is reported as [`ErrorKind::UnexpectedNull`];
    /// every other NaN passes through bit-exact.
    pub fn read_f32(&mut self, opts: &Options) -> Result<f32> {
        self.guarded(|r| {
            let start = r.cur.position();
            let bits = u32::from_le_bytes(r.cur.read_array()?);
            if bits == NULL_F32_BITS {
                null_primitive(opts, 0.0, start)
            } else {
                Ok(f32::from_bits(bits))
            }
        })
    }

    /// Reads a nullable 32-bit float.
    pub fn read_f32_opt(&mut self, _opts: &Options) -> Result<Option<f32>> {
        self.guarded(|r| {
            let bits = u32::from_le_bytes(r.cur.read_array()?);
            Ok((bits != NULL_F32_BITS).then(|| f32::from_bits(bits)))
        })
    }

    /// Reads a non-nullable 64-bit float.
    ///
    /// The wire null sentinel is reported as [`ErrorKind::UnexpectedNull`];
    /// every other NaN passes through bit-exact.
    pub fn read_f64(&mut self, opts: &Options) -> Result<f64> {
        self.guarded(|r| {
            let start = r.cur.position();
            let bits = u64::from_le_bytes(r.cur.read_array()?);
            if bits == NULL_F64_BITS {
                null_primitive(opts, 0.0, start)
            } else {
                Ok(f64::from_bits(bits))
            }
        })
    }

    /// Reads a nullable 64-bit float.
    pub fn read_f64_opt(&mut self, _opts: &Options) -> Result<Option<f64>> {
        self.guarded(|r| {
            let bits = u64::from_le_bytes(r.cur.read_array()?);
            Ok((bits != NULL_F64_BITS).then(|| f64::from_bits(bits)))
        })
    }

    /// Reads a non-nullable decimal.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::MalformedNumber`] if the 16-byte layout is invalid.
    pub fn read_decimal(&mut self, opts: &Options) -> Result<Decimal> {
        self.guarded(|r| {
            let start = r.cur.position();
            match r.decimal_inner(start)? {
                Some(value) => Ok(value),
                None => null_primitive(opts, Decimal::ZERO, start),
            }
        })
    }

    /// Reads a nullable decimal.
    pub fn read_decimal_opt(&mut self, _opts: &Options) -> Result<Option<Decimal>> {
        self.guarded(|r| {
            let start = r.cur.position();
            r.decimal_inner(start)
        })
    }

    /// Reads a bit field of `width` bits from its little-endian packed
    /// bytes. Bit fields have no null form and no markers.
    ///
    /// # Panics
    ///
    /// Panics if `width` is 0 or above 64.
    pub fn read_bits(&mut self, _opts: &Options, width: u32) -> Result<u64> {
        assert!((1..=64).contains(&width), "bit field width must be 1..=64");
        self.guarded(|r| {
            let bytes = r.read_bit_bytes::<8>(width)?;
            Ok(u64::from_le_bytes(bytes) & mask_u64(width))
        })
    }

    /// Reads a bit field of up to 128 bits.
    ///
    /// # Panics
    ///
    /// Panics if `width` is 0 or above 128.
    pub fn read_bits_u128(&mut self, _opts: &Options, width: u32) -> Result<u128> {
        assert!((1..=128).contains(&width), "bit field width must be 1..=128");
        self.guarded(|r| {
            let bytes = r.read_bit_bytes::<16>(width)?;
            Ok(u128::from_le_bytes(bytes) & mask_u128(width))
        })
    }

    /// Reads a nullable string.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::InvalidUtf8`] for bad string data, or a fatal error for
    /// corrupt framing.
    pub fn read_str(&mut self, opts: &Options) -> Result<Option<String>> {
        self.guarded(|r| r.str_inner(opts, ObjectMode::empty()))
    }

    /// Reads a string with explicit per-value behavior.
    ///
    /// [`ObjectMode::DEDUPLICATE`] resolves and registers shared strings;
    /// [`ObjectMode::NOT_NULL`] turns a null into an error, or into an
    /// empty string under
    /// [`null_as_default`](crate::ReadOptions::null_as_default).
    pub fn read_str_with(&mut self, opts: &Options, mode: ObjectMode) -> Result<Option<String>> {
        self.guarded(|r| r.str_inner(opts, mode))
    }

    /// Reads a nullable byte array.
    pub fn read_bytes(&mut self, opts: &Options) -> Result<Option<Vec<u8>>> {
        self.guarded(|r| r.bytes_inner(opts, ObjectMode::empty()))
    }

    /// Reads a byte array with explicit per-value behavior, as
    /// [`Self::read_str_with`] does for strings.
    pub fn read_bytes_with(&mut self, opts: &Options, mode: ObjectMode) -> Result<Option<Vec<u8>>> {
        self.guarded(|r| r.bytes_inner(opts, mode))
    }

    /// Reads a nullable bool list written element by element.
    pub fn read_bools(&mut self, opts: &Options) -> Result<Option<Vec<bool>>> {
        self.guarded(|r| r.list_inner(opts, |r, opts| Ok(r.int_required::<i32>(opts)? != 0)))
    }

    /// Reads a nullable char list written element by element.
    pub fn read_chars(&mut self, opts: &Options) -> Result<Option<Vec<char>>> {
        self.guarded(|r| {
            r.list_inner(opts, |r, opts| {
                let start = r.cur.position();
                let code = r.int_required::<u16>(opts)?;
                char_from_code(code, start)
            })
        })
    }

    /// Reads a type tag written by
    /// [`Writer::write_type_tag`](crate::Writer::write_type_tag).
    ///
    /// # Errors
    ///
    /// [`ErrorKind::UnexpectedNull`] if a null sits where the tag string
    /// should be; tags are never null.
    pub fn read_type_tag(&mut self, opts: &Options) -> Result<String> {
        self.guarded(|r| {
            let start = r.cur.position();
            if opts.markers.contains(Markers::TYPE_TAG) {
                r.expect_marker(nesting::TYPE_TAG)?;
            }
            match r.str_inner(opts, ObjectMode::empty())? {
                Some(name) => Ok(name),
                None => Err(Error::new(ErrorKind::UnexpectedNull, start)),
            }
        })
    }

    /// Opens a sub-object and pushes it onto the nesting stack, unless the
    /// stream holds a null or a back-reference in its place.
    ///
    /// For [`SubObject::Begun`], the caller reads the contents and then
    /// calls [`Self::end_sub_object`]. Registering the half-built instance
    /// via [`Self::set_current_object`] in between is what lets cycles
    /// resolve.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::UnexpectedNull`] for a null under
    /// [`ObjectMode::NOT_NULL`], [`ErrorKind::UnknownBackref`] for an
    /// unresolvable back-reference, or a fatal error for corrupt framing.
    pub fn begin_sub_object(&mut self, opts: &Options, mode: ObjectMode) -> Result<SubObject> {
        self.guarded(|r| r.begin_inner(opts, mode))
    }

    /// Closes the innermost open sub-object.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::NoOpenObject`] if nothing is open,
    /// [`ErrorKind::MarkerMismatch`] if the stream does not close the scope
    /// here.
    pub fn end_sub_object(&mut self, opts: &Options) -> Result<()> {
        self.guarded(|r| r.end_inner(opts))
    }

    /// Registers `object` as the decoded value of the innermost open scope,
    /// so back-references to its id resolve from now on, including from
    /// within the object's own contents.
    ///
    /// Does nothing when the scope carries no id; callers may invoke this
    /// unconditionally. Registering again overwrites.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::NoOpenObject`] if nothing is open.
    pub fn set_current_object(&mut self, object: Rc<dyn Any>) -> Result<()> {
        self.guarded(|r| {
            let Some(top) = r.stack.top_mut() else {
                return Err(Error::new(ErrorKind::NoOpenObject, r.cur.position()));
            };

            if let Some(id) = top.id {
                let pinned = std::mem::take(&mut top.pinned);
                r.objects.insert(id, object);
                if pinned {
                    r.cur.clear_pin();
                }
            }
            Ok(())
        })
    }

    /// Runs `f` under the poison guard: an earlier fatal error short
    /// circuits, a new one is cached.
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if let Some(poison) = &self.poison {
            return Err(poison.clone());
        }

        let result = f(self);
        if let Err(e) = &result
            && e.is_fatal()
        {
            self.poison = Some(e.clone());
        }
        result
    }

    fn int_required<T: Int>(&mut self, opts: &Options) -> Result<T> {
        let start = self.cur.position();
        match self.int_token(opts, T::SIGNED)? {
            Some(bits) => narrow(bits, opts, start),
            None if opts.read.null_as_default => Ok(T::truncate_bits(0)),
            None => Err(Error::new(ErrorKind::UnexpectedNull, start)),
        }
    }

    fn int_optional<T: Int>(&mut self, opts: &Options) -> Result<Option<T>> {
        if opts.int_format != IntFormat::Sync {
            return Err(Error::new(
                ErrorKind::Unsupported("nullable integers require IntFormat::Sync"),
                self.cur.position(),
            ));
        }

        let start = self.cur.position();
        match self.int_token(opts, T::SIGNED)? {
            Some(bits) => narrow(bits, opts, start).map(Some),
            None => Ok(None),
        }
    }

    /// Reads one integer token into 128-bit master bits; [`None`] is null.
    fn int_token(&mut self, opts: &Options, signed: bool) -> Result<Option<u128>> {
        match opts.int_format {
            IntFormat::Sync => self.sync_token(opts, signed),
            IntFormat::Leb128 => self.leb_token(opts, signed).map(Some),
            IntFormat::Leb128Zigzag if signed => {
                let raw = self.leb_token(opts, false)?;
                #[allow(clippy::cast_sign_loss)]
                let bits = leb128::unzigzag(raw) as u128;
                Ok(Some(bits))
            }
            IntFormat::Leb128Zigzag => self.leb_token(opts, false).map(Some),
        }
    }

    fn sync_token(&mut self, opts: &Options, signed: bool) -> Result<Option<u128>> {
        let start = self.cur.position();
        let first = self.cur.peek()?;

        match varint::header(first) {
            Header::Null => {
                self.cur.advance(1);
                Ok(None)
            }
            Header::Compact(len) => {
                self.cur.ensure(len).map_err(|e| e.at(start))?;
                let bits = match self.cur.data().get(..len) {
                    Some(token) => varint::decode_compact(token, signed),
                    None => return Err(Error::new(ErrorKind::UnexpectedEof, start)),
                };
                self.cur.advance(len);
                Ok(Some(bits))
            }
            Header::Extended => self.extended_token(opts, signed, start).map(Some),
        }
    }

    fn extended_token(&mut self, opts: &Options, signed: bool, start: u64) -> Result<u128> {
        self.cur.ensure(2).map_err(|e| e.at(start))?;
        let len_first = self.cur.data().get(1).copied().unwrap_or(varint::NULL_BYTE);
        let Header::Compact(len_len) = varint::header(len_first) else {
            return Err(Error::new(
                ErrorKind::MalformedNumber("length prefix is not a plain number"),
                start,
            ));
        };

        self.cur.ensure(1 + len_len).map_err(|e| e.at(start))?;
        let count = match self.cur.data().get(1..1 + len_len) {
            Some(token) => varint::decode_compact(token, false),
            None => return Err(Error::new(ErrorKind::UnexpectedEof, start)),
        };
        let count = usize::try_from(count)
            .ok()
            .filter(|&count| count <= opts.max_number_size)
            .ok_or_else(|| {
                Error::new(ErrorKind::MalformedNumber("length prefix above the size limit"), start)
            })?;

        self.cur.ensure(1 + len_len + count).map_err(|e| e.at(start))?;
        let ext = match self.cur.data().get(1 + len_len..1 + len_len + count) {
            Some(payload) => varint::decode_extended(payload, signed),
            None => return Err(Error::new(ErrorKind::UnexpectedEof, start)),
        };

        if !ext.fits && !opts.read.silently_truncate_large_numbers {
            return Err(Error::new(
                ErrorKind::MalformedNumber("payload does not fit 128 bits"),
                start,
            ));
        }
        self.cur.advance(1 + len_len + count);
        Ok(ext.bits)
    }

    fn leb_token(&mut self, opts: &Options, signed: bool) -> Result<u128> {
        let start = self.cur.position();
        let mut want = 1;
        loop {
            self.cur.ensure(want).map_err(|e| e.at(start))?;
            let decoded = if signed {
                leb128::decode_signed(self.cur.data())
            } else {
                leb128::decode_unsigned(self.cur.data())
            };

            match decoded {
                Leb::Done { bits, len, fits } => {
                    if !fits && !opts.read.silently_truncate_large_numbers {
                        return Err(Error::new(
                            ErrorKind::MalformedNumber("value does not fit 128 bits"),
                            start,
                        ));
                    }
                    self.cur.advance(len);
                    return Ok(bits);
                }
                Leb::Incomplete => want = self.cur.data().len() + 1,
                Leb::TooLong => {
                    return Err(Error::new(
                        ErrorKind::MalformedNumber("unterminated LEB128 token"),
                        start,
                    ));
                }
            }
        }
    }

    /// Reads a structural unsigned number. Always the native format, no
    /// matter which [`IntFormat`] values use.
    fn struct_uint(&mut self, opts: &Options, what: &'static str) -> Result<u64> {
        let start = self.cur.position();
        self.sync_token(opts, false)?
            .and_then(|bits| u64::try_from(bits).ok())
            .ok_or_else(|| Error::new(ErrorKind::MalformedNumber(what), start))
    }

    fn decimal_inner(&mut self, start: u64) -> Result<Option<Decimal>> {
        let bytes: [u8; 16] = self.cur.read_array()?;
        if bytes == decimal::NULL_BYTES {
            return Ok(None);
        }

        match Decimal::from_bytes(bytes) {
            Some(value) => Ok(Some(value)),
            None => Err(Error::new(ErrorKind::MalformedNumber("decimal layout"), start)),
        }
    }

    /// Reads `ceil(width / 8)` packed bytes into the low end of an `N`-byte
    /// little-endian buffer.
    fn read_bit_bytes<const N: usize>(&mut self, width: u32) -> Result<[u8; N]> {
        let count = width.div_ceil(8) as usize;
        self.cur.ensure(count)?;
        let Some(bytes) = self.cur.data().get(..count) else {
            return Err(Error::new(ErrorKind::UnexpectedEof, self.cur.position()));
        };

        let mut out = [0u8; N];
        for (dst, &src) in out.iter_mut().zip(bytes) {
            *dst = src;
        }
        self.cur.advance(count);
        Ok(out)
    }

    fn str_inner(&mut self, opts: &Options, mode: ObjectMode) -> Result<Option<String>> {
        let start = self.cur.position();
        match self.blob_start(opts, mode)? {
            BlobStart::Null => {
                if null_blob(opts, mode, start)? {
                    Ok(Some(String::new()))
                } else {
                    Ok(None)
                }
            }
            BlobStart::Shared(id) => self.resolve::<String>(id, start).map(Some),
            BlobStart::Body { id } => {
                let bytes = self.blob_body(opts)?;
                let s = String::from_utf8(bytes)
                    .map_err(|_| Error::new(ErrorKind::InvalidUtf8, start))?;
                if let Some(id) = id {
                    self.objects.insert(id, Rc::new(s.clone()));
                }
                Ok(Some(s))
            }
        }
    }

    fn bytes_inner(&mut self, opts: &Options, mode: ObjectMode) -> Result<Option<Vec<u8>>> {
        let start = self.cur.position();
        match self.blob_start(opts, mode)? {
            BlobStart::Null => {
                if null_blob(opts, mode, start)? {
                    Ok(Some(Vec::new()))
                } else {
                    Ok(None)
                }
            }
            BlobStart::Shared(id) => self.resolve::<Vec<u8>>(id, start).map(Some),
            BlobStart::Body { id } => {
                let bytes = self.blob_body(opts)?;
                if let Some(id) = id {
                    self.objects.insert(id, Rc::new(bytes.clone()));
                }
                Ok(Some(bytes))
            }
        }
    }

    /// Looks up a back-reference and clones the value out of its [`Rc`].
    fn resolve<T: Clone + 'static>(&self, id: u64, at: u64) -> Result<T> {
        self.objects
            .get(id)
            .as_deref()
            .and_then(<dyn Any>::downcast_ref::<T>)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::UnknownBackref(id), at))
    }

    /// Consumes everything before a string/byte-array length: the null
    /// sentinel, dedup markers, the start marker.
    fn blob_start(&mut self, opts: &Options, mode: ObjectMode) -> Result<BlobStart> {
        let first = self.cur.peek()?;
        if first == varint::NULL_BYTE {
            self.cur.advance(1);
            return Ok(BlobStart::Null);
        }

        let mut id = None;
        if mode.contains(ObjectMode::DEDUPLICATE) || opts.markers.contains(Markers::LIST_START) {
            match first {
                nesting::DEDUP_REF => {
                    self.cur.advance(1);
                    let id = self.struct_uint(opts, "back-reference id")?;
                    return Ok(BlobStart::Shared(id));
                }
                nesting::DEDUP_DEF => {
                    self.cur.advance(1);
                    id = Some(self.struct_uint(opts, "object id")?);
                }
                _ => {}
            }
        }

        if opts.markers.contains(Markers::LIST_START) {
            self.expect_marker(nesting::LIST_START)?;
        }
        Ok(BlobStart::Body { id })
    }

    fn blob_body(&mut self, opts: &Options) -> Result<Vec<u8>> {
        let start = self.cur.position();
        let len = self.struct_uint(opts, "length prefix")?;
        let len = usize::try_from(len)
            .map_err(|_| Error::new(ErrorKind::MalformedNumber("oversized length prefix"), start))?;

        let bytes = self.cur.read_vec(len)?;
        if opts.markers.contains(Markers::LIST_END) {
            self.expect_marker(nesting::LIST_END)?;
        }
        Ok(bytes)
    }

    fn list_inner<T: Clone + 'static>(
        &mut self,
        opts: &Options,
        element: impl Fn(&mut Self, &Options) -> Result<T>,
    ) -> Result<Option<Vec<T>>> {
        let start = self.cur.position();
        match self.begin_inner(opts, ObjectMode::LIST)? {
            SubObject::Null => Ok(None),
            SubObject::Shared { id, .. } => self.resolve::<Vec<T>>(id, start).map(Some),
            SubObject::Begun { id, len } => {
                let len = usize::try_from(len.unwrap_or_default()).map_err(|_| {
                    Error::new(ErrorKind::MalformedNumber("oversized list length"), start)
                })?;

                // don't trust the length prefix for the first allocation
                let mut values = Vec::with_capacity(len.min(0x1000));
                for _ in 0..len {
                    values.push(element(self, opts)?);
                }
                self.end_inner(opts)?;

                if let Some(id) = id {
                    self.objects.insert(id, Rc::new(values.clone()));
                }
                Ok(Some(values))
            }
        }
    }

    fn begin_inner(&mut self, opts: &Options, mode: ObjectMode) -> Result<SubObject> {
        let start = self.cur.position();
        if nesting::mode_conflict(mode) {
            return Err(Error::new(
                ErrorKind::Unsupported("a scope cannot be both list and tuple"),
                start,
            ));
        }

        // take the pin before any header byte so a refill during header
        // parsing cannot slide the window past the scope start
        let held = !self.cur.has_pin();
        if held {
            self.cur.pin_at(start);
        }

        let result = self.begin_scope(opts, mode, start, held);

        // only the outermost dedup scope keeps the pin past its header
        if held && !matches!(&result, Ok(SubObject::Begun { id: Some(_), .. })) {
            self.cur.clear_pin();
        }
        result
    }

    fn begin_scope(
        &mut self,
        opts: &Options,
        mode: ObjectMode,
        start: u64,
        held: bool,
    ) -> Result<SubObject> {
        let kind = ScopeKind::from_mode(mode);
        let first = self.cur.peek()?;

        if first == varint::NULL_BYTE {
            self.cur.advance(1);
            if mode.contains(ObjectMode::NOT_NULL) {
                return Err(Error::new(ErrorKind::UnexpectedNull, start));
            }
            return Ok(SubObject::Null);
        }

        let mut id = None;
        if mode.contains(ObjectMode::DEDUPLICATE) || kind.start_enabled(opts.markers) {
            match first {
                nesting::DEDUP_REF => {
                    self.cur.advance(1);
                    let id = self.struct_uint(opts, "back-reference id")?;
                    let object = self
                        .objects
                        .get(id)
                        .ok_or_else(|| Error::new(ErrorKind::UnknownBackref(id), start))?;
                    return Ok(SubObject::Shared { id, object });
                }
                nesting::DEDUP_DEF => {
                    self.cur.advance(1);
                    id = Some(self.struct_uint(opts, "object id")?);
                }
                _ => {}
            }
        }

        if kind.start_enabled(opts.markers) {
            let (start_marker, _) = kind.marker_pair(self.stack.depth());
            self.expect_marker(start_marker)?;
        }

        let len = if kind == ScopeKind::List {
            Some(self.struct_uint(opts, "list length")?)
        } else {
            None
        };

        self.stack.push(StackEntry { id, kind, pinned: held && id.is_some() });
        Ok(SubObject::Begun { id, len })
    }

    fn end_inner(&mut self, opts: &Options) -> Result<()> {
        let entry = self
            .stack
            .pop()
            .ok_or_else(|| Error::new(ErrorKind::NoOpenObject, self.cur.position()))?;

        if entry.pinned {
            self.cur.clear_pin();
        }

        if entry.kind.end_enabled(opts.markers) {
            let (_, end_marker) = entry.kind.marker_pair(self.stack.depth());
            self.expect_marker(end_marker)?;
        }
        Ok(())
    }

    fn expect_marker(&mut self, expected: u8) -> Result<()> {
        let start = self.cur.position();
        let found = self.cur.peek()?;
        if found == expected {
            self.cur.advance(1);
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::MarkerMismatch { expected: char::from(expected), found },
                start,
            ))
        }
    }
}

/// State after the leading bytes of a string or byte array.
enum BlobStart {
    Null,
    Shared(u64),
    Body { id: Option<u64> },
}

/// Applies the null policy for a non-nullable primitive slot.
fn null_primitive<T>(opts: &Options, default: T, at: u64) -> Result<T> {
    if opts.read.null_as_default {
        Ok(default)
    } else {
        Err(Error::new(ErrorKind::UnexpectedNull, at))
    }
}

/// Applies the null policy for strings and byte arrays. True means
/// "substitute an empty value".
fn null_blob(opts: &Options, mode: ObjectMode, at: u64) -> Result<bool> {
    if !mode.contains(ObjectMode::NOT_NULL) {
        return Ok(false);
    }
    if opts.read.null_as_default {
        return Ok(true);
    }
    Err(Error::new(ErrorKind::UnexpectedNull, at))
}

fn narrow<T: Int>(bits: u128, opts: &Options, at: u64) -> Result<T> {
    match T::from_bits(bits) {
        Some(value) => Ok(value),
        None if opts.read.silently_truncate_large_numbers => Ok(T::truncate_bits(bits)),
        None => Err(Error::new(ErrorKind::Overflow(any::type_name::<T>()), at)),
    }
}

fn char_from_code(code: u16, at: u64) -> Result<char> {
    char::from_u32(u32::from(code))
        .ok_or_else(|| Error::new(ErrorKind::InvalidChar(u32::from(code)), at))
}

fn mask_u64(width: u32) -> u64 {
    if width == 64 { u64::MAX } else { (1 << width) - 1 }
}

fn mask_u128(width: u32) -> u128 {
    if width == 128 { u128::MAX } else { (1 << width) - 1 }
}
