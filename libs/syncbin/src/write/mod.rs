//! Exposes the stream writer, the mirror of [`Reader`](crate::Reader).

use std::io;

use crate::decimal::{self, Decimal};
use crate::dedup::{IdGen, Identity};
use crate::error::{Error, ErrorKind, Result};
use crate::leb128;
use crate::nesting::{self, NestingStack, ScopeKind, StackEntry};
use crate::options::{IntFormat, Markers, ObjectMode, Options};
use crate::varint::{self, Int};
use crate::{NULL_F32_BITS, NULL_F64_BITS};

/// A streaming writer for this crate's binary format.
///
/// Values go out in call order with no buffering beyond the sink's own.
/// Like on the read side, configuration is borrowed per call and identical
/// options must be used by whoever reads the stream back.
///
/// Recoverable errors reject the value before any byte of it is written,
/// so the stream stays decodable. An [`ErrorKind::Io`] failure poisons the
/// writer since the sink state is unknown from then on.
pub struct Writer<W> {
    sink: W,
    written: u64,
    stack: NestingStack,
    ids: IdGen,
    poison: Option<Error>,
}

impl<W: io::Write> Writer<W> {
    /// Whether this writer can emit values out of call order. It cannot.
    pub const SUPPORTS_REORDERING: bool = false;
    /// Whether repeated objects can be written as back-references.
    pub const SUPPORTS_DEDUPLICATION: bool = true;

    /// Creates a writer over an [`io::Write`] implementation.
    ///
    /// # Examples
    ///
    /// ```
    /// # use syncbin::{Options, Writer};
    /// let opts = Options::default();
    /// let mut writer = Writer::from_writer(Vec::new());
    /// writer.write_str(&opts, Some("hi"))?;
    /// assert_eq!(writer.into_writer(), [0x5B, 0x02, b'h', b'i']);
    /// # Ok::<(), syncbin::Error>(())
    /// ```
    pub fn from_writer(sink: W) -> Self {
        Self {
            sink,
            written: 0,
            stack: NestingStack::new(),
            ids: IdGen::new(),
            poison: None,
        }
    }

    /// Unwraps the writer into its sink.
    pub fn into_writer(self) -> W {
        self.sink
    }

    /// Absolute offset of the next byte to be written.
    pub fn position(&self) -> u64 {
        self.written
    }

    /// Number of currently open sub-objects.
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    /// Writes an integer in the shortest form of the active [`IntFormat`].
    pub fn write_int<T: Int>(&mut self, opts: &Options, value: T) -> Result<()> {
        self.guarded(|w| w.int_put(opts, value.to_bits(), T::SIGNED))
    }

    /// Writes a nullable integer.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::Unsupported`] for [`None`] under the LEB128 formats,
    /// which have no null representation, unless
    /// [`null_as_default`](crate::WriteOptions::null_as_default) maps it
    /// to zero.
    pub fn write_int_opt<T: Int>(&mut self, opts: &Options, value: Option<T>) -> Result<()> {
        self.guarded(|w| match value {
            Some(value) => w.int_put(opts, value.to_bits(), T::SIGNED),
            None => w.int_null(opts, T::SIGNED),
        })
    }

    /// Writes a bool as the integer 1 or 0.
    pub fn write_bool(&mut self, opts: &Options, value: bool) -> Result<()> {
        self.write_int(opts, i32::from(value))
    }

    /// Writes a nullable bool.
    pub fn write_bool_opt(&mut self, opts: &Options, value: Option<bool>) -> Result<()> {
        self.write_int_opt(opts, value.map(i32::from))
    }

    /// Writes a char as its UTF-16 code unit.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::Overflow`] for chars beyond the basic multilingual
    /// plane; the wire holds a single code unit.
    pub fn write_char(&mut self, opts: &Options, value: char) -> Result<()> {
        self.guarded(|w| {
            let code = w.code_unit(value)?;
            w.int_put(opts, u128::from(code), false)
        })
    }

    /// Writes a nullable char.
    pub fn write_char_opt(&mut self, opts: &Options, value: Option<char>) -> Result<()> {
        self.guarded(|w| match value {
            Some(value) => {
                let code = w.code_unit(value)?;
                w.int_put(opts, u128::from(code), false)
            }
            None => w.int_null(opts, false),
        })
    }

    /// Writes a 32-bit float as fixed little-endian bytes.
    ///
    /// The bits go out unchanged; a NaN with exactly the payload
    /// `0xFFF368E0` is indistinguishable from null on the wire.
    pub fn write_f32(&mut self, _opts: &Options, value: f32) -> Result<()> {
        self.guarded(|w| w.put(&value.to_bits().to_le_bytes()))
    }

    /// Writes a nullable 32-bit float.
    pub fn write_f32_opt(&mut self, _opts: &Options, value: Option<f32>) -> Result<()> {
        self.guarded(|w| {
            let bits = value.map_or(NULL_F32_BITS, f32::to_bits);
            w.put(&bits.to_le_bytes())
        })
    }

    /// Writes a 64-bit float as fixed little-endian bytes.
    ///
    /// The bits go out unchanged; a NaN with exactly the payload
    /// `0xFFFE6C6C756E06FE` is indistinguishable from null on the wire.
    pub fn write_f64(&mut self, _opts: &Options, value: f64) -> Result<()> {
        self.guarded(|w| w.put(&value.to_bits().to_le_bytes()))
    }

    /// Writes a nullable 64-bit float.
    pub fn write_f64_opt(&mut self, _opts: &Options, value: Option<f64>) -> Result<()> {
        self.guarded(|w| {
            let bits = value.map_or(NULL_F64_BITS, f64::to_bits);
            w.put(&bits.to_le_bytes())
        })
    }

    /// Writes a decimal in its 16-byte layout.
    pub fn write_decimal(&mut self, _opts: &Options, value: Decimal) -> Result<()> {
        self.guarded(|w| w.put(&value.to_bytes()))
    }

    /// Writes a nullable decimal.
    pub fn write_decimal_opt(&mut self, _opts: &Options, value: Option<Decimal>) -> Result<()> {
        self.guarded(|w| match value {
            Some(value) => w.put(&value.to_bytes()),
            None => w.put(&decimal::NULL_BYTES),
        })
    }

    /// Writes a bit field of `width` bits as little-endian packed bytes.
    /// Bits of `value` above `width` are dropped.
    ///
    /// # Panics
    ///
    /// Panics if `width` is 0 or above 64.
    pub fn write_bits(&mut self, _opts: &Options, width: u32, value: u64) -> Result<()> {
        assert!((1..=64).contains(&width), "bit field width must be 1..=64");
        self.guarded(|w| {
            let bytes = (value & mask_u64(width)).to_le_bytes();
            w.put(&bytes[..width.div_ceil(8) as usize])
        })
    }

    /// Writes a bit field of up to 128 bits.
    ///
    /// # Panics
    ///
    /// Panics if `width` is 0 or above 128.
    pub fn write_bits_u128(&mut self, _opts: &Options, width: u32, value: u128) -> Result<()> {
        assert!((1..=128).contains(&width), "bit field width must be 1..=128");
        self.guarded(|w| {
            let bytes = (value & mask_u128(width)).to_le_bytes();
            w.put(&bytes[..width.div_ceil(8) as usize])
        })
    }

    /// Writes a nullable string as a byte-length prefix plus UTF-8 data.
    pub fn write_str(&mut self, opts: &Options, value: Option<&str>) -> Result<()> {
        self.write_str_with(opts, ObjectMode::empty(), value)
    }

    /// Writes a string with explicit per-value behavior.
    ///
    /// Under [`ObjectMode::DEDUPLICATE`], repeats are keyed on the address
    /// of the passed data: pass slices of the same storage for values that
    /// should share, and keep that storage alive for the writer's lifetime.
    /// [`ObjectMode::NOT_NULL`] rejects [`None`], or writes an empty string
    /// under [`null_as_default`](crate::WriteOptions::null_as_default).
    pub fn write_str_with(
        &mut self,
        opts: &Options,
        mode: ObjectMode,
        value: Option<&str>,
    ) -> Result<()> {
        self.guarded(|w| match value {
            Some(s) => w.blob(opts, mode, Identity::of(s), s.as_bytes()),
            None => w.null_blob(opts, mode),
        })
    }

    /// Writes a nullable byte array as a length prefix plus raw data.
    pub fn write_bytes(&mut self, opts: &Options, value: Option<&[u8]>) -> Result<()> {
        self.write_bytes_with(opts, ObjectMode::empty(), value)
    }

    /// Writes a byte array with explicit per-value behavior, as
    /// [`Self::write_str_with`] does for strings.
    pub fn write_bytes_with(
        &mut self,
        opts: &Options,
        mode: ObjectMode,
        value: Option<&[u8]>,
    ) -> Result<()> {
        self.guarded(|w| match value {
            Some(bytes) => w.blob(opts, mode, Identity::of(bytes), bytes),
            None => w.null_blob(opts, mode),
        })
    }

    /// Writes a nullable bool list element by element.
    pub fn write_bools(&mut self, opts: &Options, values: Option<&[bool]>) -> Result<()> {
        self.guarded(|w| {
            let Some(values) = values else {
                return w.put(&[varint::NULL_BYTE]);
            };

            let len = Some(values.len() as u64);
            w.begin_inner(opts, ObjectMode::LIST, Some(Identity::of(values)), len)?;
            for &value in values {
                w.int_put(opts, i32::from(value).to_bits(), true)?;
            }
            w.end_inner(opts)
        })
    }

    /// Writes a nullable char list element by element.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::Overflow`] if any char is beyond the basic
    /// multilingual plane, before a single byte goes out.
    pub fn write_chars(&mut self, opts: &Options, values: Option<&[char]>) -> Result<()> {
        self.guarded(|w| {
            let Some(values) = values else {
                return w.put(&[varint::NULL_BYTE]);
            };

            // the whole list must be representable before any byte goes out
            for &value in values {
                w.code_unit(value)?;
            }

            let len = Some(values.len() as u64);
            w.begin_inner(opts, ObjectMode::LIST, Some(Identity::of(values)), len)?;
            for &value in values {
                let code = w.code_unit(value)?;
                w.int_put(opts, u128::from(code), false)?;
            }
            w.end_inner(opts)
        })
    }

    /// Writes a type tag: the `T` marker per [`Markers::TYPE_TAG`], then
    /// `name` as a non-null string.
    pub fn write_type_tag(&mut self, opts: &Options, name: &str) -> Result<()> {
        self.guarded(|w| {
            if opts.markers.contains(Markers::TYPE_TAG) {
                w.put(&[nesting::TYPE_TAG])?;
            }
            w.blob(opts, ObjectMode::empty(), Identity::of(name), name.as_bytes())
        })
    }

    /// Opens a sub-object. Returns whether a body must follow: `false`
    /// means a null or a back-reference was written and the value is
    /// complete.
    ///
    /// `identity` keys deduplication and doubles as the null signal; pass
    /// [`None`] to write a null. `list_len` is required for
    /// [`ObjectMode::LIST`] scopes and ignored for the rest; tuple lengths
    /// travel out of band.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::UnexpectedNull`] for a null under
    /// [`ObjectMode::NOT_NULL`], [`ErrorKind::LengthRequired`] for a list
    /// without a length. Both reject before any byte is written.
    pub fn begin_sub_object(
        &mut self,
        opts: &Options,
        mode: ObjectMode,
        identity: Option<Identity>,
        list_len: Option<u64>,
    ) -> Result<bool> {
        self.guarded(|w| w.begin_inner(opts, mode, identity, list_len))
    }

    /// Closes the innermost open sub-object.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::NoOpenObject`] if nothing is open.
    pub fn end_sub_object(&mut self, opts: &Options) -> Result<()> {
        self.guarded(|w| w.end_inner(opts))
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

    /// Appends raw bytes to the sink and advances the offset.
    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink
            .write_all(bytes)
            .map_err(|e| Error::new(e.into(), self.written))?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn int_put(&mut self, opts: &Options, bits: u128, signed: bool) -> Result<()> {
        match opts.int_format {
            IntFormat::Sync => {
                let mut buf = [0u8; varint::MAX_ENCODED_LEN];
                #[allow(clippy::cast_possible_wrap)]
                let len = if signed {
                    varint::encode_signed(bits as i128, &mut buf)
                } else {
                    varint::encode_unsigned(bits, &mut buf)
                };
                self.put(&buf[..len])
            }
            IntFormat::Leb128 => {
                let mut buf = [0u8; leb128::MAX_LEN];
                #[allow(clippy::cast_possible_wrap)]
                let len = if signed {
                    leb128::encode_signed(bits as i128, &mut buf)
                } else {
                    leb128::encode_unsigned(bits, &mut buf)
                };
                self.put(&buf[..len])
            }
            IntFormat::Leb128Zigzag => {
                let mut buf = [0u8; leb128::MAX_LEN];
                #[allow(clippy::cast_possible_wrap)]
                let len = if signed {
                    leb128::encode_unsigned(leb128::zigzag(bits as i128), &mut buf)
                } else {
                    leb128::encode_unsigned(bits, &mut buf)
                };
                self.put(&buf[..len])
            }
        }
    }

    fn int_null(&mut self, opts: &Options, signed: bool) -> Result<()> {
        if opts.int_format == IntFormat::Sync {
            return self.put(&[varint::NULL_BYTE]);
        }
        if opts.write.null_as_default {
            return self.int_put(opts, 0, signed);
        }
        Err(Error::new(
            ErrorKind::Unsupported("nullable integers require IntFormat::Sync"),
            self.written,
        ))
    }

    /// Writes a structural unsigned number. Always the native format, no
    /// matter which [`IntFormat`] values use.
    fn struct_uint_out(&mut self, value: u64) -> Result<()> {
        let mut buf = [0u8; varint::MAX_ENCODED_LEN];
        let len = varint::encode_unsigned(u128::from(value), &mut buf);
        self.put(&buf[..len])
    }

    fn code_unit(&self, value: char) -> Result<u16> {
        u16::try_from(u32::from(value))
            .map_err(|_| Error::new(ErrorKind::Overflow("u16"), self.written))
    }

    /// Writes the leading bytes and payload of a string or byte array.
    fn blob(
        &mut self,
        opts: &Options,
        mode: ObjectMode,
        identity: Identity,
        data: &[u8],
    ) -> Result<()> {
        if mode.contains(ObjectMode::DEDUPLICATE) {
            let (id, first) = self.ids.get_or_assign(identity);
            if !first {
                self.put(&[nesting::DEDUP_REF])?;
                return self.struct_uint_out(id);
            }
            self.put(&[nesting::DEDUP_DEF])?;
            self.struct_uint_out(id)?;
        }

        if opts.markers.contains(Markers::LIST_START) {
            self.put(&[nesting::LIST_START])?;
        }
        self.struct_uint_out(data.len() as u64)?;
        self.put(data)?;
        if opts.markers.contains(Markers::LIST_END) {
            self.put(&[nesting::LIST_END])?;
        }
        Ok(())
    }

    /// Handles [`None`] in a string or byte array slot.
    fn null_blob(&mut self, opts: &Options, mode: ObjectMode) -> Result<()> {
        if !mode.contains(ObjectMode::NOT_NULL) {
            return self.put(&[varint::NULL_BYTE]);
        }
        if opts.write.null_as_default {
            let empty: &[u8] = &[];
            return self.blob(opts, ObjectMode::empty(), Identity::of(empty), empty);
        }
        Err(Error::new(ErrorKind::UnexpectedNull, self.written))
    }

    fn begin_inner(
        &mut self,
        opts: &Options,
        mode: ObjectMode,
        identity: Option<Identity>,
        len: Option<u64>,
    ) -> Result<bool> {
        if nesting::mode_conflict(mode) {
            return Err(Error::new(
                ErrorKind::Unsupported("a scope cannot be both list and tuple"),
                self.written,
            ));
        }

        let kind = ScopeKind::from_mode(mode);
        let Some(identity) = identity else {
            if mode.contains(ObjectMode::NOT_NULL) {
                return Err(Error::new(ErrorKind::UnexpectedNull, self.written));
            }
            self.put(&[varint::NULL_BYTE])?;
            return Ok(false);
        };

        if kind == ScopeKind::List && len.is_none() {
            return Err(Error::new(ErrorKind::LengthRequired, self.written));
        }

        let mut id = None;
        if mode.contains(ObjectMode::DEDUPLICATE) {
            let (assigned, first) = self.ids.get_or_assign(identity);
            if !first {
                self.put(&[nesting::DEDUP_REF])?;
                self.struct_uint_out(assigned)?;
                return Ok(false);
            }
            self.put(&[nesting::DEDUP_DEF])?;
            self.struct_uint_out(assigned)?;
            id = Some(assigned);
        }

        if kind.start_enabled(opts.markers) {
            let (start_marker, _) = kind.marker_pair(self.stack.depth());
            self.put(&[start_marker])?;
        }

        if kind == ScopeKind::List
            && let Some(len) = len
        {
            self.struct_uint_out(len)?;
        }

        self.stack.push(StackEntry { id, kind, pinned: false });
        Ok(true)
    }

    fn end_inner(&mut self, opts: &Options) -> Result<()> {
        let entry = self
            .stack
            .pop()
            .ok_or_else(|| Error::new(ErrorKind::NoOpenObject, self.written))?;

        if entry.kind.end_enabled(opts.markers) {
            let (_, end_marker) = entry.kind.marker_pair(self.stack.depth());
            self.put(&[end_marker])?;
        }
        Ok(())
    }
}

fn mask_u64(width: u32) -> u64 {
    if width == 64 { u64::MAX } else { (1 << width) - 1 }
}

fn mask_u128(width: u32) -> u128 {
    if width == 128 { u128::MAX } else { (1 << width) - 1 }
}
