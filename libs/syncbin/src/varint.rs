//! The native variable-length integer encoding.
//!
//! Every number token starts with one byte whose leading ones give the total
//! token size. A first byte below `0x80` is a complete 1-byte token; each
//! additional leading one adds a byte, up to 7 bytes total holding 49
//! payload bits big-endian. `0xFE` escapes to a length-prefixed form, a
//! nested varint byte count followed by that many big-endian payload bytes,
//! for magnitudes without bound. `0xFF` is the null sentinel.
//!
//! Signed values store two's complement in the payload bits; the payload
//! width's top bit is the sign. Encoding always picks the shortest form
//! that fits, decoding accepts over-long forms as well.

/// Null sentinel byte. Also an invalid first byte for a length prefix.
pub(crate) const NULL_BYTE: u8 = 0xFF;
/// First byte of the length-prefixed form.
pub(crate) const EXTENDED_BYTE: u8 = 0xFE;

/// Longest encoding of a 128-bit value: `FE`, a 1-byte count, 16 payload
/// bytes.
pub(crate) const MAX_ENCODED_LEN: usize = 18;

/// Compact tokens carry at most 7 payload bits per byte.
const MAX_COMPACT_BITS: u32 = 49;

/// Classification of a number token by its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Header {
    /// A compact token of the given total size in bytes, 1 to 7.
    Compact(usize),
    /// The length-prefixed escape; payload size follows as a nested varint.
    Extended,
    /// The null sentinel, a complete 1-byte token.
    Null,
}

pub(crate) fn header(first: u8) -> Header {
    match first {
        NULL_BYTE => Header::Null,
        EXTENDED_BYTE => Header::Extended,
        b => Header::Compact(b.leading_ones() as usize + 1),
    }
}

/// Encodes `value` into the shortest unsigned form.
///
/// Returns the number of bytes written to the front of `out`.
pub(crate) fn encode_unsigned(value: u128, out: &mut [u8; MAX_ENCODED_LEN]) -> usize {
    let bits = 128 - value.leading_zeros();
    if bits <= MAX_COMPACT_BITS {
        encode_compact(value, bits, out)
    } else {
        encode_extended(value, bits, out)
    }
}

/// Encodes `value` into the shortest signed form.
///
/// Returns the number of bytes written to the front of `out`.
pub(crate) fn encode_signed(value: i128, out: &mut [u8; MAX_ENCODED_LEN]) -> usize {
    // bits needed for two's complement, including the sign bit
    let bits = if value >= 0 {
        129 - value.leading_zeros()
    } else {
        129 - value.leading_ones()
    };

    #[allow(clippy::cast_sign_loss)]
    let raw = value as u128;
    if bits <= MAX_COMPACT_BITS {
        encode_compact(raw, bits, out)
    } else {
        encode_extended(raw, bits, out)
    }
}

fn encode_compact(raw: u128, bits: u32, out: &mut [u8; MAX_ENCODED_LEN]) -> usize {
    let len = (bits.max(1) as usize).div_ceil(7);
    // truncate to the token's payload width; sign-extended negatives keep
    // their two's complement form this way
    let payload = raw & (u128::MAX >> (128 - 7 * len));
    let prefix = !(0xFFu8 >> (len - 1));
    out[0] = prefix | trunc_u8(payload >> (8 * (len - 1)));
    for i in 1..len {
        out[i] = trunc_u8(payload >> (8 * (len - 1 - i)));
    }
    len
}

fn encode_extended(raw: u128, bits: u32, out: &mut [u8; MAX_ENCODED_LEN]) -> usize {
    let count = (bits as usize).div_ceil(8);
    out[0] = EXTENDED_BYTE;
    // the count is at most 16, always a 1-byte nested varint
    out[1] = trunc_u8(count as u128);
    for i in 0..count {
        out[2 + i] = trunc_u8(raw >> (8 * (count - 1 - i)));
    }
    2 + count
}

/// Decodes a complete compact token.
///
/// `token` must be exactly the size named by its [`Header::Compact`]. The
/// result is the raw value, sign-extended to 128 bits when `signed`.
pub(crate) fn decode_compact(token: &[u8], signed: bool) -> u128 {
    let Some((&first, rest)) = token.split_first() else {
        return 0;
    };

    let len = token.len();
    debug_assert!(
        matches!(header(first), Header::Compact(l) if l == len),
        "token must match its header size"
    );

    let mut value = u64::from(first & (0xFF >> len));
    for &b in rest {
        value = (value << 8) | u64::from(b);
    }

    let payload_bits = 7 * len;
    if signed && (value & (1 << (payload_bits - 1))) != 0 {
        u128::from(value) | (u128::MAX << payload_bits)
    } else {
        u128::from(value)
    }
}

/// A decoded length-prefixed payload.
pub(crate) struct Extended {
    /// The low 128 bits, sign-extended when decoded as signed.
    pub bits: u128,
    /// Whether the full payload was representable in 128 bits.
    pub fits: bool,
}

/// Decodes the raw payload of a length-prefixed token.
///
/// Payloads longer than 16 bytes are accepted as long as the extra leading
/// bytes only repeat the sign; otherwise `fits` is false and `bits` holds
/// the truncated low bits.
pub(crate) fn decode_extended(payload: &[u8], signed: bool) -> Extended {
    let Some((&first, _)) = payload.split_first() else {
        return Extended { bits: 0, fits: true };
    };

    let negative = signed && (first & 0x80) != 0;
    let fill: u8 = if negative { 0xFF } else { 0x00 };

    let mut fits = true;
    let split = payload.len().saturating_sub(16);
    let (head, tail) = payload.split_at(split);
    if !head.is_empty() {
        fits = head.iter().all(|&b| b == fill);
    }

    let mut bits: u128 = if negative { u128::MAX } else { 0 };
    for &b in tail {
        bits = (bits << 8) | u128::from(b);
    }

    if signed && !head.is_empty() {
        // a 128-bit reinterpretation must agree with the stored sign
        fits &= ((bits >> 127) != 0) == negative;
    }

    Extended { bits, fits }
}

#[allow(clippy::cast_possible_truncation)]
fn trunc_u8(value: u128) -> u8 {
    value as u8
}

/// Implementation detail of [`Int`].
trait Sealed {}

/// Integer types the codec can read and write.
///
/// Implemented for the built-in integer types up to 128 bits wide. The
/// decoders work on 128-bit values internally and narrow to the requested
/// type at the end, so the wire does not care which of these a value is
/// read back as, only whether it is signed.
#[allow(private_bounds)]
pub trait Int: Sealed + Copy {
    /// Whether the wire encoding carries a sign.
    const SIGNED: bool;

    #[doc(hidden)]
    fn to_bits(self) -> u128;
    #[doc(hidden)]
    fn from_bits(bits: u128) -> Option<Self>;
    #[doc(hidden)]
    fn truncate_bits(bits: u128) -> Self;
}

macro_rules! impl_int_unsigned {
    ($($Ty:ty)*) => { $(
        impl Sealed for $Ty {}
        impl Int for $Ty {
            const SIGNED: bool = false;

            fn to_bits(self) -> u128 {
                u128::from(self)
            }

            fn from_bits(bits: u128) -> Option<Self> {
                Self::try_from(bits).ok()
            }

            #[allow(clippy::cast_possible_truncation)]
            fn truncate_bits(bits: u128) -> Self {
                bits as $Ty
            }
        }
    )* };
}

macro_rules! impl_int_signed {
    ($($Ty:ty)*) => { $(
        impl Sealed for $Ty {}
        impl Int for $Ty {
            const SIGNED: bool = true;

            #[allow(clippy::cast_sign_loss)]
            fn to_bits(self) -> u128 {
                i128::from(self) as u128
            }

            #[allow(clippy::cast_possible_wrap)]
            fn from_bits(bits: u128) -> Option<Self> {
                Self::try_from(bits as i128).ok()
            }

            #[allow(clippy::cast_possible_truncation)]
            fn truncate_bits(bits: u128) -> Self {
                bits as $Ty
            }
        }
    )* };
}

impl_int_unsigned!(u8 u16 u32 u64);
impl_int_signed!(i8 i16 i32 i64);

// u128 has no `From<usize>`, so the pointer-sized impls cast by hand
impl Sealed for usize {}
impl Int for usize {
    const SIGNED: bool = false;

    fn to_bits(self) -> u128 {
        self as u128
    }

    fn from_bits(bits: u128) -> Option<Self> {
        Self::try_from(bits).ok()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn truncate_bits(bits: u128) -> Self {
        bits as usize
    }
}

impl Sealed for isize {}
impl Int for isize {
    const SIGNED: bool = true;

    #[allow(clippy::cast_sign_loss)]
    fn to_bits(self) -> u128 {
        self as i128 as u128
    }

    #[allow(clippy::cast_possible_wrap)]
    fn from_bits(bits: u128) -> Option<Self> {
        Self::try_from(bits as i128).ok()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn truncate_bits(bits: u128) -> Self {
        bits as isize
    }
}

impl Sealed for u128 {}
impl Int for u128 {
    const SIGNED: bool = false;

    fn to_bits(self) -> u128 {
        self
    }

    fn from_bits(bits: u128) -> Option<Self> {
        Some(bits)
    }

    fn truncate_bits(bits: u128) -> Self {
        bits
    }
}

impl Sealed for i128 {}
impl Int for i128 {
    const SIGNED: bool = true;

    #[allow(clippy::cast_sign_loss)]
    fn to_bits(self) -> u128 {
        self as u128
    }

    #[allow(clippy::cast_possible_wrap)]
    fn from_bits(bits: u128) -> Option<Self> {
        Some(bits as i128)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn truncate_bits(bits: u128) -> Self {
        bits as i128
    }
}

#[cfg(test)]
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
mod tests {
    use super::*;

    fn unsigned_bytes(value: u128) -> Vec<u8> {
        let mut buf = [0; MAX_ENCODED_LEN];
        let len = encode_unsigned(value, &mut buf);
        buf[..len].to_vec()
    }

    fn signed_bytes(value: i128) -> Vec<u8> {
        let mut buf = [0; MAX_ENCODED_LEN];
        let len = encode_signed(value, &mut buf);
        buf[..len].to_vec()
    }

    #[test]
    fn header_classification() {
        assert_eq!(header(0x00), Header::Compact(1), "0x00 is 1 byte");
        assert_eq!(header(0x7F), Header::Compact(1), "0x7F is 1 byte");
        assert_eq!(header(0x80), Header::Compact(2), "0x80 is 2 bytes");
        assert_eq!(header(0xBF), Header::Compact(2), "0xBF is 2 bytes");
        assert_eq!(header(0xC0), Header::Compact(3), "0xC0 is 3 bytes");
        assert_eq!(header(0xF0), Header::Compact(5), "0xF0 is 5 bytes");
        assert_eq!(header(0xFC), Header::Compact(7), "0xFC is 7 bytes");
        assert_eq!(header(0xFD), Header::Compact(7), "0xFD is 7 bytes");
        assert_eq!(header(0xFE), Header::Extended, "0xFE escapes");
        assert_eq!(header(0xFF), Header::Null, "0xFF is null");
    }

    #[test]
    fn unsigned_exact_bytes() {
        assert_eq!(unsigned_bytes(0), [0x00], "zero");
        assert_eq!(unsigned_bytes(1), [0x01], "one");
        assert_eq!(unsigned_bytes(127), [0x7F], "7-bit max");
        assert_eq!(unsigned_bytes(128), [0x80, 0x80], "needs 2 bytes");
        assert_eq!(unsigned_bytes(16383), [0xBF, 0xFF], "14-bit max");
        assert_eq!(unsigned_bytes(16384), [0xC0, 0x40, 0x00], "needs 3 bytes");
        assert_eq!(unsigned_bytes(65539), [0xC1, 0x00, 0x03], "17-bit value");
        assert_eq!(
            unsigned_bytes((1 << 49) - 1),
            [0xFD, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
            "49-bit max is the longest compact form"
        );
        assert_eq!(
            unsigned_bytes(1 << 49),
            [0xFE, 0x07, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
            "50 bits escape to the length-prefixed form"
        );
        assert_eq!(
            unsigned_bytes(u128::from(u64::MAX)),
            [0xFE, 0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
            "u64::MAX is 8 payload bytes"
        );
    }

    #[test]
    fn signed_exact_bytes() {
        assert_eq!(signed_bytes(0), [0x00], "zero");
        assert_eq!(signed_bytes(63), [0x3F], "6-bit max positive");
        assert_eq!(signed_bytes(64), [0x80, 0x40], "positive 64 needs 2 bytes");
        assert_eq!(signed_bytes(-1), [0x7F], "minus one");
        assert_eq!(signed_bytes(-64), [0x40], "6-bit min negative");
        assert_eq!(signed_bytes(-65), [0xBF, 0xBF], "negative 65 needs 2 bytes");
        assert_eq!(signed_bytes(65539), [0xC1, 0x00, 0x03], "17-bit value");
        assert_eq!(
            signed_bytes(i128::from(i32::MIN)),
            [0xF7, 0x80, 0x00, 0x00, 0x00],
            "i32::MIN in 35 payload bits"
        );
        assert_eq!(
            signed_bytes(i128::from(i64::MIN)),
            [0xFE, 0x08, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
            "i64::MIN is 8 payload bytes"
        );
    }

    #[test]
    fn compact_round_trip() {
        const UNSIGNED: &[u128] = &[0, 1, 127, 128, 300, 16383, 16384, (1 << 49) - 1];
        for &v in UNSIGNED {
            let bytes = unsigned_bytes(v);
            assert_eq!(decode_compact(&bytes, false), v, "unsigned {v}");
        }

        const SIGNED: &[i128] = &[0, 1, -1, 63, 64, -64, -65, 65539, -300_000, 1 << 48, -(1 << 48)];
        for &v in SIGNED {
            let bytes = signed_bytes(v);
            let decoded = decode_compact(&bytes, true) as i128;
            assert_eq!(decoded, v, "signed {v}");
        }
    }

    #[test]
    fn extended_round_trip() {
        const UNSIGNED: &[u128] = &[1 << 49, 0xFFFF_FFFF_FFFF_FFFF, u128::MAX];
        for &v in UNSIGNED {
            let bytes = unsigned_bytes(v);
            assert_eq!(bytes[0], EXTENDED_BYTE, "escape byte for {v}");
            let count = usize::from(bytes[1]);
            let ext = decode_extended(&bytes[2..2 + count], false);
            assert!(ext.fits, "fits for {v}");
            assert_eq!(ext.bits, v, "unsigned {v}");
        }

        const SIGNED: &[i128] =
            &[1 << 49, -(1 << 49), -0x8000_0000_0000_0000, i128::MIN, i128::MAX];
        for &v in SIGNED {
            let bytes = signed_bytes(v);
            let count = usize::from(bytes[1]);
            let ext = decode_extended(&bytes[2..2 + count], true);
            assert!(ext.fits, "fits for {v}");
            let decoded = ext.bits as i128;
            assert_eq!(decoded, v, "signed {v}");
        }
    }

    #[test]
    fn non_canonical_compact_accepted() {
        // 5 in 2 and 3 bytes instead of 1
        assert_eq!(decode_compact(&[0x80, 0x05], false), 5, "2-byte form");
        assert_eq!(decode_compact(&[0xC0, 0x00, 0x05], false), 5, "3-byte form");
        // -1 in a wider form keeps its sign
        let decoded = decode_compact(&[0xBF, 0xFF], true) as i128;
        assert_eq!(decoded, -1, "sign-extended 2-byte form");
    }

    #[test]
    fn extended_padding_rules() {
        // 17 payload bytes with a zero pad byte still fit
        let mut payload = vec![0x00];
        payload.extend_from_slice(&[0xAB; 16]);
        let ext = decode_extended(&payload, false);
        assert!(ext.fits, "zero padding is fine");
        assert_eq!(ext.bits, u128::from_be_bytes([0xAB; 16]), "value kept");

        // non-zero pad byte does not fit
        payload[0] = 0x01;
        let ext = decode_extended(&payload, false);
        assert!(!ext.fits, "non-zero padding overflows");

        // signed: 0xFF padding over a negative value fits
        let mut payload = vec![0xFF; 17];
        payload[16] = 0x00;
        let ext = decode_extended(&payload, true);
        assert!(ext.fits, "sign padding is fine");
        let decoded = ext.bits as i128;
        assert_eq!(decoded, -256, "value kept");

        // signed: zero padding over a value with the top bit set does not fit
        let mut payload = vec![0x00];
        payload.extend_from_slice(&[0x80; 16]);
        let ext = decode_extended(&payload, true);
        assert!(!ext.fits, "positive value beyond i128 overflows");

        // empty payload is zero
        let ext = decode_extended(&[], true);
        assert!(ext.fits, "empty payload fits");
        assert_eq!(ext.bits, 0, "empty payload is zero");
    }

    #[test]
    fn int_narrowing() {
        assert_eq!(u8::from_bits(255), Some(255), "u8 max fits");
        assert_eq!(u8::from_bits(256), None, "u8 overflow");
        assert_eq!(u8::truncate_bits(256), 0, "u8 wraps");
        assert_eq!(i8::from_bits((-128i128) as u128), Some(-128), "i8 min fits");
        assert_eq!(i8::from_bits((-129i128) as u128), None, "i8 underflow");
        assert_eq!(i8::truncate_bits(0x1FF), -1, "i8 wraps to low bits");
        assert_eq!(u32::from_bits(u128::from(u32::MAX)), Some(u32::MAX), "u32 max fits");
        assert_eq!(i64::from_bits(u64::MAX.into()), None, "u64::MAX is not an i64");
        assert_eq!(70_000usize.to_bits(), 70_000, "usize widens");
        assert_eq!(usize::from_bits(70_000), Some(70_000), "usize fits");
        assert_eq!((-70_000isize).to_bits(), (-70_000i128) as u128, "isize sign-extends");
        assert_eq!(isize::from_bits((-70_000i128) as u128), Some(-70_000), "isize fits");
    }
}
