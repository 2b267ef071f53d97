//! LEB128 alternate integer formats.
//!
//! Little-endian base-128 with a continuation bit per byte, selectable via
//! [`IntFormat`](crate::IntFormat) for interop with streams that predate the
//! native format. Signed values are stored as two's complement groups
//! ([`IntFormat::Leb128`](crate::IntFormat::Leb128)) or zigzag-mapped onto
//! the unsigned encoding
//! ([`IntFormat::Leb128Zigzag`](crate::IntFormat::Leb128Zigzag)).
//!
//! See also: <https://en.wikipedia.org/wiki/LEB128>
//!
//! Values work on 128 bits here and are narrowed by the caller. There is no
//! null representation in either of these formats.

/// Longest token: `ceil(128 / 7)` groups.
pub(crate) const MAX_LEN: usize = 19;

/// Outcome of scanning a buffer for one LEB128 token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Leb {
    /// A full token was present.
    Done {
        /// The low 128 bits, sign-extended when decoded as signed.
        bits: u128,
        /// Token size in bytes.
        len: usize,
        /// Whether the value was representable in 128 bits.
        fits: bool,
    },
    /// The buffer ended before the terminator byte.
    Incomplete,
    /// No terminator within [`MAX_LEN`] bytes.
    TooLong,
}

pub(crate) fn decode_unsigned(buf: &[u8]) -> Leb {
    let mut bits = 0u128;
    for (i, &b) in buf.iter().take(MAX_LEN).enumerate() {
        let shift = 7 * i as u32;
        let group = u128::from(b & 0x7F);
        bits |= group << shift;

        if b < 0x80 {
            // only the 19th group can spill past 128 bits
            let spill = (shift + 7).saturating_sub(128);
            let fits = spill == 0 || (group >> (7 - spill)) == 0;
            return Leb::Done { bits, len: i + 1, fits };
        }
    }

    if buf.len() >= MAX_LEN { Leb::TooLong } else { Leb::Incomplete }
}

pub(crate) fn decode_signed(buf: &[u8]) -> Leb {
    let mut bits = 0u128;
    for (i, &b) in buf.iter().take(MAX_LEN).enumerate() {
        let shift = 7 * i as u32;
        let group = u128::from(b & 0x7F);
        bits |= group << shift;

        if b < 0x80 {
            let negative = (b & 0x40) != 0;
            let spill = (shift + 7).saturating_sub(128);
            let fits = if spill == 0 {
                true
            } else {
                // spilled bits must repeat the sign
                let fill = if negative { (1 << spill) - 1 } else { 0 };
                (group >> (7 - spill)) == fill
            };

            let used = (shift + 7).min(128);
            if negative && used < 128 {
                bits |= u128::MAX << used;
            }
            return Leb::Done { bits, len: i + 1, fits };
        }
    }

    if buf.len() >= MAX_LEN { Leb::TooLong } else { Leb::Incomplete }
}

pub(crate) fn encode_unsigned(mut value: u128, out: &mut [u8; MAX_LEN]) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        out[i] = trunc_u8(value) | 0x80;
        value >>= 7;
        i += 1;
    }

    out[i] = trunc_u8(value);
    i + 1
}

pub(crate) fn encode_signed(mut value: i128, out: &mut [u8; MAX_LEN]) -> usize {
    let mut i = 0;
    loop {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let byte = (value & 0x7F) as u8;
        value >>= 7;

        let done = (value == 0 && (byte & 0x40) == 0) || (value == -1 && (byte & 0x40) != 0);
        out[i] = if done { byte } else { byte | 0x80 };
        i += 1;
        if done {
            return i;
        }
    }
}

/// Maps a signed value onto the unsigned encoding so that small magnitudes
/// of either sign stay short.
pub(crate) fn zigzag(value: i128) -> u128 {
    #[allow(clippy::cast_sign_loss)]
    let mut x = (value as u128) << 1;
    if value < 0 {
        x = !x;
    }
    x
}

pub(crate) fn unzigzag(value: u128) -> i128 {
    let mut x = value >> 1;
    if (value & 1) != 0 {
        x = !x;
    }
    #[allow(clippy::cast_possible_wrap)]
    {
        x as i128
    }
}

#[allow(clippy::cast_possible_truncation)]
fn trunc_u8(value: u128) -> u8 {
    value as u8
}

#[cfg(test)]
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
mod tests {
    use super::*;

    fn unsigned_bytes(value: u128) -> Vec<u8> {
        let mut buf = [0; MAX_LEN];
        let len = encode_unsigned(value, &mut buf);
        buf[..len].to_vec()
    }

    fn signed_bytes(value: i128) -> Vec<u8> {
        let mut buf = [0; MAX_LEN];
        let len = encode_signed(value, &mut buf);
        buf[..len].to_vec()
    }

    macro_rules! round_trip {
        ($fn_name:ident, unsigned, $values:expr) => {
            #[test]
            fn $fn_name() {
                const VALUES: &[u128] = &$values;
                for &v in VALUES {
                    let bytes = unsigned_bytes(v);
                    let Leb::Done { bits, len, fits } = decode_unsigned(&bytes) else {
                        panic!("incomplete decode of {v}");
                    };
                    assert_eq!(bits, v, "value {v}");
                    assert_eq!(len, bytes.len(), "length for {v}");
                    assert!(fits, "fits for {v}");
                }
            }
        };
        ($fn_name:ident, signed, $values:expr) => {
            #[test]
            fn $fn_name() {
                const VALUES: &[i128] = &$values;
                for &v in VALUES {
                    let bytes = signed_bytes(v);
                    let Leb::Done { bits, len, fits } = decode_signed(&bytes) else {
                        panic!("incomplete decode of {v}");
                    };
                    assert_eq!(bits as i128, v, "value {v}");
                    assert_eq!(len, bytes.len(), "length for {v}");
                    assert!(fits, "fits for {v}");
                }
            }
        };
    }

    round_trip!(round_trip_unsigned, unsigned, [0, 1, 127, 128, 500, 624_485, u128::MAX]);
    round_trip!(
        round_trip_signed,
        signed,
        [0, 1, -1, 63, 64, -64, -65, -123_456, i128::MIN, i128::MAX]
    );

    #[test]
    fn known_vectors() {
        assert_eq!(unsigned_bytes(624_485), [0xE5, 0x8E, 0x26], "DWARF example");
        assert_eq!(signed_bytes(-123_456), [0xC0, 0xBB, 0x78], "DWARF signed example");
        assert_eq!(unsigned_bytes(0), [0x00], "zero");
        assert_eq!(signed_bytes(-1), [0x7F], "minus one");
    }

    #[test]
    fn non_canonical_accepted() {
        let r = decode_unsigned(&[0x80, 0x80, 0x00]);
        assert_eq!(r, Leb::Done { bits: 0, len: 3, fits: true }, "over-long zero");

        let r = decode_signed(&[0xFF, 0x7F]);
        assert_eq!(r, Leb::Done { bits: (-1i128) as u128, len: 2, fits: true }, "over-long -1");
    }

    #[test]
    fn incomplete_and_too_long() {
        assert_eq!(decode_unsigned(&[0x80, 0x80]), Leb::Incomplete, "missing terminator");
        assert_eq!(decode_unsigned(&[0x80; MAX_LEN]), Leb::TooLong, "19 continuations");
        assert_eq!(decode_signed(&[0x80; MAX_LEN + 4]), Leb::TooLong, "way too long");
    }

    #[test]
    fn spilled_bits_detected() {
        // 19 groups; the final group starts at bit 126, so 0x04 lands on
        // bit 128 and is lost
        let mut buf = [0x80; MAX_LEN];
        buf[MAX_LEN - 1] = 0x04;
        let Leb::Done { fits, .. } = decode_unsigned(&buf) else {
            panic!("expected a full token");
        };
        assert!(!fits, "spilled bit must be flagged");

        // u128::MAX uses the full final group legally
        let bytes = unsigned_bytes(u128::MAX);
        assert_eq!(bytes.len(), MAX_LEN, "max length encoding");
    }

    #[test]
    fn zigzag_mapping() {
        assert_eq!(zigzag(0), 0, "zero");
        assert_eq!(zigzag(-1), 1, "first negative");
        assert_eq!(zigzag(1), 2, "first positive");
        assert_eq!(zigzag(-2), 3, "second negative");
        assert_eq!(zigzag(i128::MIN), u128::MAX, "min maps to max");

        const VALUES: &[i128] = &[0, 1, -1, 500, -500, i128::MIN, i128::MAX];
        for &v in VALUES {
            assert_eq!(unzigzag(zigzag(v)), v, "round trip {v}");
        }
    }
}
