//! A 128-bit base-10 decimal value.

use std::fmt;

/// The 16-byte null sentinel used on the wire in place of a value.
pub(crate) const NULL_BYTES: [u8; 16] = [0xFF; 16];

/// A base-10 decimal with a 96-bit mantissa, in the layout used by CLR
/// `System.Decimal` and various database drivers.
///
/// The value is `mantissa / 10^scale`, negated when the sign is set. The
/// type only carries such values through the wire format losslessly; it
/// does no arithmetic, and equality is part-wise, so `1.0` and `1.00`
/// compare unequal just like their wire forms do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: u128,
    scale: u8,
    negative: bool,
}

impl Decimal {
    /// The value `0`.
    pub const ZERO: Self = Self { mantissa: 0, scale: 0, negative: false };

    /// Largest representable scale.
    pub const MAX_SCALE: u8 = 28;

    /// Largest representable mantissa, one below `2^96`.
    pub const MAX_MANTISSA: u128 = (1 << 96) - 1;

    /// Creates a decimal from its parts.
    ///
    /// Returns [`None`] when the mantissa exceeds 96 bits or the scale
    /// exceeds [`Self::MAX_SCALE`].
    pub fn new(mantissa: u128, scale: u8, negative: bool) -> Option<Self> {
        if mantissa > Self::MAX_MANTISSA || scale > Self::MAX_SCALE {
            return None;
        }

        Some(Self { mantissa, scale, negative })
    }

    /// The raw 96-bit mantissa.
    pub fn mantissa(&self) -> u128 {
        self.mantissa
    }

    /// The base-10 scale the mantissa is divided by, 0 to 28.
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Whether the sign is set. A zero mantissa may still carry a sign.
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// The little-endian wire layout: 12 mantissa bytes, 2 reserved zero
    /// bytes, the scale, the sign byte.
    pub(crate) fn to_bytes(self) -> [u8; 16] {
        let mut out = [0; 16];
        out[..12].copy_from_slice(&self.mantissa.to_le_bytes()[..12]);
        out[14] = self.scale;
        out[15] = if self.negative { 0x80 } else { 0x00 };
        out
    }

    /// Parses the wire layout. Returns [`None`] when the reserved bytes
    /// are non-zero, the scale is out of range, or the sign byte is not
    /// `0x00`/`0x80`.
    pub(crate) fn from_bytes(bytes: [u8; 16]) -> Option<Self> {
        let negative = match bytes[15] {
            0x00 => false,
            0x80 => true,
            _ => return None,
        };

        let scale = bytes[14];
        if bytes[12] != 0 || bytes[13] != 0 || scale > Self::MAX_SCALE {
            return None;
        }

        let mut mantissa = [0; 16];
        mantissa[..12].copy_from_slice(&bytes[..12]);
        Some(Self { mantissa: u128::from_le_bytes(mantissa), scale, negative })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative && self.mantissa != 0 {
            f.write_str("-")?;
        }

        let digits = self.mantissa.to_string();
        let scale = usize::from(self.scale);
        if scale == 0 {
            f.write_str(&digits)
        } else if let Some(point) = digits.len().checked_sub(scale).filter(|&p| p > 0) {
            write!(f, "{}.{}", &digits[..point], &digits[point..])
        } else {
            write!(f, "0.{digits:0>scale$}")
        }
    }
}

macro_rules! impl_from_unsigned {
    ($($Ty:ty)*) => { $(
        impl From<$Ty> for Decimal {
            fn from(value: $Ty) -> Self {
                Self { mantissa: u128::from(value), scale: 0, negative: false }
            }
        }
    )* };
}

macro_rules! impl_from_signed {
    ($($Ty:ty)*) => { $(
        impl From<$Ty> for Decimal {
            fn from(value: $Ty) -> Self {
                Self {
                    mantissa: i128::from(value).unsigned_abs(),
                    scale: 0,
                    negative: value < 0,
                }
            }
        }
    )* };
}

impl_from_unsigned!(u8 u16 u32 u64);
impl_from_signed!(i8 i16 i32 i64);
