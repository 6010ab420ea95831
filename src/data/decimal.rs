use std::{fmt, str::FromStr};

use bigdecimal::{BigDecimal, ParseBigDecimalError};
use num_traits::{FromPrimitive, Signed, ToPrimitive};

/// Numeric value held in exactly one of the wire-level encodings.
///
/// The encoding a value was built or received with is preserved, so a tree
/// that is decoded and encoded again reproduces the same wire form. Sign and
/// width are always derived from the number itself, never stored.
#[derive(Debug, Clone, PartialEq)]
pub enum Decimal {
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Double(f64),
    /// Arbitrary precision, carried on the wire as a decimal string.
    Big(BigDecimal),
}

impl Decimal {
    /// Parses a plain or scientific decimal string.
    pub fn parse(text: &str) -> Result<Self, ParseBigDecimalError> {
        BigDecimal::from_str(text).map(Self::Big)
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Double(d) if d.is_nan())
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Self::Double(d) if d.is_infinite())
    }

    pub fn is_plus_infinity(&self) -> bool {
        matches!(self, Self::Double(d) if *d == f64::INFINITY)
    }

    pub fn is_minus_infinity(&self) -> bool {
        matches!(self, Self::Double(d) if *d == f64::NEG_INFINITY)
    }

    /// True when the number is negative. NaN has no sign.
    pub fn has_sign(&self) -> bool {
        match self {
            Self::I32(v) => *v < 0,
            Self::I64(v) => *v < 0,
            Self::U32(_) | Self::U64(_) => false,
            Self::Double(d) => *d < 0.0,
            Self::Big(b) => b.is_negative(),
        }
    }

    /// True for finite numbers with a non-zero fractional part.
    pub fn has_fraction(&self) -> bool {
        match self {
            Self::Double(d) => d.is_finite() && d.fract() != 0.0,
            Self::Big(b) => !b.is_integer(),
            _ => false,
        }
    }

    /// True for integers that fit a 32-bit slot of their sign.
    pub fn fits_32(&self) -> bool {
        self.integral()
            .is_some_and(|v| (i128::from(i32::MIN)..=i128::from(u32::MAX)).contains(&v))
    }

    /// True for integers that fit a 64-bit slot of their sign.
    pub fn fits_64(&self) -> bool {
        self.integral()
            .is_some_and(|v| (i128::from(i64::MIN)..=i128::from(u64::MAX)).contains(&v))
    }

    /// Returns the narrowest encoding that represents the same number without loss.
    ///
    /// Negative integers use signed encodings and non-negative integers
    /// unsigned ones. Fractional and non-finite numbers keep their encoding,
    /// and so does negative zero.
    pub fn narrowest(&self) -> Decimal {
        if let Self::Double(d) = self {
            if !d.is_finite() || d.fract() != 0.0 || (*d == 0.0 && d.is_sign_negative()) {
                return self.clone();
            }
        }
        if self.has_fraction() {
            return self.clone();
        }

        match self.integral() {
            Some(v) if v < 0 => i32::try_from(v)
                .map(Self::I32)
                .or_else(|_| i64::try_from(v).map(Self::I64))
                .unwrap_or_else(|_| self.widen()),
            Some(v) => u32::try_from(v)
                .map(Self::U32)
                .or_else(|_| u64::try_from(v).map(Self::U64))
                .unwrap_or_else(|_| self.widen()),
            None => self.widen(),
        }
    }

    /// Arbitrary precision form of the number, `None` for NaN and infinities.
    pub fn to_big_decimal(&self) -> Option<BigDecimal> {
        match self {
            Self::I32(v) => Some(BigDecimal::from(*v)),
            Self::U32(v) => Some(BigDecimal::from(*v)),
            Self::I64(v) => Some(BigDecimal::from(*v)),
            Self::U64(v) => Some(BigDecimal::from(*v)),
            Self::Double(d) => BigDecimal::from_f64(*d),
            Self::Big(b) => Some(b.clone()),
        }
    }

    fn widen(&self) -> Decimal {
        match self {
            Self::Double(_) => self.to_big_decimal().map(Self::Big).unwrap_or_else(|| self.clone()),
            _ => self.clone(),
        }
    }

    fn integral(&self) -> Option<i128> {
        match self {
            Self::I32(v) => Some(i128::from(*v)),
            Self::U32(v) => Some(i128::from(*v)),
            Self::I64(v) => Some(i128::from(*v)),
            Self::U64(v) => Some(i128::from(*v)),
            Self::Double(d) if d.is_finite() && d.fract() == 0.0 && d.abs() < 1.0e38 => {
                Some(*d as i128)
            }
            Self::Double(_) => None,
            Self::Big(b) if b.is_integer() => b
                .to_i64()
                .map(i128::from)
                .or_else(|| b.to_u64().map(i128::from)),
            Self::Big(_) => None,
        }
    }
}

impl From<i32> for Decimal {
    fn from(value: i32) -> Self {
        Self::I32(value)
    }
}

impl From<u32> for Decimal {
    fn from(value: u32) -> Self {
        Self::U32(value)
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<u64> for Decimal {
    fn from(value: u64) -> Self {
        Self::U64(value)
    }
}

impl From<f64> for Decimal {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<BigDecimal> for Decimal {
    fn from(value: BigDecimal) -> Self {
        Self::Big(value)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Big(v) => write!(f, "{v}"),
        }
    }
}
