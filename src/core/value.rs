//! Parameter values
//!
//! [`SqlValue`] is the closed set of values a command can bind, independent of
//! any driver's native parameter type. [`FromSqlValue`] is the read side used
//! by rows and scalar results.

use super::error::ConversionError;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M:%S%.f";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATETIME_FORMAT_ISO: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Value bound to a command parameter
///
/// Exactly one variant is active. `Null` is the explicit absent marker;
/// optional inputs map to it through `From<Option<T>>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Unsigned 8-bit integer
    TinyInt(u8),
    /// 16-bit integer
    SmallInt(i16),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    BigInt(i64),
    /// Fixed-point decimal
    Decimal(Decimal),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// Single character
    Char(char),
    /// String value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// Date and time without offset
    DateTime(NaiveDateTime),
    /// Date and time with a UTC offset
    DateTimeOffset(DateTime<FixedOffset>),
    /// Unique identifier
    Uuid(Uuid),
}

impl SqlValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Get the value as a string slice (String values only)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::TinyInt(_) => "tinyint",
            SqlValue::SmallInt(_) => "smallint",
            SqlValue::Int(_) => "int",
            SqlValue::BigInt(_) => "bigint",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Float(_) => "float",
            SqlValue::Double(_) => "double",
            SqlValue::Char(_) => "char",
            SqlValue::String(_) => "string",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
            SqlValue::DateTime(_) => "datetime",
            SqlValue::DateTimeOffset(_) => "datetimeoffset",
            SqlValue::Uuid(_) => "uuid",
        }
    }

    /// Read the value as `T`
    pub fn get<T: FromSqlValue>(&self) -> Result<T, ConversionError> {
        T::from_sql_value(self)
    }

    fn mismatch(&self, expected: &'static str) -> ConversionError {
        ConversionError::new(expected, self.type_name())
    }

    /// Integer payload of any integer variant
    fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::TinyInt(v) => Some(i64::from(*v)),
            SqlValue::SmallInt(v) => Some(i64::from(*v)),
            SqlValue::Int(v) => Some(i64::from(*v)),
            SqlValue::BigInt(v) => Some(*v),
            _ => None,
        }
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    SqlValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    u8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    Decimal => Decimal,
    f32 => Float,
    f64 => Double,
    char => Char,
    String => String,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    Uuid => Uuid,
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<&[u8]> for SqlValue {
    fn from(v: &[u8]) -> Self {
        SqlValue::Bytes(v.to_vec())
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::DateTimeOffset(v.fixed_offset())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => SqlValue::Null,
        }
    }
}

/// Fixed-point decimal: `mantissa * 10^-scale`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: i128,
    scale: u8,
}

impl Decimal {
    /// Largest supported scale
    pub const MAX_SCALE: u8 = 38;

    /// Create a decimal from its mantissa and scale
    ///
    /// # Panics
    ///
    /// Panics if `scale` exceeds [`Decimal::MAX_SCALE`]. Use
    /// [`Decimal::try_new`] for scales that come from outside the program.
    pub fn new(mantissa: i128, scale: u8) -> Self {
        assert!(scale <= Self::MAX_SCALE, "decimal scale {scale} out of range");
        Self { mantissa, scale }
    }

    /// Create a decimal, rejecting scales above [`Decimal::MAX_SCALE`]
    pub fn try_new(mantissa: i128, scale: u8) -> Result<Self, ConversionError> {
        if scale > Self::MAX_SCALE {
            return Err(ConversionError::new(
                "decimal",
                format!("scale {scale} out of range"),
            ));
        }
        Ok(Self { mantissa, scale })
    }

    /// Unscaled integer value
    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    /// Number of digits after the decimal point
    pub fn scale(&self) -> u8 {
        self.scale
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Self::new(i128::from(v), 0)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let scale = usize::from(self.scale);
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let digits = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
        } else {
            digits
        };
        let (int, frac) = digits.split_at(digits.len() - scale);
        write!(f, "{sign}{int}.{frac}")
    }
}

impl FromStr for Decimal {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConversionError::new("decimal", format!("'{s}'"));
        let trimmed = s.trim();
        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if int.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !int.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let scale = u8::try_from(frac.len())
            .ok()
            .filter(|scale| *scale <= Self::MAX_SCALE)
            .ok_or_else(invalid)?;
        let magnitude: i128 = format!("{int}{frac}").parse().map_err(|_| invalid())?;
        let mantissa = if negative { -magnitude } else { magnitude };
        Ok(Self { mantissa, scale })
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Conversion from a [`SqlValue`] read back from a driver
///
/// Conversions are strict: a string is never read as a number. The only
/// accepted cross-variant reads are the storage normalizations drivers
/// perform (integers widened to 64 bits, decimals and dates stored as text,
/// identifiers stored as text or 16-byte blobs).
pub trait FromSqlValue: Sized {
    /// Convert the value, or report why it cannot be read as `Self`
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError>;
}

impl FromSqlValue for SqlValue {
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Bool(v) => Ok(*v),
            other => match other.as_i64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(other.mismatch("bool")),
            },
        }
    }
}

macro_rules! impl_from_sql_value_int {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromSqlValue for $ty {
                fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
                    let wide = value.as_i64().ok_or_else(|| value.mismatch($name))?;
                    <$ty>::try_from(wide)
                        .map_err(|_| ConversionError::new($name, format!("out of range value {wide}")))
                }
            }
        )*
    };
}

impl_from_sql_value_int! {
    u8 => "u8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Double(v) => Ok(*v),
            SqlValue::Float(v) => Ok(f64::from(*v)),
            other => Err(other.mismatch("f64")),
        }
    }
}

impl FromSqlValue for f32 {
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Float(v) => Ok(*v),
            SqlValue::Double(v) => Ok(*v as f32),
            other => Err(other.mismatch("f32")),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::String(s) => Ok(s.clone()),
            SqlValue::Char(c) => Ok(c.to_string()),
            other => Err(other.mismatch("string")),
        }
    }
}

impl FromSqlValue for char {
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Char(c) => Ok(*c),
            SqlValue::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(ConversionError::new("char", format!("string of length {}", s.chars().count()))),
                }
            }
            other => Err(other.mismatch("char")),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Bytes(b) => Ok(b.clone()),
            other => Err(other.mismatch("bytes")),
        }
    }
}

impl FromSqlValue for Decimal {
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Decimal(d) => Ok(*d),
            SqlValue::String(s) => s.parse(),
            other => other
                .as_i64()
                .map(Decimal::from)
                .ok_or_else(|| other.mismatch("decimal")),
        }
    }
}

fn parse_text<T>(
    value: &SqlValue,
    expected: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, ConversionError> {
    match value {
        SqlValue::String(s) => {
            parse(s).ok_or_else(|| ConversionError::new(expected, format!("'{s}'")))
        }
        other => Err(other.mismatch(expected)),
    }
}

impl FromSqlValue for NaiveDate {
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Date(d) => Ok(*d),
            other => parse_text(other, "date", |s| {
                NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
            }),
        }
    }
}

impl FromSqlValue for NaiveTime {
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Time(t) => Ok(*t),
            other => parse_text(other, "time", |s| {
                NaiveTime::parse_from_str(s, TIME_FORMAT).ok()
            }),
        }
    }
}

impl FromSqlValue for NaiveDateTime {
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::DateTime(dt) => Ok(*dt),
            other => parse_text(other, "datetime", |s| {
                NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                    .or_else(|_| NaiveDateTime::parse_from_str(s, DATETIME_FORMAT_ISO))
                    .ok()
            }),
        }
    }
}

impl FromSqlValue for DateTime<FixedOffset> {
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::DateTimeOffset(dt) => Ok(*dt),
            other => parse_text(other, "datetimeoffset", |s| {
                DateTime::parse_from_rfc3339(s).ok()
            }),
        }
    }
}

impl FromSqlValue for Uuid {
    fn from_sql_value(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Uuid(id) => Ok(*id),
            SqlValue::Bytes(b) => Uuid::from_slice(b)
                .map_err(|_| ConversionError::new("uuid", format!("{} bytes", b.len()))),
            other => parse_text(other, "uuid", |s| Uuid::parse_str(s).ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from_types() {
        let val: SqlValue = 42.into();
        assert_eq!(val, SqlValue::Int(42));

        let val: SqlValue = "hello".into();
        assert_eq!(val, SqlValue::String("hello".to_string()));

        let val: SqlValue = 7u8.into();
        assert_eq!(val, SqlValue::TinyInt(7));

        let val: SqlValue = Some(42i64).into();
        assert_eq!(val, SqlValue::BigInt(42));

        let val: SqlValue = Option::<String>::None.into();
        assert_eq!(val, SqlValue::Null);
    }

    #[test]
    fn test_value_type_name() {
        assert_eq!(SqlValue::Null.type_name(), "null");
        assert_eq!(SqlValue::Bool(true).type_name(), "bool");
        assert_eq!(SqlValue::Int(42).type_name(), "int");
        assert_eq!(SqlValue::BigInt(42).type_name(), "bigint");
        assert_eq!(SqlValue::from(Uuid::nil()).type_name(), "uuid");
    }

    #[test]
    fn test_integer_reads_check_range() {
        assert_eq!(SqlValue::BigInt(300).get::<i32>(), Ok(300));
        assert_eq!(SqlValue::TinyInt(9).get::<i64>(), Ok(9));
        assert!(SqlValue::BigInt(300).get::<u8>().is_err());
        assert!(SqlValue::BigInt(i64::MAX).get::<i32>().is_err());
    }

    #[test]
    fn test_reads_never_coerce_strings_to_numbers() {
        let err = SqlValue::String("42".to_string()).get::<i32>().unwrap_err();
        assert_eq!(err.expected, "i32");
        assert_eq!(err.actual, "string");

        assert!(SqlValue::Int(42).get::<String>().is_err());
    }

    #[test]
    fn test_option_reads_null() {
        assert_eq!(SqlValue::Null.get::<Option<i32>>(), Ok(None));
        assert_eq!(SqlValue::Int(5).get::<Option<i32>>(), Ok(Some(5)));
        assert!(SqlValue::Null.get::<i32>().is_err());
    }

    #[test]
    fn test_bool_from_integer_storage() {
        assert_eq!(SqlValue::BigInt(1).get::<bool>(), Ok(true));
        assert_eq!(SqlValue::BigInt(0).get::<bool>(), Ok(false));
        assert!(SqlValue::BigInt(2).get::<bool>().is_err());
    }

    #[test]
    fn test_decimal_display_and_parse() {
        assert_eq!(Decimal::new(12345, 2).to_string(), "123.45");
        assert_eq!(Decimal::new(-5, 2).to_string(), "-0.05");
        assert_eq!(Decimal::new(7, 0).to_string(), "7");

        let d: Decimal = "-12.340".parse().unwrap();
        assert_eq!(d.mantissa(), -12340);
        assert_eq!(d.scale(), 3);

        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("abc".parse::<Decimal>().is_err());
        assert!(".".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_decimal_try_new_checks_scale() {
        let d = Decimal::try_new(-7, Decimal::MAX_SCALE).unwrap();
        assert_eq!(d.scale(), Decimal::MAX_SCALE);
        assert_eq!(d, Decimal::new(-7, Decimal::MAX_SCALE));

        let err = Decimal::try_new(1, Decimal::MAX_SCALE + 1).unwrap_err();
        assert!(err.to_string().contains("scale 39 out of range"));
        assert!(Decimal::try_new(1, u8::MAX).is_err());
    }

    #[test]
    fn test_text_storage_reads() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(SqlValue::String("2024-02-29".into()).get::<NaiveDate>(), Ok(date));

        let id = Uuid::new_v4();
        assert_eq!(SqlValue::String(id.to_string()).get::<Uuid>(), Ok(id));
        assert_eq!(SqlValue::Bytes(id.as_bytes().to_vec()).get::<Uuid>(), Ok(id));

        let d = SqlValue::String("3.50".into()).get::<Decimal>().unwrap();
        assert_eq!(d, Decimal::new(350, 2));
    }

    #[test]
    fn test_decimal_serializes_as_text() {
        let json = serde_json::to_string(&Decimal::new(150, 2)).unwrap();
        assert_eq!(json, "\"1.50\"");
        let back: Decimal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Decimal::new(150, 2));
    }
}
