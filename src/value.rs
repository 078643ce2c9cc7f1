use std::{cmp::Ordering, fmt};

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};
use serde::{Deserialize, Serialize};

use crate::column::ColumnType;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// A typed cell produced by an input converter.
///
/// Equality follows the ordering: numbers of different widths that hold the
/// same quantity are equal, and a `NaN` equals itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Boolean(bool),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    BigInteger(i128),
    BigDecimal(Decimal),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Value {
    /// The zero substituted for empty numeric fields.
    pub fn zero(ty: ColumnType) -> Option<Value> {
        let zero = match ty {
            ColumnType::Short => Value::Short(0),
            ColumnType::Int => Value::Int(0),
            ColumnType::Long => Value::Long(0),
            ColumnType::Float => Value::Float(0.0),
            ColumnType::Double => Value::Double(0.0),
            ColumnType::BigInteger => Value::BigInteger(0),
            ColumnType::BigDecimal => Value::BigDecimal(Decimal::ZERO),
            _ => return None,
        };
        Some(zero)
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Text(_) => ColumnType::Text,
            Value::Boolean(_) => ColumnType::Boolean,
            Value::Short(_) => ColumnType::Short,
            Value::Int(_) => ColumnType::Int,
            Value::Long(_) => ColumnType::Long,
            Value::Float(_) => ColumnType::Float,
            Value::Double(_) => ColumnType::Double,
            Value::Date(_) => ColumnType::Date,
            Value::Time(_) => ColumnType::Time,
            Value::DateTime(_) => ColumnType::DateTime,
            Value::BigInteger(_) => ColumnType::BigInteger,
            Value::BigDecimal(_) => ColumnType::BigDecimal,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.column_type().is_numeric()
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Short(v) => Some(f64::from(*v)),
            Value::Int(v) => Some(f64::from(*v)),
            Value::Long(v) => Some(*v as f64),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::BigInteger(v) => Some(*v as f64),
            Value::BigDecimal(v) => v.to_f64(),
            _ => None,
        }
    }

    /// Integral view of the value; fractional numbers must have no fraction.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Short(v) => Some(i128::from(*v)),
            Value::Int(v) => Some(i128::from(*v)),
            Value::Long(v) => Some(i128::from(*v)),
            Value::BigInteger(v) => Some(*v),
            Value::Float(_) | Value::Double(_) => self
                .as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i128),
            Value::BigDecimal(d) if d.fract().is_zero() => d.to_i128(),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::BigDecimal(d) => Some(*d),
            Value::Short(_) | Value::Int(_) | Value::Long(_) | Value::BigInteger(_) => {
                self.as_i128().and_then(Decimal::from_i128)
            }
            // Shortest round-trip text keeps 0.1 as 0.1 rather than its binary expansion.
            Value::Float(f) => f.to_string().parse().ok(),
            Value::Double(f) => f.to_string().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Boolean(_) => 0,
            v if v.is_numeric() => 1,
            Value::Date(_) => 2,
            Value::Time(_) => 3,
            Value::DateTime(_) => 4,
            _ => 5,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::BigDecimal(a), Value::BigDecimal(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => match (a.as_i128(), b.as_i128()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x.total_cmp(&y),
                    _ => Ordering::Equal,
                },
            },
            (a, b) => a.kind_rank().cmp(&b.kind_rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::BigInteger(v) => write!(f, "{v}"),
            Value::BigDecimal(d) => write!(f, "{d}"),
        }
    }
}

/// Sort key wrapper: a missing key orders before every present one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparableValue(pub Option<Value>);

impl Ord for ComparableValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.0, &other.0) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(left), Some(right)) => left.cmp(right),
        }
    }
}

impl PartialOrd for ComparableValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_time(value: &str) -> Result<NaiveTime> {
    let trimmed = value.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| anyhow!("Failed to parse '{value}' as time"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    for date_fmt in DATE_FORMATS {
        for separator in [" ", "T"] {
            for time_fmt in TIME_FORMATS {
                let fmt = format!("{date_fmt}{separator}{time_fmt}");
                if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, &fmt) {
                    return Ok(parsed);
                }
            }
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

/// Whether `value` reads as a number at all, independent of the target width.
pub fn looks_numeric(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && (trimmed.parse::<f64>().is_ok() || trimmed.parse::<Decimal>().is_ok())
}

pub fn normalize_column_name(name: &str) -> String {
    let mut normalized = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => c,
            _ => '_',
        })
        .collect::<String>()
        .to_ascii_lowercase();
    if normalized.is_empty() {
        normalized.push_str("column");
    } else if normalized.starts_with(|c: char| c.is_ascii_digit()) {
        normalized.insert(0, '_');
    }
    normalized
}

pub(crate) fn decimal_from_f64(value: f64) -> Option<Decimal> {
    value
        .to_string()
        .parse()
        .ok()
        .or_else(|| Decimal::from_f64(value))
}
