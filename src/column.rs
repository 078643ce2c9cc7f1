//! Column descriptors and the small value objects that drive grid operations.

use std::{collections::HashMap, fmt, str::FromStr};

use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};

use crate::error::{ColumnError, GridError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Boolean,
    Short,
    Int,
    Long,
    Float,
    Double,
    Date,
    Time,
    DateTime,
    BigInteger,
    BigDecimal,
}

impl ColumnType {
    pub const ALL: [ColumnType; 12] = [
        ColumnType::Text,
        ColumnType::Boolean,
        ColumnType::Short,
        ColumnType::Int,
        ColumnType::Long,
        ColumnType::Float,
        ColumnType::Double,
        ColumnType::Date,
        ColumnType::Time,
        ColumnType::DateTime,
        ColumnType::BigInteger,
        ColumnType::BigDecimal,
    ];

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnType::Short
                | ColumnType::Int
                | ColumnType::Long
                | ColumnType::Float
                | ColumnType::Double
                | ColumnType::BigInteger
                | ColumnType::BigDecimal
        )
    }

    /// Types whose values carry a fractional part that rounding applies to.
    pub fn is_fractional(self) -> bool {
        matches!(
            self,
            ColumnType::Float | ColumnType::Double | ColumnType::BigDecimal
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Short => "short",
            ColumnType::Int => "int",
            ColumnType::Long => "long",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::DateTime => "datetime",
            ColumnType::BigInteger => "biginteger",
            ColumnType::BigDecimal => "bigdecimal",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = GridError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        let ty = match lowered.as_str() {
            "text" | "string" | "str" => ColumnType::Text,
            "boolean" | "bool" => ColumnType::Boolean,
            "short" | "i16" => ColumnType::Short,
            "int" | "integer" | "i32" => ColumnType::Int,
            "long" | "i64" => ColumnType::Long,
            "float" | "f32" => ColumnType::Float,
            "double" | "f64" | "number" => ColumnType::Double,
            "date" => ColumnType::Date,
            "time" => ColumnType::Time,
            "datetime" | "date-time" | "timestamp" => ColumnType::DateTime,
            "biginteger" | "bigint" => ColumnType::BigInteger,
            "bigdecimal" | "decimal" => ColumnType::BigDecimal,
            _ => {
                return Err(GridError::InvalidArgument(format!(
                    "Unknown column type '{value}'"
                )));
            }
        };
        Ok(ty)
    }
}

/// A named field together with the type it should be read or rendered as.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn double(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Double)
    }

    pub fn long(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Long)
    }

    /// Parses `name` or `name:type`.
    pub fn parse(spec: &str) -> Result<Self, GridError> {
        let (name, ty) = match spec.rsplit_once(':') {
            Some((name, ty)) => (name.trim(), ty.parse()?),
            None => (spec.trim(), ColumnType::Text),
        };
        if name.is_empty() {
            return Err(GridError::InvalidArgument(format!(
                "Column specification '{spec}' is missing a name"
            )));
        }
        Ok(Column::new(name, ty))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.ty)
    }
}

/// Ordered column names with a name to position lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Header {
    pub fn new(names: Vec<String>) -> Result<Self, GridError> {
        if names.is_empty() {
            return Err(GridError::EmptyDataset);
        }
        let mut positions = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            if positions.insert(name.clone(), idx).is_some() {
                return Err(GridError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self { names, positions })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn position(&self, name: &str) -> Result<usize, ColumnError> {
        self.positions
            .get(name)
            .copied()
            .ok_or_else(|| ColumnError::NotFound(name.to_string()))
    }

    /// Positions of the contiguous block `from..=to`, in either direction.
    pub fn range(&self, from: &str, to: &str) -> Result<Vec<usize>, ColumnError> {
        let start = self.position(from)?;
        let end = self.position(to)?;
        let (low, high) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };
        Ok((low..=high).collect())
    }
}

/// One sort key: the column to compare and its direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sorting {
    pub column: Column,
    pub ascending: bool,
}

impl Sorting {
    pub fn asc(column: Column) -> Self {
        Self {
            column,
            ascending: true,
        }
    }

    pub fn desc(column: Column) -> Self {
        Self {
            column,
            ascending: false,
        }
    }

    /// Parses `column[:type][:asc|desc]`.
    pub fn parse(spec: &str) -> Result<Self, GridError> {
        let mut parts = spec.split(':').map(str::trim);
        let name = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GridError::InvalidArgument("Sort directive is missing a column".into()))?;
        let mut ty = ColumnType::Text;
        let mut ascending = true;
        for part in parts {
            match part.to_ascii_lowercase().as_str() {
                "asc" => ascending = true,
                "desc" => ascending = false,
                other => ty = other.parse()?,
            }
        }
        Ok(Sorting {
            column: Column::new(name, ty),
            ascending,
        })
    }
}

/// Placement of a new or joined column relative to a reference column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Before,
    #[default]
    After,
    Replace,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoundingMode {
    #[default]
    HalfUp,
    HalfDown,
    HalfEven,
    Up,
    Down,
    Ceiling,
    Floor,
}

impl RoundingMode {
    pub fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingMode::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::HalfDown => RoundingStrategy::MidpointTowardZero,
            RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
            RoundingMode::Up => RoundingStrategy::AwayFromZero,
            RoundingMode::Down => RoundingStrategy::ToZero,
            RoundingMode::Ceiling => RoundingStrategy::ToPositiveInfinity,
            RoundingMode::Floor => RoundingStrategy::ToNegativeInfinity,
        }
    }
}

/// Decimal precision applied to fractional results before they are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rounding {
    pub decimals: u32,
    pub mode: RoundingMode,
}

impl Rounding {
    pub fn new(decimals: u32, mode: RoundingMode) -> Self {
        Self { decimals, mode }
    }

    pub fn half_up(decimals: u32) -> Self {
        Self::new(decimals, RoundingMode::HalfUp)
    }
}
