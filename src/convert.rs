//! Converter registry: raw text to typed [`Value`] and back, keyed by [`ColumnType`].
//!
//! Every typed read in the grid goes through an input converter and every
//! derived value written back goes through an output converter. Defaults are
//! registered for all column types; callers may replace any entry before a
//! grid is built. For each default entry `input(output(v)) == v`.

use std::{collections::HashMap, fmt, rc::Rc};

use rust_decimal::Decimal;

use crate::{
    column::ColumnType,
    error::{ColumnError, ConversionError, FieldError},
    value::{Value, decimal_from_f64, parse_naive_date, parse_naive_datetime, parse_naive_time},
};

pub type InputConverter = Rc<dyn Fn(&str) -> Result<Value, ConversionError>>;
pub type OutputConverter = Rc<dyn Fn(&Value) -> Result<String, ConversionError>>;

#[derive(Clone)]
pub struct ConverterRegistry {
    inputs: HashMap<ColumnType, InputConverter>,
    outputs: HashMap<ColumnType, OutputConverter>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut inputs = self.inputs.keys().map(|ty| ty.as_str()).collect::<Vec<_>>();
        let mut outputs = self.outputs.keys().map(|ty| ty.as_str()).collect::<Vec<_>>();
        inputs.sort_unstable();
        outputs.sort_unstable();
        f.debug_struct("ConverterRegistry")
            .field("inputs", &inputs)
            .field("outputs", &outputs)
            .finish()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for ty in ColumnType::ALL {
            registry.register_input(ty, move |raw| default_input(ty, raw));
            registry.register_output(ty, move |value| default_output(ty, value));
        }
        registry
    }
}

impl ConverterRegistry {
    /// A registry with no entries at all.
    pub fn empty() -> Self {
        Self {
            inputs: HashMap::new(),
            outputs: HashMap::new(),
        }
    }

    pub fn register_input<F>(&mut self, ty: ColumnType, converter: F) -> &mut Self
    where
        F: Fn(&str) -> Result<Value, ConversionError> + 'static,
    {
        self.inputs.insert(ty, Rc::new(converter));
        self
    }

    pub fn register_output<F>(&mut self, ty: ColumnType, converter: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<String, ConversionError> + 'static,
    {
        self.outputs.insert(ty, Rc::new(converter));
        self
    }

    pub fn supports(&self, ty: ColumnType) -> bool {
        self.inputs.contains_key(&ty) && self.outputs.contains_key(&ty)
    }

    /// Converts `raw` with the input converter for `ty`.
    ///
    /// With `missing_as_zero`, empty text for a numeric type yields the type's
    /// zero without consulting the converter.
    pub fn parse(&self, ty: ColumnType, raw: &str, missing_as_zero: bool) -> Result<Value, FieldError> {
        let converter = self
            .inputs
            .get(&ty)
            .ok_or(ColumnError::TypeUnsupported(ty))?;
        if missing_as_zero && raw.trim().is_empty() {
            if let Some(zero) = Value::zero(ty) {
                return Ok(zero);
            }
        }
        Ok(converter(raw)?)
    }

    pub fn render(&self, ty: ColumnType, value: &Value) -> Result<String, FieldError> {
        let converter = self
            .outputs
            .get(&ty)
            .ok_or(ColumnError::TypeUnsupported(ty))?;
        Ok(converter(value)?)
    }
}

fn parse_error(raw: &str, ty: ColumnType, reason: impl fmt::Display) -> ConversionError {
    ConversionError::new(raw, ty, reason.to_string())
}

fn default_input(ty: ColumnType, raw: &str) -> Result<Value, ConversionError> {
    let trimmed = raw.trim();
    let value = match ty {
        ColumnType::Text => Value::Text(raw.to_string()),
        ColumnType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Value::Boolean(true),
            "false" | "f" | "no" | "n" | "0" => Value::Boolean(false),
            _ => return Err(parse_error(raw, ty, "not a boolean")),
        },
        ColumnType::Short => Value::Short(trimmed.parse().map_err(|e| parse_error(raw, ty, e))?),
        ColumnType::Int => Value::Int(trimmed.parse().map_err(|e| parse_error(raw, ty, e))?),
        ColumnType::Long => Value::Long(trimmed.parse().map_err(|e| parse_error(raw, ty, e))?),
        ColumnType::Float => Value::Float(trimmed.parse().map_err(|e| parse_error(raw, ty, e))?),
        ColumnType::Double => Value::Double(trimmed.parse().map_err(|e| parse_error(raw, ty, e))?),
        ColumnType::BigInteger => {
            Value::BigInteger(trimmed.parse().map_err(|e| parse_error(raw, ty, e))?)
        }
        ColumnType::BigDecimal => {
            let parsed = trimmed
                .parse::<Decimal>()
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map_err(|e| parse_error(raw, ty, e))?;
            Value::BigDecimal(parsed)
        }
        ColumnType::Date => Value::Date(parse_naive_date(trimmed).map_err(|e| parse_error(raw, ty, e))?),
        ColumnType::Time => Value::Time(parse_naive_time(trimmed).map_err(|e| parse_error(raw, ty, e))?),
        ColumnType::DateTime => {
            Value::DateTime(parse_naive_datetime(trimmed).map_err(|e| parse_error(raw, ty, e))?)
        }
    };
    Ok(value)
}

fn default_output(ty: ColumnType, value: &Value) -> Result<String, ConversionError> {
    let mismatch = || {
        ConversionError::new(
            value.to_string(),
            ty,
            format!("cannot render a {} value", value.column_type()),
        )
    };
    let integral = |min: i128, max: i128| {
        value
            .as_i128()
            .filter(|v| (min..=max).contains(v))
            .map(|v| v.to_string())
            .ok_or_else(mismatch)
    };
    match ty {
        ColumnType::Text => Ok(value.to_string()),
        ColumnType::Boolean => value.as_bool().map(|b| b.to_string()).ok_or_else(mismatch),
        ColumnType::Short => integral(i16::MIN.into(), i16::MAX.into()),
        ColumnType::Int => integral(i32::MIN.into(), i32::MAX.into()),
        ColumnType::Long => integral(i64::MIN.into(), i64::MAX.into()),
        ColumnType::BigInteger => integral(i128::MIN, i128::MAX),
        ColumnType::Float => match value {
            Value::Float(f) => Ok(f.to_string()),
            other => other
                .as_f64()
                .map(|f| (f as f32).to_string())
                .ok_or_else(mismatch),
        },
        ColumnType::Double => value.as_f64().map(|f| f.to_string()).ok_or_else(mismatch),
        ColumnType::BigDecimal => match value {
            Value::Double(f) => decimal_from_f64(*f).map(|d| d.to_string()).ok_or_else(mismatch),
            other => other.as_decimal().map(|d| d.to_string()).ok_or_else(mismatch),
        },
        ColumnType::Date => match value {
            Value::Date(_) => Ok(value.to_string()),
            Value::DateTime(dt) => Ok(dt.date().format("%Y-%m-%d").to_string()),
            _ => Err(mismatch()),
        },
        ColumnType::Time => match value {
            Value::Time(_) => Ok(value.to_string()),
            Value::DateTime(dt) => Ok(dt.time().format("%H:%M:%S%.f").to_string()),
            _ => Err(mismatch()),
        },
        ColumnType::DateTime => match value {
            Value::DateTime(_) => Ok(value.to_string()),
            Value::Date(d) => Ok(d.format("%Y-%m-%d 00:00:00").to_string()),
            _ => Err(mismatch()),
        },
    }
}
