//! Typed access to the fields of one row.
//!
//! [`Data`] binds a [`Header`], a raw row, and the grid's
//! [`ConverterRegistry`]. Numeric reads tolerate dirty columns: non-empty
//! text that is not a number comes back as [`Value::Text`] instead of
//! failing, so predicates can decide what to do with it. Empty numeric text
//! follows the missing-value policy (zero when enabled, a
//! [`ConversionError`](crate::error::ConversionError) otherwise).

use chrono::NaiveDate;

use crate::{
    column::{Column, ColumnType, Header},
    convert::ConverterRegistry,
    error::{ColumnError, ConversionError, FieldError},
    value::{Value, looks_numeric},
};

#[derive(Debug, Clone, Copy)]
pub struct Data<'a> {
    header: &'a Header,
    fields: &'a [String],
    registry: &'a ConverterRegistry,
    missing_as_zero: bool,
    ordinal: usize,
}

impl<'a> Data<'a> {
    pub fn new(
        header: &'a Header,
        fields: &'a [String],
        registry: &'a ConverterRegistry,
        missing_as_zero: bool,
    ) -> Self {
        Self {
            header,
            fields,
            registry,
            missing_as_zero,
            ordinal: 0,
        }
    }

    /// Attaches the 1-based position of the row within the current pass.
    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = ordinal;
        self
    }

    /// 1-based row position, or 0 when the pass does not track positions.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn missing_as_zero(&self) -> bool {
        self.missing_as_zero
    }

    pub fn header(&self) -> &'a Header {
        self.header
    }

    pub fn fields(&self) -> &'a [String] {
        self.fields
    }

    /// Raw text of `name`; fields missing from a short row read as empty.
    pub fn raw(&self, name: &str) -> Result<&'a str, ColumnError> {
        let idx = self.header.position(name)?;
        Ok(self.fields.get(idx).map(String::as_str).unwrap_or(""))
    }

    pub fn get(&self, name: &str, ty: ColumnType) -> Result<Value, FieldError> {
        let raw = self.raw(name)?;
        if ty.is_numeric() && !raw.trim().is_empty() && !looks_numeric(raw) {
            return Ok(Value::Text(raw.to_string()));
        }
        self.registry.parse(ty, raw, self.missing_as_zero)
    }

    pub fn get_column(&self, column: &Column) -> Result<Value, FieldError> {
        self.get(&column.name, column.ty)
    }

    pub fn text(&self, name: &str) -> Result<String, FieldError> {
        Ok(self.raw(name)?.to_string())
    }

    /// Reads `name` as a double; text fallbacks surface as a conversion error.
    pub fn double(&self, name: &str) -> Result<f64, FieldError> {
        let value = self.get(name, ColumnType::Double)?;
        value
            .as_f64()
            .ok_or_else(|| not_a(&value, ColumnType::Double))
    }

    pub fn long(&self, name: &str) -> Result<i64, FieldError> {
        match self.get(name, ColumnType::Long)? {
            Value::Long(v) => Ok(v),
            other => Err(not_a(&other, ColumnType::Long)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i32, FieldError> {
        match self.get(name, ColumnType::Int)? {
            Value::Int(v) => Ok(v),
            other => Err(not_a(&other, ColumnType::Int)),
        }
    }

    pub fn boolean(&self, name: &str) -> Result<bool, FieldError> {
        match self.get(name, ColumnType::Boolean)? {
            Value::Boolean(b) => Ok(b),
            other => Err(not_a(&other, ColumnType::Boolean)),
        }
    }

    pub fn date(&self, name: &str) -> Result<NaiveDate, FieldError> {
        match self.get(name, ColumnType::Date)? {
            Value::Date(d) => Ok(d),
            other => Err(not_a(&other, ColumnType::Date)),
        }
    }
}

fn not_a(value: &Value, ty: ColumnType) -> FieldError {
    FieldError::Conversion(ConversionError::new(
        value.to_string(),
        ty,
        format!("read back as {}", value.column_type()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header::new(vec!["id".into(), "name".into(), "w1".into()]).unwrap()
    }

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn numeric_read_falls_back_to_text() {
        let header = header();
        let registry = ConverterRegistry::default();
        let fields = row(&["1", "Alpha", "n/a"]);
        let data = Data::new(&header, &fields, &registry, true);
        assert_eq!(data.get("w1", ColumnType::Double).unwrap(), Value::Text("n/a".into()));
        assert!(matches!(data.double("w1"), Err(FieldError::Conversion(_))));
        assert_eq!(data.get("id", ColumnType::Long).unwrap(), Value::Long(1));
    }

    #[test]
    fn integer_read_of_fractional_text_is_a_conversion_error() {
        let header = header();
        let registry = ConverterRegistry::default();
        let fields = row(&["1.5", "Alpha", "2"]);
        let data = Data::new(&header, &fields, &registry, false);
        assert!(matches!(
            data.get("id", ColumnType::Int),
            Err(FieldError::Conversion(_))
        ));
    }

    #[test]
    fn missing_policy_applies_to_empty_and_short_rows() {
        let header = header();
        let registry = ConverterRegistry::default();
        let fields = row(&["7", "Beta"]);
        let lenient = Data::new(&header, &fields, &registry, true);
        assert_eq!(lenient.double("w1").unwrap(), 0.0);
        let strict = Data::new(&header, &fields, &registry, false);
        assert!(matches!(strict.double("w1"), Err(FieldError::Conversion(_))));
    }

    #[test]
    fn unknown_column_is_fatal_and_ordinal_defaults_to_zero() {
        let header = header();
        let registry = ConverterRegistry::default();
        let fields = row(&["1", "Alpha", "3"]);
        let data = Data::new(&header, &fields, &registry, false);
        assert_eq!(data.ordinal(), 0);
        assert_eq!(data.with_ordinal(4).ordinal(), 4);
        assert_eq!(
            data.get("w9", ColumnType::Double).unwrap_err(),
            FieldError::Column(ColumnError::NotFound("w9".into()))
        );
    }
}
