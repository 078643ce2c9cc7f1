//! `evalexpr` bindings over a [`Data`] row, used by the command line's
//! filter expressions and derived columns.
//!
//! Every column is bound twice: under its normalized name (`Order ID`
//! becomes `order_id`) and positionally as `c0`, `c1`, ... Raw text is bound
//! as an integer, float, or boolean when it reads as one and as a string
//! otherwise; empty cells read as `0` when the grid substitutes missing
//! values. `row_number` holds the 1-based row position.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use evalexpr::{
    ContextWithMutableFunctions, ContextWithMutableVariables, DefaultNumericTypes, EvalexprError,
    Function, HashMapContext, Value as EvalValue, eval_with_context,
};

use crate::{
    column::ColumnType,
    data::Data,
    error::{ConversionError, FieldError},
    value::{Value, normalize_column_name, parse_naive_date},
};

/// Evaluates expressions against one row at a time.
#[derive(Debug, Clone)]
pub struct RowEvaluator {
    base: HashMapContext,
}

impl RowEvaluator {
    pub fn new() -> Result<Self> {
        let mut base = HashMapContext::new();
        register_functions(&mut base)?;
        Ok(Self { base })
    }

    /// A fresh context with the row's cells bound.
    pub fn bind(&self, data: &Data<'_>) -> Result<HashMapContext, EvalexprError> {
        let mut context = self.base.clone();
        for (idx, name) in data.header().names().iter().enumerate() {
            let raw = data.fields().get(idx).map(String::as_str).unwrap_or("");
            let value = infer(raw, data.missing_as_zero());
            context.set_value(normalize_column_name(name), value.clone())?;
            context.set_value(format!("c{idx}"), value)?;
        }
        if data.ordinal() > 0 {
            context.set_value("row_number".to_string(), EvalValue::Int(data.ordinal() as i64))?;
        }
        Ok(context)
    }

    /// Evaluates `expr`; failures come back as a conversion error against `ty`.
    pub fn eval(&self, expr: &str, data: &Data<'_>, ty: ColumnType) -> Result<EvalValue, FieldError> {
        let context = self.bind(data).map_err(|err| failure(expr, ty, err))?;
        eval_with_context(expr, &context).map_err(|err| failure(expr, ty, err))
    }

    pub fn matches(&self, expr: &str, data: &Data<'_>) -> Result<bool, FieldError> {
        self.eval(expr, data, ColumnType::Boolean).map(truthy)
    }
}

fn failure(expr: &str, ty: ColumnType, err: EvalexprError) -> FieldError {
    ConversionError::new(expr, ty, err.to_string()).into()
}

fn infer(raw: &str, missing_as_zero: bool) -> EvalValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return if missing_as_zero {
            EvalValue::Int(0)
        } else {
            EvalValue::String(String::new())
        };
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        EvalValue::Int(i)
    } else if let Ok(f) = trimmed.parse::<f64>() {
        EvalValue::Float(f)
    } else if let Ok(b) = trimmed.parse::<bool>() {
        EvalValue::Boolean(b)
    } else {
        EvalValue::String(raw.to_string())
    }
}

pub fn truthy(value: EvalValue) -> bool {
    match value {
        EvalValue::Boolean(b) => b,
        EvalValue::Int(i) => i != 0,
        EvalValue::Float(f) => f != 0.0,
        EvalValue::String(s) => !s.is_empty(),
        EvalValue::Tuple(values) => values.into_iter().any(truthy),
        EvalValue::Empty => false,
    }
}

/// Converts an expression result into a cell value; empty results are `None`.
pub fn to_value(value: EvalValue) -> Option<Value> {
    match value {
        EvalValue::Boolean(b) => Some(Value::Boolean(b)),
        EvalValue::Int(i) => Some(Value::Long(i)),
        EvalValue::Float(f) => Some(Value::Double(f)),
        EvalValue::String(s) if s.is_empty() => None,
        EvalValue::String(s) => Some(Value::Text(s)),
        EvalValue::Tuple(values) => Some(Value::Text(
            values
                .into_iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("|"),
        )),
        EvalValue::Empty => None,
    }
}

fn register_functions(context: &mut HashMapContext) -> Result<()> {
    let functions: [(&str, Function<DefaultNumericTypes>); 7] = [
        (
            "lowercase",
            Function::new(|arguments| {
                let [value] = args::<1>(arguments, "lowercase")?;
                Ok(EvalValue::String(string_arg(&value)?.to_lowercase()))
            }),
        ),
        (
            "uppercase",
            Function::new(|arguments| {
                let [value] = args::<1>(arguments, "uppercase")?;
                Ok(EvalValue::String(string_arg(&value)?.to_uppercase()))
            }),
        ),
        (
            "trim",
            Function::new(|arguments| {
                let [value] = args::<1>(arguments, "trim")?;
                Ok(EvalValue::String(string_arg(&value)?.trim().to_string()))
            }),
        ),
        (
            "substring",
            Function::new(|arguments| {
                let [value, start, length] = args::<3>(arguments, "substring")?;
                let start = int_arg(&start)?.max(0) as usize;
                let length = int_arg(&length)?.max(0) as usize;
                Ok(EvalValue::String(
                    string_arg(&value)?.chars().skip(start).take(length).collect(),
                ))
            }),
        ),
        (
            "date_add",
            Function::new(|arguments| {
                let [date, days] = args::<2>(arguments, "date_add")?;
                let shifted = date_arg(&date)?
                    .checked_add_signed(Duration::days(int_arg(&days)?))
                    .ok_or_else(|| EvalexprError::CustomMessage("date_add overflow".into()))?;
                Ok(EvalValue::String(shifted.format("%Y-%m-%d").to_string()))
            }),
        ),
        (
            "date_diff_days",
            Function::new(|arguments| {
                let [end, start] = args::<2>(arguments, "date_diff_days")?;
                Ok(EvalValue::Int((date_arg(&end)? - date_arg(&start)?).num_days()))
            }),
        ),
        (
            "is_empty",
            Function::new(|arguments| {
                let [value] = args::<1>(arguments, "is_empty")?;
                Ok(EvalValue::Boolean(matches!(&value, EvalValue::String(s) if s.trim().is_empty())))
            }),
        ),
    ];
    for (name, function) in functions {
        context
            .set_function(name.to_string(), function)
            .with_context(|| format!("Registering function '{name}'"))?;
    }
    Ok(())
}

fn args<const N: usize>(arguments: &EvalValue, name: &str) -> Result<[EvalValue; N], EvalexprError> {
    let values = match arguments {
        EvalValue::Tuple(values) => values.clone(),
        EvalValue::Empty => Vec::new(),
        single => vec![single.clone()],
    };
    let found = values.len();
    values.try_into().map_err(|_| {
        EvalexprError::CustomMessage(format!("{name} expects {N} argument(s), got {found}"))
    })
}

fn string_arg(value: &EvalValue) -> Result<&str, EvalexprError> {
    match value {
        EvalValue::String(s) => Ok(s),
        other => Err(EvalexprError::CustomMessage(format!("Expected a string, got {other}"))),
    }
}

fn int_arg(value: &EvalValue) -> Result<i64, EvalexprError> {
    match value {
        EvalValue::Int(i) => Ok(*i),
        EvalValue::Float(f) => Ok(*f as i64),
        other => Err(EvalexprError::CustomMessage(format!("Expected an integer, got {other}"))),
    }
}

fn date_arg(value: &EvalValue) -> Result<NaiveDate, EvalexprError> {
    parse_naive_date(string_arg(value)?).map_err(|err| EvalexprError::CustomMessage(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{column::Header, convert::ConverterRegistry};

    fn fixture() -> (Header, Vec<String>, ConverterRegistry) {
        (
            Header::new(vec!["Order ID".into(), "name".into(), "w1".into(), "placed".into()]).unwrap(),
            vec!["7".into(), "Alpha".into(), "".into(), "2024-01-30".into()],
            ConverterRegistry::default(),
        )
    }

    #[test]
    fn binds_inferred_values_by_name_and_position() {
        let (header, fields, registry) = fixture();
        let data = Data::new(&header, &fields, &registry, false).with_ordinal(3);
        let evaluator = RowEvaluator::new().unwrap();
        assert!(evaluator.matches("order_id == 7 && c1 == \"Alpha\"", &data).unwrap());
        assert!(evaluator.matches("row_number == 3", &data).unwrap());
        assert!(evaluator.matches("w1 == \"\"", &data).unwrap());
        assert!(evaluator.matches("is_empty(w1)", &data).unwrap());
    }

    #[test]
    fn empty_cells_read_as_zero_when_substituting() {
        let (header, fields, registry) = fixture();
        let data = Data::new(&header, &fields, &registry, true);
        let evaluator = RowEvaluator::new().unwrap();
        assert!(evaluator.matches("w1 == 0", &data).unwrap());
    }

    #[test]
    fn functions_and_failures() {
        let (header, fields, registry) = fixture();
        let data = Data::new(&header, &fields, &registry, false);
        let evaluator = RowEvaluator::new().unwrap();
        let shifted = evaluator.eval("date_add(placed, 2)", &data, ColumnType::Date).unwrap();
        assert_eq!(to_value(shifted), Some(Value::Text("2024-02-01".into())));
        let upper = evaluator.eval("uppercase(substring(name, 0, 3))", &data, ColumnType::Text).unwrap();
        assert_eq!(to_value(upper), Some(Value::Text("ALP".into())));
        assert!(matches!(
            evaluator.matches("name > 3", &data),
            Err(FieldError::Conversion(_))
        ));
    }
}
