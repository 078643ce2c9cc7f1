//! Derived columns given on the command line as `name[:type]=expression`.

use anyhow::{Result, anyhow};

use crate::{
    column::{Column, ColumnType},
    data::Data,
    error::FieldError,
    expr::{RowEvaluator, to_value},
    value::Value,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedColumn {
    pub column: Column,
    pub expression: String,
}

impl DerivedColumn {
    /// Parses `total=w1 + w2` or `total:double=w1 + w2`. The type defaults to text.
    pub fn parse(spec: &str) -> Result<Self> {
        let (target, expression) = spec
            .split_once('=')
            .ok_or_else(|| anyhow!("Derived column '{spec}' needs the form name=expression"))?;
        let target = target.trim();
        if target.is_empty() {
            return Err(anyhow!("Derived column is missing a name"));
        }
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(anyhow!("Derived column '{target}' is missing an expression"));
        }
        let column = match target.split_once(':') {
            Some((name, ty)) => Column::new(name.trim(), ty.trim().parse::<ColumnType>()?),
            None => Column::text(target),
        };
        Ok(Self {
            column,
            expression: expression.to_string(),
        })
    }

    pub fn evaluate(&self, evaluator: &RowEvaluator, data: &Data<'_>) -> Result<Option<Value>, FieldError> {
        evaluator
            .eval(&self.expression, data, self.column.ty)
            .map(to_value)
    }
}
