//! Values flowing between tasks.

use std::str::FromStr;

use bigdecimal::BigDecimal;

use crate::RunError;

/// Outcome of running a task: exactly one of a value or an error.
pub type TaskResult = Result<Value, RunError>;

/// JSON-like data passed along the edges of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Decoded structured data (null, bool, number, text, sequence, mapping).
    Json(serde_json::Value),
    /// Raw, undecoded bytes such as a response body.
    Bytes(Vec<u8>),
    /// Arbitrary-precision number produced by arithmetic tasks.
    Decimal(BigDecimal),
}

impl Value {
    /// The absent value.
    pub fn null() -> Self {
        Value::Json(serde_json::Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Json(serde_json::Value::Null))
    }

    /// Short name of the value's shape, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Json(serde_json::Value::Null) => "null",
            Value::Json(serde_json::Value::Bool(_)) => "bool",
            Value::Json(serde_json::Value::Number(_)) => "number",
            Value::Json(serde_json::Value::String(_)) => "string",
            Value::Json(serde_json::Value::Array(_)) => "array",
            Value::Json(serde_json::Value::Object(_)) => "object",
            Value::Bytes(_) => "bytes",
            Value::Decimal(_) => "decimal",
        }
    }

    /// Convert a numeric value (decimal text, JSON number or decimal) to a
    /// [`BigDecimal`]. `task` names the caller for error reporting.
    pub fn to_decimal(&self, task: &'static str) -> Result<BigDecimal, RunError> {
        match self {
            Value::Decimal(d) => check_exponent(d).map(|()| d.clone()),
            Value::Json(serde_json::Value::String(s)) => parse_decimal(s),
            Value::Json(serde_json::Value::Number(n)) => number_to_decimal(n),
            other => Err(RunError::UnsupportedValueType {
                task,
                found: other.type_name(),
            }),
        }
    }

    /// Render as plain JSON. Decimals become their textual form and bytes are
    /// read as (lossy) UTF-8 text.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Json(v) => v.clone(),
            Value::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
            Value::Decimal(d) => serde_json::Value::String(d.normalized().to_string()),
        }
    }
}

/// Largest decimal exponent accepted in either direction. Arithmetic adds
/// exponents, so unbounded ones from untrusted text would overflow.
pub const MAX_DECIMAL_EXPONENT: u64 = 1 << 16;

/// Parse decimal text exactly as written (no surrounding whitespace),
/// rejecting exponents beyond [`MAX_DECIMAL_EXPONENT`].
pub fn parse_decimal(text: &str) -> Result<BigDecimal, RunError> {
    let invalid = || RunError::InvalidNumber(text.to_owned());
    let decimal = BigDecimal::from_str(text).map_err(|_| invalid())?;
    check_exponent(&decimal).map_err(|_| invalid())?;
    Ok(decimal)
}

/// Reject a decimal whose exponent is beyond [`MAX_DECIMAL_EXPONENT`].
pub fn check_exponent(decimal: &BigDecimal) -> Result<(), RunError> {
    let (digits, exponent) = decimal.as_bigint_and_exponent();
    if exponent.unsigned_abs() <= MAX_DECIMAL_EXPONENT {
        Ok(())
    } else {
        // Display would expand the exponent, so render it in scientific form.
        Err(RunError::InvalidNumber(format!("{digits}e{}", -i128::from(exponent))))
    }
}

fn number_to_decimal(n: &serde_json::Number) -> Result<BigDecimal, RunError> {
    if let Some(i) = n.as_i64() {
        return Ok(BigDecimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Ok(BigDecimal::from(u));
    }
    // Floats go through their shortest round-trip text so that 1.23 stays
    // 1.23 instead of its exact binary expansion.
    match n.as_f64() {
        Some(f) => parse_decimal(&f.to_string()),
        None => Err(RunError::InvalidNumber(n.to_string())),
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<BigDecimal> for Value {
    fn from(d: BigDecimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Json(serde_json::Value::String(s.to_owned()))
    }
}

/// Enforce the single-input rule shared by transforming tasks: exactly one
/// input, and an upstream error is handed back unchanged.
pub fn single_input<'a>(task: &'static str, inputs: &'a [TaskResult]) -> Result<&'a Value, RunError> {
    match inputs {
        [Ok(value)] => Ok(value),
        [Err(e)] => Err(e.clone()),
        _ => Err(RunError::WrongInputCardinality {
            task,
            expected: "exactly 1",
            actual: inputs.len(),
        }),
    }
}

/// Enforce the no-input rule of source tasks.
pub fn no_inputs(task: &'static str, inputs: &[TaskResult]) -> Result<(), RunError> {
    if inputs.is_empty() {
        Ok(())
    } else {
        Err(RunError::WrongInputCardinality {
            task,
            expected: "no",
            actual: inputs.len(),
        })
    }
}
