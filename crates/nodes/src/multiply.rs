//! Multiply task: scale a single numeric input by a fixed decimal factor.

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::value::{check_exponent, single_input};
use crate::{RunContext, RunTask, TaskResult, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiplyTask {
    pub times: BigDecimal,
}

impl MultiplyTask {
    pub fn new(times: BigDecimal) -> Self {
        Self { times }
    }

    pub fn apply(&self, input: &Value) -> TaskResult {
        check_exponent(&self.times)?;
        let value = input.to_decimal("multiply")?;
        let product = value * &self.times;
        check_exponent(&product)?;
        Ok(Value::Decimal(product))
    }
}

impl Default for MultiplyTask {
    fn default() -> Self {
        Self::new(BigDecimal::from(1))
    }
}

#[async_trait]
impl RunTask for MultiplyTask {
    async fn run(&self, _ctx: &RunContext, inputs: &[TaskResult]) -> TaskResult {
        let input = single_input("multiply", inputs)?;
        self.apply(input)
    }
}
