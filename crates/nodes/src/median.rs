//! Median task: aggregate any number of numeric inputs.
//!
//! Failed inputs are dropped; the median is taken over the rest. At least one
//! input must survive.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use tracing::debug;

use crate::{RunContext, RunError, RunTask, TaskResult, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MedianTask;

impl MedianTask {
    pub fn aggregate(&self, inputs: &[TaskResult]) -> TaskResult {
        if inputs.is_empty() {
            return Err(RunError::WrongInputCardinality {
                task: "median",
                expected: "at least 1",
                actual: 0,
            });
        }

        let mut values = Vec::with_capacity(inputs.len());
        for input in inputs {
            match input {
                Ok(value) => values.push(value.to_decimal("median")?),
                Err(e) => debug!(error = %e, "median skipping failed input"),
            }
        }

        if values.is_empty() {
            return Err(RunError::AllInputsFailed { count: inputs.len() });
        }

        values.sort();
        let mid = values.len() / 2;
        let median = if values.len() % 2 == 1 {
            values.swap_remove(mid)
        } else {
            (&values[mid - 1] + &values[mid]) / BigDecimal::from(2)
        };

        Ok(Value::Decimal(median))
    }
}

#[async_trait]
impl RunTask for MedianTask {
    async fn run(&self, _ctx: &RunContext, inputs: &[TaskResult]) -> TaskResult {
        self.aggregate(inputs)
    }
}
