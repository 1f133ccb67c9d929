// Scalar comparison operators

use std::cmp::Ordering;

use serde_json::Value;

use crate::engine::registry::{ConditionHandler, ConditionInput, HandlerError, HandlerResult};
use crate::models::WorkflowEventData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    fn is_ordering(&self) -> bool {
        !matches!(self, Operator::Eq | Operator::Ne)
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Gte => ordering != Ordering::Less,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Lte => ordering != Ordering::Greater,
        }
    }
}

/// Compares the input value against a scalar comparison
///
/// With an event input the observed value is the event's scalar `value`.
/// A missing input value never passes, not even for `ne`.
#[derive(Debug, Clone, Copy)]
pub struct OperatorHandler {
    operator: Operator,
}

impl OperatorHandler {
    pub fn new(operator: Operator) -> Self {
        Self { operator }
    }
}

fn observed_value<'a>(input: &ConditionInput<'a>) -> Option<&'a Value> {
    match input {
        ConditionInput::Value(value) => Some(*value),
        ConditionInput::Event(ctx) => match ctx.event {
            WorkflowEventData::Group(event) => event.value.as_ref(),
            WorkflowEventData::Activity(_) => None,
        },
    }
}

/// Numbers compare numerically (so `5` equals `5.0`), everything else by
/// JSON equality. `None` means the two values are not comparable.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ if left == right => Some(Ordering::Equal),
        _ => None,
    }
}

impl ConditionHandler for OperatorHandler {
    fn validate_comparison(&self, comparison: &Value) -> HandlerResult<()> {
        let valid = if self.operator.is_ordering() {
            comparison.is_number()
        } else {
            comparison.is_number() || comparison.is_string() || comparison.is_boolean()
        };

        if valid {
            Ok(())
        } else {
            Err(HandlerError::InvalidComparison(format!(
                "{:?} expects a {} comparison, got {}",
                self.operator,
                if self.operator.is_ordering() { "numeric" } else { "scalar" },
                comparison
            )))
        }
    }

    fn evaluate(&self, input: ConditionInput<'_>, comparison: &Value) -> HandlerResult<bool> {
        let Some(value) = observed_value(&input) else {
            return Ok(false);
        };

        Ok(match compare(value, comparison) {
            Some(ordering) => self.operator.accepts(ordering),
            // Values of different kinds are never equal
            None => self.operator == Operator::Ne,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(operator: Operator, input: Value, comparison: Value) -> bool {
        OperatorHandler::new(operator)
            .evaluate(ConditionInput::Value(&input), &comparison)
            .unwrap()
    }

    #[test]
    fn test_numeric_operators() {
        assert!(eval(Operator::Gt, json!(10), json!(5)));
        assert!(!eval(Operator::Gt, json!(5), json!(5)));
        assert!(eval(Operator::Gte, json!(5), json!(5)));
        assert!(eval(Operator::Lt, json!(1.5), json!(2)));
        assert!(eval(Operator::Lte, json!(2), json!(2.0)));
        assert!(!eval(Operator::Lte, json!(3), json!(2)));
    }

    #[test]
    fn test_equality_across_kinds() {
        assert!(eval(Operator::Eq, json!(5), json!(5.0)));
        assert!(eval(Operator::Eq, json!("prod"), json!("prod")));
        assert!(!eval(Operator::Eq, json!("5"), json!(5)));
        assert!(eval(Operator::Ne, json!("5"), json!(5)));
        assert!(!eval(Operator::Ne, json!(true), json!(true)));
    }

    #[test]
    fn test_ordering_against_non_numbers_fails() {
        assert!(!eval(Operator::Gt, json!("10"), json!(5)));
        assert!(!eval(Operator::Lt, Value::Null, json!(5)));
    }

    #[test]
    fn test_validate_comparison_shapes() {
        let gt = OperatorHandler::new(Operator::Gt);
        assert!(gt.validate_comparison(&json!(3)).is_ok());
        assert!(gt.validate_comparison(&json!("3")).is_err());
        assert!(gt.validate_comparison(&json!({"value": 3})).is_err());

        let eq = OperatorHandler::new(Operator::Eq);
        assert!(eq.validate_comparison(&json!("prod")).is_ok());
        assert!(eq.validate_comparison(&json!(false)).is_ok());
        assert!(eq.validate_comparison(&Value::Null).is_err());
        assert!(eq.validate_comparison(&json!([1, 2])).is_err());
    }
}
