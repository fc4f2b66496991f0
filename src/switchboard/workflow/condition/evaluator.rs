// SPDX-License-Identifier: MIT

//! Condition expression evaluator

use super::ast::{CompareOp, Expression, Literal, Operand};
use crate::switchboard::workflow::state::State;
use serde_json::Value;

/// Evaluate a condition expression against the state
pub fn evaluate(expr: &Expression, state: &State) -> bool {
    match expr {
        Expression::True => true,
        Expression::False => false,
        Expression::Truthy(path) => state.get_path(path).is_some_and(truthy),
        Expression::Compare { left, op, right } => {
            let left = state.get_path(left);
            let right = match right {
                Operand::Literal(lit) => Some(literal_value(lit)),
                Operand::Path(path) => state.get_path(path).cloned(),
            };
            compare(left, *op, right.as_ref())
        }
        Expression::And(l, r) => evaluate(l, state) && evaluate(r, state),
        Expression::Or(l, r) => evaluate(l, state) || evaluate(r, state),
        Expression::Not(inner) => !evaluate(inner, state),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::String(s) => Value::String(s.clone()),
        Literal::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

fn compare(left: Option<&Value>, op: CompareOp, right: Option<&Value>) -> bool {
    // absent and null are the same thing
    let left = left.filter(|v| !v.is_null());
    let right = right.filter(|v| !v.is_null());

    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::NotEq => !values_equal(left, right),
        CompareOp::Gt => numbers(left, right).is_some_and(|(a, b)| a > b),
        CompareOp::Gte => numbers(left, right).is_some_and(|(a, b)| a >= b),
        CompareOp::Lt => numbers(left, right).is_some_and(|(a, b)| a < b),
        CompareOp::Lte => numbers(left, right).is_some_and(|(a, b)| a <= b),
        CompareOp::Contains => contains(left, right),
    }
}

fn values_equal(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(Value::Number(a)), Some(Value::Number(b))) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => false,
        },
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn numbers(left: Option<&Value>, right: Option<&Value>) -> Option<(f64, f64)> {
    Some((left?.as_f64()?, right?.as_f64()?))
}

fn contains(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (Some(Value::String(s)), Some(Value::String(sub))) => s.contains(sub.as_str()),
        (Some(Value::Array(items)), Some(needle)) => {
            items.iter().any(|item| values_equal(Some(item), Some(needle)))
        }
        (Some(Value::Object(fields)), Some(Value::String(key))) => fields.contains_key(key),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switchboard::workflow::condition::parse;
    use crate::switchboard::workflow::state::{PartialState, StateSchema};
    use serde_json::json;

    fn state_with(pairs: Vec<(&str, Value)>) -> State {
        let mut state = State::empty();
        let update: PartialState = pairs.into_iter().collect();
        state.apply(&update, &StateSchema::default()).unwrap();
        state
    }

    fn check(cond: &str, state: &State) -> bool {
        evaluate(&parse(cond).unwrap(), state)
    }

    #[test]
    fn test_string_equality() {
        let state = state_with(vec![("category", json!("study"))]);
        assert!(check("category == 'study'", &state));
        assert!(!check("category == 'work'", &state));
        assert!(check("category != 'work'", &state));
    }

    #[test]
    fn test_number_comparison() {
        let state = state_with(vec![("trials", json!(2)), ("max_trials", json!(3))]);
        assert!(check("trials < 3", &state));
        assert!(check("trials <= 2", &state));
        assert!(!check("trials > 2", &state));
        assert!(check("trials == 2", &state));
        assert!(check("trials < max_trials", &state));
        assert!(!check("trials >= max_trials", &state));
    }

    #[test]
    fn test_missing_field() {
        let state = State::empty();
        assert!(check("draft_id == null", &state));
        assert!(!check("draft_id == 'd1'", &state));
        assert!(!check("count > 1", &state));
        assert!(!check("draft_id", &state));
    }

    #[test]
    fn test_truthiness() {
        let state = state_with(vec![
            ("sendable", json!(true)),
            ("empty", json!("")),
            ("zero", json!(0)),
            ("items", json!([1])),
        ]);
        assert!(check("sendable", &state));
        assert!(!check("empty", &state));
        assert!(!check("zero", &state));
        assert!(check("items", &state));
        assert!(check("not empty and sendable", &state));
    }

    #[test]
    fn test_contains() {
        let state = state_with(vec![
            ("query", json!("please send the draft")),
            ("tags", json!(["exam", "math"])),
            ("result", json!({"created": []})),
        ]);
        assert!(check("query contains 'send'", &state));
        assert!(!check("query contains 'delete'", &state));
        assert!(check("tags contains 'exam'", &state));
        assert!(check("result contains 'created'", &state));
    }

    #[test]
    fn test_nested_path() {
        let state = state_with(vec![("calendar", json!({"created": [{"id": "e1"}]}))]);
        assert!(check("calendar.created.0.id == 'e1'", &state));
        assert!(check("calendar.created", &state));
    }

    #[test]
    fn test_compound() {
        let state = state_with(vec![("category", json!("study")), ("trials", json!(1))]);
        assert!(check("category == 'work' or trials == 1", &state));
        assert!(!check("category == 'work' and trials == 1", &state));
        assert!(check("not (category == 'work')", &state));
    }
}
