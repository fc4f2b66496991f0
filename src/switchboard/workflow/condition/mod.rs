// SPDX-License-Identifier: MIT

//! Condition expressions for declarative routes
//!
//! Conditions are small boolean expressions over state fields:
//! - `category == 'study'`
//! - `trials >= max_trials`
//! - `not sendable and feedback contains 'tone'`
//! - `email_draft_id` (true when the field holds a truthy value)

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal, Operand};
pub use evaluator::evaluate;
pub use parser::{parse, ConditionError};
