//! Declarative data-quality rules and the two validators built on them.
//!
//! Rules are `(name, expression)` pairs compiled against a record type that
//! exposes named numeric fields. The Event Validator drops a telemetry event
//! that fails any rule; the Result Validator only tags the KPI row.

pub mod fields;
pub mod rules;
pub mod validate;

pub use fields::RuleFields;
pub use rules::{CmpOp, OnFail, Outcome, RuleSet, RuleSpec};
pub use validate::{default_event_rules, default_result_rules, EventValidator, ResultValidator};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RuleError {
    #[error("rule `{rule}`: empty expression")]
    Empty { rule: String },

    #[error("rule `{rule}`: expected `<field> <op> <number>`, found `{clause}`")]
    Syntax { rule: String, clause: String },

    #[error("rule `{rule}`: unknown comparison operator `{op}`")]
    UnknownOperator { rule: String, op: String },

    #[error("rule `{rule}`: `{value}` is not a number")]
    BadThreshold { rule: String, value: String },

    #[error("rule `{rule}`: unknown field `{field}`")]
    UnknownField { rule: String, field: String },

    #[error("duplicate rule name `{rule}`")]
    Duplicate { rule: String },
}
