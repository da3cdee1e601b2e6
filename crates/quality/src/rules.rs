use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{RuleError, RuleFields};

/// A named rule as it appears in configuration, e.g.
/// `{"name": "expected_shifts", "expr": "shiftNumber >= 1 and shiftNumber <= 3"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSpec {
    pub name: String,
    pub expr: String,
}

impl RuleSpec {
    pub fn new(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self { name: name.into(), expr: expr.into() }
    }
}

/// What happens to a record that fails at least one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnFail {
    Drop,
    Tag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "<" => CmpOp::Lt,
            "<=" => CmpOp::Le,
            ">" => CmpOp::Gt,
            ">=" => CmpOp::Ge,
            "=" | "==" => CmpOp::Eq,
            "!=" | "<>" => CmpOp::Ne,
            _ => return None,
        })
    }

    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        };
        f.write_str(s)
    }
}

type Accessor<T> = fn(&T) -> Option<f64>;

#[derive(Debug, Clone)]
struct Clause<T> {
    accessor: Accessor<T>,
    op: CmpOp,
    threshold: f64,
}

impl<T> Clause<T> {
    // A missing value never satisfies a comparison.
    fn holds(&self, record: &T) -> bool {
        match (self.accessor)(record) {
            Some(value) => self.op.holds(value, self.threshold),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Rule<T> {
    name: String,
    clauses: Vec<Clause<T>>,
}

impl<T: RuleFields> Rule<T> {
    fn compile(spec: &RuleSpec) -> Result<Self, RuleError> {
        let tokens: Vec<&str> = spec.expr.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(RuleError::Empty { rule: spec.name.clone() });
        }

        let mut clauses = Vec::new();
        for group in tokens.split(|t| t.eq_ignore_ascii_case("and")) {
            let [field, op, value] = group else {
                return Err(RuleError::Syntax {
                    rule: spec.name.clone(),
                    clause: group.join(" "),
                });
            };
            let accessor = T::accessor(field).ok_or_else(|| RuleError::UnknownField {
                rule: spec.name.clone(),
                field: field.to_string(),
            })?;
            let op = CmpOp::parse(op).ok_or_else(|| RuleError::UnknownOperator {
                rule: spec.name.clone(),
                op: op.to_string(),
            })?;
            let threshold = value.parse::<f64>().map_err(|_| RuleError::BadThreshold {
                rule: spec.name.clone(),
                value: value.to_string(),
            })?;
            clauses.push(Clause { accessor, op, threshold });
        }

        Ok(Rule { name: spec.name.clone(), clauses })
    }

    fn holds(&self, record: &T) -> bool {
        self.clauses.iter().all(|c| c.holds(record))
    }
}

/// Result of running a record through a [`RuleSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// The record, unless the set drops failing records and this one failed.
    pub record: Option<T>,
    /// Every failed rule, in declaration order.
    pub failed: Vec<String>,
}

impl<T> Outcome<T> {
    pub fn passed(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A compiled list of rules evaluated under one [`OnFail`] policy.
#[derive(Debug, Clone)]
pub struct RuleSet<T> {
    policy: OnFail,
    rules: Vec<Rule<T>>,
}

impl<T: RuleFields> RuleSet<T> {
    pub fn compile(policy: OnFail, specs: &[RuleSpec]) -> Result<Self, RuleError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(RuleError::Duplicate { rule: spec.name.clone() });
            }
            rules.push(Rule::compile(spec)?);
        }
        Ok(Self { policy, rules })
    }

    pub fn policy(&self) -> OnFail {
        self.policy
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Names of all rules `record` fails. Every rule is evaluated; there is
    /// no short circuit on the first failure.
    pub fn failures(&self, record: &T) -> Vec<String> {
        self.rules
            .iter()
            .filter(|rule| !rule.holds(record))
            .map(|rule| rule.name.clone())
            .collect()
    }

    pub fn apply(&self, record: T) -> Outcome<T> {
        let failed = self.failures(&record);
        let record = match self.policy {
            OnFail::Drop if !failed.is_empty() => None,
            _ => Some(record),
        };
        Outcome { record, failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Reading {
        level: f64,
        shift: Option<f64>,
    }

    impl RuleFields for Reading {
        fn accessor(field: &str) -> Option<fn(&Self) -> Option<f64>> {
            let f: fn(&Self) -> Option<f64> = match field {
                "level" => |r| Some(r.level),
                "shift" => |r| r.shift,
                _ => return None,
            };
            Some(f)
        }
    }

    fn set(policy: OnFail, specs: &[(&str, &str)]) -> RuleSet<Reading> {
        let specs: Vec<RuleSpec> = specs.iter().map(|(n, e)| RuleSpec::new(*n, *e)).collect();
        RuleSet::compile(policy, &specs).unwrap()
    }

    #[test]
    fn conjunction_requires_every_clause() {
        let rules = set(OnFail::Drop, &[("range", "shift >= 1 AND shift <= 3")]);
        assert!(rules.failures(&Reading { level: 0.0, shift: Some(2.0) }).is_empty());
        assert_eq!(rules.failures(&Reading { level: 0.0, shift: Some(4.0) }), vec!["range"]);
        assert_eq!(rules.failures(&Reading { level: 0.0, shift: Some(0.0) }), vec!["range"]);
    }

    #[test]
    fn all_rules_are_evaluated() {
        let rules = set(
            OnFail::Drop,
            &[("low", "level >= 0"), ("range", "shift <= 3"), ("high", "level < 100")],
        );
        let outcome = rules.apply(Reading { level: -1.0, shift: Some(9.0) });
        assert_eq!(outcome.record.map(|r| r.level), None);
        assert_eq!(outcome.failed, vec!["low", "range"]);
    }

    #[test]
    fn tag_policy_keeps_record() {
        let rules = set(OnFail::Tag, &[("low", "level > 10")]);
        let outcome = rules.apply(Reading { level: 5.0, shift: None });
        assert!(outcome.record.is_some());
        assert_eq!(outcome.failed, vec!["low"]);
        assert!(!outcome.passed());
    }

    #[test]
    fn missing_value_fails_comparison() {
        let rules = set(OnFail::Tag, &[("shift_known", "shift != 0")]);
        assert_eq!(rules.failures(&Reading { level: 1.0, shift: None }), vec!["shift_known"]);
    }

    #[test]
    fn compile_errors() {
        let compile = |expr: &str| {
            RuleSet::<Reading>::compile(OnFail::Drop, &[RuleSpec::new("r", expr)]).unwrap_err()
        };
        assert_eq!(compile("  "), RuleError::Empty { rule: "r".into() });
        assert!(matches!(compile("level >="), RuleError::Syntax { .. }));
        assert!(matches!(compile("level >= 1 and"), RuleError::Syntax { .. }));
        assert!(matches!(compile("level => 1"), RuleError::UnknownOperator { .. }));
        assert!(matches!(compile("level >= one"), RuleError::BadThreshold { .. }));
        assert!(matches!(compile("pressure >= 1"), RuleError::UnknownField { .. }));
    }

    #[test]
    fn duplicate_names_rejected() {
        let specs = [RuleSpec::new("a", "level > 0"), RuleSpec::new("a", "level < 9")];
        let err = RuleSet::<Reading>::compile(OnFail::Tag, &specs).unwrap_err();
        assert_eq!(err, RuleError::Duplicate { rule: "a".into() });
    }
}
