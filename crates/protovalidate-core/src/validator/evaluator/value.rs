use prost_reflect::Value;

use crate::path::FieldPath;

use super::{EvalContext, Evaluator, Tautologies, Violations};

/// Rules applied to one value: a field value, a list element, or a map key
/// or value.
pub(crate) struct ValueEval {
    children: Vec<Evaluator>,
    /// Skip evaluation when the value equals this zero value.
    ignore_empty: Option<Value>,
    /// Prepended to the rule path of rule violations, e.g. `repeated.items`.
    rule_prefix: Option<FieldPath>,
}

impl ValueEval {
    pub(crate) fn new(rule_prefix: Option<FieldPath>) -> Self {
        Self {
            children: Vec::new(),
            ignore_empty: None,
            rule_prefix,
        }
    }

    pub(crate) fn set_ignore_empty(&mut self, zero: Value) {
        self.ignore_empty = Some(zero);
    }

    /// Appends a child. Tautological children are dropped by `prune` once
    /// the message graph has settled.
    pub(crate) fn append(&mut self, child: Evaluator) {
        self.children.push(child);
    }

    pub(crate) fn tautology(&self, tautological: Tautologies<'_>) -> bool {
        self.children.iter().all(|c| c.tautology(tautological))
    }

    pub(crate) fn prune(&mut self, tautological: Tautologies<'_>) {
        for child in &mut self.children {
            child.prune(tautological);
        }
        self.children.retain(|c| !c.tautology(tautological));
    }

    pub(crate) fn evaluate(&self, value: &Value, ctx: &EvalContext<'_>) -> Violations {
        if self.ignore_empty.as_ref().is_some_and(|zero| zero == value) {
            return Ok(Vec::new());
        }

        let mut violations = Vec::new();
        for child in &self.children {
            let mut found = child.evaluate(value, ctx)?;
            if let Some(prefix) = &self.rule_prefix
                && child.reports_rules()
            {
                for violation in &mut found {
                    violation.prepend_rule_path(prefix);
                }
            }
            let failed = !found.is_empty();
            violations.extend(found);
            if failed && ctx.fail_fast() {
                break;
            }
        }
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use prost_reflect::Value;
    use protovalidate_rules::Rule;

    use super::ValueEval;
    use crate::path::{FieldPath, FieldPathElement};
    use crate::validator::evaluator::cel::{CompiledProgram, Programs};
    use crate::validator::evaluator::test_support::{snapshot, with_context};
    use crate::validator::evaluator::Evaluator;

    fn program(id: &str, expression: &str) -> Evaluator {
        let rule_path = FieldPath::new(vec![FieldPathElement::oneof("cel")]);
        Evaluator::Programs(Programs::new(vec![
            CompiledProgram::custom(&Rule::new(id, id, expression), rule_path).expect("compiles"),
        ]))
    }

    fn items() -> FieldPath {
        FieldPath::new(vec![
            FieldPathElement::oneof("repeated"),
            FieldPathElement::oneof("items"),
        ])
    }

    #[test]
    fn empty_programs_are_tautologies() {
        let mut eval = ValueEval::new(None);
        eval.append(Evaluator::Programs(Programs::default()));
        assert!(eval.tautology(&|_| false));
        eval.prune(&|_| false);
        assert!(eval.children.is_empty());

        eval.append(program("positive", "this > 0"));
        assert!(!eval.tautology(&|_| true));
        eval.prune(&|_| true);
        assert_eq!(eval.children.len(), 1);
    }

    #[test]
    fn fail_fast_stops_after_the_first_failing_child() {
        let mut eval = ValueEval::new(Some(items()));
        eval.append(program("a", "this > 10"));
        eval.append(program("b", "this > 20"));
        let snapshot = snapshot(Vec::new());

        let all = with_context(&snapshot, false, |ctx| eval.evaluate(&Value::I32(1), ctx))
            .expect("evaluates");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].rule_path().to_string(), "repeated.items.cel");

        let first = with_context(&snapshot, true, |ctx| eval.evaluate(&Value::I32(1), ctx))
            .expect("evaluates");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].rule_id(), "a");
    }

    #[test]
    fn ignore_empty_skips_zero_values() {
        let mut eval = ValueEval::new(None);
        eval.append(program("positive", "this > 0"));
        eval.set_ignore_empty(Value::I32(0));
        let snapshot = snapshot(Vec::new());
        let found = with_context(&snapshot, false, |ctx| eval.evaluate(&Value::I32(0), ctx))
            .expect("evaluates");
        assert!(found.is_empty());
        let found = with_context(&snapshot, false, |ctx| eval.evaluate(&Value::I32(-1), ctx))
            .expect("evaluates");
        assert_eq!(found.len(), 1);
    }
}
