use prost_reflect::Value;

use crate::path::FieldPathElement;

use super::value::ValueEval;
use super::{EvalContext, Tautologies, Violations};

/// Applies the item rules of a repeated field to each element.
pub(crate) struct ListEval {
    items: ValueEval,
}

impl ListEval {
    pub(crate) fn new(items: ValueEval) -> Self {
        Self { items }
    }

    pub(crate) fn tautology(&self, tautological: Tautologies<'_>) -> bool {
        self.items.tautology(tautological)
    }

    pub(crate) fn prune(&mut self, tautological: Tautologies<'_>) {
        self.items.prune(tautological);
    }

    pub(crate) fn evaluate(&self, value: &Value, ctx: &EvalContext<'_>) -> Violations {
        let Some(list) = value.as_list() else {
            return Ok(Vec::new());
        };

        let mut violations = Vec::new();
        for (index, item) in list.iter().enumerate() {
            let found = self.items.evaluate(item, ctx)?;
            if found.is_empty() {
                continue;
            }
            for mut violation in found {
                violation.prepend_path(FieldPathElement::index(index));
                violations.push(violation);
            }
            if ctx.fail_fast() {
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

    use super::ListEval;
    use crate::path::{FieldPath, Subscript};
    use crate::validator::evaluator::cel::{CompiledProgram, Programs};
    use crate::validator::evaluator::test_support::{snapshot, with_context};
    use crate::validator::evaluator::value::ValueEval;
    use crate::validator::evaluator::Evaluator;

    fn non_empty_items() -> ListEval {
        let mut items = ValueEval::new(None);
        items.append(Evaluator::Programs(Programs::new(vec![
            CompiledProgram::custom(
                &Rule::new("item", "must not be empty", "this != ''"),
                FieldPath::default(),
            )
            .expect("compiles"),
        ])));
        ListEval::new(items)
    }

    #[test]
    fn subscripts_point_at_failing_elements() {
        let list = Value::List(vec![
            Value::String("ok".into()),
            Value::String(String::new()),
            Value::String(String::new()),
        ]);
        let eval = non_empty_items();
        let snapshot = snapshot(Vec::new());

        let all = with_context(&snapshot, false, |ctx| eval.evaluate(&list, ctx))
            .expect("evaluates");
        let subscripts: Vec<_> = all
            .iter()
            .map(|v| v.field_path().elements()[0].subscript.clone())
            .collect();
        assert_eq!(
            subscripts,
            vec![Some(Subscript::Index(1)), Some(Subscript::Index(2))]
        );

        let first = with_context(&snapshot, true, |ctx| eval.evaluate(&list, ctx))
            .expect("evaluates");
        assert_eq!(first.len(), 1);
    }
}
