use std::collections::HashSet;

use prost_reflect::{EnumDescriptor, FieldDescriptor, Value};

use crate::path::{FieldPath, FieldPathElement};
use crate::violation::Violation;

/// `enum.defined_only`: the number must name a value of the enum.
pub(crate) struct EnumEval {
    defined: HashSet<i32>,
    rule: FieldDescriptor,
    path: FieldPath,
}

impl EnumEval {
    /// `case` is `FieldRules.enum`, `rule` is `EnumRules.defined_only`.
    pub(crate) fn new(enum_type: &EnumDescriptor, case: &FieldDescriptor, rule: FieldDescriptor) -> Self {
        Self {
            defined: enum_type.values().map(|v| v.number()).collect(),
            path: FieldPath::new(vec![
                FieldPathElement::field(case),
                FieldPathElement::field(&rule),
            ]),
            rule,
        }
    }

    pub(crate) fn evaluate(&self, value: &Value) -> Vec<Violation> {
        match value.as_enum_number() {
            Some(number) if !self.defined.contains(&number) => vec![
                Violation::new(
                    "enum.defined_only",
                    "value must be one of the defined enum values",
                )
                .with_rule_path(self.path.clone())
                .with_rule(self.rule.clone(), Value::Bool(true))
                .with_field_value(value.clone()),
            ],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use prost_reflect::Value;
    use protovalidate_rules::DESCRIPTOR_POOL;

    use super::EnumEval;

    #[test]
    fn undefined_numbers_are_reported() {
        let ignore = DESCRIPTOR_POOL
            .get_enum_by_name("buf.validate.Ignore")
            .expect("Ignore enum exists");
        let case = DESCRIPTOR_POOL
            .get_message_by_name("buf.validate.FieldRules")
            .and_then(|m| m.get_field_by_name("enum"))
            .expect("FieldRules.enum exists");
        let rule = DESCRIPTOR_POOL
            .get_message_by_name("buf.validate.EnumRules")
            .and_then(|m| m.get_field_by_name("defined_only"))
            .expect("EnumRules.defined_only exists");
        let eval = EnumEval::new(&ignore, &case, rule);

        assert!(eval.evaluate(&Value::EnumNumber(1)).is_empty());
        let found = eval.evaluate(&Value::EnumNumber(99));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule_id(), "enum.defined_only");
        assert_eq!(found[0].rule_path().to_string(), "enum.defined_only");
        assert_eq!(found[0].rule_value(), Some(&Value::Bool(true)));
    }
}
