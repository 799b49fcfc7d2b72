use std::collections::HashSet;

use prost_reflect::{FieldDescriptor, Value};

use crate::path::{FieldPath, FieldPathElement};
use crate::violation::Violation;

/// One `any.in` or `any.not_in` rule.
pub(crate) struct TypeUrlRule {
    path: FieldPath,
    descriptor: FieldDescriptor,
    value: Value,
    urls: HashSet<String>,
}

impl TypeUrlRule {
    /// `case` is `FieldRules.any`, `rule` the `AnyRules` field holding `urls`.
    pub(crate) fn new(case: &FieldDescriptor, rule: FieldDescriptor, value: Value) -> Self {
        let urls = value
            .as_list()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            path: FieldPath::new(vec![
                FieldPathElement::field(case),
                FieldPathElement::field(&rule),
            ]),
            descriptor: rule,
            value,
            urls,
        }
    }

    fn violation(&self, rule_id: &str, message: &str, field_value: &Value) -> Violation {
        Violation::new(rule_id, message)
            .with_rule_path(self.path.clone())
            .with_rule(self.descriptor.clone(), self.value.clone())
            .with_field_value(field_value.clone())
    }
}

/// Allow and block lists for the type URL of a `google.protobuf.Any`.
pub(crate) struct AnyEval {
    allow: Option<TypeUrlRule>,
    block: Option<TypeUrlRule>,
}

impl AnyEval {
    pub(crate) fn new(allow: Option<TypeUrlRule>, block: Option<TypeUrlRule>) -> Self {
        let non_empty = |rule: Option<TypeUrlRule>| rule.filter(|r| !r.urls.is_empty());
        Self {
            allow: non_empty(allow),
            block: non_empty(block),
        }
    }

    pub(crate) fn tautology(&self) -> bool {
        self.allow.is_none() && self.block.is_none()
    }

    pub(crate) fn evaluate(&self, value: &Value, fail_fast: bool) -> Vec<Violation> {
        let Some(any) = value.as_message() else {
            return Vec::new();
        };
        let type_url = any
            .get_field_by_number(1)
            .and_then(|v| v.as_str().map(ToString::to_string))
            .unwrap_or_default();

        let mut violations = Vec::new();
        if let Some(allow) = &self.allow
            && !allow.urls.contains(&type_url)
        {
            violations.push(allow.violation("any.in", "type URL must be in the allow list", value));
            if fail_fast {
                return violations;
            }
        }
        if let Some(block) = &self.block
            && block.urls.contains(&type_url)
        {
            violations.push(block.violation(
                "any.not_in",
                "type URL must not be in the block list",
                value,
            ));
        }
        violations
    }
}
