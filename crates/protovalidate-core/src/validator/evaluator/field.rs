use std::borrow::Cow;

use prost_reflect::{DynamicMessage, FieldDescriptor, Value};
use protovalidate_rules::Ignore;

use crate::path::{FieldPath, FieldPathElement};
use crate::violation::Violation;

use super::value::ValueEval;
use super::{EvalContext, Tautologies, Violations};

/// Rules of a single message field: presence, ignore policy, then the value.
pub(crate) struct FieldEval {
    descriptor: FieldDescriptor,
    /// `FieldRules.required`, kept as the violated rule descriptor.
    required: Option<FieldDescriptor>,
    ignore: Ignore,
    has_presence: bool,
    zero: Value,
    value: ValueEval,
}

impl FieldEval {
    pub(crate) fn new(
        descriptor: FieldDescriptor,
        required: Option<FieldDescriptor>,
        ignore: Ignore,
        zero: Value,
        value: ValueEval,
    ) -> Self {
        let has_presence = descriptor.supports_presence();
        Self {
            descriptor,
            required,
            ignore,
            has_presence,
            zero,
            value,
        }
    }

    pub(crate) fn tautology(&self, tautological: Tautologies<'_>) -> bool {
        self.required.is_none() && self.value.tautology(tautological)
    }

    pub(crate) fn prune(&mut self, tautological: Tautologies<'_>) {
        self.value.prune(tautological);
    }

    fn ignores_absence(&self) -> bool {
        match self.ignore {
            Ignore::IfUnpopulated | Ignore::IfDefaultValue | Ignore::Always => true,
            Ignore::Unspecified => self.has_presence,
        }
    }

    pub(crate) fn evaluate(&self, msg: &DynamicMessage, ctx: &EvalContext<'_>) -> Violations {
        let number = self.descriptor.number();
        let present = msg.has_field_by_number(number);

        if let Some(rule) = &self.required
            && !present
        {
            let mut violation = Violation::new("required", "value is required")
                .with_rule_path(FieldPath::new(vec![FieldPathElement::field(rule)]))
                .with_rule(rule.clone(), Value::Bool(true));
            violation.prepend_field(&self.descriptor);
            return Ok(vec![violation]);
        }

        if !present && self.ignores_absence() {
            return Ok(Vec::new());
        }

        let value = msg
            .get_field_by_number(number)
            .unwrap_or_else(|| Cow::Owned(self.zero.clone()));
        if self.ignore == Ignore::IfDefaultValue && *value == self.zero {
            return Ok(Vec::new());
        }

        let mut violations = self.value.evaluate(&value, ctx)?;
        for violation in &mut violations {
            violation.prepend_field(&self.descriptor);
        }
        Ok(violations)
    }
}
