use std::borrow::Cow;

use prost_reflect::Value;

use super::value::ValueEval;
use super::{EvalContext, Tautologies, Violations};

/// Unwraps a well-known wrapper message (e.g. `google.protobuf.StringValue`)
/// and applies the scalar rules to its `value` field.
pub(crate) struct WrapperEval {
    inner: ValueEval,
}

impl WrapperEval {
    pub(crate) fn new(inner: ValueEval) -> Self {
        Self { inner }
    }

    pub(crate) fn tautology(&self, tautological: Tautologies<'_>) -> bool {
        self.inner.tautology(tautological)
    }

    pub(crate) fn prune(&mut self, tautological: Tautologies<'_>) {
        self.inner.prune(tautological);
    }

    pub(crate) fn evaluate(&self, value: &Value, ctx: &EvalContext<'_>) -> Violations {
        let Some(wrapper) = value.as_message() else {
            return Ok(Vec::new());
        };
        let inner = wrapper
            .get_field_by_number(1)
            .unwrap_or(Cow::Owned(Value::Bool(false)));
        self.inner.evaluate(&inner, ctx)
    }
}
