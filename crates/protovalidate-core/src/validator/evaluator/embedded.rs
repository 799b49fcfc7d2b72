use prost_reflect::Value;

use super::{EvalContext, MessageId, Tautologies, Violations};

/// Recurses into a message-typed value with the rules of its type.
pub(crate) struct EmbeddedEval {
    message: MessageId,
}

impl EmbeddedEval {
    pub(crate) fn new(message: MessageId) -> Self {
        Self { message }
    }

    pub(crate) fn tautology(&self, tautological: Tautologies<'_>) -> bool {
        tautological(self.message)
    }

    pub(crate) fn evaluate(&self, value: &Value, ctx: &EvalContext<'_>) -> Violations {
        match value.as_message() {
            Some(msg) => ctx.evaluate_message(self.message, msg),
            None => Ok(Vec::new()),
        }
    }
}
