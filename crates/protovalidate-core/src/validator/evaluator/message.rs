use prost_reflect::DynamicMessage;

use super::{EvalContext, MessageEvaluator, Tautologies, Violations};

/// Compiled rules of one message type: message-level expressions, then
/// oneofs, then fields.
#[derive(Default)]
pub(crate) struct MessageEval {
    children: Vec<MessageEvaluator>,
    tautology: bool,
}

impl MessageEval {
    /// A message with no rules, also used for `disabled` message rules.
    pub(crate) fn empty() -> Self {
        Self {
            children: Vec::new(),
            tautology: true,
        }
    }

    /// Appends a child. Tautological children are dropped by `settle`.
    pub(crate) fn append(&mut self, child: MessageEvaluator) {
        self.children.push(child);
    }

    /// Whether every child is a tautology under `tautological`.
    pub(crate) fn compute_tautology(&self, tautological: Tautologies<'_>) -> bool {
        self.children.iter().all(|c| c.tautology(tautological))
    }

    /// Records the settled tautology flag and drops tautological children.
    pub(crate) fn settle(&mut self, tautological: Tautologies<'_>) {
        for child in &mut self.children {
            child.prune(tautological);
        }
        self.children.retain(|c| !c.tautology(tautological));
        self.tautology = self.children.is_empty();
    }

    /// Keeps every child; the message is never treated as a tautology.
    pub(crate) fn settle_unpruned(&mut self) {
        self.tautology = false;
    }

    pub(crate) fn tautology(&self) -> bool {
        self.tautology
    }

    pub(crate) fn evaluate(&self, msg: &DynamicMessage, ctx: &EvalContext<'_>) -> Violations {
        let mut violations = Vec::new();
        for child in &self.children {
            let found = child.evaluate(msg, ctx)?;
            let failed = !found.is_empty();
            violations.extend(found);
            if failed && ctx.fail_fast() {
                break;
            }
        }
        Ok(violations)
    }
}
