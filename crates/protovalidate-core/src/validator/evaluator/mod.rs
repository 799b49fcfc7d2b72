//! Evaluator tree nodes.
//!
//! Messages live in the snapshot arena and are referenced by [`MessageId`],
//! which lets recursive schemas share one node per message type. Every node
//! reports whether it is a tautology given which messages are tautological,
//! so the compiler can settle recursive types as a fixpoint and prune before
//! publishing.

pub(crate) mod any;
pub(crate) mod cel;
pub(crate) mod embedded;
pub(crate) mod enum_check;
pub(crate) mod field;
pub(crate) mod list;
pub(crate) mod map;
pub(crate) mod message;
pub(crate) mod oneof;
pub(crate) mod value;
pub(crate) mod wrapper;

use cel::Context;
use prost_reflect::{DynamicMessage, Value};

use crate::error::ExecutionError;
use crate::violation::Violation;

use self::any::AnyEval;
use self::cel::Programs;
use self::embedded::EmbeddedEval;
use self::enum_check::EnumEval;
use self::field::FieldEval;
use self::list::ListEval;
use self::map::MapEval;
use self::message::MessageEval;
use self::oneof::OneofEval;
use self::wrapper::WrapperEval;
use super::builder::Snapshot;

/// Index of a compiled message in the snapshot arena.
pub(crate) type MessageId = usize;

pub(crate) type Violations = Result<Vec<Violation>, ExecutionError>;

/// Answers whether the message at an id is a tautology.
pub(crate) type Tautologies<'a> = &'a dyn Fn(MessageId) -> bool;

/// Read-only state shared by one validation call.
pub(crate) struct EvalContext<'a> {
    pub snapshot: &'a Snapshot,
    /// Library functions and `now`, bound once for the whole call.
    pub scope: &'a Context<'static>,
    pub fail_fast: bool,
}

impl EvalContext<'_> {
    pub(crate) fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Evaluates the arena message `id` against `msg`.
    pub(crate) fn evaluate_message(&self, id: MessageId, msg: &DynamicMessage) -> Violations {
        match self.snapshot.message(id) {
            Some(eval) => eval.evaluate(msg, self),
            None => Ok(vec![unavailable(msg.descriptor().full_name())]),
        }
    }
}

/// The violation reported for a message type with no compiled evaluator.
pub(crate) fn unavailable(full_name: &str) -> Violation {
    Violation::new(
        "unavailable",
        format!("no evaluator available for {full_name}"),
    )
}

/// Nodes applied to a whole message.
pub(crate) enum MessageEvaluator {
    Programs(Programs),
    Oneof(OneofEval),
    Field(FieldEval),
}

impl MessageEvaluator {
    pub(crate) fn tautology(&self, tautological: Tautologies<'_>) -> bool {
        match self {
            Self::Programs(programs) => programs.tautology(),
            Self::Oneof(oneof) => oneof.tautology(),
            Self::Field(field) => field.tautology(tautological),
        }
    }

    pub(crate) fn prune(&mut self, tautological: Tautologies<'_>) {
        if let Self::Field(field) = self {
            field.prune(tautological);
        }
    }

    pub(crate) fn evaluate(&self, msg: &DynamicMessage, ctx: &EvalContext<'_>) -> Violations {
        match self {
            Self::Programs(programs) => programs.evaluate_message(msg, ctx),
            Self::Oneof(oneof) => Ok(oneof.evaluate(msg)),
            Self::Field(field) => field.evaluate(msg, ctx),
        }
    }
}

/// Nodes applied to a single field value, list element, map key or map value.
pub(crate) enum Evaluator {
    Programs(Programs),
    Embedded(EmbeddedEval),
    Wrapper(WrapperEval),
    Any(AnyEval),
    Enum(EnumEval),
    Map(MapEval),
    List(ListEval),
}

impl Evaluator {
    pub(crate) fn tautology(&self, tautological: Tautologies<'_>) -> bool {
        match self {
            Self::Programs(programs) => programs.tautology(),
            Self::Embedded(embedded) => embedded.tautology(tautological),
            Self::Wrapper(wrapper) => wrapper.tautology(tautological),
            Self::Any(any) => any.tautology(),
            Self::Enum(_) => false,
            Self::Map(map) => map.tautology(tautological),
            Self::List(list) => list.tautology(tautological),
        }
    }

    pub(crate) fn prune(&mut self, tautological: Tautologies<'_>) {
        match self {
            Self::Wrapper(wrapper) => wrapper.prune(tautological),
            Self::Map(map) => map.prune(tautological),
            Self::List(list) => list.prune(tautological),
            Self::Programs(_) | Self::Embedded(_) | Self::Any(_) | Self::Enum(_) => {}
        }
    }

    /// Rule children get the enclosing rule-path prefix; message recursion
    /// reports paths relative to its own rules.
    pub(crate) fn reports_rules(&self) -> bool {
        !matches!(self, Self::Embedded(_))
    }

    pub(crate) fn evaluate(&self, value: &Value, ctx: &EvalContext<'_>) -> Violations {
        match self {
            Self::Programs(programs) => programs.evaluate_value(value, ctx),
            Self::Embedded(embedded) => embedded.evaluate(value, ctx),
            Self::Wrapper(wrapper) => wrapper.evaluate(value, ctx),
            Self::Any(any) => Ok(any.evaluate(value, ctx.fail_fast())),
            Self::Enum(check) => Ok(check.evaluate(value)),
            Self::Map(map) => map.evaluate(value, ctx),
            Self::List(list) => list.evaluate(value, ctx),
        }
    }
}
