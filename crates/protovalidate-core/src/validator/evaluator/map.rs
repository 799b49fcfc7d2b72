use std::cmp::Ordering;

use prost_reflect::{MapKey, Value};
use prost_types::field_descriptor_proto::Type;

use crate::path::FieldPathElement;

use super::value::ValueEval;
use super::{EvalContext, Tautologies, Violations};

/// Applies key and value rules to each entry of a map field.
pub(crate) struct MapEval {
    keys: ValueEval,
    values: ValueEval,
    key_type: Type,
    value_type: Type,
}

impl MapEval {
    pub(crate) fn new(keys: ValueEval, values: ValueEval, key_type: Type, value_type: Type) -> Self {
        Self {
            keys,
            values,
            key_type,
            value_type,
        }
    }

    pub(crate) fn tautology(&self, tautological: Tautologies<'_>) -> bool {
        self.keys.tautology(tautological) && self.values.tautology(tautological)
    }

    pub(crate) fn prune(&mut self, tautological: Tautologies<'_>) {
        self.keys.prune(tautological);
        self.values.prune(tautological);
    }

    /// Entries are visited in ascending key order so results are stable.
    pub(crate) fn evaluate(&self, value: &Value, ctx: &EvalContext<'_>) -> Violations {
        let Some(map) = value.as_map() else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<(&MapKey, &Value)> = map.iter().collect();
        entries.sort_by(|a, b| key_order(a.0, b.0));

        let mut violations = Vec::new();
        for (key, entry_value) in entries {
            let mut found = self.keys.evaluate(&key_value(key), ctx)?;
            for violation in &mut found {
                violation.mark_for_key();
            }
            if found.is_empty() || !ctx.fail_fast() {
                found.extend(self.values.evaluate(entry_value, ctx)?);
            }
            if found.is_empty() {
                continue;
            }
            for mut violation in found {
                violation.prepend_path(FieldPathElement::map_entry(
                    key,
                    self.key_type,
                    self.value_type,
                ));
                violations.push(violation);
            }
            if ctx.fail_fast() {
                break;
            }
        }
        Ok(violations)
    }
}

fn key_order(a: &MapKey, b: &MapKey) -> Ordering {
    match (a, b) {
        (MapKey::Bool(a), MapKey::Bool(b)) => a.cmp(b),
        (MapKey::I32(a), MapKey::I32(b)) => a.cmp(b),
        (MapKey::I64(a), MapKey::I64(b)) => a.cmp(b),
        (MapKey::U32(a), MapKey::U32(b)) => a.cmp(b),
        (MapKey::U64(a), MapKey::U64(b)) => a.cmp(b),
        (MapKey::String(a), MapKey::String(b)) => a.cmp(b),
        // A map holds a single key kind.
        _ => Ordering::Equal,
    }
}

fn key_value(key: &MapKey) -> Value {
    match key {
        MapKey::Bool(v) => Value::Bool(*v),
        MapKey::I32(v) => Value::I32(*v),
        MapKey::I64(v) => Value::I64(*v),
        MapKey::U32(v) => Value::U32(*v),
        MapKey::U64(v) => Value::U64(*v),
        MapKey::String(v) => Value::String(v.clone()),
    }
}
