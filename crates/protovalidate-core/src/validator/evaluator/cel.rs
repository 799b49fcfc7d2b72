use std::collections::HashMap;
use std::sync::Arc;

use cel::objects::Key as CelKey;
use cel::{Context, ExecutionError as CelExecutionError, Program, Value as CelValue};
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use prost_reflect::{DynamicMessage, FieldDescriptor, MapKey, Value};
use prost_types::Timestamp;
use protovalidate_rules::Rule;

use crate::config::ValidationConfig;
use crate::error::{CompilationError, ExecutionError};
use crate::path::FieldPath;
use crate::violation::Violation;

use super::super::functions::build_context;
use super::{EvalContext, Violations};

/// A compiled expression together with the metadata reported on violation.
#[derive(Clone)]
pub(crate) struct CompiledProgram {
    program: Arc<Program>,
    rule_id: String,
    /// Reported when the expression yields `false`.
    message: String,
    rule_path: FieldPath,
    rule: Option<(FieldDescriptor, Value)>,
    rules_binding: Option<CelValue>,
    rule_binding: Option<CelValue>,
}

impl CompiledProgram {
    /// Compiles a user-supplied `buf.validate.Rule`.
    pub(crate) fn custom(rule: &Rule, rule_path: FieldPath) -> Result<Self, CompilationError> {
        if rule.expression.is_empty() {
            return Err(CompilationError::new(format!(
                "rule `{}` has an empty expression",
                rule.id
            )));
        }
        let program = Program::compile(&rule.expression).map_err(|e| {
            CompilationError::new(format!(
                "failed to compile expression `{}`: {e}",
                rule.expression
            ))
        })?;
        Ok(Self {
            program: Arc::new(program),
            rule_id: rule.id.clone(),
            message: rule.message.clone(),
            rule_path,
            rule: None,
            rules_binding: None,
            rule_binding: None,
        })
    }

    /// A standard rule program with `rules` and `rule` bound as constants.
    pub(crate) fn standard(
        program: Arc<Program>,
        rule_id: &str,
        message: Option<&str>,
        rule_path: FieldPath,
        rule: (FieldDescriptor, Value),
        rules_binding: CelValue,
    ) -> Self {
        let rule_binding = value_to_cel(&rule.1);
        Self {
            program,
            rule_id: rule_id.to_string(),
            message: message.unwrap_or_default().to_string(),
            rule_path,
            rule: Some(rule),
            rules_binding: Some(rules_binding),
            rule_binding: Some(rule_binding),
        }
    }

    pub(crate) fn rule_id(&self) -> &str {
        &self.rule_id
    }

    fn bind_constants(&self, ctx: &mut Context<'_>) {
        if let Some(rules) = &self.rules_binding {
            ctx.add_variable_from_value("rules", rules.clone());
        }
        if let Some(rule) = &self.rule_binding {
            ctx.add_variable_from_value("rule", rule.clone());
        }
    }

    fn execute(&self, this: CelValue, scope: &Context<'_>) -> Result<CelValue, CelExecutionError> {
        let mut ctx = scope.new_inner_scope();
        self.bind_constants(&mut ctx);
        ctx.add_variable_from_value("this", this);
        self.program.execute(&ctx)
    }

    /// Runs the program with only the constant bindings. A pass without
    /// `this` means the program passes for every value; any other outcome,
    /// including an error from reading `this`, keeps it.
    pub(crate) fn always_passes(&self) -> bool {
        let mut ctx = build_context();
        self.bind_constants(&mut ctx);
        match self.program.execute(&ctx) {
            Ok(CelValue::Bool(pass)) => pass,
            Ok(CelValue::String(msg)) => msg.is_empty(),
            Ok(_) | Err(_) => false,
        }
    }

    /// Rejects a program whose result for `sample`, the zero value of what
    /// `this` holds at run time, is neither bool nor string.
    ///
    /// The `cel` crate has no type checker, so this is a sampled check: a
    /// program that fails on the sample is accepted and judged per value.
    pub(crate) fn check_result_type(self, sample: CelValue) -> Result<Self, CompilationError> {
        let mut scope = build_context();
        if let Ok(epoch) = timestamp_to_cel(&Timestamp::default()) {
            scope.add_variable_from_value("now", epoch);
        }
        match self.execute(sample, &scope) {
            Ok(CelValue::Bool(_) | CelValue::String(_)) | Err(_) => Ok(self),
            Ok(other) => Err(CompilationError::new(format!(
                "rule `{}` yields `{}`, expected bool or string",
                self.rule_id,
                other.type_of()
            ))),
        }
    }

    pub(crate) fn evaluate(
        &self,
        this: CelValue,
        scope: &Context<'_>,
    ) -> Result<Option<Violation>, ExecutionError> {
        let result = self.execute(this, scope).map_err(|e| {
            ExecutionError::new(format!("failed to evaluate rule `{}`: {e}", self.rule_id))
        })?;

        let message = match result {
            CelValue::Bool(true) => return Ok(None),
            CelValue::Bool(false) => self.message.clone(),
            CelValue::String(msg) if msg.is_empty() => return Ok(None),
            CelValue::String(msg) => msg.as_ref().clone(),
            other => {
                return Err(ExecutionError::new(format!(
                    "rule `{}` returned unsupported type `{}`, expected bool or string",
                    self.rule_id,
                    other.type_of()
                )));
            }
        };

        let mut violation =
            Violation::new(self.rule_id.clone(), message).with_rule_path(self.rule_path.clone());
        if let Some((descriptor, value)) = &self.rule {
            violation = violation.with_rule(descriptor.clone(), value.clone());
        }
        Ok(Some(violation))
    }
}

/// Ordered expression programs sharing one `this`.
#[derive(Clone, Default)]
pub(crate) struct Programs {
    programs: Vec<CompiledProgram>,
}

impl Programs {
    pub(crate) fn new(programs: Vec<CompiledProgram>) -> Self {
        Self { programs }
    }

    pub(crate) fn tautology(&self) -> bool {
        self.programs.is_empty()
    }

    /// Evaluates with `this` bound to a field value, which is also recorded
    /// on each violation.
    pub(crate) fn evaluate_value(&self, value: &Value, ctx: &EvalContext<'_>) -> Violations {
        self.run(&value_to_cel(value), Some(value), ctx)
    }

    /// Evaluates with `this` bound to a whole message.
    pub(crate) fn evaluate_message(&self, msg: &DynamicMessage, ctx: &EvalContext<'_>) -> Violations {
        self.run(&message_to_cel(msg), None, ctx)
    }

    fn run(&self, this: &CelValue, field_value: Option<&Value>, ctx: &EvalContext<'_>) -> Violations {
        let mut violations = Vec::new();
        for program in &self.programs {
            if let Some(mut violation) = program.evaluate(this.clone(), ctx.scope)? {
                if let Some(value) = field_value {
                    violation = violation.with_field_value(value.clone());
                }
                violations.push(violation);
                if ctx.fail_fast() {
                    break;
                }
            }
        }
        Ok(violations)
    }
}

/// The root scope of one validation call: the library functions plus `now`,
/// read once from the configured clock.
pub(crate) fn call_scope(cfg: &ValidationConfig) -> Result<Context<'static>, ExecutionError> {
    let mut scope = build_context();
    scope.add_variable_from_value("now", timestamp_to_cel(&(cfg.now_fn)())?);
    Ok(scope)
}

pub(crate) fn timestamp_to_cel(ts: &Timestamp) -> Result<CelValue, ExecutionError> {
    let nanos = u32::try_from(ts.nanos)
        .ok()
        .filter(|n| *n <= 999_999_999)
        .ok_or_else(|| ExecutionError::new(format!("invalid `now` nanos `{}`", ts.nanos)))?;
    DateTime::<Utc>::from_timestamp(ts.seconds, nanos)
        .and_then(utc_to_cel)
        .ok_or_else(|| ExecutionError::new(format!("invalid `now` seconds `{}`", ts.seconds)))
}

fn utc_to_cel(utc: DateTime<Utc>) -> Option<CelValue> {
    Some(CelValue::Timestamp(
        utc.with_timezone(&FixedOffset::east_opt(0)?),
    ))
}

/// The populated fields of a rule message, keyed by name. Unset fields are
/// left out so that `has(rules.x)` reflects the rule definition.
pub(crate) fn rules_to_cel(rules: &DynamicMessage) -> CelValue {
    let map: HashMap<CelKey, CelValue> = rules
        .fields()
        .map(|(field, value)| {
            (
                CelKey::String(Arc::new(field.name().to_string())),
                value_to_cel(value),
            )
        })
        .collect();
    CelValue::Map(map.into())
}

/// Converts a message into a CEL map keyed by field name.
///
/// Fields that track presence and are unset are left out, so `has(this.f)`
/// is false for them. Implicit-presence scalars and empty lists and maps
/// appear with their defaults.
pub(crate) fn message_to_cel(msg: &DynamicMessage) -> CelValue {
    if let Some(value) = well_known_to_cel(msg) {
        return value;
    }
    let mut out: HashMap<CelKey, CelValue> = HashMap::new();
    for field in msg.descriptor().fields() {
        let value = if msg.has_field(&field) {
            value_to_cel(&msg.get_field(&field))
        } else if field.supports_presence() {
            continue;
        } else {
            value_to_cel(&field.default_value())
        };
        out.insert(CelKey::String(Arc::new(field.name().to_string())), value);
    }
    CelValue::Map(out.into())
}

/// Wrappers, `Duration` and `Timestamp` become native values.
fn well_known_to_cel(msg: &DynamicMessage) -> Option<CelValue> {
    let field = |number: u32| msg.get_field_by_number(number);
    let value = match msg.descriptor().full_name() {
        "google.protobuf.BoolValue"
        | "google.protobuf.Int32Value"
        | "google.protobuf.Int64Value"
        | "google.protobuf.UInt32Value"
        | "google.protobuf.UInt64Value"
        | "google.protobuf.FloatValue"
        | "google.protobuf.DoubleValue"
        | "google.protobuf.StringValue"
        | "google.protobuf.BytesValue" => value_to_cel(&field(1)?),
        "google.protobuf.Duration" => {
            let seconds = field(1)?.as_i64()?;
            let nanos = field(2)?.as_i32()?;
            let delta = TimeDelta::try_seconds(seconds)?
                .checked_add(&TimeDelta::nanoseconds(i64::from(nanos)))?;
            CelValue::Duration(delta)
        }
        "google.protobuf.Timestamp" => {
            let seconds = field(1)?.as_i64()?;
            let nanos = u32::try_from(field(2)?.as_i32()?).ok()?;
            utc_to_cel(DateTime::<Utc>::from_timestamp(seconds, nanos)?)?
        }
        _ => return None,
    };
    Some(value)
}

fn map_key_to_cel(key: &MapKey) -> CelKey {
    match key {
        MapKey::Bool(v) => CelKey::Bool(*v),
        MapKey::I32(v) => CelKey::Int(i64::from(*v)),
        MapKey::I64(v) => CelKey::Int(*v),
        MapKey::U32(v) => CelKey::Uint(u64::from(*v)),
        MapKey::U64(v) => CelKey::Uint(*v),
        MapKey::String(v) => CelKey::String(Arc::new(v.clone())),
    }
}

pub(crate) fn value_to_cel(value: &Value) -> CelValue {
    match value {
        Value::Bool(v) => CelValue::Bool(*v),
        Value::I32(v) | Value::EnumNumber(v) => CelValue::Int(i64::from(*v)),
        Value::I64(v) => CelValue::Int(*v),
        Value::U32(v) => CelValue::UInt(u64::from(*v)),
        Value::U64(v) => CelValue::UInt(*v),
        Value::F32(v) => CelValue::Float(f64::from(*v)),
        Value::F64(v) => CelValue::Float(*v),
        Value::String(v) => CelValue::String(Arc::new(v.clone())),
        Value::Bytes(v) => CelValue::Bytes(Arc::new(v.to_vec())),
        Value::Message(m) => message_to_cel(m),
        Value::List(values) => CelValue::List(Arc::new(values.iter().map(value_to_cel).collect())),
        Value::Map(map) => {
            let out: HashMap<CelKey, CelValue> = map
                .iter()
                .map(|(key, value)| (map_key_to_cel(key), value_to_cel(value)))
                .collect();
            CelValue::Map(out.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use cel::objects::Key as CelKey;
    use pretty_assertions::assert_eq;
    use prost_reflect::{DynamicMessage, MapKey, Value};
    use protovalidate_rules::{DESCRIPTOR_POOL, FieldRules, Rule};

    use super::*;
    use crate::config::ValidationConfig;
    use crate::path::{FieldPath, FieldPathElement};
    use crate::validator::evaluator::test_support::{sample, snapshot, with_context};

    fn custom(id: &str, message: &str, expression: &str) -> CompiledProgram {
        CompiledProgram::custom(&Rule::new(id, message, expression), FieldPath::default())
            .expect("expression compiles")
    }

    #[test]
    fn non_finite_floats_pass_through() {
        let CelValue::Float(nan) = value_to_cel(&Value::F32(f32::NAN)) else {
            panic!("expected float value");
        };
        assert!(nan.is_nan());

        let nested = value_to_cel(&Value::List(vec![Value::F64(f64::NEG_INFINITY)]));
        let CelValue::List(items) = nested else {
            panic!("expected list value");
        };
        assert_eq!(items[0], CelValue::Float(f64::NEG_INFINITY));
    }

    #[test]
    fn map_keys_keep_their_type() {
        let mut map = HashMap::new();
        map.insert(MapKey::I32(1), Value::String("one".to_string()));
        let CelValue::Map(map) = value_to_cel(&Value::Map(map)) else {
            panic!("expected map value");
        };
        assert!(map.get(&CelKey::Int(1)).is_some());
        assert!(map.get(&CelKey::String(Arc::new("1".to_string()))).is_none());
    }

    #[test]
    fn wrappers_unwrap_to_scalars() {
        let desc = DESCRIPTOR_POOL
            .get_message_by_name("google.protobuf.Int32Value")
            .expect("wrapper in pool");
        let mut msg = DynamicMessage::new(desc);
        msg.set_field_by_name("value", Value::I32(7));
        assert_eq!(message_to_cel(&msg), CelValue::Int(7));
    }

    #[test]
    fn rules_binding_omits_unset_fields() {
        let rules = FieldRules::parse_text("string { min_len: 3 }").expect("rules parse");
        let standard = rules.standard().expect("string case");
        let CelValue::Map(map) = rules_to_cel(standard.message()) else {
            panic!("expected map value");
        };
        assert_eq!(map.map.len(), 1);
        assert_eq!(
            map.get(&CelKey::String(Arc::new("min_len".to_string()))),
            Some(&CelValue::UInt(3))
        );
    }

    #[test]
    fn bool_and_string_results_map_to_violations() {
        let scope = call_scope(&ValidationConfig::default()).expect("default clock is valid");

        let violation = custom("foo", "fizz", "false")
            .evaluate(CelValue::Null, &scope)
            .expect("evaluates")
            .expect("false is a violation");
        assert_eq!(violation.rule_id(), "foo");
        assert_eq!(violation.message(), "fizz");

        let violation = custom("bar", "", "'buzz'")
            .evaluate(CelValue::Null, &scope)
            .expect("evaluates")
            .expect("non-empty string is a violation");
        assert_eq!(violation.message(), "buzz");

        assert!(
            custom("ok", "", "''")
                .evaluate(CelValue::Null, &scope)
                .expect("evaluates")
                .is_none()
        );
        assert!(custom("bad_type", "", "1.23").evaluate(CelValue::Null, &scope).is_err());
    }

    #[test]
    fn compile_rejects_bad_and_empty_expressions() {
        let bad = CompiledProgram::custom(&Rule::new("bad", "", "!@#$%^&"), FieldPath::default());
        assert!(bad.is_err());
        let empty = CompiledProgram::custom(&Rule::new("empty", "", ""), FieldPath::default());
        assert!(empty.is_err());
    }

    #[test]
    fn programs_honor_fail_fast_and_record_field_value() {
        let rule_path = FieldPath::new(vec![FieldPathElement::oneof("cel")]);
        let programs = Programs::new(vec![
            CompiledProgram::custom(&Rule::new("a", "first", "this > 10"), rule_path.clone())
                .expect("compiles"),
            custom("b", "second", "this > 20"),
        ]);

        let snapshot = snapshot(Vec::new());
        let all = with_context(&snapshot, false, |ctx| programs.evaluate_value(&Value::I64(5), ctx))
            .expect("evaluates");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].rule_path().to_string(), "cel");
        assert_eq!(all[0].field_value(), Some(&Value::I64(5)));

        let first = with_context(&snapshot, true, |ctx| programs.evaluate_value(&Value::I64(5), ctx))
            .expect("evaluates");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].rule_id(), "a");
    }

    #[test]
    fn now_is_bound_from_the_configured_clock() {
        let cfg = ValidationConfig {
            now_fn: Arc::new(|| Timestamp {
                seconds: 1_672_531_200,
                nanos: 0,
            }),
            ..ValidationConfig::default()
        };
        let result = custom("now", "", "int(now) == 1672531200")
            .evaluate(CelValue::Null, &scope)
            .expect("evaluates");
        assert!(result.is_none());
    }

    #[test]
    fn unset_presence_fields_are_absent_from_messages() {
        let desc = sample();
        let mut child = DynamicMessage::new(desc.clone());
        child.set_field_by_name("name", Value::String("c".into()));
        let mut msg = DynamicMessage::new(desc);
        let key = |name: &str| CelKey::String(Arc::new(name.to_string()));

        let CelValue::Map(map) = message_to_cel(&msg) else {
            panic!("expected map value");
        };
        assert!(map.get(&key("child")).is_none());
        assert_eq!(map.get(&key("name")), Some(&CelValue::String(Arc::new(String::new()))));
        assert!(map.get(&key("tags")).is_some());

        msg.set_field_by_name("child", Value::Message(child));
        let CelValue::Map(map) = message_to_cel(&msg) else {
            panic!("expected map value");
        };
        assert!(map.get(&key("child")).is_some());
    }

    #[test]
    fn result_type_is_checked_against_a_sample() {
        let count = custom("count", "", "size(this) + 1");
        let err = count
            .check_result_type(CelValue::String(Arc::new(String::new())))
            .err()
            .expect("int result is rejected");
        assert!(err.cause.starts_with("rule `count` yields"), "{}", err.cause);
        assert!(err.cause.ends_with("expected bool or string"), "{}", err.cause);

        assert!(
            custom("len", "", "size(this) > 1")
                .check_result_type(CelValue::String(Arc::new(String::new())))
                .is_ok()
        );
        // Undecidable on the sample: the first element is read from an empty list.
        assert!(
            custom("first", "", "this[0]")
                .check_result_type(CelValue::List(Arc::new(Vec::new())))
                .is_ok()
        );
    }

    #[test]
    fn one_scope_serves_every_program_of_a_call() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cfg = ValidationConfig {
            now_fn: Arc::new(move || {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Timestamp::default()
            }),
            ..ValidationConfig::default()
        };
        let scope = call_scope(&cfg).expect("clock is valid");
        for id in ["a", "b", "c"] {
            custom(id, "", "now == now")
                .evaluate(CelValue::Null, &scope)
                .expect("evaluates");
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
