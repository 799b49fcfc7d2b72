//! Custom functions registered on every expression context.

use std::collections::HashSet;
use std::mem::discriminant;
use std::sync::Arc;

use cel::extractors::{Arguments, This};
use cel::objects::Key as CelKey;
use cel::{Context, ExecutionError as CelExecutionError, FunctionContext, Value as CelValue};

use super::rules::format::format;
use super::rules::string as grammar;

/// Creates a context carrying the validation library functions and no variables.
pub(crate) fn build_context() -> Context<'static> {
    let mut ctx = Context::default();
    register(&mut ctx);
    ctx
}

fn register(ctx: &mut Context<'_>) {
    // `int` is overridden to also accept timestamps.
    ctx.add_function("int", cel_int);
    ctx.add_function("unique", cel_unique);
    ctx.add_function("getField", cel_get_field);
    ctx.add_function("isNan", cel_is_nan);
    ctx.add_function("isInf", cel_is_inf);
    ctx.add_function("isHostname", cel_is_hostname);
    ctx.add_function("isEmail", cel_is_email);
    ctx.add_function("isIp", cel_is_ip);
    ctx.add_function("isIpPrefix", cel_is_ip_prefix);
    ctx.add_function("isUri", cel_is_uri);
    ctx.add_function("isUriRef", cel_is_uri_ref);
    ctx.add_function("isHostAndPort", cel_is_host_and_port);
    ctx.add_function("startsWith", cel_starts_with);
    ctx.add_function("endsWith", cel_ends_with);
    ctx.add_function("contains", cel_contains);
    ctx.add_function("format", cel_format);
}

/// `int()` with the timestamp to epoch-seconds conversion the `cel` crate lacks.
fn cel_int(
    ftx: &FunctionContext<'_, '_>,
    This(this): This<CelValue>,
) -> Result<CelValue, CelExecutionError> {
    match this {
        CelValue::Timestamp(ts) => Ok(CelValue::Int(ts.timestamp())),
        CelValue::String(v) => v
            .parse::<i64>()
            .map(CelValue::Int)
            .map_err(|e| ftx.error(format!("string parse error: {e}"))),
        CelValue::Float(v) => {
            #[allow(clippy::cast_precision_loss)]
            if v.is_nan() || v >= i64::MAX as f64 || v < i64::MIN as f64 {
                return Err(ftx.error("integer overflow"));
            }
            #[allow(clippy::cast_possible_truncation)]
            Ok(CelValue::Int(v as i64))
        }
        CelValue::Int(v) => Ok(CelValue::Int(v)),
        CelValue::UInt(v) => Ok(CelValue::Int(
            v.try_into().map_err(|_| ftx.error("integer overflow"))?,
        )),
        v => Err(ftx.error(format!("cannot convert {} to int", v.type_of()))),
    }
}

/// Drops the receiver from `args` when the function was called as `f(x, ...)`.
fn call_args_without_this<'a>(
    ftx: &FunctionContext<'_, '_>,
    args: &'a [CelValue],
) -> Result<&'a [CelValue], CelExecutionError> {
    if ftx.this.is_some() {
        return Ok(args);
    }
    match args.split_first() {
        Some((_, tail)) => Ok(tail),
        None => Err(CelExecutionError::NoSuchOverload),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum UniqueKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(u64),
    String(Arc<String>),
    Bytes(Arc<Vec<u8>>),
}

fn unique_key(value: &CelValue) -> Option<UniqueKey> {
    match value {
        CelValue::Bool(v) => Some(UniqueKey::Bool(*v)),
        CelValue::Int(v) => Some(UniqueKey::Int(*v)),
        CelValue::UInt(v) => Some(UniqueKey::Uint(*v)),
        // -0.0 and 0.0 are the same element.
        CelValue::Float(v) => Some(UniqueKey::Float(if *v == 0.0 { 0 } else { v.to_bits() })),
        CelValue::String(v) => Some(UniqueKey::String(Arc::clone(v))),
        CelValue::Bytes(v) => Some(UniqueKey::Bytes(Arc::clone(v))),
        _ => None,
    }
}

fn cel_unique(
    ftx: &FunctionContext<'_, '_>,
    This(this): This<CelValue>,
) -> Result<bool, CelExecutionError> {
    let CelValue::List(values) = this else {
        return Err(CelExecutionError::NoSuchOverload);
    };

    let mut seen = HashSet::with_capacity(values.len());
    let mut kind = None;
    for value in values.iter() {
        let Some(key) = unique_key(value) else {
            return Err(ftx.error(format!(
                "unique: unsupported element type {}",
                value.type_of()
            )));
        };
        let key_kind = discriminant(&key);
        if *kind.get_or_insert(key_kind) != key_kind {
            return Err(ftx.error("unique: list elements must share a single type"));
        }
        if !seen.insert(key) {
            return Ok(false);
        }
    }
    Ok(true)
}

#[allow(clippy::needless_pass_by_value)]
fn cel_get_field(
    This(this): This<CelValue>,
    field_name: Arc<String>,
) -> Result<CelValue, CelExecutionError> {
    let CelValue::Map(map) = this else {
        return Err(CelExecutionError::NoSuchOverload);
    };
    map.get(&CelKey::String(Arc::clone(&field_name)))
        .cloned()
        .ok_or_else(|| CelExecutionError::no_such_key(field_name.as_ref()))
}

fn cel_is_nan(
    ftx: &FunctionContext<'_, '_>,
    This(value): This<f64>,
    Arguments(args): Arguments,
) -> Result<bool, CelExecutionError> {
    if !call_args_without_this(ftx, args.as_slice())?.is_empty() {
        return Err(CelExecutionError::NoSuchOverload);
    }
    Ok(value.is_nan())
}

fn cel_is_inf(
    ftx: &FunctionContext<'_, '_>,
    This(value): This<f64>,
    Arguments(args): Arguments,
) -> Result<bool, CelExecutionError> {
    let sign = match call_args_without_this(ftx, args.as_slice())? {
        [] => 0,
        [CelValue::Int(sign)] => *sign,
        _ => return Err(CelExecutionError::NoSuchOverload),
    };

    Ok(value.is_infinite()
        && (sign == 0
            || (sign > 0 && value.is_sign_positive())
            || (sign < 0 && value.is_sign_negative())))
}

fn cel_is_hostname(This(value): This<Arc<String>>) -> bool {
    grammar::is_hostname(&value)
}

fn cel_is_email(This(value): This<Arc<String>>) -> bool {
    grammar::is_email(&value)
}

fn cel_is_ip(
    ftx: &FunctionContext<'_, '_>,
    This(value): This<Arc<String>>,
    Arguments(args): Arguments,
) -> Result<bool, CelExecutionError> {
    match call_args_without_this(ftx, args.as_slice())? {
        [] => Ok(grammar::is_ip(&value, 0)),
        [CelValue::Int(version)] => Ok(grammar::is_ip(&value, *version)),
        _ => Err(CelExecutionError::NoSuchOverload),
    }
}

fn cel_is_ip_prefix(
    ftx: &FunctionContext<'_, '_>,
    This(value): This<Arc<String>>,
    Arguments(args): Arguments,
) -> Result<bool, CelExecutionError> {
    let (version, strict) = match call_args_without_this(ftx, args.as_slice())? {
        [] => (0, false),
        [CelValue::Int(version)] => (*version, false),
        [CelValue::Bool(strict)] => (0, *strict),
        [CelValue::Int(version), CelValue::Bool(strict)] => (*version, *strict),
        _ => return Err(CelExecutionError::NoSuchOverload),
    };
    Ok(grammar::is_ip_prefix(&value, version, strict))
}

fn cel_is_uri(This(value): This<Arc<String>>) -> bool {
    grammar::is_uri(&value)
}

fn cel_is_uri_ref(This(value): This<Arc<String>>) -> bool {
    grammar::is_uri_ref(&value)
}

fn cel_is_host_and_port(This(value): This<Arc<String>>, port_required: bool) -> bool {
    grammar::is_host_and_port(&value, port_required)
}

fn cel_starts_with(
    This(this): This<CelValue>,
    prefix: CelValue,
) -> Result<bool, CelExecutionError> {
    match (this, prefix) {
        (CelValue::String(value), CelValue::String(prefix)) => {
            Ok(value.starts_with(prefix.as_str()))
        }
        (CelValue::Bytes(value), CelValue::Bytes(prefix)) => {
            Ok(value.starts_with(prefix.as_slice()))
        }
        _ => Err(CelExecutionError::NoSuchOverload),
    }
}

fn cel_ends_with(This(this): This<CelValue>, suffix: CelValue) -> Result<bool, CelExecutionError> {
    match (this, suffix) {
        (CelValue::String(value), CelValue::String(suffix)) => Ok(value.ends_with(suffix.as_str())),
        (CelValue::Bytes(value), CelValue::Bytes(suffix)) => Ok(value.ends_with(suffix.as_slice())),
        _ => Err(CelExecutionError::NoSuchOverload),
    }
}

/// Substring search for strings and bytes; membership for lists and map keys.
fn cel_contains(
    This(this): This<CelValue>,
    needle: CelValue,
) -> Result<bool, CelExecutionError> {
    match (this, needle) {
        (CelValue::String(value), CelValue::String(needle)) => Ok(value.contains(needle.as_str())),
        (CelValue::Bytes(value), CelValue::Bytes(needle)) => Ok(needle.is_empty()
            || value
                .windows(needle.len())
                .any(|window| window == needle.as_slice())),
        (CelValue::List(items), needle) => Ok(items.contains(&needle)),
        (CelValue::Map(map), needle) => {
            Ok(map_key(&needle).is_some_and(|key| map.get(&key).is_some()))
        }
        _ => Err(CelExecutionError::NoSuchOverload),
    }
}

fn map_key(value: &CelValue) -> Option<CelKey> {
    match value {
        CelValue::Int(v) => Some(CelKey::Int(*v)),
        CelValue::UInt(v) => Some(CelKey::Uint(*v)),
        CelValue::Bool(v) => Some(CelKey::Bool(*v)),
        CelValue::String(v) => Some(CelKey::String(Arc::clone(v))),
        _ => None,
    }
}

/// `string.format(list)`: printf-style rendering of the list items.
fn cel_format(
    ftx: &FunctionContext<'_, '_>,
    This(template): This<Arc<String>>,
    Arguments(args): Arguments,
) -> Result<CelValue, CelExecutionError> {
    let [CelValue::List(items)] = call_args_without_this(ftx, args.as_slice())? else {
        return Err(CelExecutionError::NoSuchOverload);
    };
    format(&template, items)
        .map(|rendered| CelValue::String(Arc::new(rendered)))
        .map_err(|e| ftx.error(e.to_string()))
}
