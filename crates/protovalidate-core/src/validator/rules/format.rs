//! printf-style formatting behind the CEL `string.format(list)` function.
//!
//! Supported clauses are `%d %x %X %s %e %f %b %o` and the literal `%%`.
//! `%e` and `%f` accept a `.N` precision, which defaults to 6.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use cel::Value as CelValue;
use cel::objects::Key as CelKey;
use chrono::{SecondsFormat, TimeDelta, Utc};

/// Failure raised while rendering a format string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub(crate) struct FormatError(String);

impl FormatError {
    fn clause(clause: &str, allowed: &str, given: &CelValue) -> Self {
        Self(format!(
            "error during formatting: {clause} clause can only be used on {allowed}, was given {}",
            given.type_of()
        ))
    }
}

pub(crate) fn format(template: &str, args: &[CelValue]) -> Result<String, FormatError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut arg_index = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            None => return Err(FormatError("format: expected format specifier".into())),
            Some('%') => {
                chars.next();
                out.push('%');
                continue;
            }
            Some(_) => {}
        }
        let Some(arg) = args.get(arg_index) else {
            return Err(FormatError(format!("index {arg_index} out of range")));
        };
        arg_index += 1;

        let mut verb = chars.next().unwrap_or('%');
        let mut precision = 6;
        if verb == '.' {
            precision = 0usize;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                chars.next();
                precision = precision.saturating_mul(10).saturating_add(d as usize);
            }
            verb = chars
                .next()
                .ok_or_else(|| FormatError("format: expected format specifier".into()))?;
        }

        let rendered = match verb {
            'd' => decimal(arg)?,
            'x' => hex(arg)?,
            'X' => hex(arg)?.to_uppercase(),
            's' => string(arg)?,
            'e' => exponential(arg, precision)?,
            'f' => fixed(arg, precision)?,
            'b' => binary(arg)?,
            'o' => octal(arg)?,
            other => {
                return Err(FormatError(format!(
                    "could not parse formatting clause: unrecognized formatting clause \"{other}\""
                )));
            }
        };
        out.push_str(&rendered);
    }
    Ok(out)
}

fn non_finite(v: f64) -> Option<&'static str> {
    if v.is_nan() {
        Some("NaN")
    } else if v == f64::INFINITY {
        Some("Infinity")
    } else if v == f64::NEG_INFINITY {
        Some("-Infinity")
    } else {
        None
    }
}

/// Up to nine fraction digits with trailing zeros trimmed.
fn plain_float(v: f64) -> String {
    if let Some(s) = non_finite(v) {
        return s.to_string();
    }
    let mut s = format!("{v:.9}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    if s == "-0" { "0".to_string() } else { s }
}

fn decimal(arg: &CelValue) -> Result<String, FormatError> {
    match arg {
        CelValue::Int(v) => Ok(v.to_string()),
        CelValue::UInt(v) => Ok(v.to_string()),
        CelValue::Float(v) => Ok(plain_float(*v)),
        other => Err(FormatError::clause("decimal", "integers", other)),
    }
}

fn string(arg: &CelValue) -> Result<String, FormatError> {
    match arg {
        CelValue::String(s) => Ok(s.as_ref().clone()),
        CelValue::Bool(b) => Ok(b.to_string()),
        CelValue::Int(v) => Ok(v.to_string()),
        CelValue::UInt(v) => Ok(v.to_string()),
        CelValue::Float(v) => Ok(plain_float(*v)),
        CelValue::Bytes(b) => Ok(lossy_utf8(b)),
        CelValue::Duration(d) => Ok(duration(*d)),
        CelValue::Timestamp(ts) => Ok(ts
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        CelValue::List(items) => {
            let parts = items.iter().map(string).collect::<Result<Vec<_>, _>>()?;
            Ok(format!("[{}]", parts.join(", ")))
        }
        CelValue::Map(map) => {
            let mut sorted = BTreeMap::new();
            for (key, value) in map.map.iter() {
                sorted.insert(key_string(key), string(value)?);
            }
            let parts: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect();
            Ok(format!("{{{}}}", parts.join(", ")))
        }
        CelValue::Null => Ok("null".to_string()),
        other => Err(FormatError::clause(
            "string",
            "strings, bools, bytes, ints, doubles, maps, lists, types, durations, and timestamps",
            other,
        )),
    }
}

fn key_string(key: &CelKey) -> String {
    match key {
        CelKey::Int(v) => v.to_string(),
        CelKey::Uint(v) => v.to_string(),
        CelKey::Bool(v) => v.to_string(),
        CelKey::String(v) => v.as_ref().clone(),
    }
}

/// Invalid sequences decode to U+FFFD, with consecutive replacements collapsed to one.
fn lossy_utf8(bytes: &[u8]) -> String {
    let decoded = String::from_utf8_lossy(bytes);
    let mut out = String::with_capacity(decoded.len());
    let mut previous_replacement = false;
    for c in decoded.chars() {
        let replacement = c == char::REPLACEMENT_CHARACTER;
        if !(replacement && previous_replacement) {
            out.push(c);
        }
        previous_replacement = replacement;
    }
    out
}

/// Seconds with up to nine fraction digits, suffixed with `s`.
fn duration(d: TimeDelta) -> String {
    let total = i128::from(d.num_seconds()) * 1_000_000_000 + i128::from(d.subsec_nanos());
    let sign = if total < 0 { "-" } else { "" };
    let total = total.unsigned_abs();
    let (secs, nanos) = (total / 1_000_000_000, total % 1_000_000_000);
    if nanos == 0 {
        return format!("{sign}{secs}s");
    }
    let fraction = format!("{nanos:09}");
    format!("{sign}{secs}.{}s", fraction.trim_end_matches('0'))
}

fn hex(arg: &CelValue) -> Result<String, FormatError> {
    match arg {
        CelValue::Int(v) => Ok(format!("{v:x}")),
        CelValue::UInt(v) => Ok(format!("{v:x}")),
        CelValue::Bytes(b) => Ok(b.iter().fold(String::new(), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        })),
        CelValue::String(s) => {
            // The UTF-8 bytes read as one unsigned big-endian number.
            let digits = s.bytes().fold(String::new(), |mut acc, byte| {
                let _ = write!(acc, "{byte:02x}");
                acc
            });
            let trimmed = digits.trim_start_matches('0');
            Ok(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
        }
        other => Err(FormatError::clause(
            "hex",
            "integers, byte buffers, and strings",
            other,
        )),
    }
}

fn octal(arg: &CelValue) -> Result<String, FormatError> {
    match arg {
        CelValue::Int(v) => Ok(format!("{v:o}")),
        CelValue::UInt(v) => Ok(format!("{v:o}")),
        other => Err(FormatError::clause("octal", "integers", other)),
    }
}

fn binary(arg: &CelValue) -> Result<String, FormatError> {
    match arg {
        CelValue::Int(v) => Ok(format!("{v:b}")),
        CelValue::UInt(v) => Ok(format!("{v:b}")),
        CelValue::Bool(v) => Ok(if *v { "1" } else { "0" }.to_string()),
        other => Err(FormatError::clause("binary", "integers and bools", other)),
    }
}

/// Mantissa with `precision` digits and a signed exponent of at least two digits.
fn exponential(arg: &CelValue, precision: usize) -> Result<String, FormatError> {
    let CelValue::Float(v) = arg else {
        return Err(FormatError::clause("scientific", "doubles", arg));
    };
    if let Some(s) = non_finite(*v) {
        return Ok(s.to_string());
    }
    let rendered = format!("{v:.precision$e}");
    let Some((mantissa, exponent)) = rendered.split_once('e') else {
        return Ok(rendered);
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    Ok(format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs()))
}

/// Exactly `precision` fraction digits, or up to eight trimmed ones for `.0`.
fn fixed(arg: &CelValue, precision: usize) -> Result<String, FormatError> {
    let CelValue::Float(v) = arg else {
        return Err(FormatError::clause("fixed-point", "doubles", arg));
    };
    if let Some(s) = non_finite(*v) {
        return Ok(s.to_string());
    }
    if precision > 0 {
        return Ok(format!("{v:.precision$}"));
    }
    let mut s = format!("{v:.8}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::{DateTime, FixedOffset};
    use pretty_assertions::assert_eq;

    use super::*;

    fn s(v: &str) -> CelValue {
        CelValue::String(Arc::new(v.to_string()))
    }

    fn render(template: &str, args: &[CelValue]) -> String {
        format(template, args).expect("format should succeed")
    }

    #[test]
    fn literal_text_and_percent_escape() {
        assert_eq!(render("100%% sure", &[]), "100% sure");
        assert_eq!(render("h\u{e9}llo %s", &[s("w\u{f6}rld")]), "h\u{e9}llo w\u{f6}rld");
    }

    #[test]
    fn mixed_clauses_render_in_order() {
        assert_eq!(
            render(
                "%d items, %.2f%%",
                &[CelValue::Int(3), CelValue::Float(12.345_6)]
            ),
            "3 items, 12.35%"
        );
        assert_eq!(render("%f", &[CelValue::Float(f64::INFINITY)]), "Infinity");
        assert_eq!(render("%e", &[CelValue::Float(f64::NEG_INFINITY)]), "-Infinity");
        assert_eq!(render("%d", &[CelValue::Float(f64::NAN)]), "NaN");
    }

    #[test]
    fn scientific_uses_two_digit_signed_exponent() {
        assert_eq!(render("%e", &[CelValue::Float(12.345)]), "1.234500e+01");
        assert_eq!(render("%.2e", &[CelValue::Float(0.000_12)]), "1.20e-04");
        assert_eq!(render("%.0e", &[CelValue::Float(0.0)]), "0e+00");
    }

    #[test]
    fn fixed_with_zero_precision_trims() {
        assert_eq!(render("%.0f", &[CelValue::Float(1.5)]), "1.5");
        assert_eq!(render("%.0f", &[CelValue::Float(2.0)]), "2");
        assert_eq!(render("%.3f", &[CelValue::Float(2.0)]), "2.000");
    }

    #[test]
    fn integer_bases() {
        assert_eq!(render("%x %X", &[CelValue::Int(255), CelValue::UInt(255)]), "ff FF");
        assert_eq!(render("%x", &[CelValue::Int(-1)]), "ffffffffffffffff");
        assert_eq!(render("%o", &[CelValue::Int(8)]), "10");
        assert_eq!(render("%b %b", &[CelValue::Int(5), CelValue::Bool(true)]), "101 1");
        assert_eq!(
            render("%x", &[CelValue::Bytes(Arc::new(vec![0x00, 0xab]))]),
            "00ab"
        );
        assert_eq!(render("%x", &[s("\n")]), "a");
        assert_eq!(render("%X", &[s("Hi")]), "4869");
    }

    #[test]
    fn strings_of_composite_values() {
        let list = CelValue::List(Arc::new(vec![CelValue::Int(1), s("a"), CelValue::Float(1.5)]));
        assert_eq!(render("%s", &[list]), "[1, a, 1.5]");

        let mut map = HashMap::new();
        map.insert(CelKey::String(Arc::new("b".into())), CelValue::Int(2));
        map.insert(CelKey::String(Arc::new("a".into())), CelValue::Bool(false));
        assert_eq!(render("%s", &[CelValue::Map(map.into())]), "{a: false, b: 2}");

        assert_eq!(render("%s", &[CelValue::Null]), "null");
        assert_eq!(render("%s", &[CelValue::Float(2.50)]), "2.5");
    }

    #[test]
    fn strings_of_time_values() {
        let d = TimeDelta::new(3, 500_000_000).expect("valid duration");
        assert_eq!(render("%s", &[CelValue::Duration(d)]), "3.5s");
        let negative = TimeDelta::new(-2, 0).expect("valid duration");
        assert_eq!(render("%s", &[CelValue::Duration(negative)]), "-2s");

        let ts: DateTime<FixedOffset> =
            DateTime::parse_from_rfc3339("2023-01-01T01:00:00+01:00").expect("valid timestamp");
        assert_eq!(render("%s", &[CelValue::Timestamp(ts)]), "2023-01-01T00:00:00Z");
    }

    #[test]
    fn bytes_collapse_invalid_runs() {
        let bytes = CelValue::Bytes(Arc::new(vec![b'a', 0xff, 0xfe, b'b']));
        assert_eq!(render("%s", &[bytes]), "a\u{fffd}b");
    }

    #[test]
    fn errors_name_the_problem() {
        assert_eq!(
            format("abc %", &[]).unwrap_err().to_string(),
            "format: expected format specifier"
        );
        assert_eq!(
            format("%s %s", &[s("a")]).unwrap_err().to_string(),
            "index 1 out of range"
        );
        assert_eq!(
            format("%c", &[s("a")]).unwrap_err().to_string(),
            "could not parse formatting clause: unrecognized formatting clause \"c\""
        );
        assert_eq!(
            format("%.3", &[CelValue::Float(1.0)]).unwrap_err().to_string(),
            "format: expected format specifier"
        );
        assert!(format("%d", &[s("x")]).is_err());
        assert!(format("%e", &[CelValue::Int(1)]).is_err());
    }
}
