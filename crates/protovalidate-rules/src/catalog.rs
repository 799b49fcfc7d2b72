//! Expressions backing the standard rules.
//!
//! Every entry is keyed by the full name of the rule field that enables it
//! (`buf.validate.StringRules.min_len`). Expressions see `this` (the value
//! under validation), `rules` (the populated rule message, absent fields
//! omitted so `has()` works), `rule` (the value of the keyed rule field) and,
//! for timestamps, `now`. Conditions that only read `rules` come first so the
//! compiler can discard an entry without a value to validate.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Numeric rule messages: message name, rule id prefix and whether the
/// element type is floating point.
const NUMERIC_RULES: &[(&str, &str, bool)] = &[
    ("FloatRules", "float", true),
    ("DoubleRules", "double", true),
    ("Int32Rules", "int32", false),
    ("Int64Rules", "int64", false),
    ("UInt32Rules", "uint32", false),
    ("UInt64Rules", "uint64", false),
    ("SInt32Rules", "sint32", false),
    ("SInt64Rules", "sint64", false),
    ("Fixed32Rules", "fixed32", false),
    ("Fixed64Rules", "fixed64", false),
    ("SFixed32Rules", "sfixed32", false),
    ("SFixed64Rules", "sfixed64", false),
];

/// A compiled-once expression attached to a standard rule field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardRule {
    /// Rule id reported on violations, e.g. `string.min_len`.
    pub id: String,
    /// Fixed message for boolean expressions; string expressions carry their own.
    pub message: Option<String>,
    /// CEL source.
    pub expression: String,
}

type Catalog = HashMap<String, Vec<StandardRule>>;

const EQUALS: &str = "this != rules.const ? 'value must equal %s'.format([rules.const]) : ''";

static CATALOG: LazyLock<Catalog> = LazyLock::new(build_catalog);

/// Returns the expressions enabled by the rule field `rule_field` (full name).
#[must_use]
pub fn standard_rules(rule_field: &str) -> &'static [StandardRule] {
    CATALOG.get(rule_field).map_or(&[], Vec::as_slice)
}

struct Entries<'a> {
    catalog: &'a mut Catalog,
    message: &'a str,
    prefix: &'a str,
}

impl Entries<'_> {
    /// An expression yielding an empty string on success or a message on failure.
    fn text(&mut self, field: &str, id: &str, expression: &str) -> &mut Self {
        self.push(field, id, None, expression)
    }

    /// A boolean expression with a fixed failure message.
    fn check(&mut self, field: &str, id: &str, message: &str, expression: &str) -> &mut Self {
        self.push(field, id, Some(message.to_string()), expression)
    }

    fn push(
        &mut self,
        field: &str,
        id: &str,
        message: Option<String>,
        expression: &str,
    ) -> &mut Self {
        self.catalog
            .entry(format!("buf.validate.{}.{field}", self.message))
            .or_default()
            .push(StandardRule {
                id: format!("{}.{id}", self.prefix),
                message,
                expression: expression.to_string(),
            });
        self
    }
}

fn build_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    for (message, prefix, floating) in NUMERIC_RULES {
        let nan = if *floating { "this.isNan() || " } else { "" };
        let mut entries = Entries {
            catalog: &mut catalog,
            message,
            prefix,
        };
        entries.text("const", "const", EQUALS);
        ordered(&mut entries, nan);
        membership(&mut entries);
        if !nan.is_empty() {
            entries.text(
                "finite",
                "finite",
                "rules.finite ? (this.isNan() || this.isInf() ? 'value must be finite' : '') : ''",
            );
        }
    }
    string_rules(&mut Entries {
        catalog: &mut catalog,
        message: "StringRules",
        prefix: "string",
    });
    bytes_rules(&mut Entries {
        catalog: &mut catalog,
        message: "BytesRules",
        prefix: "bytes",
    });
    Entries {
        catalog: &mut catalog,
        message: "BoolRules",
        prefix: "bool",
    }
    .text(
        "const",
        "const",
        EQUALS,
    );
    let mut enums = Entries {
        catalog: &mut catalog,
        message: "EnumRules",
        prefix: "enum",
    };
    enums.text(
        "const",
        "const",
        EQUALS,
    );
    membership(&mut enums);
    collection_rules(&mut catalog);
    let mut durations = Entries {
        catalog: &mut catalog,
        message: "DurationRules",
        prefix: "duration",
    };
    durations.text(
        "const",
        "const",
        EQUALS,
    );
    ordered(&mut durations, "");
    membership(&mut durations);
    timestamp_rules(&mut catalog);
    catalog
}

/// Comparison rules, including the range variants selected by the other bound.
fn ordered(entries: &mut Entries<'_>, nan: &str) {
    entries
        .text(
            "lt",
            "lt",
            &format!(
                "!has(rules.gte) && !has(rules.gt) && ({nan}this >= rules.lt) \
                 ? 'value must be less than %s'.format([rules.lt]) : ''"
            ),
        )
        .text(
            "lte",
            "lte",
            &format!(
                "!has(rules.gte) && !has(rules.gt) && ({nan}this > rules.lte) \
                 ? 'value must be less than or equal to %s'.format([rules.lte]) : ''"
            ),
        );
    for (lower, lower_op, lower_text) in [
        ("gt", "<=", "greater than"),
        ("gte", "<", "greater than or equal to"),
    ] {
        entries.text(
            lower,
            lower,
            &format!(
                "!has(rules.lt) && !has(rules.lte) && ({nan}this {lower_op} rules.{lower}) \
                 ? 'value must be {lower_text} %s'.format([rules.{lower}]) : ''"
            ),
        );
        for (upper, upper_op, inverse_op, upper_text) in [
            ("lt", ">=", "<=", "less than"),
            ("lte", ">", "<", "less than or equal to"),
        ] {
            entries
                .text(
                    lower,
                    &format!("{lower}_{upper}"),
                    &format!(
                        "has(rules.{upper}) && rules.{upper} >= rules.{lower} \
                         && ({nan}this {upper_op} rules.{upper} || this {lower_op} rules.{lower}) \
                         ? 'value must be {lower_text} %s and {upper_text} %s'\
                         .format([rules.{lower}, rules.{upper}]) : ''"
                    ),
                )
                .text(
                    lower,
                    &format!("{lower}_{upper}_exclusive"),
                    &format!(
                        "has(rules.{upper}) && rules.{upper} < rules.{lower} \
                         && ({nan}(rules.{upper} {inverse_op} this && this {lower_op} rules.{lower})) \
                         ? 'value must be {lower_text} %s or {upper_text} %s'\
                         .format([rules.{lower}, rules.{upper}]) : ''"
                    ),
                );
        }
    }
}

fn membership(entries: &mut Entries<'_>) {
    entries
        .text(
            "in",
            "in",
            "!(this in rules.in) ? 'value must be in list %s'.format([rules.in]) : ''",
        )
        .text(
            "not_in",
            "not_in",
            "this in rules.not_in ? 'value must not be in list %s'.format([rules.not_in]) : ''",
        );
}

fn string_rules(entries: &mut Entries<'_>) {
    entries
        .text(
            "const",
            "const",
            "this != rules.const ? 'value must equal `%s`'.format([rules.const]) : ''",
        )
        .text(
            "len",
            "len",
            "this.size() != int(rules.len) \
             ? 'value length must be %s characters'.format([rules.len]) : ''",
        )
        .text(
            "min_len",
            "min_len",
            "this.size() < int(rules.min_len) \
             ? 'value length must be at least %s characters'.format([rules.min_len]) : ''",
        )
        .text(
            "max_len",
            "max_len",
            "this.size() > int(rules.max_len) \
             ? 'value length must be at most %s characters'.format([rules.max_len]) : ''",
        )
        .text(
            "len_bytes",
            "len_bytes",
            "bytes(this).size() != int(rules.len_bytes) \
             ? 'value length must be %s bytes'.format([rules.len_bytes]) : ''",
        )
        .text(
            "min_bytes",
            "min_bytes",
            "bytes(this).size() < int(rules.min_bytes) \
             ? 'value length must be at least %s bytes'.format([rules.min_bytes]) : ''",
        )
        .text(
            "max_bytes",
            "max_bytes",
            "bytes(this).size() > int(rules.max_bytes) \
             ? 'value length must be at most %s bytes'.format([rules.max_bytes]) : ''",
        )
        .text(
            "pattern",
            "pattern",
            "!this.matches(rules.pattern) \
             ? 'value does not match regex pattern `%s`'.format([rules.pattern]) : ''",
        )
        .text(
            "prefix",
            "prefix",
            "!this.startsWith(rules.prefix) \
             ? 'value does not have prefix `%s`'.format([rules.prefix]) : ''",
        )
        .text(
            "suffix",
            "suffix",
            "!this.endsWith(rules.suffix) \
             ? 'value does not have suffix `%s`'.format([rules.suffix]) : ''",
        )
        .text(
            "contains",
            "contains",
            "!this.contains(rules.contains) \
             ? 'value does not contain substring `%s`'.format([rules.contains]) : ''",
        )
        .text(
            "not_contains",
            "not_contains",
            "this.contains(rules.not_contains) \
             ? 'value contains substring `%s`'.format([rules.not_contains]) : ''",
        );
    membership(entries);

    let formats = [
        ("email", "this.isEmail()", "a valid email address"),
        ("hostname", "this.isHostname()", "a valid hostname"),
        ("ip", "this.isIp()", "a valid IP address"),
        ("ipv4", "this.isIp(4)", "a valid IPv4 address"),
        ("ipv6", "this.isIp(6)", "a valid IPv6 address"),
        ("uri", "this.isUri()", "a valid URI"),
        (
            "address",
            "this.isHostname() || this.isIp()",
            "a valid hostname, or ip address",
        ),
        (
            "uuid",
            "this.matches('^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$')",
            "a valid UUID",
        ),
        ("ip_with_prefixlen", "this.isIpPrefix()", "a valid IP prefix"),
        (
            "ipv4_with_prefixlen",
            "this.isIpPrefix(4)",
            "a valid IPv4 address with prefix length",
        ),
        (
            "ipv6_with_prefixlen",
            "this.isIpPrefix(6)",
            "a valid IPv6 address with prefix length",
        ),
        ("ip_prefix", "this.isIpPrefix(true)", "a valid IP prefix"),
        ("ipv4_prefix", "this.isIpPrefix(4, true)", "a valid IPv4 prefix"),
        ("ipv6_prefix", "this.isIpPrefix(6, true)", "a valid IPv6 prefix"),
        (
            "host_and_port",
            "this.isHostAndPort(true)",
            "a valid host (hostname or IP address) and port pair",
        ),
    ];
    for (field, test, what) in formats {
        entries
            .check(
                field,
                field,
                &format!("value must be {what}"),
                &format!("!rules.{field} || this == '' || {test}"),
            )
            .check(
                field,
                &format!("{field}_empty"),
                &format!("value is empty, which is not {what}"),
                &format!("!rules.{field} || this != ''"),
            );
    }
    entries.check(
        "uri_ref",
        "uri_ref",
        "value must be a valid URI Reference",
        "!rules.uri_ref || this.isUriRef()",
    );
}

fn bytes_rules(entries: &mut Entries<'_>) {
    entries
        .text(
            "const",
            "const",
            "this != rules.const ? 'value must be %x'.format([rules.const]) : ''",
        )
        .text(
            "len",
            "len",
            "this.size() != int(rules.len) ? 'value length must be %s bytes'.format([rules.len]) : ''",
        )
        .text(
            "min_len",
            "min_len",
            "this.size() < int(rules.min_len) \
             ? 'value length must be at least %s bytes'.format([rules.min_len]) : ''",
        )
        .text(
            "max_len",
            "max_len",
            "this.size() > int(rules.max_len) \
             ? 'value must be at most %s bytes'.format([rules.max_len]) : ''",
        )
        .text(
            "pattern",
            "pattern",
            "!string(this).matches(rules.pattern) \
             ? 'value must match regex pattern `%s`'.format([rules.pattern]) : ''",
        )
        .text(
            "prefix",
            "prefix",
            "!this.startsWith(rules.prefix) \
             ? 'value does not have prefix %x'.format([rules.prefix]) : ''",
        )
        .text(
            "suffix",
            "suffix",
            "!this.endsWith(rules.suffix) \
             ? 'value does not have suffix %x'.format([rules.suffix]) : ''",
        )
        .text(
            "contains",
            "contains",
            "!this.contains(rules.contains) \
             ? 'value does not contain %x'.format([rules.contains]) : ''",
        );
    membership(entries);
    for (field, sizes, what) in [
        ("ip", "this.size() == 4 || this.size() == 16", "a valid IP address"),
        ("ipv4", "this.size() == 4", "a valid IPv4 address"),
        ("ipv6", "this.size() == 16", "a valid IPv6 address"),
    ] {
        entries
            .check(
                field,
                field,
                &format!("value must be {what}"),
                &format!("!rules.{field} || this.size() == 0 || {sizes}"),
            )
            .check(
                field,
                &format!("{field}_empty"),
                &format!("value is empty, which is not {what}"),
                &format!("!rules.{field} || this.size() != 0"),
            );
    }
}

fn collection_rules(catalog: &mut Catalog) {
    Entries {
        catalog: &mut *catalog,
        message: "RepeatedRules",
        prefix: "repeated",
    }
    .text(
        "min_items",
        "min_items",
        "this.size() < int(rules.min_items) \
         ? 'value must contain at least %d item(s)'.format([rules.min_items]) : ''",
    )
    .text(
        "max_items",
        "max_items",
        "this.size() > int(rules.max_items) \
         ? 'value must contain no more than %s item(s)'.format([rules.max_items]) : ''",
    )
    .check(
        "unique",
        "unique",
        "repeated value must contain unique items",
        "!rules.unique || this.unique()",
    );
    Entries {
        catalog,
        message: "MapRules",
        prefix: "map",
    }
    .text(
        "min_pairs",
        "min_pairs",
        "this.size() < int(rules.min_pairs) \
         ? 'map must be at least %d entries'.format([rules.min_pairs]) : ''",
    )
    .text(
        "max_pairs",
        "max_pairs",
        "this.size() > int(rules.max_pairs) \
         ? 'map must be at most %d entries'.format([rules.max_pairs]) : ''",
    );
}

fn timestamp_rules(catalog: &mut Catalog) {
    let mut entries = Entries {
        catalog,
        message: "TimestampRules",
        prefix: "timestamp",
    };
    entries.text(
        "const",
        "const",
        EQUALS,
    );
    ordered(&mut entries, "");
    entries
        .text(
            "lt_now",
            "lt_now",
            "(rules.lt_now && this > now) ? 'value must be less than now' : ''",
        )
        .text(
            "gt_now",
            "gt_now",
            "(rules.gt_now && this < now) ? 'value must be greater than now' : ''",
        )
        .text(
            "within",
            "within",
            "this < now - rules.within || this > now + rules.within \
             ? 'value must be within %s of now'.format([rules.within]) : ''",
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(rule_field: &str) -> Vec<&'static str> {
        standard_rules(rule_field)
            .iter()
            .map(|r| r.id.as_str())
            .collect()
    }

    #[test]
    fn string_min_len_has_single_entry() {
        assert_eq!(ids("buf.validate.StringRules.min_len"), vec!["string.min_len"]);
    }

    #[test]
    fn lower_bounds_carry_range_variants() {
        assert_eq!(
            ids("buf.validate.Int32Rules.gt"),
            vec![
                "int32.gt",
                "int32.gt_lt",
                "int32.gt_lt_exclusive",
                "int32.gt_lte",
                "int32.gt_lte_exclusive",
            ]
        );
        assert_eq!(ids("buf.validate.TimestampRules.gte").len(), 5);
    }

    #[test]
    fn const_registered_once_per_message() {
        for name in [
            "buf.validate.DoubleRules.const",
            "buf.validate.DurationRules.const",
            "buf.validate.TimestampRules.const",
            "buf.validate.StringRules.const",
        ] {
            assert_eq!(ids(name).len(), 1, "{name}");
        }
    }

    #[test]
    fn float_rules_guard_nan() {
        let lt = &standard_rules("buf.validate.FloatRules.lt")[0];
        assert!(lt.expression.contains("this.isNan()"));
        let int_lt = &standard_rules("buf.validate.Int64Rules.lt")[0];
        assert!(!int_lt.expression.contains("isNan"));
        assert_eq!(ids("buf.validate.FloatRules.finite"), vec!["float.finite"]);
        assert!(ids("buf.validate.Int64Rules.finite").is_empty());
    }

    #[test]
    fn well_known_string_formats_have_empty_variants() {
        assert_eq!(
            ids("buf.validate.StringRules.email"),
            vec!["string.email", "string.email_empty"]
        );
        assert_eq!(ids("buf.validate.StringRules.uri_ref"), vec!["string.uri_ref"]);
    }

    #[test]
    fn natively_evaluated_rules_have_no_expressions() {
        assert!(standard_rules("buf.validate.AnyRules.in").is_empty());
        assert!(standard_rules("buf.validate.EnumRules.defined_only").is_empty());
        assert!(standard_rules("buf.validate.RepeatedRules.items").is_empty());
    }
}
