//! Typed views over `buf.validate` rule messages.

use anyhow::{Context, anyhow, bail};
use prost_reflect::{DynamicMessage, FieldDescriptor, MessageDescriptor, ReflectMessage, Value};

use crate::DESCRIPTOR_POOL;

fn rule_descriptor(name: &str) -> anyhow::Result<MessageDescriptor> {
    DESCRIPTOR_POOL
        .get_message_by_name(name)
        .ok_or_else(|| anyhow!("{name} is missing from the rule schema"))
}

fn parse_text(name: &str, text: &str) -> anyhow::Result<DynamicMessage> {
    let desc = rule_descriptor(name)?;
    DynamicMessage::parse_text_format(desc, text)
        .with_context(|| format!("failed to parse {name} from text format"))
}

fn ensure_type(msg: &DynamicMessage, name: &str) -> anyhow::Result<()> {
    let actual = msg.descriptor();
    if actual.full_name() != name {
        bail!("expected a {name} message, got {}", actual.full_name());
    }
    Ok(())
}

fn bool_field(msg: &DynamicMessage, name: &str) -> bool {
    msg.get_field_by_name(name)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

fn string_field(msg: &DynamicMessage, name: &str) -> String {
    msg.get_field_by_name(name)
        .and_then(|v| v.as_str().map(ToString::to_string))
        .unwrap_or_default()
}

fn rule_list(msg: &DynamicMessage, name: &str) -> Vec<Rule> {
    msg.get_field_by_name(name)
        .and_then(|v| {
            v.as_list().map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_message)
                    .map(Rule::from_message)
                    .collect()
            })
        })
        .unwrap_or_default()
}

/// A custom expression rule: `buf.validate.Rule`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rule {
    /// Stable identifier reported as the violation's rule id.
    pub id: String,
    /// Message used when the expression evaluates to `false`.
    pub message: String,
    /// CEL source.
    pub expression: String,
}

impl Rule {
    /// Creates a rule from its parts.
    pub fn new(
        id: impl Into<String>,
        message: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            expression: expression.into(),
        }
    }

    fn from_message(msg: &DynamicMessage) -> Self {
        Self {
            id: string_field(msg, "id"),
            message: string_field(msg, "message"),
            expression: string_field(msg, "expression"),
        }
    }
}

/// Message-level rules: `buf.validate.MessageRules`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageRules {
    /// Skip every rule of the message, including field rules.
    pub disabled: bool,
    /// Expressions evaluated with `this` bound to the whole message.
    pub cel: Vec<Rule>,
}

impl MessageRules {
    /// Parses `MessageRules` from protobuf text format.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid `MessageRules` message.
    pub fn parse_text(text: &str) -> anyhow::Result<Self> {
        Self::from_message(&parse_text("buf.validate.MessageRules", text)?)
    }

    /// Reads `MessageRules` from a dynamic message of that type.
    ///
    /// # Errors
    ///
    /// Returns an error if `msg` is not a `buf.validate.MessageRules`.
    pub fn from_message(msg: &DynamicMessage) -> anyhow::Result<Self> {
        ensure_type(msg, "buf.validate.MessageRules")?;
        Ok(Self {
            disabled: bool_field(msg, "disabled"),
            cel: rule_list(msg, "cel"),
        })
    }
}

/// Oneof-level rules: `buf.validate.OneofRules`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OneofRules {
    /// Exactly one member of the oneof must be set.
    pub required: bool,
}

impl OneofRules {
    /// Parses `OneofRules` from protobuf text format.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid `OneofRules` message.
    pub fn parse_text(text: &str) -> anyhow::Result<Self> {
        let msg = parse_text("buf.validate.OneofRules", text)?;
        Ok(Self {
            required: bool_field(&msg, "required"),
        })
    }
}

/// When a field's rules are skipped: `buf.validate.Ignore`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Ignore {
    /// Ignore absent fields that track presence; validate everything else.
    #[default]
    Unspecified,
    /// Skip the rules when the field is not populated.
    IfUnpopulated,
    /// Skip the rules when the field is unpopulated or holds its default value.
    IfDefaultValue,
    /// Never apply the rules.
    Always,
}

impl Ignore {
    /// Maps an `Ignore` enum number; unknown numbers fall back to `Unspecified`.
    #[must_use]
    pub fn from_number(number: i32) -> Self {
        match number {
            1 => Self::IfUnpopulated,
            2 => Self::IfDefaultValue,
            3 => Self::Always,
            _ => Self::Unspecified,
        }
    }
}

/// Field-level rules: `buf.validate.FieldRules`.
///
/// Backed by a [`DynamicMessage`] so that standard rules can be bound into
/// expressions without a typed mirror of every rule message.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRules(DynamicMessage);

impl FieldRules {
    /// Parses `FieldRules` from protobuf text format, e.g. `string { min_len: 3 }`.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid `FieldRules` message.
    pub fn parse_text(text: &str) -> anyhow::Result<Self> {
        parse_text("buf.validate.FieldRules", text).map(Self)
    }

    /// Wraps a dynamic `buf.validate.FieldRules` message.
    ///
    /// # Errors
    ///
    /// Returns an error if `msg` is of another type.
    pub fn from_message(msg: DynamicMessage) -> anyhow::Result<Self> {
        ensure_type(&msg, "buf.validate.FieldRules")?;
        Ok(Self(msg))
    }

    /// The field must be populated.
    #[must_use]
    pub fn required(&self) -> bool {
        bool_field(&self.0, "required")
    }

    /// Ignore policy for the field.
    #[must_use]
    pub fn ignore(&self) -> Ignore {
        self.0
            .get_field_by_name("ignore")
            .and_then(|v| v.as_enum_number())
            .map_or(Ignore::Unspecified, Ignore::from_number)
    }

    /// Custom expressions evaluated with `this` bound to the field value.
    #[must_use]
    pub fn cel(&self) -> Vec<Rule> {
        rule_list(&self.0, "cel")
    }

    /// The populated case of the `type` oneof, if any.
    #[must_use]
    pub fn standard(&self) -> Option<StandardRules> {
        let oneof = self.0.descriptor().oneofs().find(|o| o.name() == "type")?;
        oneof.fields().find_map(|case| {
            if !self.0.has_field(&case) {
                return None;
            }
            let rules = self.0.get_field(&case).as_message()?.clone();
            Some(StandardRules { case, rules })
        })
    }

    /// The underlying message.
    #[must_use]
    pub fn as_message(&self) -> &DynamicMessage {
        &self.0
    }
}

/// One populated case of `FieldRules.type`, such as `string` or `repeated`.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardRules {
    case: FieldDescriptor,
    rules: DynamicMessage,
}

impl StandardRules {
    /// The `FieldRules` field holding these rules.
    #[must_use]
    pub fn case(&self) -> &FieldDescriptor {
        &self.case
    }

    /// Short case name, e.g. `int32` or `map`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.case.name()
    }

    /// The rule message, e.g. a `buf.validate.StringRules`.
    #[must_use]
    pub fn message(&self) -> &DynamicMessage {
        &self.rules
    }

    /// Populated rule fields in field-number order.
    pub fn populated(&self) -> impl Iterator<Item = (FieldDescriptor, &Value)> {
        self.rules.fields()
    }

    /// Whether the named boolean rule is set to true.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        bool_field(&self.rules, name)
    }

    /// Nested `FieldRules` such as `repeated.items` or `map.keys`, if set.
    #[must_use]
    pub fn nested(&self, name: &str) -> Option<(FieldDescriptor, FieldRules)> {
        let field = self.rules.descriptor().get_field_by_name(name)?;
        if !self.rules.has_field(&field) {
            return None;
        }
        let nested = self.rules.get_field(&field).as_message()?.clone();
        Some((field, FieldRules(nested)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn field_rules_parse_standard_case() {
        let rules = FieldRules::parse_text("required: true string { min_len: 3 prefix: \"a\" }")
            .expect("text parses");
        assert!(rules.required());
        assert_eq!(rules.ignore(), Ignore::Unspecified);
        let standard = rules.standard().expect("string case set");
        assert_eq!(standard.name(), "string");
        let names: Vec<String> = standard
            .populated()
            .map(|(f, _)| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["min_len".to_string(), "prefix".to_string()]);
    }

    #[test]
    fn field_rules_parse_nested_items_and_cel() {
        let rules = FieldRules::parse_text(
            r#"
            ignore: IGNORE_IF_DEFAULT_VALUE
            cel { id: "even" message: "must be even" expression: "this % 2 == 0" }
            repeated { items { int32 { gt: 0 } } }
            "#,
        )
        .expect("text parses");
        assert_eq!(rules.ignore(), Ignore::IfDefaultValue);
        assert_eq!(
            rules.cel(),
            vec![Rule::new("even", "must be even", "this % 2 == 0")]
        );
        let repeated = rules.standard().expect("repeated case set");
        let (field, items) = repeated.nested("items").expect("items set");
        assert_eq!(field.full_name(), "buf.validate.RepeatedRules.items");
        assert_eq!(items.standard().map(|s| s.name().to_string()).as_deref(), Some("int32"));
    }

    #[test]
    fn message_and_oneof_rules_parse() {
        let message = MessageRules::parse_text(
            r#"disabled: true cel { id: "x" expression: "true" }"#,
        )
        .expect("text parses");
        assert!(message.disabled);
        assert_eq!(message.cel.len(), 1);
        assert!(OneofRules::parse_text("required: true").expect("parses").required);
    }

    #[test]
    fn from_message_rejects_other_types() {
        let desc = DESCRIPTOR_POOL
            .get_message_by_name("buf.validate.OneofRules")
            .expect("schema has OneofRules");
        let err = FieldRules::from_message(DynamicMessage::new(desc)).expect_err("wrong type");
        assert!(err.to_string().contains("expected a buf.validate.FieldRules"));
    }

    #[test]
    fn unknown_ignore_numbers_fall_back() {
        assert_eq!(Ignore::from_number(42), Ignore::Unspecified);
        assert_eq!(Ignore::from_number(3), Ignore::Always);
    }
}
