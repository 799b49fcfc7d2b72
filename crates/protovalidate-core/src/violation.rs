use std::fmt;

use prost_reflect::{FieldDescriptor, Value};

use crate::path::{FieldPath, FieldPathElement};

/// A single instance where a validation rule was not met.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Violation {
    field: FieldPath,
    rule: FieldPath,
    rule_id: String,
    message: String,
    for_key: bool,

    /// The field descriptor for the violated field, if available.
    field_descriptor: Option<FieldDescriptor>,

    /// The field value that failed validation, when available.
    field_value: Option<Value>,

    /// The descriptor for the violated rule field, when available.
    rule_descriptor: Option<FieldDescriptor>,

    /// The value of the violated rule field, when available.
    rule_value: Option<Value>,
}

impl Violation {
    pub(crate) fn new(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: FieldPath::default(),
            rule: FieldPath::default(),
            rule_id: rule_id.into(),
            message: message.into(),
            for_key: false,
            field_descriptor: None,
            field_value: None,
            rule_descriptor: None,
            rule_value: None,
        }
    }

    /// Path from the validated message to the offending value.
    #[must_use]
    pub fn field_path(&self) -> &FieldPath {
        &self.field
    }

    /// Path from `FieldRules` to the violated rule; empty for message-level
    /// expressions and oneof rules.
    #[must_use]
    pub fn rule_path(&self) -> &FieldPath {
        &self.rule
    }

    /// Returns the machine-readable rule identifier.
    #[must_use]
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    /// Returns the human-readable violation message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when the violation concerns a map key rather than its value.
    #[must_use]
    pub fn for_key(&self) -> bool {
        self.for_key
    }

    /// Returns the field descriptor for the violated field, if available.
    #[must_use]
    pub fn field_descriptor(&self) -> Option<&FieldDescriptor> {
        self.field_descriptor.as_ref()
    }

    /// Returns the field value that failed validation, when available.
    #[must_use]
    pub fn field_value(&self) -> Option<&Value> {
        self.field_value.as_ref()
    }

    /// Returns the descriptor for the violated rule field, when available.
    #[must_use]
    pub fn rule_descriptor(&self) -> Option<&FieldDescriptor> {
        self.rule_descriptor.as_ref()
    }

    /// Returns the value of the violated rule field, when available.
    #[must_use]
    pub fn rule_value(&self) -> Option<&Value> {
        self.rule_value.as_ref()
    }

    pub(crate) fn with_rule_path(mut self, rule: FieldPath) -> Self {
        self.rule = rule;
        self
    }

    pub(crate) fn with_field_value(mut self, value: Value) -> Self {
        self.field_value = Some(value);
        self
    }

    pub(crate) fn with_rule(mut self, descriptor: FieldDescriptor, value: Value) -> Self {
        self.rule_descriptor = Some(descriptor);
        self.rule_value = Some(value);
        self
    }

    pub(crate) fn mark_for_key(&mut self) {
        self.for_key = true;
    }

    /// Prepends a field path element; the first enclosing field also becomes
    /// the violation's field descriptor.
    pub(crate) fn prepend_field(&mut self, descriptor: &FieldDescriptor) {
        if self.field_descriptor.is_none() {
            self.field_descriptor = Some(descriptor.clone());
        }
        self.field.prepend(FieldPathElement::field(descriptor));
    }

    pub(crate) fn prepend_path(&mut self, element: FieldPathElement) {
        self.field.prepend(element);
    }

    pub(crate) fn prepend_rule_path(&mut self, prefix: &FieldPath) {
        self.rule.prepend_all(prefix);
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.field.is_empty() {
            write!(f, "{}: ", self.field)?;
        }
        if !self.message.is_empty() {
            write!(f, "{}", self.message)
        } else if !self.rule_id.is_empty() {
            write!(f, "[{}]", self.rule_id)
        } else {
            write!(f, "[unknown]")
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Violation;
    use crate::path::{FieldPath, FieldPathElement};

    fn with_field_path(mut violation: Violation, names: &[&str]) -> Violation {
        for name in names.iter().rev() {
            violation.prepend_path(FieldPathElement::oneof(name));
        }
        violation
    }

    #[test]
    fn violation_display_prefers_field_and_message_then_rule_id_then_unknown() {
        let with_path_and_message = with_field_path(Violation::new("bar", "foo"), &["one", "two"]);
        assert_eq!(with_path_and_message.to_string(), "one.two: foo");

        let message_only = Violation::new("bar", "foo");
        assert_eq!(message_only.to_string(), "foo");

        let rule_id_only = Violation::new("bar", "");
        assert_eq!(rule_id_only.to_string(), "[bar]");

        let unknown = Violation::new("", "");
        assert_eq!(unknown.to_string(), "[unknown]");
    }

    #[test]
    fn rule_path_prefix_lands_in_front() {
        let rule = FieldPath::new(vec![
            FieldPathElement::oneof("string"),
            FieldPathElement::oneof("min_len"),
        ]);
        let mut violation = Violation::new("string.min_len", "too short").with_rule_path(rule);
        violation.prepend_rule_path(&FieldPath::new(vec![
            FieldPathElement::oneof("repeated"),
            FieldPathElement::oneof("items"),
        ]));
        assert_eq!(
            violation.rule_path().to_string(),
            "repeated.items.string.min_len"
        );
        assert!(!violation.for_key());
    }
}
