//! Where rules come from.
//!
//! The compiler asks a [`RuleResolver`] for the rules of every message, oneof
//! and field it visits. [`RuleRegistry`] is the in-memory implementation used
//! when rules are assembled in code or parsed from text format.

use std::collections::HashMap;

use prost_reflect::{FieldDescriptor, MessageDescriptor, OneofDescriptor};
use protovalidate_rules::{FieldRules, MessageRules, OneofRules};

use crate::error::CompilationError;

/// Supplies the rules attached to schema elements.
///
/// Returning `Ok(None)` means the element carries no rules. An error aborts
/// compilation of the message being built.
pub trait RuleResolver: Send + Sync {
    /// Rules for a message type.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules exist but cannot be read.
    fn message_rules(
        &self,
        message: &MessageDescriptor,
    ) -> Result<Option<MessageRules>, CompilationError>;

    /// Rules for a oneof.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules exist but cannot be read.
    fn oneof_rules(&self, oneof: &OneofDescriptor)
    -> Result<Option<OneofRules>, CompilationError>;

    /// Rules for a field.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules exist but cannot be read.
    fn field_rules(&self, field: &FieldDescriptor)
    -> Result<Option<FieldRules>, CompilationError>;
}

/// Rules keyed by the fully-qualified name of the element they apply to.
///
/// ```
/// use protovalidate_core::RuleRegistry;
///
/// let registry = RuleRegistry::new()
///     .with_field_text("acme.User.email", "string { email: true }")
///     .unwrap();
/// # let _ = registry;
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    messages: HashMap<String, MessageRules>,
    oneofs: HashMap<String, OneofRules>,
    fields: HashMap<String, FieldRules>,
}

impl RuleRegistry {
    /// An empty registry: every element resolves to no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches message rules to the message named `full_name`.
    #[must_use]
    pub fn with_message_rules(mut self, full_name: impl Into<String>, rules: MessageRules) -> Self {
        self.messages.insert(full_name.into(), rules);
        self
    }

    /// Attaches oneof rules to the oneof named `full_name` (`pkg.Message.oneof`).
    #[must_use]
    pub fn with_oneof_rules(mut self, full_name: impl Into<String>, rules: OneofRules) -> Self {
        self.oneofs.insert(full_name.into(), rules);
        self
    }

    /// Attaches field rules to the field named `full_name` (`pkg.Message.field`).
    #[must_use]
    pub fn with_field_rules(mut self, full_name: impl Into<String>, rules: FieldRules) -> Self {
        self.fields.insert(full_name.into(), rules);
        self
    }

    /// Parses `MessageRules` text format and attaches it.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is not valid `buf.validate.MessageRules`.
    pub fn with_message_text(
        self,
        full_name: impl Into<String>,
        text: &str,
    ) -> Result<Self, CompilationError> {
        let full_name = full_name.into();
        let rules = MessageRules::parse_text(text).map_err(|e| parse_error(&full_name, &e))?;
        Ok(self.with_message_rules(full_name, rules))
    }

    /// Parses `OneofRules` text format and attaches it.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is not valid `buf.validate.OneofRules`.
    pub fn with_oneof_text(
        self,
        full_name: impl Into<String>,
        text: &str,
    ) -> Result<Self, CompilationError> {
        let full_name = full_name.into();
        let rules = OneofRules::parse_text(text).map_err(|e| parse_error(&full_name, &e))?;
        Ok(self.with_oneof_rules(full_name, rules))
    }

    /// Parses `FieldRules` text format and attaches it.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is not valid `buf.validate.FieldRules`.
    pub fn with_field_text(
        self,
        full_name: impl Into<String>,
        text: &str,
    ) -> Result<Self, CompilationError> {
        let full_name = full_name.into();
        let rules = FieldRules::parse_text(text).map_err(|e| parse_error(&full_name, &e))?;
        Ok(self.with_field_rules(full_name, rules))
    }
}

fn parse_error(full_name: &str, err: &dyn std::fmt::Display) -> CompilationError {
    CompilationError::new(format!("invalid rules for `{full_name}`: {err}"))
}

impl RuleResolver for RuleRegistry {
    fn message_rules(
        &self,
        message: &MessageDescriptor,
    ) -> Result<Option<MessageRules>, CompilationError> {
        Ok(self.messages.get(message.full_name()).cloned())
    }

    fn oneof_rules(
        &self,
        oneof: &OneofDescriptor,
    ) -> Result<Option<OneofRules>, CompilationError> {
        Ok(self.oneofs.get(oneof.full_name()).copied())
    }

    fn field_rules(
        &self,
        field: &FieldDescriptor,
    ) -> Result<Option<FieldRules>, CompilationError> {
        Ok(self.fields.get(field.full_name()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use protovalidate_rules::DESCRIPTOR_POOL;

    use super::*;

    #[test]
    fn empty_registry_resolves_nothing() {
        let timestamp = DESCRIPTOR_POOL
            .get_message_by_name("google.protobuf.Timestamp")
            .expect("Timestamp exists");
        let seconds = timestamp
            .get_field_by_name("seconds")
            .expect("Timestamp.seconds exists");

        let registry = RuleRegistry::new();
        assert!(
            registry
                .message_rules(&timestamp)
                .expect("lookup succeeds")
                .is_none()
        );
        assert!(registry.field_rules(&seconds).expect("lookup succeeds").is_none());
    }

    #[test]
    fn text_rules_resolve_by_full_name() {
        let timestamp = DESCRIPTOR_POOL
            .get_message_by_name("google.protobuf.Timestamp")
            .expect("Timestamp exists");
        let nanos = timestamp
            .get_field_by_name("nanos")
            .expect("Timestamp.nanos exists");

        let registry = RuleRegistry::new()
            .with_field_text("google.protobuf.Timestamp.nanos", "int32 { gte: 0 }")
            .expect("rules parse")
            .with_message_text("google.protobuf.Timestamp", "disabled: true")
            .expect("rules parse");

        let rules = registry
            .field_rules(&nanos)
            .expect("lookup succeeds")
            .expect("rules present");
        assert_eq!(rules.standard().map(|s| s.name().to_string()), Some("int32".to_string()));
        let message = registry
            .message_rules(&timestamp)
            .expect("lookup succeeds")
            .expect("rules present");
        assert!(message.disabled);
    }

    #[test]
    fn malformed_text_is_a_compilation_error() {
        let err = RuleRegistry::new()
            .with_field_text("a.B.c", "string { no_such_rule: 1 }")
            .expect_err("unknown rule field");
        assert!(err.cause.contains("a.B.c"), "{}", err.cause);
    }
}
