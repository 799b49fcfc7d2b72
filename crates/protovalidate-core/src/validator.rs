use std::sync::{Arc, LazyLock};

use prost_reflect::ReflectMessage;
use tracing::warn;

use crate::config::{ValidationConfig, ValidationOption, ValidatorOption};
use crate::error::{Error, ValidationError};
use crate::resolve::{RuleRegistry, RuleResolver};
use crate::violation::Violation;

mod builder;
mod evaluator;
mod functions;
mod lookups;
mod program_cache;
mod rules;

use builder::Builder;
use evaluator::cel::call_scope;
use evaluator::{EvalContext, unavailable};

/// Thread-safe validator for Protocol Buffer messages.
///
/// Rules come from a [`RuleResolver`]; evaluators are compiled on first use
/// of a message type and shared by every later call, including calls from
/// other threads.
pub struct Validator {
    builder: Builder,
    config: ValidationConfig,
}

impl Validator {
    /// Create a new `Validator` with default options and no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(&[])
    }

    /// Create a new `Validator` with the given options.
    ///
    /// Seeded descriptors that fail to compile are logged and left
    /// uncompiled; with lazy compilation enabled the error is returned again
    /// when such a message is validated.
    #[must_use]
    pub fn with_options(options: &[ValidatorOption]) -> Self {
        let mut config = ValidationConfig::default();
        let mut lazy = true;
        let mut seeds = Vec::new();
        let mut resolver: Arc<dyn RuleResolver> = Arc::new(RuleRegistry::new());

        for option in options {
            match option {
                ValidatorOption::FailFast => config.fail_fast = true,
                ValidatorOption::DisableLazy => lazy = false,
                ValidatorOption::NowFn(now_fn) => config.now_fn = Arc::clone(now_fn),
                ValidatorOption::MessageDescriptors(descriptors) => {
                    seeds.extend(descriptors.iter().cloned());
                }
                ValidatorOption::Resolver(custom) => resolver = Arc::clone(custom),
            }
        }

        let builder = Builder::new(lazy, resolver);
        for descriptor in &seeds {
            if let Err(err) = builder.preload(descriptor) {
                warn!(
                    type_name = descriptor.full_name(),
                    cause = %err.cause,
                    "failed to seed evaluator"
                );
            }
        }

        Self { builder, config }
    }

    /// Collects the rule violations of a message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compilation`] if the rules of the message type cannot
    /// be compiled, or [`Error::Execution`] if an expression fails.
    pub fn violations<M: ReflectMessage>(&self, msg: &M) -> Result<Vec<Violation>, Error> {
        self.violations_with(msg, &[])
    }

    /// Collects the rule violations of a message with per-call options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compilation`] if the rules of the message type cannot
    /// be compiled, or [`Error::Execution`] if an expression fails or the
    /// clock returns an out-of-range timestamp.
    pub fn violations_with<M: ReflectMessage>(
        &self,
        msg: &M,
        options: &[ValidationOption],
    ) -> Result<Vec<Violation>, Error> {
        let dynamic = msg.transcode_to_dynamic();
        let descriptor = dynamic.descriptor();
        let loaded = self.builder.load_or_build(&descriptor)?;
        let Some(id) = loaded.id else {
            return Ok(vec![unavailable(descriptor.full_name())]);
        };

        let cfg = self.config.with_options(options);
        let scope = call_scope(&cfg)?;
        let ctx = EvalContext {
            snapshot: &loaded.snapshot,
            scope: &scope,
            fail_fast: cfg.fail_fast,
        };
        Ok(ctx.evaluate_message(id, &dynamic)?)
    }

    /// Validate a message against its rules.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] holding every violation found, or a
    /// compilation or execution error.
    pub fn validate<M: ReflectMessage>(&self, msg: &M) -> Result<(), Error> {
        self.validate_with(msg, &[])
    }

    /// Validate a message with per-call validation options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] holding every violation found, or a
    /// compilation or execution error.
    pub fn validate_with<M: ReflectMessage>(
        &self,
        msg: &M,
        options: &[ValidationOption],
    ) -> Result<(), Error> {
        let violations = self.violations_with(msg, options)?;
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(violations).into())
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_VALIDATOR: LazyLock<Validator> = LazyLock::new(Validator::new);

/// Validate a message using a global `Validator` instance.
///
/// The global validator has no resolver configured, so only rule-free
/// checks apply: it still walks embedded messages and reports nothing for
/// them. Construct a [`Validator`] with [`ValidatorOption::Resolver`] to
/// validate against actual rules.
///
/// # Errors
///
/// Returns an `Error` containing all violations found, or a compilation or
/// execution error.
pub fn validate<M: ReflectMessage>(msg: &M) -> Result<(), Error> {
    GLOBAL_VALIDATOR.validate(msg)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use prost_reflect::{DynamicMessage, Value};
    use prost_types::Timestamp;

    use super::evaluator::test_support::sample;
    use super::*;

    fn named(name: &str) -> DynamicMessage {
        let mut msg = DynamicMessage::new(sample());
        msg.set_field_by_name("name", Value::String(name.to_string()));
        msg
    }

    fn resolver(text: &str) -> Arc<dyn RuleResolver> {
        Arc::new(
            RuleRegistry::new()
                .with_field_text("test.Sample.name", text)
                .expect("rules parse"),
        )
    }

    #[test]
    fn validation_options_override_call_config_only() {
        let base = ValidationConfig::default();
        let now_fn: Arc<dyn Fn() -> Timestamp + Send + Sync> = Arc::new(|| Timestamp {
            seconds: 123,
            nanos: 456,
        });
        let effective = base.with_options(&[
            ValidationOption::FailFast,
            ValidationOption::NowFn(Arc::clone(&now_fn)),
        ]);

        assert!(effective.fail_fast);
        assert_eq!((effective.now_fn)().seconds, 123);
        assert!(!base.fail_fast);
    }

    #[test]
    fn validate_wraps_violations() {
        let validator = Validator::with_options(&[ValidatorOption::Resolver(resolver(
            "string { min_len: 3 }",
        ))]);
        assert!(validator.validate(&named("abc")).is_ok());

        match validator.validate(&named("ab")) {
            Err(Error::Validation(err)) => {
                assert_eq!(err.violations.len(), 1);
                assert_eq!(err.violations[0].rule_id(), "string.min_len");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn compilation_errors_surface_on_validate() {
        let validator = Validator::with_options(&[ValidatorOption::Resolver(resolver(
            "bool { const: true }",
        ))]);
        assert!(matches!(
            validator.violations(&named("x")),
            Err(Error::Compilation(_))
        ));
    }

    #[test]
    fn disable_lazy_reports_unseeded_types_as_unavailable() {
        let validator = Validator::with_options(&[ValidatorOption::DisableLazy]);
        let found = validator.violations(&named("x")).expect("evaluates");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule_id(), "unavailable");
        assert_eq!(found[0].message(), "no evaluator available for test.Sample");

        let seeded = Validator::with_options(&[
            ValidatorOption::DisableLazy,
            ValidatorOption::MessageDescriptors(vec![sample()]),
            ValidatorOption::Resolver(resolver("string { min_len: 3 }")),
        ]);
        let found = seeded.violations(&named("x")).expect("evaluates");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule_id(), "string.min_len");
    }

    #[test]
    fn global_validator_accepts_rule_free_messages() {
        assert!(validate(&named("")).is_ok());
    }
}
