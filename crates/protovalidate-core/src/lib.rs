//! Runtime validation for Protocol Buffer messages using
//! [`buf.validate`](https://github.com/bufbuild/protovalidate) rules.
//!
//! Rules are supplied through a [`RuleResolver`] and compiled, per message
//! type, into a tree of evaluators that is cached and shared across threads.
//! Standard rules and custom rules are CEL expressions; the standard-rule
//! programs are compiled once per process.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use protovalidate_core::{RuleRegistry, Validator, ValidatorOption};
//! # fn example(msg: impl prost_reflect::ReflectMessage) -> Result<(), Box<dyn std::error::Error>> {
//! let rules = RuleRegistry::new()
//!     .with_field_text("acme.User.email", "string { email: true }")?
//!     .with_field_text("acme.User.age", "uint32 { lte: 150 }")?;
//! let validator = Validator::with_options(&[ValidatorOption::Resolver(Arc::new(rules))]);
//!
//! for violation in validator.violations(&msg)? {
//!     eprintln!("{violation}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error types
//!
//! | Type | When |
//! |------|------|
//! | [`ValidationError`] | One or more rule violations detected by [`Validator::validate`] |
//! | [`CompilationError`] | An expression or rule definition could not be compiled |
//! | [`ExecutionError`] | An expression failed or returned a type other than bool or string |
//!
//! All three are unified under [`Error`]. [`Validator::violations`] returns
//! violations as plain data instead.

#![warn(missing_docs)]

mod config;
mod error;
mod path;
mod resolve;
mod validator;
mod violation;

/// Re-export of the rule schema, typed rule views and standard-rule catalog.
pub use protovalidate_rules as rules;

pub use config::{ValidationOption, ValidatorOption};
pub use error::{CompilationError, Error, ExecutionError, ValidationError};
pub use path::{FieldPath, FieldPathElement, Subscript};
pub use resolve::{RuleRegistry, RuleResolver};
pub use validator::{Validator, validate};
pub use violation::Violation;
