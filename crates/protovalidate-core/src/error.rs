use std::fmt;

use crate::violation::Violation;

/// Top-level error type returned by validation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// One or more validation rules were violated.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A validation rule could not be compiled.
    #[error(transparent)]
    Compilation(#[from] CompilationError),

    /// An expression failed while being evaluated.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Returned by [`Validator::validate`](crate::Validator::validate) when one or
/// more validation rules are violated.
#[derive(Debug)]
pub struct ValidationError {
    /// The list of rule violations found during validation.
    pub violations: Vec<Violation>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.violations.len() {
            0 => Ok(()),
            1 => write!(f, "validation error: {}", self.violations[0]),
            _ => {
                write!(f, "validation errors:")?;
                for v in &self.violations {
                    write!(f, "\n - {v}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub(crate) fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }
}

/// Returned when a validation rule cannot be compiled from its descriptor.
#[derive(Debug, Clone, thiserror::Error)]
#[error("compilation error: {cause}")]
pub struct CompilationError {
    /// Description of why the rule failed to compile.
    pub cause: String,
}

impl CompilationError {
    pub(crate) fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

/// Returned when an expression evaluates to an unsupported type or its
/// evaluation fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("execution error: {cause}")]
pub struct ExecutionError {
    /// Description of the failure.
    pub cause: String,
}

impl ExecutionError {
    pub(crate) fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}
