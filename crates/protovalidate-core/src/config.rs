use std::sync::Arc;

use prost_reflect::MessageDescriptor;
use prost_types::Timestamp;

use crate::resolve::RuleResolver;

/// Options for configuring the `Validator` at construction time.
#[non_exhaustive]
pub enum ValidatorOption {
    /// Stop validation on the first violation instead of collecting all.
    FailFast,

    /// Disable lazy compilation: only message types seeded with
    /// [`ValidatorOption::MessageDescriptors`] have evaluators; any other type
    /// yields a single `unavailable` violation.
    DisableLazy,

    /// Override the function used to populate `now` in timestamp-based rules.
    NowFn(Arc<dyn Fn() -> Timestamp + Send + Sync>),

    /// Compile evaluators for these descriptors at validator construction time.
    MessageDescriptors(Vec<MessageDescriptor>),

    /// Source of the rules attached to messages, oneofs and fields.
    Resolver(Arc<dyn RuleResolver>),
}

/// Options for configuring a single `Validator::violations_with` call.
#[non_exhaustive]
pub enum ValidationOption {
    /// Stop validation on the first violation instead of collecting all.
    FailFast,
    /// Override the function used to populate `now` in timestamp-based rules.
    NowFn(Arc<dyn Fn() -> Timestamp + Send + Sync>),
}

/// Runtime configuration passed to evaluators during validation.
#[derive(Clone)]
pub(crate) struct ValidationConfig {
    pub fail_fast: bool,
    pub now_fn: Arc<dyn Fn() -> Timestamp + Send + Sync>,
}

/// Default timestamp factory using `SystemTime::now()`.
pub(crate) fn default_now_fn() -> Arc<dyn Fn() -> Timestamp + Send + Sync> {
    Arc::new(|| {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        // as_secs() since UNIX_EPOCH fits in i64; subsec_nanos() < 1e9 fits in i32.
        #[allow(clippy::cast_possible_wrap)]
        Timestamp {
            seconds: now.as_secs() as i64,
            nanos: now.subsec_nanos() as i32,
        }
    })
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            now_fn: default_now_fn(),
        }
    }
}

impl ValidationConfig {
    /// Applies per-call overrides on top of the validator defaults.
    pub(crate) fn with_options(&self, options: &[ValidationOption]) -> Self {
        let mut cfg = self.clone();
        for option in options {
            match option {
                ValidationOption::FailFast => cfg.fail_fast = true,
                ValidationOption::NowFn(now_fn) => cfg.now_fn = Arc::clone(now_fn),
            }
        }
        cfg
    }
}
