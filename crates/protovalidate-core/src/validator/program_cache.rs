//! Process-wide cache of compiled standard-rule programs.
//!
//! Standard rule expressions depend only on the rule field that enables them,
//! never on a user schema, so each is compiled once and shared by every
//! validator. Binding a field's rule values happens per field in
//! [`ProgramCache::compile`], which also discards programs that can never fail
//! for those values.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use cel::Program;
use prost_reflect::FieldDescriptor;
use protovalidate_rules::{StandardRule, StandardRules, standard_rules};
use tracing::trace;

use crate::error::CompilationError;
use crate::path::{FieldPath, FieldPathElement};

use super::evaluator::cel::{CompiledProgram, rules_to_cel};

static GLOBAL: LazyLock<ProgramCache> = LazyLock::new(ProgramCache::default);

struct CachedProgram {
    rule: &'static StandardRule,
    program: Arc<Program>,
}

#[derive(Default)]
pub(crate) struct ProgramCache {
    programs: RwLock<HashMap<String, Arc<[CachedProgram]>>>,
}

impl ProgramCache {
    pub(crate) fn global() -> &'static Self {
        &GLOBAL
    }

    /// Programs for the populated fields of `standard`, bound to their rule
    /// values and reduced to those that can still fail.
    pub(crate) fn compile(
        &self,
        standard: &StandardRules,
    ) -> Result<Vec<CompiledProgram>, CompilationError> {
        let rules_binding = rules_to_cel(standard.message());
        let mut out = Vec::new();

        for (rule_field, value) in standard.populated() {
            let cached = self.programs_for(&rule_field)?;
            for entry in cached.iter() {
                let rule_path = FieldPath::new(vec![
                    FieldPathElement::field(standard.case()),
                    FieldPathElement::field(&rule_field),
                ]);
                let program = CompiledProgram::standard(
                    Arc::clone(&entry.program),
                    &entry.rule.id,
                    entry.rule.message.as_deref(),
                    rule_path,
                    (rule_field.clone(), value.clone()),
                    rules_binding.clone(),
                );
                if program.always_passes() {
                    trace!(rule_id = program.rule_id(), "dropping rule that always passes");
                    continue;
                }
                trace!(rule_id = program.rule_id(), "keeping rule");
                out.push(program);
            }
        }

        Ok(out)
    }

    fn programs_for(
        &self,
        rule_field: &FieldDescriptor,
    ) -> Result<Arc<[CachedProgram]>, CompilationError> {
        let key = rule_field.full_name();
        if let Some(found) = self
            .programs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Ok(Arc::clone(found));
        }

        let compiled = standard_rules(key)
            .iter()
            .map(|rule| {
                Program::compile(&rule.expression)
                    .map(|program| CachedProgram {
                        rule,
                        program: Arc::new(program),
                    })
                    .map_err(|e| {
                        CompilationError::new(format!(
                            "failed to compile standard rule `{}`: {e}",
                            rule.id
                        ))
                    })
            })
            .collect::<Result<Arc<[_]>, _>>()?;

        let mut programs = self
            .programs
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(programs.entry(key.to_string()).or_insert(compiled)))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use protovalidate_rules::FieldRules;

    use super::ProgramCache;

    fn ids(text: &str) -> Vec<String> {
        let rules = FieldRules::parse_text(text).expect("rules parse");
        let standard = rules.standard().expect("standard rules set");
        ProgramCache::default()
            .compile(&standard)
            .expect("standard rules compile")
            .iter()
            .map(|p| p.rule_id().to_string())
            .collect()
    }

    #[test]
    fn range_rules_reduce_to_the_applicable_variant() {
        assert_eq!(ids("int32 { gt: 1 lt: 10 }"), vec!["int32.gt_lt".to_string()]);
        assert_eq!(
            ids("int32 { gt: 10 lt: 1 }"),
            vec!["int32.gt_lt_exclusive".to_string()]
        );
        assert_eq!(ids("double { gte: 0 }"), vec!["double.gte".to_string()]);
    }

    #[test]
    fn disabled_flags_are_dropped() {
        assert!(ids("string { email: false }").is_empty());
        assert_eq!(
            ids("string { email: true }"),
            vec!["string.email".to_string(), "string.email_empty".to_string()]
        );
    }

    #[test]
    fn programs_are_shared_between_fields() {
        let cache = ProgramCache::default();
        let rules = FieldRules::parse_text("string { min_len: 3 }").expect("rules parse");
        let standard = rules.standard().expect("standard rules set");
        cache.compile(&standard).expect("compiles");
        cache.compile(&standard).expect("compiles");
        let programs = cache.programs.read().expect("lock not poisoned");
        assert_eq!(programs.len(), 1);
    }
}
