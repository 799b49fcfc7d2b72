use std::collections::{HashMap, HashSet};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use prost::Message;
use prost_reflect::{DynamicMessage, FieldDescriptor, MessageDescriptor};
use protovalidate_rules::{FieldRules, Ignore, MessageRules, StandardRules};
use tracing::{debug, warn};

use crate::error::CompilationError;
use crate::path::{FieldPath, FieldPathElement, Subscript, field_type};
use crate::resolve::RuleResolver;

use super::evaluator::any::{AnyEval, TypeUrlRule};
use super::evaluator::cel::{CompiledProgram, Programs, message_to_cel, value_to_cel};
use super::evaluator::embedded::EmbeddedEval;
use super::evaluator::enum_check::EnumEval;
use super::evaluator::field::FieldEval;
use super::evaluator::list::ListEval;
use super::evaluator::map::MapEval;
use super::evaluator::message::MessageEval;
use super::evaluator::oneof::OneofEval;
use super::evaluator::value::ValueEval;
use super::evaluator::wrapper::WrapperEval;
use super::evaluator::{Evaluator, MessageEvaluator, MessageId};
use super::lookups;
use super::program_cache::ProgramCache;

/// Identifies a message type across descriptor pools: two descriptors share
/// evaluators only when their names agree and their files, together with
/// every file those depend on, encode identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct DescriptorKey {
    full_name: String,
    fingerprint: u64,
}

impl DescriptorKey {
    pub(crate) fn new(desc: &MessageDescriptor) -> Self {
        let mut hasher = DefaultHasher::new();
        let mut seen = HashSet::new();
        let mut pending = vec![desc.parent_file()];
        while let Some(file) = pending.pop() {
            if !seen.insert(file.name().to_string()) {
                continue;
            }
            file.file_descriptor_proto().encode_to_vec().hash(&mut hasher);
            pending.extend(file.dependencies());
        }
        Self {
            full_name: desc.full_name().to_string(),
            fingerprint: hasher.finish(),
        }
    }
}

/// Immutable arena of compiled messages. Published snapshots are never
/// mutated; a compilation publishes a new one.
#[derive(Default)]
pub(crate) struct Snapshot {
    messages: Vec<Arc<MessageEval>>,
    index: HashMap<DescriptorKey, MessageId>,
    /// Descriptors already mapped to an id, by full name. Descriptor equality
    /// is pool identity, so a hit here skips fingerprinting.
    resolved: HashMap<String, Vec<(MessageDescriptor, MessageId)>>,
}

impl Snapshot {
    pub(crate) fn message(&self, id: MessageId) -> Option<&MessageEval> {
        self.messages.get(id).map(AsRef::as_ref)
    }

    fn find(&self, desc: &MessageDescriptor) -> Option<MessageId> {
        self.resolved
            .get(desc.full_name())?
            .iter()
            .find(|(known, _)| known == desc)
            .map(|(_, id)| *id)
    }

    fn len(&self) -> usize {
        self.messages.len()
    }

    #[cfg(test)]
    pub(crate) fn from_messages(messages: Vec<Arc<MessageEval>>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }
}

/// A snapshot together with the id of one of its messages, if compiled.
pub(crate) struct Loaded {
    pub snapshot: Arc<Snapshot>,
    pub id: Option<MessageId>,
}

/// Build-through cache of message evaluators.
pub(crate) struct Builder {
    /// Serializes compilations.
    compile_lock: Mutex<()>,
    snapshot: RwLock<Arc<Snapshot>>,
    /// Whether unknown types are compiled on first use.
    lazy: bool,
    resolver: Arc<dyn RuleResolver>,
    programs: &'static ProgramCache,
    /// Whether tautological nodes are dropped before publishing.
    prune: bool,
}

impl Builder {
    pub(crate) fn new(lazy: bool, resolver: Arc<dyn RuleResolver>) -> Self {
        Self {
            compile_lock: Mutex::new(()),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            lazy,
            resolver,
            programs: ProgramCache::global(),
            prune: true,
        }
    }

    /// A builder that keeps every node, for checking that pruning never
    /// changes what a validation reports.
    #[cfg(test)]
    pub(crate) fn unpruned(resolver: Arc<dyn RuleResolver>) -> Self {
        Self {
            prune: false,
            ..Self::new(true, resolver)
        }
    }

    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Returns the evaluator for `desc`, compiling it first when lazy
    /// compilation is enabled. With lazy compilation disabled an unseeded
    /// type loads without an id.
    pub(crate) fn load_or_build(&self, desc: &MessageDescriptor) -> Result<Loaded, CompilationError> {
        let snapshot = self.current();
        if let Some(id) = snapshot.find(desc) {
            return Ok(Loaded {
                snapshot,
                id: Some(id),
            });
        }
        if !self.lazy {
            // Seeded from another pool with an identical definition.
            let id = snapshot.index.get(&DescriptorKey::new(desc)).copied();
            return Ok(Loaded { snapshot, id });
        }
        let (snapshot, id) = self.compile(desc)?;
        Ok(Loaded {
            snapshot,
            id: Some(id),
        })
    }

    /// Compiles `desc` even when lazy compilation is disabled.
    pub(crate) fn preload(&self, desc: &MessageDescriptor) -> Result<(), CompilationError> {
        if self.current().find(desc).is_some() {
            return Ok(());
        }
        self.compile(desc).map(|_| ())
    }

    /// Compiles `desc` and publishes the result. A definition already
    /// compiled from another pool is only recorded under the new descriptor.
    fn compile(&self, desc: &MessageDescriptor) -> Result<(Arc<Snapshot>, MessageId), CompilationError> {
        let _guard = self
            .compile_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let base = self.current();
        if let Some(id) = base.find(desc) {
            return Ok((base, id));
        }

        let mut compilation =
            Compilation::new(&base, self.resolver.as_ref(), self.programs, self.prune);
        let id = compilation.message(desc).inspect_err(|err| {
            warn!(type_name = desc.full_name(), cause = %err.cause, "failed to compile validation rules");
        })?;
        let compiled = compilation.fresh.len();
        let published = Arc::new(compilation.finish());
        debug!(
            type_name = desc.full_name(),
            compiled,
            total = published.len(),
            "published evaluator snapshot"
        );

        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&published);
        Ok((published, id))
    }
}

/// Working state of one compilation. New messages are appended after the
/// messages of the base snapshot, so existing ids stay valid.
struct Compilation<'a> {
    base: &'a Snapshot,
    resolver: &'a dyn RuleResolver,
    programs: &'static ProgramCache,
    prune: bool,
    index: HashMap<DescriptorKey, MessageId>,
    resolved: HashMap<String, Vec<(MessageDescriptor, MessageId)>>,
    fresh: Vec<MessageEval>,
}

impl<'a> Compilation<'a> {
    fn new(
        base: &'a Snapshot,
        resolver: &'a dyn RuleResolver,
        programs: &'static ProgramCache,
        prune: bool,
    ) -> Self {
        Self {
            base,
            resolver,
            programs,
            prune,
            index: base.index.clone(),
            resolved: base.resolved.clone(),
            fresh: Vec::new(),
        }
    }

    fn resolve(&mut self, desc: &MessageDescriptor, id: MessageId) {
        self.resolved
            .entry(desc.full_name().to_string())
            .or_default()
            .push((desc.clone(), id));
    }

    /// Returns the id of `desc`, reserving its slot before building it so
    /// that recursive references resolve to the reserved id.
    fn message(&mut self, desc: &MessageDescriptor) -> Result<MessageId, CompilationError> {
        let known = self
            .resolved
            .get(desc.full_name())
            .and_then(|entries| entries.iter().find(|(known, _)| known == desc));
        if let Some((_, id)) = known {
            return Ok(*id);
        }
        let key = DescriptorKey::new(desc);
        if let Some(&id) = self.index.get(&key) {
            self.resolve(desc, id);
            return Ok(id);
        }

        let slot = self.fresh.len();
        let id = self.base.len() + slot;
        self.fresh.push(MessageEval::empty());
        self.index.insert(key, id);
        self.resolve(desc, id);

        let eval = self.build_message(desc)?;
        self.fresh[slot] = eval;
        Ok(id)
    }

    /// Settles tautology over the new messages as a greatest fixpoint, prunes
    /// and returns the snapshot to publish.
    fn finish(mut self) -> Snapshot {
        let base = self.base;
        if !self.prune {
            for message in &mut self.fresh {
                message.settle_unpruned();
            }
            return self.publish();
        }

        let mut guess = vec![true; self.fresh.len()];
        loop {
            let lookup = |id: MessageId| tautological(base, &guess, id);
            let next: Vec<bool> = self
                .fresh
                .iter()
                .map(|m| m.compute_tautology(&lookup))
                .collect();
            if next == guess {
                break;
            }
            guess = next;
        }

        let lookup = |id: MessageId| tautological(base, &guess, id);
        for message in &mut self.fresh {
            message.settle(&lookup);
        }
        self.publish()
    }

    fn publish(self) -> Snapshot {
        let mut messages = self.base.messages.clone();
        messages.extend(self.fresh.into_iter().map(Arc::new));
        Snapshot {
            messages,
            index: self.index,
            resolved: self.resolved,
        }
    }

    fn build_message(&mut self, desc: &MessageDescriptor) -> Result<MessageEval, CompilationError> {
        let rules = self.resolver.message_rules(desc)?.unwrap_or_default();
        if rules.disabled {
            return Ok(MessageEval::empty());
        }

        let mut eval = MessageEval::default();
        Self::process_message_expressions(desc, &rules, &mut eval)?;
        self.process_oneof_rules(desc, &mut eval)?;
        self.process_fields(desc, &mut eval)?;
        Ok(eval)
    }

    fn process_message_expressions(
        desc: &MessageDescriptor,
        rules: &MessageRules,
        eval: &mut MessageEval,
    ) -> Result<(), CompilationError> {
        if rules.cel.is_empty() {
            return Ok(());
        }
        let sample = message_to_cel(&DynamicMessage::new(desc.clone()));
        let programs = rules
            .cel
            .iter()
            .map(|rule| {
                CompiledProgram::custom(rule, FieldPath::default())?.check_result_type(sample.clone())
            })
            .collect::<Result<Vec<_>, _>>()?;
        eval.append(MessageEvaluator::Programs(Programs::new(programs)));
        Ok(())
    }

    fn process_oneof_rules(
        &self,
        desc: &MessageDescriptor,
        eval: &mut MessageEval,
    ) -> Result<(), CompilationError> {
        for oneof in desc.oneofs().filter(|o| !o.is_synthetic()) {
            let rules = self.resolver.oneof_rules(&oneof)?.unwrap_or_default();
            eval.append(MessageEvaluator::Oneof(OneofEval::new(&oneof, rules.required)));
        }
        Ok(())
    }

    fn process_fields(
        &mut self,
        desc: &MessageDescriptor,
        eval: &mut MessageEval,
    ) -> Result<(), CompilationError> {
        for field in desc.fields() {
            if let Some(field_eval) = self.build_field(&field)? {
                eval.append(MessageEvaluator::Field(field_eval));
            }
        }
        Ok(())
    }

    fn build_field(&mut self, field: &FieldDescriptor) -> Result<Option<FieldEval>, CompilationError> {
        let rules = self.resolver.field_rules(field)?;
        let ignore = rules.as_ref().map_or(Ignore::Unspecified, FieldRules::ignore);
        if ignore == Ignore::Always {
            return Ok(None);
        }

        let required = rules
            .as_ref()
            .filter(|r| r.required())
            .and_then(|r| r.as_message().descriptor().get_field_by_name("required"));
        let value = self.build_value(field, rules.as_ref(), false, None)?;
        Ok(Some(FieldEval::new(
            field.clone(),
            required,
            ignore,
            lookups::zero_value(field, false),
            value,
        )))
    }

    /// Builds the rules applied to a field value or, when `nested`, to one
    /// list element or map key or value.
    fn build_value(
        &mut self,
        field: &FieldDescriptor,
        rules: Option<&FieldRules>,
        nested: bool,
        rule_prefix: Option<FieldPath>,
    ) -> Result<ValueEval, CompilationError> {
        let mut value = ValueEval::new(rule_prefix);
        let ignore = rules.map_or(Ignore::Unspecified, FieldRules::ignore);
        if ignore == Ignore::Always {
            return Ok(value);
        }

        let standard = rules.and_then(FieldRules::standard);
        if let Some(standard) = &standard {
            validate_rule_case(field, standard, nested)?;
            validate_repeated_unique(field, standard, nested)?;
        }

        if nested && matches!(ignore, Ignore::IfUnpopulated | Ignore::IfDefaultValue) {
            value.set_ignore_empty(lookups::zero_value(field, nested));
        }
        if let Some(rules) = rules {
            Self::process_field_expressions(field, rules, nested, &mut value)?;
        }
        self.process_embedded_message(field, nested, &mut value)?;
        if let Some(standard) = &standard {
            if !self.process_wrapper_rules(field, standard, nested, &mut value)? {
                self.process_standard_rules(standard, &mut value)?;
            }
            process_any_rules(standard, &mut value);
            process_enum_rules(field, standard, &mut value);
        }
        self.process_map_rules(field, standard.as_ref(), nested, &mut value)?;
        self.process_repeated_rules(field, standard.as_ref(), nested, &mut value)?;
        Ok(value)
    }

    fn process_field_expressions(
        field: &FieldDescriptor,
        rules: &FieldRules,
        nested: bool,
        value: &mut ValueEval,
    ) -> Result<(), CompilationError> {
        let Some(cel) = rules.as_message().descriptor().get_field_by_name("cel") else {
            return Ok(());
        };
        let expressions = rules.cel();
        if expressions.is_empty() {
            return Ok(());
        }
        let sample = value_to_cel(&lookups::zero_value(field, nested));
        let programs = expressions
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                let index = u64::try_from(i).unwrap_or(u64::MAX);
                let rule_path = FieldPath::new(vec![
                    FieldPathElement::field(&cel).with_subscript(Subscript::Index(index)),
                ]);
                CompiledProgram::custom(rule, rule_path)?.check_result_type(sample.clone())
            })
            .collect::<Result<Vec<_>, _>>()?;
        value.append(Evaluator::Programs(Programs::new(programs)));
        Ok(())
    }

    fn process_embedded_message(
        &mut self,
        field: &FieldDescriptor,
        nested: bool,
        value: &mut ValueEval,
    ) -> Result<(), CompilationError> {
        if field.is_map() || (field.is_list() && !nested) {
            return Ok(());
        }
        let Some(message) = field.kind().as_message().cloned() else {
            return Ok(());
        };
        let id = self.message(&message)?;
        value.append(Evaluator::Embedded(EmbeddedEval::new(id)));
        Ok(())
    }

    /// Moves the standard rules of a wrapper-typed value onto the wrapped
    /// scalar. Returns whether `field` is such a wrapper.
    fn process_wrapper_rules(
        &self,
        field: &FieldDescriptor,
        standard: &StandardRules,
        nested: bool,
        value: &mut ValueEval,
    ) -> Result<bool, CompilationError> {
        if field.is_map() || (field.is_list() && !nested) {
            return Ok(false);
        }
        let is_wrapper = field
            .kind()
            .as_message()
            .is_some_and(|m| lookups::expected_wrapper_rule(m.full_name()).is_some());
        if !is_wrapper {
            return Ok(false);
        }

        let mut inner = ValueEval::new(None);
        inner.append(Evaluator::Programs(Programs::new(self.programs.compile(standard)?)));
        value.append(Evaluator::Wrapper(WrapperEval::new(inner)));
        Ok(true)
    }

    fn process_standard_rules(
        &self,
        standard: &StandardRules,
        value: &mut ValueEval,
    ) -> Result<(), CompilationError> {
        value.append(Evaluator::Programs(Programs::new(self.programs.compile(standard)?)));
        Ok(())
    }

    fn process_map_rules(
        &mut self,
        field: &FieldDescriptor,
        standard: Option<&StandardRules>,
        nested: bool,
        value: &mut ValueEval,
    ) -> Result<(), CompilationError> {
        if !field.is_map() || nested {
            return Ok(());
        }
        let entry = field.kind().as_message().cloned().ok_or_else(|| {
            CompilationError::new(format!("no map entry descriptor for field `{}`", field.full_name()))
        })?;
        let key_field = entry.map_entry_key_field();
        let value_field = entry.map_entry_value_field();

        let map_rules = standard.filter(|s| s.name() == "map");
        let keys = self.build_nested(&key_field, map_rules, "keys")?;
        let values = self.build_nested(&value_field, map_rules, "values")?;
        value.append(Evaluator::Map(MapEval::new(
            keys,
            values,
            field_type(&key_field),
            field_type(&value_field),
        )));
        Ok(())
    }

    fn process_repeated_rules(
        &mut self,
        field: &FieldDescriptor,
        standard: Option<&StandardRules>,
        nested: bool,
        value: &mut ValueEval,
    ) -> Result<(), CompilationError> {
        if !field.is_list() || nested {
            return Ok(());
        }
        let repeated_rules = standard.filter(|s| s.name() == "repeated");
        let items = self.build_nested(field, repeated_rules, "items")?;
        value.append(Evaluator::List(ListEval::new(items)));
        Ok(())
    }

    /// Element rules held by `container` under `name` (`repeated.items`,
    /// `map.keys`, `map.values`), with their rule-path prefix.
    fn build_nested(
        &mut self,
        field: &FieldDescriptor,
        container: Option<&StandardRules>,
        name: &str,
    ) -> Result<ValueEval, CompilationError> {
        match container.and_then(|c| c.nested(name).map(|nested| (c, nested))) {
            Some((container, (nested_field, rules))) => {
                let prefix = FieldPath::new(vec![
                    FieldPathElement::field(container.case()),
                    FieldPathElement::field(&nested_field),
                ]);
                self.build_value(field, Some(&rules), true, Some(prefix))
            }
            None => self.build_value(field, None, true, None),
        }
    }
}

fn tautological(base: &Snapshot, fresh: &[bool], id: MessageId) -> bool {
    match base.message(id) {
        Some(message) => message.tautology(),
        None => id
            .checked_sub(base.len())
            .and_then(|slot| fresh.get(slot))
            .copied()
            .unwrap_or(false),
    }
}

fn process_any_rules(standard: &StandardRules, value: &mut ValueEval) {
    if standard.name() != "any" {
        return;
    }
    let rule = |name: &str| {
        let field = standard.message().descriptor().get_field_by_name(name)?;
        if !standard.message().has_field(&field) {
            return None;
        }
        let urls = standard.message().get_field(&field).into_owned();
        Some(TypeUrlRule::new(standard.case(), field, urls))
    };
    value.append(Evaluator::Any(AnyEval::new(rule("in"), rule("not_in"))));
}

fn process_enum_rules(field: &FieldDescriptor, standard: &StandardRules, value: &mut ValueEval) {
    if standard.name() != "enum" || !standard.flag("defined_only") {
        return;
    }
    let Some(enum_type) = field.kind().as_enum().cloned() else {
        return;
    };
    if let Some(rule) = standard.message().descriptor().get_field_by_name("defined_only") {
        value.append(Evaluator::Enum(EnumEval::new(&enum_type, standard.case(), rule)));
    }
}

fn validate_rule_case(
    field: &FieldDescriptor,
    standard: &StandardRules,
    nested: bool,
) -> Result<(), CompilationError> {
    let actual = standard.name();
    match lookups::expected_rule_case(field, nested) {
        Some(expected) if expected == actual => Ok(()),
        Some(expected) => Err(CompilationError::new(format!(
            "expected rule `{expected}`, got `{actual}` on field `{}`",
            field.full_name()
        ))),
        None => Err(CompilationError::new(format!(
            "mismatched message rules, `{actual}` is not a valid rule for field `{}`",
            field.full_name()
        ))),
    }
}

fn validate_repeated_unique(
    field: &FieldDescriptor,
    standard: &StandardRules,
    nested: bool,
) -> Result<(), CompilationError> {
    if nested || standard.name() != "repeated" || !standard.flag("unique") {
        return Ok(());
    }
    if lookups::is_message_field(field) {
        return Err(CompilationError::new(format!(
            "repeated.unique is only supported for scalar and enum item types; `{}` has message items",
            field.full_name()
        )));
    }
    Ok(())
}
