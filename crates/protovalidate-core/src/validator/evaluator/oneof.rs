use prost_reflect::{DynamicMessage, OneofDescriptor};

use crate::path::FieldPathElement;
use crate::violation::Violation;

/// A oneof that must have one member set.
pub(crate) struct OneofEval {
    name: String,
    members: Vec<u32>,
    required: bool,
}

impl OneofEval {
    pub(crate) fn new(descriptor: &OneofDescriptor, required: bool) -> Self {
        Self {
            name: descriptor.name().to_string(),
            members: descriptor.fields().map(|f| f.number()).collect(),
            required,
        }
    }

    pub(crate) fn tautology(&self) -> bool {
        !self.required
    }

    pub(crate) fn evaluate(&self, msg: &DynamicMessage) -> Vec<Violation> {
        if !self.required || self.members.iter().any(|n| msg.has_field_by_number(*n)) {
            return Vec::new();
        }
        let mut violation = Violation::new("required", "exactly one field is required in oneof");
        violation.prepend_path(FieldPathElement::oneof(&self.name));
        vec![violation]
    }
}
