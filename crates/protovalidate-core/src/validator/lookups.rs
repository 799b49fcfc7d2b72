use prost_reflect::{FieldDescriptor, Kind, Value};

/// Maps a scalar or enum kind to the `FieldRules.type` case that applies to it.
pub(crate) fn expected_scalar_rule(kind: &Kind) -> Option<&'static str> {
    match kind {
        Kind::Float => Some("float"),
        Kind::Double => Some("double"),
        Kind::Int32 => Some("int32"),
        Kind::Int64 => Some("int64"),
        Kind::Uint32 => Some("uint32"),
        Kind::Uint64 => Some("uint64"),
        Kind::Sint32 => Some("sint32"),
        Kind::Sint64 => Some("sint64"),
        Kind::Fixed32 => Some("fixed32"),
        Kind::Fixed64 => Some("fixed64"),
        Kind::Sfixed32 => Some("sfixed32"),
        Kind::Sfixed64 => Some("sfixed64"),
        Kind::Bool => Some("bool"),
        Kind::String => Some("string"),
        Kind::Bytes => Some("bytes"),
        Kind::Enum(_) => Some("enum"),
        Kind::Message(_) => None,
    }
}

/// Maps a well-known message type to its dedicated `FieldRules.type` case.
pub(crate) fn expected_well_known_rule(full_name: &str) -> Option<&'static str> {
    match full_name {
        "google.protobuf.Any" => Some("any"),
        "google.protobuf.Duration" => Some("duration"),
        "google.protobuf.Timestamp" => Some("timestamp"),
        _ => None,
    }
}

/// Maps a wrapper type to the case of the scalar it wraps.
pub(crate) fn expected_wrapper_rule(full_name: &str) -> Option<&'static str> {
    match full_name {
        "google.protobuf.BoolValue" => Some("bool"),
        "google.protobuf.BytesValue" => Some("bytes"),
        "google.protobuf.DoubleValue" => Some("double"),
        "google.protobuf.FloatValue" => Some("float"),
        "google.protobuf.Int32Value" => Some("int32"),
        "google.protobuf.Int64Value" => Some("int64"),
        "google.protobuf.StringValue" => Some("string"),
        "google.protobuf.UInt32Value" => Some("uint32"),
        "google.protobuf.UInt64Value" => Some("uint64"),
        _ => None,
    }
}

/// The rule case a field (or, when `nested`, one of its elements) accepts.
/// `None` for plain message fields, which take no standard rules.
pub(crate) fn expected_rule_case(field: &FieldDescriptor, nested: bool) -> Option<&'static str> {
    if field.is_map() && !nested {
        return Some("map");
    }
    if field.is_list() && !nested {
        return Some("repeated");
    }

    if let Some(message) = field.kind().as_message() {
        return expected_wrapper_rule(message.full_name())
            .or_else(|| expected_well_known_rule(message.full_name()));
    }

    expected_scalar_rule(&field.kind())
}

/// The zero value of a field, or of a single element when `nested`.
pub(crate) fn zero_value(field: &FieldDescriptor, nested: bool) -> Value {
    if nested && field.is_list() {
        field.kind().default_value()
    } else {
        field.default_value()
    }
}

pub(crate) fn is_message_field(field: &FieldDescriptor) -> bool {
    field.kind().as_message().is_some()
}
