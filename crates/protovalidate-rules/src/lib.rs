//! Rule-definition schema for [`protovalidate-core`](https://docs.rs/protovalidate-core).
//!
//! This crate provides:
//!
//! - A shared [`DESCRIPTOR_POOL`] holding the `buf.validate` rule messages
//!   (`FieldRules`, `MessageRules`, `OneofRules`, the per-type standard rule
//!   messages) and the well-known types they reference.
//! - Typed views over those messages: [`FieldRules`], [`MessageRules`],
//!   [`OneofRules`], [`Rule`] and [`Ignore`]. Each can be parsed from protobuf
//!   text format.
//! - The expressions backing the standard rules, looked up with
//!   [`standard_rules`].
//! - [`well_known_file_descriptors`], the `google.protobuf` files the
//!   schema depends on.
//!
//! # Usage
//!
//! ```
//! use protovalidate_rules::FieldRules;
//!
//! let rules = FieldRules::parse_text("string { min_len: 1 max_len: 64 }").unwrap();
//! assert_eq!(rules.standard().unwrap().name(), "string");
//! ```

#![warn(missing_docs)]

mod catalog;
mod view;

use std::sync::LazyLock;

use prost_reflect::DescriptorPool;
use prost_types::FileDescriptorProto;

pub use catalog::{StandardRule, standard_rules};
pub use view::{FieldRules, Ignore, MessageRules, OneofRules, Rule, StandardRules};

/// Descriptor pool containing `buf/validate/validate.proto` and its dependencies.
// The descriptor set is produced by the build script; failing to load it is a
// bug in this crate.
#[allow(clippy::expect_used)]
pub static DESCRIPTOR_POOL: LazyLock<DescriptorPool> = LazyLock::new(|| {
    DescriptorPool::decode(
        include_bytes!(concat!(env!("OUT_DIR"), "/file_descriptor_set.bin")).as_ref(),
    )
    .expect("buf.validate rule schema is well formed")
});

/// Returns the `google.protobuf` files held by [`DESCRIPTOR_POOL`]
/// (`any`, `duration`, `timestamp` and `wrappers`), for assembling schemas
/// that reference them.
#[must_use]
pub fn well_known_file_descriptors() -> Vec<FileDescriptorProto> {
    DESCRIPTOR_POOL
        .files()
        .filter(|file| file.package_name() == "google.protobuf")
        .map(|file| file.file_descriptor_proto().clone())
        .collect()
}
