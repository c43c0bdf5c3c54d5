//! Validation rules for inbound payloads.

pub mod rules;

pub use validator::Validate;
