//! Parsing helpers for generated output
//!
//! - JSON extraction: bracket matching over free-form model responses
//! - Lenient decoding: tagged-union decode of loosely-typed fields

pub mod json;
pub mod lenient;

pub use json::{extract_json_object, parse_embedded_json};
pub use lenient::{lenient_flag, lenient_indices, lenient_strings, lenient_text, LooseList};
