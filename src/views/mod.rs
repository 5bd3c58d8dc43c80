mod pipeline;

pub use pipeline::{DocumentSource, Pipeline, Stage};

use serde::Serialize;
use serde_json::Value;

/// Converts a model into the document form the composer works over.
pub fn doc<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// The public field subset attached wherever an owner is expanded.
/// Secret fields are already skipped at serialization; this trims the
/// rest down to what listings need.
pub fn user_summary() -> Pipeline {
    Pipeline::new().keep(&["id", "username", "email", "fullName", "avatar"])
}
