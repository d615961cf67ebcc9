//! Error types: the crate error enum and the validation-failure records kept
//! in the overlay's error tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The normalized shape of a failed validation.
///
/// Mirrors the accepted validator return shapes: a bare flag (`false`), a
/// single message, or a list of messages. Serializes untagged so snapshots
/// keep the natural JSON form (`false`, `"too short"`, `["a", "b"]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Validation {
    Flag(bool),
    Message(String),
    Messages(Vec<String>),
}

impl Validation {
    /// All messages carried by this validation, in order. A bare flag has none.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Validation::Flag(_) => Vec::new(),
            Validation::Message(msg) => vec![msg.clone()],
            Validation::Messages(msgs) => msgs.clone(),
        }
    }
}

/// One field's failed validation: the rejected value together with the
/// validation outcome describing why it was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub value: Value,
    pub validation: Validation,
}

impl ErrorEntry {
    pub fn new(value: Value, validation: Validation) -> Self {
        Self { value, validation }
    }

    /// Shorthand for a single-message failure.
    pub fn message(value: Value, message: impl Into<String>) -> Self {
        Self {
            value,
            validation: Validation::Message(message.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChangesetError {
    /// Merging two changesets that are not bound to the same content object.
    #[error("cannot merge changesets bound to different content")]
    MergeContentMismatch,
    /// An array operation addressed a path that is not an array.
    #[error("path does not point to an array")]
    NotAnArray,
    #[error(transparent)]
    Path(#[from] dot_path::PathError),
}
