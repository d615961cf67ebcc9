//! Flat, serializable form of a changeset's pending state.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorEntry;

/// Pending edits and validation failures flattened to dotted paths.
///
/// Suitable for storage between changeset instances over the same content
/// shape; [`Changeset::restore`](crate::Changeset::restore) rebuilds the live
/// overlay tree from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub changes: IndexMap<String, Value>,
    pub errors: IndexMap<String, ErrorEntry>,
}
