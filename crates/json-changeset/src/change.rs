//! Pending-change records.

use serde_json::Value;

/// One entry of a changeset's flattened change list, as returned by
/// [`Changeset::changes`](crate::Changeset::changes).
///
/// `path` is a dotted key path into the content (`"user.name"`, `"emails.0"`);
/// `value` is the pending value that `execute` would write there.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub path: String,
    pub value: Value,
}

impl Change {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// A key's pending state inside one tracked level.
///
/// A key is either a literal pending leaf value, or a marker that its value
/// was wholesale-replaced by a new object/array. In the replaced case the
/// replacement itself (and any later edits layered over it) lives in the
/// companion child node, so an incremental nested edit and a bulk overwrite
/// stay distinguishable.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Edit {
    Leaf(Value),
    Replaced,
}
