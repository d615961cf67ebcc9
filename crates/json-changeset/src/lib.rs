//! json-changeset — a copy-on-write draft layer over nested JSON.
//!
//! A [`Changeset`] stages edits against an existing content value without
//! mutating it, blends pending edits over the original values at every depth
//! for reads, validates fields as they change (synchronously or through
//! futures), and later commits the whole edit set atomically — or discards
//! it. It is the overlay engine behind editable-record flows: bind a form to
//! the draft, watch per-field errors live, then apply or cancel in one step.
//!
//! # Example
//!
//! ```
//! use json_changeset::changeset;
//! use serde_json::json;
//!
//! let cs = changeset(json!({"user": {"name": "Ivan"}}));
//! cs.set_unvalidated("user.name", json!("Micah"));
//!
//! // pending edits blend over the untouched content
//! assert_eq!(cs.get("user.name"), Some(json!("Micah")));
//! assert_eq!(*cs.content().borrow(), json!({"user": {"name": "Ivan"}}));
//!
//! // commit, then revert
//! assert!(cs.execute());
//! assert_eq!(*cs.content().borrow(), json!({"user": {"name": "Micah"}}));
//! cs.unexecute();
//! assert_eq!(*cs.content().borrow(), json!({"user": {"name": "Ivan"}}));
//! ```
//!
//! Validated writes go through the async [`Changeset::set`]; with only
//! synchronous validators configured the returned future completes without
//! suspending:
//!
//! ```
//! use json_changeset::{changeset, ValidatorResult};
//! use serde_json::json;
//!
//! let cs = changeset(json!({"name": "Ivan"})).with_validator(|args| {
//!     if args.new_value.as_str().is_some_and(|s| s.len() >= 4) {
//!         ValidatorResult::valid()
//!     } else {
//!         ValidatorResult::invalid("too short")
//!     }
//! });
//! futures::executor::block_on(cs.set("name", json!("Al")));
//! assert!(cs.is_invalid());
//! futures::executor::block_on(cs.set("name", json!("Albert")));
//! assert!(cs.is_valid());
//! ```

mod array;
mod change;
mod changeset;
mod error;
mod events;
mod node;
mod snapshot;
mod validate;
mod view;

pub use change::Change;
pub use changeset::{changeset, Changeset, Options};
pub use error::{ChangesetError, ErrorEntry, Validation};
pub use events::{ChangesetEvent, EventKind, Notifier};
pub use snapshot::Snapshot;
pub use validate::{
    validator, ValidationArgs, Validator, ValidatorMap, ValidatorResult, ValidatorSpec, Verdict,
};
pub use view::LazyView;
