//! Read/write façade over one overlay level and its content slice.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use dot_path::{format, parse, PathStep};

use crate::error::ChangesetError;
use crate::node::{NodeKind, NodeRef};

/// A cheap-clone handle blending a change node with its content slice.
///
/// Reads see pending edits layered over the content; writes land in the
/// underlying node without touching the content. Deeper views created with
/// [`at`](LazyView::at) share the same node tree, so writes through any view
/// of a logical path are visible through all of them.
///
/// Writes through a view bypass validation and option filtering; those belong
/// to [`Changeset::set`](crate::Changeset::set).
#[derive(Clone)]
pub struct LazyView {
    node: NodeRef,
    content: Rc<RefCell<Value>>,
    path: Vec<PathStep>,
}

impl LazyView {
    pub(crate) fn new(node: NodeRef, content: Rc<RefCell<Value>>, path: Vec<PathStep>) -> Self {
        Self {
            node,
            content,
            path,
        }
    }

    /// Dotted path of this view relative to the content root.
    pub fn path(&self) -> String {
        format(&self.path)
    }

    fn content_slice(&self) -> Option<Value> {
        dot_path::get(&self.content.borrow(), &self.path).cloned()
    }

    /// Effective value of this view's whole subtree.
    pub fn value(&self) -> Value {
        let slice = self.content_slice();
        self.node.borrow().effective_value(slice.as_ref())
    }

    /// Effective value at `path` (relative, dotted) under this view.
    pub fn get(&self, path: &str) -> Option<Value> {
        let slice = self.content_slice();
        self.node.borrow().get_in(&parse(path), slice.as_ref())
    }

    /// Record a pending edit at `path` (relative, dotted) under this view.
    pub fn set(&self, path: &str, value: Value) {
        let slice = self.content_slice();
        self.node
            .borrow_mut()
            .set_in(&parse(path), value, slice.as_ref());
    }

    /// A deeper view for `path` (relative, dotted), materializing and caching
    /// the intermediate nodes so later writes through it are tracked.
    pub fn at(&self, path: &str) -> LazyView {
        let mut view = self.clone();
        for step in parse(path) {
            view = view.step_into(step);
        }
        view
    }

    /// A deeper view for one array index.
    pub fn at_index(&self, index: usize) -> LazyView {
        self.clone().step_into(PathStep::Index(index))
    }

    fn step_into(self, step: PathStep) -> LazyView {
        let slice = self.content_slice();
        let child = self
            .node
            .borrow_mut()
            .ensure_child_step(&step, slice.as_ref(), None);
        let mut path = self.path;
        path.push(step);
        LazyView {
            node: child,
            content: self.content,
            path,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.node.borrow().is_dirty()
    }

    /// Effective element count for arrays, key count for objects.
    pub fn len(&self) -> usize {
        match self.value() {
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Array operations ──────────────────────────────────────────────────
    //
    // All of these surface as a single whole-array pending change on the
    // underlying node; they fail when the view is not bound to an array.

    pub fn push(&self, value: Value) -> Result<(), ChangesetError> {
        let slice = self.content_slice();
        match &mut *self.node.borrow_mut() {
            NodeKind::Array(node) => {
                node.push(value, slice.as_ref());
                Ok(())
            }
            NodeKind::Object(_) => Err(ChangesetError::NotAnArray),
        }
    }

    pub fn insert(&self, index: usize, value: Value) -> Result<(), ChangesetError> {
        let slice = self.content_slice();
        match &mut *self.node.borrow_mut() {
            NodeKind::Array(node) => {
                node.insert_at(index, value, slice.as_ref());
                Ok(())
            }
            NodeKind::Object(_) => Err(ChangesetError::NotAnArray),
        }
    }

    pub fn remove(&self, index: usize) -> Result<Option<Value>, ChangesetError> {
        let slice = self.content_slice();
        match &mut *self.node.borrow_mut() {
            NodeKind::Array(node) => Ok(node.remove_at(index, slice.as_ref())),
            NodeKind::Object(_) => Err(ChangesetError::NotAnArray),
        }
    }

    pub fn swap(&self, a: usize, b: usize) -> Result<(), ChangesetError> {
        let slice = self.content_slice();
        match &mut *self.node.borrow_mut() {
            NodeKind::Array(node) => {
                node.swap_items(a, b, slice.as_ref());
                Ok(())
            }
            NodeKind::Object(_) => Err(ChangesetError::NotAnArray),
        }
    }

    pub fn clear_items(&self) -> Result<(), ChangesetError> {
        let slice = self.content_slice();
        match &mut *self.node.borrow_mut() {
            NodeKind::Array(node) => {
                node.clear_items(slice.as_ref());
                Ok(())
            }
            NodeKind::Object(_) => Err(ChangesetError::NotAnArray),
        }
    }

    pub fn replace_all(&self, items: Vec<Value>) -> Result<(), ChangesetError> {
        match &mut *self.node.borrow_mut() {
            NodeKind::Array(node) => {
                node.set_whole(items);
                Ok(())
            }
            NodeKind::Object(_) => Err(ChangesetError::NotAnArray),
        }
    }
}
