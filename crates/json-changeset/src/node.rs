//! Per-level overlay state for object content.
//!
//! A node tracks everything the overlay knows about one addressable level of
//! the content: pending edits for its immediate keys, lazily-created child
//! nodes for nested levels, validation failures, and the undo buffer captured
//! by the last commit. The array counterpart lives in [`crate::array`].

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use dot_path::{join, PathStep};

use crate::array::{step_index, ArrayNode};
use crate::change::Edit;
use crate::error::ErrorEntry;

pub(crate) type NodeRef = Rc<RefCell<NodeKind>>;

pub(crate) fn new_node_ref(node: NodeKind) -> NodeRef {
    Rc::new(RefCell::new(node))
}

/// Prior state of one key, captured by `execute` and consumed by `unexecute`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UndoEntry {
    Prior(Value),
    Missing,
}

pub(crate) enum NodeKind {
    Object(ObjectNode),
    Array(ArrayNode),
}

impl NodeKind {
    /// Node variant matching a content value's shape.
    pub(crate) fn for_content(content: &Value) -> NodeKind {
        match content {
            Value::Array(_) => NodeKind::Array(ArrayNode::default()),
            _ => NodeKind::Object(ObjectNode::default()),
        }
    }

    /// Node variant inferred from the next path step when no base value is
    /// available: an index step implies an array, anything else an object.
    pub(crate) fn for_step(next: Option<&PathStep>) -> NodeKind {
        match next {
            Some(PathStep::Index(_)) => NodeKind::Array(ArrayNode::default()),
            _ => NodeKind::Object(ObjectNode::default()),
        }
    }

    /// Node wrapping a pending replacement value. Later nested edits layer
    /// over the carried value instead of the (superseded) content slice.
    pub(crate) fn with_base(value: Value) -> NodeKind {
        match value {
            Value::Array(items) => NodeKind::Array(ArrayNode::with_replacement(items)),
            other => NodeKind::Object(ObjectNode::with_base(other)),
        }
    }

    pub(crate) fn for_base(base: Option<&Value>, next: Option<&PathStep>) -> NodeKind {
        match base {
            Some(Value::Array(_)) => NodeKind::Array(ArrayNode::default()),
            Some(Value::Object(_)) => NodeKind::Object(ObjectNode::default()),
            _ => Self::for_step(next),
        }
    }

    /// The empty content value this node commits into a missing slot.
    pub(crate) fn empty_content(&self) -> Value {
        match self {
            NodeKind::Object(_) => Value::Object(Map::new()),
            NodeKind::Array(_) => Value::Array(Vec::new()),
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        match self {
            NodeKind::Object(node) => node.is_dirty(),
            NodeKind::Array(node) => node.is_dirty(),
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        match self {
            NodeKind::Object(node) => node.is_valid(),
            NodeKind::Array(node) => node.is_valid(),
        }
    }

    pub(crate) fn effective_value(&self, content: Option<&Value>) -> Value {
        match self {
            NodeKind::Object(node) => node.effective_value(content),
            NodeKind::Array(node) => node.effective_value(content),
        }
    }

    pub(crate) fn get_in(&self, steps: &[PathStep], content: Option<&Value>) -> Option<Value> {
        match self {
            NodeKind::Object(node) => node.get_in(steps, content),
            NodeKind::Array(node) => node.get_in(steps, content),
        }
    }

    pub(crate) fn set_in(&mut self, steps: &[PathStep], value: Value, content: Option<&Value>) {
        if steps.is_empty() {
            // Only a whole-array write is meaningful at a node's own path.
            if let NodeKind::Array(node) = self {
                if let Value::Array(items) = value {
                    node.set_whole(items);
                }
            }
            return;
        }
        match self {
            NodeKind::Object(node) => node.set_in(steps, value, content),
            NodeKind::Array(node) => node.set_in(steps, value, content),
        }
    }

    pub(crate) fn ensure_child_step(
        &mut self,
        step: &PathStep,
        content: Option<&Value>,
        next: Option<&PathStep>,
    ) -> NodeRef {
        match self {
            NodeKind::Object(node) => node.ensure_child(&step.as_segment(), content, next),
            NodeKind::Array(node) => match step_index(step) {
                Some(idx) => node.ensure_child(idx, content, next),
                // Key step into an array: hand back a detached node so the
                // caller gets a working (if inert) view.
                None => new_node_ref(NodeKind::for_step(next)),
            },
        }
    }

    pub(crate) fn execute(&mut self, content: &mut Value) {
        match self {
            NodeKind::Object(node) => node.execute(content),
            NodeKind::Array(node) => node.execute(content),
        }
    }

    pub(crate) fn unexecute(&mut self, content: &mut Value) {
        match self {
            NodeKind::Object(node) => node.unexecute(content),
            NodeKind::Array(node) => node.unexecute(content),
        }
    }

    pub(crate) fn rollback(&mut self) {
        match self {
            NodeKind::Object(node) => node.rollback(),
            NodeKind::Array(node) => node.rollback(),
        }
    }

    /// Drop pending edits and errors but keep the undo buffer, so a commit
    /// can still be reverted afterwards.
    pub(crate) fn clear_pending(&mut self) {
        match self {
            NodeKind::Object(node) => node.clear_pending(),
            NodeKind::Array(node) => node.clear_pending(),
        }
    }

    /// Reset a replacement node whose value was just folded into content.
    /// The node stays alive so views bound to it keep working.
    pub(crate) fn clear_after_commit(&mut self) {
        match self {
            NodeKind::Object(node) => {
                node.base = None;
                node.local_edits.clear();
                node.children.clear();
                node.errors.clear();
            }
            NodeKind::Array(node) => node.clear_after_commit(),
        }
    }

    pub(crate) fn collect_changes(&self, prefix: &str, out: &mut IndexMap<String, Value>) {
        match self {
            NodeKind::Object(node) => node.collect_changes(prefix, out),
            NodeKind::Array(node) => node.collect_changes(prefix, out),
        }
    }

    pub(crate) fn collect_errors(&self, prefix: &str, out: &mut IndexMap<String, ErrorEntry>) {
        match self {
            NodeKind::Object(node) => node.collect_errors(prefix, out),
            NodeKind::Array(node) => node.collect_errors(prefix, out),
        }
    }

    pub(crate) fn add_error_in(
        &mut self,
        steps: &[PathStep],
        entry: ErrorEntry,
        content: Option<&Value>,
    ) {
        match self {
            NodeKind::Object(node) => node.add_error_in(steps, entry, content),
            NodeKind::Array(node) => node.add_error_in(steps, entry, content),
        }
    }

    pub(crate) fn error_in(&self, steps: &[PathStep]) -> Option<ErrorEntry> {
        match self {
            NodeKind::Object(node) => node.error_in(steps),
            NodeKind::Array(node) => node.error_in(steps),
        }
    }

    pub(crate) fn clear_error_in(&mut self, steps: &[PathStep]) {
        match self {
            NodeKind::Object(node) => node.clear_error_in(steps),
            NodeKind::Array(node) => node.clear_error_in(steps),
        }
    }

    pub(crate) fn clear_change_in(&mut self, steps: &[PathStep]) {
        match self {
            NodeKind::Object(node) => node.clear_change_in(steps),
            NodeKind::Array(node) => node.clear_change_in(steps),
        }
    }

    pub(crate) fn cast(&mut self, prefix: &str, allowed: &[String]) {
        match self {
            NodeKind::Object(node) => node.cast(prefix, allowed),
            NodeKind::Array(node) => node.cast(prefix, allowed),
        }
    }
}

/// Object-variant change node.
#[derive(Default)]
pub(crate) struct ObjectNode {
    /// Pending replacement value this node layers over, when the whole level
    /// was replaced. `None` means the content slice is the base.
    pub(crate) base: Option<Value>,
    pub(crate) local_edits: IndexMap<String, Edit>,
    pub(crate) children: IndexMap<String, NodeRef>,
    pub(crate) errors: IndexMap<String, ErrorEntry>,
    pub(crate) undo: IndexMap<String, UndoEntry>,
}

impl ObjectNode {
    pub(crate) fn with_base(value: Value) -> Self {
        Self {
            base: Some(value),
            ..Self::default()
        }
    }

    fn base_or<'a>(&'a self, content: Option<&'a Value>) -> Option<&'a Value> {
        self.base.as_ref().or(content)
    }

    /// The base value for `key`, taken from the replacement value when this
    /// node carries one, else from the content slice.
    fn slice<'a>(&'a self, content: Option<&'a Value>, key: &str) -> Option<&'a Value> {
        self.base_or(content)
            .and_then(|value| value.as_object())
            .and_then(|map| map.get(key))
    }

    pub(crate) fn is_dirty(&self) -> bool {
        !self.local_edits.is_empty() || self.children.values().any(|c| c.borrow().is_dirty())
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.children.values().all(|c| c.borrow().is_valid())
    }

    /// Effective value of `key`: pending leaf edit, replacement subtree,
    /// tracked child state, or the untouched base value, in that order.
    pub(crate) fn get(&self, key: &str, content: Option<&Value>) -> Option<Value> {
        match self.local_edits.get(key) {
            Some(Edit::Leaf(value)) => return Some(value.clone()),
            Some(Edit::Replaced) => {
                return self
                    .children
                    .get(key)
                    .map(|child| child.borrow().effective_value(None));
            }
            None => {}
        }
        if let Some(child) = self.children.get(key) {
            let node = child.borrow();
            let slice = self.slice(content, key);
            if !node.is_dirty() && slice.is_none() {
                return None;
            }
            return Some(node.effective_value(slice));
        }
        self.slice(content, key).cloned()
    }

    /// Record a pending edit for `key`.
    ///
    /// Object/array values become a replacement child. Scalar values are
    /// compared against the committed value so that writing it back removes
    /// the pending edit instead of recording a no-op change; re-staging the
    /// already-pending value changes nothing.
    pub(crate) fn set(&mut self, key: &str, value: Value, content: Option<&Value>) {
        if value.is_object() || value.is_array() {
            self.children
                .insert(key.to_string(), new_node_ref(NodeKind::with_base(value)));
            self.local_edits.insert(key.to_string(), Edit::Replaced);
            return;
        }
        if self.slice(content, key) == Some(&value) {
            self.local_edits.shift_remove(key);
            self.children.shift_remove(key);
            return;
        }
        if self.get(key, content).as_ref() == Some(&value) {
            return;
        }
        self.local_edits.insert(key.to_string(), Edit::Leaf(value));
        self.children.shift_remove(key);
    }

    /// Child node for `key`, created on first use. A scalar pending edit for
    /// the same key is superseded by the nested write that needs the child.
    pub(crate) fn ensure_child(
        &mut self,
        key: &str,
        content: Option<&Value>,
        next: Option<&PathStep>,
    ) -> NodeRef {
        if matches!(self.local_edits.get(key), Some(Edit::Leaf(_))) {
            self.local_edits.shift_remove(key);
        }
        if let Some(child) = self.children.get(key) {
            return Rc::clone(child);
        }
        let node = {
            let base = self.slice(content, key);
            if self.base.is_some() {
                // Inside a replacement subtree the content slice is not
                // authoritative; the child carries its own copy of the slice.
                match base {
                    Some(value @ (Value::Object(_) | Value::Array(_))) => {
                        NodeKind::with_base(value.clone())
                    }
                    _ => NodeKind::for_step(next),
                }
            } else {
                NodeKind::for_base(base, next)
            }
        };
        let child = new_node_ref(node);
        self.children.insert(key.to_string(), Rc::clone(&child));
        child
    }

    pub(crate) fn get_in(&self, steps: &[PathStep], content: Option<&Value>) -> Option<Value> {
        let Some((head, rest)) = steps.split_first() else {
            return Some(self.effective_value(content));
        };
        let key = head.as_segment();
        if rest.is_empty() {
            return self.get(&key, content);
        }
        match self.local_edits.get(&key) {
            Some(Edit::Leaf(value)) => return dot_path::get(value, rest).cloned(),
            Some(Edit::Replaced) => {
                return self
                    .children
                    .get(&key)
                    .and_then(|child| child.borrow().get_in(rest, None));
            }
            None => {}
        }
        if let Some(child) = self.children.get(&key) {
            return child.borrow().get_in(rest, self.slice(content, &key));
        }
        self.slice(content, &key)
            .and_then(|value| dot_path::get(value, rest))
            .cloned()
    }

    pub(crate) fn set_in(&mut self, steps: &[PathStep], value: Value, content: Option<&Value>) {
        let Some((head, rest)) = steps.split_first() else {
            return;
        };
        let key = head.as_segment();
        if rest.is_empty() {
            self.set(&key, value, content);
            return;
        }
        let child = self.ensure_child(&key, content, rest.first());
        let slice = self.slice(content, &key);
        child.borrow_mut().set_in(rest, value, slice);
    }

    /// Whole effective value of this level: base (replacement or content)
    /// with every pending edit and dirty child layered over it.
    pub(crate) fn effective_value(&self, content: Option<&Value>) -> Value {
        let mut out = match self.base_or(content) {
            Some(value) => value.clone(),
            None => Value::Object(Map::new()),
        };
        if !out.is_object() && (!self.local_edits.is_empty() || !self.children.is_empty()) {
            out = Value::Object(Map::new());
        }
        let Value::Object(map) = &mut out else {
            return out;
        };
        for (key, edit) in &self.local_edits {
            match edit {
                Edit::Leaf(value) => {
                    map.insert(key.clone(), value.clone());
                }
                Edit::Replaced => {
                    if let Some(child) = self.children.get(key) {
                        map.insert(key.clone(), child.borrow().effective_value(None));
                    }
                }
            }
        }
        for (key, child) in &self.children {
            if matches!(self.local_edits.get(key), Some(Edit::Replaced)) {
                continue;
            }
            let node = child.borrow();
            if !node.is_dirty() {
                continue;
            }
            let base = map.get(key).cloned();
            let value = node.effective_value(base.as_ref());
            map.insert(key.clone(), value);
        }
        out
    }

    /// Apply pending edits to the content slice, capturing undo state.
    pub(crate) fn execute(&mut self, content: &mut Value) {
        let Value::Object(map) = content else {
            return;
        };
        self.undo.clear();
        let edits = std::mem::take(&mut self.local_edits);
        for (key, edit) in edits {
            let new_value = match edit {
                Edit::Leaf(value) => value,
                Edit::Replaced => match self.children.get(&key) {
                    Some(child) => {
                        let effective = child.borrow().effective_value(None);
                        child.borrow_mut().clear_after_commit();
                        effective
                    }
                    None => continue,
                },
            };
            let prior = match map.get(&key) {
                Some(value) => UndoEntry::Prior(value.clone()),
                None => UndoEntry::Missing,
            };
            self.undo.insert(key.clone(), prior);
            map.insert(key, new_value);
        }
        for (key, child) in &self.children {
            let mut node = child.borrow_mut();
            if !node.is_dirty() {
                continue;
            }
            if !map.contains_key(key) {
                map.insert(key.clone(), node.empty_content());
                self.undo.insert(key.clone(), UndoEntry::Missing);
            }
            if let Some(slot) = map.get_mut(key) {
                node.execute(slot);
            }
        }
    }

    /// Revert the last `execute` by replaying the undo buffer.
    pub(crate) fn unexecute(&mut self, content: &mut Value) {
        let Value::Object(map) = content else {
            return;
        };
        for (key, child) in &self.children {
            if let Some(slot) = map.get_mut(key) {
                child.borrow_mut().unexecute(slot);
            }
        }
        let undo = std::mem::take(&mut self.undo);
        for (key, entry) in undo.into_iter().rev() {
            match entry {
                UndoEntry::Missing => {
                    map.remove(&key);
                }
                UndoEntry::Prior(value) => {
                    map.insert(key, value);
                }
            }
        }
    }

    /// Discard all pending state at this level and below. Content is never
    /// touched. Children are rolled back before being dropped so that views
    /// still holding them observe a clean node.
    pub(crate) fn rollback(&mut self) {
        for child in self.children.values() {
            child.borrow_mut().rollback();
        }
        self.base = None;
        self.local_edits.clear();
        self.children.clear();
        self.errors.clear();
        self.undo.clear();
    }

    pub(crate) fn clear_pending(&mut self) {
        for child in self.children.values() {
            child.borrow_mut().clear_pending();
        }
        self.base = None;
        self.local_edits.clear();
        self.errors.clear();
    }

    pub(crate) fn collect_changes(&self, prefix: &str, out: &mut IndexMap<String, Value>) {
        for (key, edit) in &self.local_edits {
            let path = join(prefix, key);
            match edit {
                Edit::Leaf(value) => {
                    out.insert(path, value.clone());
                }
                Edit::Replaced => {
                    if let Some(child) = self.children.get(key) {
                        out.insert(path, child.borrow().effective_value(None));
                    }
                }
            }
        }
        for (key, child) in &self.children {
            if matches!(self.local_edits.get(key), Some(Edit::Replaced)) {
                continue;
            }
            child.borrow().collect_changes(&join(prefix, key), out);
        }
    }

    pub(crate) fn collect_errors(&self, prefix: &str, out: &mut IndexMap<String, ErrorEntry>) {
        for (key, entry) in &self.errors {
            out.insert(join(prefix, key), entry.clone());
        }
        for (key, child) in &self.children {
            child.borrow().collect_errors(&join(prefix, key), out);
        }
    }

    pub(crate) fn add_error_in(
        &mut self,
        steps: &[PathStep],
        entry: ErrorEntry,
        content: Option<&Value>,
    ) {
        let Some((head, rest)) = steps.split_first() else {
            return;
        };
        let key = head.as_segment();
        if rest.is_empty() {
            self.errors.insert(key, entry);
            return;
        }
        let child = self.ensure_child(&key, content, rest.first());
        let slice = self.slice(content, &key);
        child.borrow_mut().add_error_in(rest, entry, slice);
    }

    pub(crate) fn error_in(&self, steps: &[PathStep]) -> Option<ErrorEntry> {
        let (head, rest) = steps.split_first()?;
        let key = head.as_segment();
        if rest.is_empty() {
            return self.errors.get(&key).cloned();
        }
        self.children.get(&key)?.borrow().error_in(rest)
    }

    pub(crate) fn clear_error_in(&mut self, steps: &[PathStep]) {
        let Some((head, rest)) = steps.split_first() else {
            return;
        };
        let key = head.as_segment();
        if rest.is_empty() {
            self.errors.shift_remove(&key);
        } else if let Some(child) = self.children.get(&key) {
            child.borrow_mut().clear_error_in(rest);
        }
    }

    pub(crate) fn clear_change_in(&mut self, steps: &[PathStep]) {
        let Some((head, rest)) = steps.split_first() else {
            return;
        };
        let key = head.as_segment();
        if rest.is_empty() {
            self.local_edits.shift_remove(&key);
            self.children.shift_remove(&key);
        } else if let Some(child) = self.children.get(&key) {
            child.borrow_mut().clear_change_in(rest);
        }
    }

    /// Keep only pending state whose flattened path is in `allowed`.
    pub(crate) fn cast(&mut self, prefix: &str, allowed: &[String]) {
        self.local_edits
            .retain(|key, _| allowed.iter().any(|a| *a == join(prefix, key)));
        self.undo
            .retain(|key, _| allowed.iter().any(|a| *a == join(prefix, key)));
        let keys: Vec<String> = self.children.keys().cloned().collect();
        for key in keys {
            let path = join(prefix, &key);
            if matches!(self.local_edits.get(&key), Some(Edit::Replaced)) {
                // a kept whole replacement stays intact
                continue;
            }
            if let Some(child) = self.children.get(&key).cloned() {
                child.borrow_mut().cast(&path, allowed);
                if !child.borrow().is_dirty() {
                    self.children.shift_remove(&key);
                }
            }
        }
    }
}
