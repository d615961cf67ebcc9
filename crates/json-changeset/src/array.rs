//! Per-level overlay state for array content.
//!
//! Arrays are tracked at a coarser grain than objects: either the whole array
//! is replaced (one pending array value spanning the node, also used as the
//! working copy for bulk operations), or individual indices are edited
//! through delegated child nodes exactly like object keys.

use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use dot_path::{join, PathStep};

use crate::change::Edit;
use crate::error::ErrorEntry;
use crate::node::{new_node_ref, NodeKind, NodeRef, UndoEntry};

/// Array index carried by a path step. Key steps that look like indices are
/// accepted too, so programmatically built paths keep working.
pub(crate) fn step_index(step: &PathStep) -> Option<usize> {
    match step {
        PathStep::Index(idx) => Some(*idx),
        PathStep::Key(key) => key.parse().ok(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ArrayUndo {
    Whole(Vec<Value>),
    PerIndex {
        prior_len: usize,
        entries: IndexMap<usize, UndoEntry>,
    },
}

/// Array-variant change node.
#[derive(Default)]
pub(crate) struct ArrayNode {
    /// Whole-array pending value. Doubles as the working copy for bulk
    /// operations; per-index leaf edits are folded in when it is seeded.
    pub(crate) replacement: Option<Vec<Value>>,
    pub(crate) local_edits: IndexMap<usize, Edit>,
    pub(crate) children: IndexMap<usize, NodeRef>,
    pub(crate) errors: IndexMap<usize, ErrorEntry>,
    pub(crate) undo: Option<ArrayUndo>,
}

impl ArrayNode {
    pub(crate) fn with_replacement(items: Vec<Value>) -> Self {
        Self {
            replacement: Some(items),
            ..Self::default()
        }
    }

    fn slice<'a>(&'a self, content: Option<&'a Value>, idx: usize) -> Option<&'a Value> {
        if let Some(items) = &self.replacement {
            return items.get(idx);
        }
        content
            .and_then(|value| value.as_array())
            .and_then(|items| items.get(idx))
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.replacement.is_some()
            || !self.local_edits.is_empty()
            || self.children.values().any(|c| c.borrow().is_dirty())
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.children.values().all(|c| c.borrow().is_valid())
    }

    pub(crate) fn get(&self, idx: usize, content: Option<&Value>) -> Option<Value> {
        if self.replacement.is_some() {
            if let Some(child) = self.children.get(&idx) {
                let node = child.borrow();
                if node.is_dirty() {
                    return Some(node.effective_value(self.slice(content, idx)));
                }
            }
            return self.slice(content, idx).cloned();
        }
        match self.local_edits.get(&idx) {
            Some(Edit::Leaf(value)) => return Some(value.clone()),
            Some(Edit::Replaced) => {
                return self
                    .children
                    .get(&idx)
                    .map(|child| child.borrow().effective_value(None));
            }
            None => {}
        }
        if let Some(child) = self.children.get(&idx) {
            let node = child.borrow();
            let slice = self.slice(content, idx);
            if !node.is_dirty() && slice.is_none() {
                return None;
            }
            return Some(node.effective_value(slice));
        }
        self.slice(content, idx).cloned()
    }

    /// Record a pending edit for one index. When a whole-array replacement is
    /// pending the write lands directly in the working copy.
    pub(crate) fn set_index(&mut self, idx: usize, value: Value, content: Option<&Value>) {
        if let Some(items) = &mut self.replacement {
            if idx >= items.len() {
                items.resize(idx + 1, Value::Null);
            }
            items[idx] = value;
            self.children.shift_remove(&idx);
            return;
        }
        if value.is_object() || value.is_array() {
            self.children
                .insert(idx, new_node_ref(NodeKind::with_base(value)));
            self.local_edits.insert(idx, Edit::Replaced);
            return;
        }
        if self.slice(content, idx) == Some(&value) {
            self.local_edits.shift_remove(&idx);
            self.children.shift_remove(&idx);
            return;
        }
        if self.get(idx, content).as_ref() == Some(&value) {
            return;
        }
        self.local_edits.insert(idx, Edit::Leaf(value));
        self.children.shift_remove(&idx);
    }

    /// Replace the whole array with a new pending value.
    pub(crate) fn set_whole(&mut self, items: Vec<Value>) {
        self.local_edits.clear();
        self.children.clear();
        self.replacement = Some(items);
    }

    pub(crate) fn ensure_child(
        &mut self,
        idx: usize,
        content: Option<&Value>,
        next: Option<&PathStep>,
    ) -> NodeRef {
        if matches!(self.local_edits.get(&idx), Some(Edit::Leaf(_))) {
            self.local_edits.shift_remove(&idx);
        }
        if let Some(child) = self.children.get(&idx) {
            return Rc::clone(child);
        }
        let node = {
            let base = self.slice(content, idx);
            if self.replacement.is_some() {
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
        self.children.insert(idx, Rc::clone(&child));
        child
    }

    pub(crate) fn get_in(&self, steps: &[PathStep], content: Option<&Value>) -> Option<Value> {
        let Some((head, rest)) = steps.split_first() else {
            return Some(self.effective_value(content));
        };
        let idx = step_index(head)?;
        if rest.is_empty() {
            return self.get(idx, content);
        }
        if self.replacement.is_none() {
            match self.local_edits.get(&idx) {
                Some(Edit::Leaf(value)) => return dot_path::get(value, rest).cloned(),
                Some(Edit::Replaced) => {
                    return self
                        .children
                        .get(&idx)
                        .and_then(|child| child.borrow().get_in(rest, None));
                }
                None => {}
            }
        }
        if let Some(child) = self.children.get(&idx) {
            return child.borrow().get_in(rest, self.slice(content, idx));
        }
        self.slice(content, idx)
            .and_then(|value| dot_path::get(value, rest))
            .cloned()
    }

    pub(crate) fn set_in(&mut self, steps: &[PathStep], value: Value, content: Option<&Value>) {
        let Some((head, rest)) = steps.split_first() else {
            return;
        };
        let Some(idx) = step_index(head) else {
            return;
        };
        if rest.is_empty() {
            self.set_index(idx, value, content);
            return;
        }
        let child = self.ensure_child(idx, content, rest.first());
        let slice = self.slice(content, idx);
        child.borrow_mut().set_in(rest, value, slice);
    }

    pub(crate) fn effective_value(&self, content: Option<&Value>) -> Value {
        let mut items: Vec<Value> = match &self.replacement {
            Some(items) => items.clone(),
            None => content
                .and_then(|value| value.as_array())
                .cloned()
                .unwrap_or_default(),
        };
        if self.replacement.is_none() {
            for (idx, edit) in &self.local_edits {
                let value = match edit {
                    Edit::Leaf(value) => value.clone(),
                    Edit::Replaced => match self.children.get(idx) {
                        Some(child) => child.borrow().effective_value(None),
                        None => continue,
                    },
                };
                if *idx >= items.len() {
                    items.resize(*idx + 1, Value::Null);
                }
                items[*idx] = value;
            }
        }
        for (idx, child) in &self.children {
            if self.replacement.is_none()
                && matches!(self.local_edits.get(idx), Some(Edit::Replaced))
            {
                continue;
            }
            let node = child.borrow();
            if !node.is_dirty() {
                continue;
            }
            let base = items.get(*idx).cloned();
            let value = node.effective_value(base.as_ref());
            if *idx >= items.len() {
                items.resize(*idx + 1, Value::Null);
            }
            items[*idx] = value;
        }
        Value::Array(items)
    }

    // ── Bulk operations over the working copy ─────────────────────────────

    /// The working copy, seeded from the effective array on first use. Once
    /// seeded, the node reports a single whole-array pending change.
    pub(crate) fn working_mut(&mut self, content: Option<&Value>) -> &mut Vec<Value> {
        if self.replacement.is_none() {
            let seeded = match self.effective_value(content) {
                Value::Array(items) => items,
                _ => Vec::new(),
            };
            self.local_edits.clear();
            self.children.clear();
            self.replacement = Some(seeded);
        }
        self.replacement.get_or_insert_with(Vec::new)
    }

    pub(crate) fn push(&mut self, value: Value, content: Option<&Value>) {
        self.working_mut(content).push(value);
    }

    pub(crate) fn insert_at(&mut self, idx: usize, value: Value, content: Option<&Value>) {
        let items = self.working_mut(content);
        let idx = idx.min(items.len());
        items.insert(idx, value);
    }

    pub(crate) fn remove_at(&mut self, idx: usize, content: Option<&Value>) -> Option<Value> {
        let items = self.working_mut(content);
        if idx < items.len() {
            Some(items.remove(idx))
        } else {
            None
        }
    }

    pub(crate) fn swap_items(&mut self, a: usize, b: usize, content: Option<&Value>) {
        let items = self.working_mut(content);
        if a < items.len() && b < items.len() {
            items.swap(a, b);
        }
    }

    pub(crate) fn clear_items(&mut self, content: Option<&Value>) {
        self.working_mut(content).clear();
    }

    // ── Transactions ──────────────────────────────────────────────────────

    pub(crate) fn execute(&mut self, content: &mut Value) {
        let Value::Array(arr) = content else {
            return;
        };
        self.undo = None;
        if self.replacement.is_some() {
            let effective = match self.effective_value(None) {
                Value::Array(items) => items,
                _ => return,
            };
            self.undo = Some(ArrayUndo::Whole(arr.clone()));
            arr.clear();
            arr.extend(effective);
            self.replacement = None;
            self.children.clear();
            return;
        }
        let prior_len = arr.len();
        let mut entries = IndexMap::new();
        let edits = std::mem::take(&mut self.local_edits);
        for (idx, edit) in edits {
            if self.errors.contains_key(&idx) {
                // a failed index stays pending; sibling indices still commit
                self.local_edits.insert(idx, edit);
                continue;
            }
            let new_value = match edit {
                Edit::Leaf(value) => value,
                Edit::Replaced => match self.children.get(&idx) {
                    Some(child) => {
                        let effective = child.borrow().effective_value(None);
                        child.borrow_mut().clear_after_commit();
                        effective
                    }
                    None => continue,
                },
            };
            if idx < arr.len() {
                entries.insert(idx, UndoEntry::Prior(arr[idx].clone()));
                arr[idx] = new_value;
            } else {
                while arr.len() < idx {
                    arr.push(Value::Null);
                }
                entries.insert(idx, UndoEntry::Missing);
                arr.push(new_value);
            }
        }
        for (idx, child) in &self.children {
            let mut node = child.borrow_mut();
            if !node.is_dirty() {
                continue;
            }
            if *idx >= arr.len() {
                while arr.len() < *idx {
                    arr.push(Value::Null);
                }
                arr.push(node.empty_content());
                entries.insert(*idx, UndoEntry::Missing);
            }
            if let Some(slot) = arr.get_mut(*idx) {
                node.execute(slot);
            }
        }
        self.undo = Some(ArrayUndo::PerIndex { prior_len, entries });
    }

    pub(crate) fn unexecute(&mut self, content: &mut Value) {
        let Value::Array(arr) = content else {
            return;
        };
        for (idx, child) in &self.children {
            if let Some(slot) = arr.get_mut(*idx) {
                child.borrow_mut().unexecute(slot);
            }
        }
        match self.undo.take() {
            Some(ArrayUndo::Whole(prior)) => {
                arr.clear();
                arr.extend(prior);
            }
            Some(ArrayUndo::PerIndex { prior_len, entries }) => {
                for (idx, entry) in entries.into_iter().rev() {
                    if let UndoEntry::Prior(value) = entry {
                        if let Some(slot) = arr.get_mut(idx) {
                            *slot = value;
                        }
                    }
                }
                // indices added by the commit fall off here
                arr.truncate(prior_len);
            }
            None => {}
        }
    }

    pub(crate) fn rollback(&mut self) {
        for child in self.children.values() {
            child.borrow_mut().rollback();
        }
        self.replacement = None;
        self.local_edits.clear();
        self.children.clear();
        self.errors.clear();
        self.undo = None;
    }

    pub(crate) fn clear_pending(&mut self) {
        for child in self.children.values() {
            child.borrow_mut().clear_pending();
        }
        self.replacement = None;
        self.local_edits.clear();
        self.errors.clear();
    }

    pub(crate) fn clear_after_commit(&mut self) {
        self.replacement = None;
        self.local_edits.clear();
        self.children.clear();
        self.errors.clear();
    }

    // ── Flattening / per-path state ───────────────────────────────────────

    pub(crate) fn collect_changes(&self, prefix: &str, out: &mut IndexMap<String, Value>) {
        if self.replacement.is_some() {
            out.insert(prefix.to_string(), self.effective_value(None));
            return;
        }
        for (idx, edit) in &self.local_edits {
            let path = join(prefix, &idx.to_string());
            match edit {
                Edit::Leaf(value) => {
                    out.insert(path, value.clone());
                }
                Edit::Replaced => {
                    if let Some(child) = self.children.get(idx) {
                        out.insert(path, child.borrow().effective_value(None));
                    }
                }
            }
        }
        for (idx, child) in &self.children {
            if matches!(self.local_edits.get(idx), Some(Edit::Replaced)) {
                continue;
            }
            child
                .borrow()
                .collect_changes(&join(prefix, &idx.to_string()), out);
        }
    }

    pub(crate) fn collect_errors(&self, prefix: &str, out: &mut IndexMap<String, ErrorEntry>) {
        for (idx, entry) in &self.errors {
            out.insert(join(prefix, &idx.to_string()), entry.clone());
        }
        for (idx, child) in &self.children {
            child
                .borrow()
                .collect_errors(&join(prefix, &idx.to_string()), out);
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
        let Some(idx) = step_index(head) else {
            return;
        };
        if rest.is_empty() {
            self.errors.insert(idx, entry);
            return;
        }
        let child = self.ensure_child(idx, content, rest.first());
        let slice = self.slice(content, idx);
        child.borrow_mut().add_error_in(rest, entry, slice);
    }

    pub(crate) fn error_in(&self, steps: &[PathStep]) -> Option<ErrorEntry> {
        let (head, rest) = steps.split_first()?;
        let idx = step_index(head)?;
        if rest.is_empty() {
            return self.errors.get(&idx).cloned();
        }
        self.children.get(&idx)?.borrow().error_in(rest)
    }

    pub(crate) fn clear_error_in(&mut self, steps: &[PathStep]) {
        let Some((head, rest)) = steps.split_first() else {
            return;
        };
        let Some(idx) = step_index(head) else {
            return;
        };
        if rest.is_empty() {
            self.errors.shift_remove(&idx);
        } else if let Some(child) = self.children.get(&idx) {
            child.borrow_mut().clear_error_in(rest);
        }
    }

    pub(crate) fn clear_change_in(&mut self, steps: &[PathStep]) {
        if self.replacement.is_some() {
            // individual indices cannot be carved out of a whole-array
            // replacement
            return;
        }
        let Some((head, rest)) = steps.split_first() else {
            return;
        };
        let Some(idx) = step_index(head) else {
            return;
        };
        if rest.is_empty() {
            self.local_edits.shift_remove(&idx);
            self.children.shift_remove(&idx);
        } else if let Some(child) = self.children.get(&idx) {
            child.borrow_mut().clear_change_in(rest);
        }
    }

    pub(crate) fn cast(&mut self, prefix: &str, allowed: &[String]) {
        if self.replacement.is_some() {
            if !allowed.iter().any(|a| a == prefix) {
                self.replacement = None;
                self.children.clear();
            }
            return;
        }
        self.local_edits
            .retain(|idx, _| allowed.iter().any(|a| *a == join(prefix, &idx.to_string())));
        let drop_whole_undo = matches!(&self.undo, Some(ArrayUndo::Whole(_)))
            && !allowed.iter().any(|a| a == prefix);
        if drop_whole_undo {
            self.undo = None;
        } else if let Some(ArrayUndo::PerIndex { entries, .. }) = &mut self.undo {
            entries.retain(|idx, _| allowed.iter().any(|a| *a == join(prefix, &idx.to_string())));
        }
        let indices: Vec<usize> = self.children.keys().copied().collect();
        for idx in indices {
            let path = join(prefix, &idx.to_string());
            if matches!(self.local_edits.get(&idx), Some(Edit::Replaced)) {
                continue;
            }
            if let Some(child) = self.children.get(&idx).cloned() {
                child.borrow_mut().cast(&path, allowed);
                if !child.borrow().is_dirty() {
                    self.children.shift_remove(&idx);
                }
            }
        }
    }
}
