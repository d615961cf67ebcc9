//! The changeset façade: accessors, validated writes, and transactions.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use futures::future::join_all;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, trace};

use dot_path::parse;

use crate::change::Change;
use crate::error::{ChangesetError, ErrorEntry, Validation};
use crate::events::{ChangesetEvent, EventKind, Notifier};
use crate::node::{new_node_ref, NodeKind, NodeRef};
use crate::snapshot::Snapshot;
use crate::validate::{
    run_all, RunningValidations, ValidationArgs, Validator, ValidatorMap, ValidatorResult, Verdict,
};
use crate::view::LazyView;

/// Construction options.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Bypass validation entirely on every `set`.
    pub skip_validate: bool,
    /// Allow-list of dotted paths the changeset tracks at all. Writes to
    /// paths outside the list (and outside their subtrees) are silently
    /// ignored. `None` tracks everything.
    pub changeset_keys: Option<Vec<String>>,
}

/// A draft layer over one content value.
///
/// Edits staged through [`set`](Changeset::set) are visible through
/// [`get`](Changeset::get) and the [`view`](Changeset::view) but leave the
/// content untouched until [`execute`](Changeset::execute) commits them
/// atomically; [`rollback`](Changeset::rollback) discards them.
///
/// The changeset is a single-writer, single-thread structure; the only
/// suspension point is awaiting an async validator.
pub struct Changeset {
    root: NodeRef,
    content: Rc<RefCell<Value>>,
    validator: Option<Validator>,
    validators: Option<ValidatorMap>,
    options: Options,
    notifier: Notifier,
    running: RefCell<RunningValidations>,
}

impl Changeset {
    /// Changeset over a shared content handle. The content is only mutated by
    /// [`execute`](Changeset::execute) / [`unexecute`](Changeset::unexecute).
    pub fn new(content: Rc<RefCell<Value>>) -> Self {
        let root = {
            let value = content.borrow();
            new_node_ref(NodeKind::for_content(&value))
        };
        Self {
            root,
            content,
            validator: None,
            validators: None,
            options: Options::default(),
            notifier: Notifier::new(),
            running: RefCell::new(RunningValidations::default()),
        }
    }

    /// Convenience constructor taking ownership of a plain value.
    pub fn from_value(content: Value) -> Self {
        Self::new(Rc::new(RefCell::new(content)))
    }

    /// Fallback validator invoked for every path without a
    /// [`ValidatorMap`] entry.
    pub fn with_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(ValidationArgs<'_>) -> ValidatorResult + 'static,
    {
        self.validator = Some(Rc::new(f));
        self
    }

    pub fn with_validators(mut self, map: ValidatorMap) -> Self {
        self.validators = Some(map);
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// The shared content handle this changeset is bound to.
    pub fn content(&self) -> Rc<RefCell<Value>> {
        Rc::clone(&self.content)
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    /// Effective value at `path`: pending edits blended over content.
    pub fn get(&self, path: &str) -> Option<Value> {
        let content = self.content.borrow();
        self.root.borrow().get_in(&parse(path), Some(&content))
    }

    /// Flattened pending edits as a dotted-path map.
    pub fn changes_map(&self) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        self.root.borrow().collect_changes("", &mut out);
        out
    }

    /// Flattened pending edits.
    pub fn changes(&self) -> Vec<Change> {
        self.changes_map()
            .into_iter()
            .map(|(path, value)| Change::new(path, value))
            .collect()
    }

    /// The pending edit at exactly `path`, if any.
    pub fn change(&self, path: &str) -> Option<Value> {
        self.changes_map().get(path).cloned()
    }

    /// Flattened validation failures as a dotted-path map.
    pub fn errors_map(&self) -> IndexMap<String, ErrorEntry> {
        let mut out = IndexMap::new();
        self.root.borrow().collect_errors("", &mut out);
        out
    }

    /// Flattened validation failures.
    pub fn errors(&self) -> Vec<(String, ErrorEntry)> {
        self.errors_map().into_iter().collect()
    }

    /// The validation failure at exactly `path`, if any.
    pub fn error(&self, path: &str) -> Option<ErrorEntry> {
        self.root.borrow().error_in(&parse(path))
    }

    pub fn is_dirty(&self) -> bool {
        self.root.borrow().is_dirty()
    }

    pub fn is_pristine(&self) -> bool {
        !self.is_dirty()
    }

    pub fn is_valid(&self) -> bool {
        self.root.borrow().is_valid()
    }

    pub fn is_invalid(&self) -> bool {
        !self.is_valid()
    }

    /// Whether async validations are in flight, optionally for one path.
    pub fn is_validating(&self, path: Option<&str>) -> bool {
        self.running.borrow().is_validating(path)
    }

    /// A lazy view over the whole content.
    pub fn view(&self) -> LazyView {
        LazyView::new(Rc::clone(&self.root), Rc::clone(&self.content), Vec::new())
    }

    // ── Writes ────────────────────────────────────────────────────────────

    /// Stage a pending edit at `path` and validate it.
    ///
    /// Completes synchronously unless a validator for the path answers with a
    /// future. Writes to paths excluded by `changeset_keys` are ignored.
    pub async fn set(&self, path: &str, value: Value) {
        if !self.is_tracked(path) {
            return;
        }
        {
            let content = self.content.borrow();
            self.root
                .borrow_mut()
                .set_in(&parse(path), value.clone(), Some(&content));
        }
        if self.options.skip_validate {
            return;
        }
        if self.validator.is_none() && self.validators.is_none() {
            return;
        }
        self.run_validation(path.to_string(), value).await;
    }

    /// Stage a pending edit without running validation.
    pub fn set_unvalidated(&self, path: &str, value: Value) {
        if !self.is_tracked(path) {
            return;
        }
        let content = self.content.borrow();
        self.root
            .borrow_mut()
            .set_in(&parse(path), value, Some(&content));
    }

    // ── Validation ────────────────────────────────────────────────────────

    /// Validate the given paths, or — with an empty slice — every path the
    /// validator configuration covers (falling back to the currently-changed
    /// paths when only a fallback validator is configured).
    ///
    /// No cancellation exists for superseded async validations: a slower,
    /// older validation still applies its verdict after newer ones settle,
    /// which can transiently reinstate a stale error.
    pub async fn validate(&self, paths: &[&str]) {
        let targets: Vec<String> = if paths.is_empty() {
            match &self.validators {
                Some(map) => map.flatten(),
                None => self.changes_map().keys().cloned().collect(),
            }
        } else {
            paths.iter().map(|p| p.to_string()).collect()
        };
        let validations: Vec<_> = targets
            .into_iter()
            .map(|path| {
                let new_value = self.get(&path).unwrap_or(Value::Null);
                self.run_validation(path, new_value)
            })
            .collect();
        join_all(validations).await;
    }

    async fn run_validation(&self, path: String, new_value: Value) {
        self.notifier.emit(&ChangesetEvent::BeforeValidation {
            path: path.clone(),
        });
        match self.invoke_validators(&path, &new_value) {
            ValidatorResult::Sync(verdict) => {
                let valid = self.apply_verdict(&path, &new_value, verdict);
                self.notifier
                    .emit(&ChangesetEvent::AfterValidation { path, valid });
            }
            ValidatorResult::Future(fut) => {
                let (seq, tx, waiters) = self.running.borrow_mut().register(&path);
                // everything already in flight settles before this verdict
                // applies, so resolution order cannot reorder error state
                join_all(waiters).await;
                let verdict = fut.await;
                let valid = self.apply_verdict(&path, &new_value, verdict);
                self.notifier
                    .emit(&ChangesetEvent::AfterValidation { path, valid });
                self.running.borrow_mut().settle(seq);
                let _ = tx.send(());
            }
        }
    }

    fn invoke_validators(&self, path: &str, new_value: &Value) -> ValidatorResult {
        let configured = self
            .validators
            .as_ref()
            .and_then(|map| map.validators_for(path));
        let validators: Vec<Validator> = match configured {
            Some(validators) => validators,
            None => match &self.validator {
                Some(validator) => vec![Rc::clone(validator)],
                None => return ValidatorResult::Sync(Verdict::Valid),
            },
        };
        let changes = self.changes_map();
        let content = self.content.borrow();
        let old_value = dot_path::get(&content, &parse(path));
        let args = ValidationArgs {
            path,
            new_value,
            old_value,
            changes: &changes,
            content: &content,
        };
        run_all(&validators, args)
    }

    fn apply_verdict(&self, path: &str, new_value: &Value, verdict: Verdict) -> bool {
        let steps = parse(path);
        match verdict {
            Verdict::Valid => {
                self.root.borrow_mut().clear_error_in(&steps);
                trace!(path, "validation passed");
                true
            }
            Verdict::Invalid(validation) => {
                let entry = ErrorEntry::new(new_value.clone(), validation);
                let content = self.content.borrow();
                let mut root = self.root.borrow_mut();
                root.clear_error_in(&steps);
                root.add_error_in(&steps, entry, Some(&content));
                trace!(path, "validation failed");
                false
            }
        }
    }

    /// Record a validation failure computed outside the pipeline. The entry
    /// stays until the path is revalidated or rolled back.
    pub fn add_error(&self, path: &str, entry: ErrorEntry) {
        let content = self.content.borrow();
        self.root
            .borrow_mut()
            .add_error_in(&parse(path), entry, Some(&content));
    }

    /// Shorthand for [`add_error`](Changeset::add_error) with the current
    /// effective value and a single message.
    pub fn add_error_message(&self, path: &str, message: impl Into<String>) {
        let value = self.get(path).unwrap_or(Value::Null);
        self.add_error(path, ErrorEntry::message(value, message));
    }

    /// Append messages to the failure at `path`, creating one when absent.
    pub fn push_errors(&self, path: &str, messages: Vec<String>) {
        if messages.is_empty() {
            return;
        }
        let existing = self.root.borrow().error_in(&parse(path));
        let entry = match existing {
            Some(entry) => {
                let mut all = entry.validation.messages();
                all.extend(messages);
                ErrorEntry::new(entry.value, Validation::Messages(all))
            }
            None => {
                let value = self.get(path).unwrap_or(Value::Null);
                ErrorEntry::new(value, Validation::Messages(messages))
            }
        };
        self.add_error(path, entry);
    }

    // ── Transactions ──────────────────────────────────────────────────────

    /// Apply every pending edit to the content, capturing undo state.
    ///
    /// A no-op returning `false` unless the changeset is dirty and valid;
    /// commit is all-or-nothing for object levels.
    pub fn execute(&self) -> bool {
        if !self.is_dirty() || !self.is_valid() {
            return false;
        }
        let changes = self.changes();
        {
            let mut content = self.content.borrow_mut();
            self.root.borrow_mut().execute(&mut content);
        }
        debug!(count = changes.len(), "applied pending changes to content");
        self.notifier.emit(&ChangesetEvent::Execute { changes });
        true
    }

    /// Revert the last [`execute`](Changeset::execute), restoring content to
    /// its exact pre-commit state (keys created by the commit are deleted).
    /// Consumes the undo buffer.
    pub fn unexecute(&self) {
        {
            let mut content = self.content.borrow_mut();
            self.root.borrow_mut().unexecute(&mut content);
        }
        debug!("reverted last commit");
    }

    /// Discard every pending edit and error. Never touches content.
    pub fn rollback(&self) {
        self.root.borrow_mut().rollback();
        debug!("discarded pending state");
        self.notifier.emit(&ChangesetEvent::AfterRollback);
    }

    /// Clear the error and the matching pending edit for `path`, or — with
    /// `None` — for every path currently in error. Valid edits survive.
    pub fn rollback_invalid(&self, path: Option<&str>) {
        match path {
            Some(path) => {
                let steps = parse(path);
                if self.root.borrow().error_in(&steps).is_some() {
                    let mut root = self.root.borrow_mut();
                    root.clear_error_in(&steps);
                    root.clear_change_in(&steps);
                }
            }
            None => {
                let error_paths: Vec<String> = self.errors_map().keys().cloned().collect();
                let mut root = self.root.borrow_mut();
                for path in error_paths {
                    let steps = parse(&path);
                    root.clear_error_in(&steps);
                    root.clear_change_in(&steps);
                }
            }
        }
    }

    /// Clear both the pending edit and the error for exactly `path`,
    /// regardless of validity.
    pub fn rollback_property(&self, path: &str) {
        let steps = parse(path);
        let mut root = self.root.borrow_mut();
        root.clear_change_in(&steps);
        root.clear_error_in(&steps);
    }

    /// Combine two changesets over the same content into a new one; the
    /// second operand wins path collisions. Both operands are unaffected.
    pub fn merge(&self, other: &Changeset) -> Result<Changeset, ChangesetError> {
        if !Rc::ptr_eq(&self.content, &other.content) {
            return Err(ChangesetError::MergeContentMismatch);
        }
        let root = {
            let content = self.content.borrow();
            new_node_ref(NodeKind::for_content(&content))
        };
        let merged = Changeset {
            root,
            content: Rc::clone(&self.content),
            validator: self.validator.clone(),
            validators: self.validators.clone(),
            options: self.options.clone(),
            notifier: Notifier::new(),
            running: RefCell::new(RunningValidations::default()),
        };
        for (path, value) in self.changes_map() {
            merged.set_unvalidated(&path, value);
        }
        for (path, value) in other.changes_map() {
            merged.set_unvalidated(&path, value);
        }
        for (path, entry) in self.errors_map() {
            merged.add_error(&path, entry);
        }
        for (path, entry) in other.errors_map() {
            merged.add_error(&path, entry);
        }
        Ok(merged)
    }

    /// Drop every pending edit (and its undo state) whose dotted path is not
    /// in `allowed`. `None` is a no-op; errors are untouched.
    pub fn cast(&self, allowed: Option<&[&str]>) {
        let Some(allowed) = allowed else { return };
        let allowed: Vec<String> = allowed.iter().map(|s| s.to_string()).collect();
        self.root.borrow_mut().cast("", &allowed);
    }

    /// Flatten the pending state into a serializable [`Snapshot`].
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            changes: self.changes_map(),
            errors: self.errors_map(),
        }
    }

    /// Replace the pending state entirely with a previously-taken snapshot.
    pub fn restore(&self, snapshot: Snapshot) {
        self.root.borrow_mut().rollback();
        for (path, value) in snapshot.changes {
            self.set_unvalidated(&path, value);
        }
        for (path, entry) in snapshot.errors {
            self.add_error(&path, entry);
        }
    }

    /// Commit pending edits and hand the committed content to `delegate`.
    ///
    /// The delegate's error is propagated unmodified and nothing is rolled
    /// back on failure; the undo buffer survives either way, so callers
    /// wanting revert-on-failure call [`unexecute`](Changeset::unexecute) in
    /// their error path. On success the remaining pending state is cleared.
    pub async fn save<F, Fut, T, E>(&self, delegate: F) -> Result<T, E>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute();
        let committed = self.content.borrow().clone();
        let result = delegate(committed).await;
        if result.is_ok() {
            self.root.borrow_mut().clear_pending();
        }
        result
    }

    // ── Events ────────────────────────────────────────────────────────────

    /// Subscribe to a lifecycle channel. Returns the listener id for
    /// [`off`](Changeset::off).
    pub fn on<F>(&self, kind: EventKind, callback: F) -> u64
    where
        F: FnMut(&ChangesetEvent) + 'static,
    {
        self.notifier.on(kind, callback)
    }

    pub fn off(&self, id: u64) -> bool {
        self.notifier.off(id)
    }

    fn is_tracked(&self, path: &str) -> bool {
        let Some(keys) = &self.options.changeset_keys else {
            return true;
        };
        keys.iter().any(|key| {
            key == path
                || path
                    .strip_prefix(key.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
                || key
                    .strip_prefix(path)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

/// Changeset over a plain content value. See [`Changeset::from_value`].
pub fn changeset(content: Value) -> Changeset {
    Changeset::from_value(content)
}
