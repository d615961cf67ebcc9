//! Validator contract and validation plumbing.
//!
//! A validator is a plain function of the edit being validated; it may answer
//! synchronously or hand back a future. Overlapping async validations are
//! serialized through [`RunningValidations`]: a new validation snapshots the
//! completion signals of everything already in flight and awaits them before
//! applying its own result, so an older validation cannot clobber a newer
//! value's error state out of order.

use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{LocalBoxFuture, Shared};
use futures::FutureExt;
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::Validation;

/// Normalized outcome of running one or more validators for a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Valid,
    Invalid(Validation),
}

impl Verdict {
    pub fn from_bool(valid: bool) -> Self {
        if valid {
            Verdict::Valid
        } else {
            Verdict::Invalid(Validation::Flag(false))
        }
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        Verdict::Invalid(Validation::Message(message.into()))
    }

    /// An empty message list is a pass.
    pub fn from_messages(messages: Vec<String>) -> Self {
        if messages.is_empty() {
            Verdict::Valid
        } else {
            Verdict::Invalid(Validation::Messages(messages))
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    /// Fold multiple verdicts for one path: every validator must pass, and
    /// failure messages aggregate in order.
    pub(crate) fn combine(verdicts: Vec<Verdict>) -> Verdict {
        let mut failed = false;
        let mut messages = Vec::new();
        for verdict in verdicts {
            if let Verdict::Invalid(validation) = verdict {
                failed = true;
                messages.extend(validation.messages());
            }
        }
        if !failed {
            return Verdict::Valid;
        }
        match messages.len() {
            0 => Verdict::Invalid(Validation::Flag(false)),
            1 => {
                let message = messages.remove(0);
                Verdict::Invalid(Validation::Message(message))
            }
            _ => Verdict::Invalid(Validation::Messages(messages)),
        }
    }
}

/// What a validator hands back: an immediate verdict or a deferred one.
pub enum ValidatorResult {
    Sync(Verdict),
    Future(LocalBoxFuture<'static, Verdict>),
}

impl ValidatorResult {
    pub fn valid() -> Self {
        ValidatorResult::Sync(Verdict::Valid)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ValidatorResult::Sync(Verdict::from_message(message))
    }
}

impl From<Verdict> for ValidatorResult {
    fn from(verdict: Verdict) -> Self {
        ValidatorResult::Sync(verdict)
    }
}

impl From<bool> for ValidatorResult {
    fn from(valid: bool) -> Self {
        ValidatorResult::Sync(Verdict::from_bool(valid))
    }
}

/// Arguments handed to a validator. All fields borrow from the changeset for
/// the duration of the call; a validator returning a future must clone what
/// it needs into that future.
#[derive(Clone, Copy)]
pub struct ValidationArgs<'a> {
    /// Dotted path of the field being validated.
    pub path: &'a str,
    /// The pending value under validation.
    pub new_value: &'a Value,
    /// The committed value currently in content, when present.
    pub old_value: Option<&'a Value>,
    /// Flattened view of every pending change.
    pub changes: &'a IndexMap<String, Value>,
    /// The content being edited.
    pub content: &'a Value,
}

pub type Validator = Rc<dyn Fn(ValidationArgs<'_>) -> ValidatorResult>;

/// Wrap a closure as a [`Validator`].
pub fn validator<F>(f: F) -> Validator
where
    F: Fn(ValidationArgs<'_>) -> ValidatorResult + 'static,
{
    Rc::new(f)
}

/// Per-key validator configuration, nesting along the content's shape.
#[derive(Clone)]
pub enum ValidatorSpec {
    One(Validator),
    /// All must pass; failure messages aggregate.
    Many(Vec<Validator>),
    Nested(ValidatorMap),
}

impl From<Validator> for ValidatorSpec {
    fn from(validator: Validator) -> Self {
        ValidatorSpec::One(validator)
    }
}

impl From<Vec<Validator>> for ValidatorSpec {
    fn from(validators: Vec<Validator>) -> Self {
        ValidatorSpec::Many(validators)
    }
}

impl From<ValidatorMap> for ValidatorSpec {
    fn from(map: ValidatorMap) -> Self {
        ValidatorSpec::Nested(map)
    }
}

#[derive(Clone, Default)]
pub struct ValidatorMap {
    entries: IndexMap<String, ValidatorSpec>,
}

impl ValidatorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, spec: impl Into<ValidatorSpec>) {
        self.entries.insert(key.into(), spec.into());
    }

    /// Builder-style [`insert`](ValidatorMap::insert).
    pub fn with(mut self, key: impl Into<String>, spec: impl Into<ValidatorSpec>) -> Self {
        self.insert(key, spec);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, path: &str) -> Option<&ValidatorSpec> {
        let (head, rest) = dot_path::split_first(path);
        let spec = self.entries.get(head)?;
        match (spec, rest) {
            (ValidatorSpec::Nested(map), Some(rest)) => map.lookup(rest),
            (_, None) => Some(spec),
            _ => None,
        }
    }

    /// The validators configured for exactly `path`, if any.
    pub fn validators_for(&self, path: &str) -> Option<Vec<Validator>> {
        match self.lookup(path)? {
            ValidatorSpec::One(v) => Some(vec![Rc::clone(v)]),
            ValidatorSpec::Many(vs) => Some(vs.iter().map(Rc::clone).collect()),
            ValidatorSpec::Nested(_) => None,
        }
    }

    /// Every dotted leaf path this configuration covers.
    pub fn flatten(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.flatten_into("", &mut out);
        out
    }

    fn flatten_into(&self, prefix: &str, out: &mut Vec<String>) {
        for (key, spec) in &self.entries {
            let path = dot_path::join(prefix, key);
            match spec {
                ValidatorSpec::Nested(map) => map.flatten_into(&path, out),
                _ => out.push(path),
            }
        }
    }
}

/// Invoke every validator for a path now, deferring only the futures.
///
/// All-sync input yields a sync combined verdict; otherwise the combined
/// verdict resolves once each deferred validator has answered.
pub(crate) fn run_all(validators: &[Validator], args: ValidationArgs<'_>) -> ValidatorResult {
    let mut sync = Vec::new();
    let mut deferred = Vec::new();
    for validator in validators {
        match validator(args) {
            ValidatorResult::Sync(verdict) => sync.push(verdict),
            ValidatorResult::Future(fut) => deferred.push(fut),
        }
    }
    if deferred.is_empty() {
        return ValidatorResult::Sync(Verdict::combine(sync));
    }
    ValidatorResult::Future(Box::pin(async move {
        let mut verdicts = sync;
        for fut in deferred {
            verdicts.push(fut.await);
        }
        Verdict::combine(verdicts)
    }))
}

pub(crate) type DoneSignal = Shared<oneshot::Receiver<()>>;

struct InFlight {
    seq: u64,
    path: String,
    done: DoneSignal,
}

/// Registry of async validations currently in flight.
#[derive(Default)]
pub(crate) struct RunningValidations {
    next_seq: u64,
    entries: Vec<InFlight>,
}

impl RunningValidations {
    /// Register a new in-flight validation. Returns its sequence number, the
    /// sender used to signal completion, and the completion signals of every
    /// validation that was already in flight at registration time.
    pub(crate) fn register(&mut self, path: &str) -> (u64, oneshot::Sender<()>, Vec<DoneSignal>) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        let waiters = self.entries.iter().map(|e| e.done.clone()).collect();
        let (tx, rx) = oneshot::channel();
        self.entries.push(InFlight {
            seq,
            path: path.to_string(),
            done: rx.shared(),
        });
        (seq, tx, waiters)
    }

    pub(crate) fn settle(&mut self, seq: u64) {
        self.entries.retain(|e| e.seq != seq);
    }

    pub(crate) fn is_validating(&self, path: Option<&str>) -> bool {
        match path {
            Some(path) => self.entries.iter().any(|e| e.path == path),
            None => !self.entries.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args<'a>(
        path: &'a str,
        new_value: &'a Value,
        changes: &'a IndexMap<String, Value>,
        content: &'a Value,
    ) -> ValidationArgs<'a> {
        ValidationArgs {
            path,
            new_value,
            old_value: None,
            changes,
            content,
        }
    }

    #[test]
    fn combine_all_valid() {
        assert_eq!(
            Verdict::combine(vec![Verdict::Valid, Verdict::Valid]),
            Verdict::Valid
        );
        assert_eq!(Verdict::combine(vec![]), Verdict::Valid);
    }

    #[test]
    fn combine_keeps_single_message() {
        let combined = Verdict::combine(vec![Verdict::Valid, Verdict::from_message("bad")]);
        assert_eq!(combined, Verdict::Invalid(Validation::Message("bad".into())));
    }

    #[test]
    fn combine_aggregates_messages() {
        let combined = Verdict::combine(vec![
            Verdict::from_message("a"),
            Verdict::from_messages(vec!["b".into(), "c".into()]),
        ]);
        assert_eq!(
            combined,
            Verdict::Invalid(Validation::Messages(vec![
                "a".into(),
                "b".into(),
                "c".into()
            ]))
        );
    }

    #[test]
    fn combine_flag_only_failures() {
        let combined = Verdict::combine(vec![Verdict::from_bool(false), Verdict::Valid]);
        assert_eq!(combined, Verdict::Invalid(Validation::Flag(false)));
    }

    #[test]
    fn empty_message_list_is_a_pass() {
        assert_eq!(Verdict::from_messages(vec![]), Verdict::Valid);
    }

    #[test]
    fn map_lookup_walks_nesting() {
        let map = ValidatorMap::new().with(
            "user",
            ValidatorMap::new().with("name", validator(|_| ValidatorResult::valid())),
        );
        assert!(map.validators_for("user.name").is_some());
        assert!(map.validators_for("user.age").is_none());
        assert!(map.validators_for("user").is_none());
        assert!(map.validators_for("other").is_none());
    }

    #[test]
    fn map_flatten_lists_leaf_paths() {
        let map = ValidatorMap::new()
            .with("title", validator(|_| ValidatorResult::valid()))
            .with(
                "user",
                ValidatorMap::new()
                    .with("name", validator(|_| ValidatorResult::valid()))
                    .with(
                        "email",
                        vec![
                            validator(|_| ValidatorResult::valid()),
                            validator(|_| ValidatorResult::valid()),
                        ],
                    ),
            );
        assert_eq!(map.flatten(), vec!["title", "user.name", "user.email"]);
    }

    #[test]
    fn run_all_sync_combines() {
        let validators = vec![
            validator(|_| ValidatorResult::valid()),
            validator(|args| {
                if args.new_value.as_str().is_some_and(|s| s.len() >= 4) {
                    ValidatorResult::valid()
                } else {
                    ValidatorResult::invalid("too short")
                }
            }),
        ];
        let value = json!("Al");
        let changes = IndexMap::new();
        let content = json!({});
        match run_all(&validators, args("name", &value, &changes, &content)) {
            ValidatorResult::Sync(verdict) => {
                assert_eq!(verdict, Verdict::Invalid(Validation::Message("too short".into())));
            }
            ValidatorResult::Future(_) => panic!("expected sync verdict"),
        }
    }

    #[test]
    fn run_all_defers_when_any_validator_does() {
        let validators = vec![
            validator(|_| ValidatorResult::valid()),
            validator(|_| {
                ValidatorResult::Future(Box::pin(async { Verdict::from_message("nope") }))
            }),
        ];
        let value = json!("x");
        let changes = IndexMap::new();
        let content = json!({});
        match run_all(&validators, args("k", &value, &changes, &content)) {
            ValidatorResult::Sync(_) => panic!("expected deferred verdict"),
            ValidatorResult::Future(fut) => {
                let verdict = futures::executor::block_on(fut);
                assert_eq!(verdict, Verdict::Invalid(Validation::Message("nope".into())));
            }
        }
    }

    #[test]
    fn running_registry_tracks_in_flight() {
        let mut running = RunningValidations::default();
        assert!(!running.is_validating(None));

        let (seq_a, _tx_a, waiters_a) = running.register("a");
        assert!(waiters_a.is_empty());
        assert!(running.is_validating(None));
        assert!(running.is_validating(Some("a")));
        assert!(!running.is_validating(Some("b")));

        let (seq_b, _tx_b, waiters_b) = running.register("b");
        assert_eq!(waiters_b.len(), 1);

        running.settle(seq_a);
        assert!(!running.is_validating(Some("a")));
        running.settle(seq_b);
        assert!(!running.is_validating(None));
    }
}
