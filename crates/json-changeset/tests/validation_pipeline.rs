use std::cell::RefCell;
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::executor::block_on;
use futures::task::noop_waker;
use json_changeset::{
    changeset, ChangesetEvent, ErrorEntry, EventKind, Validation, ValidatorMap, ValidatorResult,
    Verdict,
};
use serde_json::json;

fn length_validator(min: usize) -> impl Fn(json_changeset::ValidationArgs<'_>) -> ValidatorResult {
    move |args| {
        if args.new_value.as_str().is_some_and(|s| s.len() >= min) {
            ValidatorResult::valid()
        } else {
            ValidatorResult::invalid("too short")
        }
    }
}

#[test]
fn sync_validator_sets_and_clears_errors() {
    let cs = changeset(json!({"name": "Ivan"})).with_validator(length_validator(4));

    block_on(cs.set("name", json!("Al")));
    assert!(cs.is_invalid());
    assert_eq!(
        cs.errors(),
        vec![(
            "name".to_string(),
            ErrorEntry::message(json!("Al"), "too short")
        )]
    );

    block_on(cs.set("name", json!("Albert")));
    assert!(cs.is_valid());
    assert!(cs.errors().is_empty());
}

#[test]
fn invalid_paths_block_commit_until_fixed() {
    let cs = changeset(json!({"name": "Ivan"})).with_validator(length_validator(4));
    block_on(cs.set("name", json!("Al")));
    assert!(!cs.execute());
    assert_eq!(*cs.content().borrow(), json!({"name": "Ivan"}));

    block_on(cs.set("name", json!("Albert")));
    assert!(cs.execute());
    assert_eq!(*cs.content().borrow(), json!({"name": "Albert"}));
}

#[test]
fn validator_map_applies_per_path() {
    let map = ValidatorMap::new().with(
        "user",
        ValidatorMap::new().with("name", json_changeset::validator(length_validator(4))),
    );
    let cs = changeset(json!({"user": {"name": "Ivan", "age": 30}})).with_validators(map);

    block_on(cs.set("user.name", json!("Al")));
    assert!(cs.is_invalid());
    assert_eq!(
        cs.error("user.name"),
        Some(ErrorEntry::message(json!("Al"), "too short"))
    );

    // a path without a configured validator passes
    block_on(cs.set("user.age", json!(31)));
    assert_eq!(cs.errors().len(), 1);
}

#[test]
fn multiple_validators_per_path_aggregate_messages() {
    let map = ValidatorMap::new().with(
        "name",
        vec![
            json_changeset::validator(|args: json_changeset::ValidationArgs<'_>| {
                if args.new_value.as_str().is_some_and(|s| !s.is_empty()) {
                    ValidatorResult::valid()
                } else {
                    ValidatorResult::invalid("required")
                }
            }),
            json_changeset::validator(length_validator(4)),
        ],
    );
    let cs = changeset(json!({"name": "Ivan"})).with_validators(map);

    block_on(cs.set("name", json!("")));
    assert_eq!(
        cs.error("name").unwrap().validation,
        Validation::Messages(vec!["required".into(), "too short".into()])
    );
}

#[test]
fn bulk_validate_covers_configured_paths() {
    let map = ValidatorMap::new()
        .with("name", json_changeset::validator(length_validator(4)))
        .with("title", json_changeset::validator(length_validator(2)));
    // both committed values are already invalid
    let cs = changeset(json!({"name": "Al", "title": "x"})).with_validators(map);
    assert!(cs.is_valid());

    block_on(cs.validate(&[]));
    assert_eq!(cs.errors().len(), 2);

    block_on(cs.set("name", json!("Albert")));
    block_on(cs.validate(&["title"]));
    assert_eq!(cs.errors().len(), 1);
    assert!(cs.error("title").is_some());
}

#[test]
fn validation_events_fire_in_pairs() {
    let cs = changeset(json!({"name": "Ivan"})).with_validator(length_validator(4));
    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    let log_before = Rc::clone(&log);
    cs.on(EventKind::BeforeValidation, move |event| {
        if let ChangesetEvent::BeforeValidation { path } = event {
            log_before.borrow_mut().push(format!("before:{path}"));
        }
    });
    let log_after = Rc::clone(&log);
    cs.on(EventKind::AfterValidation, move |event| {
        if let ChangesetEvent::AfterValidation { path, valid } = event {
            log_after.borrow_mut().push(format!("after:{path}:{valid}"));
        }
    });

    block_on(cs.set("name", json!("Al")));
    block_on(cs.set("name", json!("Albert")));
    assert_eq!(
        *log.borrow(),
        vec![
            "before:name".to_string(),
            "after:name:false".to_string(),
            "before:name".to_string(),
            "after:name:true".to_string(),
        ]
    );
}

#[test]
fn async_validator_applies_after_resolution() {
    let (tx, rx) = oneshot::channel::<Verdict>();
    let rx = Rc::new(RefCell::new(Some(rx)));
    let cs = changeset(json!({"name": "Ivan"})).with_validator(move |_| {
        let rx = Rc::clone(&rx);
        ValidatorResult::Future(Box::pin(async move {
            let receiver = rx.borrow_mut().take();
            match receiver {
                Some(receiver) => receiver.await.unwrap_or(Verdict::Valid),
                None => Verdict::Valid,
            }
        }))
    });

    let waker = noop_waker();
    let mut context = Context::from_waker(&waker);
    let mut setting = pin!(cs.set("name", json!("Al")));

    // pending until the validator resolves; the write is already staged
    assert!(setting.as_mut().poll(&mut context).is_pending());
    assert_eq!(cs.get("name"), Some(json!("Al")));
    assert!(cs.is_validating(None));
    assert!(cs.is_validating(Some("name")));
    assert!(cs.is_valid());

    tx.send(Verdict::from_message("taken")).unwrap();
    block_on(setting);
    assert!(!cs.is_validating(None));
    assert_eq!(
        cs.error("name"),
        Some(ErrorEntry::message(json!("Al"), "taken"))
    );
}

#[test]
fn overlapping_async_validations_apply_in_registration_order() {
    // the first validation's future resolves only after being signaled; the
    // second is ready immediately but must wait for the first to settle
    let trigger: Rc<RefCell<Option<oneshot::Receiver<()>>>> = Rc::new(RefCell::new(None));
    let trigger_src = Rc::clone(&trigger);
    let cs = changeset(json!({"a": 1, "b": 2})).with_validator(move |args| {
        if args.path == "a" {
            let gate = trigger_src.borrow_mut().take();
            ValidatorResult::Future(Box::pin(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Verdict::from_message("a is bad")
            }))
        } else {
            ValidatorResult::Future(Box::pin(async { Verdict::from_message("b is bad") }))
        }
    });

    let (tx, rx) = oneshot::channel::<()>();
    *trigger.borrow_mut() = Some(rx);

    let order: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let order_cb = Rc::clone(&order);
    cs.on(EventKind::AfterValidation, move |event| {
        if let ChangesetEvent::AfterValidation { path, .. } = event {
            order_cb.borrow_mut().push(path.clone());
        }
    });

    block_on(async {
        let set_a = cs.set("a", json!(10));
        let set_b = cs.set("b", json!(20));
        let release = async {
            // runs after both validations registered on the first poll pass
            let _ = tx.send(());
        };
        futures::join!(set_a, set_b, release);
    });

    // "b" resolved first but applied only after "a" settled
    assert_eq!(*order.borrow(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(cs.errors().len(), 2);
}

#[test]
fn sync_validation_needs_no_executor_progress() {
    let cs = changeset(json!({"name": "Ivan"})).with_validator(length_validator(4));
    let waker = noop_waker();
    let mut context = Context::from_waker(&waker);
    let mut setting = pin!(cs.set("name", json!("Al")));
    // a sync verdict completes on the first poll
    assert!(matches!(
        setting.as_mut().poll(&mut context),
        Poll::Ready(())
    ));
    assert!(cs.is_invalid());
}

#[test]
fn flag_failures_surface_without_messages() {
    let cs =
        changeset(json!({"n": 1})).with_validator(|_| ValidatorResult::Sync(Verdict::from_bool(false)));
    block_on(cs.set("n", json!(2)));
    assert_eq!(
        cs.error("n"),
        Some(ErrorEntry::new(json!(2), Validation::Flag(false)))
    );
}

#[test]
fn mixed_sync_and_async_validators_combine() {
    let map = ValidatorMap::new().with(
        "name",
        vec![
            json_changeset::validator(|_| ValidatorResult::invalid("sync says no")),
            json_changeset::validator(|_| {
                ValidatorResult::Future(Box::pin(async { Verdict::from_message("async says no") }))
            }),
        ],
    );
    let cs = changeset(json!({"name": "Ivan"})).with_validators(map);
    block_on(cs.set("name", json!("x")));
    assert_eq!(
        cs.error("name").unwrap().validation,
        Validation::Messages(vec!["sync says no".into(), "async says no".into()])
    );
}

#[test]
fn revalidation_clears_stale_errors() {
    let accept = Rc::new(RefCell::new(false));
    let accept_src = Rc::clone(&accept);
    let cs = changeset(json!({"name": "Ivan"})).with_validator(move |_| {
        if *accept_src.borrow() {
            ValidatorResult::valid()
        } else {
            ValidatorResult::invalid("rejected")
        }
    });

    block_on(cs.set("name", json!("Al")));
    assert!(cs.is_invalid());

    *accept.borrow_mut() = true;
    block_on(cs.validate(&["name"]));
    assert!(cs.is_valid());
}
