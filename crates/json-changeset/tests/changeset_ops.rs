use futures::executor::block_on;
use json_changeset::{changeset, Change, ChangesetError, ChangesetEvent, EventKind, Options};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn set_then_get_before_execute() {
    let cs = changeset(json!({"name": "Ivan", "age": 30}));
    block_on(cs.set("name", json!("Micah")));
    assert_eq!(cs.get("name"), Some(json!("Micah")));
    assert_eq!(cs.get("age"), Some(json!(30)));
    assert_eq!(*cs.content().borrow(), json!({"name": "Ivan", "age": 30}));
}

#[test]
fn nested_set_execute_unexecute_roundtrip() {
    let cs = changeset(json!({"user": {"name": "Ivan"}}));
    block_on(cs.set("user.name", json!("Micah")));
    assert_eq!(cs.get("user.name"), Some(json!("Micah")));
    assert_eq!(*cs.content().borrow(), json!({"user": {"name": "Ivan"}}));
    assert!(cs.is_dirty());

    assert!(cs.execute());
    assert_eq!(*cs.content().borrow(), json!({"user": {"name": "Micah"}}));
    assert!(!cs.is_dirty());

    cs.unexecute();
    assert_eq!(*cs.content().borrow(), json!({"user": {"name": "Ivan"}}));
}

#[test]
fn execute_is_noop_when_pristine() {
    let cs = changeset(json!({"a": 1}));
    assert!(!cs.execute());
    assert_eq!(*cs.content().borrow(), json!({"a": 1}));
}

#[test]
fn execute_is_noop_when_invalid() {
    let cs = changeset(json!({"a": 1}));
    block_on(cs.set("a", json!(2)));
    cs.add_error_message("a", "rejected");
    assert!(!cs.execute());
    assert_eq!(*cs.content().borrow(), json!({"a": 1}));
    // the undo buffer stays empty, so unexecute has nothing to revert
    cs.unexecute();
    assert_eq!(*cs.content().borrow(), json!({"a": 1}));
}

#[test]
fn unexecute_deletes_keys_created_by_commit() {
    let cs = changeset(json!({}));
    block_on(cs.set("title", json!("dr")));
    block_on(cs.set("address.city", json!("Kyiv")));
    assert!(cs.execute());
    assert_eq!(
        *cs.content().borrow(),
        json!({"title": "dr", "address": {"city": "Kyiv"}})
    );
    cs.unexecute();
    assert_eq!(*cs.content().borrow(), json!({}));
}

#[test]
fn rollback_always_restores_pristine_valid() {
    let cs = changeset(json!({"name": "Ivan"}));
    block_on(cs.set("name", json!("Micah")));
    cs.add_error_message("name", "nope");
    assert!(cs.is_dirty());
    assert!(cs.is_invalid());

    cs.rollback();
    assert!(cs.is_pristine());
    assert!(cs.is_valid());
    assert_eq!(*cs.content().borrow(), json!({"name": "Ivan"}));
    assert_eq!(cs.get("name"), Some(json!("Ivan")));
}

#[test]
fn dirty_again_after_commit() {
    let cs = changeset(json!({"n": 1}));
    block_on(cs.set("n", json!(2)));
    assert!(cs.execute());
    assert!(cs.is_pristine());
    block_on(cs.set("n", json!(3)));
    assert!(cs.is_dirty());
    assert!(cs.execute());
    assert_eq!(*cs.content().borrow(), json!({"n": 3}));
    // undo only covers the latest commit
    cs.unexecute();
    assert_eq!(*cs.content().borrow(), json!({"n": 2}));
}

#[test]
fn noop_set_keeps_changeset_pristine() {
    let cs = changeset(json!({"name": "Ivan"}));
    block_on(cs.set("name", json!("Ivan")));
    assert!(cs.is_pristine());
    // a real edit then writing the old value back clears the pending change
    block_on(cs.set("name", json!("Micah")));
    block_on(cs.set("name", json!("Ivan")));
    assert!(cs.is_pristine());
}

#[test]
fn whole_object_replacement_commits_and_reverts() {
    let cs = changeset(json!({"user": {"name": "Ivan", "age": 30}}));
    block_on(cs.set("user", json!({"name": "Bo"})));
    assert_eq!(cs.get("user"), Some(json!({"name": "Bo"})));
    assert_eq!(cs.get("user.age"), None);

    assert!(cs.execute());
    assert_eq!(*cs.content().borrow(), json!({"user": {"name": "Bo"}}));
    cs.unexecute();
    assert_eq!(
        *cs.content().borrow(),
        json!({"user": {"name": "Ivan", "age": 30}})
    );
}

#[test]
fn array_element_replacement_rollback_restores_reads() {
    let cs = changeset(json!(["bob@x.com"]));
    block_on(cs.set("0", json!(null)));
    block_on(cs.set("0", json!({"primary": "new@x.com"})));
    assert_eq!(cs.get("0"), Some(json!({"primary": "new@x.com"})));

    cs.rollback();
    assert!(cs.is_pristine());
    assert_eq!(cs.get(""), Some(json!(["bob@x.com"])));
    assert_eq!(*cs.content().borrow(), json!(["bob@x.com"]));
}

#[test]
fn array_bulk_ops_rollback_restores_original() {
    let cs = changeset(json!({"emails": ["a@x.com", "b@x.com"]}));
    let emails = cs.view().at("emails");
    emails.push(json!("c@x.com")).unwrap();
    emails.remove(0).unwrap();
    assert_eq!(cs.get("emails"), Some(json!(["b@x.com", "c@x.com"])));
    assert_eq!(
        cs.change("emails"),
        Some(json!(["b@x.com", "c@x.com"]))
    );

    cs.rollback();
    assert_eq!(cs.get("emails"), Some(json!(["a@x.com", "b@x.com"])));
    assert_eq!(
        *cs.content().borrow(),
        json!({"emails": ["a@x.com", "b@x.com"]})
    );
}

#[test]
fn array_bulk_ops_execute_and_unexecute() {
    let cs = changeset(json!({"emails": ["a@x.com"]}));
    cs.view().at("emails").push(json!("b@x.com")).unwrap();
    assert!(cs.execute());
    assert_eq!(
        *cs.content().borrow(),
        json!({"emails": ["a@x.com", "b@x.com"]})
    );
    cs.unexecute();
    assert_eq!(*cs.content().borrow(), json!({"emails": ["a@x.com"]}));
}

#[test]
fn rollback_property_clears_one_path() {
    let cs = changeset(json!({"a": 1, "b": 2}));
    block_on(cs.set("a", json!(10)));
    block_on(cs.set("b", json!(20)));
    cs.add_error_message("a", "bad");

    cs.rollback_property("a");
    assert_eq!(cs.change("a"), None);
    assert!(cs.error("a").is_none());
    assert_eq!(cs.change("b"), Some(json!(20)));
}

#[test]
fn rollback_invalid_keeps_valid_changes() {
    let cs = changeset(json!({"a": 1, "b": 2, "c": 3}));
    block_on(cs.set("a", json!(10)));
    block_on(cs.set("b", json!(20)));
    block_on(cs.set("c", json!(30)));
    cs.add_error_message("a", "bad");
    cs.add_error_message("c", "bad");

    cs.rollback_invalid(None);
    assert!(cs.is_valid());
    let changes = cs.changes_map();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes.get("b"), Some(&json!(20)));
}

#[test]
fn rollback_invalid_for_one_path_ignores_valid_paths() {
    let cs = changeset(json!({"a": 1, "b": 2}));
    block_on(cs.set("a", json!(10)));
    block_on(cs.set("b", json!(20)));
    cs.add_error_message("b", "bad");

    // "a" has no error, so nothing happens to it
    cs.rollback_invalid(Some("a"));
    assert_eq!(cs.change("a"), Some(json!(10)));

    cs.rollback_invalid(Some("b"));
    assert_eq!(cs.change("b"), None);
    assert!(cs.error("b").is_none());
}

#[test]
fn merge_unions_changes_with_second_winning() {
    let content = Rc::new(RefCell::new(
        json!({"firstName": "x", "lastName": "y", "age": 1}),
    ));
    let a = json_changeset::Changeset::new(Rc::clone(&content));
    let b = json_changeset::Changeset::new(Rc::clone(&content));
    block_on(a.set("firstName", json!("Jim")));
    block_on(a.set("age", json!(10)));
    block_on(b.set("lastName", json!("Bob")));
    block_on(b.set("age", json!(20)));

    let merged = a.merge(&b).unwrap();
    let changes = merged.changes_map();
    assert_eq!(changes.get("firstName"), Some(&json!("Jim")));
    assert_eq!(changes.get("lastName"), Some(&json!("Bob")));
    assert_eq!(changes.get("age"), Some(&json!(20)));

    // operands are unaffected
    assert_eq!(a.changes_map().len(), 2);
    assert_eq!(b.changes_map().len(), 2);
    assert!(a.changes_map().get("lastName").is_none());
}

#[test]
fn merge_rejects_different_content() {
    let a = changeset(json!({"a": 1}));
    let b = changeset(json!({"a": 1}));
    assert!(matches!(
        a.merge(&b),
        Err(ChangesetError::MergeContentMismatch)
    ));
}

#[test]
fn execute_event_carries_flattened_changes() {
    let cs = changeset(json!({"user": {"name": "Ivan"}}));
    let seen: Rc<RefCell<Vec<Vec<Change>>>> = Rc::new(RefCell::new(Vec::new()));
    let seen_cb = Rc::clone(&seen);
    cs.on(EventKind::Execute, move |event| {
        if let ChangesetEvent::Execute { changes } = event {
            seen_cb.borrow_mut().push(changes.clone());
        }
    });

    block_on(cs.set("user.name", json!("Micah")));
    assert!(cs.execute());
    assert!(!cs.execute()); // pristine again: no second event

    let events = seen.borrow();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0],
        vec![Change::new("user.name", json!("Micah"))]
    );
}

#[test]
fn rollback_event_fires() {
    let cs = changeset(json!({"a": 1}));
    let count = Rc::new(RefCell::new(0));
    let count_cb = Rc::clone(&count);
    let id = cs.on(EventKind::AfterRollback, move |_| {
        *count_cb.borrow_mut() += 1;
    });

    cs.rollback();
    assert_eq!(*count.borrow(), 1);
    assert!(cs.off(id));
    cs.rollback();
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn save_commits_and_hands_content_to_delegate() {
    let cs = changeset(json!({"name": "Ivan"}));
    block_on(cs.set("name", json!("Micah")));

    let saved = Rc::new(RefCell::new(None));
    let saved_cb = Rc::clone(&saved);
    let result: Result<(), String> = block_on(cs.save(move |content| {
        *saved_cb.borrow_mut() = Some(content);
        async { Ok(()) }
    }));
    assert!(result.is_ok());
    assert_eq!(*saved.borrow(), Some(json!({"name": "Micah"})));
    assert_eq!(*cs.content().borrow(), json!({"name": "Micah"}));
    assert!(cs.is_pristine());
    // undo survives a successful save
    cs.unexecute();
    assert_eq!(*cs.content().borrow(), json!({"name": "Ivan"}));
}

#[test]
fn save_failure_propagates_without_rollback() {
    let cs = changeset(json!({"name": "Ivan"}));
    block_on(cs.set("name", json!("Micah")));

    let result: Result<(), String> =
        block_on(cs.save(|_| async { Err("boom".to_string()) }));
    assert_eq!(result, Err("boom".to_string()));
    // the commit stays applied; reverting is the caller's decision
    assert_eq!(*cs.content().borrow(), json!({"name": "Micah"}));
    cs.unexecute();
    assert_eq!(*cs.content().borrow(), json!({"name": "Ivan"}));
}

#[test]
fn changeset_keys_ignore_untracked_writes() {
    let cs = changeset(json!({"name": "Ivan", "role": "admin"})).with_options(Options {
        changeset_keys: Some(vec!["name".into()]),
        ..Options::default()
    });
    block_on(cs.set("role", json!("root")));
    assert!(cs.is_pristine());
    assert_eq!(cs.get("role"), Some(json!("admin")));
    block_on(cs.set("name", json!("Micah")));
    assert!(cs.is_dirty());
}

#[test]
fn skip_validate_bypasses_pipeline() {
    let cs = changeset(json!({"name": "Ivan"}))
        .with_validator(|_| json_changeset::ValidatorResult::invalid("always"))
        .with_options(Options {
            skip_validate: true,
            ..Options::default()
        });
    block_on(cs.set("name", json!("x")));
    assert!(cs.is_valid());
}
