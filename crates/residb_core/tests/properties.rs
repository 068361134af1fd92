//! Property tests: random workloads checked against a plain model.

use proptest::prelude::*;
use residb_core::{CoreError, RecordId};
use residb_testkit::prelude::*;
use std::collections::BTreeMap;

/// Every username the generators can produce.
fn all_usernames() -> Vec<String> {
    let letters = ['a', 'b', 'c', 'd'];
    let mut names: Vec<String> = letters.iter().map(ToString::to_string).collect();
    for first in letters {
        for second in letters {
            names.push(format!("{first}{second}"));
        }
    }
    names
}

fn ids_of<'a>(users: impl IntoIterator<Item = &'a User>) -> Vec<RecordId> {
    users.into_iter().map(|u| u.id).collect()
}

/// Applies `ops` to a fresh volatile store and to a map model, checking
/// every outcome as it goes. Returns the store, the model and every
/// identity that was ever issued.
fn run_workload(ops: Vec<UserOp>) -> (TestStore, BTreeMap<RecordId, User>, Vec<RecordId>) {
    let test_store = TestStore::volatile();
    let users = test_store.collection::<User>().unwrap();
    let mut model: BTreeMap<RecordId, User> = BTreeMap::new();
    let mut issued: Vec<RecordId> = Vec::new();

    let name_taken = |model: &BTreeMap<RecordId, User>, name: &str, except: RecordId| {
        model.values().any(|u| u.username == name && u.id != except)
    };

    for op in ops {
        match op {
            UserOp::Insert(mut user) => {
                let expect_ok = !name_taken(&model, &user.username, RecordId::UNASSIGNED);
                match users.insert(&mut user) {
                    Ok(id) => {
                        assert!(expect_ok, "duplicate {} was accepted", user.username);
                        assert!(issued.iter().all(|seen| *seen < id));
                        issued.push(id);
                        model.insert(id, user);
                    }
                    Err(e) => {
                        assert!(!expect_ok, "insert of {} failed: {e}", user.username);
                        assert!(e.is_constraint_violation());
                    }
                }
            }
            UserOp::Update(slot, mut user) => {
                if issued.is_empty() {
                    continue;
                }
                user.id = issued[slot % issued.len()];
                let result = users.update(&user);
                if !model.contains_key(&user.id) {
                    assert!(matches!(result, Err(CoreError::NotFound { .. })));
                } else if name_taken(&model, &user.username, user.id) {
                    assert!(result.unwrap_err().is_constraint_violation());
                } else {
                    result.unwrap();
                    model.insert(user.id, user);
                }
            }
            UserOp::Delete(slot) => {
                if issued.is_empty() {
                    continue;
                }
                let id = issued[slot % issued.len()];
                let removed = users.delete(id).unwrap();
                assert_eq!(removed, model.remove(&id).is_some());
            }
        }
    }

    drop(users);
    (test_store, model, issued)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn store_matches_model(ops in user_ops_strategy(60)) {
        let (test_store, model, _) = run_workload(ops);
        let users = test_store.collection::<User>().unwrap();

        let stored = users.all().unwrap();
        let expected: Vec<User> = model.values().cloned().collect();
        prop_assert_eq!(stored, expected);
        prop_assert_eq!(users.count().unwrap(), model.len());
    }

    #[test]
    fn usernames_stay_unique(ops in user_ops_strategy(60)) {
        let (test_store, model, _) = run_workload(ops);
        let users = test_store.collection::<User>().unwrap();

        for user in model.values() {
            let holders = users.find_by("username", user.username.as_str()).unwrap();
            prop_assert_eq!(holders.len(), 1);
            let unique = users.find_unique("username", user.username.as_str()).unwrap();
            prop_assert_eq!(unique.map(|u| u.id), Some(user.id));
        }
    }

    #[test]
    fn indexes_track_live_records(ops in user_ops_strategy(60)) {
        let (test_store, model, issued) = run_workload(ops);
        let users = test_store.collection::<User>().unwrap();

        for user in model.values() {
            let same_age = users.find_by("age", user.age).unwrap();
            prop_assert!(same_age.iter().any(|u| u.id == user.id));
            let in_range = users.find_by_range("age", user.age, user.age).unwrap();
            prop_assert!(in_range.iter().any(|u| u.id == user.id));
            let flagged = users.find_by("active", user.active).unwrap();
            prop_assert!(flagged.iter().any(|u| u.id == user.id));
        }

        for id in issued.iter().filter(|id| !model.contains_key(id)) {
            prop_assert!(!test_store.index_references(USER_TYPE, *id));
            prop_assert_eq!(users.find_by_id(*id).unwrap(), None);
        }
    }

    #[test]
    fn lookups_return_only_current_values(ops in user_ops_strategy(60)) {
        let (test_store, model, _) = run_workload(ops);
        let users = test_store.collection::<User>().unwrap();

        // Exact equality per value: a record must not surface under a value
        // it held before an update.
        for age in 0..40i64 {
            let found = ids_of(&users.find_by("age", age).unwrap());
            let expected = ids_of(model.values().filter(|u| u.age == age));
            prop_assert_eq!(found, expected, "age {}", age);
        }
        for active in [true, false] {
            let found = ids_of(&users.find_by("active", active).unwrap());
            let expected = ids_of(model.values().filter(|u| u.active == active));
            prop_assert_eq!(found, expected);
        }
        for name in all_usernames() {
            let owner = model.values().find(|u| u.username == name).map(|u| u.id);
            let found = ids_of(&users.find_by("username", name.as_str()).unwrap());
            prop_assert_eq!(found, owner.into_iter().collect::<Vec<_>>());
            let unique = users.find_unique("username", name.as_str()).unwrap();
            prop_assert_eq!(unique.map(|u| u.id), owner, "username {}", name);
        }
    }

    #[test]
    fn range_matches_filter(ops in user_ops_strategy(40), lo in 0i64..40, width in 0i64..20) {
        let (test_store, model, _) = run_workload(ops);
        let users = test_store.collection::<User>().unwrap();
        let hi = lo + width;

        let found: Vec<RecordId> = users
            .find_by_range("age", lo, hi)
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        let expected: Vec<RecordId> = model
            .values()
            .filter(|u| (lo..=hi).contains(&u.age))
            .map(|u| u.id)
            .collect();
        prop_assert_eq!(found, expected);
    }
}
