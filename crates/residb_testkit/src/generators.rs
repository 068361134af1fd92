//! Property-based test generators using proptest.

use crate::fixtures::User;
use proptest::prelude::*;
use residb_codec::Value;

/// Usernames drawn from a small alphabet so that collisions are common.
pub fn username_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-d]{1,2}").expect("Invalid regex")
}

/// Ages in a narrow band, for frequent range hits.
pub fn age_strategy() -> impl Strategy<Value = i64> {
    0i64..40
}

/// Unassigned [`User`] entities.
pub fn user_strategy() -> impl Strategy<Value = User> {
    (username_strategy(), age_strategy(), any::<bool>()).prop_map(|(name, age, active)| {
        let mut user = User::new(&name, age);
        user.active = active;
        user
    })
}

/// Scalar values of every kind except timestamps.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
    ]
}

/// One step of a random workload against the `User` type.
///
/// Slots refer to positions in the list of identities the test has seen
/// inserted; they are taken modulo its length.
#[derive(Debug, Clone)]
pub enum UserOp {
    /// Insert a new user.
    Insert(User),
    /// Replace the user in a slot with new values.
    Update(usize, User),
    /// Delete the user in a slot.
    Delete(usize),
}

/// Random insert/update/delete sequences, insert-heavy.
pub fn user_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<UserOp>> {
    let op = prop_oneof![
        3 => user_strategy().prop_map(UserOp::Insert),
        2 => (any::<usize>(), user_strategy()).prop_map(|(slot, user)| UserOp::Update(slot, user)),
        1 => any::<usize>().prop_map(UserOp::Delete),
    ];
    prop::collection::vec(op, 1..max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn usernames_are_short() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let name = username_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            assert!((1..=2).contains(&name.len()));
        }
    }

    proptest! {
        #[test]
        fn ops_are_never_empty(ops in user_ops_strategy(20)) {
            prop_assert!(!ops.is_empty());
        }
    }
}
