//! Property tests for the transform engine.

use proptest::prelude::*;
use serde_json::{Map, Value};

use bwbridge_common::Error;
use bwbridge_transform::{enclose, transform_keys, Conversion};

/// Documents whose keys are drawn from `a..=m`.
fn document() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::String),
    ];
    let value = leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-m]", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    });
    prop::collection::btree_map("[a-m]", value, 0..6)
        .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>()))
}

proptest! {
    #[test]
    fn rename_of_absent_keys_is_identity(
        doc in document(),
        renames in prop::collection::btree_map("[n-z]", "[a-z]{1,6}", 0..5),
    ) {
        let conversion = renames
            .into_iter()
            .fold(Conversion::new(), |c, (old, new)| c.rename(old, new));
        let mut transformed = doc.clone();
        transform_keys(&mut transformed, &conversion).unwrap();
        prop_assert_eq!(transformed, doc);
    }

    #[test]
    fn rename_there_and_back_restores_document(
        doc in document(),
        from in "[a-m]",
        to in "[n-z]",
    ) {
        let mut transformed = doc.clone();
        transform_keys(&mut transformed, &Conversion::new().rename(from.clone(), to.clone())).unwrap();
        transform_keys(&mut transformed, &Conversion::new().rename(to, from)).unwrap();
        prop_assert_eq!(transformed, doc);
    }

    #[test]
    fn enclose_wraps_map_exactly_once(
        doc in document(),
        key in "[n-z]",
        inner in prop::collection::btree_map("[a-z]", any::<i64>(), 0..4),
    ) {
        let inner: Value = Value::Object(
            inner.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
        );
        let mut doc = doc;
        doc.as_object_mut().unwrap().insert(key.clone(), inner.clone());

        let conversion = Conversion::new().enclose(key.clone());
        let mut enclosed = doc.clone();
        enclose(&mut enclosed, &conversion).unwrap();

        prop_assert_eq!(&enclosed[key.as_str()], &Value::Array(vec![inner]));
        for (k, v) in doc.as_object().unwrap() {
            if *k != key {
                prop_assert_eq!(&enclosed[k.as_str()], v);
            }
        }

        let rejected = matches!(
            enclose(&mut enclosed, &conversion),
            Err(Error::NotEnclosable { .. })
        );
        prop_assert!(rejected);
    }
}
