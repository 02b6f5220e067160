use proptest::prelude::*;

use olx_core::{CourseKey, UsageKey, Value};
use olx_field_store::{FieldStore, InheritanceResolver, Provenance, UsageTree};

fn chain(depth: usize) -> (UsageTree, Vec<UsageKey>) {
    let course = CourseKey::new("edX", "Demo", "2014").unwrap();
    let mut keys = vec![course.make_usage_key("course", "2014").unwrap()];
    for level in 1..depth {
        keys.push(course.make_usage_key("vertical", format!("v{}", level)).unwrap());
    }
    keys.push(course.make_usage_key("problem", "leaf").unwrap());

    let mut tree = UsageTree::new();
    let mut parent = tree.insert_root(keys[0].clone()).unwrap();
    for key in &keys[1..] {
        parent = tree.insert_child(parent, key.clone()).unwrap();
    }
    (tree, keys)
}

#[test]
fn test_unset_field_falls_back_to_default() {
    let (tree, keys) = chain(4);
    let store = FieldStore::with_builtin();
    let resolver = InheritanceResolver::new(&store, &tree);
    let leaf = keys.last().unwrap();

    let effective = resolver.resolve(leaf, "showanswer").unwrap();
    assert_eq!(effective.value, Value::from("finished"));
    assert_eq!(effective.provenance, Provenance::Default);
}

proptest! {
    #[test]
    fn nearest_setter_wins(depth in 1usize..8, first in 0usize..8, second in 0usize..8, a in 0i64..100, b in 0i64..100) {
        let (tree, keys) = chain(depth);
        let leaf = keys.last().unwrap().clone();
        let first = first % keys.len();
        let second = second % keys.len();

        let mut store = FieldStore::with_builtin();
        store.set(&keys[first], "max_attempts", Value::from(a)).unwrap();
        store.set(&keys[second], "max_attempts", Value::from(b)).unwrap();

        let nearest = first.max(second);
        let expected = if nearest == second { b } else { a };
        let resolver = InheritanceResolver::new(&store, &tree);
        let effective = resolver.resolve(&leaf, "max_attempts").unwrap();

        prop_assert_eq!(effective.value, Value::from(expected));
        if nearest == keys.len() - 1 {
            prop_assert_eq!(effective.provenance, Provenance::Explicit);
        } else {
            prop_assert_eq!(effective.provenance, Provenance::Inherited(keys[nearest].clone()));
        }
    }
}
