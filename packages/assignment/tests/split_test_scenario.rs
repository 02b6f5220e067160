use collection_literals::btree;
use rand::rngs::StdRng;
use rand::SeedableRng;

use olx_assignment::{
    partition_tag_key, AssignmentKey, AssignmentStore, Group, JsonFileAssignmentStore,
    RecordingEventSink, SplitTestBlock, StoredAssignment, UserPartition, VariantAssignmentService,
    PARTITION_ASSIGNED,
};
use olx_core::{usage_key, CourseKey, UserId, Value};

const CHILD_A: &str = "block-v1:edX+Demo+2014+type@vertical+block@childA";
const CHILD_B: &str = "block-v1:edX+Demo+2014+type@vertical+block@childB";

fn partitions() -> Vec<UserPartition> {
    vec![UserPartition::new(
        0,
        "Experiment",
        vec![Group::new(0, "alpha"), Group::new(1, "beta")],
    )]
}

fn split_test() -> SplitTestBlock {
    SplitTestBlock::from_fields(
        usage_key!("block-v1:edX+Demo+2014+type@split_test+block@exp"),
        &Value::from(0i64),
        &Value::Dict(btree! {
            "0".to_string() => Value::from(CHILD_A),
            "1".to_string() => Value::from(CHILD_B),
        }),
        vec![usage_key!(CHILD_A), usage_key!(CHILD_B)],
    )
    .unwrap()
}

fn tag_key(user: &UserId) -> AssignmentKey {
    let course = CourseKey::new("edX", "Demo", "2014").unwrap();
    AssignmentKey::course_tag(&course, user, partition_tag_key(0))
}

#[test]
fn test_existing_tag_and_stale_tag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("assignments.json");
    let user = UserId::new("learner");

    let mut store = JsonFileAssignmentStore::open(&path).unwrap();
    store
        .upsert(tag_key(&user), StoredAssignment::Tag("1".into()))
        .unwrap();
    let mut service = VariantAssignmentService::new(store, RecordingEventSink::new());
    let mut rng = StdRng::seed_from_u64(2014);

    let child = service
        .split_test_child(&split_test(), &partitions(), &user, &mut rng)
        .unwrap();
    assert_eq!(child, Some(usage_key!(CHILD_B)));
    assert!(service.events().events().is_empty());

    service
        .store_mut()
        .upsert(tag_key(&user), StoredAssignment::Tag("2".into()))
        .unwrap();
    let child = service
        .split_test_child(&split_test(), &partitions(), &user, &mut rng)
        .unwrap()
        .unwrap();
    assert!(child == usage_key!(CHILD_A) || child == usage_key!(CHILD_B));

    let events: Vec<_> = service.events().named(PARTITION_ASSIGNED).collect();
    assert_eq!(events.len(), 1);
    let group_id = events[0].data["group_id"].as_i64().unwrap();
    let expected = if group_id == 0 { CHILD_A } else { CHILD_B };
    assert_eq!(child, usage_key!(expected));

    let reopened = JsonFileAssignmentStore::open(&path).unwrap();
    assert_eq!(
        reopened.get(&tag_key(&user)).unwrap(),
        Some(StoredAssignment::Tag(group_id.to_string()))
    );
}

#[test]
fn test_hundred_lookups_agree() {
    let mut service: VariantAssignmentService = VariantAssignmentService::default();
    let mut rng = StdRng::seed_from_u64(1);
    let block = split_test();

    for user in 0..20 {
        let user = UserId::new(user.to_string());
        let first = service
            .split_test_child(&block, &partitions(), &user, &mut rng)
            .unwrap();
        assert!(first.is_some());
        for _ in 0..100 {
            let again = service
                .split_test_child(&block, &partitions(), &user, &mut rng)
                .unwrap();
            assert_eq!(again, first);
        }
    }
    assert_eq!(service.events().events().len(), 20);
}

#[test]
fn test_groups_shared_across_split_tests() {
    let mut service: VariantAssignmentService = VariantAssignmentService::default();
    let mut rng = StdRng::seed_from_u64(77);
    let user = UserId::new("shared");

    let first = split_test();
    let mut second = split_test();
    second.location = usage_key!("block-v1:edX+Demo+2014+type@split_test+block@exp2");

    let a = service
        .split_test_child(&first, &partitions(), &user, &mut rng)
        .unwrap();
    let b = service
        .split_test_child(&second, &partitions(), &user, &mut rng)
        .unwrap();
    assert_eq!(a, b);
    assert_eq!(service.events().events().len(), 1);
}
