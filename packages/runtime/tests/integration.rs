use olx_assignment::PARTITION_ASSIGNED;
use olx_codec::{LocalDiskFs, ResourceFs};
use olx_core::{usage_key, CourseKey, UserId};
use olx_runtime::{AssignmentStoreConfig, Runtime, RuntimeConfig};

const SPLIT_TEST: &str = "block-v1:edX+Demo+2014+type@split_test+block@exp";

fn write_course(fs: &mut LocalDiskFs) {
    fs.write(
        "course.xml",
        r#"<course url_name="2014" org="edX" course="Demo"/>"#,
    )
    .unwrap();
    fs.write(
        "course/2014.xml",
        r#"<course display_name="Demo">
             <chapter url_name="week1">
               <split_test url_name="exp" user_partition_id="0"
                           group_id_to_child='{"0": "block-v1:edX+Demo+2014+type@html+block@a", "1": "block-v1:edX+Demo+2014+type@html+block@b"}'>
                 <html url_name="a">Variant A</html>
                 <html url_name="b">Variant B</html>
               </split_test>
             </chapter>
           </course>"#,
    )
    .unwrap();
    fs.write(
        "policies/2014/policy.json",
        r#"{
            "course/2014": {
                "user_partitions": [{
                    "id": 0,
                    "name": "Experiment",
                    "description": "A/B",
                    "groups": [{"id": 0, "name": "alpha"}, {"id": 1, "name": "beta"}],
                    "scheme": "random",
                    "active": true
                }]
            }
        }"#,
    )
    .unwrap();
}

#[test]
fn test_split_test_assignment_persists_across_loads() {
    let course_dir = tempfile::tempdir().unwrap();
    let state_dir = tempfile::tempdir().unwrap();
    let mut fs = LocalDiskFs::new(course_dir.path()).unwrap();
    write_course(&mut fs);

    let config = RuntimeConfig {
        assignments: AssignmentStoreConfig::Local {
            path: state_dir
                .path()
                .join("assignments.json")
                .to_string_lossy()
                .into_owned(),
        },
        ..RuntimeConfig::default()
    };
    let key = CourseKey::new("edX", "Demo", "2014").unwrap();
    let split_test = usage_key!(SPLIT_TEST);

    let mut first = Runtime::load(config.clone(), &fs, &key, UserId::new("learner")).unwrap();
    assert_eq!(first.user_partitions(&split_test).unwrap().len(), 1);
    let shown = first.visible_children(&split_test).unwrap();
    assert_eq!(shown.len(), 1);

    let assignments = first.into_assignments();
    let events: Vec<_> = assignments.events().named(PARTITION_ASSIGNED).collect();
    assert_eq!(events.len(), 1);
    let expected = match events[0].data["group_id"].as_i64().unwrap() {
        0 => usage_key!("block-v1:edX+Demo+2014+type@html+block@a"),
        _ => usage_key!("block-v1:edX+Demo+2014+type@html+block@b"),
    };
    assert_eq!(shown, vec![expected]);

    let mut second = Runtime::load(config, &fs, &key, UserId::new("learner")).unwrap();
    assert_eq!(second.visible_children(&split_test).unwrap(), shown);
    assert!(second.assignments().events().events().is_empty());
}

#[test]
fn test_course_without_partitions_shows_nothing() {
    let course_dir = tempfile::tempdir().unwrap();
    let mut fs = LocalDiskFs::new(course_dir.path()).unwrap();
    write_course(&mut fs);
    fs.write("policies/2014/policy.json", "{}").unwrap();

    let key = CourseKey::new("edX", "Demo", "2014").unwrap();
    let mut runtime =
        Runtime::load(RuntimeConfig::default(), &fs, &key, UserId::new("learner")).unwrap();
    assert!(runtime
        .visible_children(&usage_key!(SPLIT_TEST))
        .unwrap()
        .is_empty());
}
