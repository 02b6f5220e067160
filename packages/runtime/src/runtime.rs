//! A course seen by one learner.

use std::collections::BTreeMap;

use olx_assignment::{
    AssignmentStore, EventSink, LibraryChild, LibraryContentBlock, RecordingEventSink,
    SplitTestBlock, UserPartition, VariantAssignmentService, MODE_RANDOM,
};
use olx_codec::{ImportedCourse, ResourceFs};
use olx_core::{CourseKey, FieldType, UsageKey, UserId, Value};
use olx_field_store::{EffectiveValue, InheritanceResolver};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};

/// Request-scoped view of a course for one learner.
///
/// Holds the imported course, the learner, and the assignment service used
/// to pick dynamic children. Nothing here is shared between learners.
pub struct Runtime<S = Box<dyn AssignmentStore>, E = RecordingEventSink> {
    config: RuntimeConfig,
    course: ImportedCourse,
    user: UserId,
    assignments: VariantAssignmentService<S, E>,
    rng: StdRng,
}

impl Runtime {
    /// Import a course and open the configured assignment store.
    pub fn load(
        config: RuntimeConfig,
        fs: &dyn ResourceFs,
        course_key: &CourseKey,
        user: UserId,
    ) -> Result<Runtime> {
        let course = config.codec().import_course(fs, course_key)?;
        let store = config.open_assignment_store()?;
        let assignments = VariantAssignmentService::new(store, RecordingEventSink::new());
        Ok(Runtime::new(config, course, user, assignments))
    }
}

impl<S: AssignmentStore, E: EventSink> Runtime<S, E> {
    /// Randomness is seeded from the learner's configured seed, if any.
    pub fn new(
        config: RuntimeConfig,
        course: ImportedCourse,
        user: UserId,
        assignments: VariantAssignmentService<S, E>,
    ) -> Self {
        let rng = match config.seed_for(&user) {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Runtime {
            config,
            course,
            user,
            assignments,
            rng,
        }
    }

    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn course(&self) -> &ImportedCourse {
        &self.course
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn assignments(&self) -> &VariantAssignmentService<S, E> {
        &self.assignments
    }

    pub fn into_assignments(self) -> VariantAssignmentService<S, E> {
        self.assignments
    }

    /// The effective value of a field, with where it came from.
    pub fn effective_value(&self, usage: &UsageKey, field: &str) -> Result<EffectiveValue> {
        self.known(usage)?;
        let resolver = InheritanceResolver::new(&self.course.store, &self.course.tree);
        Ok(resolver.resolve(usage, field)?)
    }

    /// Effective values of every Settings field of a usage.
    pub fn effective_settings(&self, usage: &UsageKey) -> Result<BTreeMap<String, EffectiveValue>> {
        self.known(usage)?;
        let resolver = InheritanceResolver::new(&self.course.store, &self.course.tree);
        Ok(resolver.resolve_all(usage)?)
    }

    /// Partitions in effect at a usage.
    pub fn user_partitions(&self, usage: &UsageKey) -> Result<Vec<UserPartition>> {
        let value = self.effective_value(usage, "user_partitions")?.value;
        Ok(UserPartition::list_from_value(&value)?)
    }

    /// The children of a usage the learner sees.
    ///
    /// Split tests, randomized blocks and library content pick children
    /// through the assignment service and record the result in the
    /// learner's field state; every other block shows all of its children.
    pub fn visible_children(&mut self, usage: &UsageKey) -> Result<Vec<UsageKey>> {
        self.known(usage)?;
        let children = self.course.tree.child_usages(usage);
        match usage.block_type.as_str() {
            "split_test" => self.split_test_children(usage, children),
            "randomize" => self.randomize_children(usage, children),
            "library_content" => self.library_children(usage),
            _ => Ok(children),
        }
    }

    fn split_test_children(&mut self, usage: &UsageKey, children: Vec<UsageKey>) -> Result<Vec<UsageKey>> {
        let store = &self.course.store;
        let block = SplitTestBlock::from_fields(
            usage.clone(),
            &store.get(usage, "user_partition_id")?.value,
            &store.get(usage, "group_id_to_child")?.value,
            children,
        )?;
        let partitions = self.user_partitions(usage)?;
        let child = self
            .assignments
            .split_test_child(&block, &partitions, &self.user, &mut self.rng)?;
        Ok(child.into_iter().collect())
    }

    fn randomize_children(&mut self, usage: &UsageKey, children: Vec<UsageKey>) -> Result<Vec<UsageKey>> {
        let seed = self.config.seed_for(&self.user);
        let child = self
            .assignments
            .randomize_child(usage, &children, &self.user, seed, &mut self.rng)?;
        if let Some(index) = child
            .as_ref()
            .and_then(|child| children.iter().position(|c| c == child))
        {
            self.course
                .store
                .set_for_user(usage, "choice", &self.user, Value::from(index as i64))?;
        }
        Ok(child.into_iter().collect())
    }

    fn library_children(&mut self, usage: &UsageKey) -> Result<Vec<UsageKey>> {
        let store = &self.course.store;
        let tree = &self.course.tree;

        let max_count = FieldType::Integer
            .coerce(&store.get(usage, "max_count")?.value)
            .and_then(|value| value.as_i64())
            .unwrap_or(self.config.library_content_default_max_count);
        let mode = store
            .get(usage, "mode")?
            .value
            .as_str()
            .unwrap_or(MODE_RANDOM)
            .to_string();

        let children = tree
            .get(usage)
            .map(|node| tree.children(node).to_vec())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|child| {
                let mut library_child = LibraryChild::new(tree.usage(child)?.clone());
                library_child.descendants = tree
                    .descendants(child)
                    .into_iter()
                    .filter_map(|id| tree.usage(id).cloned())
                    .map(LibraryChild::new)
                    .collect();
                Some(library_child)
            })
            .collect();

        let block = LibraryContentBlock {
            location: usage.clone(),
            max_count,
            mode,
            children,
        };
        let selected = self
            .assignments
            .library_selection(&block, &self.user, &mut self.rng)?;
        debug!(%usage, selected = selected.len(), "library children selected");

        let keys: Vec<Vec<String>> = selected
            .iter()
            .map(|child| vec![child.block_type.clone(), child.block_id.clone()])
            .collect();
        self.course
            .store
            .set_for_user(usage, "selected", &self.user, Value::from(keys))?;
        Ok(selected)
    }

    fn known(&self, usage: &UsageKey) -> Result<()> {
        if self.course.tree.contains(usage) {
            Ok(())
        } else {
            Err(RuntimeError::UnknownUsage {
                usage: usage.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use olx_assignment::InMemoryAssignmentStore;
    use olx_codec::InMemoryFs;
    use olx_core::usage_key;
    use olx_field_store::Provenance;

    fn course_fs() -> InMemoryFs {
        InMemoryFs::with_files([
            ("course.xml", r#"<course url_name="2014" org="edX" course="Demo"/>"#),
            (
                "course/2014.xml",
                r#"<course max_attempts="4">
                     <chapter url_name="c1">
                       <randomize url_name="r1">
                         <html url_name="h0">zero</html>
                         <html url_name="h1">one</html>
                         <html url_name="h2">two</html>
                       </randomize>
                       <library_content url_name="lib" max_count="2">
                         <problem url_name="p0"><p>a</p></problem>
                         <problem url_name="p1"><p>b</p></problem>
                         <problem url_name="p2"><p>c</p></problem>
                       </library_content>
                       <vertical url_name="v1"><html url_name="h3">three</html></vertical>
                       <library_content url_name="lib2" max_count="1">
                         <vertical url_name="lv"><html url_name="lh">unit</html></vertical>
                       </library_content>
                     </chapter>
                   </course>"#,
            ),
        ])
    }

    fn runtime(config: RuntimeConfig) -> Runtime<InMemoryAssignmentStore> {
        let course = config
            .codec()
            .import_course(&course_fs(), &CourseKey::new("edX", "Demo", "2014").unwrap())
            .unwrap();
        let assignments =
            VariantAssignmentService::new(InMemoryAssignmentStore::new(), RecordingEventSink::new());
        Runtime::new(config, course, UserId::new("5"), assignments).with_rng(StdRng::seed_from_u64(3))
    }

    #[test]
    fn effective_value_inherits() {
        let runtime = runtime(RuntimeConfig::default());
        let problem = usage_key!("block-v1:edX+Demo+2014+type@problem+block@p1");
        let effective = runtime.effective_value(&problem, "max_attempts").unwrap();
        assert_eq!(effective.value, Value::from(4i64));
        assert_eq!(
            effective.provenance,
            Provenance::Inherited(usage_key!("block-v1:edX+Demo+2014+type@course+block@2014"))
        );
        assert!(runtime
            .effective_settings(&problem)
            .unwrap()
            .contains_key("max_attempts"));
    }

    #[test]
    fn unknown_usage() {
        let runtime = runtime(RuntimeConfig::default());
        let missing = usage_key!("block-v1:edX+Demo+2014+type@html+block@nope");
        assert!(matches!(
            runtime.effective_value(&missing, "display_name"),
            Err(RuntimeError::UnknownUsage { .. })
        ));
    }

    #[test]
    fn plain_blocks_show_all_children() {
        let mut runtime = runtime(RuntimeConfig::default());
        let vertical = usage_key!("block-v1:edX+Demo+2014+type@vertical+block@v1");
        assert_eq!(runtime.visible_children(&vertical).unwrap().len(), 1);
    }

    #[test]
    fn randomize_uses_seed_and_records_choice() {
        let config = RuntimeConfig {
            seed: Some(crate::config::SeedStrategy::UserId),
            ..RuntimeConfig::default()
        };
        let mut runtime = runtime(config);
        let randomize = usage_key!("block-v1:edX+Demo+2014+type@randomize+block@r1");

        let visible = runtime.visible_children(&randomize).unwrap();
        assert_eq!(visible, vec![usage_key!("block-v1:edX+Demo+2014+type@html+block@h2")]);
        let user = runtime.user().clone();
        assert_eq!(
            runtime
                .course()
                .store
                .get_for_user(&randomize, "choice", &user)
                .unwrap()
                .value,
            Value::from(2i64)
        );
    }

    #[test]
    fn library_selection_is_stable_and_recorded() {
        let mut runtime = runtime(RuntimeConfig::default());
        let library = usage_key!("block-v1:edX+Demo+2014+type@library_content+block@lib");

        let first = runtime.visible_children(&library).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(runtime.visible_children(&library).unwrap(), first);

        let user = runtime.user().clone();
        let recorded = runtime
            .course()
            .store
            .get_for_user(&library, "selected", &user)
            .unwrap()
            .value;
        assert_eq!(recorded.as_list().unwrap().len(), 2);
        assert_eq!(runtime.assignments().events().events().len(), 1);
    }

    #[test]
    fn library_events_describe_descendants() {
        let mut runtime = runtime(RuntimeConfig::default());
        let library = usage_key!("block-v1:edX+Demo+2014+type@library_content+block@lib2");
        assert_eq!(runtime.visible_children(&library).unwrap().len(), 1);

        let events = runtime.assignments().events().events();
        let added = &events[0].data["added"][0];
        assert_eq!(added["usage_key"], "block-v1:edX+Demo+2014+type@vertical+block@lv");
        assert_eq!(
            added["descendants"],
            serde_json::json!([{
                "usage_key": "block-v1:edX+Demo+2014+type@html+block@lh",
                "original_usage_key": null,
                "original_usage_version": null,
                "descendants": [],
            }])
        );
    }

    #[test]
    fn library_default_max_count_comes_from_config() {
        let config = RuntimeConfig {
            library_content_default_max_count: 3,
            ..RuntimeConfig::default()
        };
        let mut runtime = runtime(config);
        let library = usage_key!("block-v1:edX+Demo+2014+type@library_content+block@lib");
        runtime.course.store.delete(&library, "max_count").unwrap();
        assert_eq!(runtime.visible_children(&library).unwrap().len(), 3);
    }
}
