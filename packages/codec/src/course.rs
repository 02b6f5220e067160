//! Whole-course import and export.

use std::collections::BTreeMap;
use std::fmt;

use olx_core::{CourseKey, UsageKey, Value};
use olx_field_store::{FieldBackend, FieldStore, InMemoryFieldBackend, UsageTree};
use tracing::{debug, info};

use crate::codec::{DecodeContext, DecodedBlock, DefinitionMetadata, OlxCodec, OlxExport};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::policy::{is_stripped, Policy};
use crate::resources::{InMemoryFs, ResourceFs};

/// Name of the file holding the course root pointer.
pub const COURSE_FILE: &str = "course.xml";

/// A course read from OLX.
pub struct ImportedCourse<B = InMemoryFieldBackend> {
    pub root: UsageKey,
    pub store: FieldStore<B>,
    pub tree: UsageTree,
    /// Legacy `<meta>` text per usage.
    pub definition_metadata: BTreeMap<UsageKey, DefinitionMetadata>,
}

impl OlxExport {
    /// Write every file, plus the policy at `policy_path`.
    pub fn write_to(&self, fs: &mut dyn ResourceFs, policy_path: &str) -> Result<()> {
        for (path, contents) in &self.files {
            fs.write(path, contents)?;
        }
        fs.write(policy_path, &self.policy.to_json_string()?)
    }
}

impl OlxCodec {
    /// Read `course.xml`, the policy file and every definition below it.
    pub fn import_course(&self, fs: &dyn ResourceFs, course_key: &CourseKey) -> Result<ImportedCourse> {
        let root_element = Element::parse(&fs.read(COURSE_FILE)?)?;
        if root_element.tag != "course" {
            return Err(Error::UnexpectedElement {
                expected: "course".to_string(),
                found: root_element.tag,
            });
        }

        let url_name = root_element.attr("url_name").unwrap_or(&course_key.run);
        let policy_path = self.policy_path(url_name);
        let policy = if fs.exists(&policy_path) {
            Policy::parse(&fs.read(&policy_path)?)?
        } else {
            debug!(policy_path = %policy_path, "course has no policy file");
            Policy::new()
        };

        let ctx = DecodeContext {
            course_key,
            fs,
            policy: &policy,
        };
        let decoded = self.from_xml(&root_element, &ctx)?;

        let mut store = FieldStore::new(self.registry_handle());
        let mut tree = UsageTree::new();
        self.load_into(&decoded, None, &mut store, &mut tree)?;

        let mut definition_metadata = BTreeMap::new();
        collect_metadata(&decoded, &mut definition_metadata);

        info!(course = %course_key, usages = tree.len(), "imported course");
        Ok(ImportedCourse {
            root: decoded.usage,
            store,
            tree,
            definition_metadata,
        })
    }

    /// Encode a course, starting at its root usage.
    pub fn export_course<B: FieldBackend>(
        &self,
        root: &UsageKey,
        store: &FieldStore<B>,
        tree: &UsageTree,
    ) -> Result<OlxExport> {
        let mut export = OlxExport::default();
        let pointer = self.to_xml(root, store, tree, &mut export)?;
        export
            .files
            .insert(COURSE_FILE.to_string(), pointer.to_pretty_string()?);
        Ok(export)
    }

    /// Export a course and write it to `fs`.
    pub fn write_course<B: FieldBackend>(
        &self,
        root: &UsageKey,
        store: &FieldStore<B>,
        tree: &UsageTree,
        fs: &mut dyn ResourceFs,
    ) -> Result<OlxExport> {
        let export = self.export_course(root, store, tree)?;
        export.write_to(fs, &self.policy_path(&root.block_id))?;
        Ok(export)
    }

    /// Import, export and re-import a course, reporting every difference.
    pub fn check_round_trip(
        &self,
        fs: &dyn ResourceFs,
        course_key: &CourseKey,
    ) -> Result<Vec<Divergence>> {
        let first = self.import_course(fs, course_key)?;
        let mut exported = InMemoryFs::new();
        self.write_course(&first.root, &first.store, &first.tree, &mut exported)?;
        let second = self.import_course(&exported, course_key)?;
        compare_courses(&first, &second)
    }
}

fn collect_metadata(block: &DecodedBlock, out: &mut BTreeMap<UsageKey, DefinitionMetadata>) {
    if let Some(meta) = &block.definition_metadata {
        out.insert(block.usage.clone(), meta.clone());
    }
    for child in &block.children {
        collect_metadata(child, out);
    }
}

/// A difference found by a round trip.
#[derive(Clone, Debug, PartialEq)]
pub enum Divergence {
    MissingUsage(UsageKey),
    ExtraUsage(UsageKey),
    Field {
        usage: UsageKey,
        field: String,
        before: Option<Value>,
        after: Option<Value>,
    },
    Children {
        usage: UsageKey,
        before: Vec<UsageKey>,
        after: Vec<UsageKey>,
    },
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::MissingUsage(usage) => write!(f, "{} is missing after the round trip", usage),
            Divergence::ExtraUsage(usage) => write!(f, "{} appeared during the round trip", usage),
            Divergence::Field {
                usage,
                field,
                before,
                after,
            } => write!(f, "{} field '{}': {:?} became {:?}", usage, field, before, after),
            Divergence::Children {
                usage,
                before,
                after,
            } => write!(
                f,
                "{} children changed from {} to {} entries",
                usage,
                before.len(),
                after.len()
            ),
        }
    }
}

/// Field-level comparison of two imported courses.
pub fn compare_courses<A: FieldBackend, B: FieldBackend>(
    before: &ImportedCourse<A>,
    after: &ImportedCourse<B>,
) -> Result<Vec<Divergence>> {
    let mut divergences = Vec::new();
    let before_usages = all_usages(&before.tree, &before.root);
    let after_usages = all_usages(&after.tree, &after.root);

    for usage in &after_usages {
        if !before_usages.contains(usage) {
            divergences.push(Divergence::ExtraUsage(usage.clone()));
        }
    }

    for usage in &before_usages {
        if !after_usages.contains(usage) {
            divergences.push(Divergence::MissingUsage(usage.clone()));
            continue;
        }

        let old = comparable_fields(&before.store, usage)?;
        let new = comparable_fields(&after.store, usage)?;
        for name in old.keys().chain(new.keys().filter(|k| !old.contains_key(*k))) {
            let (a, b) = (old.get(name), new.get(name));
            if a != b {
                divergences.push(Divergence::Field {
                    usage: usage.clone(),
                    field: name.clone(),
                    before: a.cloned(),
                    after: b.cloned(),
                });
            }
        }

        let old_children = before.tree.child_usages(usage);
        let new_children = after.tree.child_usages(usage);
        if old_children != new_children {
            divergences.push(Divergence::Children {
                usage: usage.clone(),
                before: old_children,
                after: new_children,
            });
        }
    }
    Ok(divergences)
}

fn all_usages(tree: &UsageTree, root: &UsageKey) -> Vec<UsageKey> {
    let Some(node) = tree.get(root) else {
        return Vec::new();
    };
    std::iter::once(node)
        .chain(tree.descendants(node))
        .filter_map(|id| tree.usage(id).cloned())
        .collect()
}

/// Explicit settings and content, with strip-listed passthrough removed.
fn comparable_fields<B: FieldBackend>(
    store: &FieldStore<B>,
    usage: &UsageKey,
) -> Result<BTreeMap<String, Value>> {
    let mut fields = store.explicit_fields(usage)?;
    fields.extend(store.explicit_fields_in_scope(usage, olx_core::Scope::Content)?);
    if let Some(Value::Dict(passthrough)) = fields.get_mut("xml_attributes") {
        passthrough.retain(|name, _| !is_stripped(name));
        if passthrough.is_empty() {
            fields.remove("xml_attributes");
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use olx_core::{usage_key, SchemaRegistry};
    use olx_field_store::InheritanceResolver;
    use std::sync::Arc;

    fn demo_fs() -> InMemoryFs {
        InMemoryFs::with_files([
            ("course.xml", r#"<course url_name="2014" org="edX" course="Demo"/>"#),
            (
                "course/2014.xml",
                r#"<course display_name="Demo Course" start="2014-01-01T00:00:00Z">
                     <chapter url_name="week1"/>
                   </course>"#,
            ),
            (
                "chapter/week1.xml",
                r#"<chapter display_name="Week 1" due="2014-02-01T00:00:00Z" unknown_attr="keep me">
                     <sequential url_name="seq1"/>
                   </chapter>"#,
            ),
            (
                "sequential/seq1.xml",
                r#"<sequential format="Homework" graded="true">
                     <vertical url_name="unit1"/>
                   </sequential>"#,
            ),
            (
                "vertical/unit1.xml",
                r#"<vertical>
                     <html url_name="intro"/>
                     <problem url_name="q1"/>
                     <video url_name="v1" youtube_id_1_0="abc" sub="subs_v1"/>
                   </vertical>"#,
            ),
            ("html/intro.html", "<html><p>Welcome <b>all</b></p></html>"),
            (
                "problem/q1.xml",
                r#"<problem max_attempts="2" weight="1.0"><p>2+2?</p></problem>"#,
            ),
            (
                "policies/2014/policy.json",
                r#"{"course/2014": {"discussion_topics": {"General": {"id": "course"}}, "name": "Policy Name"}}"#,
            ),
        ])
    }

    fn codec() -> OlxCodec {
        OlxCodec::new(Arc::new(SchemaRegistry::with_builtin_categories()))
    }

    fn key() -> CourseKey {
        CourseKey::new("edX", "Demo", "2014").unwrap()
    }

    #[test]
    fn import_builds_tree_and_fields() {
        let course = codec().import_course(&demo_fs(), &key()).unwrap();
        assert_eq!(course.root, usage_key!("block-v1:edX+Demo+2014+type@course+block@2014"));
        assert_eq!(course.tree.len(), 7);

        let store = &course.store;
        assert_eq!(
            store.get(&course.root, "display_name").unwrap().value,
            Value::from("Policy Name")
        );
        assert!(store.has(&course.root, "discussion_topics").unwrap());

        let vertical = usage_key!("block-v1:edX+Demo+2014+type@vertical+block@unit1");
        let children: Vec<_> = course
            .tree
            .child_usages(&vertical)
            .into_iter()
            .map(|u| u.block_type)
            .collect();
        assert_eq!(children, vec!["html", "problem", "video"]);

        let problem = usage_key!("block-v1:edX+Demo+2014+type@problem+block@q1");
        let resolver = InheritanceResolver::new(&course.store, &course.tree);
        let due = resolver.resolve(&problem, "due").unwrap();
        assert_eq!(due.value, Value::from("2014-02-01T00:00:00Z"));
        assert_eq!(
            resolver.resolve(&problem, "graded").unwrap().value,
            Value::from(true)
        );
    }

    #[test]
    fn missing_course_file() {
        assert!(matches!(
            codec().import_course(&InMemoryFs::new(), &key()),
            Err(Error::ResourceNotFound { .. })
        ));
    }

    #[test]
    fn export_layout() {
        let codec = codec();
        let course = codec.import_course(&demo_fs(), &key()).unwrap();
        let mut out = InMemoryFs::new();
        let export = codec
            .write_course(&course.root, &course.store, &course.tree, &mut out)
            .unwrap();

        let paths: Vec<_> = out.files().keys().cloned().collect();
        assert_eq!(
            paths,
            vec![
                "chapter/week1.xml",
                "course.xml",
                "course/2014.xml",
                "html/intro.html",
                "policies/2014/policy.json",
                "problem/q1.xml",
                "sequential/seq1.xml",
                "vertical/unit1.xml",
            ]
        );
        assert!(export.policy.get(&course.root).is_some());

        let root = Element::parse(&out.read("course.xml").unwrap()).unwrap();
        assert_eq!(root.attr("org"), Some("edX"));
        let chapter = Element::parse(&out.read("chapter/week1.xml").unwrap()).unwrap();
        assert_eq!(chapter.attr("unknown_attr"), Some("keep me"));
        assert_eq!(chapter.attr("filename"), None);
        let vertical = Element::parse(&out.read("vertical/unit1.xml").unwrap()).unwrap();
        let video = vertical.elements().nth(2).unwrap();
        assert_eq!(video.attr("sub"), Some("subs_v1"));
        assert_eq!(video.attr("youtube_id_1_0"), Some("abc"));
    }

    #[test]
    fn round_trip_has_no_divergence() {
        let divergences = codec().check_round_trip(&demo_fs(), &key()).unwrap();
        assert!(divergences.is_empty(), "{:?}", divergences);
    }

    #[test]
    fn typed_unknown_policy_keys_round_trip() {
        let codec = codec();
        let mut fs = demo_fs();
        fs.write(
            "policies/2014/policy.json",
            r#"{"course/2014": {"name": "Policy Name"}, "chapter/week1": {"mystery": [1, 2], "flag": true}}"#,
        )
        .unwrap();

        let divergences = codec.check_round_trip(&fs, &key()).unwrap();
        assert!(divergences.is_empty(), "{:?}", divergences);

        let course = codec.import_course(&fs, &key()).unwrap();
        let mut out = InMemoryFs::new();
        let export = codec
            .write_course(&course.root, &course.store, &course.tree, &mut out)
            .unwrap();
        let chapter = usage_key!("block-v1:edX+Demo+2014+type@chapter+block@week1");
        let entries = export.policy.get(&chapter).unwrap();
        assert_eq!(entries["mystery"], serde_json::json!([1, 2]));
        assert_eq!(entries["flag"], serde_json::json!(true));

        let element = Element::parse(&out.read("chapter/week1.xml").unwrap()).unwrap();
        assert_eq!(element.attr("flag"), None);
        assert_eq!(element.attr("unknown_attr"), Some("keep me"));
    }

    #[test]
    fn two_cycles_keep_unknown_attributes() {
        let codec = codec();
        let mut fs = demo_fs();
        for _ in 0..2 {
            let course = codec.import_course(&fs, &key()).unwrap();
            let mut next = InMemoryFs::new();
            codec
                .write_course(&course.root, &course.store, &course.tree, &mut next)
                .unwrap();
            fs = next;
        }
        let chapter = Element::parse(&fs.read("chapter/week1.xml").unwrap()).unwrap();
        assert_eq!(chapter.attr("unknown_attr"), Some("keep me"));
    }

    #[test]
    fn divergence_is_reported() {
        let codec = codec();
        let first = codec.import_course(&demo_fs(), &key()).unwrap();
        let mut second = codec.import_course(&demo_fs(), &key()).unwrap();
        let chapter = usage_key!("block-v1:edX+Demo+2014+type@chapter+block@week1");
        second
            .store
            .set(&chapter, "display_name", Value::from("Renamed"))
            .unwrap();

        let divergences = compare_courses(&first, &second).unwrap();
        assert_eq!(divergences.len(), 1);
        assert!(divergences[0].to_string().contains("display_name"));
    }
}
