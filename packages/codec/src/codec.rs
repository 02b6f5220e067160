//! Decoding and encoding single blocks.

use std::collections::BTreeMap;
use std::sync::Arc;

use olx_core::{
    json_to_value, value_to_json, BlockSchema, CourseKey, DefinitionId, DefinitionLayout,
    SchemaRegistry, Scope, UsageKey, Value,
};
use olx_field_store::{FieldBackend, FieldStore, NodeId, UsageTree};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::element::Element;
use crate::error::{Error, Result};
use crate::policy::{is_stripped, translate_key, Policy};
use crate::resources::{candidate_paths, definition_path, find_first, ResourceFs};
use crate::serialize::{deserialize_field, serialize_field};

/// Text of a legacy `<meta>` child.
#[derive(Clone, Debug, PartialEq)]
pub struct DefinitionMetadata {
    pub raw: String,
    /// Why `raw` could not be merged, if it could not.
    pub error: Option<String>,
}

/// One block read from OLX, with its children.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBlock {
    pub usage: UsageKey,
    pub definition: DefinitionId,
    /// Settings fields found in attributes, `<meta>` and policy, plus
    /// `xml_attributes` when anything was passed through.
    pub settings: BTreeMap<String, Value>,
    pub content: BTreeMap<String, Value>,
    pub children: Vec<DecodedBlock>,
    /// File the definition was read from, for pointers.
    pub source: Option<String>,
    pub definition_metadata: Option<DefinitionMetadata>,
}

/// Everything needed to resolve pointers while decoding.
pub struct DecodeContext<'a> {
    pub course_key: &'a CourseKey,
    pub fs: &'a dyn ResourceFs,
    pub policy: &'a Policy,
}

/// Files and policy entries produced by encoding.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OlxExport {
    pub files: BTreeMap<String, String>,
    pub policy: Policy,
}

/// True for an element that only references a definition stored elsewhere.
///
/// A pointer has no children, no text, and only a `url_name` attribute; the
/// course root may also carry `org` and `course`.
pub fn is_pointer(element: &Element) -> bool {
    if element.has_elements() || element.has_text() {
        return false;
    }
    let mut names: Vec<&str> = element.attributes.iter().map(|(k, _)| k.as_str()).collect();
    names.sort_unstable();
    match names.as_slice() {
        ["url_name"] => true,
        ["course", "org", "url_name"] => element.tag == "course",
        _ => false,
    }
}

/// Converts between OLX elements and field values.
#[derive(Clone)]
pub struct OlxCodec {
    registry: Arc<SchemaRegistry>,
    policy_dir: String,
}

impl OlxCodec {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        OlxCodec {
            registry,
            policy_dir: "policies".to_string(),
        }
    }

    #[must_use]
    pub fn with_policy_dir(mut self, policy_dir: impl Into<String>) -> Self {
        self.policy_dir = policy_dir.into();
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn registry_handle(&self) -> Arc<SchemaRegistry> {
        Arc::clone(&self.registry)
    }

    /// `{policy_dir}/{url_name}/policy.json` for a course root.
    pub fn policy_path(&self, course_url_name: &str) -> String {
        format!("{}/{}/policy.json", self.policy_dir, course_url_name)
    }

    /// Decode an element and everything below it.
    pub fn from_xml(&self, element: &Element, ctx: &DecodeContext<'_>) -> Result<DecodedBlock> {
        self.decode(element, ctx, None, 0)
    }

    fn decode(
        &self,
        element: &Element,
        ctx: &DecodeContext<'_>,
        parent_id: Option<&str>,
        position: usize,
    ) -> Result<DecodedBlock> {
        let category = element.tag.as_str();
        let schema = self.registry.schema(category)?;
        let url_name = match element.attr("url_name") {
            Some(name) => name.to_string(),
            None => generated_url_name(element, parent_id, position)?,
        };
        let usage = ctx.course_key.make_usage_key(category, url_name.as_str())?;

        let (mut definition, source) = if is_pointer(element) {
            self.load_pointer(schema, element, &url_name, ctx.fs)?
        } else {
            (element.clone(), None)
        };
        if definition.tag != category {
            return Err(Error::UnexpectedElement {
                expected: category.to_string(),
                found: definition.tag,
            });
        }

        let meta = definition.take_child("meta").map(|meta| meta.text());

        let mut settings = BTreeMap::new();
        let mut passthrough = BTreeMap::new();
        for (name, raw) in &definition.attributes {
            if is_stripped(name) {
                continue;
            }
            match schema.field(name) {
                Some(decl) if decl.scope == Scope::Settings => {
                    settings.insert(name.clone(), deserialize_field(decl.field_type, raw));
                }
                _ => {
                    passthrough.insert(name.clone(), Value::String(raw.clone()));
                }
            }
        }

        let definition_metadata = meta.map(|raw| {
            let error = match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&raw) {
                Ok(entries) => {
                    merge_overrides(schema, &usage, entries, &mut settings, &mut passthrough);
                    None
                }
                Err(e) => {
                    warn!(%usage, error = %e, "ignoring malformed <meta> metadata");
                    Some(e.to_string())
                }
            };
            DefinitionMetadata { raw, error }
        });

        if let Some(entries) = ctx.policy.get(&usage) {
            merge_overrides(schema, &usage, entries.clone(), &mut settings, &mut passthrough);
        }

        if let Some(path) = &source {
            passthrough.insert(
                "filename".to_string(),
                Value::from(vec![path.as_str(), path.as_str()]),
            );
        }
        if !passthrough.is_empty() {
            settings.insert("xml_attributes".to_string(), Value::Dict(passthrough));
        }

        let mut content = BTreeMap::new();
        let mut children = Vec::new();
        match schema.layout {
            DefinitionLayout::Container => {
                for (index, child) in definition.elements().enumerate() {
                    children.push(self.decode(child, ctx, Some(&url_name), index)?);
                }
            }
            DefinitionLayout::RawData => {
                let mut cleaned = definition;
                cleaned
                    .attributes
                    .retain(|(name, _)| schema.not_to_clean.iter().any(|kept| kept == name));
                content.insert(
                    "data".to_string(),
                    Value::String(cleaned.to_compact_string()?),
                );
            }
        }

        Ok(DecodedBlock {
            definition: DefinitionId::new(category, url_name.as_str()),
            usage,
            settings,
            content,
            children,
            source,
            definition_metadata,
        })
    }

    fn load_pointer(
        &self,
        schema: &BlockSchema,
        pointer: &Element,
        url_name: &str,
        fs: &dyn ResourceFs,
    ) -> Result<(Element, Option<String>)> {
        let primary = definition_path(&schema.category, url_name, &schema.filename_extension);
        let candidates = candidate_paths(&primary, &schema.backcompat);
        match find_first(fs, &candidates) {
            Some(path) => Ok((Element::parse(&fs.read(&path)?)?, Some(path))),
            // Inline categories may legitimately be written as a bare
            // element with nothing but a url_name.
            None if !schema.export_to_file => {
                debug!(category = %schema.category, url_name, "no definition file, decoding inline");
                Ok((pointer.clone(), None))
            }
            None => Err(Error::DefinitionNotFound {
                category: schema.category.clone(),
                url_name: url_name.to_string(),
                tried: candidates,
            }),
        }
    }

    /// Put a decoded block and its children into a store and tree.
    pub fn load_into<B: FieldBackend>(
        &self,
        block: &DecodedBlock,
        parent: Option<NodeId>,
        store: &mut FieldStore<B>,
        tree: &mut UsageTree,
    ) -> Result<NodeId> {
        let node = match parent {
            Some(parent) => tree.insert_child(parent, block.usage.clone())?,
            None => tree.insert_root(block.usage.clone())?,
        };
        store.bind_definition(block.usage.clone(), block.definition.clone());
        for (name, value) in block.settings.iter().chain(&block.content) {
            store.load(&block.usage, name, value.clone())?;
        }
        for child in &block.children {
            self.load_into(child, Some(node), store, tree)?;
        }
        Ok(node)
    }

    /// Encode a usage and everything below it.
    ///
    /// Definitions of file-backed categories are added to `export.files` and
    /// a pointer is returned; other categories are returned inline.
    pub fn to_xml<B: FieldBackend>(
        &self,
        usage: &UsageKey,
        store: &FieldStore<B>,
        tree: &UsageTree,
        export: &mut OlxExport,
    ) -> Result<Element> {
        let schema = self.registry.schema(&usage.block_type)?;

        let mut element = match schema.layout {
            DefinitionLayout::RawData => raw_definition(usage, schema, store)?,
            DefinitionLayout::Container => {
                let mut element = Element::new(usage.block_type.as_str());
                for child in tree.child_usages(usage) {
                    element.push_child(self.to_xml(&child, store, tree, export)?);
                }
                element
            }
        };

        let own = store.explicit_fields(usage)?;
        for (name, value) in &own {
            if name == "xml_attributes" || is_stripped(name) {
                continue;
            }
            if schema.not_to_clean.iter().any(|kept| kept == name) {
                continue;
            }
            let exported_to_policy = schema.field(name).is_some_and(|decl| decl.export_to_policy);
            if exported_to_policy {
                export.policy.insert(usage, name.as_str(), value_to_json(value));
                continue;
            }
            element.set_attr(name.as_str(), serialize_field(value));
        }

        // Attribute text always reads back as a string, so typed passthrough
        // values (from policy or <meta>) go back to the policy.
        if let Some(Value::Dict(passthrough)) = own.get("xml_attributes") {
            for (name, value) in passthrough {
                if is_stripped(name) {
                    continue;
                }
                match value {
                    Value::String(text) => element.set_attr(name.as_str(), text.as_str()),
                    other => export.policy.insert(usage, name.as_str(), value_to_json(other)),
                }
            }
        }

        if !schema.export_to_file {
            element.set_attr("url_name", usage.block_id.as_str());
            return Ok(element);
        }

        let path = definition_path(&schema.category, &usage.block_id, &schema.filename_extension);
        export.files.insert(path, element.to_pretty_string()?);

        let mut pointer = Element::new(usage.block_type.as_str()).with_attr("url_name", usage.block_id.as_str());
        if usage.block_type == "course" {
            pointer.set_attr("org", usage.course_key.org.as_str());
            pointer.set_attr("course", usage.course_key.course.as_str());
        }
        Ok(pointer)
    }
}

/// Merge `<meta>` or policy entries: declared settings become fields, the
/// rest is passed through.
fn merge_overrides(
    schema: &BlockSchema,
    usage: &UsageKey,
    entries: serde_json::Map<String, serde_json::Value>,
    settings: &mut BTreeMap<String, Value>,
    passthrough: &mut BTreeMap<String, Value>,
) {
    for (key, value) in entries {
        let name = translate_key(&key);
        if is_stripped(name) {
            debug!(%usage, key = %key, "dropping policy key that is never loaded");
            continue;
        }
        let value = json_to_value(value);
        match schema.field(name) {
            Some(decl) if decl.scope == Scope::Settings => {
                settings.insert(name.to_string(), value);
            }
            _ => {
                debug!(%usage, key = name, "keeping unknown policy key as an xml attribute");
                passthrough.insert(name.to_string(), value);
            }
        }
    }
}

/// The `data` field as an element, with declared settings cleaned off.
fn raw_definition<B: FieldBackend>(
    usage: &UsageKey,
    schema: &BlockSchema,
    store: &FieldStore<B>,
) -> Result<Element> {
    let data = store.get(usage, "data")?.value;
    let mut element = match &data {
        Value::Null => Element::new(usage.block_type.as_str()),
        Value::String(text) if text.trim().is_empty() => Element::new(usage.block_type.as_str()),
        Value::String(text) => Element::parse(text)?,
        _ => {
            return Err(Error::InvalidFieldValue {
                usage: usage.to_string(),
                field: "data".to_string(),
                expected: "an XML string",
            })
        }
    };
    element.attributes.retain(|(name, _)| {
        let declared_setting = schema
            .field(name)
            .is_some_and(|decl| decl.scope == Scope::Settings);
        !declared_setting || schema.not_to_clean.iter().any(|kept| kept == name)
    });
    Ok(element)
}

/// A stable id for an element without a `url_name`.
fn generated_url_name(element: &Element, parent_id: Option<&str>, position: usize) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(parent_id.unwrap_or("").as_bytes());
    hasher.update([0]);
    hasher.update(position.to_string().as_bytes());
    hasher.update([0]);
    hasher.update(element.to_compact_string()?.as_bytes());
    let hash = hasher.finalize();
    Ok(format!("{}_{}", element.tag, hex::encode(&hash[..6])))
}
