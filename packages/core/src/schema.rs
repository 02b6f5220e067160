//! Per-category field declarations.
//!
//! Every block category has an explicit table of the fields it understands.
//! Each entry carries the field's type, scope, default and whether it is
//! inherited down the course tree. The built-in registry covers the
//! categories a course export can contain; callers can register more.

use std::collections::BTreeMap;
use std::fmt;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::convert::parse_date;
use crate::{Error, Result, Value};

/// Data-sharing granularity of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Author-controlled, per usage.
    Settings,
    /// Shared by every usage of the same definition.
    Content,
    /// Per learner, per usage.
    UserState,
    /// Per usage, aggregated across learners.
    UserStateSummary,
}

impl Scope {
    /// True if values of this scope are stored per learner.
    pub fn is_user_scoped(&self) -> bool {
        matches!(self, Scope::UserState)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scope::Settings => "settings",
            Scope::Content => "content",
            Scope::UserState => "user_state",
            Scope::UserStateSummary => "user_state_summary",
        };
        f.write_str(name)
    }
}

/// Declared type of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Boolean,
    Integer,
    Float,
    String,
    Date,
    List,
    Dict,
    Any,
}

impl FieldType {
    /// Lenient coercion of a JSON-decoded value, as done when reading a
    /// stored value back into the field.
    ///
    /// Returns `None` when the field cannot make sense of the value. `Null`
    /// is accepted by every type.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        if value.is_null() {
            return Some(Value::Null);
        }

        match (self, value) {
            (FieldType::Any, v) => Some(v.clone()),

            (FieldType::Boolean, Value::Bool(b)) => Some(Value::Bool(*b)),
            (FieldType::Boolean, Value::String(s)) => Some(Value::Bool(s.to_lowercase() == "true")),
            (FieldType::Boolean, Value::Integer(i)) => Some(Value::Bool(*i != 0)),
            (FieldType::Boolean, Value::Float(f)) => Some(Value::Bool(*f != 0.0)),
            (FieldType::Boolean, Value::List(items)) => Some(Value::Bool(!items.is_empty())),
            (FieldType::Boolean, Value::Dict(map)) => Some(Value::Bool(!map.is_empty())),
            (FieldType::Boolean, _) => Some(Value::Bool(true)),

            (FieldType::Integer, Value::Bool(b)) => Some(Value::Integer(*b as i64)),
            (FieldType::Integer, Value::Integer(i)) => Some(Value::Integer(*i)),
            (FieldType::Integer, Value::Float(f)) if f.is_finite() => {
                Some(Value::Integer(f.trunc() as i64))
            }
            (FieldType::Integer, Value::String(s)) => s.trim().parse().ok().map(Value::Integer),

            (FieldType::Float, Value::Bool(b)) => Some(Value::Float(*b as i64 as f64)),
            (FieldType::Float, Value::Integer(i)) => Some(Value::Float(*i as f64)),
            (FieldType::Float, Value::Float(f)) => Some(Value::Float(*f)),
            (FieldType::Float, Value::String(s)) => s.trim().parse().ok().map(Value::Float),

            (FieldType::String, Value::String(s)) => Some(Value::String(s.clone())),

            (FieldType::Date, Value::Date(d)) => Some(Value::Date(*d)),
            (FieldType::Date, Value::String(s)) => parse_date(s).map(Value::Date),
            (FieldType::Date, Value::Integer(ms)) => date_from_millis(*ms as f64),
            (FieldType::Date, Value::Float(ms)) => date_from_millis(*ms),

            (FieldType::List, Value::List(items)) => Some(Value::List(items.clone())),
            (FieldType::Dict, Value::Dict(map)) => Some(Value::Dict(map.clone())),

            _ => None,
        }
    }

    /// Strict check used before a value is explicitly set.
    pub fn validate(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (FieldType::Any, _) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Integer, Value::Integer(_)) => true,
            (FieldType::Float, Value::Float(_) | Value::Integer(_)) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Date, Value::Date(_)) => true,
            (FieldType::Date, Value::String(s)) => parse_date(s).is_some(),
            (FieldType::List, Value::List(_)) => true,
            (FieldType::Dict, Value::Dict(_)) => true,
            _ => false,
        }
    }
}

fn date_from_millis(ms: f64) -> Option<Value> {
    if !ms.is_finite() {
        return None;
    }
    let secs = (ms / 1000.0).floor();
    let nanos = ((ms - secs * 1000.0) * 1_000_000.0) as u32;
    chrono::DateTime::from_timestamp(secs as i64, nanos).map(|d| Value::Date(d.fixed_offset()))
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Date => "date",
            FieldType::List => "list",
            FieldType::Dict => "dict",
            FieldType::Any => "any",
        };
        f.write_str(name)
    }
}

/// One row of a category's field table.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub field_type: FieldType,
    pub scope: Scope,
    pub inheritable: bool,
    pub default: Value,
    /// Exported to the course policy file instead of as an XML attribute.
    pub export_to_policy: bool,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, field_type: FieldType, scope: Scope) -> Self {
        FieldDecl {
            name: name.into(),
            field_type,
            scope,
            inheritable: false,
            default: Value::Null,
            export_to_policy: false,
        }
    }

    /// Shorthand for a Settings-scoped field.
    pub fn setting(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDecl::new(name, field_type, Scope::Settings)
    }

    #[must_use]
    pub fn inheritable(mut self) -> Self {
        self.inheritable = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    #[must_use]
    pub fn export_to_policy(mut self) -> Self {
        self.export_to_policy = true;
        self
    }
}

/// How a category's definition is laid out in OLX.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionLayout {
    /// Child elements are child usages.
    Container,
    /// The definition element itself is stored in the `data` field.
    RawData,
}

/// Alternate on-disk locations tried when a definition file is missing.
///
/// Rules are applied in order. Each one adds variants of the candidates
/// collected so far; the primary path always stays first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum BackcompatRule {
    /// Add a variant ending in `to` for each candidate ending in `from`.
    RenameSuffix { from: String, to: String },
    /// Add every variant of each candidate with leading directories removed,
    /// as long as at least one directory remains.
    StripLeadingDirectories,
}

/// The field table and OLX layout of one block category.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockSchema {
    pub category: String,
    pub fields: BTreeMap<String, FieldDecl>,
    pub layout: DefinitionLayout,
    /// Written to its own file (and referenced by a pointer) on export.
    pub export_to_file: bool,
    pub filename_extension: String,
    pub backcompat: Vec<BackcompatRule>,
    /// Settings fields that stay on the definition element when it is
    /// cleaned, and are therefore not re-added from metadata on export.
    pub not_to_clean: Vec<String>,
    /// Children of this category keep their own local defaults instead of
    /// inheriting from above.
    pub bypasses_inheritance: bool,
}

impl BlockSchema {
    /// A container category with the fields every block carries.
    pub fn new(category: impl Into<String>) -> Self {
        let mut schema = BlockSchema {
            category: category.into(),
            fields: BTreeMap::new(),
            layout: DefinitionLayout::Container,
            export_to_file: true,
            filename_extension: "xml".to_string(),
            backcompat: Vec::new(),
            not_to_clean: Vec::new(),
            bypasses_inheritance: false,
        };
        for decl in common_fields() {
            schema.fields.insert(decl.name.clone(), decl);
        }
        schema
    }

    #[must_use]
    pub fn with_field(mut self, decl: FieldDecl) -> Self {
        self.fields.insert(decl.name.clone(), decl);
        self
    }

    /// Switch to the raw-data layout, declaring the `data` content field.
    #[must_use]
    pub fn raw_data(mut self) -> Self {
        self.layout = DefinitionLayout::RawData;
        self.with_field(FieldDecl::new("data", FieldType::String, Scope::Content).with_default(""))
    }

    #[must_use]
    pub fn inline(mut self) -> Self {
        self.export_to_file = false;
        self
    }

    #[must_use]
    pub fn with_backcompat(mut self, rule: BackcompatRule) -> Self {
        self.backcompat.push(rule);
        self
    }

    #[must_use]
    pub fn not_to_clean(mut self, field: impl Into<String>) -> Self {
        self.not_to_clean.push(field.into());
        self
    }

    #[must_use]
    pub fn bypassing_inheritance(mut self) -> Self {
        self.bypasses_inheritance = true;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.get(name)
    }

    /// Look up a field, failing with `FieldNotDeclared`.
    pub fn declared(&self, name: &str) -> Result<&FieldDecl> {
        self.fields.get(name).ok_or_else(|| Error::FieldNotDeclared {
            category: self.category.clone(),
            field: name.to_string(),
        })
    }

    /// Declared fields of one scope, in name order.
    pub fn fields_in_scope(&self, scope: Scope) -> impl Iterator<Item = &FieldDecl> {
        self.fields.values().filter(move |decl| decl.scope == scope)
    }

    pub fn inheritable_fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.fields.values().filter(|decl| decl.inheritable)
    }
}

/// Fields shared by every category, including the inherited settings.
fn common_fields() -> Vec<FieldDecl> {
    use FieldType::*;

    vec![
        FieldDecl::setting("display_name", String),
        FieldDecl::setting("xml_attributes", Dict).with_default(Value::dict()),
        FieldDecl::setting("graded", Boolean).inheritable().with_default(false),
        FieldDecl::setting("start", Date)
            .inheritable()
            .with_default(parse_date("2030-01-01T00:00:00Z").map_or(Value::Null, Value::Date)),
        FieldDecl::setting("due", Date).inheritable(),
        FieldDecl::setting("graceperiod", String).inheritable(),
        FieldDecl::setting("showanswer", String)
            .inheritable()
            .with_default("finished"),
        FieldDecl::setting("show_correctness", String)
            .inheritable()
            .with_default("always"),
        FieldDecl::setting("rerandomize", String)
            .inheritable()
            .with_default("never"),
        FieldDecl::setting("days_early_for_beta", Float).inheritable(),
        FieldDecl::setting("static_asset_path", String)
            .inheritable()
            .with_default(""),
        FieldDecl::setting("max_attempts", Integer).inheritable(),
        FieldDecl::setting("visible_to_staff_only", Boolean)
            .inheritable()
            .with_default(false),
        FieldDecl::setting("hide_after_due", Boolean)
            .inheritable()
            .with_default(false),
        FieldDecl::setting("group_access", Dict)
            .inheritable()
            .with_default(Value::dict()),
        FieldDecl::setting("user_partitions", List)
            .inheritable()
            .with_default(Value::list()),
        FieldDecl::setting("giturl", String).inheritable(),
        FieldDecl::setting("xqa_key", String).inheritable(),
        FieldDecl::setting("use_latex_compiler", Boolean)
            .inheritable()
            .with_default(false),
        FieldDecl::setting("course_edit_method", String)
            .inheritable()
            .with_default("Studio"),
    ]
}

lazy_static! {
    static ref BUILTIN: SchemaRegistry = SchemaRegistry::with_builtin_categories();
}

/// Category name → schema.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, BlockSchema>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared built-in registry.
    pub fn builtin() -> &'static SchemaRegistry {
        &BUILTIN
    }

    /// A fresh registry holding every built-in category.
    pub fn with_builtin_categories() -> Self {
        use FieldType::*;

        let html_backcompat = [
            BackcompatRule::RenameSuffix {
                from: ".html.html".to_string(),
                to: ".html".to_string(),
            },
            BackcompatRule::StripLeadingDirectories,
            BackcompatRule::RenameSuffix {
                from: ".html".to_string(),
                to: ".xml".to_string(),
            },
        ];

        let mut registry = SchemaRegistry::new();
        registry.register(
            BlockSchema::new("course")
                .with_field(
                    FieldDecl::setting("discussion_topics", Dict)
                        .with_default(Value::dict())
                        .export_to_policy(),
                )
                .with_field(FieldDecl::setting("advanced_modules", List).with_default(Value::list()))
                .with_field(FieldDecl::setting("end", Date))
                .with_field(FieldDecl::setting("self_paced", Boolean).with_default(false)),
        );
        registry.register(BlockSchema::new("chapter"));
        registry.register(
            BlockSchema::new("sequential")
                .with_field(FieldDecl::setting("format", String))
                .with_field(FieldDecl::setting("is_time_limited", Boolean).with_default(false)),
        );
        registry.register(BlockSchema::new("vertical"));

        let mut html = BlockSchema::new("html").raw_data();
        html.filename_extension = "html".to_string();
        for rule in html_backcompat {
            html = html.with_backcompat(rule);
        }
        registry.register(html);

        registry.register(
            BlockSchema::new("problem")
                .raw_data()
                .with_field(FieldDecl::setting("weight", Float))
                .with_field(FieldDecl::setting("markdown", String))
                .with_field(FieldDecl::new("attempts", Integer, Scope::UserState).with_default(0))
                .with_field(FieldDecl::new("done", Boolean, Scope::UserState))
                .with_backcompat(BackcompatRule::StripLeadingDirectories),
        );
        registry.register(
            BlockSchema::new("video")
                .raw_data()
                .inline()
                .with_field(FieldDecl::setting("youtube_id_1_0", String))
                .with_field(FieldDecl::setting("sub", String))
                .with_field(FieldDecl::setting("transcripts", Dict).with_default(Value::dict()))
                .with_field(FieldDecl::new("position", Float, Scope::UserState))
                .not_to_clean("sub")
                .not_to_clean("transcripts"),
        );
        registry.register(
            BlockSchema::new("discussion")
                .raw_data()
                .inline()
                .with_field(FieldDecl::setting("discussion_id", String))
                .with_field(FieldDecl::setting("discussion_category", String))
                .with_field(FieldDecl::setting("discussion_target", String)),
        );
        registry.register(
            BlockSchema::new("split_test")
                .with_field(FieldDecl::setting("user_partition_id", Integer).with_default(-1))
                .with_field(FieldDecl::setting("group_id_to_child", Dict).with_default(Value::dict())),
        );
        registry.register(
            BlockSchema::new("randomize")
                .with_field(FieldDecl::new("choice", Integer, Scope::UserState)),
        );
        registry.register(
            BlockSchema::new("library_content")
                .with_field(FieldDecl::setting("source_library_id", String))
                .with_field(FieldDecl::setting("source_library_version", String))
                .with_field(FieldDecl::setting("mode", String).with_default("random"))
                .with_field(FieldDecl::setting("max_count", Integer).with_default(1))
                .with_field(FieldDecl::setting("capa_type", String).with_default("any"))
                .with_field(FieldDecl::new("selected", List, Scope::UserState).with_default(Value::list()))
                .bypassing_inheritance(),
        );
        registry
    }

    /// Register a schema, returning the one it replaced.
    pub fn register(&mut self, schema: BlockSchema) -> Option<BlockSchema> {
        self.schemas.insert(schema.category.clone(), schema)
    }

    pub fn get(&self, category: &str) -> Option<&BlockSchema> {
        self.schemas.get(category)
    }

    pub fn get_mut(&mut self, category: &str) -> Option<&mut BlockSchema> {
        self.schemas.get_mut(category)
    }

    /// Look up a schema, failing with `UnknownCategory`.
    pub fn schema(&self, category: &str) -> Result<&BlockSchema> {
        self.schemas
            .get(category)
            .ok_or_else(|| Error::UnknownCategory {
                category: category.to_string(),
            })
    }

    /// Look up a field declaration of a category.
    pub fn field(&self, category: &str, name: &str) -> Result<&FieldDecl> {
        self.schema(category)?.declared(name)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}
