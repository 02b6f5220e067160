//! Course policy: per-usage settings stored beside the XML.
//!
//! `policies/{run}/policy.json` maps `{block_type}/{block_id}` to an object
//! of field name → JSON value. Those values are merged over what the XML
//! attributes say.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use olx_core::UsageKey;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;

use crate::error::Result;

/// Attributes and policy keys that are never loaded as fields, and never
/// written back from `xml_attributes`.
pub const METADATA_TO_STRIP: &[&str] = &[
    "data_dir",
    "tabs",
    "grading_policy",
    "discussion_blackouts",
    "course",
    "org",
    "url_name",
    "filename",
    "xml_attributes",
];

lazy_static! {
    /// Legacy policy key → field name.
    static ref METADATA_TRANSLATIONS: BTreeMap<&'static str, &'static str> = [
        ("slug", "url_name"),
        ("name", "display_name"),
    ]
    .into_iter()
    .collect();
}

pub fn is_stripped(name: &str) -> bool {
    METADATA_TO_STRIP.contains(&name)
}

/// The current name of a possibly legacy policy key.
pub fn translate_key(key: &str) -> &str {
    METADATA_TRANSLATIONS.get(key).copied().unwrap_or(key)
}

/// The parsed contents of a policy file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Policy {
    entries: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Policy> {
        Ok(serde_json::from_str(text)?)
    }

    /// Settings for one usage, if the policy mentions it.
    pub fn get(&self, usage: &UsageKey) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.entries.get(&usage.policy_key())
    }

    pub fn insert(&mut self, usage: &UsageKey, field: impl Into<String>, value: serde_json::Value) {
        self.entries
            .entry(usage.policy_key())
            .or_default()
            .insert(field.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Render with sorted keys and four-space indentation.
    pub fn to_json_string(&self) -> Result<String> {
        let mut out = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
        self.serialize(&mut serializer)?;
        let mut text = String::from_utf8_lossy(&out).into_owned();
        text.push('\n');
        Ok(text)
    }
}
