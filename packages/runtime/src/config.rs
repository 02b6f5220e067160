//! Runtime configuration, read from a JSON file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use olx_assignment::{AssignmentStore, InMemoryAssignmentStore, JsonFileAssignmentStore};
use olx_codec::OlxCodec;
use olx_core::{SchemaRegistry, UserId, Value};
use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, RuntimeError};

/// How a learner's seed for randomized blocks is derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SeedStrategy {
    /// The numeric user id; other ids are hashed.
    UserId,
    /// The same seed for everyone.
    Fixed { value: u64 },
}

/// Where learner assignments are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AssignmentStoreConfig {
    #[default]
    Memory,
    /// A JSON file, created on first write.
    Local { path: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Default `max_count` of library content blocks.
    pub library_content_default_max_count: i64,
    /// Category → definition file extension.
    pub filename_extensions: BTreeMap<String, String>,
    pub seed: Option<SeedStrategy>,
    pub policy_dir: String,
    pub assignments: AssignmentStoreConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            library_content_default_max_count: 1,
            filename_extensions: BTreeMap::new(),
            seed: None,
            policy_dir: "policies".to_string(),
            assignments: AssignmentStoreConfig::Memory,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(text: &str) -> Result<RuntimeConfig> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a config file. A missing file gives the defaults.
    pub fn load(path: &Path) -> Result<RuntimeConfig> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(RuntimeConfig::default());
        }
        debug!("Reading {}...", path.display());
        let text = fs::read_to_string(path).map_err(|source| RuntimeError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        RuntimeConfig::from_json_str(&text)
    }

    /// The built-in categories with this config's overrides applied.
    pub fn registry(&self) -> SchemaRegistry {
        let mut registry = SchemaRegistry::with_builtin_categories();
        self.apply_to(&mut registry);
        registry
    }

    /// A codec over [`RuntimeConfig::registry`] reading policies from
    /// `policy_dir`.
    pub fn codec(&self) -> OlxCodec {
        OlxCodec::new(Arc::new(self.registry())).with_policy_dir(self.policy_dir.as_str())
    }

    pub fn apply_to(&self, registry: &mut SchemaRegistry) {
        for (category, extension) in &self.filename_extensions {
            match registry.get_mut(category) {
                Some(schema) => schema.filename_extension = extension.clone(),
                None => warn!(category = %category, "filename extension set for an unknown category"),
            }
        }
        if let Some(decl) = registry
            .get_mut("library_content")
            .and_then(|schema| schema.fields.get_mut("max_count"))
        {
            decl.default = Value::from(self.library_content_default_max_count);
        }
    }

    /// The seed for `user`'s randomized blocks, if seeding is configured.
    pub fn seed_for(&self, user: &UserId) -> Option<u64> {
        match self.seed.as_ref()? {
            SeedStrategy::Fixed { value } => Some(*value),
            SeedStrategy::UserId => Some(
                user.as_str()
                    .parse::<u64>()
                    .unwrap_or_else(|_| hashed_seed(user.as_str())),
            ),
        }
    }

    /// Open the configured assignment store.
    pub fn open_assignment_store(&self) -> Result<Box<dyn AssignmentStore>> {
        match &self.assignments {
            AssignmentStoreConfig::Memory => Ok(Box::new(InMemoryAssignmentStore::new())),
            AssignmentStoreConfig::Local { path } => {
                Ok(Box::new(JsonFileAssignmentStore::open(path)?))
            }
        }
    }
}

/// The first eight bytes of the SHA-256 of `id`, big endian.
fn hashed_seed(id: &str) -> u64 {
    let hash = Sha256::digest(id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[..8]);
    u64::from_be_bytes(bytes)
}
