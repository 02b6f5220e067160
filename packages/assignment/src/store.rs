//! Persistence of learner assignments.
//!
//! Every assignment lives under an [`AssignmentKey`]: a scope (the course for
//! partition groups, the usage for per-block choices), the learner, and a
//! key inside that scope. Each write is a single `upsert`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use olx_core::{CourseKey, UsageKey, UserId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Where an assignment is stored.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct AssignmentKey {
    pub scope: String,
    pub user: UserId,
    pub key: String,
}

impl AssignmentKey {
    /// A course tag, shared by every block of the course.
    pub fn course_tag(course: &CourseKey, user: &UserId, key: impl Into<String>) -> Self {
        AssignmentKey {
            scope: course.to_string(),
            user: user.clone(),
            key: key.into(),
        }
    }

    /// State private to one usage.
    pub fn usage(usage: &UsageKey, user: &UserId, key: impl Into<String>) -> Self {
        AssignmentKey {
            scope: usage.to_string(),
            user: user.clone(),
            key: key.into(),
        }
    }
}

/// `(block_type, block_id)` of a selected child, stored as a two-element list.
pub type BlockKey = (String, String);

pub fn block_key(usage: &UsageKey) -> BlockKey {
    (usage.block_type.clone(), usage.block_id.clone())
}

/// A stored assignment value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StoredAssignment {
    /// Course tags are strings; group ids are written in decimal.
    Tag(String),
    /// Index of the chosen child.
    Choice(i64),
    Selection(Vec<BlockKey>),
}

pub trait AssignmentStore: Send + Sync {
    fn get(&self, key: &AssignmentKey) -> Result<Option<StoredAssignment>>;

    /// Insert or replace one assignment.
    fn upsert(&mut self, key: AssignmentKey, value: StoredAssignment) -> Result<()>;
}

impl<T: AssignmentStore + ?Sized> AssignmentStore for &mut T {
    fn get(&self, key: &AssignmentKey) -> Result<Option<StoredAssignment>> {
        (**self).get(key)
    }

    fn upsert(&mut self, key: AssignmentKey, value: StoredAssignment) -> Result<()> {
        (**self).upsert(key, value)
    }
}

impl<T: AssignmentStore + ?Sized> AssignmentStore for Box<T> {
    fn get(&self, key: &AssignmentKey) -> Result<Option<StoredAssignment>> {
        self.as_ref().get(key)
    }

    fn upsert(&mut self, key: AssignmentKey, value: StoredAssignment) -> Result<()> {
        self.as_mut().upsert(key, value)
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryAssignmentStore {
    entries: BTreeMap<AssignmentKey, StoredAssignment>,
}

impl InMemoryAssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AssignmentStore for InMemoryAssignmentStore {
    fn get(&self, key: &AssignmentKey) -> Result<Option<StoredAssignment>> {
        Ok(self.entries.get(key).cloned())
    }

    fn upsert(&mut self, key: AssignmentKey, value: StoredAssignment) -> Result<()> {
        self.entries.insert(key, value);
        Ok(())
    }
}

/// scope → user → key → value
type Document = BTreeMap<String, BTreeMap<String, BTreeMap<String, StoredAssignment>>>;

/// Assignments kept in one JSON file.
///
/// The whole document is rewritten on every upsert, through a temporary file
/// that is renamed over the original.
pub struct JsonFileAssignmentStore {
    path: PathBuf,
    document: Document,
}

impl JsonFileAssignmentStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<JsonFileAssignmentStore> {
        let path = path.into();
        let document = if path.exists() {
            debug!("Reading {}...", path.display());
            let text = fs::read_to_string(&path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&text)?
        } else {
            Document::new()
        };
        Ok(JsonFileAssignmentStore { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, document: &Document) -> Result<()> {
        let text = serde_json::to_string_pretty(document)?;
        let mut temporary = self.path.clone().into_os_string();
        temporary.push(".tmp");
        let temporary = PathBuf::from(temporary);

        debug!("Writing {}...", self.path.display());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&temporary, text).map_err(|source| Error::Io {
            path: temporary.clone(),
            source,
        })?;
        fs::rename(&temporary, &self.path).map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl AssignmentStore for JsonFileAssignmentStore {
    fn get(&self, key: &AssignmentKey) -> Result<Option<StoredAssignment>> {
        Ok(self
            .document
            .get(&key.scope)
            .and_then(|users| users.get(key.user.as_str()))
            .and_then(|entries| entries.get(&key.key))
            .cloned())
    }

    /// The in-memory document only changes once the file is written.
    fn upsert(&mut self, key: AssignmentKey, value: StoredAssignment) -> Result<()> {
        let mut document = self.document.clone();
        document
            .entry(key.scope)
            .or_default()
            .entry(key.user.0)
            .or_default()
            .insert(key.key, value);
        self.persist(&document)?;
        self.document = document;
        Ok(())
    }
}
