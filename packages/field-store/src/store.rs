//! Schema-aware field storage for usages.

use std::collections::BTreeMap;
use std::sync::Arc;

use olx_core::{
    DefinitionId, Error, FieldDecl, Result, SchemaRegistry, Scope, UsageKey, UserId, Value,
};

use crate::backend::{FieldBackend, InMemoryFieldBackend, StorageKey};

/// Addresses one field of one usage, optionally for one learner.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FieldKey {
    pub usage: UsageKey,
    pub field: String,
    pub user: Option<UserId>,
}

impl FieldKey {
    pub fn new(usage: UsageKey, field: impl Into<String>) -> Self {
        FieldKey {
            usage,
            field: field.into(),
            user: None,
        }
    }

    #[must_use]
    pub fn for_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }
}

/// A field value together with whether it was set on this usage.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredValue {
    pub value: Value,
    pub explicitly_set: bool,
}

/// Field values of every usage in a course, checked against the schema.
///
/// Values that were never set read back as the usage's local default, if
/// one was recorded, else the schema default. Neither counts as explicitly
/// set.
pub struct FieldStore<B = InMemoryFieldBackend> {
    registry: Arc<SchemaRegistry>,
    backend: B,
    definitions: BTreeMap<UsageKey, DefinitionId>,
    local_defaults: BTreeMap<UsageKey, BTreeMap<String, Value>>,
}

impl FieldStore<InMemoryFieldBackend> {
    /// An in-memory store over the given registry.
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        FieldStore::with_backend(registry, InMemoryFieldBackend::new())
    }

    /// An in-memory store over the built-in categories.
    pub fn with_builtin() -> Self {
        FieldStore::new(Arc::new(SchemaRegistry::with_builtin_categories()))
    }
}

impl<B: FieldBackend> FieldStore<B> {
    pub fn with_backend(registry: Arc<SchemaRegistry>, backend: B) -> Self {
        FieldStore {
            registry,
            backend,
            definitions: BTreeMap::new(),
            local_defaults: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// A shared handle to the registry.
    pub fn registry_handle(&self) -> Arc<SchemaRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Record which definition a usage points at. Content fields of usages
    /// bound to the same definition are shared.
    pub fn bind_definition(&mut self, usage: UsageKey, definition: DefinitionId) {
        self.definitions.insert(usage, definition);
    }

    /// The definition a usage points at.
    pub fn definition(&self, usage: &UsageKey) -> DefinitionId {
        self.definitions
            .get(usage)
            .cloned()
            .unwrap_or_else(|| usage.default_definition())
    }

    /// The declaration of `field` for the usage's category.
    pub fn declaration(&self, usage: &UsageKey, field: &str) -> Result<&FieldDecl> {
        self.registry.field(&usage.block_type, field)
    }

    fn storage_key(
        &self,
        usage: &UsageKey,
        decl: &FieldDecl,
        user: Option<&UserId>,
    ) -> Result<StorageKey> {
        Ok(match decl.scope {
            Scope::Settings => StorageKey::Usage(usage.clone()),
            Scope::Content => StorageKey::Definition(self.definition(usage)),
            Scope::UserState => {
                let user = user.ok_or_else(|| Error::MissingUser {
                    field: decl.name.clone(),
                })?;
                StorageKey::Learner(usage.clone(), user.clone())
            }
            Scope::UserStateSummary => StorageKey::Summary(usage.clone()),
        })
    }

    fn default_for(&self, usage: &UsageKey, decl: &FieldDecl) -> Value {
        self.local_default(usage, &decl.name)
            .cloned()
            .unwrap_or_else(|| decl.default.clone())
    }

    /// Read a field that is not user-scoped.
    pub fn get(&self, usage: &UsageKey, field: &str) -> Result<StoredValue> {
        self.read(&FieldKey::new(usage.clone(), field))
    }

    /// Read a field on behalf of a learner.
    pub fn get_for_user(&self, usage: &UsageKey, field: &str, user: &UserId) -> Result<StoredValue> {
        self.read(&FieldKey::new(usage.clone(), field).for_user(user.clone()))
    }

    pub fn read(&self, key: &FieldKey) -> Result<StoredValue> {
        let decl = self.declaration(&key.usage, &key.field)?;
        let storage = self.storage_key(&key.usage, decl, key.user.as_ref())?;
        Ok(match self.backend.read(&storage, &key.field)? {
            Some(value) => StoredValue {
                value,
                explicitly_set: true,
            },
            None => StoredValue {
                value: self.default_for(&key.usage, decl),
                explicitly_set: false,
            },
        })
    }

    /// Set a field, validating the value against the declared type.
    pub fn set(&mut self, usage: &UsageKey, field: &str, value: Value) -> Result<()> {
        self.write(&FieldKey::new(usage.clone(), field), value)
    }

    pub fn set_for_user(
        &mut self,
        usage: &UsageKey,
        field: &str,
        user: &UserId,
        value: Value,
    ) -> Result<()> {
        self.write(&FieldKey::new(usage.clone(), field).for_user(user.clone()), value)
    }

    pub fn write(&mut self, key: &FieldKey, value: Value) -> Result<()> {
        let decl = self.declaration(&key.usage, &key.field)?;
        if !decl.field_type.validate(&value) {
            return Err(Error::FieldType {
                field: key.field.clone(),
                expected: decl.field_type,
                found: value.type_name(),
            });
        }
        let storage = self.storage_key(&key.usage, decl, key.user.as_ref())?;
        self.backend.write(&storage, &key.field, value)
    }

    /// Store a value read from an export without type validation.
    ///
    /// Exports routinely carry values that fail their field's coercion; those
    /// are kept as raw strings so they survive a round trip.
    pub fn load(&mut self, usage: &UsageKey, field: &str, value: Value) -> Result<()> {
        let decl = self.declaration(usage, field)?;
        let storage = self.storage_key(usage, decl, None)?;
        self.backend.write(&storage, field, value)
    }

    /// Remove the explicit value, reverting to inherited or default.
    pub fn delete(&mut self, usage: &UsageKey, field: &str) -> Result<()> {
        self.delete_key(&FieldKey::new(usage.clone(), field))
    }

    pub fn delete_for_user(&mut self, usage: &UsageKey, field: &str, user: &UserId) -> Result<()> {
        self.delete_key(&FieldKey::new(usage.clone(), field).for_user(user.clone()))
    }

    fn delete_key(&mut self, key: &FieldKey) -> Result<()> {
        let decl = self.declaration(&key.usage, &key.field)?;
        let storage = self.storage_key(&key.usage, decl, key.user.as_ref())?;
        self.backend.remove(&storage, &key.field)?;
        Ok(())
    }

    /// True if the field is explicitly set on the usage.
    pub fn has(&self, usage: &UsageKey, field: &str) -> Result<bool> {
        Ok(self.get(usage, field)?.explicitly_set)
    }

    /// The explicit value of a field, or `None` if it is unset or the
    /// usage's category does not declare it.
    pub fn explicit_value(&self, usage: &UsageKey, field: &str) -> Result<Option<Value>> {
        let Some(decl) = self
            .registry
            .get(&usage.block_type)
            .and_then(|schema| schema.field(field))
        else {
            return Ok(None);
        };
        if decl.scope.is_user_scoped() {
            return Ok(None);
        }
        let storage = self.storage_key(usage, decl, None)?;
        self.backend.read(&storage, field)
    }

    /// Explicitly set Settings fields of a usage, by name.
    pub fn explicit_fields(&self, usage: &UsageKey) -> Result<BTreeMap<String, Value>> {
        self.explicit_fields_in_scope(usage, Scope::Settings)
    }

    pub fn explicit_fields_in_scope(
        &self,
        usage: &UsageKey,
        scope: Scope,
    ) -> Result<BTreeMap<String, Value>> {
        if scope.is_user_scoped() {
            return Ok(BTreeMap::new());
        }
        let schema = self.registry.schema(&usage.block_type)?;
        let mut fields = BTreeMap::new();
        for decl in schema.fields_in_scope(scope) {
            let storage = self.storage_key(usage, decl, None)?;
            if let Some(value) = self.backend.read(&storage, &decl.name)? {
                fields.insert(decl.name.clone(), value);
            }
        }
        Ok(fields)
    }

    /// Give a usage its own default for a field.
    pub fn set_local_default(&mut self, usage: &UsageKey, field: &str, value: Value) -> Result<()> {
        self.declaration(usage, field)?;
        self.local_defaults
            .entry(usage.clone())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    pub fn local_default(&self, usage: &UsageKey, field: &str) -> Option<&Value> {
        self.local_defaults.get(usage).and_then(|d| d.get(field))
    }
}
