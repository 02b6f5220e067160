//! Effective field values across the usage tree.

use std::collections::BTreeMap;

use olx_core::{Result, UsageKey, Value};
use tracing::trace;

use crate::backend::FieldBackend;
use crate::store::FieldStore;
use crate::tree::UsageTree;

/// Where an effective value came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// Set on the usage itself.
    Explicit,
    /// Set on the nearest ancestor that sets the field.
    Inherited(UsageKey),
    /// Nobody sets it: the usage's local default or the schema default.
    Default,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EffectiveValue {
    pub value: Value,
    pub provenance: Provenance,
}

/// Computes effective values from a store and a tree.
///
/// Resolution only reads; the same inputs always give the same answer.
pub struct InheritanceResolver<'a, B> {
    store: &'a FieldStore<B>,
    tree: &'a UsageTree,
}

impl<'a, B: FieldBackend> InheritanceResolver<'a, B> {
    pub fn new(store: &'a FieldStore<B>, tree: &'a UsageTree) -> Self {
        InheritanceResolver { store, tree }
    }

    /// The effective value of `field` on `usage`.
    ///
    /// A usage missing from the tree resolves as a root.
    pub fn resolve(&self, usage: &UsageKey, field: &str) -> Result<EffectiveValue> {
        let decl = self.store.declaration(usage, field)?;
        let own = self.store.get(usage, field)?;

        if own.explicitly_set {
            return Ok(EffectiveValue {
                value: own.value,
                provenance: Provenance::Explicit,
            });
        }

        let default = EffectiveValue {
            value: own.value,
            provenance: Provenance::Default,
        };
        if !decl.inheritable {
            return Ok(default);
        }

        if let Some(local) = self.store.local_default(usage, field) {
            if *local != decl.default || self.parent_bypasses_inheritance(usage) {
                trace!(%usage, field, "local default takes precedence over inheritance");
                return Ok(default);
            }
        }

        let Some(node) = self.tree.get(usage) else {
            return Ok(default);
        };
        for ancestor in self.tree.ancestors(node) {
            let Some(ancestor_usage) = self.tree.usage(ancestor) else {
                continue;
            };
            if let Some(value) = self.store.explicit_value(ancestor_usage, field)? {
                return Ok(EffectiveValue {
                    value,
                    provenance: Provenance::Inherited(ancestor_usage.clone()),
                });
            }
        }

        Ok(default)
    }

    fn parent_bypasses_inheritance(&self, usage: &UsageKey) -> bool {
        self.tree
            .parent_usage(usage)
            .and_then(|parent| self.store.registry().get(&parent.block_type))
            .is_some_and(|schema| schema.bypasses_inheritance)
    }

    /// Effective values of every Settings field declared for the usage.
    pub fn resolve_all(&self, usage: &UsageKey) -> Result<BTreeMap<String, EffectiveValue>> {
        let schema = self.store.registry().schema(&usage.block_type)?;
        schema
            .fields_in_scope(olx_core::Scope::Settings)
            .map(|decl| Ok((decl.name.clone(), self.resolve(usage, &decl.name)?)))
            .collect()
    }

    /// The inheritable settings the usage takes from its ancestors.
    pub fn inherited_settings(&self, usage: &UsageKey) -> Result<BTreeMap<String, Value>> {
        let schema = self.store.registry().schema(&usage.block_type)?;
        let mut inherited = BTreeMap::new();
        for decl in schema.inheritable_fields() {
            let effective = self.resolve(usage, &decl.name)?;
            if let Provenance::Inherited(_) = effective.provenance {
                inherited.insert(decl.name.clone(), effective.value);
            }
        }
        Ok(inherited)
    }
}
