//! Field storage and inheritance for OLX blocks.
//!
//! This layer sits on top of `olx-core`:
//! - `FieldBackend`: raw storage of field values under a `StorageKey`
//! - `FieldStore`: schema-aware get/set/delete with the explicit vs default
//!   distinction
//! - `UsageTree`: arena of usages with parent/child links
//! - `InheritanceResolver`: effective values with provenance
//!
//! # Example
//!
//! ```rust
//! use olx_core::{usage_key, Value};
//! use olx_field_store::{FieldStore, InheritanceResolver, Provenance, UsageTree};
//!
//! let chapter = usage_key!("block-v1:edX+Demo+2024+type@chapter+block@week1");
//! let problem = usage_key!("block-v1:edX+Demo+2024+type@problem+block@q1");
//!
//! let mut tree = UsageTree::new();
//! let root = tree.insert_root(chapter.clone()).unwrap();
//! tree.insert_child(root, problem.clone()).unwrap();
//!
//! let mut store = FieldStore::with_builtin();
//! store.set(&chapter, "max_attempts", Value::from(3i64)).unwrap();
//!
//! let resolver = InheritanceResolver::new(&store, &tree);
//! let effective = resolver.resolve(&problem, "max_attempts").unwrap();
//! assert_eq!(effective.value, Value::from(3i64));
//! assert_eq!(effective.provenance, Provenance::Inherited(chapter));
//! ```

mod backend;
mod resolver;
mod store;
mod tree;

pub use backend::{FieldBackend, FieldReader, FieldWriter, InMemoryFieldBackend, StorageKey};
pub use resolver::{EffectiveValue, InheritanceResolver, Provenance};
pub use store::{FieldKey, FieldStore, StoredValue};
pub use tree::{Ancestors, NodeId, UsageTree};
