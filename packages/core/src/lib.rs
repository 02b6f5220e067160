//! Core OLX: the typed vocabulary shared by every layer.
//!
//! This layer gives meaning to the block tree:
//! - `Value`: Dynamically typed field value (the payload of every field)
//! - `CourseKey` / `UsageKey` / `DefinitionId`: Validated identifiers
//! - `Scope` / `FieldType` / `FieldDecl`: Field declarations
//! - `BlockSchema` / `SchemaRegistry`: Per-category field tables
//!
//! Use this layer for:
//! - Declaring which fields a block category understands
//! - Addressing usages and definitions
//! - Checking values against declared field types
//!
//! # Example
//!
//! ```rust
//! use olx_core::{SchemaRegistry, Scope, usage_key};
//!
//! let registry = SchemaRegistry::builtin();
//! let usage = usage_key!("block-v1:edX+Demo+2024+type@problem+block@q1");
//!
//! let decl = registry.field(&usage.block_type, "max_attempts").unwrap();
//! assert_eq!(decl.scope, Scope::Settings);
//! assert!(decl.inheritable);
//! ```

mod convert;
mod error;
mod key;
pub mod schema;
mod value;

pub use convert::{format_date, json_to_value, parse_date, value_to_json};
pub use error::{Error, Result};
pub use key::{CourseKey, DefinitionId, KeyError, UsageKey, UserId};
pub use schema::{
    BackcompatRule, BlockSchema, DefinitionLayout, FieldDecl, FieldType, SchemaRegistry, Scope,
};
pub use value::Value;
