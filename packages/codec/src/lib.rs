//! OLX encoding for content blocks.
//!
//! This layer reads and writes the course XML format on top of
//! `olx-field-store`:
//! - `Element`: a small owned XML tree, parsed and written with `quick-xml`
//! - `deserialize_field` / `serialize_field`: attribute strings ↔ `Value`
//! - `ResourceFs`: where definition files live (`InMemoryFs`, `LocalDiskFs`)
//! - `Policy`: the per-course `policy.json` overrides
//! - `OlxCodec`: single-block decode/encode plus whole-course import,
//!   export and round-trip checks
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use olx_codec::{InMemoryFs, OlxCodec};
//! use olx_core::{CourseKey, SchemaRegistry, Value};
//!
//! let fs = InMemoryFs::with_files([
//!     ("course.xml", r#"<course url_name="2024" org="edX" course="Demo"/>"#),
//!     ("course/2024.xml", r#"<course display_name="Demo"><chapter url_name="w1"/></course>"#),
//!     ("chapter/w1.xml", r#"<chapter display_name="Week 1"/>"#),
//! ]);
//!
//! let codec = OlxCodec::new(Arc::new(SchemaRegistry::with_builtin_categories()));
//! let key = CourseKey::new("edX", "Demo", "2024").unwrap();
//! let course = codec.import_course(&fs, &key).unwrap();
//!
//! assert_eq!(course.tree.len(), 2);
//! assert_eq!(
//!     course.store.get(&course.root, "display_name").unwrap().value,
//!     Value::from("Demo")
//! );
//! assert!(codec.check_round_trip(&fs, &key).unwrap().is_empty());
//! ```

mod codec;
mod course;
mod element;
mod error;
mod policy;
mod resources;
mod serialize;

pub use codec::{is_pointer, DecodeContext, DecodedBlock, DefinitionMetadata, OlxCodec, OlxExport};
pub use course::{compare_courses, Divergence, ImportedCourse, COURSE_FILE};
pub use element::{Element, XmlNode};
pub use error::{Error, Result};
pub use policy::{is_stripped, translate_key, Policy, METADATA_TO_STRIP};
pub use resources::{
    candidate_paths, definition_path, find_first, InMemoryFs, LocalDiskFs, ResourceFs,
};
pub use serialize::{deserialize_field, serialize_field, to_legacy_json};
