//! Request-scoped runtime for OLX courses.
//!
//! A [`Runtime`] holds one imported course and one learner. It answers the
//! two questions a renderer asks:
//! - the effective value of a field, with its provenance
//! - which children of a block the learner sees
//!
//! Configuration comes from a JSON [`RuntimeConfig`].
//!
//! # Example
//!
//! ```rust
//! use olx_codec::InMemoryFs;
//! use olx_core::{usage_key, CourseKey, UserId};
//! use olx_runtime::{Runtime, RuntimeConfig};
//!
//! let fs = InMemoryFs::with_files([
//!     ("course.xml", r#"<course url_name="2024" org="edX" course="Demo"/>"#),
//!     ("course/2024.xml", r#"<course><vertical url_name="v"><html url_name="h">Hi</html></vertical></course>"#),
//! ]);
//! let key = CourseKey::new("edX", "Demo", "2024").unwrap();
//! let mut runtime = Runtime::load(RuntimeConfig::default(), &fs, &key, UserId::new("1")).unwrap();
//!
//! let vertical = usage_key!("block-v1:edX+Demo+2024+type@vertical+block@v");
//! assert_eq!(runtime.visible_children(&vertical).unwrap().len(), 1);
//! ```

mod config;
mod error;
mod runtime;

pub use config::{AssignmentStoreConfig, RuntimeConfig, SeedStrategy};
pub use error::{Result, RuntimeError};
pub use runtime::Runtime;
