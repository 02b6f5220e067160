//! Per-learner variant assignment.
//!
//! Blocks with dynamic children show each learner a subset of them:
//! - `split_test`: the child mapped to the learner's group in a user
//!   partition (groups are course tags shared by every split test on the
//!   same partition)
//! - `randomize`: one child, chosen once per learner
//! - `library_content`: up to `max_count` children sampled without
//!   replacement, re-derived when the pool changes
//!
//! Assignments are made lazily, stored through an [`AssignmentStore`]
//! before they are returned, and reported to an [`EventSink`]. Randomness is
//! always drawn from a caller-supplied [`rand::Rng`].
//!
//! # Example
//!
//! ```rust
//! use olx_assignment::{Group, UserPartition, VariantAssignmentService};
//! use olx_core::{CourseKey, UserId};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let partition = UserPartition::new(0, "Experiment", vec![Group::new(0, "alpha"), Group::new(1, "beta")]);
//! let course = CourseKey::new("edX", "Demo", "2024").unwrap();
//! let user = UserId::new("42");
//! let mut rng = StdRng::seed_from_u64(7);
//!
//! let mut service: VariantAssignmentService = VariantAssignmentService::default();
//! let first = service.get_group(&course, &user, &partition, true, &mut rng).unwrap();
//! let again = service.get_group(&course, &user, &partition, true, &mut rng).unwrap();
//! assert_eq!(first, again);
//! assert_eq!(service.events().events().len(), 1);
//! ```

mod error;
mod events;
mod library;
mod partition;
mod randomize;
mod service;
mod store;

pub use error::{Error, Result};
pub use events::{
    BlockInfo, Event, EventSink, LibraryContentEvent, PartitionAssigned, RecordingEventSink,
    RemovalReason, TracingEventSink, LIBRARY_CONTENT_ASSIGNED, LIBRARY_CONTENT_REMOVED,
    PARTITION_ASSIGNED,
};
pub use library::{make_selection, LibraryChild, LibraryContentBlock, Selection, MODE_RANDOM};
pub use partition::{Group, UserPartition};
pub use service::{partition_tag_key, VariantAssignmentService};
pub use split_test::{SplitTestBlock, NO_PARTITION};
pub use store::{
    block_key, AssignmentKey, AssignmentStore, BlockKey, InMemoryAssignmentStore,
    JsonFileAssignmentStore, StoredAssignment,
};
