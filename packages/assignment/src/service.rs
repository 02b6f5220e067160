//! The assignment service and partition groups.

use olx_core::{CourseKey, UserId};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::{event, EventSink, PartitionAssigned, RecordingEventSink, PARTITION_ASSIGNED};
use crate::partition::{Group, UserPartition};
use crate::store::{AssignmentKey, AssignmentStore, InMemoryAssignmentStore, StoredAssignment};

/// Course tag holding a learner's group in a partition.
pub fn partition_tag_key(partition_id: i64) -> String {
    format!("xblock.partition_service.partition_{}", partition_id)
}

/// Picks and remembers which variants a learner sees.
///
/// Reads and writes go straight to the store. There is no lock around the
/// read-then-write of a first assignment, so two concurrent first visits by
/// one learner may each store a different group; the last write wins.
pub struct VariantAssignmentService<S = InMemoryAssignmentStore, E = RecordingEventSink> {
    pub(crate) store: S,
    pub(crate) events: E,
}

impl Default for VariantAssignmentService {
    fn default() -> Self {
        VariantAssignmentService::new(InMemoryAssignmentStore::new(), RecordingEventSink::new())
    }
}

impl<S: AssignmentStore, E: EventSink> VariantAssignmentService<S, E> {
    pub fn new(store: S, events: E) -> Self {
        VariantAssignmentService { store, events }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    pub fn into_parts(self) -> (S, E) {
        (self.store, self.events)
    }

    /// The learner's group in `partition`.
    ///
    /// A stored group that no longer exists in the partition is treated as
    /// absent. With `assign`, an absent group is replaced by one picked
    /// uniformly from `rng`, stored, and announced with an event. An empty
    /// partition never yields a group.
    pub fn get_group<R: Rng + ?Sized>(
        &mut self,
        course: &CourseKey,
        user: &UserId,
        partition: &UserPartition,
        assign: bool,
        rng: &mut R,
    ) -> Result<Option<Group>> {
        let key = AssignmentKey::course_tag(course, user, partition_tag_key(partition.id));

        let current = match self.store.get(&key)? {
            Some(StoredAssignment::Tag(tag)) => match tag.trim().parse::<i64>() {
                Ok(group_id) => {
                    let group = partition.get_group(group_id).cloned();
                    if group.is_none() {
                        warn!(
                            partition = partition.id,
                            group_id, "stored group is not in the partition, reassigning"
                        );
                    }
                    group
                }
                Err(_) => {
                    warn!(partition = partition.id, tag = %tag, "stored group is not a number, reassigning");
                    None
                }
            },
            Some(other) => {
                warn!(partition = partition.id, stored = ?other, "unexpected value for a partition tag, reassigning");
                None
            }
            None => None,
        };

        if current.is_some() || !assign {
            return Ok(current);
        }

        let Some(group) = partition.groups.choose(rng).cloned() else {
            warn!(partition = partition.id, "cannot assign a learner to an empty partition");
            return Ok(None);
        };

        self.store
            .upsert(key, StoredAssignment::Tag(group.id.to_string()))?;
        debug!(partition = partition.id, group = group.id, user = %user.as_str(), "assigned learner to group");
        self.events.emit(event(
            PARTITION_ASSIGNED,
            &PartitionAssigned {
                partition_id: partition.id,
                partition_name: partition.name.clone(),
                group_id: group.id,
                group_name: group.name.clone(),
            },
        ));
        Ok(Some(group))
    }
}
