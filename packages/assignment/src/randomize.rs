//! Randomized blocks: one child per learner, chosen once.

use olx_core::{UsageKey, UserId};
use rand::Rng;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::EventSink;
use crate::service::VariantAssignmentService;
use crate::store::{AssignmentKey, AssignmentStore, StoredAssignment};

impl<S: AssignmentStore, E: EventSink> VariantAssignmentService<S, E> {
    /// The child of a randomized block shown to `user`.
    ///
    /// A new choice is `seed % children.len()` when a seed is given, else
    /// uniform from `rng`. A stored choice that is out of range for the
    /// current children is replaced.
    pub fn randomize_child<R: Rng + ?Sized>(
        &mut self,
        location: &UsageKey,
        children: &[UsageKey],
        user: &UserId,
        seed: Option<u64>,
        rng: &mut R,
    ) -> Result<Option<UsageKey>> {
        if children.is_empty() {
            debug!(location = %location, "randomized block has no children");
            return Ok(None);
        }
        let count = children.len();
        let key = AssignmentKey::usage(location, user, "choice");

        match self.store.get(&key)? {
            Some(StoredAssignment::Choice(index)) if (0..count as i64).contains(&index) => {
                return Ok(children.get(index as usize).cloned());
            }
            Some(stale) => {
                warn!(location = %location, stored = ?stale, children = count, "stored choice is stale, choosing again");
            }
            None => {}
        }

        let index = match seed {
            Some(seed) => (seed % count as u64) as usize,
            None => rng.gen_range(0..count),
        };
        self.store
            .upsert(key, StoredAssignment::Choice(index as i64))?;
        Ok(children.get(index).cloned())
    }
}
