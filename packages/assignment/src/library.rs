//! Library content: a bounded random sample of children per learner.

use std::collections::BTreeSet;

use olx_core::{UsageKey, UserId};
use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::{
    event, BlockInfo, EventSink, LibraryContentEvent, RemovalReason, LIBRARY_CONTENT_ASSIGNED,
    LIBRARY_CONTENT_REMOVED,
};
use crate::service::VariantAssignmentService;
use crate::store::{block_key, AssignmentKey, AssignmentStore, BlockKey, StoredAssignment};

/// Mode in which missing selections are filled with random children.
pub const MODE_RANDOM: &str = "random";

/// A child of a library content block.
#[derive(Clone, Debug, PartialEq)]
pub struct LibraryChild {
    pub usage: UsageKey,
    /// Where the child was copied from in the source library.
    pub original_usage_key: Option<String>,
    pub original_usage_version: Option<String>,
    /// Every block below the child, depth first. Their own `descendants`
    /// are left empty.
    pub descendants: Vec<LibraryChild>,
}

impl LibraryChild {
    pub fn new(usage: UsageKey) -> Self {
        LibraryChild {
            usage,
            original_usage_key: None,
            original_usage_version: None,
            descendants: Vec::new(),
        }
    }

    /// How this child is described in library content events.
    pub fn block_info(&self) -> BlockInfo {
        BlockInfo {
            usage_key: self.usage.to_string(),
            original_usage_key: self.original_usage_key.clone(),
            original_usage_version: self.original_usage_version.clone(),
            descendants: self.descendants.iter().map(LibraryChild::block_info).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LibraryContentBlock {
    pub location: UsageKey,
    /// `-1` selects every child.
    pub max_count: i64,
    pub mode: String,
    pub children: Vec<LibraryChild>,
}

/// The outcome of re-deriving a selection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    pub selected: Vec<BlockKey>,
    /// Previously selected keys that are no longer children.
    pub invalid: BTreeSet<BlockKey>,
    /// Previously selected keys dropped to respect `max_count`.
    pub overlimit: BTreeSet<BlockKey>,
    pub added: BTreeSet<BlockKey>,
}

impl Selection {
    pub fn changed(&self) -> bool {
        !(self.invalid.is_empty() && self.overlimit.is_empty() && self.added.is_empty())
    }
}

/// Bring a previous selection in line with the current children.
///
/// Keys that are no longer children are dropped, then random keys are evicted
/// until at most `max_count` remain, then (in random mode) random unselected
/// children are added up to `max_count`. A negative `max_count` means every
/// child. When anything changed the result is shuffled; otherwise the
/// previous order is kept.
pub fn make_selection<R: Rng + ?Sized>(
    previous: &[BlockKey],
    children: &[BlockKey],
    max_count: i64,
    mode: &str,
    rng: &mut R,
) -> Selection {
    let valid: BTreeSet<BlockKey> = children.iter().cloned().collect();
    let mut selected: BTreeSet<BlockKey> = previous.iter().cloned().collect();

    let invalid: BTreeSet<BlockKey> = selected.difference(&valid).cloned().collect();
    selected.retain(|key| !invalid.contains(key));

    let limit = usize::try_from(max_count).unwrap_or(valid.len());

    let mut overlimit = BTreeSet::new();
    if selected.len() > limit {
        let excess = selected.len() - limit;
        overlimit = selected.iter().cloned().choose_multiple(rng, excess).into_iter().collect();
        selected.retain(|key| !overlimit.contains(key));
    }

    let mut added = BTreeSet::new();
    if selected.len() < limit && mode == MODE_RANDOM {
        let pool: Vec<BlockKey> = valid.difference(&selected).cloned().collect();
        let wanted = (limit - selected.len()).min(pool.len());
        added = pool.into_iter().choose_multiple(rng, wanted).into_iter().collect();
        selected.extend(added.iter().cloned());
    }

    let mut selection = Selection {
        selected: Vec::new(),
        invalid,
        overlimit,
        added,
    };
    selection.selected = if selection.changed() {
        let mut shuffled: Vec<BlockKey> = selected.into_iter().collect();
        shuffled.shuffle(rng);
        shuffled
    } else {
        let mut seen = BTreeSet::new();
        previous.iter().filter(|key| seen.insert(*key)).cloned().collect()
    };
    selection
}

impl<S: AssignmentStore, E: EventSink> VariantAssignmentService<S, E> {
    /// The children of a library content block shown to `user`.
    ///
    /// The stored selection is re-derived with [`make_selection`]. A changed
    /// selection is stored before any event is emitted: `removed` for
    /// invalid keys, `removed` for over-limit keys, then `assigned` for
    /// added keys.
    pub fn library_selection<R: Rng + ?Sized>(
        &mut self,
        block: &LibraryContentBlock,
        user: &UserId,
        rng: &mut R,
    ) -> Result<Vec<UsageKey>> {
        let key = AssignmentKey::usage(&block.location, user, "selected");
        let previous = match self.store.get(&key)? {
            Some(StoredAssignment::Selection(keys)) => keys,
            Some(other) => {
                warn!(location = %block.location, stored = ?other, "unexpected stored selection, starting over");
                Vec::new()
            }
            None => Vec::new(),
        };

        let children: Vec<BlockKey> = block.children.iter().map(|child| block_key(&child.usage)).collect();
        let selection = make_selection(&previous, &children, block.max_count, &block.mode, rng);

        if selection.changed() {
            self.store
                .upsert(key, StoredAssignment::Selection(selection.selected.clone()))?;
            debug!(
                location = %block.location,
                selected = selection.selected.len(),
                invalid = selection.invalid.len(),
                overlimit = selection.overlimit.len(),
                added = selection.added.len(),
                "library selection changed"
            );
            self.publish_selection_events(block, &selection, previous.len());
        }

        Ok(selection
            .selected
            .iter()
            .filter_map(|selected| {
                block
                    .children
                    .iter()
                    .find(|child| block_key(&child.usage) == *selected)
                    .map(|child| child.usage.clone())
            })
            .collect())
    }

    fn publish_selection_events(
        &mut self,
        block: &LibraryContentBlock,
        selection: &Selection,
        previous_count: usize,
    ) {
        let result = block_infos(block, selection.selected.iter());
        let payload = |added, removed, reason| LibraryContentEvent {
            location: block.location.to_string(),
            result: result.clone(),
            previous_count,
            max_count: block.max_count,
            added,
            removed,
            reason,
        };

        if !selection.invalid.is_empty() {
            let removed = block_infos(block, selection.invalid.iter());
            self.events.emit(event(
                LIBRARY_CONTENT_REMOVED,
                &payload(None, Some(removed), Some(RemovalReason::Invalid)),
            ));
        }
        if !selection.overlimit.is_empty() {
            let removed = block_infos(block, selection.overlimit.iter());
            self.events.emit(event(
                LIBRARY_CONTENT_REMOVED,
                &payload(None, Some(removed), Some(RemovalReason::Overlimit)),
            ));
        }
        if !selection.added.is_empty() {
            let added = block_infos(block, selection.added.iter());
            self.events
                .emit(event(LIBRARY_CONTENT_ASSIGNED, &payload(Some(added), None, None)));
        }
    }
}

fn block_infos<'a>(
    block: &LibraryContentBlock,
    keys: impl Iterator<Item = &'a BlockKey>,
) -> Vec<BlockInfo> {
    keys.map(|(block_type, block_id)| {
        let child = block
            .children
            .iter()
            .find(|child| child.usage.block_type == *block_type && child.usage.block_id == *block_id);
        match child {
            Some(child) => child.block_info(),
            None => BlockInfo {
                usage_key: block
                    .location
                    .course_key
                    .make_usage_key(block_type.as_str(), block_id.as_str())
                    .map(|usage| usage.to_string())
                    .unwrap_or_else(|_| format!("{}/{}", block_type, block_id)),
                original_usage_key: None,
                original_usage_version: None,
                descendants: Vec::new(),
            },
        }
    })
    .collect()
}
