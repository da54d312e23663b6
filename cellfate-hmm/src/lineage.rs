//! Lineage track extraction
//!
//! Materializes an [`EventTrack`] from a detected event: the event's onset
//! window followed by the chain of single descendants found through a
//! [`LineageLookup`]. The walk itself is a lazy iterator; extraction collects
//! it and either yields the whole track or an error, never a partial track.

use crate::types::{EventTrack, HmmError, ObjectId, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Parent → child links of the tracking store
pub trait LineageLookup {
    /// Next-in-time descendants of an object, in store order.
    ///
    /// An empty list ends the lineage; more than one is a division or a
    /// tracking merge error upstream.
    fn descendants(&self, id: ObjectId) -> Result<Vec<ObjectId>>;
}

impl<L: LineageLookup + ?Sized> LineageLookup for &L {
    fn descendants(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        (**self).descendants(id)
    }
}

impl LineageLookup for HashMap<ObjectId, Vec<ObjectId>> {
    fn descendants(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        Ok(self.get(&id).cloned().unwrap_or_default())
    }
}

impl LineageLookup for BTreeMap<ObjectId, Vec<ObjectId>> {
    fn descendants(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        Ok(self.get(&id).cloned().unwrap_or_default())
    }
}

/// Rule for continuing through a branching lineage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchSelection {
    /// Fail with [`HmmError::AmbiguousLineage`]
    #[default]
    Reject,
    /// Follow whichever descendant the store lists first
    First,
    /// Follow the descendant with the smallest object id
    LowestId,
}

impl BranchSelection {
    fn select(self, object: ObjectId, descendants: Vec<ObjectId>) -> Result<Option<ObjectId>> {
        match descendants.len() {
            0 => Ok(None),
            1 => Ok(descendants.first().copied()),
            _ => match self {
                BranchSelection::Reject => Err(HmmError::AmbiguousLineage {
                    object,
                    descendants,
                }),
                BranchSelection::First => Ok(descendants.first().copied()),
                BranchSelection::LowestId => Ok(descendants.iter().min().copied()),
            },
        }
    }
}

/// Extracts event tracks up to a frame cutoff
#[derive(Debug, Clone, Copy)]
pub struct TrackExtractor {
    max_frames: usize,
    branch_selection: BranchSelection,
}

impl TrackExtractor {
    /// Create an extractor whose tracks hold at most `max_frames` ids
    pub fn new(max_frames: usize) -> Self {
        Self {
            max_frames,
            branch_selection: BranchSelection::default(),
        }
    }

    /// Builder method: set the branch selection rule
    pub fn with_branch_selection(mut self, selection: BranchSelection) -> Self {
        self.branch_selection = selection;
        self
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Start a lazy walk over the event's onset window and its lineage.
    ///
    /// The onset window is `event_ids[..=event_index]`; links are followed
    /// from `event_ids[event_index]`.
    pub fn walk<'a, L: LineageLookup + ?Sized>(
        &self,
        event_ids: &'a [ObjectId],
        event_index: usize,
        lookup: &'a L,
    ) -> Result<LineageWalk<'a, L>> {
        if event_index >= event_ids.len() {
            return Err(HmmError::InvalidEvent {
                index: event_index,
                len: event_ids.len(),
            });
        }
        Ok(LineageWalk {
            onset: &event_ids[..=event_index],
            lookup,
            selection: self.branch_selection,
            max_frames: self.max_frames,
            emitted: 0,
            current: None,
            done: false,
        })
    }

    /// Collect the full track for one event
    pub fn extract<L: LineageLookup + ?Sized>(
        &self,
        event_ids: &[ObjectId],
        event_index: usize,
        lookup: &L,
    ) -> Result<EventTrack> {
        let ids = self
            .walk(event_ids, event_index, lookup)?
            .collect::<Result<Vec<_>>>()?;
        let onset_len = (event_index + 1).min(ids.len());
        log::debug!(
            "Extracted track of {} frames ({} onset) from event ending at object {}",
            ids.len(),
            onset_len,
            event_ids[event_index]
        );
        Ok(EventTrack::new(ids, onset_len))
    }
}

/// Lazy iterator over the object ids of one lineage path
///
/// Cloning a walk restarts it from the clone's position; it ends after the
/// first error, when no descendant exists or when the cutoff is reached.
pub struct LineageWalk<'a, L: ?Sized> {
    onset: &'a [ObjectId],
    lookup: &'a L,
    selection: BranchSelection,
    max_frames: usize,
    emitted: usize,
    current: Option<ObjectId>,
    done: bool,
}

impl<'a, L: ?Sized> Clone for LineageWalk<'a, L> {
    fn clone(&self) -> Self {
        Self {
            onset: self.onset,
            lookup: self.lookup,
            selection: self.selection,
            max_frames: self.max_frames,
            emitted: self.emitted,
            current: self.current,
            done: self.done,
        }
    }
}

impl<'a, L: LineageLookup + ?Sized> LineageWalk<'a, L> {
    fn emit(&mut self, id: ObjectId) -> Option<Result<ObjectId>> {
        self.emitted += 1;
        self.current = Some(id);
        Some(Ok(id))
    }
}

impl<'a, L: LineageLookup + ?Sized> Iterator for LineageWalk<'a, L> {
    type Item = Result<ObjectId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.emitted >= self.max_frames {
            return None;
        }

        if let Some(&id) = self.onset.get(self.emitted) {
            return self.emit(id);
        }

        let current = self.current?;
        let next = self
            .lookup
            .descendants(current)
            .and_then(|descendants| self.selection.select(current, descendants));

        match next {
            Ok(Some(id)) => self.emit(id),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
