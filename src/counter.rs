use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::ops::Range;

use crate::document::DocId;
use crate::segment::SegmentId;

/// Hands out document ids. Ids are never reused.
pub struct DocumentIdCounter {
    next: Mutex<DocId>,
}

impl DocumentIdCounter {
    pub fn new() -> DocumentIdCounter {
        DocumentIdCounter::starting_at(0)
    }

    pub fn starting_at(next: DocId) -> DocumentIdCounter {
        DocumentIdCounter {
            next: Mutex::new(next),
        }
    }

    #[cfg(test)]
    fn next_id(&self) -> DocId {
        let mut next = self.next.lock();
        let id = *next;
        *next += 1;
        id
    }

    /// Reserves `count` consecutive ids.
    pub fn allocate(&self, count: u64) -> Range<DocId> {
        let mut next = self.next.lock();
        let start = *next;
        *next += count;
        start..*next
    }
}

impl Default for DocumentIdCounter {
    fn default() -> DocumentIdCounter {
        DocumentIdCounter::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePlan {
    pub segment_a: SegmentId,
    pub segment_b: SegmentId,
    pub target: SegmentId,
}

#[derive(Default)]
struct SegmentState {
    last: Option<SegmentId>,
    writing: BTreeSet<SegmentId>,
    merged: BTreeSet<SegmentId>,
}

impl SegmentState {
    fn issue(&mut self) -> SegmentId {
        let id = self.last.map_or(0, |last| last + 1);
        self.last = Some(id);
        self.writing.insert(id);
        id
    }

    fn is_mergeable(&self, id: SegmentId) -> bool {
        match self.last {
            Some(active) => {
                id < active && !self.writing.contains(&id) && !self.merged.contains(&id)
            }
            None => false,
        }
    }

    fn mergeable(&self, on_disk: &[SegmentId]) -> Vec<SegmentId> {
        let mut mergeable: Vec<SegmentId> = on_disk
            .iter()
            .cloned()
            .filter(|id| self.is_mergeable(*id))
            .collect();
        mergeable.sort_unstable();
        mergeable.dedup();
        mergeable
    }
}

/// Allocates segment ids and tracks which segments may be merged.
///
/// The highest id handed out is the active segment. Only segments below it
/// that are neither still being written nor already consumed by a merge are
/// mergeable.
#[derive(Default)]
pub struct SegmentCounter {
    state: Mutex<SegmentState>,
}

impl SegmentCounter {
    pub fn new() -> SegmentCounter {
        SegmentCounter::default()
    }

    /// A counter whose next segment comes after `last`, for reopening an
    /// index that already has segments on disk.
    ///
    /// Which segments were merge inputs is not persisted. Inputs that survive
    /// on disk become mergeable again, so each reopen merges part of the
    /// history a second time and uses more disk. Merges and queries collapse
    /// duplicated document ids, so results are unaffected.
    pub fn resume_after(last: Option<SegmentId>) -> SegmentCounter {
        SegmentCounter {
            state: Mutex::new(SegmentState {
                last,
                ..SegmentState::default()
            }),
        }
    }

    /// Issues a new segment id and marks it as being written until
    /// `complete_segment` is called.
    pub fn next_segment(&self) -> SegmentId {
        self.state.lock().issue()
    }

    pub fn complete_segment(&self, id: SegmentId) {
        self.state.lock().writing.remove(&id);
    }

    pub fn active_segment(&self) -> Option<SegmentId> {
        self.state.lock().last
    }

    /// Filters `on_disk` down to the mergeable segments, oldest first.
    pub fn mergeable_segments(&self, on_disk: &[SegmentId]) -> Vec<SegmentId> {
        self.state.lock().mergeable(on_disk)
    }

    /// Picks the two oldest mergeable segments of `on_disk` and issues the
    /// segment they merge into. Both inputs are marked as merged so no other
    /// caller picks them again, even if the merge fails.
    pub fn claim_merge(&self, on_disk: &[SegmentId]) -> Option<MergePlan> {
        let mut state = self.state.lock();
        let mergeable = state.mergeable(on_disk);
        if mergeable.len() < 2 {
            return None;
        }
        let (segment_a, segment_b) = (mergeable[0], mergeable[1]);
        state.merged.insert(segment_a);
        state.merged.insert(segment_b);
        let target = state.issue();
        Some(MergePlan {
            segment_a,
            segment_b,
            target,
        })
    }
}
