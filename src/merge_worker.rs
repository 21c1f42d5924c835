use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::counter::{MergePlan, SegmentCounter};
use crate::error::Error;
use crate::merge::SegmentMerger;
use crate::segment::{list_segments, SegmentAddress, SegmentId};

pub const THREAD_NAME: &str = "sediment-merge";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeSignal {
    SegmentFlushed,
    Shutdown,
}

/// Repeatedly merges the two oldest mergeable segments of an index root.
pub struct MergeWorker {
    root: PathBuf,
    segments: Arc<SegmentCounter>,
    idle_timeout: Duration,
}

impl MergeWorker {
    pub fn new(root: PathBuf, segments: Arc<SegmentCounter>, idle_timeout: Duration) -> MergeWorker {
        MergeWorker {
            root,
            segments,
            idle_timeout,
        }
    }

    /// Runs one merge if a pair is available. Only visible segments are
    /// candidates.
    pub fn merge_next(&self) -> Result<Option<MergePlan>, Error> {
        let on_disk: Vec<SegmentId> = list_segments(&self.root)?
            .iter()
            .filter(|address| address.is_visible())
            .map(|address| address.id)
            .collect();
        let plan = match self.segments.claim_merge(&on_disk) {
            Some(plan) => plan,
            None => return Ok(None),
        };
        debug!(
            "Claimed segments {} and {} for merge into {}",
            plan.segment_a, plan.segment_b, plan.target
        );

        let segment_a = SegmentAddress::new(&self.root, plan.segment_a).path();
        let segment_b = SegmentAddress::new(&self.root, plan.segment_b).path();
        let target = SegmentAddress::new(&self.root, plan.target).path();
        SegmentMerger::new(&segment_a, &segment_b, &target).merge()?;
        self.segments.complete_segment(plan.target);

        info!(
            "Merged segments {} and {} into segment {}",
            plan.segment_a, plan.segment_b, plan.target
        );
        Ok(Some(plan))
    }

    /// Merges until no mergeable pair is left. Returns the number of merges.
    pub fn merge_pending(&self) -> Result<usize, Error> {
        let mut merges = 0;
        while self.merge_next()?.is_some() {
            merges += 1;
        }
        Ok(merges)
    }

    /// Worker loop: drain all merges, then sleep until a flush is signalled
    /// or the idle timeout passes. Returns on `Shutdown` or when every
    /// sender is gone. A merge in progress always finishes first.
    pub fn run(self, signals: Receiver<MergeSignal>) {
        while self.drain(&signals) {
            match signals.recv_timeout(self.idle_timeout) {
                Ok(MergeSignal::SegmentFlushed) => debug!("Merge worker woken by flush"),
                Err(RecvTimeoutError::Timeout) => {}
                Ok(MergeSignal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("Merge worker for {:?} stopped", self.root);
    }

    pub fn spawn(self, signals: Receiver<MergeSignal>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || self.run(signals))
    }

    /// False once shutdown has been requested.
    fn drain(&self, signals: &Receiver<MergeSignal>) -> bool {
        loop {
            match signals.try_recv() {
                Ok(MergeSignal::Shutdown) | Err(TryRecvError::Disconnected) => return false,
                Ok(MergeSignal::SegmentFlushed) | Err(TryRecvError::Empty) => {}
            }
            match self.merge_next() {
                Ok(Some(_)) => {}
                Ok(None) => return true,
                Err(e) => {
                    error!("Background merge in {:?} failed: {}", self.root, e);
                    return true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::{MergeSignal, MergeWorker};
    use crate::counter::SegmentCounter;
    use crate::document::Document;
    use crate::document_storage::DocumentStorage;
    use crate::segment::SegmentAddress;
    use crate::term_dictionary::TermDictionary;
    use crossbeam_channel::unbounded;
    use std::path::Path;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn write_segment(root: &Path, id: u64, document_id: u64, term: &str) {
        let address = SegmentAddress::new(root, id);
        DocumentStorage::open(&address.path())
            .unwrap()
            .add_document(&Document::new(term, term), document_id)
            .unwrap();
        let dictionary = TermDictionary::open(&address.path()).unwrap();
        dictionary.add_terms(&[term, "shared"], document_id).unwrap();
        dictionary.persist().unwrap();
    }

    fn worker(root: &Path, last: u64) -> MergeWorker {
        MergeWorker::new(
            root.to_path_buf(),
            Arc::new(SegmentCounter::resume_after(Some(last))),
            Duration::from_millis(10),
        )
    }

    #[test]
    fn merges_oldest_pair_below_active_segment() {
        let root = TempDir::new().unwrap();
        write_segment(root.path(), 0, 0, "zero");
        write_segment(root.path(), 1, 1, "one");
        write_segment(root.path(), 2, 2, "two");
        let worker = worker(root.path(), 2);

        let plan = worker.merge_next().unwrap().unwrap();
        assert_eq!((plan.segment_a, plan.segment_b, plan.target), (0, 1, 3));
        let merged = SegmentAddress::new(root.path(), 3);
        assert!(merged.is_visible());
        let dictionary = TermDictionary::open(&merged.path()).unwrap();
        assert_eq!(dictionary.get_posting_list("shared").unwrap(), Some(vec![0, 1]));
        assert_eq!(dictionary.get_posting_list("two").unwrap(), None);

        // Segment 3 is now the active one, leaving only segment 2.
        assert!(worker.merge_next().unwrap().is_none());
        assert_eq!(worker.merge_pending().unwrap(), 0);
    }

    #[test]
    fn segments_without_term_dictionary_are_skipped() {
        let root = TempDir::new().unwrap();
        write_segment(root.path(), 0, 0, "zero");
        DocumentStorage::open(&SegmentAddress::new(root.path(), 1).path())
            .unwrap()
            .add_document(&Document::new("half", "written"), 1)
            .unwrap();
        write_segment(root.path(), 2, 2, "two");
        let worker = worker(root.path(), 3);

        let plan = worker.merge_next().unwrap().unwrap();
        assert_eq!((plan.segment_a, plan.segment_b, plan.target), (0, 2, 4));
    }

    #[test]
    fn merge_pending_counts_merges() {
        let root = TempDir::new().unwrap();
        for id in 0..5 {
            write_segment(root.path(), id, id, "term");
        }
        let worker = worker(root.path(), 5);
        // (0,1)->6, (2,3)->7, (4,6)->8; 7 and 8 remain with 8 active.
        assert_eq!(worker.merge_pending().unwrap(), 3);
        let dictionary = TermDictionary::open(&SegmentAddress::new(root.path(), 8).path()).unwrap();
        assert_eq!(dictionary.get_posting_list("term").unwrap(), Some(vec![0, 1, 4]));
    }

    #[test]
    fn worker_thread_merges_until_shutdown() {
        let root = TempDir::new().unwrap();
        write_segment(root.path(), 0, 0, "zero");
        write_segment(root.path(), 1, 1, "one");
        let (sender, receiver) = unbounded();
        let handle = worker(root.path(), 2).spawn(receiver).unwrap();
        assert_eq!(handle.thread().name(), Some("sediment-merge"));

        sender.send(MergeSignal::SegmentFlushed).unwrap();
        let merged = SegmentAddress::new(root.path(), 3);
        let deadline = Instant::now() + Duration::from_secs(10);
        while !merged.is_visible() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(merged.is_visible());

        sender.send(MergeSignal::Shutdown).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn worker_stops_when_senders_are_gone() {
        let root = TempDir::new().unwrap();
        let (sender, receiver) = unbounded::<MergeSignal>();
        let handle = worker(root.path(), 0).spawn(receiver).unwrap();
        drop(sender);
        handle.join().unwrap();
    }
}
