use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::document::DocId;
use crate::document_storage::{DocumentIndexEntry, DocumentStorage};
use crate::error::Error;
use crate::posting_list_storage::PostingListStorage;
use crate::segment::{DOCUMENTS, DOCUMENTS_INDEX, TERM_DICTIONARY};
use crate::term_dictionary::{TermDictionary, TermDictionaryWriter};

/// Merges two segments into a new one. The inputs are left untouched.
///
/// A document id present in both inputs ends up in the output once.
pub struct SegmentMerger<'a> {
    segment_a: &'a Path,
    segment_b: &'a Path,
    new_segment: &'a Path,
}

impl<'a> SegmentMerger<'a> {
    pub fn new(segment_a: &'a Path, segment_b: &'a Path, new_segment: &'a Path) -> Self {
        SegmentMerger {
            segment_a,
            segment_b,
            new_segment,
        }
    }

    /// The term dictionary goes last so readers never see a merged segment
    /// whose documents are still being copied.
    pub fn merge(&self) -> Result<(), Error> {
        fs::create_dir_all(self.new_segment)?;
        DocumentStorageMerger::new(self.segment_a, self.segment_b, self.new_segment).merge()?;
        TermDictionaryMerger::new(self.segment_a, self.segment_b, self.new_segment).merge()
    }
}

pub struct DocumentStorageMerger<'a> {
    segment_a: &'a Path,
    segment_b: &'a Path,
    new_segment: &'a Path,
}

impl<'a> DocumentStorageMerger<'a> {
    pub fn new(segment_a: &'a Path, segment_b: &'a Path, new_segment: &'a Path) -> Self {
        DocumentStorageMerger {
            segment_a,
            segment_b,
            new_segment,
        }
    }

    pub fn merge(&self) -> Result<(), Error> {
        fs::create_dir_all(self.new_segment)?;
        let segment_a_size = self.merge_documents()?;
        self.merge_index(segment_a_size)
    }

    /// Concatenates the document logs, A then B. Returns the size of A's log,
    /// which is how far B's documents moved.
    fn merge_documents(&self) -> Result<u64, Error> {
        let mut target = File::create(self.new_segment.join(DOCUMENTS))?;
        let segment_a_size = io::copy(&mut File::open(self.segment_a.join(DOCUMENTS))?, &mut target)?;
        io::copy(&mut File::open(self.segment_b.join(DOCUMENTS))?, &mut target)?;
        target.flush()?;
        Ok(segment_a_size)
    }

    /// Two-pointer walk over both indexes. Entries from B point into the
    /// second half of the concatenated log. An id present on both sides keeps
    /// A's entry only, so the merged index stays strictly increasing.
    fn merge_index(&self, segment_a_size: u64) -> Result<(), Error> {
        let mut index_a = DocumentStorage::open_read(self.segment_a)?.into_iterator()?;
        let mut index_b = DocumentStorage::open_read(self.segment_b)?.into_iterator()?;
        let mut target = BufWriter::new(File::create(self.new_segment.join(DOCUMENTS_INDEX))?);

        let mut current_a = index_a.next().transpose()?;
        let mut current_b = index_b.next().transpose()?;
        loop {
            let step = match (&current_a, &current_b) {
                (None, None) => break,
                (Some(_), None) => Step::A,
                (None, Some(_)) => Step::B,
                (Some(a), Some(b)) => Step::of(a.document_id.cmp(&b.document_id)),
            };
            match step {
                Step::A | Step::Both => {
                    if let Some(entry) = current_a.take() {
                        entry.write_to(&mut target)?;
                    }
                    current_a = index_a.next().transpose()?;
                    if let Step::Both = step {
                        current_b = index_b.next().transpose()?;
                    }
                }
                Step::B => {
                    if let Some(entry) = current_b.take() {
                        DocumentIndexEntry {
                            document_id: entry.document_id,
                            offset: entry.offset + segment_a_size,
                        }
                        .write_to(&mut target)?;
                    }
                    current_b = index_b.next().transpose()?;
                }
            }
        }
        target.flush()?;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Step {
    A,
    B,
    Both,
}

impl Step {
    fn of(ordering: Ordering) -> Step {
        match ordering {
            Ordering::Less => Step::A,
            Ordering::Greater => Step::B,
            Ordering::Equal => Step::Both,
        }
    }
}

pub struct TermDictionaryMerger<'a> {
    segment_a: &'a Path,
    segment_b: &'a Path,
    new_segment: &'a Path,
}

impl<'a> TermDictionaryMerger<'a> {
    pub fn new(segment_a: &'a Path, segment_b: &'a Path, new_segment: &'a Path) -> Self {
        TermDictionaryMerger {
            segment_a,
            segment_b,
            new_segment,
        }
    }

    /// Walks both sorted term files at once. Terms present on both sides get
    /// the union of their posting lists; the output comes out sorted.
    pub fn merge(&self) -> Result<(), Error> {
        let mut terms_a = TermDictionary::load(self.segment_a)?.into_iterator()?;
        let mut terms_b = TermDictionary::load(self.segment_b)?.into_iterator()?;
        let mut postings = PostingListStorage::create(self.new_segment)?;
        let mut target = TermDictionaryWriter::create(&self.new_segment.join(TERM_DICTIONARY))?;

        let mut current_a = terms_a.next().transpose()?;
        let mut current_b = terms_b.next().transpose()?;
        loop {
            let step = match (&current_a, &current_b) {
                (None, None) => break,
                (Some(_), None) => Step::A,
                (None, Some(_)) => Step::B,
                (Some((term_a, _)), Some((term_b, _))) => Step::of(term_a.cmp(term_b)),
            };
            match step {
                Step::A => {
                    if let Some((term, ids)) = current_a.take() {
                        write_term(&mut target, &mut postings, &term, &ids)?;
                    }
                    current_a = terms_a.next().transpose()?;
                }
                Step::B => {
                    if let Some((term, ids)) = current_b.take() {
                        write_term(&mut target, &mut postings, &term, &ids)?;
                    }
                    current_b = terms_b.next().transpose()?;
                }
                Step::Both => {
                    if let (Some((term, mut ids)), Some((_, ids_b))) =
                        (current_a.take(), current_b.take())
                    {
                        ids.extend(ids_b);
                        ids.sort_unstable();
                        ids.dedup();
                        write_term(&mut target, &mut postings, &term, &ids)?;
                    }
                    current_a = terms_a.next().transpose()?;
                    current_b = terms_b.next().transpose()?;
                }
            }
        }
        target.finish()
    }
}

fn write_term(
    target: &mut TermDictionaryWriter,
    postings: &mut PostingListStorage,
    term: &[u8],
    ids: &[DocId],
) -> Result<(), Error> {
    let offset = postings.add_posting_list(ids)?;
    target.write_entry(term, offset)
}
