use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::document::DocId;
use crate::error::Error;
use crate::posting_list_storage::PostingListStorage;
use crate::segment::TERM_DICTIONARY;
use crate::tokenizer::MAX_TERM_LENGTH;

struct DictionaryState {
    terms: HashMap<Vec<u8>, u64>,
    postings: PostingListStorage,
}

/// Maps terms to posting list offsets for one segment.
///
/// Kept in memory while a segment is built and persisted as a flat run of
/// `[term_length: u8][term][posting_list_offset: u64]` records, sorted by
/// term bytes.
pub struct TermDictionary {
    path: PathBuf,
    state: Mutex<DictionaryState>,
}

impl TermDictionary {
    /// Opens the dictionary of the segment at `dir`, loading the persisted
    /// term file if there is one.
    pub fn open(dir: &Path) -> Result<TermDictionary, Error> {
        let postings = PostingListStorage::open(dir)?;
        let path = dir.join(TERM_DICTIONARY);
        let terms = if path.exists() {
            read_terms(&path)?
        } else {
            HashMap::new()
        };
        Ok(TermDictionary::with_state(path, terms, postings))
    }

    /// Loads the persisted dictionary of a finished segment for reading.
    /// Fails if the segment has no term file or posting list log, and never
    /// creates either.
    pub fn load(dir: &Path) -> Result<TermDictionary, Error> {
        let path = dir.join(TERM_DICTIONARY);
        let terms = read_terms(&path)?;
        let postings = PostingListStorage::open_read(dir)?;
        Ok(TermDictionary::with_state(path, terms, postings))
    }

    fn with_state(
        path: PathBuf,
        terms: HashMap<Vec<u8>, u64>,
        postings: PostingListStorage,
    ) -> TermDictionary {
        TermDictionary {
            path,
            state: Mutex::new(DictionaryState { terms, postings }),
        }
    }

    /// Appends `document_id` to the posting list of every term, rewriting
    /// each touched posting list.
    pub fn add_terms<T: AsRef<str>>(&self, terms: &[T], document_id: DocId) -> Result<(), Error> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let dictionary = &mut state.terms;
        let postings = &mut state.postings;
        for term in terms {
            let term = check_length(term.as_ref().as_bytes())?;
            let mut ids = match dictionary.get(term) {
                Some(offset) => postings.get_posting_list(*offset)?,
                None => Vec::new(),
            };
            ids.push(document_id);
            let offset = postings.add_posting_list(&ids)?;
            dictionary.insert(term.to_vec(), offset);
        }
        Ok(())
    }

    /// Writes complete posting lists in one go. Each list must already be
    /// sorted and free of duplicates.
    pub fn add_raw_entries<I, K>(&self, entries: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, Vec<DocId>)>,
        K: Into<Vec<u8>>,
    {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let dictionary = &mut state.terms;
        let postings = &mut state.postings;
        for (term, ids) in entries {
            let term = term.into();
            check_length(&term)?;
            let offset = postings.add_posting_list(&ids)?;
            dictionary.insert(term, offset);
        }
        Ok(())
    }

    /// Rewrites the term file from the in-memory map. Sorting happens here
    /// rather than on insert.
    pub fn persist(&self) -> Result<(), Error> {
        let state = self.state.lock();
        let mut entries: Vec<(&[u8], u64)> = state
            .terms
            .iter()
            .map(|(term, offset)| (term.as_slice(), *offset))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut writer = TermDictionaryWriter::create(&self.path)?;
        for (term, offset) in entries {
            writer.write_entry(term, offset)?;
        }
        writer.finish()
    }

    pub fn get_posting_list(&self, term: &str) -> Result<Option<Vec<DocId>>, Error> {
        let mut state = self.state.lock();
        let offset = match state.terms.get(term.as_bytes()) {
            Some(offset) => *offset,
            None => return Ok(None),
        };
        Ok(Some(state.postings.get_posting_list(offset)?))
    }

    /// All terms, in the order they are persisted.
    pub fn terms(&self) -> Vec<Vec<u8>> {
        let mut terms: Vec<Vec<u8>> = self.state.lock().terms.keys().cloned().collect();
        terms.sort_unstable();
        terms
    }

    pub fn len(&self) -> usize {
        self.state.lock().terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Walks the persisted term file, resolving each term's posting list.
    /// Terms added since the last `persist` are not seen.
    pub fn into_iterator(self) -> Result<TermDictionaryIter, Error> {
        let terms = BufReader::new(File::open(&self.path)?);
        Ok(TermDictionaryIter {
            terms,
            postings: self.state.into_inner().postings,
            done: false,
        })
    }
}

fn check_length(term: &[u8]) -> Result<&[u8], Error> {
    if term.len() > MAX_TERM_LENGTH {
        Err(Error::TermTooLong(term.len()))
    } else {
        Ok(term)
    }
}

fn read_terms(path: &Path) -> Result<HashMap<Vec<u8>, u64>, Error> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut terms = HashMap::new();
    while let Some((term, offset)) = read_entry(&mut reader)? {
        terms.insert(term, offset);
    }
    Ok(terms)
}

fn read_entry<R: Read>(read: &mut R) -> Result<Option<(Vec<u8>, u64)>, Error> {
    let mut length = [0u8; 1];
    if read.read(&mut length)? == 0 {
        return Ok(None);
    }
    let mut term = vec![0u8; length[0] as usize];
    read.read_exact(&mut term)?;
    let offset = read.read_u64::<BigEndian>()?;
    Ok(Some((term, offset)))
}

/// Writes a term file. Entries must be given in ascending term order.
///
/// Records go to a `.partial` file next to `path` that `finish` renames into
/// place, so `path` only ever holds a complete dictionary.
pub struct TermDictionaryWriter {
    path: PathBuf,
    staging: PathBuf,
    file: BufWriter<File>,
}

impl TermDictionaryWriter {
    pub fn create(path: &Path) -> Result<TermDictionaryWriter, Error> {
        let staging = path.with_extension("partial");
        Ok(TermDictionaryWriter {
            path: path.to_path_buf(),
            file: BufWriter::new(File::create(&staging)?),
            staging,
        })
    }

    pub fn write_entry(&mut self, term: &[u8], offset: u64) -> Result<(), Error> {
        check_length(term)?;
        self.file.write_u8(term.len() as u8)?;
        self.file.write_all(term)?;
        self.file.write_u64::<BigEndian>(offset)?;
        Ok(())
    }

    pub fn finish(self) -> Result<(), Error> {
        let TermDictionaryWriter {
            path,
            staging,
            mut file,
        } = self;
        file.flush()?;
        drop(file);
        fs::rename(staging, path)?;
        Ok(())
    }
}

pub struct TermDictionaryIter {
    terms: BufReader<File>,
    postings: PostingListStorage,
    done: bool,
}

impl TermDictionaryIter {
    fn read_next(&mut self) -> Result<Option<(Vec<u8>, Vec<DocId>)>, Error> {
        match read_entry(&mut self.terms)? {
            Some((term, offset)) => Ok(Some((term, self.postings.get_posting_list(offset)?))),
            None => Ok(None),
        }
    }
}

impl Iterator for TermDictionaryIter {
    type Item = Result<(Vec<u8>, Vec<DocId>), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.read_next().transpose();
        match next {
            Some(Ok(_)) => {}
            _ => self.done = true,
        }
        next
    }
}
