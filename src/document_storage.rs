use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::document::{DocId, Document};
use crate::error::Error;
use crate::segment::{DOCUMENTS, DOCUMENTS_INDEX};

pub const INDEX_ENTRY_SIZE: u64 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DocumentIndexEntry {
    pub document_id: DocId,
    pub offset: u64,
}

impl DocumentIndexEntry {
    pub fn write_to<W: Write>(&self, write: &mut W) -> Result<(), Error> {
        let mut record = [0u8; INDEX_ENTRY_SIZE as usize];
        BigEndian::write_u64(&mut record[..8], self.document_id);
        BigEndian::write_u64(&mut record[8..], self.offset);
        write.write_all(&record)?;
        Ok(())
    }

    fn read_from<R: Read>(read: &mut R) -> Result<DocumentIndexEntry, Error> {
        let document_id = read.read_u64::<BigEndian>()?;
        let offset = read.read_u64::<BigEndian>()?;
        Ok(DocumentIndexEntry {
            document_id,
            offset,
        })
    }
}

/// The documents of one segment: a log of length-prefixed JSON payloads and
/// an index of fixed size `(document_id, offset)` entries.
///
/// Entries must be added in increasing document id order, which lets
/// `get_document` binary search the index.
pub struct DocumentStorage {
    documents: File,
    index: File,
    offset: u64,
}

impl DocumentStorage {
    pub fn open(dir: &Path) -> Result<DocumentStorage, Error> {
        fs::create_dir_all(dir)?;
        let documents = open_log(&dir.join(DOCUMENTS))?;
        let index = open_log(&dir.join(DOCUMENTS_INDEX))?;
        let offset = documents.metadata()?.len();
        Ok(DocumentStorage {
            documents,
            index,
            offset,
        })
    }

    /// Opens the logs of an existing segment for reading. Nothing is created.
    pub fn open_read(dir: &Path) -> Result<DocumentStorage, Error> {
        let documents = File::open(dir.join(DOCUMENTS))?;
        let index = File::open(dir.join(DOCUMENTS_INDEX))?;
        let offset = documents.metadata()?.len();
        Ok(DocumentStorage {
            documents,
            index,
            offset,
        })
    }

    pub fn add_document(&mut self, document: &Document, document_id: DocId) -> Result<(), Error> {
        let payload = serde_json::to_vec(document)?;
        let mut record = Vec::with_capacity(8 + payload.len());
        record.write_u64::<BigEndian>(payload.len() as u64)?;
        record.extend_from_slice(&payload);
        self.documents.write_all(&record)?;
        self.documents.flush()?;

        DocumentIndexEntry {
            document_id,
            offset: self.offset,
        }
        .write_to(&mut self.index)?;
        self.index.flush()?;

        self.offset += record.len() as u64;
        Ok(())
    }

    pub fn get_document(&mut self, document_id: DocId) -> Result<Document, Error> {
        let mut low = 0;
        let mut high = self.total_documents()?;
        while low < high {
            let mid = low + (high - low) / 2;
            let entry = self.index_entry(mid)?;
            match entry.document_id.cmp(&document_id) {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
                Ordering::Equal => return self.read_document(entry.offset),
            }
        }
        Err(Error::NotFound(document_id))
    }

    pub fn total_documents(&self) -> Result<u64, Error> {
        Ok(self.index.metadata()?.len() / INDEX_ENTRY_SIZE)
    }

    /// Document id of the last index entry, the highest one in the segment.
    pub fn last_document_id(&mut self) -> Result<Option<DocId>, Error> {
        match self.total_documents()? {
            0 => Ok(None),
            total => Ok(Some(self.index_entry(total - 1)?.document_id)),
        }
    }

    /// Walks the index entries in storage order, which is document id order.
    pub fn into_iterator(mut self) -> Result<DocumentIndexIter, Error> {
        let remaining = self.total_documents()?;
        self.index.seek(SeekFrom::Start(0))?;
        Ok(DocumentIndexIter {
            index: BufReader::new(self.index),
            remaining,
        })
    }

    fn index_entry(&mut self, position: u64) -> Result<DocumentIndexEntry, Error> {
        let offset = position * INDEX_ENTRY_SIZE;
        self.index.seek(SeekFrom::Start(offset))?;
        DocumentIndexEntry::read_from(&mut self.index).map_err(|e| match e {
            Error::IOError(io) => Error::from_read(io, offset),
            other => other,
        })
    }

    fn read_document(&mut self, offset: u64) -> Result<Document, Error> {
        if offset.saturating_add(8) > self.offset {
            return Err(Error::InvalidOffset(offset));
        }
        self.documents.seek(SeekFrom::Start(offset))?;
        let length = self
            .documents
            .read_u64::<BigEndian>()
            .map_err(|e| Error::from_read(e, offset))?;
        if (offset + 8).saturating_add(length) > self.offset {
            return Err(Error::InvalidOffset(offset));
        }
        let mut payload = vec![0u8; length as usize];
        self.documents
            .read_exact(&mut payload)
            .map_err(|e| Error::from_read(e, offset))?;
        Ok(serde_json::from_slice(&payload)?)
    }
}

fn open_log(path: &Path) -> Result<File, Error> {
    Ok(OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?)
}

/// Highest document id stored in the segment at `dir`, without creating
/// any files there.
pub fn last_document_id(dir: &Path) -> Result<Option<DocId>, Error> {
    let path = dir.join(DOCUMENTS_INDEX);
    if !path.exists() {
        return Ok(None);
    }
    let mut index = File::open(path)?;
    let total = index.metadata()?.len() / INDEX_ENTRY_SIZE;
    if total == 0 {
        return Ok(None);
    }
    index.seek(SeekFrom::Start((total - 1) * INDEX_ENTRY_SIZE))?;
    Ok(Some(DocumentIndexEntry::read_from(&mut index)?.document_id))
}

pub struct DocumentIndexIter {
    index: BufReader<File>,
    remaining: u64,
}

impl Iterator for DocumentIndexIter {
    type Item = Result<DocumentIndexEntry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let entry = DocumentIndexEntry::read_from(&mut self.index);
        if entry.is_err() {
            self.remaining = 0;
        }
        Some(entry)
    }
}
