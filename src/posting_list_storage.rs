use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::document::DocId;
use crate::error::Error;
use crate::segment::POSTING_LIST;

/// Append-only log of `[length: u64][ids: u64 * length / 8]` records, all
/// big-endian. Records are addressed by the byte offset they start at.
pub struct PostingListStorage {
    file: File,
    offset: u64,
}

impl PostingListStorage {
    /// Opens the posting list log in `dir`, appending to what is there.
    pub fn open(dir: &Path) -> Result<PostingListStorage, Error> {
        fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(dir.join(POSTING_LIST))?;
        let offset = file.metadata()?.len();
        Ok(PostingListStorage { file, offset })
    }

    /// Opens an existing posting list log for reading. Nothing is created.
    pub fn open_read(dir: &Path) -> Result<PostingListStorage, Error> {
        let file = File::open(dir.join(POSTING_LIST))?;
        let offset = file.metadata()?.len();
        Ok(PostingListStorage { file, offset })
    }

    /// Creates an empty posting list log in `dir`, truncating any old one.
    pub fn create(dir: &Path) -> Result<PostingListStorage, Error> {
        fs::create_dir_all(dir)?;
        File::create(dir.join(POSTING_LIST))?;
        PostingListStorage::open(dir)
    }

    pub fn add_posting_list(&mut self, ids: &[DocId]) -> Result<u64, Error> {
        let mut record = Vec::with_capacity(8 + ids.len() * 8);
        record.write_u64::<BigEndian>((ids.len() * 8) as u64)?;
        for id in ids {
            record.write_u64::<BigEndian>(*id)?;
        }
        self.file.write_all(&record)?;
        self.file.flush()?;

        let offset = self.offset;
        self.offset += record.len() as u64;
        Ok(offset)
    }

    pub fn get_posting_list(&mut self, offset: u64) -> Result<Vec<DocId>, Error> {
        if offset.saturating_add(8) > self.offset {
            return Err(Error::InvalidOffset(offset));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let length = self
            .file
            .read_u64::<BigEndian>()
            .map_err(|e| Error::from_read(e, offset))?;
        if length % 8 != 0 || (offset + 8).saturating_add(length) > self.offset {
            return Err(Error::InvalidOffset(offset));
        }
        let mut payload = vec![0u8; length as usize];
        self.file
            .read_exact(&mut payload)
            .map_err(|e| Error::from_read(e, offset))?;
        let mut ids = vec![0; payload.len() / 8];
        BigEndian::read_u64_into(&payload, &mut ids);
        Ok(ids)
    }

    /// Size of the log in bytes.
    pub fn len(&self) -> u64 {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset == 0
    }
}
