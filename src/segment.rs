use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Error;

pub const DOCUMENTS: &str = "documents";
pub const DOCUMENTS_INDEX: &str = "documents_index";
pub const POSTING_LIST: &str = "posting_list";
pub const TERM_DICTIONARY: &str = "term_dictionary";

const SEGMENT_PREFIX: &str = "segment_";

pub type SegmentId = u64;

/// Location of one segment directory below an index root.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SegmentAddress {
    pub root: PathBuf,
    pub id: SegmentId,
}

impl SegmentAddress {
    pub fn new<P: Into<PathBuf>>(root: P, id: SegmentId) -> SegmentAddress {
        SegmentAddress {
            root: root.into(),
            id,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(format!("{}{}", SEGMENT_PREFIX, self.id))
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    pub fn create_dir(&self) -> Result<(), io::Error> {
        fs::create_dir_all(self.path())
    }

    /// A segment is visible to readers once its term dictionary exists,
    /// which both flush and merge write last.
    ///
    /// The term dictionary is the one file written under a temporary
    /// `.partial` name and renamed into place, so a visible segment never has
    /// a half-written dictionary. That rename only orders writes for
    /// concurrent readers. Nothing is fsynced, so after a crash a visible
    /// segment may still have incomplete logs.
    pub fn is_visible(&self) -> bool {
        self.file(TERM_DICTIONARY).exists()
    }
}

fn parse_segment_id(name: &str) -> Option<SegmentId> {
    if name.starts_with(SEGMENT_PREFIX) {
        name[SEGMENT_PREFIX.len()..].parse().ok()
    } else {
        None
    }
}

/// Lists the segment directories directly below `root`, sorted by id.
/// Entries that are not named like a segment are ignored.
pub fn list_segments(root: &Path) -> Result<Vec<SegmentAddress>, Error> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(id) = entry.file_name().to_str().and_then(parse_segment_id) {
            segments.push(SegmentAddress::new(root, id));
        }
    }
    segments.sort_by_key(|address| address.id);
    Ok(segments)
}
