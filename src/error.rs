use std::io;

use crate::document::DocId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no document with id {0} in segment")]
    NotFound(DocId),
    #[error("read at offset {0} runs past the end of the file")]
    InvalidOffset(u64),
    #[error("term of {0} bytes does not fit in the term dictionary")]
    TermTooLong(usize),
    #[error("{0}")]
    IOError(#[from] io::Error),
    #[error("{0}")]
    Walk(#[from] walkdir::Error),
    #[error("{0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn from_read(error: io::Error, offset: u64) -> Error {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            Error::InvalidOffset(offset)
        } else {
            Error::IOError(error)
        }
    }
}
