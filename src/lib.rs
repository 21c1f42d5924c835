extern crate byteorder;
extern crate crossbeam_channel;
#[macro_use]
extern crate log;
extern crate parking_lot;
extern crate rayon;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate unicode_segmentation;
extern crate walkdir;

pub mod counter;
pub mod document;
pub mod document_storage;
pub mod error;
pub mod indexer;
pub mod merge;
pub mod merge_worker;
pub mod posting_list_storage;
pub mod querier;
pub mod segment;
pub mod term_dictionary;
pub mod tokenizer;

pub use crate::document::{DocId, Document};
pub use crate::error::Error;
pub use crate::indexer::{IndexOptions, Indexer, IndexerBuilder};
pub use crate::querier::{Hit, Querier};
pub use crate::tokenizer::{Tokenizer, WordTokenizer};
