use rayon::prelude::*;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::document::{DocId, Document};
use crate::document_storage::DocumentStorage;
use crate::error::Error;
use crate::segment::{list_segments, SegmentAddress};
use crate::term_dictionary::TermDictionary;
use crate::tokenizer::WordTokenizer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub document_id: DocId,
    pub document: Document,
}

/// Term lookups over every visible segment below an index root.
///
/// Holds no state besides the root, so each query sees the segments that
/// exist when it starts.
pub struct Querier {
    path: PathBuf,
}

impl Querier {
    pub fn new<P: Into<PathBuf>>(path: P) -> Querier {
        Querier { path: path.into() }
    }

    pub fn query(&self, term: &str) -> Result<Vec<Document>, Error> {
        Ok(self
            .query_hits(term)?
            .into_iter()
            .map(|hit| hit.document)
            .collect())
    }

    /// Documents containing `term`, ordered by document id. A document that
    /// lives in several segments (merge inputs and their output) is returned
    /// once.
    pub fn query_hits(&self, term: &str) -> Result<Vec<Hit>, Error> {
        let term = match WordTokenizer::normalize(term) {
            Some(term) => term,
            None => return Ok(Vec::new()),
        };
        let segments: Vec<SegmentAddress> = list_segments(&self.path)?
            .into_iter()
            .filter(|address| address.is_visible())
            .collect();

        let posting_lists: Vec<Vec<DocId>> = segments
            .par_iter()
            .map(|address| -> Result<Vec<DocId>, Error> {
                let dictionary = TermDictionary::load(&address.path())?;
                Ok(dictionary.get_posting_list(&term)?.unwrap_or_default())
            })
            .collect::<Result<_, _>>()?;

        let mut owners: BTreeMap<DocId, usize> = BTreeMap::new();
        for (segment, ids) in posting_lists.iter().enumerate() {
            for id in ids {
                if let Entry::Vacant(entry) = owners.entry(*id) {
                    entry.insert(segment);
                }
            }
        }
        let mut by_segment: BTreeMap<usize, Vec<DocId>> = BTreeMap::new();
        for (id, segment) in owners {
            by_segment.entry(segment).or_insert_with(Vec::new).push(id);
        }

        let fetched: Vec<Vec<Hit>> = by_segment
            .into_par_iter()
            .map(|(segment, ids)| -> Result<Vec<Hit>, Error> {
                let mut documents = DocumentStorage::open_read(&segments[segment].path())?;
                ids.into_iter()
                    .map(|document_id| -> Result<Hit, Error> {
                        Ok(Hit {
                            document_id,
                            document: documents.get_document(document_id)?,
                        })
                    })
                    .collect()
            })
            .collect::<Result<_, _>>()?;

        let mut hits: Vec<Hit> = fetched.into_iter().flatten().collect();
        hits.sort_by_key(|hit| hit.document_id);
        Ok(hits)
    }
}
