use proptest::collection::vec;
use proptest::prelude::*;
use proptest::sample::select;
use std::mem;
use std::path::Path;
use tempfile::TempDir;

use sediment::{Document, Indexer, IndexerBuilder, Tokenizer, WordTokenizer};

pub const WORDS: &[&str] = &[
    "postgres",
    "Lucene",
    "database",
    "databases",
    "search",
    "SQL",
    "is",
    "a",
    "and",
    "both",
];

#[derive(Debug, Clone)]
pub enum IndexOperation {
    Index(Vec<Document>),
    Flush,
    Merge,
    ReOpen,
}

pub fn arb_document() -> BoxedStrategy<Document> {
    (select(WORDS), vec(select(WORDS), 0..8))
        .prop_map(|(title, words)| Document::new(title, words.join(" ")))
        .boxed()
}

pub fn arb_operations(max_ops: usize) -> BoxedStrategy<Vec<IndexOperation>> {
    vec(
        prop_oneof![
            4 => vec(arb_document(), 1..6).prop_map(IndexOperation::Index),
            1 => Just(IndexOperation::Flush),
            1 => Just(IndexOperation::Merge),
            1 => Just(IndexOperation::ReOpen),
        ],
        1..max_ops,
    )
    .boxed()
}

pub fn open_index(path: &Path, buffer_size: usize) -> Indexer {
    IndexerBuilder::new()
        .buffer_size(buffer_size)
        .auto_merge(false)
        .open(path)
        .expect("Could not open index.")
}

/// Applies operations to an index and to a plain list of documents, then
/// checks that both answer every query the same way.
pub fn index_and_assert_queries_match(buffer_size: usize, ops: &[IndexOperation]) {
    let index_dir = TempDir::new().unwrap();
    {
        let mut state = IndexTestState {
            buffer_size,
            indexer: open_index(index_dir.path(), buffer_size),
            documents: Vec::new(),
        };
        state.apply_ops(ops);
        state.indexer.flush().expect("Could not flush buffer.");
        state.check_queries_match_model();
    }
    index_dir.close().unwrap();
}

struct IndexTestState {
    buffer_size: usize,
    indexer: Indexer,
    documents: Vec<Document>,
}

impl IndexTestState {
    fn apply_ops(&mut self, ops: &[IndexOperation]) {
        for op in ops {
            match op {
                IndexOperation::Index(docs) => {
                    for doc in docs {
                        self.indexer.add_document(doc.clone()).unwrap();
                        self.documents.push(doc.clone());
                    }
                }
                IndexOperation::Flush => {
                    self.indexer.flush().expect("Could not flush buffer.");
                }
                IndexOperation::Merge => {
                    self.indexer.merge().expect("Could not merge segments.");
                }
                IndexOperation::ReOpen => {
                    self.indexer.flush().expect("Could not flush buffer.");
                    let reopened = open_index(self.indexer.path(), self.buffer_size);
                    drop(mem::replace(&mut self.indexer, reopened));
                }
            }
        }
    }

    fn check_queries_match_model(&self) {
        let querier = self.indexer.querier();
        let tokenizer = WordTokenizer::new();
        let mut terms: Vec<String> = WORDS.iter().map(|w| w.to_string()).collect();
        terms.push("DATABASE".to_string());
        terms.push("missing".to_string());
        for term in terms {
            let normalized = WordTokenizer::normalize(&term).unwrap();
            let expected: Vec<u64> = self
                .documents
                .iter()
                .enumerate()
                .filter(|(_, doc)| tokenizer.tokenize(&doc.text).contains(&normalized))
                .map(|(id, _)| id as u64)
                .collect();
            let hits = querier.query_hits(&term).unwrap();
            let found: Vec<u64> = hits.iter().map(|hit| hit.document_id).collect();
            assert_eq!(found, expected, "Wrong hits for {:?}", term);
            for hit in hits {
                assert_eq!(hit.document, self.documents[hit.document_id as usize]);
            }
        }
    }
}
