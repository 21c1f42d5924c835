extern crate proptest;
extern crate sediment;
extern crate tempfile;

use std::path::Path;
use std::sync::Arc;
use std::thread;

use sediment::segment::{list_segments, SegmentAddress};
use sediment::term_dictionary::TermDictionary;
use sediment::{Document, Indexer, IndexerBuilder};
use tempfile::TempDir;

pub mod sediment_test;

fn sample_documents() -> Vec<Document> {
    vec![
        Document::new("Postgres", "Postgres is a SQL database"),
        Document::new("Lucene", "Lucene is a search database"),
        Document::new("Databases", "Postgres and Lucene are both databases"),
    ]
}

fn index_samples(path: &Path, buffer_size: usize) -> Indexer {
    let indexer = sediment_test::open_index(path, buffer_size);
    for doc in sample_documents() {
        indexer.add_document(doc).unwrap();
    }
    indexer
}

fn hit_ids(indexer: &Indexer, term: &str) -> Vec<u64> {
    indexer
        .querier()
        .query_hits(term)
        .unwrap()
        .iter()
        .map(|hit| hit.document_id)
        .collect()
}

fn assert_sample_queries(indexer: &Indexer) {
    assert_eq!(hit_ids(indexer, "database"), vec![0, 1]);
    assert_eq!(hit_ids(indexer, "search"), vec![1]);
    assert_eq!(hit_ids(indexer, "postgres"), vec![0, 2]);
    assert_eq!(hit_ids(indexer, "lucene"), vec![1, 2]);
    assert_eq!(hit_ids(indexer, "databases"), vec![2]);
    assert_eq!(hit_ids(indexer, "oracle"), Vec::<u64>::new());

    let samples = sample_documents();
    assert_eq!(
        indexer.querier().query("Postgres").unwrap(),
        vec![samples[0].clone(), samples[2].clone()]
    );
}

#[test]
fn full_buffer_becomes_one_segment() {
    let root = TempDir::new().unwrap();
    let indexer = index_samples(root.path(), 3);

    let segments = list_segments(root.path()).unwrap();
    assert_eq!(segments, vec![SegmentAddress::new(root.path(), 0)]);
    let dictionary = TermDictionary::open(&segments[0].path()).unwrap();
    let list = |term: &str| dictionary.get_posting_list(term).unwrap().unwrap();
    assert_eq!(list("postgres"), vec![0, 2]);
    assert_eq!(list("database"), vec![0, 1]);
    assert_eq!(list("databases"), vec![2]);
    assert_eq!(list("search"), vec![1]);
    assert_eq!(list("lucene"), vec![1, 2]);
    assert_eq!(list("sql"), vec![0]);

    assert_sample_queries(&indexer);
}

#[test]
fn single_document_segments_query_the_same_after_merge() {
    let root = TempDir::new().unwrap();
    let indexer = index_samples(root.path(), 1);
    assert_eq!(list_segments(root.path()).unwrap().len(), 3);
    assert_sample_queries(&indexer);

    assert_eq!(indexer.merge().unwrap(), 1);
    let merged = TermDictionary::open(&SegmentAddress::new(root.path(), 3).path()).unwrap();
    assert_eq!(merged.get_posting_list("database").unwrap(), Some(vec![0, 1]));
    assert_eq!(merged.get_posting_list("postgres").unwrap(), Some(vec![0]));
    assert_sample_queries(&indexer);

    // Only segment 2 is below the active segment now.
    assert_eq!(indexer.merge().unwrap(), 0);
    assert_sample_queries(&indexer);
}

#[test]
fn unflushed_documents_are_not_queryable() {
    let root = TempDir::new().unwrap();
    let indexer = index_samples(root.path(), 10);
    assert!(hit_ids(&indexer, "database").is_empty());
    indexer.flush().unwrap();
    assert_eq!(hit_ids(&indexer, "database"), vec![0, 1]);
}

#[test]
fn repeated_queries_return_the_same_hits() {
    let root = TempDir::new().unwrap();
    let indexer = index_samples(root.path(), 1);
    indexer.merge().unwrap();
    let querier = indexer.querier();
    let first = querier.query_hits("database").unwrap();
    for _ in 0..3 {
        assert_eq!(querier.query_hits("database").unwrap(), first);
    }
}

#[test]
fn reopened_index_continues_ids() {
    let root = TempDir::new().unwrap();
    {
        let indexer = index_samples(root.path(), 2);
        indexer.flush().unwrap();
    }
    let indexer = sediment_test::open_index(root.path(), 2);
    indexer
        .add_document(Document::new("Sqlite", "Sqlite is a small database"))
        .unwrap();
    indexer.flush().unwrap();

    let segment_ids: Vec<u64> = list_segments(root.path())
        .unwrap()
        .iter()
        .map(|address| address.id)
        .collect();
    assert_eq!(segment_ids, vec![0, 1, 2]);
    assert_eq!(hit_ids(&indexer, "database"), vec![0, 1, 3]);
    assert_eq!(hit_ids(&indexer, "sqlite"), vec![3]);
}

#[test]
fn concurrent_writers_get_distinct_ids() {
    let root = TempDir::new().unwrap();
    let indexer = Arc::new(
        IndexerBuilder::new()
            .buffer_size(7)
            .auto_merge(false)
            .open(root.path())
            .unwrap(),
    );
    let handles: Vec<_> = (0..4)
        .map(|writer| {
            let indexer = indexer.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let doc = Document::new(format!("{}-{}", writer, i), "common words");
                    indexer.add_document(doc).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    indexer.flush().unwrap();

    assert_eq!(hit_ids(&indexer, "common"), (0..100).collect::<Vec<u64>>());
    indexer.merge().unwrap();
    assert_eq!(hit_ids(&indexer, "words"), (0..100).collect::<Vec<u64>>());
}
