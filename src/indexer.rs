use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::mem;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::counter::{DocumentIdCounter, SegmentCounter};
use crate::document::{DocId, Document};
use crate::document_storage::{self, DocumentStorage};
use crate::error::Error;
use crate::merge_worker::{MergeSignal, MergeWorker};
use crate::querier::Querier;
use crate::segment::{list_segments, SegmentAddress};
use crate::term_dictionary::TermDictionary;
use crate::tokenizer::{Tokenizer, WordTokenizer};

#[derive(Clone, Debug)]
pub struct IndexOptions {
    pub buffer_size: usize,
    pub auto_merge: bool,
    pub merge_idle_timeout: Duration,
}

impl Default for IndexOptions {
    fn default() -> IndexOptions {
        IndexOptions {
            buffer_size: 1000,
            auto_merge: true,
            merge_idle_timeout: Duration::from_millis(500),
        }
    }
}

pub struct IndexerBuilder {
    options: IndexOptions,
    tokenizer: Box<dyn Tokenizer>,
}

impl IndexerBuilder {
    pub fn new() -> IndexerBuilder {
        IndexerBuilder {
            options: IndexOptions::default(),
            tokenizer: WordTokenizer::new().boxed(),
        }
    }

    /// Number of buffered documents that triggers a flush.
    pub fn buffer_size(mut self, val: usize) -> IndexerBuilder {
        self.options.buffer_size = val;
        self
    }

    pub fn auto_merge(mut self, val: bool) -> IndexerBuilder {
        self.options.auto_merge = val;
        self
    }

    pub fn merge_idle_timeout(mut self, val: Duration) -> IndexerBuilder {
        self.options.merge_idle_timeout = val;
        self
    }

    pub fn tokenizer(mut self, tokenizer: Box<dyn Tokenizer>) -> IndexerBuilder {
        self.tokenizer = tokenizer;
        self
    }

    pub fn open<P: Into<PathBuf>>(self, path: P) -> Result<Indexer, Error> {
        Indexer::open_with_options(path.into(), self.options, self.tokenizer)
    }
}

impl Default for IndexerBuilder {
    fn default() -> IndexerBuilder {
        IndexerBuilder::new()
    }
}

struct Batch {
    ids: Range<DocId>,
    documents: Vec<Document>,
}

struct MergeWorkerHandle {
    signals: Sender<MergeSignal>,
    thread: JoinHandle<()>,
}

/// Buffers documents and writes one segment per full buffer.
///
/// All methods take `&self`, so an `Indexer` can be shared between ingesting
/// threads. Dropping it stops the merge worker but does not flush the buffer.
pub struct Indexer {
    options: IndexOptions,
    path: PathBuf,
    tokenizer: Box<dyn Tokenizer>,
    document_ids: DocumentIdCounter,
    segments: Arc<SegmentCounter>,
    buffer: Mutex<Vec<Document>>,
    merge_worker: Mutex<Option<MergeWorkerHandle>>,
    rayon_pool: rayon::ThreadPool,
}

impl Indexer {
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Indexer, Error> {
        IndexerBuilder::new().open(path)
    }

    fn open_with_options(
        path: PathBuf,
        options: IndexOptions,
        tokenizer: Box<dyn Tokenizer>,
    ) -> Result<Indexer, Error> {
        fs::create_dir_all(&path)?;
        let existing = list_segments(&path)?;
        let mut next_document = 0;
        for address in &existing {
            if let Some(last) = document_storage::last_document_id(&address.path())? {
                next_document = next_document.max(last + 1);
            }
        }
        let last_segment = existing.last().map(|address| address.id);
        debug!(
            "Opened index at {:?}: {} segments, last segment {:?}, next document id {}",
            path,
            existing.len(),
            last_segment,
            next_document
        );

        let segments = Arc::new(SegmentCounter::resume_after(last_segment));
        let merge_worker = if options.auto_merge {
            let (signals, receiver) = unbounded();
            let worker = MergeWorker::new(path.clone(), segments.clone(), options.merge_idle_timeout);
            Some(MergeWorkerHandle {
                signals,
                thread: worker.spawn(receiver)?,
            })
        } else {
            None
        };

        Ok(Indexer {
            options,
            path,
            tokenizer,
            document_ids: DocumentIdCounter::starting_at(next_document),
            segments,
            buffer: Mutex::new(Vec::new()),
            merge_worker: Mutex::new(merge_worker),
            rayon_pool: rayon::ThreadPoolBuilder::new()
                .thread_name(|i| format!("sediment-indexing-{}", i))
                .build()?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn querier(&self) -> Querier {
        Querier::new(self.path.clone())
    }

    pub fn add_document(&self, document: Document) -> Result<(), Error> {
        let batch = {
            let mut buffer = self.buffer.lock();
            buffer.push(document);
            if buffer.len() < self.options.buffer_size {
                return Ok(());
            }
            self.take_batch(&mut buffer)
        };
        self.write_segment(batch)
    }

    /// Writes whatever is buffered as a segment, even if the buffer is not
    /// full.
    pub fn flush(&self) -> Result<(), Error> {
        let batch = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                return Ok(());
            }
            self.take_batch(&mut buffer)
        };
        self.write_segment(batch)
    }

    /// Runs merges on the calling thread until no pair is mergeable.
    pub fn merge(&self) -> Result<usize, Error> {
        MergeWorker::new(
            self.path.clone(),
            self.segments.clone(),
            self.options.merge_idle_timeout,
        )
        .merge_pending()
    }

    /// Stops the background merge worker, waiting for a running merge to
    /// finish. Buffered documents are not written.
    pub fn shutdown(&self) {
        if let Some(worker) = self.merge_worker.lock().take() {
            let _ = worker.signals.send(MergeSignal::Shutdown);
            if worker.thread.join().is_err() {
                warn!("Merge worker for {:?} panicked", self.path);
            }
        }
    }

    /// Empties the buffer and assigns ids to its documents. Must run under
    /// the buffer lock so ids follow arrival order across batches.
    fn take_batch(&self, buffer: &mut Vec<Document>) -> Batch {
        let documents = mem::replace(buffer, Vec::new());
        Batch {
            ids: self.document_ids.allocate(documents.len() as u64),
            documents,
        }
    }

    fn write_segment(&self, batch: Batch) -> Result<(), Error> {
        let Batch { ids, documents: batch } = batch;
        let postings = self.invert(&batch, ids.clone());

        let segment = self.segments.next_segment();
        let address = SegmentAddress::new(&self.path, segment);
        address.create_dir()?;

        let mut documents = DocumentStorage::open(&address.path())?;
        for (document_id, document) in ids.zip(batch.iter()) {
            documents.add_document(document, document_id)?;
        }
        let dictionary = TermDictionary::open(&address.path())?;
        dictionary.add_raw_entries(postings)?;
        dictionary.persist()?;
        self.segments.complete_segment(segment);

        info!("Flushed segment {} with {} documents", segment, batch.len());
        self.notify_merge_worker();
        Ok(())
    }

    /// Maps every term of the batch to the ids of the documents containing
    /// it. Lists come out ascending since ids are handed out in batch order.
    fn invert(&self, batch: &[Document], ids: Range<DocId>) -> HashMap<String, Vec<DocId>> {
        let tokenizer = &self.tokenizer;
        let tokenized: Vec<Vec<String>> = self.rayon_pool.install(|| {
            batch
                .par_iter()
                .map(|document| tokenizer.tokenize(&document.text))
                .collect()
        });

        let mut postings: HashMap<String, Vec<DocId>> = HashMap::new();
        for (document_id, terms) in ids.zip(tokenized) {
            for term in terms {
                let list = postings.entry(term).or_insert_with(Vec::new);
                if list.last() != Some(&document_id) {
                    list.push(document_id);
                }
            }
        }
        postings
    }

    fn notify_merge_worker(&self) {
        if let Some(worker) = self.merge_worker.lock().as_ref() {
            if worker.signals.send(MergeSignal::SegmentFlushed).is_err() {
                warn!("Merge worker for {:?} is gone", self.path);
            }
        }
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
