pub type DocId = u64;

/// A document as handed to the indexer. Only `text` is tokenized; the whole
/// document is stored and returned by queries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Document {
    pub title: String,
    pub text: String,
}

impl Document {
    pub fn new<T, X>(title: T, text: X) -> Document
    where
        T: Into<String>,
        X: Into<String>,
    {
        Document {
            title: title.into(),
            text: text.into(),
        }
    }
}
