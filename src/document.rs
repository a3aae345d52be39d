use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One document as read from a scan page or decoded from a dump file.
///
/// Field names mirror the wire/dump record layout, so this type doubles as
/// the newline-delimited dump record: `{"_source": {...}, "_index": "...",
/// "_type": ..., "_id": "..."}`. The source map keeps its key order end to
/// end (serde_json `preserve_order`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_source")]
    pub source: Map<String, Value>,
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type", default)]
    pub doc_type: Option<String>,
    #[serde(rename = "_id", default)]
    pub id: String,
}

impl Document {
    pub fn new(index: impl Into<String>, id: impl Into<String>, source: Map<String, Value>) -> Self {
        Self {
            source,
            index: index.into(),
            doc_type: None,
            id: id.into(),
        }
    }

    /// Serialized size of the full record; used for bulk chunk accounting.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// Per-document result of a bulk write. One outcome per submitted document;
/// a `succeeded=false` outcome never aborts the enclosing batch.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub succeeded: bool,
    pub document: Document,
    pub error: Option<String>,
}

impl WriteOutcome {
    pub fn ok(document: Document) -> Self {
        Self { succeeded: true, document, error: None }
    }

    pub fn rejected(document: Document, error: impl Into<String>) -> Self {
        Self { succeeded: false, document, error: Some(error.into()) }
    }
}
