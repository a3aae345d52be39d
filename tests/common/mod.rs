#![allow(dead_code)]

use esmig::{
    Document, IndexService, PageQuery, ScanPage, ServiceError, ServiceOpener, WriteOutcome,
};
use parking_lot::{Mutex, MutexGuard};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// One index held by the fake cluster.
pub struct FakeIndex {
    pub docs: Vec<Document>,
    pub shard_count: u32,
    /// Service-defined slice-to-shard assignment for planner probes:
    /// `shard_for_slice(i) = map[i % map.len()]`. Defaults to identity.
    pub slice_shard_map: Vec<u32>,
}

impl FakeIndex {
    fn new(shard_count: u32) -> Self {
        Self {
            docs: Vec::new(),
            shard_count,
            slice_shard_map: (0..shard_count.max(1)).collect(),
        }
    }
}

#[derive(Default)]
pub struct ClusterState {
    pub indices: BTreeMap<String, FakeIndex>,
    /// Every batch handed to `bulk_write`, in submission order.
    pub bulk_batches: Vec<Vec<Document>>,
    /// The per-request timeout received with each bulk batch.
    pub bulk_timeouts: Vec<Option<Duration>>,
    /// Continuation tokens handed back via `release_scan`.
    pub released_scans: Vec<String>,
    pub deleted: Vec<String>,
    /// Document ids the bulk endpoint rejects (mapping conflict style).
    pub reject_ids: Vec<String>,
    /// Scans of this slice id fail with a transport error (worker-failure
    /// injection for sharded dumps).
    pub fail_slice: Option<u32>,
    /// Every delete times out instead of completing.
    pub timeout_deletes: bool,
    auto_id: u64,
}

/// In-memory stand-in for the remote search cluster. Cloning shares state,
/// so one handle can seed fixtures while another serves a `Migration`.
#[derive(Clone, Default)]
pub struct FakeCluster {
    inner: Arc<Mutex<ClusterState>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.inner.lock()
    }

    pub fn add_index(&self, name: &str, shard_count: u32, docs: Vec<Document>) {
        let mut state = self.lock();
        let mut idx = FakeIndex::new(shard_count);
        idx.docs = docs;
        state.indices.insert(name.to_string(), idx);
    }

    pub fn opener(&self) -> Arc<dyn ServiceOpener> {
        Arc::new(self.clone())
    }

    /// Direct service handle for exercising the building blocks.
    pub fn open_service(&self) -> Box<dyn IndexService> {
        ServiceOpener::open(self).unwrap()
    }

    pub fn doc_ids(&self, index: &str) -> Vec<String> {
        let state = self.lock();
        state
            .indices
            .get(index)
            .map(|i| i.docs.iter().map(|d| d.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn docs(&self, index: &str) -> Vec<Document> {
        let state = self.lock();
        state
            .indices
            .get(index)
            .map(|i| i.docs.clone())
            .unwrap_or_default()
    }
}

impl ServiceOpener for FakeCluster {
    fn open(&self) -> Result<Box<dyn IndexService>, ServiceError> {
        Ok(Box::new(FakeService { inner: self.inner.clone() }))
    }
}

struct FakeService {
    inner: Arc<Mutex<ClusterState>>,
}

/// Stable routing hash so sliced scans form a disjoint cover of an index.
fn slice_of(id: &str, count: u32) -> u32 {
    let mut h: u32 = 2166136261;
    for b in id.bytes() {
        h ^= u32::from(b);
        h = h.wrapping_mul(16777619);
    }
    h % count.max(1)
}

impl IndexService for FakeService {
    fn scan_page(&self, query: &PageQuery, token: Option<&str>) -> Result<ScanPage, ServiceError> {
        let state = self.inner.lock();
        let idx = state
            .indices
            .get(&query.index)
            .ok_or_else(|| ServiceError::IndexNotFound(query.index.clone()))?;

        if let (Some(fail), Some((slice_id, _))) = (state.fail_slice, query.slice) {
            if fail == slice_id {
                return Err(ServiceError::Transport(format!(
                    "injected failure for slice {slice_id}"
                )));
            }
        }

        let mut matching: Vec<Document> = idx
            .docs
            .iter()
            .filter(|d| match query.slice {
                Some((slice_id, count)) => slice_of(&d.id, count) == slice_id,
                None => true,
            })
            .cloned()
            .collect();
        if query.ordered {
            matching.sort_by(|a, b| a.id.cmp(&b.id));
        }

        let offset: usize = token.map(|t| t.parse().unwrap_or(0)).unwrap_or(0);
        let end = (offset + query.page_size).min(matching.len());
        let documents = matching[offset.min(matching.len())..end].to_vec();
        // Like the real service, every page carries a continuation token;
        // exhaustion is signalled by an empty page.
        Ok(ScanPage { documents, token: Some(end.to_string()) })
    }

    fn bulk_write(
        &self,
        documents: Vec<Document>,
        timeout: Option<Duration>,
    ) -> Result<Vec<WriteOutcome>, ServiceError> {
        let mut state = self.inner.lock();
        state.bulk_batches.push(documents.clone());
        state.bulk_timeouts.push(timeout);

        let mut outcomes = Vec::with_capacity(documents.len());
        for mut doc in documents {
            if state.reject_ids.contains(&doc.id) {
                outcomes.push(WriteOutcome::rejected(doc, "mapping conflict"));
                continue;
            }
            if doc.id.is_empty() {
                state.auto_id += 1;
                doc.id = format!("auto{}", state.auto_id);
            }
            let idx = state
                .indices
                .entry(doc.index.clone())
                .or_insert_with(|| FakeIndex::new(1));
            idx.docs.retain(|d| d.id != doc.id);
            idx.docs.push(doc.clone());
            outcomes.push(WriteOutcome::ok(doc));
        }
        Ok(outcomes)
    }

    fn shard_topology(&self, index: &str) -> Result<BTreeMap<u32, String>, ServiceError> {
        let state = self.inner.lock();
        let idx = state
            .indices
            .get(index)
            .ok_or_else(|| ServiceError::IndexNotFound(index.to_string()))?;
        Ok((0..idx.shard_count)
            .map(|s| (s, format!("node-{s}")))
            .collect())
    }

    fn shard_for_slice(
        &self,
        index: &str,
        slice_id: u32,
        _slice_count: u32,
    ) -> Result<u32, ServiceError> {
        let state = self.inner.lock();
        let idx = state
            .indices
            .get(index)
            .ok_or_else(|| ServiceError::IndexNotFound(index.to_string()))?;
        let map = &idx.slice_shard_map;
        Ok(map[slice_id as usize % map.len()])
    }

    fn release_scan(&self, token: &str) -> Result<(), ServiceError> {
        self.inner.lock().released_scans.push(token.to_string());
        Ok(())
    }

    fn delete_index(&self, index: &str, timeout: Duration) -> Result<(), ServiceError> {
        let mut state = self.inner.lock();
        if state.timeout_deletes {
            return Err(ServiceError::Timeout { op: "delete", timeout });
        }
        if state.indices.remove(index).is_none() {
            return Err(ServiceError::IndexNotFound(index.to_string()));
        }
        state.deleted.push(index.to_string());
        Ok(())
    }
}

// ----------------------------- fixtures ------------------------------------

pub fn doc(index: &str, id: &str, fields: Value) -> Document {
    let source = match fields {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    Document::new(index, id, source)
}

/// `n` small documents with distinct ids and a couple of typed fields.
pub fn make_docs(index: &str, n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            doc(
                index,
                &format!("d{i}"),
                json!({ "seq": i, "flag": "True", "note": format!("record {i}") }),
            )
        })
        .collect()
}
