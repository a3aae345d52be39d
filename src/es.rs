//! Concrete `IndexService` over the Elasticsearch REST API: scroll-based
//! scans, `_bulk` NDJSON writes, `_search_shards` topology, index DELETE.
//! Transport details (TLS, auth, per-request timeouts) stay inside this
//! module; the rest of the crate sees only the capability trait.

use crate::document::{Document, WriteOutcome};
use crate::service::{IndexService, PageQuery, ScanPage, ServiceError, ServiceOpener};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EsConfig {
    /// One or more `host:port` entries; worker connections rotate over them.
    pub hosts: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    /// Skip certificate verification (self-signed clusters).
    pub insecure_tls: bool,
    /// Default per-request timeout; scan/bulk/delete calls may override.
    pub request_timeout: Duration,
}

impl EsConfig {
    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            username: None,
            password: None,
            api_key: None,
            insecure_tls: false,
            request_timeout: Duration::from_secs(90),
        }
    }
}

/// Connection factory rotating worker connections across the host list.
pub struct EsOpener {
    cfg: EsConfig,
    next: AtomicUsize,
}

impl EsOpener {
    pub fn new(cfg: EsConfig) -> Self {
        Self { cfg, next: AtomicUsize::new(0) }
    }
}

impl ServiceOpener for EsOpener {
    fn open(&self) -> Result<Box<dyn IndexService>, ServiceError> {
        if self.cfg.hosts.is_empty() {
            return Err(ServiceError::Transport("no hosts configured".into()));
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.cfg.hosts.len();
        let host = &self.cfg.hosts[i];
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        let client = Client::builder()
            .timeout(self.cfg.request_timeout)
            .danger_accept_invalid_certs(self.cfg.insecure_tls)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Box::new(EsService { cfg: self.cfg.clone(), client, base_url }))
    }
}

pub struct EsService {
    cfg: EsConfig,
    client: Client,
    base_url: String,
}

impl EsService {
    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        if let Some(key) = &self.cfg.api_key {
            req.header("Authorization", format!("ApiKey {key}"))
        } else if let (Some(user), Some(pass)) = (&self.cfg.username, &self.cfg.password) {
            req.basic_auth(user, Some(pass))
        } else {
            req
        }
    }

    fn send_err(&self, op: &'static str, e: reqwest::Error, timeout: Duration) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout { op, timeout }
        } else {
            ServiceError::Transport(format!("{op}: {e}"))
        }
    }

    fn read_body(resp: reqwest::blocking::Response, op: &str) -> Result<Value, ServiceError> {
        resp.json::<Value>()
            .map_err(|e| ServiceError::Transport(format!("{op}: malformed response: {e}")))
    }

    fn scan_body(&self, query: &PageQuery) -> Value {
        let mut body = json!({
            "size": query.page_size,
            "query": query.filter.clone().unwrap_or_else(|| json!({ "match_all": {} })),
        });
        // "_doc" is the internal order; it is both the cheapest scroll sort
        // and the stable order copy relies on.
        body["sort"] = json!(["_doc"]);
        if let Some((id, max)) = query.slice {
            body["slice"] = json!({ "id": id, "max": max });
        }
        body
    }
}

impl IndexService for EsService {
    fn scan_page(&self, query: &PageQuery, token: Option<&str>) -> Result<ScanPage, ServiceError> {
        let scroll = format!("{}s", query.scroll_timeout.as_secs().max(1));
        let resp = match token {
            None => {
                let url = format!("{}/{}/_search?scroll={}", self.base_url, query.index, scroll);
                self.authed(self.client.post(&url))
                    .json(&self.scan_body(query))
                    .send()
                    .map_err(|e| self.send_err("scan", e, self.cfg.request_timeout))?
            }
            Some(token) => {
                let url = format!("{}/_search/scroll", self.base_url);
                self.authed(self.client.post(&url))
                    .json(&json!({ "scroll": scroll, "scroll_id": token }))
                    .send()
                    .map_err(|e| self.send_err("scan", e, self.cfg.request_timeout))?
            }
        };

        match resp.status() {
            StatusCode::NOT_FOUND if token.is_none() => {
                return Err(ServiceError::IndexNotFound(query.index.clone()));
            }
            s if !s.is_success() => {
                let body = resp.text().unwrap_or_default();
                return Err(ServiceError::Transport(format!("scan: {s}: {body}")));
            }
            _ => {}
        }

        let body = Self::read_body(resp, "scan")?;
        let token = body
            .get("_scroll_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let hits = body
            .pointer("/hits/hits")
            .cloned()
            .unwrap_or_else(|| json!([]));
        let documents: Vec<Document> = serde_json::from_value(hits)
            .map_err(|e| ServiceError::Transport(format!("scan: malformed hits: {e}")))?;
        Ok(ScanPage { documents, token })
    }

    fn bulk_write(
        &self,
        documents: Vec<Document>,
        timeout: Option<Duration>,
    ) -> Result<Vec<WriteOutcome>, ServiceError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let mut payload = String::new();
        for doc in &documents {
            let action = if doc.id.is_empty() {
                json!({ "index": { "_index": doc.index } })
            } else {
                json!({ "index": { "_index": doc.index, "_id": doc.id } })
            };
            payload.push_str(&action.to_string());
            payload.push('\n');
            payload.push_str(&Value::Object(doc.source.clone()).to_string());
            payload.push('\n');
        }

        let effective = timeout.unwrap_or(self.cfg.request_timeout);
        let url = format!("{}/_bulk", self.base_url);
        let resp = self
            .authed(self.client.post(&url))
            .header("Content-Type", "application/x-ndjson")
            .timeout(effective)
            .body(payload)
            .send()
            .map_err(|e| self.send_err("bulk", e, effective))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ServiceError::Transport(format!("bulk: {status}: {body}")));
        }

        let body = Self::read_body(resp, "bulk")?;
        let items = body
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| ServiceError::Transport("bulk: response missing items".into()))?;
        if items.len() != documents.len() {
            return Err(ServiceError::Transport(format!(
                "bulk: {} items for {} documents",
                items.len(),
                documents.len()
            )));
        }

        let outcomes = documents
            .into_iter()
            .zip(items)
            .map(|(doc, item)| {
                let detail = item.get("index").unwrap_or(item);
                let status = detail.get("status").and_then(Value::as_u64).unwrap_or(500);
                if status < 300 {
                    WriteOutcome::ok(doc)
                } else {
                    let reason = detail
                        .get("error")
                        .map(Value::to_string)
                        .unwrap_or_else(|| format!("status {status}"));
                    WriteOutcome::rejected(doc, reason)
                }
            })
            .collect();
        Ok(outcomes)
    }

    fn shard_topology(&self, index: &str) -> Result<BTreeMap<u32, String>, ServiceError> {
        let url = format!("{}/{}/_search_shards", self.base_url, index);
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .map_err(|e| self.send_err("topology", e, self.cfg.request_timeout))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ServiceError::IndexNotFound(index.to_string()));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            return Err(ServiceError::Transport(format!("topology: {status}: {body}")));
        }

        let body = Self::read_body(resp, "topology")?;
        let nodes = body.get("nodes").cloned().unwrap_or_else(|| json!({}));
        let groups = body
            .get("shards")
            .and_then(Value::as_array)
            .ok_or_else(|| ServiceError::Transport("topology: response missing shards".into()))?;

        let mut topology = BTreeMap::new();
        for group in groups {
            let copies = group.as_array().cloned().unwrap_or_default();
            for copy in copies {
                if copy.get("primary").and_then(Value::as_bool) != Some(true) {
                    continue;
                }
                let shard = copy.get("shard").and_then(Value::as_u64).unwrap_or(0) as u32;
                let node_id = copy.get("node").and_then(Value::as_str).unwrap_or("");
                let address = nodes
                    .get(node_id)
                    .and_then(|n| n.get("transport_address"))
                    .and_then(Value::as_str)
                    .unwrap_or(node_id)
                    .to_string();
                topology.insert(shard, address);
            }
        }
        if topology.is_empty() {
            return Err(ServiceError::Transport(format!(
                "topology: no primary shards reported for {index}"
            )));
        }
        Ok(topology)
    }

    fn shard_for_slice(
        &self,
        index: &str,
        slice_id: u32,
        _slice_count: u32,
    ) -> Result<u32, ServiceError> {
        // When the slice count equals the primary-shard count, Elasticsearch
        // pins slice i to shard i; the modulo keeps probes past the shard
        // count well-defined.
        let topology = self.shard_topology(index)?;
        let count = (topology.len() as u32).max(1);
        Ok(slice_id % count)
    }

    fn release_scan(&self, token: &str) -> Result<(), ServiceError> {
        let url = format!("{}/_search/scroll", self.base_url);
        let resp = self
            .authed(self.client.delete(&url))
            .json(&json!({ "scroll_id": token }))
            .send()
            .map_err(|e| self.send_err("clear scroll", e, self.cfg.request_timeout))?;
        // 404 means the context already expired on its own.
        let status = resp.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            let body = resp.text().unwrap_or_default();
            return Err(ServiceError::Transport(format!("clear scroll: {status}: {body}")));
        }
        Ok(())
    }

    fn delete_index(&self, index: &str, timeout: Duration) -> Result<(), ServiceError> {
        let url = format!("{}/{}?timeout={}s", self.base_url, index, timeout.as_secs().max(1));
        let resp = self
            .authed(self.client.delete(&url))
            .timeout(timeout)
            .send()
            .map_err(|e| self.send_err("delete", e, timeout))?;
        match resp.status() {
            StatusCode::NOT_FOUND => Err(ServiceError::IndexNotFound(index.to_string())),
            s if s.is_success() => Ok(()),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                Err(ServiceError::Timeout { op: "delete", timeout })
            }
            s => {
                let body = resp.text().unwrap_or_default();
                Err(ServiceError::Transport(format!("delete: {s}: {body}")))
            }
        }
    }
}
