//! The transform registry: a closed set of named, pure, idempotent
//! document rewrites, composed in the order their names were given.

use crate::document::Document;
use anyhow::{bail, Result};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// One registered transformation. Names are rejected at configuration time,
/// not silently ignored at run time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    /// Rewrite the scalar strings `"True"`/`"False"` to `"true"`/`"false"`
    /// anywhere in the field tree. Exact matches only; partial-string
    /// occurrences are untouched.
    BoolLiterals,
    /// Replace top-level integer epoch fields (`timestamp`, `created_at`,
    /// `updated_at`) with RFC3339 strings. String values pass through, so
    /// a second application is a no-op.
    HumanTimestamps,
}

impl Transform {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bool-literals" => Some(Transform::BoolLiterals),
            "human-timestamps" => Some(Transform::HumanTimestamps),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transform::BoolLiterals => "bool-literals",
            Transform::HumanTimestamps => "human-timestamps",
        }
    }

    fn apply(&self, doc: &mut Document) {
        match self {
            Transform::BoolLiterals => {
                for (_, v) in doc.source.iter_mut() {
                    rewrite_bool_literals(v);
                }
            }
            Transform::HumanTimestamps => {
                for key in ["timestamp", "created_at", "updated_at"] {
                    if let Some(v) = doc.source.get_mut(key) {
                        humanize_epoch(v);
                    }
                }
            }
        }
    }
}

/// Structural recursion over the JSON value tree. Map key order is
/// preserved because values are rewritten in place.
fn rewrite_bool_literals(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s == "True" {
                *value = Value::String("true".to_string());
            } else if s == "False" {
                *value = Value::String("false".to_string());
            }
        }
        Value::Array(items) => {
            for v in items {
                rewrite_bool_literals(v);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                rewrite_bool_literals(v);
            }
        }
        _ => {}
    }
}

fn humanize_epoch(value: &mut Value) {
    if let Some(n) = value.as_i64() {
        if let Ok(dt) = OffsetDateTime::from_unix_timestamp(n) {
            if let Ok(s) = dt.format(&Rfc3339) {
                *value = Value::String(s);
            }
        }
    }
}

/// An ordered composition of registered transforms. With no names this is
/// the identity and `apply` touches nothing.
#[derive(Clone, Debug, Default)]
pub struct TransformPipeline {
    steps: Vec<Transform>,
}

impl TransformPipeline {
    /// Build a pipeline from registry names, applied in listed order.
    /// Unknown names are a configuration error.
    pub fn build<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut steps = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            match Transform::from_name(name) {
                Some(t) => steps.push(t),
                None => bail!("unknown transform: {name}"),
            }
        }
        Ok(Self { steps })
    }

    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn apply(&self, doc: &mut Document) {
        for t in &self.steps {
            t.apply(doc);
        }
    }
}
