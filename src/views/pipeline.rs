//! Read-model composition over plain JSON documents.
//!
//! Handlers that return an entity enriched with related counts, flags, or
//! owner info assemble a [`Pipeline`] of named stages instead of issuing
//! per-row follow-up queries. Each `expand` stage batches its foreign
//! fetch into a single [`DocumentSource::find_docs`] call, so a pipeline
//! never degenerates into N+1 lookups regardless of input size.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use crate::error::Result;

/// Batch document lookup by field equality. Implemented by the SQLite
/// store and by in-memory fixtures in tests, which keeps pipeline
/// semantics testable without a database.
pub trait DocumentSource: Send + Sync {
    /// All documents of `collection` whose `field` equals any of `values`.
    fn find_docs(&self, collection: &str, field: &str, values: &[Value]) -> Result<Vec<Value>>;
}

#[derive(Debug, Clone)]
pub enum Stage {
    /// Keep documents whose `field` equals `value`.
    Select { field: String, value: Value },
    /// Attach, under `as_field`, the `collection` documents whose
    /// `foreign_field` matches this document's `local_field` (scalar or
    /// array; array order is preserved in the attachment). The fetched
    /// set runs through `pipeline` first. A projection inside that
    /// pipeline must retain `foreign_field`, or the join key is lost.
    Expand {
        local_field: String,
        collection: String,
        foreign_field: String,
        as_field: String,
        pipeline: Pipeline,
    },
    /// `as_field` = length of the array at `source`.
    Count { source: String, as_field: String },
    /// `as_field` = whether any element of the array at `source` has
    /// `elem_field == equals`. A null `equals` never matches, which is
    /// how viewer-relative flags stay `false` (not absent) for
    /// anonymous requests.
    Flag {
        source: String,
        elem_field: String,
        equals: Value,
        as_field: String,
    },
    /// Collapse the array at `field` to its first element, or null when
    /// empty. A missing owner or target becomes null, never an error.
    First { field: String },
    /// `as_field` = numeric sum of `elem_field` across the array at `source`.
    Sum {
        source: String,
        elem_field: String,
        as_field: String,
    },
    /// Retain only the listed top-level fields.
    Keep { fields: Vec<String> },
    /// Remove the listed top-level fields (helper arrays, mostly).
    DropFields { fields: Vec<String> },
    Sort { field: String, descending: bool },
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.stages.push(Stage::Select {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn expand(
        mut self,
        local_field: &str,
        collection: &str,
        foreign_field: &str,
        as_field: &str,
        pipeline: Pipeline,
    ) -> Self {
        self.stages.push(Stage::Expand {
            local_field: local_field.to_string(),
            collection: collection.to_string(),
            foreign_field: foreign_field.to_string(),
            as_field: as_field.to_string(),
            pipeline,
        });
        self
    }

    pub fn count(mut self, source: &str, as_field: &str) -> Self {
        self.stages.push(Stage::Count {
            source: source.to_string(),
            as_field: as_field.to_string(),
        });
        self
    }

    pub fn flag(mut self, source: &str, elem_field: &str, equals: Value, as_field: &str) -> Self {
        self.stages.push(Stage::Flag {
            source: source.to_string(),
            elem_field: elem_field.to_string(),
            equals,
            as_field: as_field.to_string(),
        });
        self
    }

    pub fn first(mut self, field: &str) -> Self {
        self.stages.push(Stage::First {
            field: field.to_string(),
        });
        self
    }

    pub fn sum(mut self, source: &str, elem_field: &str, as_field: &str) -> Self {
        self.stages.push(Stage::Sum {
            source: source.to_string(),
            elem_field: elem_field.to_string(),
            as_field: as_field.to_string(),
        });
        self
    }

    pub fn keep(mut self, fields: &[&str]) -> Self {
        self.stages.push(Stage::Keep {
            fields: fields.iter().map(ToString::to_string).collect(),
        });
        self
    }

    pub fn drop_fields(mut self, fields: &[&str]) -> Self {
        self.stages.push(Stage::DropFields {
            fields: fields.iter().map(ToString::to_string).collect(),
        });
        self
    }

    pub fn sort_desc(mut self, field: &str) -> Self {
        self.stages.push(Stage::Sort {
            field: field.to_string(),
            descending: true,
        });
        self
    }

    pub fn sort_asc(mut self, field: &str) -> Self {
        self.stages.push(Stage::Sort {
            field: field.to_string(),
            descending: false,
        });
        self
    }

    pub fn run(&self, source: &dyn DocumentSource, mut docs: Vec<Value>) -> Result<Vec<Value>> {
        for stage in &self.stages {
            docs = apply(stage, source, docs)?;
        }
        Ok(docs)
    }
}

fn apply(stage: &Stage, source: &dyn DocumentSource, docs: Vec<Value>) -> Result<Vec<Value>> {
    match stage {
        Stage::Select { field, value } => Ok(docs
            .into_iter()
            .filter(|d| d.get(field) == Some(value))
            .collect()),

        Stage::Expand {
            local_field,
            collection,
            foreign_field,
            as_field,
            pipeline,
        } => expand(
            source,
            docs,
            local_field,
            collection,
            foreign_field,
            as_field,
            pipeline,
        ),

        Stage::Count {
            source: src,
            as_field,
        } => Ok(docs
            .into_iter()
            .map(|mut d| {
                let n = array_at(&d, src).map_or(0, <[Value]>::len);
                set_field(&mut d, as_field, Value::from(n as i64));
                d
            })
            .collect()),

        Stage::Flag {
            source: src,
            elem_field,
            equals,
            as_field,
        } => Ok(docs
            .into_iter()
            .map(|mut d| {
                let hit = !equals.is_null()
                    && array_at(&d, src)
                        .is_some_and(|a| a.iter().any(|e| e.get(elem_field) == Some(equals)));
                set_field(&mut d, as_field, Value::Bool(hit));
                d
            })
            .collect()),

        Stage::First { field } => Ok(docs
            .into_iter()
            .map(|mut d| {
                let first = array_at(&d, field)
                    .and_then(|a| a.first().cloned())
                    .unwrap_or(Value::Null);
                set_field(&mut d, field, first);
                d
            })
            .collect()),

        Stage::Sum {
            source: src,
            elem_field,
            as_field,
        } => Ok(docs
            .into_iter()
            .map(|mut d| {
                let total = array_at(&d, src).map_or(0, |a| {
                    a.iter()
                        .filter_map(|e| e.get(elem_field).and_then(Value::as_i64))
                        .sum()
                });
                set_field(&mut d, as_field, Value::from(total));
                d
            })
            .collect()),

        Stage::Keep { fields } => Ok(docs
            .into_iter()
            .map(|d| match d {
                Value::Object(map) => Value::Object(
                    map.into_iter()
                        .filter(|(k, _)| fields.iter().any(|f| f == k))
                        .collect(),
                ),
                other => other,
            })
            .collect()),

        Stage::DropFields { fields } => Ok(docs
            .into_iter()
            .map(|mut d| {
                if let Value::Object(map) = &mut d {
                    for f in fields {
                        map.remove(f);
                    }
                }
                d
            })
            .collect()),

        Stage::Sort { field, descending } => {
            let mut docs = docs;
            docs.sort_by(|a, b| {
                let ord = compare(a.get(field), b.get(field));
                if *descending { ord.reverse() } else { ord }
            });
            Ok(docs)
        }
    }
}

fn expand(
    source: &dyn DocumentSource,
    docs: Vec<Value>,
    local_field: &str,
    collection: &str,
    foreign_field: &str,
    as_field: &str,
    pipeline: &Pipeline,
) -> Result<Vec<Value>> {
    let mut keys: Vec<Value> = Vec::new();
    for doc in &docs {
        match doc.get(local_field) {
            Some(Value::Array(items)) => {
                for item in items {
                    if !item.is_null() && !keys.contains(item) {
                        keys.push(item.clone());
                    }
                }
            }
            Some(v) if !v.is_null() => {
                if !keys.contains(v) {
                    keys.push(v.clone());
                }
            }
            _ => {}
        }
    }

    let foreign = if keys.is_empty() {
        Vec::new()
    } else {
        source.find_docs(collection, foreign_field, &keys)?
    };
    let foreign = pipeline.run(source, foreign)?;

    let mut by_key: HashMap<String, Vec<Value>> = HashMap::new();
    for doc in foreign {
        if let Some(k) = doc.get(foreign_field) {
            by_key.entry(k.to_string()).or_default().push(doc);
        }
    }

    Ok(docs
        .into_iter()
        .map(|mut d| {
            let matches: Vec<Value> = match d.get(local_field) {
                Some(Value::Array(items)) => items
                    .iter()
                    .flat_map(|item| by_key.get(&item.to_string()).cloned().unwrap_or_default())
                    .collect(),
                Some(v) if !v.is_null() => {
                    by_key.get(&v.to_string()).cloned().unwrap_or_default()
                }
                _ => Vec::new(),
            };
            set_field(&mut d, as_field, Value::Array(matches));
            d
        })
        .collect())
}

fn array_at<'a>(doc: &'a Value, field: &str) -> Option<&'a [Value]> {
    doc.get(field).and_then(Value::as_array).map(Vec::as_slice)
}

fn set_field(doc: &mut Value, field: &str, value: Value) {
    if let Value::Object(map) = doc {
        map.insert(field.to_string(), value);
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}
