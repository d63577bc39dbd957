use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{DocumentStore, FindSpec};
use crate::errors::StoreError;
use crate::query::eval::{
    apply_projection, as_f64, bson_equal, check_sort, compare_docs, eval_filter, get_path, get_values,
    lookup_matches, set_path,
};
use crate::query::{Accumulator, DeleteReport, Filter, Group, Lookup, Stage, UpdateReport};

/// In-process, schemaless store with the same read/write semantics as the server backend.
///
/// Collections are created on first insert and keep insertion order, which is the
/// natural order reads return when no sort is given.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held in `collection`.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) { Err(StoreError::Closed) } else { Ok(()) }
    }

    fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections.read().get(collection).cloned().unwrap_or_default()
    }

    fn matching(&self, collection: &str, filter: &Filter) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .map(|docs| docs.iter().filter(|d| eval_filter(d, filter)).cloned().collect())
            .unwrap_or_default()
    }

    fn run_stage(&self, docs: Vec<Document>, stage: &Stage) -> Result<Vec<Document>, StoreError> {
        Ok(match stage {
            Stage::Match(filter) => {
                let filter = Filter::try_from(filter)?;
                docs.into_iter().filter(|d| eval_filter(d, &filter)).collect()
            }
            Stage::Lookup(lookup) => self.join(docs, lookup),
            Stage::Sort(specs) => {
                check_sort(specs)?;
                let mut docs = docs;
                docs.sort_by(|a, b| compare_docs(a, b, specs));
                docs
            }
            Stage::Limit(0) => return Err(StoreError::InvalidQuery("$limit must be positive".into())),
            Stage::Limit(n) => docs.into_iter().take(usize::try_from(*n).unwrap_or(usize::MAX)).collect(),
            Stage::Project(p) => docs.iter().map(|d| apply_projection(d, p)).collect::<Result<_, _>>()?,
            Stage::Group(g) => group(docs, g),
        })
    }

    fn join(&self, docs: Vec<Document>, lookup: &Lookup) -> Vec<Document> {
        let foreign = self.snapshot(&lookup.from);
        docs.into_iter()
            .map(|mut d| {
                let locals = get_values(&d, &lookup.local_field);
                let joined: Vec<Bson> = foreign
                    .iter()
                    .filter(|f| {
                        let theirs = get_path(f, &lookup.foreign_field);
                        if locals.is_empty() {
                            lookup_matches(None, theirs)
                        } else {
                            locals.iter().any(|l| lookup_matches(Some(l), theirs))
                        }
                    })
                    .cloned()
                    .map(Bson::Document)
                    .collect();
                set_path(&mut d, &lookup.as_field, Bson::Array(joined));
                d
            })
            .collect()
    }
}

fn group(docs: Vec<Document>, g: &Group) -> Vec<Document> {
    let mut groups: Vec<(Bson, Vec<Document>)> = Vec::new();
    for d in docs {
        let key = g.key.as_ref().map_or(Bson::Null, |k| get_path(&d, k).cloned().unwrap_or(Bson::Null));
        if let Some((_, members)) = groups.iter_mut().find(|(k, _)| bson_equal(k, &key)) {
            members.push(d);
        } else {
            groups.push((key, vec![d]));
        }
    }
    groups
        .into_iter()
        .map(|(key, members)| {
            let mut out = Document::new();
            out.insert("_id", key);
            for (name, acc) in &g.outputs {
                out.insert(name.clone(), accumulate(&members, acc));
            }
            out
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn accumulate(members: &[Document], acc: &Accumulator) -> Bson {
    match acc {
        Accumulator::Avg(field) => {
            let nums: Vec<f64> = members.iter().filter_map(|d| get_path(d, field).and_then(as_f64)).collect();
            if nums.is_empty() { Bson::Null } else { Bson::Double(nums.iter().sum::<f64>() / nums.len() as f64) }
        }
        Accumulator::Sum(field) => {
            let values: Vec<&Bson> = members.iter().filter_map(|d| get_path(d, field)).collect();
            if values.iter().all(|v| matches!(v, Bson::Int32(_) | Bson::Int64(_) | Bson::Null)) {
                Bson::Int64(
                    values
                        .iter()
                        .map(|v| match v {
                            Bson::Int32(i) => i64::from(*i),
                            Bson::Int64(i) => *i,
                            _ => 0,
                        })
                        .sum(),
                )
            } else {
                Bson::Double(values.iter().filter_map(|v| as_f64(v)).sum())
            }
        }
        Accumulator::Count => Bson::Int64(i64::try_from(members.len()).unwrap_or(i64::MAX)),
    }
}

/// Fields an upsert copies from its filter: top-level equalities, not operator clauses.
fn upsert_seed(filter: &Document) -> Document {
    let mut seed = Document::new();
    for (k, v) in filter {
        if k.starts_with('$') {
            continue;
        }
        if let Bson::Document(inner) = v
            && inner.keys().next().is_some_and(|op| op.starts_with('$'))
        {
            continue;
        }
        set_path(&mut seed, k, v.clone());
    }
    seed
}

fn with_id(doc: Document) -> (Bson, Document) {
    if let Some(id) = doc.get("_id") {
        return (id.clone(), doc);
    }
    let id = Bson::ObjectId(ObjectId::new());
    let mut out = Document::new();
    out.insert("_id", id.clone());
    for (k, v) in doc {
        out.insert(k, v);
    }
    (id, out)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, collection: &str, spec: FindSpec<'_>) -> Result<Vec<Document>, StoreError> {
        self.ensure_open()?;
        let filter = Filter::try_from(spec.filter)?;
        check_sort(spec.sort)?;
        let mut docs = self.matching(collection, &filter);
        if !spec.sort.is_empty() {
            docs.sort_by(|a, b| compare_docs(a, b, spec.sort));
        }
        if spec.limit > 0 {
            docs.truncate(usize::try_from(spec.limit).unwrap_or(usize::MAX));
        }
        match spec.projection {
            Some(p) if !p.is_empty() => docs.iter().map(|d| apply_projection(d, p)).collect(),
            _ => Ok(docs),
        }
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Document>, StoreError> {
        self.ensure_open()?;
        let mut docs = self.snapshot(collection);
        for stage in pipeline {
            docs = self.run_stage(docs, stage)?;
        }
        log::debug!("aggregate on {collection}: {} stages, {} results", pipeline.len(), docs.len());
        Ok(docs)
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Bson, StoreError> {
        self.ensure_open()?;
        let (id, doc) = with_id(doc);
        let mut cols = self.collections.write();
        let docs = cols.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| d.get("_id").is_some_and(|existing| bson_equal(existing, &id))) {
            return Err(StoreError::InvalidQuery(format!("duplicate key {id} in {collection}")));
        }
        docs.push(doc);
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        set: Document,
        upsert: bool,
    ) -> Result<UpdateReport, StoreError> {
        self.ensure_open()?;
        let compiled = Filter::try_from(filter)?;
        let mut cols = self.collections.write();
        let docs = cols.entry(collection.to_string()).or_default();
        if let Some(doc) = docs.iter_mut().find(|d| eval_filter(d, &compiled)) {
            let mut changed = false;
            for (k, v) in set {
                changed |= set_path(doc, &k, v);
            }
            return Ok(UpdateReport { matched: 1, modified: u64::from(changed), upserted_id: None });
        }
        if !upsert {
            return Ok(UpdateReport::default());
        }
        let mut seed = upsert_seed(filter);
        for (k, v) in set {
            set_path(&mut seed, &k, v);
        }
        let (id, doc) = with_id(seed);
        docs.push(doc);
        Ok(UpdateReport { matched: 0, modified: 0, upserted_id: Some(id) })
    }

    async fn delete_one(&self, collection: &str, filter: &Document) -> Result<DeleteReport, StoreError> {
        self.ensure_open()?;
        let compiled = Filter::try_from(filter)?;
        let mut cols = self.collections.write();
        let Some(docs) = cols.get_mut(collection) else {
            return Ok(DeleteReport::default());
        };
        match docs.iter().position(|d| eval_filter(d, &compiled)) {
            Some(pos) => {
                docs.remove(pos);
                Ok(DeleteReport { deleted: 1 })
            }
            None => Ok(DeleteReport::default()),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_open()
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
