//! Renders the typed query DSL into MongoDB filter and sort documents.
//!
//! Public field names are camelCase; storage names are snake_case with `id`
//! stored as `_id`. Paths rooted outside a resource's queryable fields are
//! skipped.

use futures::TryStreamExt;
use mongodb::{
    Collection,
    bson::{Bson, DateTime, Document, doc},
    options::FindOptions,
};
use serde::de::DeserializeOwned;
use tenantry_shared::query::{Direction, Filter, FindManyOptions, OrderBy, Predicate, Value};
use tracing::debug;

use crate::response::ServerResult;

/// Storage name of one public path segment.
pub fn storage_field(segment: &str) -> String {
    if segment == "id" {
        return "_id".to_string();
    }
    let mut out = String::with_capacity(segment.len() + 4);
    for ch in segment.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

pub fn storage_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| storage_field(s))
        .collect::<Vec<_>>()
        .join(".")
}

pub fn value_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Integer(i) => Bson::Int64(*i),
        Value::Float(f) => Bson::Double(*f),
        Value::Date(dt) => Bson::DateTime(DateTime::from_millis(dt.timestamp_millis())),
        Value::Text(s) => Bson::String(s.clone()),
    }
}

fn values_to_bson(values: &[Value]) -> Bson {
    Bson::Array(values.iter().map(value_to_bson).collect())
}

pub fn predicate_condition(predicate: &Predicate) -> Bson {
    match predicate {
        Predicate::Equals(v) => value_to_bson(v),
        Predicate::Not(v) => doc! { "$ne": value_to_bson(v) }.into(),
        Predicate::GreaterThanOrEqual(v) => doc! { "$gte": value_to_bson(v) }.into(),
        Predicate::LessThanOrEqual(v) => doc! { "$lte": value_to_bson(v) }.into(),
        Predicate::GreaterThan(v) => doc! { "$gt": value_to_bson(v) }.into(),
        Predicate::LessThan(v) => doc! { "$lt": value_to_bson(v) }.into(),
        Predicate::Like(s) => doc! { "$regex": regex::escape(s) }.into(),
        Predicate::ILike(s) => doc! { "$regex": regex::escape(s), "$options": "i" }.into(),
        Predicate::In(vs) => doc! { "$in": values_to_bson(vs) }.into(),
        Predicate::NotIn(vs) => doc! { "$nin": values_to_bson(vs) }.into(),
        Predicate::Between(start, end) => {
            doc! { "$gte": value_to_bson(start), "$lte": value_to_bson(end) }.into()
        }
    }
}

fn is_queryable(fields: &[&str], root: &str) -> bool {
    fields.contains(&root)
}

/// Filter document for `filter`, limited to paths rooted in `fields`.
pub fn filter_document(filter: &Filter, fields: &[&str]) -> Document {
    let mut out = Document::new();
    let mut all_of = Vec::new();

    for (path, predicates) in filter.leaves() {
        let Some(root) = path.first() else {
            continue;
        };
        if !is_queryable(fields, root) {
            debug!("ignoring filter on unknown field {}", path.join("."));
            continue;
        }

        let key = storage_path(&path);
        match predicates {
            [single] => {
                out.insert(key, predicate_condition(single));
            }
            many => {
                for predicate in many {
                    let mut clause = Document::new();
                    clause.insert(key.clone(), predicate_condition(predicate));
                    all_of.push(Bson::Document(clause));
                }
            }
        }
    }

    if !all_of.is_empty() {
        out.insert("$and", all_of);
    }
    out
}

pub fn sort_document(order: &[OrderBy], fields: &[&str]) -> Document {
    let mut out = Document::new();
    for entry in order {
        let segments: Vec<&str> = entry.field.split('.').collect();
        let Some(root) = segments.first() else {
            continue;
        };
        if !is_queryable(fields, root) {
            debug!("ignoring order on unknown field {}", entry.field);
            continue;
        }
        let direction = match entry.direction {
            Direction::Asc => 1,
            Direction::Desc => -1,
        };
        out.insert(storage_path(&segments), direction);
    }
    out
}

/// Conjunction of two filters, skipping empty sides.
pub fn and(left: Document, right: Document) -> Document {
    match (left.is_empty(), right.is_empty()) {
        (true, _) => right,
        (_, true) => left,
        _ => doc! { "$and": [left, right] },
    }
}

pub fn find_options(options: &FindManyOptions, fields: &[&str]) -> FindOptions {
    let sort = sort_document(&options.order, fields);
    FindOptions::builder()
        .sort((!sort.is_empty()).then_some(sort))
        .skip(Some(options.offset()))
        .limit(Some(i64::try_from(options.take).unwrap_or(i64::MAX)))
        .build()
}

/// Runs a paginated find and the matching count.
pub async fn find_page<T>(
    coll: &Collection<T>,
    scope: Document,
    options: &FindManyOptions,
    fields: &[&str],
) -> ServerResult<(Vec<T>, u64)>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let requested = options
        .filter
        .as_ref()
        .map(|f| filter_document(f, fields))
        .unwrap_or_default();
    let filter = and(scope, requested);

    let total = coll.count_documents(filter.clone()).await?;
    if options.take == 0 {
        return Ok((Vec::new(), total));
    }

    let items: Vec<T> = coll
        .find(filter)
        .with_options(find_options(options, fields))
        .await?
        .try_collect()
        .await?;

    Ok((items, total))
}
