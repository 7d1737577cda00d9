//! Query-string filter DSL.
//!
//! Turns flat query parameters such as `where[age][gte]=18`,
//! `select[name]=true`, `relations=organization`, `order=name:asc` and
//! `page=2&limit=20` into typed find options. Keys that do not fit the grammar
//! are dropped, never rejected.

mod filter;
mod select;
mod value;

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

pub use filter::{Filter, FilterNode, Operator, Predicate};
pub use select::{DEFAULT_SELECTED, SelectTree, Selection};
pub use value::{NULL_SENTINEL, Value, infer_value};

pub const DEFAULT_TAKE: u64 = 10;
pub const CREATED_AT: &str = "createdAt";
pub const TRANSLATIONS: &str = "translations";

/// Raw query parameters. Repeated keys keep every value in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    entries: BTreeMap<String, Vec<String>>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Last value given for `key`.
    pub fn last(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|values| values.last())
            .map(String::as_str)
    }

    pub fn all(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `(key, last value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|(key, values)| {
            values.last().map(|value| (key.as_str(), value.as_str()))
        })
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("asc") {
            Some(Direction::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(Direction::Desc)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Options for fetching a single record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneOptions {
    pub select: Option<SelectTree>,
    pub filter: Option<Filter>,
    pub relations: Vec<String>,
}

impl FindOneOptions {
    pub fn has_relation(&self, name: &str) -> bool {
        has_relation(&self.relations, name)
    }
}

/// Options for fetching a window of records.
#[derive(Debug, Clone, PartialEq)]
pub struct FindManyOptions {
    pub select: Option<SelectTree>,
    pub filter: Option<Filter>,
    pub relations: Vec<String>,
    pub order: Vec<OrderBy>,
    pub skip: Option<u64>,
    pub take: u64,
}

impl FindManyOptions {
    pub fn offset(&self) -> u64 {
        self.skip.unwrap_or(0)
    }

    pub fn has_relation(&self, name: &str) -> bool {
        has_relation(&self.relations, name)
    }
}

fn has_relation(relations: &[String], name: &str) -> bool {
    relations.iter().any(|r| r == name)
}

pub fn build_find_one_options(query: &QueryParams) -> FindOneOptions {
    let mut filter = Filter::new();
    let mut select: Option<SelectTree> = None;

    for (key, value) in query.iter() {
        if let Some(rest) = key.strip_prefix("where[") {
            match parse_where_key(rest) {
                Some((path, None)) => filter.add(&path, Predicate::equals(value)),
                Some((path, Some(op))) => match Predicate::from_operator(op, value) {
                    Some(predicate) => filter.add(&path, predicate),
                    None => debug!(key, "dropping filter with unusable operand"),
                },
                None => debug!(key, "dropping unrecognized filter key"),
            }
        } else if let Some(rest) = key.strip_prefix("select[") {
            match parse_select_key(rest) {
                Some(path) => select
                    .get_or_insert_with(SelectTree::with_defaults)
                    .set(&path, value == "true"),
                None => debug!(key, "dropping unrecognized select key"),
            }
        }
    }

    if let Some(select) = select.as_mut() {
        select.set(&["id"], true);
    }

    let mut seen = HashSet::new();
    let mut relations: Vec<String> = split_list(query.all("relations"))
        .into_iter()
        .filter(|relation| seen.insert(relation.clone()))
        .collect();

    if let Some(locale) = query.last("locale").filter(|l| !l.is_empty()) {
        if !relations.iter().any(|r| r == TRANSLATIONS) {
            relations.push(TRANSLATIONS.to_string());
        }
        filter.add(
            &[TRANSLATIONS, "locale"],
            Predicate::Equals(Value::Text(locale.to_string())),
        );
    }

    FindOneOptions {
        select,
        filter: (!filter.is_empty()).then_some(filter),
        relations,
    }
}

pub fn build_find_many_options(query: &QueryParams) -> FindManyOptions {
    let base = build_find_one_options(query);

    let order = if query.contains("order") {
        parse_order(query.all("order"))
    } else {
        vec![OrderBy::new(CREATED_AT, Direction::Desc)]
    };

    let take = query
        .last("limit")
        .or_else(|| query.last("take"))
        .and_then(parse_count)
        .unwrap_or(DEFAULT_TAKE);

    let mut skip = query.last("skip").and_then(parse_count);
    if let Some(page) = query.last("page").and_then(parse_count).filter(|p| *p >= 1) {
        skip = Some(page.saturating_sub(1).saturating_mul(take));
    }

    FindManyOptions {
        select: base.select,
        filter: base.filter,
        relations: base.relations,
        order,
        skip,
        take,
    }
}

/// Splits `<path>]` or `<path>][<op>]` (the part after `where[`).
fn parse_where_key(rest: &str) -> Option<(Vec<&str>, Option<Operator>)> {
    let (path, tail) = rest.split_once(']')?;
    let path = parse_path(path)?;
    if tail.is_empty() {
        return Some((path, None));
    }
    let op = tail.strip_prefix('[')?.strip_suffix(']')?;
    Some((path, Some(Operator::parse(op)?)))
}

fn parse_select_key(rest: &str) -> Option<Vec<&str>> {
    parse_path(rest.strip_suffix(']')?)
}

fn parse_path(path: &str) -> Option<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().all(|segment| is_identifier(segment)) {
        Some(segments)
    } else {
        None
    }
}

fn is_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_order(values: &[String]) -> Vec<OrderBy> {
    let mut order: Vec<OrderBy> = Vec::new();
    for part in split_list(values) {
        let mut pieces = part.split(':');
        let field = pieces.next().unwrap_or_default().trim();
        let direction = pieces.next().and_then(Direction::parse);
        let (Some(direction), Some(_)) = (direction, parse_path(field)) else {
            debug!(entry = %part, "dropping malformed order entry");
            continue;
        };
        match order.iter_mut().find(|o| o.field == field) {
            Some(existing) => existing.direction = direction,
            None => order.push(OrderBy::new(field, direction)),
        }
    }
    order
}

fn parse_count(raw: &str) -> Option<u64> {
    raw.trim().parse().ok()
}
