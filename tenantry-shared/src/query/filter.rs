use std::collections::BTreeMap;

use super::value::{NULL_SENTINEL, Value, infer_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gte,
    Lte,
    Gt,
    Lt,
    Like,
    ILike,
    Not,
    In,
    NotIn,
    Between,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Self> {
        let op = match s {
            "gte" => Operator::Gte,
            "lte" => Operator::Lte,
            "gt" => Operator::Gt,
            "lt" => Operator::Lt,
            "like" => Operator::Like,
            "ilike" => Operator::ILike,
            "not" => Operator::Not,
            "in" => Operator::In,
            "notIn" => Operator::NotIn,
            "between" => Operator::Between,
            _ => return None,
        };
        Some(op)
    }
}

/// A single condition on one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Bare `where[field]=value`. A null operand is an is-null check.
    Equals(Value),
    /// A null operand is an is-not-null check.
    Not(Value),
    GreaterThanOrEqual(Value),
    LessThanOrEqual(Value),
    GreaterThan(Value),
    LessThan(Value),
    /// Case-sensitive substring match.
    Like(String),
    /// Case-insensitive substring match.
    ILike(String),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// Inclusive range.
    Between(Value, Value),
}

impl Predicate {
    pub fn equals(raw: &str) -> Self {
        Predicate::Equals(infer_value(raw))
    }

    /// Returns `None` when the operand cannot form the predicate
    /// (a `between` without two bounds).
    pub fn from_operator(op: Operator, raw: &str) -> Option<Self> {
        let predicate = match op {
            Operator::Gte => Predicate::GreaterThanOrEqual(infer_value(raw)),
            Operator::Lte => Predicate::LessThanOrEqual(infer_value(raw)),
            Operator::Gt => Predicate::GreaterThan(infer_value(raw)),
            Operator::Lt => Predicate::LessThan(infer_value(raw)),
            Operator::Like => Predicate::Like(raw.to_string()),
            Operator::ILike => Predicate::ILike(raw.to_string()),
            Operator::Not if raw == NULL_SENTINEL => Predicate::Not(Value::Null),
            Operator::Not => Predicate::Not(Value::Text(raw.to_string())),
            Operator::In => Predicate::In(split_text(raw)),
            Operator::NotIn => Predicate::NotIn(split_text(raw)),
            Operator::Between => {
                let mut bounds = raw.split(',');
                let start = bounds.next()?;
                let end = bounds.next()?;
                Predicate::Between(infer_value(start), infer_value(end))
            }
        };
        Some(predicate)
    }
}

/// Set members are compared as given, without inference.
fn split_text(raw: &str) -> Vec<Value> {
    raw.split(',').map(|part| Value::Text(part.to_string())).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// Predicates on a leaf field, combined with AND.
    Conditions(Vec<Predicate>),
    Nested(Filter),
}

/// Predicate tree keyed by field name; dotted paths become nested levels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: BTreeMap<String, FilterNode>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&FilterNode> {
        self.fields.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterNode)> {
        self.fields.iter()
    }

    /// Predicates stored at a dotted path, if that path is a leaf.
    pub fn conditions(&self, path: &str) -> Option<&[Predicate]> {
        let mut segments = path.split('.').peekable();
        let mut level = self;
        while let Some(segment) = segments.next() {
            let node = level.fields.get(segment)?;
            match (node, segments.peek()) {
                (FilterNode::Conditions(predicates), None) => return Some(predicates.as_slice()),
                (FilterNode::Nested(inner), Some(_)) => level = inner,
                _ => return None,
            }
        }
        None
    }

    /// Adds a predicate at `path`, creating intermediate levels on first use.
    ///
    /// A leaf met where a level is needed, or a level met where a leaf is
    /// needed, is replaced.
    pub fn add(&mut self, path: &[&str], predicate: Predicate) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };

        let mut level = self;
        for segment in parents {
            let node = level
                .fields
                .entry(segment.to_string())
                .or_insert_with(|| FilterNode::Nested(Filter::new()));
            if let FilterNode::Conditions(_) = node {
                *node = FilterNode::Nested(Filter::new());
            }
            level = match node {
                FilterNode::Nested(inner) => inner,
                FilterNode::Conditions(_) => unreachable!("replaced above"),
            };
        }

        match level.fields.get_mut(*last) {
            Some(FilterNode::Conditions(predicates)) => predicates.push(predicate),
            _ => {
                level
                    .fields
                    .insert(last.to_string(), FilterNode::Conditions(vec![predicate]));
            }
        }
    }

    /// Flattens the tree into `(path, predicates)` pairs in key order.
    pub fn leaves(&self) -> Vec<(Vec<&str>, &[Predicate])> {
        let mut out = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut out);
        out
    }

    fn collect_leaves<'a>(
        &'a self,
        prefix: &mut Vec<&'a str>,
        out: &mut Vec<(Vec<&'a str>, &'a [Predicate])>,
    ) {
        for (field, node) in &self.fields {
            prefix.push(field.as_str());
            match node {
                FilterNode::Conditions(predicates) => {
                    out.push((prefix.clone(), predicates.as_slice()))
                }
                FilterNode::Nested(inner) => inner.collect_leaves(prefix, out),
            }
            prefix.pop();
        }
    }
}
