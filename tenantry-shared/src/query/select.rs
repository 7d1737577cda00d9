use std::collections::BTreeMap;

use serde_json::{Map, Value as Json};

/// Fields every projection starts with; `id` can never be switched off.
pub const DEFAULT_SELECTED: [&str; 3] = ["id", "createdAt", "updatedAt"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Field(bool),
    Nested(SelectTree),
}

/// Projection tree built from `select[...]` keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectTree {
    fields: BTreeMap<String, Selection>,
}

impl SelectTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_defaults() -> Self {
        let mut tree = Self::new();
        for field in DEFAULT_SELECTED {
            tree.set(&[field], true);
        }
        tree
    }

    pub fn get(&self, field: &str) -> Option<&Selection> {
        self.fields.get(field)
    }

    /// Flag at a dotted path, if that path is a leaf.
    pub fn is_selected(&self, path: &str) -> Option<bool> {
        let mut segments = path.split('.').peekable();
        let mut level = self;
        while let Some(segment) = segments.next() {
            match (level.fields.get(segment)?, segments.peek()) {
                (Selection::Field(on), None) => return Some(*on),
                (Selection::Nested(inner), Some(_)) => level = inner,
                _ => return None,
            }
        }
        None
    }

    pub fn set(&mut self, path: &[&str], on: bool) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };

        let mut level = self;
        for segment in parents {
            let node = level
                .fields
                .entry(segment.to_string())
                .or_insert_with(|| Selection::Nested(SelectTree::new()));
            if let Selection::Field(_) = node {
                *node = Selection::Nested(SelectTree::new());
            }
            level = match node {
                Selection::Nested(inner) => inner,
                Selection::Field(_) => unreachable!("replaced above"),
            };
        }
        level.fields.insert(last.to_string(), Selection::Field(on));
    }


    /// Keeps only the selected fields of a serialized record.
    ///
    /// Arrays are projected element-wise, so a nested selection applies to
    /// every item of a to-many relation.
    pub fn project(&self, value: &Json) -> Json {
        match value {
            Json::Array(items) => Json::Array(items.iter().map(|item| self.project(item)).collect()),
            Json::Object(object) => {
                let mut out = Map::new();
                for (field, selection) in &self.fields {
                    let Some(inner) = object.get(field) else {
                        continue;
                    };
                    match selection {
                        Selection::Field(true) => {
                            out.insert(field.clone(), inner.clone());
                        }
                        Selection::Field(false) => {}
                        Selection::Nested(tree) => {
                            out.insert(field.clone(), tree.project(inner));
                        }
                    }
                }
                Json::Object(out)
            }
            other => other.clone(),
        }
    }
}
