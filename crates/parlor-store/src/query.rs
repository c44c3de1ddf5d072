//! Live-query description and in-process evaluation.
//!
//! Both backends evaluate queries in Rust over the documents of one
//! collection. Result order is the requested sort key, then creation order.

use std::cmp::Ordering;

use serde_json::Value;

use crate::document::Document;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field at `path` equals `value`.
    Eq { path: String, value: Value },
    /// Field at `path` is an array containing `value`.
    ArrayContains { path: String, value: Value },
    /// Document id is one of `ids`.
    IdIn(Vec<String>),
}

impl Filter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq { path, value } => doc.get(path) == Some(value),
            Filter::ArrayContains { path, value } => doc
                .get(path)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Filter::IdIn(ids) => ids.iter().any(|id| *id == doc.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub path: String,
    pub direction: Direction,
}

/// A filtered, optionally ordered view of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order: None,
        }
    }

    pub fn where_eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_array_contains(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::ArrayContains {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_id_in<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters
            .push(Filter::IdIn(ids.into_iter().map(Into::into).collect()));
        self
    }

    pub fn order_by(mut self, path: impl Into<String>, direction: Direction) -> Self {
        self.order = Some(OrderBy {
            path: path.into(),
            direction,
        });
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Filter and sort `docs` into this query's result set.
    pub fn run<I>(&self, docs: I) -> Vec<Document>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut hits: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        hits.sort_by(|a, b| {
            let primary = match &self.order {
                Some(order) => {
                    let ord = compare_values(a.get(&order.path), b.get(&order.path));
                    match order.direction {
                        Direction::Ascending => ord,
                        Direction::Descending => ord.reverse(),
                    }
                }
                None => Ordering::Equal,
            };
            primary.then(a.seq.cmp(&b.seq))
        });

        hits
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over JSON values: missing/null < bool < number < string, then
/// by value within a type. Arrays and objects compare equal among themselves.
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, seq: u64, fields: Value) -> Document {
        Document {
            id: id.into(),
            seq,
            fields,
        }
    }

    #[test]
    fn array_contains_filter() {
        let q = Query::collection("chats").where_array_contains("members", "a");
        assert!(q.matches(&doc("c1", 1, json!({ "members": ["a", "b"] }))));
        assert!(!q.matches(&doc("c2", 2, json!({ "members": ["b", "c"] }))));
        assert!(!q.matches(&doc("c3", 3, json!({ "members": "a" }))));
    }

    #[test]
    fn order_with_seq_tie_break() {
        let q = Query::collection("messages")
            .where_eq("chatId", "c1")
            .order_by("timestamp", Direction::Ascending);

        let docs = vec![
            doc("m3", 3, json!({ "chatId": "c1", "timestamp": "2024-01-01T00:00:02Z" })),
            doc("m2", 2, json!({ "chatId": "c1", "timestamp": "2024-01-01T00:00:01Z" })),
            doc("m1", 1, json!({ "chatId": "c1", "timestamp": "2024-01-01T00:00:01Z" })),
            doc("x1", 4, json!({ "chatId": "c2", "timestamp": "2024-01-01T00:00:00Z" })),
        ];

        let ids: Vec<String> = q.run(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn descending_order_keeps_creation_tie_break() {
        let q = Query::collection("chats").order_by("rank", Direction::Descending);
        let docs = vec![
            doc("a", 1, json!({ "rank": 1 })),
            doc("b", 2, json!({ "rank": 5 })),
            doc("c", 3, json!({ "rank": 1 })),
            doc("d", 4, json!({})),
        ];
        let ids: Vec<String> = q.run(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn id_filter() {
        let q = Query::collection("users").where_id_in(["u1", "u3"]);
        let docs = (1..=3).map(|i| doc(&format!("u{i}"), i, json!({})));
        let ids: Vec<String> = q.run(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["u1", "u3"]);
    }
}
