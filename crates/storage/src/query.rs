use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    ArrayContains(String, Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Filtered, ordered, limited read over one collection.
/// Field paths may be dotted (`participant_info.alice.username`).
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.into(), value.into()));
        self
    }

    pub fn where_array_contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters
            .push(Filter::ArrayContains(field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.filters.iter().all(|f| match f {
            Filter::Eq(path, expected) => field(doc, path) == Some(expected),
            Filter::ArrayContains(path, expected) => field(doc, path)
                .and_then(Value::as_array)
                .map_or(false, |items| items.contains(expected)),
        })
    }

    /// Evaluates the query over documents given in natural (id) order.
    pub fn evaluate<'a>(&self, docs: impl IntoIterator<Item = &'a Value>) -> Vec<Value> {
        let mut hits: Vec<&Value> = docs.into_iter().filter(|d| self.matches(d)).collect();
        if let Some((path, direction)) = &self.order_by {
            hits.sort_by(|a, b| {
                let ord = compare(field(a, path), field(b, path));
                match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            hits.truncate(limit);
        }
        hits.into_iter().cloned().collect()
    }
}

fn field<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |v, key| v.get(key))
}

// Missing fields sort first, like nulls.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x
                    .as_f64()
                    .unwrap_or_default()
                    .partial_cmp(&y.as_f64().unwrap_or_default())
                    .unwrap_or(Ordering::Equal),
            }
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs() -> Vec<Value> {
        vec![
            json!({ "id": "1", "post_id": "p1", "created_at": 30, "tags": ["a"] }),
            json!({ "id": "2", "post_id": "p2", "created_at": 10, "tags": ["a", "b"] }),
            json!({ "id": "3", "post_id": "p1", "created_at": 20, "tags": [] }),
            json!({ "id": "4", "post_id": "p1" }),
        ]
    }

    fn ids(values: &[Value]) -> Vec<&str> {
        values.iter().map(|v| v["id"].as_str().unwrap()).collect()
    }

    #[test]
    fn filters_and_orders() {
        let docs = docs();
        let q = Query::collection("comments")
            .where_eq("post_id", "p1")
            .order_by("created_at", Direction::Asc);
        assert_eq!(ids(&q.evaluate(&docs)), vec!["4", "3", "1"]);
    }

    #[test]
    fn array_contains_and_limit() {
        let docs = docs();
        let q = Query::collection("x")
            .where_array_contains("tags", "a")
            .order_by("created_at", Direction::Desc)
            .limit(1);
        assert_eq!(ids(&q.evaluate(&docs)), vec!["1"]);
    }

    #[test]
    fn dotted_paths() {
        let doc = json!({ "unread": { "alice": 2 } });
        assert!(Query::collection("c").where_eq("unread.alice", 2).matches(&doc));
        assert!(!Query::collection("c").where_eq("unread.bob", 2).matches(&doc));
    }
}
