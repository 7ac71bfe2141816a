//! Query construction.
//!
//! A [`Query`] accumulates constraints, projections, includes, ordering and
//! pagination for one class, and serializes them into request parameters.
//! Executing it is the client's job.

use crate::codec::encode;
use crate::{error::Result, ClassName, GeoPoint, Record, Value};
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;

/// Constraint on one field.
#[derive(Debug, Clone, PartialEq)]
enum Constraint {
    Equals(Value),
    /// Operator name (e.g. `$gt`) to operand
    Operators(BTreeMap<String, Value>),
}

impl Constraint {
    fn to_value(&self) -> Value {
        match self {
            Constraint::Equals(value) => value.clone(),
            Constraint::Operators(ops) => Value::Map(ops.clone()),
        }
    }
}

/// Builder for a query against one class.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    class_name: ClassName,
    constraints: BTreeMap<String, Constraint>,
    include: Vec<String>,
    keys: Vec<String>,
    order: Vec<String>,
    limit: Option<u32>,
    skip: u32,
}

impl Query {
    pub fn new(class_name: impl Into<ClassName>) -> Self {
        Self {
            class_name: class_name.into(),
            constraints: BTreeMap::new(),
            include: Vec::new(),
            keys: Vec::new(),
            order: Vec::new(),
            limit: None,
            skip: 0,
        }
    }

    /// Query matching any of the given queries. All must target the same class.
    pub fn or(class_name: impl Into<ClassName>, queries: &[Query]) -> Self {
        let clauses = queries.iter().map(Query::where_value).collect::<Vec<_>>();
        let mut query = Query::new(class_name);
        query
            .constraints
            .insert("$or".into(), Constraint::Equals(Value::Array(clauses)));
        query
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn limit_value(&self) -> Option<u32> {
        self.limit
    }

    pub fn skip_value(&self) -> u32 {
        self.skip
    }

    /// Require `key` to equal `value`. Replaces any other constraint on `key`.
    pub fn where_equal_to(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.constraints
            .insert(key.to_owned(), Constraint::Equals(value.into()));
        self
    }

    pub fn where_not_equal_to(self, key: &str, value: impl Into<Value>) -> Self {
        self.add_operator(key, "$ne", value.into())
    }

    pub fn where_less_than(self, key: &str, value: impl Into<Value>) -> Self {
        self.add_operator(key, "$lt", value.into())
    }

    pub fn where_less_than_or_equal_to(self, key: &str, value: impl Into<Value>) -> Self {
        self.add_operator(key, "$lte", value.into())
    }

    pub fn where_greater_than(self, key: &str, value: impl Into<Value>) -> Self {
        self.add_operator(key, "$gt", value.into())
    }

    pub fn where_greater_than_or_equal_to(self, key: &str, value: impl Into<Value>) -> Self {
        self.add_operator(key, "$gte", value.into())
    }

    pub fn where_contained_in<V: Into<Value>>(
        self,
        key: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.add_operator(key, "$in", array(values))
    }

    pub fn where_not_contained_in<V: Into<Value>>(
        self,
        key: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.add_operator(key, "$nin", array(values))
    }

    pub fn where_contains_all<V: Into<Value>>(
        self,
        key: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.add_operator(key, "$all", array(values))
    }

    pub fn where_exists(self, key: &str) -> Self {
        self.add_operator(key, "$exists", Value::Bool(true))
    }

    pub fn where_does_not_exist(self, key: &str) -> Self {
        self.add_operator(key, "$exists", Value::Bool(false))
    }

    /// Regular expression match, with optional modifier flags such as `"i"`.
    pub fn where_matches(self, key: &str, regex: &str, modifiers: Option<&str>) -> Self {
        let query = self.add_operator(key, "$regex", Value::from(regex));
        match modifiers {
            Some(m) if !m.is_empty() => query.add_operator(key, "$options", Value::from(m)),
            _ => query,
        }
    }

    pub fn where_starts_with(self, key: &str, prefix: &str) -> Self {
        let regex = format!("^{}", escape_regex(prefix));
        self.add_operator(key, "$regex", Value::from(regex))
    }

    pub fn where_ends_with(self, key: &str, suffix: &str) -> Self {
        let regex = format!("{}$", escape_regex(suffix));
        self.add_operator(key, "$regex", Value::from(regex))
    }

    /// Substring match.
    pub fn where_contains(self, key: &str, substring: &str) -> Self {
        self.add_operator(key, "$regex", Value::from(escape_regex(substring)))
    }

    /// Sort results by distance from `point`.
    pub fn where_near(self, key: &str, point: GeoPoint) -> Self {
        self.add_operator(key, "$nearSphere", Value::GeoPoint(point))
    }

    pub fn where_within_kilometers(self, key: &str, point: GeoPoint, max: f64) -> Self {
        self.where_near(key, point)
            .add_operator(key, "$maxDistanceInKilometers", Value::from(max))
    }

    pub fn where_within_miles(self, key: &str, point: GeoPoint, max: f64) -> Self {
        self.where_near(key, point)
            .add_operator(key, "$maxDistanceInMiles", Value::from(max))
    }

    pub fn where_within_radians(self, key: &str, point: GeoPoint, max: f64) -> Self {
        self.where_near(key, point)
            .add_operator(key, "$maxDistance", Value::from(max))
    }

    /// Points inside the box spanned by its south-west and north-east corners.
    pub fn where_within_geo_box(self, key: &str, south_west: GeoPoint, north_east: GeoPoint) -> Self {
        let mut within = BTreeMap::new();
        within.insert(
            "$box".to_owned(),
            Value::Array(vec![Value::GeoPoint(south_west), Value::GeoPoint(north_east)]),
        );
        self.add_operator(key, "$within", Value::Map(within))
    }

    /// Require `key` to point at an object matched by `query`.
    pub fn where_matches_query(self, key: &str, query: &Query) -> Self {
        self.add_operator(key, "$inQuery", query.subquery_value())
    }

    pub fn where_does_not_match_query(self, key: &str, query: &Query) -> Self {
        self.add_operator(key, "$notInQuery", query.subquery_value())
    }

    /// Objects that are members of `parent`'s relation `key`.
    pub fn where_related_to(mut self, parent: &Record, key: &str) -> Self {
        let mut related = BTreeMap::new();
        related.insert("object".to_owned(), Value::from(parent));
        related.insert("key".to_owned(), Value::from(key));
        self.constraints
            .insert("$relatedTo".into(), Constraint::Equals(Value::Map(related)));
        self
    }

    /// Include the full objects behind pointer fields.
    pub fn include(mut self, key: &str) -> Self {
        self.include.push(key.to_owned());
        self
    }

    /// Restrict returned fields.
    pub fn keys<'k>(mut self, keys: impl IntoIterator<Item = &'k str>) -> Self {
        self.keys.extend(keys.into_iter().map(str::to_owned));
        self
    }

    pub fn select<'k>(self, keys: impl IntoIterator<Item = &'k str>) -> Self {
        self.keys(keys)
    }

    pub fn order_by_ascending(mut self, key: &str) -> Self {
        self.order = vec![key.to_owned()];
        self
    }

    pub fn order_by_descending(mut self, key: &str) -> Self {
        self.order = vec![format!("-{key}")];
        self
    }

    pub fn add_ascending(mut self, key: &str) -> Self {
        self.order.push(key.to_owned());
        self
    }

    pub fn add_descending(mut self, key: &str) -> Self {
        self.order.push(format!("-{key}"));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = skip;
        self
    }

    /// The `where` clause in wire form.
    pub fn where_json(&self) -> Result<Json> {
        encode(&self.where_value(), false)
    }

    /// Request parameters. Empty and default settings are omitted.
    pub fn to_params(&self) -> Result<Vec<(String, String)>> {
        let mut params = Vec::new();
        if !self.constraints.is_empty() {
            params.push(("where".into(), self.where_json()?.to_string()));
        }
        if !self.include.is_empty() {
            params.push(("include".into(), self.include.join(",")));
        }
        if !self.keys.is_empty() {
            params.push(("keys".into(), self.keys.join(",")));
        }
        if !self.order.is_empty() {
            params.push(("order".into(), self.order.join(",")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".into(), limit.to_string()));
        }
        if self.skip > 0 {
            params.push(("skip".into(), self.skip.to_string()));
        }
        Ok(params)
    }

    /// Parameters for a count: same constraints, no results.
    pub fn to_count_params(&self) -> Result<Vec<(String, String)>> {
        let mut params: Vec<(String, String)> = self
            .to_params()?
            .into_iter()
            .filter(|(name, _)| name != "limit")
            .collect();
        params.push(("count".into(), "1".into()));
        params.push(("limit".into(), "0".into()));
        Ok(params)
    }

    /// Parameters for fetching a single object: only projections apply.
    pub fn to_get_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if !self.include.is_empty() {
            params.push(("include".into(), self.include.join(",")));
        }
        if !self.keys.is_empty() {
            params.push(("keys".into(), self.keys.join(",")));
        }
        params
    }

    /// Body form of the query.
    pub fn to_json(&self) -> Result<Json> {
        let mut body = json!({
            "className": self.class_name,
            "where": self.where_json()?,
        });
        if !self.include.is_empty() {
            body["include"] = Json::String(self.include.join(","));
        }
        if !self.keys.is_empty() {
            body["keys"] = Json::String(self.keys.join(","));
        }
        if !self.order.is_empty() {
            body["order"] = Json::String(self.order.join(","));
        }
        if let Some(limit) = self.limit {
            body["limit"] = Json::from(limit);
        }
        if self.skip > 0 {
            body["skip"] = Json::from(self.skip);
        }
        Ok(body)
    }

    /// Selected keys, for live-query subscriptions.
    pub fn selected_keys(&self) -> &[String] {
        &self.keys
    }

    fn add_operator(mut self, key: &str, operator: &str, operand: Value) -> Self {
        let entry = self
            .constraints
            .entry(key.to_owned())
            .or_insert_with(|| Constraint::Operators(BTreeMap::new()));
        if let Constraint::Equals(_) = entry {
            *entry = Constraint::Operators(BTreeMap::new());
        }
        if let Constraint::Operators(ops) = entry {
            ops.insert(operator.to_owned(), operand);
        }
        self
    }

    fn where_value(&self) -> Value {
        Value::Map(
            self.constraints
                .iter()
                .map(|(k, c)| (k.clone(), c.to_value()))
                .collect(),
        )
    }

    fn subquery_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("className".to_owned(), Value::from(self.class_name.as_str()));
        map.insert("where".to_owned(), self.where_value());
        Value::Map(map)
    }
}

fn array<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Value {
    Value::Array(values.into_iter().map(Into::into).collect())
}

/// Escape regular-expression metacharacters so `literal` matches itself.
pub fn escape_regex(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(
            c,
            '\\' | '^' | '$' | '.' | '|' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' | '}'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
