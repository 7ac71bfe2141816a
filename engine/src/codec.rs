//! Wire encoding of field values.
//!
//! Special types travel as JSON objects tagged with `__type`:
//!
//! | Type | Wire form |
//! |---|---|
//! | Date | `{"__type": "Date", "iso": "2024-01-01T00:00:00.000Z"}` |
//! | Pointer | `{"__type": "Pointer", "className": .., "objectId": ..}` |
//! | Object | `{"__type": "Object", "className": .., ...fields}` |
//! | File | `{"__type": "File", "name": .., "url": ..}` |
//! | GeoPoint | `{"__type": "GeoPoint", "latitude": .., "longitude": ..}` |
//! | Relation | `{"__type": "Relation", "className": ..}` |
//! | Bytes | `{"__type": "Bytes", "base64": ..}` |
//!
//! Maps without `__type` are plain nested maps.

use crate::value::{FileRef, GeoPoint, Number, RelationRef};
use crate::{error::Result, Error, Record, Value};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value as Json};

/// Traversal state for one top-level encode call.
///
/// Tracks the chain of records currently being fully encoded so that a record
/// nested inside itself is reported instead of recursing forever.
#[derive(Debug, Default)]
pub struct EncodeContext {
    full: bool,
    ancestors: Vec<String>,
}

impl EncodeContext {
    /// `full` selects complete nested objects instead of pointers.
    pub fn new(full: bool) -> Self {
        Self {
            full,
            ancestors: Vec::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub(crate) fn enter(&mut self, identity: Option<String>) -> Result<()> {
        if let Some(identity) = identity {
            if self.ancestors.contains(&identity) {
                return Err(Error::CircularReference(identity));
            }
            self.ancestors.push(identity);
        } else {
            // Records without any identity cannot be matched; keep the stack balanced.
            self.ancestors.push(String::new());
        }
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.ancestors.pop();
    }
}

/// Format a timestamp the way the backend expects.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_date(iso: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(iso)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::InvalidJson(format!("invalid date '{iso}': {e}")))
}

/// Wire form of a timestamp.
pub fn encode_date(date: &DateTime<Utc>) -> Json {
    json!({"__type": "Date", "iso": format_date(date)})
}

/// Encode a value. Nested records become pointers unless `full` is set.
pub fn encode(value: &Value, full: bool) -> Result<Json> {
    encode_with(value, &mut EncodeContext::new(full))
}

/// Encode a value, threading an existing traversal context.
pub fn encode_with(value: &Value, ctx: &mut EncodeContext) -> Result<Json> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => n.to_json(),
        Value::String(s) => Json::String(s.clone()),
        Value::Date(d) => encode_date(d),
        Value::Bytes(bytes) => json!({"__type": "Bytes", "base64": STANDARD.encode(bytes)}),
        Value::Array(items) => Json::Array(
            items
                .iter()
                .map(|item| encode_with(item, ctx))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Map(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), encode_with(item, ctx)?);
            }
            Json::Object(out)
        }
        Value::Object(record) if ctx.is_full() => record.encode_full(ctx)?,
        Value::Object(record) => record.to_pointer(),
        Value::File(file) => {
            let mut out = json!({"__type": "File", "name": file.name});
            if let Some(url) = &file.url {
                out["url"] = Json::String(url.clone());
            }
            out
        }
        Value::GeoPoint(point) => json!({
            "__type": "GeoPoint",
            "latitude": point.latitude,
            "longitude": point.longitude,
        }),
        Value::Relation(relation) => {
            let mut out = json!({"__type": "Relation"});
            if let Some(class_name) = &relation.target_class {
                out["className"] = Json::String(class_name.clone());
            }
            out
        }
        Value::Acl(acl) => acl.to_json(),
    })
}

/// Decode a wire value, interpreting `__type` tags.
pub fn decode(json: &Json) -> Result<Value> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(Number::from_json(n)),
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(decode).collect::<Result<_>>()?),
        Json::Object(map) => match map.get("__type").and_then(Json::as_str) {
            Some("Date") => Value::Date(parse_date(str_field(map, "iso", "Date")?)?),
            Some("Pointer") => {
                let class_name = str_field(map, "className", "Pointer")?;
                let record = match map.get("_localId").and_then(Json::as_str) {
                    Some(local_id) if !map.contains_key("objectId") => {
                        Record::with_local_id(class_name, local_id)
                    }
                    _ => Record::with_id(class_name, str_field(map, "objectId", "Pointer")?),
                };
                Value::Object(Box::new(record))
            }
            Some("Object") => Value::Object(Box::new(Record::from_wire_format(None, json)?)),
            Some("File") => Value::File(FileRef::new(
                str_field(map, "name", "File")?,
                map.get("url").and_then(Json::as_str).map(str::to_owned),
            )),
            Some("GeoPoint") => Value::GeoPoint(GeoPoint::new(
                num_field(map, "latitude", "GeoPoint")?,
                num_field(map, "longitude", "GeoPoint")?,
            )?),
            Some("Relation") => Value::Relation(RelationRef {
                target_class: map
                    .get("className")
                    .and_then(Json::as_str)
                    .map(str::to_owned),
            }),
            Some("Bytes") => Value::Bytes(
                STANDARD
                    .decode(str_field(map, "base64", "Bytes")?)
                    .map_err(|e| Error::InvalidJson(format!("invalid base64: {e}")))?,
            ),
            Some(other) => return Err(Error::InvalidJson(format!("unknown __type '{other}'"))),
            None => Value::Map(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), decode(v)?)))
                    .collect::<Result<_>>()?,
            ),
        },
    })
}

fn str_field<'a>(map: &'a Map<String, Json>, key: &str, ty: &str) -> Result<&'a str> {
    map.get(key)
        .and_then(Json::as_str)
        .ok_or_else(|| Error::InvalidJson(format!("{ty} is missing string field '{key}'")))
}

fn num_field(map: &Map<String, Json>, key: &str, ty: &str) -> Result<f64> {
    map.get(key)
        .and_then(Json::as_f64)
        .ok_or_else(|| Error::InvalidJson(format!("{ty} is missing number field '{key}'")))
}
