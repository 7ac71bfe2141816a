//! Field values stored on records.
//!
//! A [`Value`] is a closed set of the shapes the backend understands. Typed
//! reads go through [`FromValue`], which fails with a type mismatch instead of
//! silently coercing.

use crate::{error::Result, Acl, ClassName, Error, ObjectId, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A numeric field value.
///
/// Integer arithmetic stays integral; anything involving a float (or an
/// overflowing integer sum) becomes a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Value as `f64`.
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Value as `i64`, if it is integral.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(i),
            Number::Float(f) if f.fract() == 0.0 => Some(f as i64),
            Number::Float(_) => None,
        }
    }

    /// Sum of two numbers.
    pub fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_add(b)
                .map(Number::Int)
                .unwrap_or(Number::Float(a as f64 + b as f64)),
            (a, b) => Number::Float(a.as_f64() + b.as_f64()),
        }
    }

    pub(crate) fn to_json(self) -> serde_json::Value {
        match self {
            Number::Int(i) => serde_json::Value::from(i),
            Number::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        }
    }

    pub(crate) fn from_json(n: &serde_json::Number) -> Self {
        match n.as_i64() {
            Some(i) => Number::Int(i),
            None => Number::Float(n.as_f64().unwrap_or_default()),
        }
    }
}

impl From<i32> for Number {
    fn from(v: i32) -> Self {
        Number::Int(v.into())
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Int(v)
    }
}

impl From<u32> for Number {
    fn from(v: u32) -> Self {
        Number::Int(v.into())
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Float(v)
    }
}

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

const EARTH_RADIUS_KM: f64 = 6371.0;
const EARTH_RADIUS_MILES: f64 = 3958.8;

impl GeoPoint {
    /// Create a geo point, validating the coordinate ranges.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidGeoPoint {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Great-circle distance to another point, in radians.
    pub fn radians_to(&self, other: &GeoPoint) -> f64 {
        let (lat1, lon1) = (self.latitude.to_radians(), self.longitude.to_radians());
        let (lat2, lon2) = (other.latitude.to_radians(), other.longitude.to_radians());
        let sin_lat = ((lat1 - lat2) / 2.0).sin();
        let sin_lon = ((lon1 - lon2) / 2.0).sin();
        let a = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lon * sin_lon;
        2.0 * a.sqrt().min(1.0).asin()
    }

    pub fn kilometers_to(&self, other: &GeoPoint) -> f64 {
        self.radians_to(other) * EARTH_RADIUS_KM
    }

    pub fn miles_to(&self, other: &GeoPoint) -> f64 {
        self.radians_to(other) * EARTH_RADIUS_MILES
    }
}

/// Reference to a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Server-side file name
    pub name: String,
    /// Public URL, known once the file is uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl FileRef {
    pub fn new(name: impl Into<String>, url: Option<String>) -> Self {
        Self {
            name: name.into(),
            url,
        }
    }
}

/// Marker stored in a field that holds a relation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationRef {
    /// Class of the related objects, when known
    pub target_class: Option<ClassName>,
}

/// A saved object referenced by class and id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pointer {
    pub class_name: ClassName,
    pub object_id: ObjectId,
}

impl Pointer {
    pub fn new(class_name: impl Into<ClassName>, object_id: impl Into<ObjectId>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: object_id.into(),
        }
    }

    /// Wire form of this pointer.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "__type": "Pointer",
            "className": self.class_name,
            "objectId": self.object_id,
        })
    }

    /// Pointer to a saved record, or `None` if it has no id yet.
    pub fn to_record(record: &Record) -> Option<Self> {
        record
            .object_id()
            .map(|id| Pointer::new(record.class_name(), id))
    }
}

/// A field value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Date(DateTime<Utc>),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Another record, either fully hydrated or a pointer shell
    Object(Box<Record>),
    File(FileRef),
    GeoPoint(GeoPoint),
    Relation(RelationRef),
    Acl(Acl),
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Date(_) => "Date",
            Value::Bytes(_) => "Bytes",
            Value::Array(_) => "Array",
            Value::Map(_) => "Map",
            Value::Object(_) => "Object",
            Value::File(_) => "File",
            Value::GeoPoint(_) => "GeoPoint",
            Value::Relation(_) => "Relation",
            Value::Acl(_) => "ACL",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_number().and_then(Number::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(Number::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Record> {
        match self {
            Value::Object(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileRef> {
        match self {
            Value::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_geo_point(&self) -> Option<GeoPoint> {
        match self {
            Value::GeoPoint(point) => Some(*point),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&RelationRef> {
        match self {
            Value::Relation(relation) => Some(relation),
            _ => None,
        }
    }
}

/// Fallible conversion out of a [`Value`].
pub trait FromValue: Sized {
    /// Name of the expected variant, for error messages.
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! from_value {
    ($ty:ty, $name:literal, $accessor:expr) => {
        impl FromValue for $ty {
            const EXPECTED: &'static str = $name;

            fn from_value(value: &Value) -> Option<Self> {
                $accessor(value)
            }
        }
    };
}

from_value!(bool, "Bool", Value::as_bool);
from_value!(i64, "Number", Value::as_i64);
from_value!(f64, "Number", Value::as_f64);
from_value!(Number, "Number", Value::as_number);
from_value!(String, "String", |v: &Value| v.as_str().map(str::to_owned));
from_value!(DateTime<Utc>, "Date", Value::as_date);
from_value!(GeoPoint, "GeoPoint", Value::as_geo_point);
from_value!(FileRef, "File", |v: &Value| v.as_file().cloned());
from_value!(Record, "Object", |v: &Value| v.as_object().cloned());
from_value!(Vec<Value>, "Array", |v: &Value| v.as_array().map(<[Value]>::to_vec));
from_value!(BTreeMap<String, Value>, "Map", |v: &Value| v.as_map().cloned());

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Number(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v.into())
    }
}

impl From<Number> for Value {
    fn from(v: Number) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Object(Box::new(v))
    }
}

impl From<&Record> for Value {
    fn from(v: &Record) -> Self {
        Value::Object(Box::new(v.clone()))
    }
}

impl From<GeoPoint> for Value {
    fn from(v: GeoPoint) -> Self {
        Value::GeoPoint(v)
    }
}

impl From<FileRef> for Value {
    fn from(v: FileRef) -> Self {
        Value::File(v)
    }
}

impl From<Acl> for Value {
    fn from(v: Acl) -> Self {
        Value::Acl(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(v: BTreeMap<String, T>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Plain structural conversion. `__type` tags are not interpreted; use
/// [`crate::codec::decode`] for wire payloads.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(Number::from_json(&n)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
