//! The record entity.
//!
//! A [`Record`] mirrors one remote object. It keeps the last state confirmed
//! by the server separately from local edits, which are queued as
//! [`FieldOp`]s until a save succeeds.
//!
//! The IO half of the lifecycle (issuing the requests) lives in the client
//! crate; this type only builds request bodies and absorbs responses.

use crate::codec::{self, decode, format_date, parse_date, EncodeContext};
use crate::value::{FromValue, Number};
use crate::{error::Result, Acl, ClassName, Error, FieldOp, ObjectId, Value};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value as Json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Dirty-key entry used for a pending ACL change.
pub const ACL_KEY: &str = "ACL";

/// Keys that cannot be written through [`Record::set`].
pub const RESERVED_KEYS: [&str; 5] = ["id", "objectId", "createdAt", "updatedAt", ACL_KEY];

/// Keys carried in wire payloads that are not user fields.
const META_KEYS: [&str; 6] = ["objectId", "createdAt", "updatedAt", ACL_KEY, "className", "__type"];

/// A remote object with local change tracking.
///
/// Two records are equal only when both are saved and share class and id.
/// Unsaved records compare unequal to everything, themselves included; use
/// [`std::ptr::eq`] for identity.
#[derive(Debug, Clone)]
pub struct Record {
    class_name: ClassName,
    object_id: Option<ObjectId>,
    /// Placeholder id, allocated the first time an unsaved record is referenced
    local_id: OnceLock<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    acl: Option<Acl>,
    /// Last values confirmed by the server
    server_data: BTreeMap<String, Value>,
    /// Local edits not yet confirmed
    pending: BTreeMap<String, FieldOp>,
    acl_dirty: bool,
}

impl Record {
    /// Create a fresh, unsaved record.
    pub fn new(class_name: impl Into<ClassName>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: None,
            local_id: OnceLock::new(),
            created_at: None,
            updated_at: None,
            acl: None,
            server_data: BTreeMap::new(),
            pending: BTreeMap::new(),
            acl_dirty: false,
        }
    }

    /// Create a shell for an existing object, known only by id.
    pub fn with_id(class_name: impl Into<ClassName>, object_id: impl Into<ObjectId>) -> Self {
        let mut record = Self::new(class_name);
        record.object_id = Some(object_id.into());
        record
    }

    /// Shell for an unsaved object known only by its local placeholder id.
    pub(crate) fn with_local_id(class_name: impl Into<ClassName>, local_id: impl Into<String>) -> Self {
        let record = Self::new(class_name);
        let _ = record.local_id.set(local_id.into());
        record
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    /// Local placeholder id, if one has been allocated.
    pub fn local_id(&self) -> Option<&str> {
        self.local_id.get().map(String::as_str)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn acl(&self) -> Option<&Acl> {
        self.acl.as_ref()
    }

    /// Whether the record has been persisted at least once.
    pub fn is_saved(&self) -> bool {
        self.object_id.is_some()
    }

    /// Replace the access control list and mark it dirty.
    pub fn set_acl(&mut self, acl: Acl) {
        self.acl = Some(acl);
        self.acl_dirty = true;
    }

    /// Current value of `key`, taking pending edits into account.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "id" | "objectId" => return self.object_id.clone().map(Value::String),
            "createdAt" => return self.created_at.map(Value::Date),
            "updatedAt" => return self.updated_at.map(Value::Date),
            ACL_KEY => return self.acl.clone().map(Value::Acl),
            _ => {}
        }
        match self.pending.get(key) {
            // Pending ops are checked against the server value when queued.
            Some(op) => op.apply(self.server_data.get(key), key).ok().flatten(),
            None => self.server_data.get(key).cloned(),
        }
    }

    /// Typed read. Absent and null fields read as `None`.
    pub fn get_as<T: FromValue>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(&value)
                .map(Some)
                .ok_or_else(|| Error::mismatch(key, T::EXPECTED, value.type_name())),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Names of all fields that currently hold a value.
    pub fn keys(&self) -> BTreeSet<String> {
        self.current_fields().into_keys().collect()
    }

    /// Set a field, replacing any pending edit on it.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        validate_key(key)?;
        self.pending.insert(key.to_owned(), FieldOp::Set(value.into()));
        Ok(())
    }

    /// Remove a field. The next save sends a delete for it.
    pub fn unset(&mut self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.server_data.remove(key);
        self.pending.insert(key.to_owned(), FieldOp::Unset);
        Ok(())
    }

    /// Add `amount` to a numeric field (missing counts as zero).
    ///
    /// The sum is computed locally and stored as a plain set, so reads reflect
    /// it immediately.
    pub fn increment(&mut self, key: &str, amount: impl Into<Number>) -> Result<()> {
        let current = match self.get(key) {
            None | Some(Value::Null) => Number::Int(0),
            Some(Value::Number(n)) => n,
            Some(other) => return Err(Error::mismatch(key, "Number", other.type_name())),
        };
        self.set(key, Value::Number(current.add(amount.into())))
    }

    pub fn decrement(&mut self, key: &str, amount: impl Into<Number>) -> Result<()> {
        let amount = match amount.into() {
            Number::Int(i) => Number::Int(i.saturating_neg()),
            Number::Float(f) => Number::Float(-f),
        };
        self.increment(key, amount)
    }

    /// Queue an operation, collapsing it with any pending edit on `key`.
    pub fn set_op(&mut self, key: &str, op: FieldOp) -> Result<()> {
        validate_key(key)?;
        let merged = match self.pending.get(key) {
            Some(earlier) => op.merge_with(earlier, key)?,
            None => op,
        };
        merged.apply(self.server_data.get(key), key)?;
        self.pending.insert(key.to_owned(), merged);
        Ok(())
    }

    pub fn add_to_array<V: Into<Value>>(
        &mut self,
        key: &str,
        items: impl IntoIterator<Item = V>,
    ) -> Result<()> {
        self.set_op(key, FieldOp::AddItems(collect_values(items)))
    }

    pub fn add_unique_to_array<V: Into<Value>>(
        &mut self,
        key: &str,
        items: impl IntoIterator<Item = V>,
    ) -> Result<()> {
        self.set_op(key, FieldOp::AddUniqueItems(collect_values(items)))
    }

    pub fn remove_from_array<V: Into<Value>>(
        &mut self,
        key: &str,
        items: impl IntoIterator<Item = V>,
    ) -> Result<()> {
        self.set_op(key, FieldOp::RemoveItems(collect_values(items)))
    }

    /// Pending operation queued on `key`.
    pub fn pending_op(&self, key: &str) -> Option<&FieldOp> {
        self.pending.get(key)
    }

    pub fn is_dirty(&self) -> bool {
        self.acl_dirty || !self.pending.is_empty()
    }

    pub fn is_dirty_key(&self, key: &str) -> bool {
        if key == ACL_KEY {
            return self.acl_dirty;
        }
        self.pending.contains_key(key)
    }

    /// Keys with unconfirmed local changes. A pending ACL change shows as `"ACL"`.
    pub fn dirty_keys(&self) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = self.pending.keys().cloned().collect();
        if self.acl_dirty {
            keys.insert(ACL_KEY.to_owned());
        }
        keys
    }

    /// Drop every pending edit. Unset fields stay removed.
    pub fn revert(&mut self) {
        self.pending.clear();
        self.acl_dirty = false;
    }

    pub fn revert_key(&mut self, key: &str) {
        if key == ACL_KEY {
            self.acl_dirty = false;
        } else {
            self.pending.remove(key);
        }
    }

    /// Body of a save request: the ACL if dirty plus every dirty field.
    pub fn save_payload(&self) -> Result<Json> {
        let mut body = Map::new();
        if self.acl_dirty {
            let acl = self.acl.as_ref().map(Acl::to_json).unwrap_or_default();
            body.insert(ACL_KEY.to_owned(), acl);
        }
        for (key, op) in &self.pending {
            body.insert(key.clone(), op.encode()?);
        }
        Ok(Json::Object(body))
    }

    /// Absorb a successful save response.
    ///
    /// Pending edits become confirmed values, the returned id and timestamps
    /// are adopted and the dirty set empties. Any fields the server echoes back
    /// (for example the result of an atomic increment) win over local values.
    pub fn apply_save_response(&mut self, response: &Json) -> Result<()> {
        let map = response
            .as_object()
            .ok_or_else(|| Error::InvalidJson("save response must be an object".into()))?;

        let mut server_data = self.server_data.clone();
        for (key, op) in &self.pending {
            match op.apply(server_data.get(key), key)? {
                Some(value) => server_data.insert(key.clone(), value),
                None => server_data.remove(key),
            };
        }
        for (key, value) in map {
            if !META_KEYS.contains(&key.as_str()) {
                server_data.insert(key.clone(), decode(value)?);
            }
        }
        let meta = Meta::read(map)?;

        if let Some(id) = meta.object_id {
            self.object_id = Some(id);
        }
        if let Some(created_at) = meta.created_at {
            self.created_at = Some(created_at);
        }
        if let Some(updated_at) = meta.updated_at.or(meta.created_at) {
            self.updated_at = Some(updated_at);
        }
        if let Some(acl) = meta.acl {
            self.acl = Some(acl);
        }
        self.server_data = server_data;
        self.pending.clear();
        self.acl_dirty = false;
        Ok(())
    }

    /// Replace all state with a fetched server copy. Pending edits are discarded.
    pub fn apply_fetch_response(&mut self, response: &Json) -> Result<()> {
        let mut fresh = Record::from_wire_format(Some(&self.class_name), response)?;
        if fresh.object_id.is_none() {
            fresh.object_id = self.object_id.take();
        }
        fresh.local_id = std::mem::take(&mut self.local_id);
        *self = fresh;
        Ok(())
    }

    /// Reset to a fresh unsaved state after a successful delete.
    pub fn clear_after_delete(&mut self) {
        *self = Record::new(std::mem::take(&mut self.class_name));
    }

    /// Pointer payload for this record.
    ///
    /// An unsaved record gets a local placeholder id on first use; later calls
    /// return the same id.
    pub fn to_pointer(&self) -> Json {
        match &self.object_id {
            Some(id) => json!({
                "__type": "Pointer",
                "className": self.class_name,
                "objectId": id,
            }),
            None => json!({
                "__type": "Pointer",
                "className": self.class_name,
                "_localId": self.allocate_local_id(),
            }),
        }
    }

    /// JSON form of the record.
    ///
    /// With `full` the result is a tagged `Object` payload carrying the class
    /// name, and nested records are encoded completely. Without it, only the
    /// data is written and nested records become pointers.
    pub fn to_wire_format(&self, full: bool) -> Result<Json> {
        let mut ctx = EncodeContext::new(full);
        if full {
            return self.encode_full(&mut ctx);
        }
        ctx.enter(self.identity())?;
        let fields = self.encode_fields(&mut ctx);
        ctx.leave();
        Ok(Json::Object(fields?))
    }

    /// Build a record from its JSON form. `class_name` overrides any
    /// `className` in the payload.
    pub fn from_wire_format(class_name: Option<&str>, json: &Json) -> Result<Record> {
        let map = json
            .as_object()
            .ok_or_else(|| Error::InvalidJson("object payload must be a JSON object".into()))?;
        let class_name = class_name
            .or_else(|| map.get("className").and_then(Json::as_str))
            .ok_or_else(|| Error::InvalidJson("object payload is missing className".into()))?;

        let meta = Meta::read(map)?;
        let mut record = Record::new(class_name);
        record.object_id = meta.object_id;
        record.created_at = meta.created_at;
        record.updated_at = meta.updated_at.or(meta.created_at);
        record.acl = meta.acl;
        for (key, value) in map {
            if !META_KEYS.contains(&key.as_str()) {
                record.server_data.insert(key.clone(), decode(value)?);
            }
        }
        Ok(record)
    }

    pub(crate) fn encode_full(&self, ctx: &mut EncodeContext) -> Result<Json> {
        ctx.enter(self.identity())?;
        let fields = self.encode_fields(ctx);
        ctx.leave();
        let mut map = fields?;
        map.insert("__type".into(), Json::String("Object".into()));
        map.insert("className".into(), Json::String(self.class_name.clone()));
        Ok(Json::Object(map))
    }

    fn encode_fields(&self, ctx: &mut EncodeContext) -> Result<Map<String, Json>> {
        let mut map = Map::new();
        if let Some(id) = &self.object_id {
            map.insert("objectId".into(), Json::String(id.clone()));
        }
        if let Some(created_at) = &self.created_at {
            map.insert("createdAt".into(), Json::String(format_date(created_at)));
        }
        if let Some(updated_at) = &self.updated_at {
            map.insert("updatedAt".into(), Json::String(format_date(updated_at)));
        }
        if let Some(acl) = &self.acl {
            map.insert(ACL_KEY.into(), acl.to_json());
        }
        for (key, value) in self.current_fields() {
            map.insert(key, codec::encode_with(&value, ctx)?);
        }
        Ok(map)
    }

    /// Field values with pending edits applied.
    fn current_fields(&self) -> BTreeMap<String, Value> {
        let mut fields = self.server_data.clone();
        for (key, op) in &self.pending {
            match op.apply(self.server_data.get(key), key).ok().flatten() {
                Some(value) => fields.insert(key.clone(), value),
                None => fields.remove(key),
            };
        }
        fields
    }

    fn allocate_local_id(&self) -> &str {
        self.local_id
            .get_or_init(|| format!("local{}", uuid::Uuid::new_v4().simple()))
    }

    /// Key used to detect a record nested inside itself.
    fn identity(&self) -> Option<String> {
        self.object_id
            .as_deref()
            .or_else(|| self.local_id())
            .map(|id| format!("{}:{}", self.class_name, id))
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        match (&self.object_id, &other.object_id) {
            (Some(a), Some(b)) => a == b && self.class_name == other.class_name,
            _ => false,
        }
    }
}

/// Reserved fields read from a wire payload.
struct Meta {
    object_id: Option<ObjectId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    acl: Option<Acl>,
}

impl Meta {
    fn read(map: &Map<String, Json>) -> Result<Self> {
        Ok(Self {
            object_id: map
                .get("objectId")
                .and_then(Json::as_str)
                .map(str::to_owned),
            created_at: map.get("createdAt").map(read_timestamp).transpose()?,
            updated_at: map.get("updatedAt").map(read_timestamp).transpose()?,
            acl: map.get(ACL_KEY).map(Acl::from_json).transpose()?,
        })
    }
}

/// Timestamps arrive either as bare ISO strings or as tagged dates.
fn read_timestamp(json: &Json) -> Result<DateTime<Utc>> {
    match json {
        Json::String(iso) => parse_date(iso),
        other => match decode(other)? {
            Value::Date(date) => Ok(date),
            value => Err(Error::mismatch("timestamp", "Date", value.type_name())),
        },
    }
}

fn validate_key(key: &str) -> Result<()> {
    if RESERVED_KEYS.contains(&key) {
        return Err(Error::ReservedKey(key.to_owned()));
    }
    if key.is_empty() {
        return Err(Error::InvalidKey(key.to_owned()));
    }
    Ok(())
}

fn collect_values<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Vec<Value> {
    items.into_iter().map(Into::into).collect()
}
