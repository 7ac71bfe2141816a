//! Access control lists.
//!
//! An [`Acl`] maps a subject (`*` for the public, a user id, or
//! `role:<name>`) to the actions it may perform. A subject with no granted
//! action has no entry at all.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Subject key for public access.
pub const PUBLIC: &str = "*";

const ROLE_PREFIX: &str = "role:";

/// Actions granted to one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub write: bool,
}

impl Permissions {
    fn is_empty(&self) -> bool {
        !self.read && !self.write
    }
}

/// Access control list attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Acl {
    entries: BTreeMap<String, Permissions>,
}

impl Acl {
    pub fn new() -> Self {
        Self::default()
    }

    /// ACL granting read and write to a single user.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let mut acl = Self::new();
        acl.set_read_access(user_id.clone(), true);
        acl.set_write_access(user_id, true);
        acl
    }

    pub fn set_read_access(&mut self, subject: impl Into<String>, allowed: bool) {
        self.update(subject.into(), |p| p.read = allowed);
    }

    pub fn set_write_access(&mut self, subject: impl Into<String>, allowed: bool) {
        self.update(subject.into(), |p| p.write = allowed);
    }

    pub fn read_access(&self, subject: &str) -> bool {
        self.entries.get(subject).is_some_and(|p| p.read)
    }

    pub fn write_access(&self, subject: &str) -> bool {
        self.entries.get(subject).is_some_and(|p| p.write)
    }

    pub fn set_public_read_access(&mut self, allowed: bool) {
        self.set_read_access(PUBLIC, allowed);
    }

    pub fn set_public_write_access(&mut self, allowed: bool) {
        self.set_write_access(PUBLIC, allowed);
    }

    pub fn public_read_access(&self) -> bool {
        self.read_access(PUBLIC)
    }

    pub fn public_write_access(&self) -> bool {
        self.write_access(PUBLIC)
    }

    pub fn set_role_read_access(&mut self, role: &str, allowed: bool) {
        self.set_read_access(format!("{ROLE_PREFIX}{role}"), allowed);
    }

    pub fn set_role_write_access(&mut self, role: &str, allowed: bool) {
        self.set_write_access(format!("{ROLE_PREFIX}{role}"), allowed);
    }

    pub fn role_read_access(&self, role: &str) -> bool {
        self.read_access(&format!("{ROLE_PREFIX}{role}"))
    }

    pub fn role_write_access(&self, role: &str) -> bool {
        self.write_access(&format!("{ROLE_PREFIX}{role}"))
    }

    /// Permissions for a subject, if it has any entry.
    pub fn get(&self, subject: &str) -> Option<Permissions> {
        self.entries.get(subject).copied()
    }

    /// Subjects with at least one granted action.
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Serializing a map of bools cannot fail
        serde_json::to_value(self).unwrap_or_default()
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let mut acl: Acl =
            serde_json::from_value(json.clone()).map_err(|e| Error::InvalidJson(e.to_string()))?;
        acl.entries.retain(|_, p| !p.is_empty());
        Ok(acl)
    }

    fn update(&mut self, subject: String, f: impl FnOnce(&mut Permissions)) {
        let mut permissions = self.entries.remove(&subject).unwrap_or_default();
        f(&mut permissions);
        if !permissions.is_empty() {
            self.entries.insert(subject, permissions);
        }
    }
}
