//! Many-to-many relations.
//!
//! A [`Relation`] is an accessor bound to a parent record and one of its
//! fields. Membership edits are queued on the parent as relation operations
//! and sent with its next save.

use crate::operation::RelationEdit;
use crate::value::Pointer;
use crate::{error::Result, ClassName, Error, FieldOp, Query, Record};

/// Relation field `key` of a parent record.
#[derive(Debug)]
pub struct Relation<'a> {
    parent: &'a mut Record,
    key: String,
    target_class: Option<ClassName>,
}

impl Record {
    /// Accessor for the relation stored in `key`. Does not mark anything dirty.
    pub fn relation(&mut self, key: &str) -> Relation<'_> {
        let target_class = self
            .get(key)
            .and_then(|v| v.as_relation().and_then(|r| r.target_class.clone()));
        Relation {
            parent: self,
            key: key.to_owned(),
            target_class,
        }
    }
}

impl<'a> Relation<'a> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Class of the related objects, once known.
    pub fn target_class(&self) -> Option<&str> {
        self.target_class.as_deref()
    }

    pub fn parent(&self) -> &Record {
        &*self.parent
    }

    /// Add saved objects to the relation. An empty input does nothing.
    pub fn add<'r>(&mut self, objects: impl IntoIterator<Item = &'r Record>) -> Result<()> {
        let (target, pointers) = self.pointers(objects)?;
        if pointers.is_empty() {
            return Ok(());
        }
        let edit = RelationEdit::adding(target.clone(), pointers);
        self.queue(edit, target)
    }

    /// Remove saved objects from the relation. An empty input does nothing.
    pub fn remove<'r>(&mut self, objects: impl IntoIterator<Item = &'r Record>) -> Result<()> {
        let (target, pointers) = self.pointers(objects)?;
        if pointers.is_empty() {
            return Ok(());
        }
        let edit = RelationEdit::removing(target.clone(), pointers);
        self.queue(edit, target)
    }

    /// Query over the members of this relation.
    ///
    /// When the target class is still unknown the query targets the parent's
    /// own class.
    pub fn query(&self) -> Query {
        let class_name = self
            .target_class
            .as_deref()
            .unwrap_or_else(|| self.parent.class_name());
        Query::new(class_name).where_related_to(&*self.parent, &self.key)
    }

    // The target class only sticks once the edit is queued.
    fn queue(&mut self, edit: RelationEdit, target: Option<ClassName>) -> Result<()> {
        self.parent.set_op(&self.key, FieldOp::RelationEdit(edit))?;
        self.target_class = target;
        Ok(())
    }

    fn pointers<'r>(
        &self,
        objects: impl IntoIterator<Item = &'r Record>,
    ) -> Result<(Option<ClassName>, Vec<Pointer>)> {
        let mut target = self.target_class.clone();
        let mut pointers = Vec::new();
        for object in objects {
            let pointer = Pointer::to_record(object).ok_or_else(|| {
                Error::InvalidOperation(format!(
                    "cannot add an unsaved {} to relation '{}'",
                    object.class_name(),
                    self.key
                ))
            })?;
            let expected = target.get_or_insert_with(|| pointer.class_name.clone());
            if *expected != pointer.class_name {
                return Err(Error::InvalidOperation(format!(
                    "relation '{}' targets {}, not {}",
                    self.key, expected, pointer.class_name
                )));
            }
            pointers.push(pointer);
        }
        Ok((target, pointers))
    }
}
