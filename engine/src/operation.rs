//! Pending field operations.
//!
//! Local edits are recorded per field as a [`FieldOp`]. Each operation knows
//! how to apply itself to the last confirmed value, how to collapse with an
//! earlier pending operation on the same field, and how to travel on the wire
//! (`{"__op": ...}` payloads).

use crate::codec::{decode, encode};
use crate::value::{Number, Pointer, RelationRef};
use crate::{error::Result, ClassName, Error, Value};
use serde_json::{json, Value as Json};

/// Relation membership changes queued on one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationEdit {
    /// Class of the related objects
    pub target_class: Option<ClassName>,
    pub to_add: Vec<Pointer>,
    pub to_remove: Vec<Pointer>,
}

impl RelationEdit {
    pub fn adding(target_class: Option<ClassName>, objects: Vec<Pointer>) -> Self {
        Self {
            target_class,
            to_add: objects,
            to_remove: Vec::new(),
        }
    }

    pub fn removing(target_class: Option<ClassName>, objects: Vec<Pointer>) -> Self {
        Self {
            target_class,
            to_add: Vec::new(),
            to_remove: objects,
        }
    }
}

/// A pending mutation of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(Value),
    Unset,
    Increment(Number),
    AddItems(Vec<Value>),
    AddUniqueItems(Vec<Value>),
    RemoveItems(Vec<Value>),
    RelationEdit(RelationEdit),
}

impl FieldOp {
    /// Wire name of the operation.
    pub fn name(&self) -> &'static str {
        match self {
            FieldOp::Set(_) => "Set",
            FieldOp::Unset => "Delete",
            FieldOp::Increment(_) => "Increment",
            FieldOp::AddItems(_) => "Add",
            FieldOp::AddUniqueItems(_) => "AddUnique",
            FieldOp::RemoveItems(_) => "Remove",
            FieldOp::RelationEdit(_) => "Relation",
        }
    }

    /// Apply this operation to the prior value of `key`.
    ///
    /// `None` in and out means the field is absent.
    pub fn apply(&self, prior: Option<&Value>, key: &str) -> Result<Option<Value>> {
        let prior = prior.filter(|v| !v.is_null());
        Ok(match self {
            FieldOp::Set(value) => Some(value.clone()),
            FieldOp::Unset => None,
            FieldOp::Increment(amount) => match prior {
                None => Some(Value::Number(*amount)),
                Some(Value::Number(n)) => Some(Value::Number(n.add(*amount))),
                Some(other) => return Err(Error::mismatch(key, "Number", other.type_name())),
            },
            FieldOp::AddItems(items) => {
                let mut list = prior_array(prior, key)?;
                list.extend(items.iter().cloned());
                Some(Value::Array(list))
            }
            FieldOp::AddUniqueItems(items) => {
                let mut list = prior_array(prior, key)?;
                for item in items {
                    push_unique(&mut list, item.clone());
                }
                Some(Value::Array(list))
            }
            FieldOp::RemoveItems(items) => {
                let mut list = prior_array(prior, key)?;
                list.retain(|v| !items.contains(v));
                Some(Value::Array(list))
            }
            FieldOp::RelationEdit(edit) => match prior {
                None => Some(Value::Relation(RelationRef {
                    target_class: edit.target_class.clone(),
                })),
                Some(Value::Relation(existing)) => Some(Value::Relation(RelationRef {
                    target_class: existing
                        .target_class
                        .clone()
                        .or_else(|| edit.target_class.clone()),
                })),
                Some(other) => return Err(Error::mismatch(key, "Relation", other.type_name())),
            },
        })
    }

    /// Collapse this operation with an earlier pending one on the same field.
    pub fn merge_with(self, earlier: &FieldOp, key: &str) -> Result<FieldOp> {
        merge(self, earlier, key)
    }

    /// Wire form sent in a save body.
    pub fn encode(&self) -> Result<Json> {
        Ok(match self {
            FieldOp::Set(value) => encode(value, false)?,
            FieldOp::Unset => json!({"__op": "Delete"}),
            FieldOp::Increment(amount) => json!({"__op": "Increment", "amount": amount.to_json()}),
            FieldOp::AddItems(items) => json!({"__op": "Add", "objects": encode_list(items)?}),
            FieldOp::AddUniqueItems(items) => {
                json!({"__op": "AddUnique", "objects": encode_list(items)?})
            }
            FieldOp::RemoveItems(items) => {
                json!({"__op": "Remove", "objects": encode_list(items)?})
            }
            FieldOp::RelationEdit(edit) => {
                let adds = pointer_op("AddRelation", &edit.to_add);
                let removes = pointer_op("RemoveRelation", &edit.to_remove);
                match (adds, removes) {
                    (Some(a), Some(r)) => json!({"__op": "Batch", "ops": [a, r]}),
                    (Some(op), None) | (None, Some(op)) => op,
                    (None, None) => json!({"__op": "AddRelation", "objects": []}),
                }
            }
        })
    }

    /// Parse a wire value back into an operation. Values without `__op` are
    /// treated as plain sets.
    pub fn from_json(json: &Json) -> Result<FieldOp> {
        let Some(op) = json.get("__op").and_then(Json::as_str) else {
            return Ok(FieldOp::Set(decode(json)?));
        };
        Ok(match op {
            "Delete" => FieldOp::Unset,
            "Increment" => {
                let amount = json
                    .get("amount")
                    .and_then(Json::as_number)
                    .ok_or_else(|| Error::InvalidJson("Increment is missing amount".into()))?;
                FieldOp::Increment(Number::from_json(amount))
            }
            "Add" => FieldOp::AddItems(decode_objects(json)?),
            "AddUnique" => FieldOp::AddUniqueItems(decode_objects(json)?),
            "Remove" => FieldOp::RemoveItems(decode_objects(json)?),
            "AddRelation" => {
                let (class, pointers) = decode_pointers(json)?;
                FieldOp::RelationEdit(RelationEdit::adding(class, pointers))
            }
            "RemoveRelation" => {
                let (class, pointers) = decode_pointers(json)?;
                FieldOp::RelationEdit(RelationEdit::removing(class, pointers))
            }
            "Batch" => {
                let ops = json
                    .get("ops")
                    .and_then(Json::as_array)
                    .ok_or_else(|| Error::InvalidJson("Batch is missing ops".into()))?;
                let mut merged: Option<FieldOp> = None;
                for op in ops {
                    let op = FieldOp::from_json(op)?;
                    merged = Some(match merged {
                        Some(earlier) => op.merge_with(&earlier, "")?,
                        None => op,
                    });
                }
                merged.ok_or_else(|| Error::InvalidJson("empty Batch".into()))?
            }
            other => return Err(Error::InvalidJson(format!("unknown __op '{other}'"))),
        })
    }
}

/// Collapse `later` on top of `earlier`, both queued on `key`.
pub fn merge(later: FieldOp, earlier: &FieldOp, key: &str) -> Result<FieldOp> {
    use FieldOp::{AddItems, AddUniqueItems, Increment, RemoveItems, Set, Unset};

    match (later, earlier) {
        (op @ (Set(_) | Unset), _) => Ok(op),

        (Increment(a), Set(Value::Number(n))) => Ok(Set(Value::Number(n.add(a)))),
        (Increment(_), Set(other)) => Err(Error::mismatch(key, "Number", other.type_name())),
        (Increment(a), Unset) => Ok(Set(Value::Number(a))),
        (Increment(a), Increment(b)) => Ok(Increment(b.add(a))),

        (AddItems(items), Set(Value::Array(list))) => {
            let mut list = list.clone();
            list.extend(items);
            Ok(Set(Value::Array(list)))
        }
        (AddItems(items), Unset) => Ok(Set(Value::Array(items))),
        (AddItems(items), AddItems(before)) => {
            let mut list = before.clone();
            list.extend(items);
            Ok(AddItems(list))
        }

        (AddUniqueItems(items), Set(Value::Array(list))) => {
            Ok(Set(Value::Array(union(list.clone(), items))))
        }
        (AddUniqueItems(items), Unset) => Ok(Set(Value::Array(union(Vec::new(), items)))),
        (AddUniqueItems(items), AddUniqueItems(before)) => {
            Ok(AddUniqueItems(union(before.clone(), items)))
        }

        (RemoveItems(items), Set(Value::Array(list))) => {
            let mut list = list.clone();
            list.retain(|v| !items.contains(v));
            Ok(Set(Value::Array(list)))
        }
        (RemoveItems(_), Unset) => Ok(Unset),
        (RemoveItems(items), RemoveItems(before)) => Ok(RemoveItems(union(before.clone(), items))),

        (AddItems(_) | AddUniqueItems(_) | RemoveItems(_), Set(other)) => {
            Err(Error::mismatch(key, "Array", other.type_name()))
        }

        (FieldOp::RelationEdit(edit), FieldOp::RelationEdit(before)) => {
            merge_relation(edit, before, key)
        }
        (FieldOp::RelationEdit(edit), Set(Value::Relation(existing))) => {
            check_target(&edit, existing.target_class.as_ref(), key)?;
            Ok(FieldOp::RelationEdit(edit))
        }

        (later, earlier) => Err(Error::InvalidOperation(format!(
            "cannot apply {} after {} on '{key}'",
            later.name(),
            earlier.name()
        ))),
    }
}

fn merge_relation(edit: RelationEdit, before: &RelationEdit, key: &str) -> Result<FieldOp> {
    check_target(&edit, before.target_class.as_ref(), key)?;

    let mut to_add: Vec<Pointer> = before
        .to_add
        .iter()
        .filter(|p| !edit.to_remove.contains(p))
        .cloned()
        .collect();
    for pointer in &edit.to_add {
        if !to_add.contains(pointer) {
            to_add.push(pointer.clone());
        }
    }

    let mut to_remove: Vec<Pointer> = before
        .to_remove
        .iter()
        .filter(|p| !edit.to_add.contains(p))
        .cloned()
        .collect();
    for pointer in &edit.to_remove {
        if !to_remove.contains(pointer) {
            to_remove.push(pointer.clone());
        }
    }

    Ok(FieldOp::RelationEdit(RelationEdit {
        target_class: edit.target_class.or_else(|| before.target_class.clone()),
        to_add,
        to_remove,
    }))
}

fn check_target(edit: &RelationEdit, existing: Option<&ClassName>, key: &str) -> Result<()> {
    match (&edit.target_class, existing) {
        (Some(a), Some(b)) if a != b => Err(Error::InvalidOperation(format!(
            "relation '{key}' targets {b}, not {a}"
        ))),
        _ => Ok(()),
    }
}

fn prior_array(prior: Option<&Value>, key: &str) -> Result<Vec<Value>> {
    match prior {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(Error::mismatch(key, "Array", other.type_name())),
    }
}

fn push_unique(list: &mut Vec<Value>, item: Value) {
    if !list.contains(&item) {
        list.push(item);
    }
}

fn union(mut list: Vec<Value>, items: Vec<Value>) -> Vec<Value> {
    for item in items {
        push_unique(&mut list, item);
    }
    list
}

fn encode_list(items: &[Value]) -> Result<Vec<Json>> {
    items.iter().map(|v| encode(v, false)).collect()
}

fn pointer_op(name: &str, pointers: &[Pointer]) -> Option<Json> {
    if pointers.is_empty() {
        return None;
    }
    let objects: Vec<Json> = pointers.iter().map(Pointer::to_json).collect();
    Some(json!({"__op": name, "objects": objects}))
}

fn decode_objects(json: &Json) -> Result<Vec<Value>> {
    json.get("objects")
        .and_then(Json::as_array)
        .ok_or_else(|| Error::InvalidJson("operation is missing objects".into()))?
        .iter()
        .map(decode)
        .collect()
}

fn decode_pointers(json: &Json) -> Result<(Option<ClassName>, Vec<Pointer>)> {
    let mut class_name = None;
    let mut pointers = Vec::new();
    for item in decode_objects(json)? {
        let Value::Object(record) = item else {
            return Err(Error::InvalidJson("relation objects must be pointers".into()));
        };
        let pointer = Pointer::to_record(&record).ok_or(Error::MissingObjectId)?;
        class_name.get_or_insert_with(|| pointer.class_name.clone());
        pointers.push(pointer);
    }
    Ok((class_name, pointers))
}
