//! Records: ordered, named fields processed in declaration order.

use crate::ast::FieldSpec;
use crate::error::{BinDataError, Result};
use crate::params::{Nested, SanitizedField};
use crate::stream::{ByteReader, ByteWriter};
use crate::tree::{ObjectId, State, Tree};
use crate::value::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Names a field may not take: they collide with object operations or
/// with names the expression language binds itself. Builtin functions
/// (`len`, `min`, ...) only exist in call position and stay usable.
pub const RESERVED_NAMES: &[&str] = &[
    "read",
    "write",
    "num_bytes",
    "snapshot",
    "clear",
    "is_clear",
    "offset_of",
    "debug_name",
    "field_names",
    "assign",
    "parent",
    "index",
    "element",
    "array",
    "offset",
    "true",
    "false",
];

/// Reject duplicate and reserved field names.
pub(crate) fn check_field_names(fields: &[FieldSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for name in fields.iter().filter_map(|f| f.name.as_deref()) {
        if RESERVED_NAMES.contains(&name) {
            return Err(BinDataError::ReservedFieldName(name.to_string()));
        }
        if !seen.insert(name) {
            return Err(BinDataError::DuplicateFieldName(name.to_string()));
        }
    }
    Ok(())
}

impl Tree {
    fn record_fields(&self, id: ObjectId) -> Result<Arc<[SanitizedField]>> {
        match self.nested(id)? {
            Nested::Fields(fields) => Ok(fields),
            _ => Ok(Arc::from(Vec::new())),
        }
    }

    pub(crate) fn record_index_of(&self, id: ObjectId, name: &str) -> Result<Option<usize>> {
        Ok(self
            .record_fields(id)?
            .iter()
            .position(|f| f.name.as_deref() == Some(name)))
    }

    /// Field `index`, instantiated on first access.
    pub(crate) fn record_child(&mut self, id: ObjectId, index: usize) -> Result<ObjectId> {
        if let State::Record(slots) = &self.node(id)?.state {
            if let Some(Some(child)) = slots.get(index) {
                return Ok(*child);
            }
        }
        let fields = self.record_fields(id)?;
        let field = fields.get(index).ok_or_else(|| BinDataError::NoSuchName {
            name: format!("#{}", index),
            context: self.debug_name(id).unwrap_or_default(),
        })?;
        let child = self.instantiate(field, Some(id), BTreeMap::new())?;
        if let State::Record(slots) = &mut self.node_mut(id)?.state {
            slots[index] = Some(child);
        }
        Ok(child)
    }

    fn record_children(&mut self, id: ObjectId) -> Result<Vec<ObjectId>> {
        let n = self.record_fields(id)?.len();
        (0..n).map(|i| self.record_child(id, i)).collect()
    }

    pub(crate) fn read_record(&mut self, id: ObjectId, reader: &mut dyn ByteReader) -> Result<()> {
        for child in self.record_children(id)? {
            self.read(child, reader)?;
        }
        Ok(())
    }

    pub(crate) fn write_record(&mut self, id: ObjectId, writer: &mut dyn ByteWriter) -> Result<()> {
        for child in self.record_children(id)? {
            self.write(child, writer)?;
        }
        Ok(())
    }

    pub(crate) fn record_num_bytes(&mut self, id: ObjectId) -> Result<u64> {
        let mut total = 0;
        for child in self.record_children(id)? {
            total += self.num_bytes(child)?;
        }
        Ok(total)
    }

    /// Visible, active, named fields in declaration order.
    pub(crate) fn record_value(&mut self, id: ObjectId) -> Result<Value> {
        let fields = self.record_fields(id)?;
        let mut entries = Vec::new();
        for (i, field) in fields.iter().enumerate() {
            let name = match &field.name {
                Some(name) if !field.hidden => name,
                _ => continue,
            };
            let child = self.record_child(id, i)?;
            if let Some(v) = self.snapshot(child)? {
                entries.push((name.clone(), v));
            }
        }
        Ok(Value::Record(entries))
    }

    pub(crate) fn assign_record(&mut self, id: ObjectId, value: Value) -> Result<()> {
        let entries = match value {
            Value::Record(entries) => entries,
            other => {
                return Err(BinDataError::Argument(format!(
                    "{}: cannot assign a {} value to a record",
                    self.debug_name(id)?,
                    other.kind_name()
                )))
            }
        };
        self.clear_record(id)?;
        for (name, v) in entries {
            let child = self.child(id, &name)?;
            self.assign(child, v)?;
        }
        Ok(())
    }

    pub(crate) fn clear_record(&mut self, id: ObjectId) -> Result<()> {
        let existing: Vec<ObjectId> = match &self.node(id)?.state {
            State::Record(slots) => slots.iter().flatten().copied().collect(),
            _ => Vec::new(),
        };
        for child in existing {
            self.clear(child)?;
        }
        Ok(())
    }

    pub(crate) fn record_is_clear(&mut self, id: ObjectId) -> Result<bool> {
        let existing: Vec<ObjectId> = match &self.node(id)?.state {
            State::Record(slots) => slots.iter().flatten().copied().collect(),
            _ => Vec::new(),
        };
        for child in existing {
            if !self.is_clear(child)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn record_field_names(&mut self, id: ObjectId) -> Result<Vec<String>> {
        Ok(self
            .record_fields(id)?
            .iter()
            .filter(|f| !f.hidden)
            .filter_map(|f| f.name.clone())
            .collect())
    }

    /// Sum of the sizes of the fields before `child`.
    pub(crate) fn record_offset_of(&mut self, id: ObjectId, child: ObjectId) -> Result<u64> {
        let mut offset = 0;
        for sibling in self.record_children(id)? {
            if sibling == child {
                return Ok(offset);
            }
            offset += self.num_bytes(sibling)?;
        }
        Err(BinDataError::NoSuchName {
            name: self.debug_name(child)?,
            context: self.debug_name(id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_names() {
        let fields = vec![FieldSpec::field("uint8", "a"), FieldSpec::field("uint8", "a")];
        assert!(matches!(
            check_field_names(&fields),
            Err(BinDataError::DuplicateFieldName(n)) if n == "a"
        ));
    }

    #[test]
    fn rejects_reserved_names_but_allows_value() {
        let fields = vec![FieldSpec::field("uint8", "offset")];
        assert!(matches!(
            check_field_names(&fields),
            Err(BinDataError::ReservedFieldName(n)) if n == "offset"
        ));
        let fields = vec![FieldSpec::field("uint8", "value"), FieldSpec::new("uint8")];
        assert!(check_field_names(&fields).is_ok());
    }
}
