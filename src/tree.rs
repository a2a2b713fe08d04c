//! Object arena: every live data object is a node in a [`Tree`].
//!
//! Nodes refer to their parent and children by [`ObjectId`]. Composites
//! materialize their children lazily (record fields on first access, choice
//! alternatives on first selection, array elements on demand), so a
//! self-referential declaration only costs what the data actually holds.
//!
//! This module hosts the operations shared by every kind (onlyif gating,
//! offset checks, debug names) and dispatches the rest to the per-kind
//! modules.

use crate::ast::Param;
use crate::codec::Codec;
use crate::env::{Operand, Overrides};
use crate::error::{BinDataError, Result};
use crate::params::{Nested, ParameterSet, Sanitized, SanitizedField, Sanitizer};
use crate::registry::{Kind, TypeDef, TypeRegistry};
use crate::stream::{ByteReader, ByteWriter};
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Handle to one data object inside a [`Tree`].
///
/// Handles are generational: once an object is released (for example when
/// a choice is cleared) its old handle reports [`BinDataError::StaleObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone)]
pub(crate) enum State {
    /// `None` while clear.
    Primitive(Option<Value>),
    /// One slot per declared field, filled on first access.
    Record(Vec<Option<ObjectId>>),
    /// Instantiated alternatives by position, plus the last selected one.
    Choice {
        cache: BTreeMap<usize, ObjectId>,
        last: Option<usize>,
    },
    /// `None` until elements are materialized.
    Array(Option<Vec<ObjectId>>),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub parent: Option<ObjectId>,
    pub name: Option<String>,
    pub def: Arc<TypeDef>,
    pub params: Arc<ParameterSet>,
    pub locals: BTreeMap<String, Value>,
    pub state: State,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena owning the data objects of one instantiated declaration.
#[derive(Debug, Clone)]
pub struct Tree {
    registry: Arc<TypeRegistry>,
    slots: Vec<Slot>,
    free: Vec<usize>,
    pub(crate) depth: usize,
    /// Set for the duration of a top-level read: computed primitives
    /// report what was read instead of re-evaluating `value`.
    pub(crate) reading: bool,
}

impl Tree {
    pub(crate) fn new(registry: Arc<TypeRegistry>) -> Self {
        Tree {
            registry,
            slots: Vec::new(),
            free: Vec::new(),
            depth: 0,
            reading: false,
        }
    }

    pub(crate) fn node(&self, id: ObjectId) -> Result<&Node> {
        self.slots
            .get(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
            .ok_or(BinDataError::StaleObject(id.index))
    }

    pub(crate) fn node_mut(&mut self, id: ObjectId) -> Result<&mut Node> {
        self.slots
            .get_mut(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
            .ok_or(BinDataError::StaleObject(id.index))
    }

    pub(crate) fn kind(&self, id: ObjectId) -> Result<Kind> {
        Ok(self.node(id)?.def.kind())
    }

    pub(crate) fn param(&self, id: ObjectId, key: &str) -> Result<Option<Param>> {
        Ok(self.node(id)?.params.accepted.get(key).cloned())
    }

    pub(crate) fn nested(&self, id: ObjectId) -> Result<Nested> {
        Ok(self.node(id)?.params.nested.clone())
    }

    /// Create a node for `field`. Deferred (recursive) declarations are
    /// sanitized here, on first use.
    pub(crate) fn instantiate(
        &mut self,
        field: &SanitizedField,
        parent: Option<ObjectId>,
        locals: BTreeMap<String, Value>,
    ) -> Result<ObjectId> {
        let params = match &field.params {
            Sanitized::Ready(params) => params.clone(),
            Sanitized::Deferred(raw) => {
                log::trace!("sanitizing deferred type '{}'", field.def.name());
                Arc::new(Sanitizer::new(&self.registry).sanitize_deferred(&field.def, raw)?)
            }
        };
        let state = match (&field.def.kind(), &params.nested) {
            (Kind::Primitive(_), _) => State::Primitive(None),
            (Kind::Record, Nested::Fields(fields)) => State::Record(vec![None; fields.len()]),
            (Kind::Record, _) => State::Record(Vec::new()),
            (Kind::Choice, _) => State::Choice {
                cache: BTreeMap::new(),
                last: None,
            },
            (Kind::Array, _) => State::Array(None),
        };
        let node = Node {
            parent,
            name: field.name.clone(),
            def: field.def.clone(),
            params,
            locals,
            state,
        };
        Ok(self.alloc(node))
    }

    fn alloc(&mut self, node: Node) -> ObjectId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.node = Some(node);
                ObjectId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                ObjectId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Drop `id` and everything below it.
    pub(crate) fn release(&mut self, id: ObjectId) -> Result<()> {
        let children: Vec<ObjectId> = match &self.node(id)?.state {
            State::Primitive(_) => Vec::new(),
            State::Record(slots) => slots.iter().flatten().copied().collect(),
            State::Choice { cache, .. } => cache.values().copied().collect(),
            State::Array(elements) => elements.iter().flatten().copied().collect(),
        };
        for child in children {
            self.release(child)?;
        }
        let slot = &mut self.slots[id.index];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Ok(())
    }

    /// Number of live objects in the arena.
    pub fn live_objects(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn parent(&self, id: ObjectId) -> Result<Option<ObjectId>> {
        Ok(self.node(id)?.parent)
    }

    pub fn type_name(&self, id: ObjectId) -> Result<&str> {
        Ok(self.node(id)?.def.name())
    }

    /// Dotted path from the root: `obj.hdr.len`, `obj.items[2]`. Choice
    /// alternatives share their choice's name.
    pub fn debug_name(&self, id: ObjectId) -> Result<String> {
        let node = self.node(id)?;
        let parent = match node.parent {
            Some(p) => p,
            None => return Ok("obj".to_string()),
        };
        let base = self.debug_name(parent)?;
        Ok(match self.kind(parent)? {
            Kind::Record => format!("{}.{}", base, node.name.as_deref().unwrap_or("<anon>")),
            Kind::Array => match node.locals.get("index") {
                Some(index) => format!("{}[{}]", base, index),
                None => base,
            },
            Kind::Choice | Kind::Primitive(_) => base,
        })
    }

    /// Evaluate `onlyif`; objects without one are always active.
    pub fn is_active(&mut self, id: ObjectId) -> Result<bool> {
        match self.param(id, "onlyif")? {
            Some(param) => {
                let v = self.evaluate(id, &param, &Overrides::none())?;
                truth(&v, "onlyif")
            }
            None => Ok(true),
        }
    }

    pub fn read(&mut self, id: ObjectId, reader: &mut dyn ByteReader) -> Result<()> {
        if self.reading {
            return self.read_object(id, reader);
        }
        self.reading = true;
        let result = self.read_object(id, reader);
        self.reading = false;
        result
    }

    fn read_object(&mut self, id: ObjectId, reader: &mut dyn ByteReader) -> Result<()> {
        if !self.is_active(id)? {
            return Ok(());
        }
        self.check_or_adjust_offset(id, reader)?;
        self.clear(id)?;
        match self.kind(id)? {
            Kind::Primitive(codec) => self.read_primitive(id, codec, reader),
            Kind::Record => self.read_record(id, reader),
            Kind::Choice => self.read_choice(id, reader),
            Kind::Array => self.read_array(id, reader),
        }
    }

    pub fn write(&mut self, id: ObjectId, writer: &mut dyn ByteWriter) -> Result<()> {
        if !self.is_active(id)? {
            return Ok(());
        }
        match self.kind(id)? {
            Kind::Primitive(codec) => self.write_primitive(id, codec, writer),
            Kind::Record => self.write_record(id, writer),
            Kind::Choice => {
                let child = self.current_choice(id)?;
                self.write(child, writer)
            }
            Kind::Array => self.write_array(id, writer),
        }
    }

    /// Encoded size in bytes; zero while inactive.
    pub fn num_bytes(&mut self, id: ObjectId) -> Result<u64> {
        if !self.is_active(id)? {
            return Ok(0);
        }
        match self.kind(id)? {
            Kind::Primitive(codec) => self.primitive_num_bytes(id, codec),
            Kind::Record => self.record_num_bytes(id),
            Kind::Choice => {
                let child = self.current_choice(id)?;
                self.num_bytes(child)
            }
            Kind::Array => self.array_num_bytes(id),
        }
    }

    /// Plain-value view, `None` while inactive.
    pub fn snapshot(&mut self, id: ObjectId) -> Result<Option<Value>> {
        if !self.is_active(id)? {
            return Ok(None);
        }
        self.value(id).map(Some)
    }

    /// Plain-value view regardless of `onlyif`.
    pub fn value(&mut self, id: ObjectId) -> Result<Value> {
        match self.kind(id)? {
            Kind::Primitive(codec) => self.primitive_value(id, codec),
            Kind::Record => self.record_value(id),
            Kind::Choice => {
                let child = self.current_choice(id)?;
                self.value(child)
            }
            Kind::Array => self.array_value(id),
        }
    }

    pub fn assign(&mut self, id: ObjectId, value: Value) -> Result<()> {
        match self.kind(id)? {
            Kind::Primitive(codec) => self.assign_primitive(id, codec, value),
            Kind::Record => self.assign_record(id, value),
            Kind::Choice => {
                let child = self.current_choice(id)?;
                self.assign(child, value)
            }
            Kind::Array => self.assign_array(id, value),
        }
    }

    pub fn clear(&mut self, id: ObjectId) -> Result<()> {
        match self.kind(id)? {
            Kind::Primitive(_) => {
                self.node_mut(id)?.state = State::Primitive(None);
                Ok(())
            }
            Kind::Record => self.clear_record(id),
            Kind::Choice => self.clear_choice(id),
            Kind::Array => self.clear_array(id),
        }
    }

    pub fn is_clear(&mut self, id: ObjectId) -> Result<bool> {
        match self.kind(id)? {
            Kind::Primitive(_) => Ok(matches!(self.node(id)?.state, State::Primitive(None))),
            Kind::Record => self.record_is_clear(id),
            Kind::Choice => self.choice_is_clear(id),
            Kind::Array => self.array_is_clear(id),
        }
    }

    /// Visible field names of a record (through choices).
    pub fn field_names(&mut self, id: ObjectId) -> Result<Vec<String>> {
        match self.kind(id)? {
            Kind::Record => self.record_field_names(id),
            Kind::Choice => {
                let child = self.current_choice(id)?;
                self.field_names(child)
            }
            Kind::Primitive(_) | Kind::Array => Err(self.unsupported(id, "field_names")),
        }
    }

    /// Named child of a record (through choices).
    pub fn child(&mut self, id: ObjectId, name: &str) -> Result<ObjectId> {
        match self.kind(id)? {
            Kind::Record => match self.record_index_of(id, name)? {
                Some(index) => self.record_child(id, index),
                None => Err(BinDataError::NoSuchName {
                    name: name.to_string(),
                    context: self.debug_name(id)?,
                }),
            },
            Kind::Choice => {
                let current = self.current_choice(id)?;
                self.child(current, name)
            }
            Kind::Primitive(_) | Kind::Array => Err(self.unsupported(id, "child")),
        }
    }

    /// Like [`Tree::child`] but answers `None` where there is no such field.
    pub(crate) fn find_field(&mut self, id: ObjectId, name: &str) -> Result<Option<ObjectId>> {
        match self.kind(id)? {
            Kind::Record => match self.record_index_of(id, name)? {
                Some(index) => self.record_child(id, index).map(Some),
                None => Ok(None),
            },
            Kind::Choice => {
                let current = self.current_choice(id)?;
                match self.kind(current)? {
                    Kind::Record | Kind::Choice => self.find_field(current, name),
                    Kind::Primitive(_) | Kind::Array => Ok(None),
                }
            }
            Kind::Primitive(_) | Kind::Array => Ok(None),
        }
    }

    /// Element `index` of an array, extending it when `index` is past the end.
    pub fn element(&mut self, id: ObjectId, index: usize) -> Result<ObjectId> {
        match self.kind(id)? {
            Kind::Array => self.array_element(id, index),
            _ => Err(self.unsupported(id, "element")),
        }
    }

    pub fn len(&mut self, id: ObjectId) -> Result<usize> {
        match self.kind(id)? {
            Kind::Array => Ok(self.array_elements(id)?.len()),
            _ => Err(self.unsupported(id, "len")),
        }
    }

    /// Selected alternative of a choice.
    pub fn selection(&mut self, id: ObjectId) -> Result<ObjectId> {
        match self.kind(id)? {
            Kind::Choice => self.current_choice(id),
            _ => Err(self.unsupported(id, "selection")),
        }
    }

    /// Byte offset of `child` from the start of `id`.
    pub fn offset_of(&mut self, id: ObjectId, child: ObjectId) -> Result<u64> {
        match self.kind(id)? {
            Kind::Record => self.record_offset_of(id, child),
            Kind::Array => self.array_offset_of(id, child),
            Kind::Choice => {
                if self.current_choice(id)? == child {
                    Ok(0)
                } else {
                    Err(BinDataError::NoSuchName {
                        name: self.debug_name(child)?,
                        context: self.debug_name(id)?,
                    })
                }
            }
            Kind::Primitive(_) => Err(self.unsupported(id, "offset_of")),
        }
    }

    /// Byte offset of `id` from the start of the root object.
    pub fn abs_offset(&mut self, id: ObjectId) -> Result<u64> {
        let mut offset = 0;
        let mut current = id;
        while let Some(parent) = self.parent(current)? {
            offset += self.offset_of(parent, current)?;
            current = parent;
        }
        Ok(offset)
    }

    pub(crate) fn unsupported(&self, id: ObjectId, operation: &'static str) -> BinDataError {
        BinDataError::NoSuchOperation {
            debug_name: self.debug_name(id).unwrap_or_else(|_| "<stale>".to_string()),
            operation,
        }
    }

    pub(crate) fn codec(&self, id: ObjectId) -> Result<Codec> {
        match self.kind(id)? {
            Kind::Primitive(codec) => Ok(codec),
            _ => Err(self.unsupported(id, "codec")),
        }
    }

    fn check_or_adjust_offset(&mut self, id: ObjectId, reader: &mut dyn ByteReader) -> Result<()> {
        let actual = reader.offset();
        if let Some(param) = self.param(id, "check_offset")? {
            let overrides = Overrides::none().with("offset", Operand::Value(Value::Int(actual as i128)));
            let expected = self.evaluate(id, &param, &overrides)?;
            let ok = match &expected {
                Value::Bool(b) => *b,
                Value::Int(x) => *x == actual as i128,
                other => {
                    return Err(BinDataError::Expression(format!(
                        "check_offset must yield a bool or an int, got {}",
                        other.kind_name()
                    )))
                }
            };
            if !ok {
                return Err(BinDataError::OffsetMismatch {
                    debug_name: self.debug_name(id)?,
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        if let Some(param) = self.param(id, "adjust_offset")? {
            let expected = self.evaluate(id, &param, &Overrides::none())?;
            let target = expected.as_int().ok_or_else(|| {
                BinDataError::Expression(format!(
                    "adjust_offset must yield an int, got {}",
                    expected.kind_name()
                ))
            })?;
            if target != actual as i128 {
                let debug_name = self.debug_name(id)?;
                let delta = target - actual as i128;
                log::warn!("{}: adjusting stream position by {} bytes", debug_name, delta);
                let seeked = i64::try_from(delta)
                    .ok()
                    .map(|d| reader.seek_relative(d).is_ok())
                    .unwrap_or(false);
                if !seeked || reader.offset() as i128 != target {
                    return Err(BinDataError::OffsetMismatch {
                        debug_name,
                        expected: target.to_string(),
                        actual,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Truth value of a gating expression.
pub(crate) fn truth(v: &Value, what: &str) -> Result<bool> {
    v.truthy().ok_or_else(|| {
        BinDataError::Expression(format!("{} must yield a bool, got {}", what, v.kind_name()))
    })
}
