//! Public entry points: [`Schema`] (a sanitized declaration) and
//! [`BinObject`] (one instance of it).

use crate::ast::{Endian, FieldSpec, Param};
use crate::error::Result;
use crate::params::{SanitizedField, Sanitizer};
use crate::registry::{Kind, TypeRegistry};
use crate::stream::{ByteReader, ByteWriter, Reader, Writer};
use crate::tree::{ObjectId, Tree};
use crate::value::Value;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

/// A declaration that passed sanitization. Every declaration error
/// (unknown type, bad parameters, duplicate names) surfaces here, before
/// any instance exists.
#[derive(Debug, Clone)]
pub struct Schema {
    registry: Arc<TypeRegistry>,
    root: SanitizedField,
}

impl Schema {
    pub fn new(registry: Arc<TypeRegistry>, spec: FieldSpec) -> Result<Self> {
        Self::with_endian(registry, spec, None)
    }

    /// Like [`Schema::new`], with an ambient byte order for the root.
    pub fn with_endian(
        registry: Arc<TypeRegistry>,
        spec: FieldSpec,
        endian: Option<Endian>,
    ) -> Result<Self> {
        let root = Sanitizer::new(&registry).sanitize_field(&spec, endian)?;
        log::debug!("sanitized root declaration of type '{}'", root.def.name());
        Ok(Schema { registry, root })
    }

    /// Anonymous record root with the given fields.
    pub fn record(registry: Arc<TypeRegistry>, fields: Vec<FieldSpec>) -> Result<Self> {
        Self::new(registry, FieldSpec::new("struct").with("fields", Param::fields(fields)))
    }

    pub fn type_name(&self) -> &str {
        self.root.def.name()
    }

    /// A fresh, clear instance.
    pub fn instantiate(&self) -> Result<BinObject> {
        let mut tree = Tree::new(self.registry.clone());
        let root = tree.instantiate(&self.root, None, BTreeMap::new())?;
        Ok(BinObject { tree, root })
    }
}

/// One instantiated data object tree.
///
/// Fields are addressed by dotted paths: `"hdr.len"`, `"items.2"`. Choices
/// are transparent; a path continues into the selected alternative.
/// Cloning yields an independent deep copy.
#[derive(Debug, Clone)]
pub struct BinObject {
    tree: Tree,
    root: ObjectId,
}

impl BinObject {
    pub fn root(&self) -> ObjectId {
        self.root
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    /// Resolve a dotted path to an object handle. The empty path is the root.
    pub fn lookup(&mut self, path: &str) -> Result<ObjectId> {
        let mut current = self.root;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match (self.tree.kind(current)?, segment.parse::<usize>()) {
                (Kind::Array, Ok(index)) => self.tree.element(current, index)?,
                _ => self.tree.child(current, segment)?,
            };
        }
        Ok(current)
    }

    pub fn read(&mut self, reader: &mut dyn ByteReader) -> Result<()> {
        self.tree.read(self.root, reader)
    }

    pub fn read_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let mut reader = Reader::new(Cursor::new(bytes));
        self.read(&mut reader)
    }

    /// Write the whole object, then flush `writer`.
    pub fn write(&mut self, writer: &mut dyn ByteWriter) -> Result<()> {
        self.tree.write(self.root, writer)?;
        writer.flush()
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        self.write(&mut writer)?;
        Ok(writer.into_inner())
    }

    pub fn num_bytes(&mut self) -> Result<u64> {
        self.tree.num_bytes(self.root)
    }

    pub fn num_bytes_of(&mut self, path: &str) -> Result<u64> {
        let id = self.lookup(path)?;
        self.tree.num_bytes(id)
    }

    pub fn snapshot(&mut self) -> Result<Option<Value>> {
        self.tree.snapshot(self.root)
    }

    /// Current value at `path`, regardless of `onlyif`.
    pub fn get(&mut self, path: &str) -> Result<Value> {
        let id = self.lookup(path)?;
        self.tree.value(id)
    }

    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let id = self.lookup(path)?;
        self.tree.assign(id, value.into())
    }

    pub fn assign(&mut self, value: impl Into<Value>) -> Result<()> {
        self.tree.assign(self.root, value.into())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.tree.clear(self.root)
    }

    pub fn clear_field(&mut self, path: &str) -> Result<()> {
        let id = self.lookup(path)?;
        self.tree.clear(id)
    }

    pub fn is_clear(&mut self) -> Result<bool> {
        self.tree.is_clear(self.root)
    }

    pub fn is_clear_field(&mut self, path: &str) -> Result<bool> {
        let id = self.lookup(path)?;
        self.tree.is_clear(id)
    }

    pub fn field_names(&mut self) -> Result<Vec<String>> {
        self.tree.field_names(self.root)
    }

    /// Offset of the object at `path` within its parent.
    pub fn offset_of(&mut self, path: &str) -> Result<u64> {
        let id = self.lookup(path)?;
        match self.tree.parent(id)? {
            Some(parent) => self.tree.offset_of(parent, id),
            None => Ok(0),
        }
    }

    /// Offset of the object at `path` from the start of the root.
    pub fn abs_offset_of(&mut self, path: &str) -> Result<u64> {
        let id = self.lookup(path)?;
        self.tree.abs_offset(id)
    }

    pub fn debug_name(&mut self, path: &str) -> Result<String> {
        let id = self.lookup(path)?;
        self.tree.debug_name(id)
    }
}
