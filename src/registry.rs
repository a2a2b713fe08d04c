//! Type registry: declared type names -> type definitions.
//!
//! Builtins (integers, floats, strings, `struct`, `choice`, `array`) are
//! registered by [`TypeRegistry::new`]. Endian-neutral integer and float
//! names (`uint16`, `float`, ...) resolve through the ambient byte order.

use crate::ast::{Endian, RawParams, RecordDecl};
use crate::codec::{Codec, FloatCodec, IntCodec};
use crate::error::{BinDataError, Result};
use crate::record::check_field_names;
use std::collections::HashMap;
use std::sync::Arc;

/// What kind of data object a type instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Primitive(Codec),
    Record,
    Choice,
    Array,
}

impl Kind {
    pub fn is_composite(&self) -> bool {
        !matches!(self, Kind::Primitive(_))
    }
}

/// A registered type: its kind plus parameters bound at registration.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    name: String,
    kind: Kind,
    bound: RawParams,
}

impl TypeDef {
    pub fn new(name: impl Into<String>, kind: Kind, bound: RawParams) -> Self {
        TypeDef {
            name: name.into(),
            kind,
            bound,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub(crate) fn bound(&self) -> &RawParams {
        &self.bound
    }

    /// User-declared composites carry their own field lists and may refer
    /// to themselves, directly or through other types.
    pub(crate) fn may_recurse(&self) -> bool {
        self.kind.is_composite() && !self.bound.is_empty()
    }
}

const INT_WIDTHS: [usize; 7] = [2, 3, 4, 5, 6, 7, 8];

/// Name -> definition map.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<TypeDef>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Registry pre-populated with the builtin types.
    pub fn new() -> Self {
        let mut types = HashMap::new();
        let mut add = |name: String, kind: Kind| {
            types.insert(name.clone(), Arc::new(TypeDef::new(name, kind, RawParams::new())));
        };
        for signed in [false, true] {
            let prefix = if signed { "int" } else { "uint" };
            add(
                format!("{}8", prefix),
                Kind::Primitive(Codec::Int(IntCodec { bytes: 1, signed, endian: Endian::Big })),
            );
            for bytes in INT_WIDTHS {
                for endian in [Endian::Little, Endian::Big] {
                    add(
                        format!("{}{}{}", prefix, bytes * 8, suffix(endian)),
                        Kind::Primitive(Codec::Int(IntCodec { bytes, signed, endian })),
                    );
                }
            }
        }
        for (base, double) in [("float", false), ("double", true)] {
            for endian in [Endian::Little, Endian::Big] {
                add(
                    format!("{}_{}", base, suffix(endian)),
                    Kind::Primitive(Codec::Float(FloatCodec { double, endian })),
                );
            }
        }
        add("string".to_string(), Kind::Primitive(Codec::String));
        add("stringz".to_string(), Kind::Primitive(Codec::Stringz));
        add("struct".to_string(), Kind::Record);
        add("choice".to_string(), Kind::Choice);
        add("array".to_string(), Kind::Array);
        TypeRegistry { types }
    }

    /// Bind `name` to `def`. Re-registering an identical definition is a
    /// no-op; binding a different one fails.
    pub fn register(&mut self, def: TypeDef) -> Result<()> {
        if let Some(existing) = self.types.get(def.name()) {
            if **existing == def {
                return Ok(());
            }
            return Err(BinDataError::Argument(format!(
                "type '{}' is already registered",
                def.name()
            )));
        }
        log::debug!("registering type '{}' ({:?})", def.name(), def.kind());
        self.types.insert(def.name.clone(), Arc::new(def));
        Ok(())
    }

    /// Register a named record type. Field names are checked here, before
    /// any instance can exist; field types are resolved at sanitization so
    /// that types may refer to each other in any registration order.
    pub fn register_record(&mut self, name: impl Into<String>, decl: RecordDecl) -> Result<()> {
        check_field_names(&decl.fields)?;
        self.register(TypeDef::new(name, Kind::Record, decl.into_params()))
    }

    /// Register `name` as `base` with extra parameters bound by default.
    pub fn register_derived(
        &mut self,
        name: impl Into<String>,
        base: &str,
        params: RawParams,
    ) -> Result<()> {
        let base_def = self
            .types
            .get(base)
            .ok_or_else(|| BinDataError::UnknownType(base.to_string()))?;
        let mut bound = base_def.bound().clone();
        bound.extend(params);
        let kind = base_def.kind();
        self.register(TypeDef::new(name, kind, bound))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Exact match first; otherwise an endian-neutral integer / float name
    /// combined with the ambient byte order.
    pub fn lookup(&self, name: &str, ambient: Option<Endian>) -> Option<Arc<TypeDef>> {
        if let Some(def) = self.types.get(name) {
            return Some(def.clone());
        }
        let alias = endian_alias(name, ambient?)?;
        self.types.get(&alias).cloned()
    }
}

fn suffix(endian: Endian) -> &'static str {
    match endian {
        Endian::Little => "le",
        Endian::Big => "be",
    }
}

fn endian_alias(name: &str, endian: Endian) -> Option<String> {
    if name == "float" || name == "double" {
        return Some(format!("{}_{}", name, suffix(endian)));
    }
    let digits = name
        .strip_prefix("uint")
        .or_else(|| name.strip_prefix("int"))?;
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(format!("{}{}", name, suffix(endian)))
    } else {
        None
    }
}
