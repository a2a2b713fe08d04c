//! Parameter sanitization: raw declarations -> validated parameter sets.
//!
//! Each type kind has a fixed parameter contract (accepted names, mandatory
//! names, defaults, mutually exclusive pairs). Sanitizing a field resolves
//! its type, validates its parameters against that contract, splits them
//! into accepted and extra (passed through for descendants' lookups) and
//! recursively sanitizes nested declarations with the ambient byte order.
//!
//! Self- and mutually-recursive user types are handled with a guard set:
//! an occurrence of a type that is already being sanitized further up the
//! call chain is not expanded; it keeps its raw parameters (plus the
//! ambient endian) and is sanitized on first instantiation instead.

use crate::ast::{Endian, FieldSpec, Param, RawParams};
use crate::codec::Codec;
use crate::error::{BinDataError, Result};
use crate::record::check_field_names;
use crate::registry::{Kind, TypeDef, TypeRegistry};
use crate::value::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

const BASE_ACCEPTED: &[&str] = &["onlyif", "check_offset", "adjust_offset"];
const PRIMITIVE_ACCEPTED: &[&str] = &["initial_value", "value", "assert"];
const STRING_ACCEPTED: &[&str] = &["length", "read_length", "pad_byte", "trim_padding"];
const STRINGZ_ACCEPTED: &[&str] = &["max_length"];
const RECORD_ACCEPTED: &[&str] = &["fields", "endian", "hide"];
const CHOICE_ACCEPTED: &[&str] = &["choices", "selection", "copy_on_change", "endian"];
const ARRAY_ACCEPTED: &[&str] = &["type", "initial_length", "read_until", "endian"];

const BASE_EXCLUSIVE: &[(&str, &str)] = &[("check_offset", "adjust_offset")];
const PRIMITIVE_EXCLUSIVE: &[(&str, &str)] = &[("initial_value", "value")];
const ARRAY_EXCLUSIVE: &[(&str, &str)] = &[("initial_length", "read_until")];

/// Parameter contract of one type kind.
pub(crate) struct Contract {
    accepted: Vec<&'static str>,
    mandatory: &'static [&'static str],
    exclusive: Vec<(&'static str, &'static str)>,
    defaults: Vec<(&'static str, Param)>,
}

impl Contract {
    pub(crate) fn for_kind(kind: Kind) -> Self {
        let mut accepted = BASE_ACCEPTED.to_vec();
        let mut exclusive = BASE_EXCLUSIVE.to_vec();
        let mut defaults = Vec::new();
        let mandatory: &'static [&'static str] = match kind {
            Kind::Primitive(codec) => {
                accepted.extend_from_slice(PRIMITIVE_ACCEPTED);
                exclusive.extend_from_slice(PRIMITIVE_EXCLUSIVE);
                match codec {
                    Codec::String => {
                        accepted.extend_from_slice(STRING_ACCEPTED);
                        defaults.push(("pad_byte", Param::Value(Value::Int(0))));
                        defaults.push(("trim_padding", Param::Value(Value::Bool(false))));
                    }
                    Codec::Stringz => accepted.extend_from_slice(STRINGZ_ACCEPTED),
                    Codec::Int(_) | Codec::Float(_) => {}
                }
                &[]
            }
            Kind::Record => {
                accepted.extend_from_slice(RECORD_ACCEPTED);
                &["fields"]
            }
            Kind::Choice => {
                accepted.extend_from_slice(CHOICE_ACCEPTED);
                defaults.push(("copy_on_change", Param::Value(Value::Bool(false))));
                &["choices", "selection"]
            }
            Kind::Array => {
                accepted.extend_from_slice(ARRAY_ACCEPTED);
                exclusive.extend_from_slice(ARRAY_EXCLUSIVE);
                &["type"]
            }
        };
        Contract {
            accepted,
            mandatory,
            exclusive,
            defaults,
        }
    }

    pub(crate) fn accepts(&self, name: &str) -> bool {
        self.accepted.contains(&name)
    }
}

/// Nested declarations owned by a composite, already sanitized.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Nested {
    None,
    Fields(Arc<[SanitizedField]>),
    Choices(Arc<[(i128, SanitizedField)]>),
    Element(Arc<SanitizedField>),
}

/// Result of sanitization: accepted parameters (validated, default-filled),
/// extra parameters (unrecognized, resolved lazily by descendants) and the
/// composite's nested declarations.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParameterSet {
    pub accepted: RawParams,
    pub extra: RawParams,
    pub nested: Nested,
    pub endian: Option<Endian>,
}

/// Sanitized parameters, or raw ones awaiting first instantiation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Sanitized {
    Ready(Arc<ParameterSet>),
    Deferred(Arc<RawParams>),
}

/// One declaration after sanitization.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SanitizedField {
    pub name: Option<String>,
    pub hidden: bool,
    pub def: Arc<TypeDef>,
    pub params: Sanitized,
}

pub(crate) struct Sanitizer<'r> {
    registry: &'r TypeRegistry,
    in_progress: Vec<String>,
}

impl<'r> Sanitizer<'r> {
    pub(crate) fn new(registry: &'r TypeRegistry) -> Self {
        Sanitizer {
            registry,
            in_progress: Vec::new(),
        }
    }

    /// Resolve and validate one declaration.
    pub(crate) fn sanitize_field(
        &mut self,
        spec: &FieldSpec,
        ambient: Option<Endian>,
    ) -> Result<SanitizedField> {
        let def = self
            .registry
            .lookup(&spec.type_name, ambient)
            .ok_or_else(|| BinDataError::UnknownType(spec.type_name.clone()))?;
        let mut raw = def.bound().clone();
        raw.extend(spec.params.clone());

        let params = if def.may_recurse() && self.in_progress.iter().any(|n| n == def.name()) {
            ensure_no_nil(&def, &raw)?;
            if Contract::for_kind(def.kind()).accepts("endian") && !raw.contains_key("endian") {
                if let Some(e) = ambient {
                    raw.insert("endian".to_string(), Param::endian(e));
                }
            }
            log::debug!("deferring sanitization of recursive type '{}'", def.name());
            Sanitized::Deferred(Arc::new(raw))
        } else {
            Sanitized::Ready(Arc::new(self.sanitize_guarded(&def, raw, ambient)?))
        };

        Ok(SanitizedField {
            name: spec.name.clone(),
            hidden: spec.hidden,
            def,
            params,
        })
    }

    /// Complete a deferred occurrence at instantiation time.
    pub(crate) fn sanitize_deferred(&mut self, def: &TypeDef, raw: &RawParams) -> Result<ParameterSet> {
        self.sanitize_guarded(def, raw.clone(), None)
    }

    fn sanitize_guarded(
        &mut self,
        def: &TypeDef,
        raw: RawParams,
        ambient: Option<Endian>,
    ) -> Result<ParameterSet> {
        let guarded = def.may_recurse();
        if guarded {
            self.in_progress.push(def.name().to_string());
        }
        let result = self.sanitize_params(def, raw, ambient);
        if guarded {
            self.in_progress.pop();
        }
        result
    }

    fn sanitize_params(
        &mut self,
        def: &TypeDef,
        mut raw: RawParams,
        ambient: Option<Endian>,
    ) -> Result<ParameterSet> {
        ensure_no_nil(def, &raw)?;
        let contract = Contract::for_kind(def.kind());

        for (name, value) in &contract.defaults {
            raw.entry(name.to_string()).or_insert_with(|| value.clone());
        }
        if def.kind() == Kind::Array
            && !raw.contains_key("initial_length")
            && !raw.contains_key("read_until")
        {
            raw.insert("initial_length".to_string(), Param::Value(Value::Int(0)));
        }
        for name in contract.mandatory {
            if !raw.contains_key(*name) {
                return Err(BinDataError::MandatoryParameterMissing {
                    type_name: def.name().to_string(),
                    param: name.to_string(),
                });
            }
        }
        for (first, second) in &contract.exclusive {
            if raw.contains_key(*first) && raw.contains_key(*second) {
                return Err(BinDataError::MutuallyExclusiveParameters {
                    type_name: def.name().to_string(),
                    first: first.to_string(),
                    second: second.to_string(),
                });
            }
        }

        let endian = match raw.get("endian") {
            Some(p) if contract.accepts("endian") => Some(parse_endian(p)?),
            _ => None,
        };
        let inner_ambient = endian.or(ambient);

        let nested = match def.kind() {
            Kind::Primitive(_) => Nested::None,
            Kind::Record => {
                let hide = match raw.remove("hide") {
                    Some(Param::Names(names)) => names,
                    Some(other) => return Err(bad_param(def, "hide", &other)),
                    None => Vec::new(),
                };
                match raw.remove("fields") {
                    Some(Param::Fields(fields)) => {
                        Nested::Fields(self.sanitize_record_fields(&fields, &hide, inner_ambient)?)
                    }
                    Some(other) => return Err(bad_param(def, "fields", &other)),
                    None => Nested::None,
                }
            }
            Kind::Choice => {
                let alternatives = match raw.remove("choices") {
                    Some(Param::Fields(fields)) => fields
                        .into_iter()
                        .enumerate()
                        .map(|(i, f)| (i as i128, f))
                        .collect(),
                    Some(Param::Keyed(keyed)) => keyed,
                    Some(other) => return Err(bad_param(def, "choices", &other)),
                    None => Vec::new(),
                };
                Nested::Choices(self.sanitize_choices(def, &alternatives, inner_ambient)?)
            }
            Kind::Array => {
                let element = match raw.remove("type") {
                    Some(Param::Type(spec)) => *spec,
                    Some(other) => match other.as_text() {
                        Some(type_name) => FieldSpec::new(type_name),
                        None => return Err(bad_param(def, "type", &other)),
                    },
                    None => return Err(bad_param(def, "type", &Param::Nil)),
                };
                Nested::Element(Arc::new(self.sanitize_field(&element, inner_ambient)?))
            }
        };

        let mut accepted = RawParams::new();
        let mut extra = RawParams::new();
        for (name, value) in raw {
            if contract.accepts(&name) {
                accepted.insert(name, value);
            } else {
                extra.insert(name, value);
            }
        }
        Ok(ParameterSet {
            accepted,
            extra,
            nested,
            endian,
        })
    }

    fn sanitize_record_fields(
        &mut self,
        fields: &[FieldSpec],
        hide: &[String],
        ambient: Option<Endian>,
    ) -> Result<Arc<[SanitizedField]>> {
        check_field_names(fields)?;
        for name in hide {
            if !fields.iter().any(|f| f.name.as_deref() == Some(name.as_str())) {
                log::warn!("hide: no field named '{}'", name);
            }
        }
        let mut out = Vec::with_capacity(fields.len());
        for spec in fields {
            let mut field = self.sanitize_field(spec, ambient)?;
            if let Some(name) = &field.name {
                field.hidden |= hide.contains(name);
            }
            out.push(field);
        }
        Ok(out.into())
    }

    fn sanitize_choices(
        &mut self,
        def: &TypeDef,
        alternatives: &[(i128, FieldSpec)],
        ambient: Option<Endian>,
    ) -> Result<Arc<[(i128, SanitizedField)]>> {
        if alternatives.is_empty() {
            return Err(BinDataError::Argument(format!(
                "{}: choices must not be empty",
                def.name()
            )));
        }
        let mut keys = BTreeSet::new();
        let mut out = Vec::with_capacity(alternatives.len());
        for (key, spec) in alternatives {
            if !keys.insert(*key) {
                return Err(BinDataError::Argument(format!(
                    "{}: duplicate choice key {}",
                    def.name(),
                    key
                )));
            }
            out.push((*key, self.sanitize_field(spec, ambient)?));
        }
        Ok(out.into())
    }
}

fn ensure_no_nil(def: &TypeDef, raw: &RawParams) -> Result<()> {
    match raw.iter().find(|(_, v)| matches!(v, Param::Nil)) {
        Some((name, _)) => Err(BinDataError::NilParameterValue {
            type_name: def.name().to_string(),
            param: name.clone(),
        }),
        None => Ok(()),
    }
}

fn parse_endian(param: &Param) -> Result<Endian> {
    match param.as_text() {
        Some(text) => text.parse(),
        None => Err(BinDataError::Argument(format!(
            "endian must be :little or :big, got {:?}",
            param
        ))),
    }
}

fn bad_param(def: &TypeDef, name: &str, param: &Param) -> BinDataError {
    BinDataError::Argument(format!(
        "{}: invalid value for parameter '{}': {:?}",
        def.name(),
        name,
        param
    ))
}
