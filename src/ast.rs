//! Declaration model: the field lists a front end hands to the core.
//!
//! A declaration is a tree of [`FieldSpec`]s. Each one names a type, an
//! optional field name and raw parameters. Raw parameters are validated and
//! split into accepted / extra sets by sanitization (see [`crate::params`]).

use crate::error::{BinDataError, Result};
use crate::expr::Expr;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Byte order for multi-byte leaf fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endian::Little => "little",
            Endian::Big => "big",
        }
    }
}

impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Endian {
    type Err = BinDataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "little" | "le" => Ok(Endian::Little),
            "big" | "be" => Ok(Endian::Big),
            other => Err(BinDataError::Argument(format!(
                "unknown value for endian '{}' (expected little or big)",
                other
            ))),
        }
    }
}

/// Raw parameters of one field, keyed by parameter name.
pub type RawParams = BTreeMap<String, Param>;

/// A raw parameter value, before sanitization.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// Explicitly absent. Always rejected by sanitization.
    Nil,
    /// Literal, returned as-is when evaluated.
    Value(Value),
    /// Symbolic reference: a zero-argument lookup by name.
    Symbol(String),
    /// Computed expression, evaluated in the owning object's scope.
    Expr(Expr),
    /// Nested field list (record `fields`, choice `choices`).
    Fields(Vec<FieldSpec>),
    /// Choice alternatives with explicit selection keys.
    Keyed(Vec<(i128, FieldSpec)>),
    /// Single nested declaration (array element `type`).
    Type(Box<FieldSpec>),
    /// Plain list of names (record `hide`).
    Names(Vec<String>),
}

impl Param {
    pub fn value(v: impl Into<Value>) -> Self {
        Param::Value(v.into())
    }

    pub fn sym(name: impl Into<String>) -> Self {
        Param::Symbol(name.into())
    }

    /// Parse `source` with the expression grammar.
    pub fn expr(source: &str) -> Result<Self> {
        Ok(Param::Expr(source.parse()?))
    }

    pub fn endian(e: Endian) -> Self {
        Param::Symbol(e.as_str().to_string())
    }

    pub fn fields(fields: Vec<FieldSpec>) -> Self {
        Param::Fields(fields)
    }

    pub fn of_type(spec: FieldSpec) -> Self {
        Param::Type(Box::new(spec))
    }

    pub fn names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Param::Names(names.into_iter().map(Into::into).collect())
    }

    /// Literal or symbolic text of this parameter, if it is one.
    pub(crate) fn as_text(&self) -> Option<String> {
        match self {
            Param::Symbol(s) => Some(s.clone()),
            Param::Value(Value::Bytes(b)) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }
}

impl From<Value> for Param {
    fn from(v: Value) -> Self {
        Param::Value(v)
    }
}

impl From<Expr> for Param {
    fn from(e: Expr) -> Self {
        Param::Expr(e)
    }
}

impl From<FieldSpec> for Param {
    fn from(spec: FieldSpec) -> Self {
        Param::Type(Box::new(spec))
    }
}

/// A string literal (a byte string value, never a name reference).
impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Param::Value(Value::from(s))
    }
}

impl From<Endian> for Param {
    fn from(e: Endian) -> Self {
        Param::endian(e)
    }
}

macro_rules! literal_into_param {
    ($($t:ty),*) => {
        $(impl From<$t> for Param {
            fn from(x: $t) -> Self {
                Param::Value(Value::from(x))
            }
        })*
    };
}

literal_into_param!(i8, i16, i32, i64, i128, u8, u16, u32, u64, usize, bool, f32, f64);

/// One declared field: `(type, name?, params, hidden)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub type_name: String,
    pub name: Option<String>,
    pub params: RawParams,
    pub hidden: bool,
}

impl FieldSpec {
    pub fn new(type_name: impl Into<String>) -> Self {
        FieldSpec {
            type_name: type_name.into(),
            name: None,
            params: RawParams::new(),
            hidden: false,
        }
    }

    /// Shorthand for `FieldSpec::new(type_name).named(name)`.
    pub fn field(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        FieldSpec::new(type_name).named(name)
    }

    /// Homogeneous array of `initial_length` elements of `element_type`.
    pub fn array(element_type: impl Into<String>, initial_length: impl Into<Param>) -> Self {
        FieldSpec::new("array")
            .with("type", FieldSpec::new(element_type))
            .with("initial_length", initial_length)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, param: impl Into<Param>) -> Self {
        self.params.insert(key.into(), param.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// Field list of a named record type, registered with
/// [`crate::TypeRegistry::register_record`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDecl {
    pub fields: Vec<FieldSpec>,
    pub endian: Option<Endian>,
    pub hide: Vec<String>,
}

impl RecordDecl {
    pub fn new() -> Self {
        RecordDecl::default()
    }

    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = Some(endian);
        self
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn hide(mut self, name: impl Into<String>) -> Self {
        self.hide.push(name.into());
        self
    }

    /// Raw parameters this declaration binds to its type.
    pub(crate) fn into_params(self) -> RawParams {
        let mut params = RawParams::new();
        params.insert("fields".to_string(), Param::Fields(self.fields));
        if let Some(e) = self.endian {
            params.insert("endian".to_string(), Param::endian(e));
        }
        if !self.hide.is_empty() {
            params.insert("hide".to_string(), Param::Names(self.hide));
        }
        params
    }
}
