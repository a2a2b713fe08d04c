//! # bindecl: declarative binary layouts
//!
//! Describe a binary format as a tree of typed fields, then read, write,
//! inspect and modify data through it. Field parameters may refer to other
//! fields by name (a length read earlier, a selector, a computed checksum);
//! those references are evaluated lazily, every time they are needed.
//!
//! ## Pieces
//!
//! - **Declarations**: [`FieldSpec`] trees with raw [`Param`]s, named record
//!   types registered in a [`TypeRegistry`].
//! - **Sanitization**: [`Schema::new`] resolves types and validates every
//!   parameter against its type's contract. Recursive types are expanded
//!   lazily, on first instantiation.
//! - **Objects**: [`BinObject`] is one instance. Records, choices, arrays
//!   and primitives share one operation set: read, write, size, snapshot,
//!   clear, offsets.
//! - **Expressions**: computed parameters use a small expression language
//!   (see [`expr`]), resolving free names through the object's scope chain.
//!
//! ## Field types
//!
//! - Integers: `int8`, `uint8`, `[u]int{16,24,32,40,48,56,64}{le,be}`; the
//!   endian-neutral names (`uint16`) take the enclosing `endian`.
//! - Floats: `float_le`, `float_be`, `double_le`, `double_be` (`float`, `double`).
//! - Strings: `string` (`length`, `read_length`, `pad_byte`, `trim_padding`),
//!   `stringz` (`max_length`).
//! - Composites: `struct` (`fields`, `endian`, `hide`), `choice`
//!   (`choices`, `selection`, `copy_on_change`), `array` (`type`,
//!   `initial_length` or `read_until`).
//! - On every type: `onlyif`, `check_offset`, `adjust_offset`; on
//!   primitives also `value`, `initial_value`, `assert`.
//!
//! ## Example
//!
//! ```
//! use bindecl::{FieldSpec, Param, Schema, TypeRegistry, Value};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(TypeRegistry::new());
//! let schema = Schema::record(
//!     registry,
//!     vec![
//!         FieldSpec::field("uint8", "len"),
//!         FieldSpec::field("string", "name").with("read_length", Param::sym("len")),
//!     ],
//! )?;
//! let mut obj = schema.instantiate()?;
//! obj.read_bytes(b"\x03abc")?;
//! assert_eq!(obj.get("name")?, Value::from("abc"));
//! assert_eq!(obj.num_bytes()?, 4);
//! # Ok::<(), bindecl::BinDataError>(())
//! ```

pub mod ast;
pub mod codec;
pub mod error;
pub mod expr;
pub mod object;
pub mod registry;
pub mod stream;
pub mod tree;
pub mod value;

mod array;
mod choice;
mod env;
mod params;
mod primitive;
mod record;

pub use ast::{Endian, FieldSpec, Param, RawParams, RecordDecl};
pub use codec::Codec;
pub use error::{BinDataError, Result};
pub use expr::Expr;
pub use object::{BinObject, Schema};
pub use record::RESERVED_NAMES;
pub use registry::{Kind, TypeDef, TypeRegistry};
pub use stream::{ByteReader, ByteWriter, Reader, Writer};
pub use tree::{ObjectId, Tree};
pub use value::Value;
