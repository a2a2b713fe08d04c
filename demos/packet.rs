//! Decode a small tagged packet format and print it as JSON.
//!
//! Usage:
//!   cargo run --example packet [FILE]
//!
//! Without a file, a built-in sample is decoded. Set RUST_LOG=trace to see
//! every primitive as it is read.

use bindecl::{Endian, FieldSpec, Param, RecordDecl, Schema, TypeRegistry, Value};
use std::sync::Arc;

const SAMPLE: &[u8] = b"PK\x02\x01\x00\x00\x00\x2a\x02\x05hello\x00";

fn registry() -> anyhow::Result<Arc<TypeRegistry>> {
    let mut reg = TypeRegistry::new();
    let item = RecordDecl::new()
        .field(FieldSpec::field("uint8", "tag"))
        .field(
            FieldSpec::new("choice")
                .named("body")
                .with("selection", Param::expr("tag - 1")?)
                .with(
                    "choices",
                    Param::fields(vec![
                        FieldSpec::new("uint32"),
                        FieldSpec::new("struct").with(
                            "fields",
                            Param::fields(vec![
                                FieldSpec::field("uint8", "len"),
                                FieldSpec::field("string", "text").with("read_length", Param::sym("len")),
                            ]),
                        ),
                    ]),
                ),
        );
    reg.register_record("item", item)?;
    let packet = RecordDecl::new()
        .endian(Endian::Big)
        .field(FieldSpec::field("string", "magic").with("length", 2).with("assert", Value::from("PK")))
        .field(FieldSpec::field("uint8", "count"))
        .field(FieldSpec::array("item", Param::sym("count")).named("items"))
        .field(FieldSpec::field("uint8", "end").with("check_offset", Param::expr("offset > 3")?));
    reg.register_record("packet", packet)?;
    Ok(Arc::new(reg))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let data = match std::env::args().nth(1) {
        Some(path) => std::fs::read(&path)?,
        None => SAMPLE.to_vec(),
    };
    let schema = Schema::new(registry()?, FieldSpec::new("packet"))?;
    let mut obj = schema.instantiate()?;
    obj.read_bytes(&data)?;
    let snapshot = obj
        .snapshot()?
        .ok_or_else(|| anyhow::anyhow!("packet is inactive"))?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    println!("{} bytes, items start at offset {}", obj.num_bytes()?, obj.offset_of("items")?);
    Ok(())
}
