//! Read fuzz target: a length-prefixed, tagged layout over arbitrary input.
//! Reads must succeed or return an error, never panic.
//! Build with: cargo fuzz run read_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fn schema() -> bindecl::Schema {
    use bindecl::{FieldSpec, Param, Schema, TypeRegistry};
    use std::sync::Arc;

    let body = FieldSpec::new("choice")
        .named("body")
        .with("selection", Param::sym("tag"))
        .with(
            "choices",
            Param::fields(vec![
                FieldSpec::new("uint32be"),
                FieldSpec::new("string").with("read_length", Param::sym("len")),
                FieldSpec::array("uint16le", Param::sym("len")),
            ]),
        );
    let fields = vec![
        FieldSpec::field("uint8", "tag"),
        FieldSpec::field("uint8", "len"),
        body,
        FieldSpec::field("stringz", "trailer").with("max_length", 16),
    ];
    match Schema::record(Arc::new(TypeRegistry::new()), fields) {
        Ok(schema) => schema,
        Err(e) => panic!("fuzz schema is invalid: {}", e),
    }
}

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    if let Ok(mut obj) = schema().instantiate() {
        if obj.read_bytes(data).is_ok() {
            let _ = obj.to_bytes();
            let _ = obj.snapshot();
        }
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run read_fuzz");
}
