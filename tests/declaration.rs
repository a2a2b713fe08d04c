//! Declaration-time failures: every one surfaces from `Schema::new` or
//! `TypeRegistry::register_record`, before any instance exists.

use bindecl::{BinDataError, Endian, FieldSpec, Param, RecordDecl, Schema, TypeRegistry, Value};
use std::sync::Arc;

fn registry() -> Arc<TypeRegistry> {
    Arc::new(TypeRegistry::new())
}

fn schema(fields: Vec<FieldSpec>) -> Result<Schema, BinDataError> {
    Schema::record(registry(), fields)
}

#[test]
fn test_duplicate_field_names() {
    let err = schema(vec![FieldSpec::field("uint8", "a"), FieldSpec::field("uint16be", "a")])
        .expect_err("duplicate");
    assert!(matches!(err, BinDataError::DuplicateFieldName(n) if n == "a"));

    let mut reg = TypeRegistry::new();
    let decl = RecordDecl::new()
        .field(FieldSpec::field("uint8", "x"))
        .field(FieldSpec::field("uint8", "x"));
    assert!(matches!(
        reg.register_record("pair", decl),
        Err(BinDataError::DuplicateFieldName(_))
    ));
    assert!(!reg.contains("pair"));
}

#[test]
fn test_reserved_field_names() {
    for name in ["read", "num_bytes", "snapshot", "offset_of", "index", "parent"] {
        let err = schema(vec![FieldSpec::field("uint8", name)]).expect_err("reserved");
        assert!(
            matches!(&err, BinDataError::ReservedFieldName(n) if n == name),
            "{} gave {:?}",
            name,
            err
        );
    }
    assert!(bindecl::RESERVED_NAMES.contains(&"clear"));
    schema(vec![FieldSpec::field("uint8", "value")]).expect("value is an ordinary field name");
}

#[test]
fn test_unknown_types() {
    let err = schema(vec![FieldSpec::field("uint12", "a")]).expect_err("unknown");
    assert!(matches!(err, BinDataError::UnknownType(t) if t == "uint12"));

    let err = schema(vec![FieldSpec::array("nosuch", 2).named("items")]).expect_err("unknown element");
    assert!(matches!(err, BinDataError::UnknownType(t) if t == "nosuch"));

    let err = schema(vec![FieldSpec::field("uint16", "a")]).expect_err("no ambient endian");
    assert!(matches!(err, BinDataError::UnknownType(_)));
}

#[test]
fn test_endian_neutral_names_follow_enclosing_record() {
    let mut reg = TypeRegistry::new();
    reg.register_record("pair", RecordDecl::new().field(FieldSpec::field("uint16", "v")))
        .expect("register");
    let reg = Arc::new(reg);
    for (endian, expected) in [(Endian::Little, 0x0201), (Endian::Big, 0x0102)] {
        let spec = FieldSpec::new("struct")
            .with("endian", endian)
            .with("fields", Param::fields(vec![FieldSpec::field("pair", "p")]));
        let mut obj = Schema::new(reg.clone(), spec)
            .expect("schema")
            .instantiate()
            .expect("instantiate");
        obj.read_bytes(&[1, 2]).expect("read");
        assert_eq!(obj.get("p.v").expect("get"), Value::Int(expected));
    }
}

#[test]
fn test_inner_endian_overrides_ambient() {
    let inner = FieldSpec::new("struct")
        .named("inner")
        .with("endian", "big")
        .with("fields", Param::fields(vec![FieldSpec::field("uint16", "v")]));
    let spec = FieldSpec::new("struct")
        .with("endian", Endian::Little)
        .with("fields", Param::fields(vec![FieldSpec::field("uint16", "w"), inner]));
    let mut obj = Schema::new(registry(), spec)
        .expect("schema")
        .instantiate()
        .expect("instantiate");
    obj.read_bytes(&[1, 0, 0, 1]).expect("read");
    assert_eq!(obj.get("w").expect("get"), Value::Int(1));
    assert_eq!(obj.get("inner.v").expect("get"), Value::Int(1));
}

#[test]
fn test_mandatory_parameters() {
    let err = schema(vec![FieldSpec::new("choice")
        .named("c")
        .with("choices", Param::fields(vec![FieldSpec::new("uint8")]))])
    .expect_err("selection missing");
    assert!(matches!(
        err,
        BinDataError::MandatoryParameterMissing { param, .. } if param == "selection"
    ));

    let err = schema(vec![FieldSpec::new("array").named("items").with("initial_length", 2)])
        .expect_err("type missing");
    assert!(matches!(
        err,
        BinDataError::MandatoryParameterMissing { param, .. } if param == "type"
    ));

    let err = Schema::new(registry(), FieldSpec::new("struct")).expect_err("fields missing");
    assert!(matches!(
        err,
        BinDataError::MandatoryParameterMissing { param, .. } if param == "fields"
    ));
}

#[test]
fn test_mutually_exclusive_parameters() {
    let cases = [
        FieldSpec::field("uint8", "a").with("initial_value", 1).with("value", 2),
        FieldSpec::field("uint8", "a").with("check_offset", 0).with("adjust_offset", 0),
        FieldSpec::new("array")
            .named("a")
            .with("type", FieldSpec::new("uint8"))
            .with("initial_length", 1)
            .with("read_until", Param::sym("eof")),
    ];
    for spec in cases {
        let err = schema(vec![spec]).expect_err("exclusive");
        assert!(
            matches!(err, BinDataError::MutuallyExclusiveParameters { .. }),
            "got {:?}",
            err
        );
    }
}

#[test]
fn test_nil_parameter_values() {
    let err = schema(vec![FieldSpec::field("uint8", "a").with("initial_value", Param::Nil)])
        .expect_err("nil");
    assert!(matches!(
        err,
        BinDataError::NilParameterValue { param, .. } if param == "initial_value"
    ));

    let err = schema(vec![FieldSpec::field("uint8", "a").with("custom", Param::Nil)])
        .expect_err("nil extra");
    assert!(matches!(err, BinDataError::NilParameterValue { .. }));
}

#[test]
fn test_bad_endian_value() {
    let spec = FieldSpec::new("struct")
        .with("endian", Param::sym("middle"))
        .with("fields", Param::fields(vec![FieldSpec::field("uint8", "a")]));
    assert!(matches!(
        Schema::new(registry(), spec),
        Err(BinDataError::Argument(_))
    ));
}

#[test]
fn test_choice_declaration_errors() {
    let empty = FieldSpec::new("choice")
        .named("c")
        .with("selection", 0)
        .with("choices", Param::fields(Vec::new()));
    assert!(matches!(schema(vec![empty]), Err(BinDataError::Argument(_))));

    let duplicate_keys = FieldSpec::new("choice")
        .named("c")
        .with("selection", 0)
        .with(
            "choices",
            Param::Keyed(vec![(1, FieldSpec::new("uint8")), (1, FieldSpec::new("uint16be"))]),
        );
    assert!(matches!(schema(vec![duplicate_keys]), Err(BinDataError::Argument(_))));

    let unknown_alternative = FieldSpec::new("choice")
        .named("c")
        .with("selection", 0)
        .with("choices", Param::fields(vec![FieldSpec::new("uint8"), FieldSpec::new("bogus")]));
    assert!(matches!(
        schema(vec![unknown_alternative]),
        Err(BinDataError::UnknownType(_))
    ));
}

#[test]
fn test_array_without_length_is_empty() {
    let mut obj = schema(vec![FieldSpec::new("array")
        .named("items")
        .with("type", FieldSpec::new("uint8"))])
    .expect("schema")
    .instantiate()
    .expect("instantiate");
    assert_eq!(obj.get("items").expect("get"), Value::List(Vec::new()));
    assert_eq!(obj.num_bytes().expect("num_bytes"), 0);
}

#[test]
fn test_unrecognized_parameters_are_kept_as_extras() {
    let mut obj = schema(vec![FieldSpec::field("uint8", "a").with("note", "anything")])
        .expect("schema")
        .instantiate()
        .expect("instantiate");
    assert_eq!(obj.num_bytes().expect("num_bytes"), 1);
}

#[test]
fn test_hide_of_unknown_field_is_tolerated() {
    let mut reg = TypeRegistry::new();
    let decl = RecordDecl::new().field(FieldSpec::field("uint8", "a")).hide("ghost");
    reg.register_record("r", decl).expect("register");
    let mut obj = Schema::new(Arc::new(reg), FieldSpec::new("r"))
        .expect("schema")
        .instantiate()
        .expect("instantiate");
    assert_eq!(obj.field_names().expect("names"), vec!["a"]);
}

#[test]
fn test_expression_syntax_errors() {
    assert!(matches!(Param::expr("a +"), Err(BinDataError::Expression(_))));
    assert!(matches!(Param::expr("(a"), Err(BinDataError::Expression(_))));
}

#[test]
fn test_registry_rejects_rebinding() {
    let mut reg = TypeRegistry::new();
    reg.register_derived("u8x", "uint8", Default::default()).expect("derive");
    reg.register_derived("u8x", "uint8", Default::default()).expect("same again");
    assert!(matches!(
        reg.register_derived("u8x", "uint16be", Default::default()),
        Err(BinDataError::Argument(_))
    ));
    assert!(matches!(
        reg.register_derived("other", "missing", Default::default()),
        Err(BinDataError::UnknownType(_))
    ));
}

#[test]
fn test_derived_types_bind_parameters() {
    let mut reg = TypeRegistry::new();
    let mut bound = bindecl::RawParams::new();
    bound.insert("length".to_string(), Param::from(4));
    bound.insert("pad_byte".to_string(), Param::from(b'.'));
    reg.register_derived("tag4", "string", bound).expect("derive");
    let mut obj = Schema::record(Arc::new(reg), vec![FieldSpec::field("tag4", "t")])
        .expect("schema")
        .instantiate()
        .expect("instantiate");
    obj.set("t", "ab").expect("set");
    assert_eq!(obj.to_bytes().expect("write"), b"ab..".to_vec());
}
