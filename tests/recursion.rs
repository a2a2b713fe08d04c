//! Self- and mutually-recursive types: declaration terminates, instances
//! grow only as far as the data goes.

use bindecl::{BinObject, Endian, FieldSpec, Param, RecordDecl, Schema, TypeRegistry, Value};
use std::sync::Arc;

fn expr(source: &str) -> Param {
    Param::expr(source).expect("expression")
}

/// `node { uint8 value; uint8 has_next; node next onlyif has_next != 0 }`
fn linked_list() -> Arc<TypeRegistry> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut reg = TypeRegistry::new();
    let decl = RecordDecl::new()
        .field(FieldSpec::field("uint8", "value"))
        .field(FieldSpec::field("uint8", "has_next"))
        .field(FieldSpec::field("node", "next").with("onlyif", expr("has_next != 0")));
    reg.register_record("node", decl).expect("register node");
    Arc::new(reg)
}

fn instance(reg: Arc<TypeRegistry>, type_name: &str) -> BinObject {
    Schema::new(reg, FieldSpec::new(type_name))
        .expect("schema")
        .instantiate()
        .expect("instantiate")
}

#[test]
fn test_self_recursive_record() {
    let mut obj = instance(linked_list(), "node");
    assert_eq!(obj.num_bytes().expect("num_bytes"), 2);

    let bytes = [1, 1, 2, 1, 3, 0];
    obj.read_bytes(&bytes).expect("read");
    assert_eq!(obj.num_bytes().expect("num_bytes"), 6);
    assert_eq!(obj.get("next.next.value").expect("get"), Value::Int(3));
    assert_eq!(obj.abs_offset_of("next.next.value").expect("offset"), 4);
    assert_eq!(obj.debug_name("next.next.has_next").expect("name"), "obj.next.next.has_next");
    assert_eq!(
        obj.snapshot().expect("snapshot"),
        Some(Value::record(vec![
            ("value", Value::Int(1)),
            ("has_next", Value::Int(1)),
            (
                "next",
                Value::record(vec![
                    ("value", Value::Int(2)),
                    ("has_next", Value::Int(1)),
                    ("next", Value::record(vec![("value", 3), ("has_next", 0)])),
                ]),
            ),
        ]))
    );
    assert_eq!(obj.to_bytes().expect("write"), bytes.to_vec());
}

#[test]
fn test_instances_grow_only_with_the_data() {
    let mut obj = instance(linked_list(), "node");
    obj.read_bytes(&[7, 0]).expect("read");
    let live = obj.tree().live_objects();
    obj.snapshot().expect("snapshot");
    obj.num_bytes().expect("num_bytes");
    assert_eq!(obj.tree().live_objects(), live);
}

#[test]
fn test_deep_chain() {
    let mut obj = instance(linked_list(), "node");
    let depth = 100;
    let mut bytes = Vec::new();
    for i in 0..depth {
        bytes.push(i as u8);
        bytes.push(u8::from(i + 1 < depth));
    }
    obj.read_bytes(&bytes).expect("read");
    assert_eq!(obj.num_bytes().expect("num_bytes"), bytes.len() as u64);
    let last = vec!["next"; depth - 1].join(".");
    assert_eq!(obj.get(&format!("{}.value", last)).expect("get"), Value::Int(99));
    assert_eq!(obj.to_bytes().expect("write"), bytes);
}

#[test]
fn test_mutual_recursion_through_a_choice() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut reg = TypeRegistry::new();
    reg.register_record(
        "expr_node",
        RecordDecl::new()
            .field(FieldSpec::field("uint8", "tag"))
            .field(
                FieldSpec::new("choice")
                    .named("body")
                    .with("selection", Param::sym("tag"))
                    .with(
                        "choices",
                        Param::fields(vec![FieldSpec::new("uint8"), FieldSpec::new("pair")]),
                    ),
            ),
    )
    .expect("register expr_node");
    reg.register_record(
        "pair",
        RecordDecl::new()
            .field(FieldSpec::field("expr_node", "left"))
            .field(FieldSpec::field("expr_node", "right")),
    )
    .expect("register pair");
    let mut obj = instance(Arc::new(reg), "expr_node");

    // (5, (6, 7))
    let bytes = [1, 0, 5, 1, 0, 6, 0, 7];
    obj.read_bytes(&bytes).expect("read");
    assert_eq!(obj.get("body.left.body").expect("get"), Value::Int(5));
    assert_eq!(obj.get("body.right.body.right.body").expect("get"), Value::Int(7));
    assert_eq!(obj.num_bytes_of("body.right").expect("num_bytes"), 5);
    assert_eq!(obj.abs_offset_of("body.right.body.left").expect("offset"), 4);
    assert_eq!(obj.to_bytes().expect("write"), bytes.to_vec());

    let leaf = Value::record(vec![("tag", 0), ("body", 5)]);
    assert_eq!(obj.get("body.left").expect("get"), leaf);
}

#[test]
fn test_recursion_through_an_array() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut reg = TypeRegistry::new();
    reg.register_record(
        "tree",
        RecordDecl::new()
            .field(FieldSpec::field("uint8", "count"))
            .field(FieldSpec::array("tree", Param::sym("count")).named("kids")),
    )
    .expect("register tree");
    let mut obj = instance(Arc::new(reg), "tree");

    obj.read_bytes(&[2, 0, 1, 0]).expect("read");
    assert_eq!(obj.num_bytes().expect("num_bytes"), 4);
    assert_eq!(obj.get("kids.1.count").expect("get"), Value::Int(1));
    assert_eq!(obj.get("kids.1.kids.0.count").expect("get"), Value::Int(0));
    assert_eq!(obj.debug_name("kids.1.kids.0").expect("name"), "obj.kids[1].kids[0]");
}

#[test]
fn test_recursive_occurrences_inherit_the_byte_order() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut reg = TypeRegistry::new();
    reg.register_record(
        "chain",
        RecordDecl::new()
            .field(FieldSpec::field("uint16", "v"))
            .field(FieldSpec::field("uint8", "more"))
            .field(FieldSpec::field("chain", "next").with("onlyif", Param::sym("more"))),
    )
    .expect("register chain");
    let reg = Arc::new(reg);

    let bytes = [0, 1, 1, 0, 2, 0];
    for (endian, first, second) in [(Endian::Big, 1, 2), (Endian::Little, 256, 512)] {
        let mut obj = Schema::with_endian(reg.clone(), FieldSpec::new("chain"), Some(endian))
            .expect("schema")
            .instantiate()
            .expect("instantiate");
        obj.read_bytes(&bytes).expect("read");
        assert_eq!(obj.get("v").expect("get"), Value::Int(first));
        assert_eq!(obj.get("next.v").expect("get"), Value::Int(second));
        assert_eq!(obj.to_bytes().expect("write"), bytes.to_vec());
    }

    let spec = FieldSpec::new("struct")
        .with("endian", Endian::Little)
        .with("fields", Param::fields(vec![FieldSpec::field("chain", "c")]));
    let mut obj = Schema::new(reg, spec)
        .expect("schema")
        .instantiate()
        .expect("instantiate");
    obj.read_bytes(&bytes).expect("read");
    assert_eq!(obj.get("c.next.v").expect("get"), Value::Int(512));
}

#[test]
fn test_recursive_type_without_ambient_endian_fails_at_declaration() {
    let mut reg = TypeRegistry::new();
    reg.register_record(
        "chain",
        RecordDecl::new()
            .field(FieldSpec::field("uint16", "v"))
            .field(FieldSpec::field("chain", "next").with("onlyif", false)),
    )
    .expect("register chain");
    assert!(matches!(
        Schema::new(Arc::new(reg), FieldSpec::new("chain")),
        Err(bindecl::BinDataError::UnknownType(_))
    ));
}
