//! Choice behaviour: selection range, memoized alternatives, copy_on_change,
//! clearing, and transparency towards the selected record.

use bindecl::{BinDataError, BinObject, FieldSpec, Param, Schema, TypeRegistry, Value};
use std::sync::Arc;

fn instantiate(fields: Vec<FieldSpec>) -> BinObject {
    let _ = env_logger::builder().is_test(true).try_init();
    Schema::record(Arc::new(TypeRegistry::new()), fields)
        .expect("schema")
        .instantiate()
        .expect("instantiate")
}

fn scalar_choice(extra: Option<(&str, Param)>) -> BinObject {
    let mut choice = FieldSpec::new("choice")
        .named("c")
        .with("selection", Param::sym("sel"))
        .with(
            "choices",
            Param::fields(vec![
                FieldSpec::new("uint8"),
                FieldSpec::new("uint16be"),
                FieldSpec::new("uint32be"),
            ]),
        );
    if let Some((key, param)) = extra {
        choice = choice.with(key, param);
    }
    instantiate(vec![FieldSpec::field("uint8", "sel"), choice])
}

#[test]
fn test_every_selection_in_range_works() {
    let mut obj = scalar_choice(None);
    for (sel, size) in [(0, 1), (1, 2), (2, 4)] {
        obj.set("sel", sel).expect("set sel");
        assert_eq!(obj.num_bytes_of("c").expect("num_bytes"), size);
    }
}

#[test]
fn test_reselection_reuses_the_same_child() {
    let mut obj = scalar_choice(None);
    obj.set("sel", 0).expect("set sel");
    obj.set("c", 7).expect("set c");
    let c = obj.lookup("c").expect("lookup");
    let first = obj.tree_mut().selection(c).expect("selection");

    obj.set("sel", 1).expect("set sel");
    obj.set("c", 300).expect("set c");
    assert_eq!(obj.get("c").expect("get"), Value::Int(300));

    obj.set("sel", 0).expect("set sel");
    assert_eq!(obj.get("c").expect("get"), Value::Int(7));
    assert_eq!(obj.tree_mut().selection(c).expect("selection"), first);

    obj.set("sel", 1).expect("set sel");
    assert_eq!(obj.get("c").expect("get"), Value::Int(300));
}

#[test]
fn test_invalid_selection_is_not_cached() {
    let mut obj = scalar_choice(None);
    obj.set("sel", 1).expect("set sel");
    obj.set("c", 9).expect("set c");
    let live = obj.tree().live_objects();

    for bad in [3, 200] {
        obj.set("sel", bad).expect("set sel");
        match obj.get("c") {
            Err(BinDataError::InvalidSelection { selection, choices, debug_name }) => {
                assert_eq!(selection, bad.to_string());
                assert_eq!(choices, 3);
                assert_eq!(debug_name, "obj.c");
            }
            other => panic!("expected InvalidSelection, got {:?}", other),
        }
        assert_eq!(obj.tree().live_objects(), live);
    }

    obj.set("sel", 1).expect("set sel");
    assert_eq!(obj.get("c").expect("get"), Value::Int(9));
}

#[test]
fn test_negative_selection_is_invalid() {
    let mut obj = instantiate(vec![FieldSpec::new("choice")
        .named("c")
        .with("selection", -1)
        .with("choices", Param::fields(vec![FieldSpec::new("uint8")]))]);
    assert!(matches!(obj.get("c"), Err(BinDataError::InvalidSelection { .. })));
    assert!(matches!(obj.to_bytes(), Err(BinDataError::InvalidSelection { .. })));
}

#[test]
fn test_copy_on_change() {
    let mut obj = scalar_choice(Some(("copy_on_change", Param::from(true))));
    obj.set("sel", 0).expect("set sel");
    obj.set("c", 42).expect("set c");
    obj.set("sel", 2).expect("set sel");
    assert_eq!(obj.get("c").expect("get"), Value::Int(42));
    assert_eq!(obj.to_bytes().expect("write"), vec![2, 0, 0, 0, 42]);

    let mut obj = scalar_choice(None);
    obj.set("sel", 0).expect("set sel");
    obj.set("c", 42).expect("set c");
    obj.set("sel", 2).expect("set sel");
    assert_eq!(obj.get("c").expect("get"), Value::Int(0));
}

#[test]
fn test_clear_drops_every_alternative() {
    let mut obj = scalar_choice(None);
    obj.set("sel", 0).expect("set sel");
    obj.set("c", 5).expect("set c");
    let c = obj.lookup("c").expect("lookup");
    let old = obj.tree_mut().selection(c).expect("selection");
    obj.set("sel", 1).expect("set sel");
    obj.set("c", 6).expect("set c");

    obj.clear_field("c").expect("clear");
    assert!(obj.is_clear_field("c").expect("is_clear"));
    assert!(matches!(
        obj.tree().debug_name(old),
        Err(BinDataError::StaleObject(_))
    ));
    assert_eq!(obj.get("c").expect("get"), Value::Int(0));
    obj.set("sel", 0).expect("set sel");
    assert_eq!(obj.get("c").expect("get"), Value::Int(0));
}

#[test]
fn test_read_selects_by_tag() {
    let mut obj = scalar_choice(None);
    obj.read_bytes(&[1, 0x12, 0x34]).expect("read");
    assert_eq!(obj.get("c").expect("get"), Value::Int(0x1234));
    obj.read_bytes(&[2, 0, 0, 0, 1]).expect("read");
    assert_eq!(obj.get("c").expect("get"), Value::Int(1));
    assert_eq!(obj.num_bytes().expect("num_bytes"), 5);
    assert!(matches!(
        obj.read_bytes(&[7, 0]),
        Err(BinDataError::InvalidSelection { .. })
    ));
}

fn record_choice() -> BinObject {
    let point = FieldSpec::new("struct").with(
        "fields",
        Param::fields(vec![FieldSpec::field("uint8", "x"), FieldSpec::field("uint8", "y")]),
    );
    let span = FieldSpec::new("struct").with(
        "fields",
        Param::fields(vec![
            FieldSpec::field("uint16be", "start"),
            FieldSpec::field("uint16be", "end"),
            FieldSpec::field("uint8", "len").with("value", Param::expr("end - start").expect("expr")),
        ]),
    );
    instantiate(vec![
        FieldSpec::field("uint8", "kind"),
        FieldSpec::new("choice")
            .named("shape")
            .with("selection", Param::sym("kind"))
            .with("choices", Param::fields(vec![point, span])),
    ])
}

#[test]
fn test_choice_is_transparent_to_selected_record() {
    let mut obj = record_choice();
    obj.read_bytes(&[0, 3, 4]).expect("read");
    assert_eq!(obj.get("shape.y").expect("get"), Value::Int(4));
    let shape = obj.lookup("shape").expect("lookup");
    assert_eq!(obj.tree_mut().field_names(shape).expect("names"), vec!["x", "y"]);
    assert_eq!(obj.offset_of("shape.y").expect("offset"), 1);
    assert_eq!(
        obj.snapshot().expect("snapshot"),
        Some(Value::record(vec![
            ("kind", Value::Int(0)),
            ("shape", Value::record(vec![("x", 3), ("y", 4)])),
        ]))
    );

    obj.read_bytes(&[1, 0, 2, 0, 9, 0]).expect("read");
    assert_eq!(obj.get("shape.len").expect("get"), Value::Int(7));
    assert_eq!(obj.tree_mut().field_names(shape).expect("names"), vec!["start", "end", "len"]);
    assert_eq!(obj.debug_name("shape.end").expect("debug name"), "obj.shape.end");
}

#[test]
fn test_names_inside_alternatives_resolve_through_the_choice() {
    let body = FieldSpec::new("struct").with(
        "fields",
        Param::fields(vec![FieldSpec::field("string", "text").with("read_length", Param::sym("len"))]),
    );
    let mut obj = instantiate(vec![
        FieldSpec::field("uint8", "len"),
        FieldSpec::new("choice")
            .named("body")
            .with("selection", 0)
            .with("choices", Param::fields(vec![body])),
    ]);
    obj.read_bytes(b"\x02okay").expect("read");
    assert_eq!(obj.get("body.text").expect("get"), Value::from("ok"));
}

#[test]
fn test_keyed_alternatives() {
    let mut obj = instantiate(vec![
        FieldSpec::field("uint8", "tag"),
        FieldSpec::new("choice")
            .named("v")
            .with("selection", Param::sym("tag"))
            .with(
                "choices",
                Param::Keyed(vec![(1, FieldSpec::new("uint8")), (5, FieldSpec::new("uint16be"))]),
            ),
    ]);
    obj.read_bytes(&[5, 1, 0]).expect("read");
    assert_eq!(obj.get("v").expect("get"), Value::Int(256));
    obj.read_bytes(&[1, 9]).expect("read");
    assert_eq!(obj.get("v").expect("get"), Value::Int(9));
    assert!(matches!(
        obj.read_bytes(&[0, 0]),
        Err(BinDataError::InvalidSelection { .. })
    ));
}

#[test]
fn test_field_names_on_primitive_alternative() {
    let mut obj = scalar_choice(None);
    let c = obj.lookup("c").expect("lookup");
    assert!(matches!(
        obj.tree_mut().field_names(c),
        Err(BinDataError::NoSuchOperation { .. })
    ));
}
