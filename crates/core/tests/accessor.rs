//! Accessor path search and resolution on nested structures

use std::collections::HashSet;

use typelib_core::schema::{CompoundBuilder, Registry};
use typelib_core::{Accessor, Runtime, TypeMatcher, Value};

/// `Intern`/`Root` pair whose arrays have `len` elements
fn register(registry: &mut Registry, suffix: &str, len: usize) {
    let intern = format!("/Intern{suffix}");
    registry
        .create_compound(
            CompoundBuilder::new(intern.as_str())
                .field("vector", "/std/vector</float>")
                .field("array", format!("/float[{len}]"))
                .field("direct", "/float"),
        )
        .unwrap();
    registry
        .create_compound(
            CompoundBuilder::new(format!("/Root{suffix}"))
                .field("vector", format!("/std/vector<{intern}>"))
                .field("array", format!("{intern}[{len}]"))
                .field("direct", intern.as_str())
                .field("fl_vector", "/std/vector</float>")
                .field("fl_array", format!("/float[{len}]"))
                .field("fl_direct", "/float"),
        )
        .unwrap();
}

fn runtime() -> Runtime {
    let mut registry = Registry::with_standard_types();
    register(&mut registry, "", 10);
    register(&mut registry, "1", 1);
    Runtime::new(registry)
}

fn floats_in(rt: &Runtime, root: &str) -> std::sync::Arc<Accessor> {
    let ty = rt.type_def(root).unwrap();
    Accessor::find_in_type(&ty, &TypeMatcher::exact("/float"))
}

#[test]
fn test_finds_every_float_path() {
    let rt = runtime();
    let accessor = floats_in(&rt, "/Root");

    let paths: Vec<String> = accessor.paths().iter().map(ToString::to_string).collect();
    assert_eq!(
        paths,
        [
            ".vector[].vector[]",
            ".vector[].array[]",
            ".vector[].direct",
            ".array[].vector[]",
            ".array[].array[]",
            ".array[].direct",
            ".direct.vector[]",
            ".direct.array[]",
            ".direct.direct",
            ".fl_vector[]",
            ".fl_array[]",
            ".fl_direct",
        ]
    );
    let distinct: HashSet<_> = accessor.paths().iter().collect();
    assert_eq!(distinct.len(), 12);
}

#[test]
fn test_resolves_one_proxy_per_path() {
    let rt = runtime();
    let root = rt.new_value("/Root1").unwrap();
    root.raw_get("vector").unwrap().resize(1).unwrap();
    root.raw_get("fl_vector").unwrap().resize(1).unwrap();
    for intern in [
        root.raw_get("vector").unwrap().raw_get(0).unwrap(),
        root.raw_get("array").unwrap().raw_get(0).unwrap(),
        root.raw_get("direct").unwrap(),
    ] {
        intern.raw_get("vector").unwrap().resize(1).unwrap();
    }

    let found = floats_in(&rt, "/Root1").resolve(&root).unwrap();
    assert_eq!(found.len(), 12);

    let addresses: HashSet<u64> = found.iter().map(|v| v.address().get()).collect();
    assert_eq!(addresses.len(), 12);
    assert!(found.iter().all(|v| v.type_def().name() == "/float"));

    // Resolution goes through the proxy cache
    let again = floats_in(&rt, "/Root1").resolve(&root).unwrap();
    assert!(found.iter().zip(&again).all(|(a, b)| a.ptr_eq(b)));
}

#[test]
fn test_resolution_follows_array_lengths() {
    let rt = runtime();
    let root = rt.new_value("/Root").unwrap();
    // Empty containers contribute nothing; each /Intern holds 10 + 1 floats
    let found: Vec<Value> = floats_in(&rt, "/Root").resolve(&root).unwrap();
    assert_eq!(found.len(), 10 * 11 + 11 + 10 + 1);
}
