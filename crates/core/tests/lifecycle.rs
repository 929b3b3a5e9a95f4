//! Proxy identity, freezing, invalidation and container resize safety

use typelib_core::schema::{CompoundBuilder, Registry};
use typelib_core::{Error, HostValue, Runtime, Value};

fn runtime() -> Runtime {
    let mut registry = Registry::with_standard_types();
    registry
        .create_compound(
            CompoundBuilder::new("/nav/Waypoint")
                .field("x", "/double")
                .field("y", "/double"),
        )
        .unwrap();
    registry
        .create_compound(
            CompoundBuilder::new("/nav/Route")
                .field("id", "/uint32_t")
                .field("start", "/nav/Waypoint")
                .field("legs", "/nav/Waypoint[2]")
                .field("stops", "/std/vector</nav/Waypoint>"),
        )
        .unwrap();
    Runtime::new(registry)
}

fn assert_frozen<T: std::fmt::Debug>(result: typelib_core::Result<T>) {
    assert!(
        matches!(result, Err(Error::FrozenViolation { .. })),
        "expected FrozenViolation, got {result:?}"
    );
}

fn assert_invalidated<T: std::fmt::Debug>(result: typelib_core::Result<T>) {
    assert!(
        matches!(result, Err(Error::InvalidatedAccess { .. })),
        "expected InvalidatedAccess, got {result:?}"
    );
}

#[test]
fn test_field_access_returns_the_same_proxy() {
    let rt = runtime();
    let route = rt.new_value("/nav/Route").unwrap();

    let a = route.get("start").unwrap();
    let b = route.get("start").unwrap();
    assert_eq!(a, b);

    let (a, b) = (a.as_proxy().unwrap(), b.as_proxy().unwrap());
    assert!(a.ptr_eq(b));

    a.set("x", 4.5).unwrap();
    assert_eq!(b.get("x").unwrap(), HostValue::Float(4.5));
}

#[test]
fn test_freeze_cascades_to_cached_children() {
    let rt = runtime();
    let route = rt.new_value("/nav/Route").unwrap();
    let start = route.raw_get("start").unwrap();
    let leg = route.raw_get("legs").unwrap().raw_get(1).unwrap();
    let as_bytes = route.cast("/uint8_t[4]").unwrap();

    route.freeze().unwrap();
    assert!(start.is_frozen() && leg.is_frozen() && as_bytes.is_frozen());

    assert_frozen(route.set("id", 1u32));
    assert_frozen(start.set("x", 1.0));
    assert_frozen(leg.raw_get("y").unwrap().set_scalar(1.0));
    assert_frozen(as_bytes.set(0, 1u8));
    assert_frozen(route.raw_get("stops").unwrap().push(HostValue::Null));

    // Children materialized later are frozen too
    let stops = route.raw_get("stops").unwrap();
    assert!(stops.is_frozen());

    // Reads still work
    assert_eq!(start.get("x").unwrap(), HostValue::Float(0.0));
}

#[test]
fn test_invalidate_cascades_to_cached_children() {
    let rt = runtime();
    let route = rt.new_value("/nav/Route").unwrap();
    let start = route.raw_get("start").unwrap();
    let x = start.raw_get("x").unwrap();
    let legs = route.raw_get("legs").unwrap();
    let alias = route.cast("/uint32_t").unwrap();

    route.invalidate();
    for value in [&route, &start, &x, &legs, &alias] {
        assert!(value.is_invalidated(), "{value:?} still valid");
    }

    assert_invalidated(route.get("id"));
    assert_invalidated(route.set("id", 2u32));
    assert_invalidated(start.get("x"));
    assert_invalidated(x.to_f64());
    assert_invalidated(legs.raw_get(0));
    assert_invalidated(alias.to_u64());
    assert_invalidated(route.freeze());

    // Idempotent
    route.invalidate();
}

#[test]
fn test_invalidation_wins_over_freeze() {
    let rt = runtime();
    let route = rt.new_value("/nav/Route").unwrap();
    let start = route.raw_get("start").unwrap();
    let stops = route.raw_get("stops").unwrap();
    let (vector, cached) = filled_vector(&rt);

    route.freeze().unwrap();
    vector.freeze().unwrap();
    assert_frozen(stops.push(HostValue::Null));
    assert_frozen(vector.push(1i64));

    route.invalidate();
    vector.invalidate();
    for value in [&route, &start, &stops, &vector, &cached[0]] {
        assert!(value.is_frozen() && value.is_invalidated(), "{value:?}");
    }

    assert_invalidated(route.set("id", 1u32));
    assert_invalidated(route.get("id"));
    assert_invalidated(start.set("x", 1.0));
    assert_invalidated(stops.push(HostValue::Null));
    assert_invalidated(vector.push(1i64));
    assert_invalidated(vector.get(0));
    assert_invalidated(cached[0].set_scalar(3i64));
}

#[test]
fn test_invalidating_a_child_leaves_the_parent_usable() {
    let rt = runtime();
    let route = rt.new_value("/nav/Route").unwrap();
    let start = route.raw_get("start").unwrap();
    start.invalidate();

    let again = route.raw_get("start").unwrap();
    assert!(!again.ptr_eq(&start));
    again.set("y", 2.0).unwrap();
    assert_eq!(route.raw_get("start").unwrap().get("y").unwrap(), HostValue::Float(2.0));
}

fn filled_vector(rt: &Runtime) -> (Value, Vec<Value>) {
    let vector = rt.new_value("/std/vector</int64_t>").unwrap();
    vector.resize(5).unwrap();
    let cached: Vec<Value> = (0..5).map(|i| vector.raw_get(i).unwrap()).collect();
    for (i, element) in cached.iter().enumerate() {
        element.set_scalar(i as i64 * 10).unwrap();
    }
    (vector, cached)
}

#[test]
fn test_relocating_push_invalidates_all_cached_elements() {
    let rt = runtime();
    let (vector, cached) = filled_vector(&rt);

    // Resizing an empty container to 5 allocates exactly 5 slots
    vector.push(50i64).unwrap();

    for element in &cached {
        assert!(element.is_invalidated());
        assert_invalidated(element.to_i64());
    }
    let values: Vec<i64> = vector
        .raw_each()
        .unwrap()
        .iter()
        .map(|e| e.to_i64().unwrap())
        .collect();
    assert_eq!(values, [0, 10, 20, 30, 40, 50]);
}

#[test]
fn test_shrink_without_relocation_keeps_leading_elements() {
    let rt = runtime();
    let (vector, cached) = filled_vector(&rt);

    vector.resize(3).unwrap();

    for element in &cached[..3] {
        assert!(!element.is_invalidated());
    }
    for element in &cached[3..] {
        assert!(element.is_invalidated());
    }
    assert_eq!(cached[2].to_i64().unwrap(), 20);
    assert!(vector.raw_get(1).unwrap().ptr_eq(&cached[1]));
}

#[test]
fn test_nested_container_relocation_is_detected_from_the_root() {
    let rt = runtime();
    let route = rt.new_value("/nav/Route").unwrap();
    let stops = route.raw_get("stops").unwrap();
    stops.resize(4).unwrap();
    let first = stops.raw_get(0).unwrap();
    let first_x = first.raw_get("x").unwrap();

    // Reassigning the whole route copies into the nested container
    let other = rt.new_value("/nav/Route").unwrap();
    other.raw_get("stops").unwrap().resize(9).unwrap();
    route.copy_from(&other).unwrap();

    assert!(first.is_invalidated());
    assert!(first_x.is_invalidated());
    assert_eq!(stops.len().unwrap(), 9);
}
