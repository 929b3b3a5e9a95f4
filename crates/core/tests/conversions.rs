//! Conversion rule priority and derived host structs

use std::sync::Arc;

use typelib_core::convert::{ToHostRule, TypeMatcher};
use typelib_core::schema::{CompoundBuilder, Registry};
use typelib_core::{ConversionRegistry, Error, HostCompound, HostValue, Resolution, Runtime};

fn registry() -> Registry {
    let mut registry = Registry::with_standard_types();
    registry
        .create_compound(
            CompoundBuilder::new("/geo/Point")
                .field("x", "/double")
                .field("y_pos", "/double"),
        )
        .unwrap();
    registry
        .create_compound(
            CompoundBuilder::new("/geo/Polyline")
                .field("points", "/std/vector</geo/Point>")
                .field("closed", "/bool")
                .field("weights", "/float[2]"),
        )
        .unwrap();
    registry
}

fn tag(label: &'static str) -> impl Fn(&typelib_core::Value) -> typelib_core::Result<HostValue> {
    move |_| Ok(HostValue::String(label.to_string()))
}

fn runtime_with(conversions: &Arc<ConversionRegistry>) -> Runtime {
    Runtime::builder(registry())
        .conversions(conversions.clone())
        .build()
}

#[test]
fn test_exact_element_rule_beats_generic_container_rule() {
    let conversions = Arc::new(ConversionRegistry::new());
    conversions.to_host("/geo/Point", tag("exact")).unwrap();
    conversions.to_host("/std/vector<>", tag("generic")).unwrap();
    let rt = runtime_with(&conversions);

    let points = rt.new_value("/std/vector</geo/Point>").unwrap();
    points.resize(2).unwrap();
    assert_eq!(
        points.to_host().unwrap(),
        HostValue::List(vec![
            HostValue::String("exact".into()),
            HostValue::String("exact".into()),
        ])
    );

    // An exact rule on the container itself wins over both
    conversions
        .to_host("/std/vector</geo/Point>", tag("container"))
        .unwrap();
    assert_eq!(points.to_host().unwrap(), HostValue::String("container".into()));
}

#[test]
fn test_generic_rules_apply_without_exact_ones() {
    let conversions = Arc::new(ConversionRegistry::new());
    conversions.to_host("/float[]", tag("floats")).unwrap();
    conversions.to_host("/std/vector<>", tag("vector")).unwrap();
    let rt = runtime_with(&conversions);

    let line = rt.new_value("/geo/Polyline").unwrap();
    assert_eq!(line.get("weights").unwrap(), HostValue::String("floats".into()));
    assert_eq!(line.get("points").unwrap(), HostValue::String("vector".into()));
    // No rule for the compound: it stays a proxy
    assert!(line.to_host().unwrap().as_proxy().unwrap().ptr_eq(&line));
}

#[test]
fn test_conditions_and_ambiguity() {
    let conversions = Arc::new(ConversionRegistry::new());
    conversions.add_to_host(
        ToHostRule::new(TypeMatcher::regex("^/geo/").unwrap(), tag("any geo"))
            .when(|ty| ty.is_compound()),
    );
    conversions.add_to_host(ToHostRule::new(
        TypeMatcher::regex("Point").unwrap(),
        tag("points"),
    ));
    let rt = runtime_with(&conversions);

    let line = rt.new_value("/geo/Polyline").unwrap();
    assert_eq!(line.to_host().unwrap(), HostValue::String("any geo".into()));

    let point = rt.new_value("/geo/Point").unwrap();
    assert!(matches!(
        point.to_host(),
        Err(Error::AmbiguousConversion { candidates: 2, .. })
    ));

    let mut config = typelib_core::CoreConfig::default();
    config.conversions.resolution = Resolution::FirstMatch;
    let rt = Runtime::builder(registry())
        .conversions(conversions.clone())
        .config(&config)
        .build();
    let point = rt.new_value("/geo/Point").unwrap();
    assert_eq!(point.to_host().unwrap(), HostValue::String("any geo".into()));
}

#[test]
fn test_removing_a_rule_clears_memoized_plans() {
    let conversions = Arc::new(ConversionRegistry::new());
    let key = conversions.to_host("/double", tag("seconds")).unwrap();
    let rt = runtime_with(&conversions);
    let point = rt.new_value("/geo/Point").unwrap();

    assert_eq!(point.get("x").unwrap(), HostValue::String("seconds".into()));
    assert!(conversions.remove(key));
    assert_eq!(point.get("x").unwrap(), HostValue::Float(0.0));
}

#[derive(Debug, Clone, PartialEq, HostCompound)]
#[typelib(type_name = "/geo/Point")]
struct Point {
    x: f64,
    #[typelib(rename = "y_pos")]
    y: f64,
    #[typelib(skip)]
    label: String,
}

#[derive(Debug, Clone, PartialEq, HostCompound)]
#[typelib(type_name = "/geo/Polyline")]
struct Polyline {
    points: Vec<Point>,
    closed: bool,
    weights: [f32; 2],
}

#[test]
fn test_derived_constants() {
    assert_eq!(Point::TYPE_NAME, "/geo/Point");
    assert_eq!(Point::X_FIELD, "x");
    assert_eq!(Point::Y_FIELD, "y_pos");
    assert_eq!(Polyline::POINTS_FIELD, "points");
}

#[test]
fn test_derived_conversions() {
    let conversions = Arc::new(ConversionRegistry::new());
    Point::register_conversions(&conversions).unwrap();
    Polyline::register_conversions(&conversions).unwrap();
    let rt = runtime_with(&conversions);

    let line = rt.new_value("/geo/Polyline").unwrap();
    let points = line.raw_get("points").unwrap();
    points
        .push(HostValue::custom(Point {
            x: 1.0,
            y: 2.0,
            label: "ignored".into(),
        }))
        .unwrap();
    line.set("closed", true).unwrap();

    // Elements convert through the Point rule
    let first = points.get(0).unwrap();
    assert_eq!(
        first.downcast_ref::<Point>(),
        Some(&Point {
            x: 1.0,
            y: 2.0,
            label: String::new(),
        })
    );

    let expected = Polyline {
        points: vec![Point {
            x: 1.0,
            y: 2.0,
            label: String::new(),
        }],
        closed: true,
        weights: [0.0, 0.0],
    };
    assert_eq!(line.to_host().unwrap().downcast_ref::<Polyline>(), Some(&expected));

    // Assigning a struct writes every mirrored field
    let other = rt.new_value("/geo/Polyline").unwrap();
    let mut updated = expected.clone();
    updated.weights = [0.5, 1.5];
    updated.points.push(Point {
        x: -1.0,
        y: -2.0,
        label: String::new(),
    });
    other.assign(&HostValue::custom(updated.clone())).unwrap();
    assert_eq!(other.to_host().unwrap().downcast_ref::<Polyline>(), Some(&updated));
    assert_eq!(other.raw_get("points").unwrap().len().unwrap(), 2);
}
