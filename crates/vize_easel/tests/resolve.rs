//! Path resolution cases loaded from `tests/fixtures/resolve.toml`.

use serde::Deserialize;
use std::path::PathBuf;
use vize_easel::{resolve, DefaultPathResolver, ModuleId, PathResolver};

/// A test case from the TOML fixture
#[derive(Debug, Deserialize)]
struct TestCase {
    name: String,
    referrer: String,
    specifier: String,
    expected: String,
}

/// The fixture file
#[derive(Debug, Deserialize)]
struct Fixture {
    cases: Vec<TestCase>,
}

fn load_fixture() -> Fixture {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("resolve.toml");
    let content = std::fs::read_to_string(&path).unwrap();
    toml::from_str(&content).unwrap()
}

#[test]
fn test_resolve_fixture_cases() {
    let fixture = load_fixture();
    assert!(!fixture.cases.is_empty());

    for case in &fixture.cases {
        let referrer = ModuleId::parse(&case.referrer);
        let resolved = resolve(&referrer, &case.specifier);
        assert_eq!(resolved.to_string(), case.expected, "case: {}", case.name);
    }
}

#[test]
fn test_resolution_is_deterministic() {
    let resolver = DefaultPathResolver;
    for case in &load_fixture().cases {
        let referrer = ModuleId::parse(&case.referrer);
        assert_eq!(
            resolver.resolve(&referrer, &case.specifier),
            resolver.resolve(&referrer, &case.specifier),
            "case: {}",
            case.name
        );
    }
}

#[test]
fn test_query_variants_are_distinct_ids() {
    let referrer = ModuleId::parse("/app.vue");
    let plain = resolve(&referrer, "./card.vue");
    let raw = resolve(&referrer, "./card.vue?raw");
    assert_eq!(plain.path(), raw.path());
    assert_ne!(plain, raw);
    assert_eq!(raw.extension(), "vue");
}
