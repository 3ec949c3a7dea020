// tests/build_graph.rs

//! Dependency graph and build order over an on-disk registry

mod common;

use common::Fixture;
use cork_kube::config::BuildSettings;
use cork_kube::graph::{LocalRepoLookup, OrderOptions, order_build_graph};
use cork_kube::{BuildGraph, Depth, Error, Registry};

fn descriptor(name: &str, deps: &[(&str, &str)]) -> String {
    let dependencies: Vec<String> = deps
        .iter()
        .map(|(dep, _)| format!(r#""{}": "{}""#, dep, Fixture::url(dep)))
        .collect();
    let builds: Vec<String> = deps
        .iter()
        .map(|(dep, version)| format!(r#""{}": "{}""#, dep, version))
        .collect();
    format!(
        r#"{{"repository": "{}", "dependencies": {{{}}}, "builds": {{"v1": {{{}}}, "v2": {{}}}}}}"#,
        Fixture::url(name),
        dependencies.join(", "),
        builds.join(", ")
    )
}

/// app -> (ui, api) -> core
fn diamond() -> (Fixture, Registry) {
    let fixture = Fixture::new();
    fixture
        .descriptor("app", &descriptor("app", &[("ui", "v1"), ("api", "v1")]))
        .descriptor("ui", &descriptor("ui", &[("core", "v2")]))
        .descriptor("api", &descriptor("api", &[("core", "v2")]))
        .descriptor("core", &descriptor("core", &[]));
    let registry = Registry::load_dir(&fixture.registry_dir()).unwrap();
    (fixture, registry)
}

fn resolve(registry: &Registry, project: &str, version: &str) -> cork_kube::Result<BuildGraph> {
    let settings = BuildSettings::default();
    BuildGraph::resolve(registry, project, version, LocalRepoLookup::new(&settings, &[]))
}

fn names(graph: &BuildGraph, depth: Depth) -> Vec<String> {
    order_build_graph(
        graph,
        &OrderOptions {
            depth,
            use_registry: Vec::new(),
        },
    )
    .iter()
    .map(|item| item.name().to_string())
    .collect()
}

#[test]
fn test_diamond_is_built_dependencies_first() {
    let (_fixture, registry) = diamond();
    let graph = resolve(&registry, "app", "v1").unwrap();

    assert_eq!(graph.nodes.len(), 4);
    assert_eq!(graph.get("core").unwrap().version, "v2");
    assert_eq!(graph.get("ui").unwrap().required_by, "app");
    assert_eq!(graph.root_node().unwrap().required_by, "command line");

    let order = names(&graph, Depth::All);
    assert_eq!(order, vec!["core", "ui", "api", "app"]);
}

#[test]
fn test_depth_limits_levels() {
    let (_fixture, registry) = diamond();
    let graph = resolve(&registry, "app", "v1").unwrap();

    assert_eq!(names(&graph, Depth::Levels(1)), vec!["app"]);
    assert_eq!(names(&graph, Depth::Levels(2)), vec!["ui", "api", "app"]);
    assert_eq!(names(&graph, Depth::Levels(3)), names(&graph, Depth::All));
}

#[test]
fn test_order_items_carry_direct_dependencies() {
    let (_fixture, registry) = diamond();
    let graph = resolve(&registry, "app", "v1").unwrap();
    let order = order_build_graph(
        &graph,
        &OrderOptions {
            depth: Depth::All,
            use_registry: vec!["core".to_string()],
        },
    );

    let names: Vec<&str> = order.iter().map(|i| i.name()).collect();
    assert_eq!(names, vec!["ui", "api", "app"]);

    let ui = &order[0];
    assert_eq!(ui.dependencies.len(), 1);
    assert_eq!(ui.dependencies["core"].version, "v2");
    assert_eq!(ui.dependencies["core"].url, Fixture::url("core"));
}

#[test]
fn test_conflicting_versions_fail() {
    let fixture = Fixture::new();
    fixture
        .descriptor("app", &descriptor("app", &[("ui", "v1"), ("api", "v1")]))
        .descriptor("ui", &descriptor("ui", &[("core", "v1")]))
        .descriptor("api", &descriptor("api", &[("core", "v2")]))
        .descriptor("core", &descriptor("core", &[]));
    let registry = Registry::load_dir(&fixture.registry_dir()).unwrap();

    let err = resolve(&registry, "app", "v1").unwrap_err();
    match err {
        Error::VersionConflict {
            project,
            first,
            second,
            ..
        } => {
            assert_eq!(project, "core");
            assert_eq!(first, "v1");
            assert_eq!(second, "v2");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_cycle_is_reported() {
    let fixture = Fixture::new();
    fixture
        .descriptor("a", &descriptor("a", &[("b", "v1")]))
        .descriptor("b", &descriptor("b", &[("a", "v1")]));
    let registry = Registry::load_dir(&fixture.registry_dir()).unwrap();

    let err = resolve(&registry, "a", "v1").unwrap_err();
    assert!(matches!(err, Error::ResolutionError(_)));
    assert!(err.to_string().contains("a -> b -> a"));
}

#[test]
fn test_undeclared_dependency_rejected_on_load() {
    let fixture = Fixture::new();
    fixture.descriptor(
        "app",
        &format!(
            r#"{{"repository": "{}", "builds": {{"v1": {{"lib": "v1"}}}}}}"#,
            Fixture::url("app")
        ),
    );

    let err = Registry::load_dir(&fixture.registry_dir()).unwrap_err();
    assert!(matches!(err, Error::ParseError { .. }));
}

#[test]
fn test_listing_reports_versions() {
    let (_fixture, registry) = diamond();
    let listing = registry.listing(Some("core"));
    assert_eq!(listing.len(), 1);
    assert_eq!(listing["core"].url, Fixture::url("core"));
    assert_eq!(listing["core"].versions, vec!["v1", "v2"]);

    assert_eq!(registry.listing(None).len(), 4);
}
