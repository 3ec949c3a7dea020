// src/graph/order.rs

//! Flattening a build graph into a build order

use super::builder::BuildGraph;
use crate::error::{Error, Result};
use crate::registry::BuildType;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How many graph levels are built; the root is level 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Levels(u32),
    All,
}

impl Default for Depth {
    fn default() -> Self {
        Depth::Levels(1)
    }
}

impl Depth {
    pub fn includes(&self, level: u32) -> bool {
        match self {
            Depth::All => true,
            Depth::Levels(n) => level <= *n,
        }
    }
}

impl FromStr for Depth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Depth::All);
        }
        match s.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(Depth::Levels(n)),
            _ => Err(Error::ConfigError(format!(
                "Invalid depth '{}': expected a number >= 1 or ALL",
                s
            ))),
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::All => f.write_str("ALL"),
            Depth::Levels(n) => write!(f, "{}", n),
        }
    }
}

/// A project as seen by the build stages
///
/// When `local_dir` is set the working copy is used as-is and `url`/`version`
/// only describe what the registry asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRef {
    pub name: String,
    pub url: String,
    pub version: String,
    pub kind: BuildType,
    pub registry: Option<String>,
    pub local_dir: Option<PathBuf>,
}

/// One entry of the build order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedBuildItem {
    pub project: ProjectRef,
    /// Direct dependencies only, keyed by project name
    pub dependencies: IndexMap<String, ProjectRef>,
}

impl OrderedBuildItem {
    pub fn name(&self) -> &str {
        &self.project.name
    }
}

/// Options controlling which graph nodes are emitted
#[derive(Debug, Clone, Default)]
pub struct OrderOptions {
    pub depth: Depth,
    /// Projects whose images come from their registry; neither built nor traversed
    pub use_registry: Vec<String>,
}

fn project_ref(graph: &BuildGraph, name: &str) -> Option<ProjectRef> {
    graph.get(name).map(|node| ProjectRef {
        name: name.to_string(),
        url: node.url.clone(),
        version: node.version.clone(),
        kind: node.kind,
        registry: node.registry.clone(),
        local_dir: node.local_dir.clone(),
    })
}

/// Shortest distance from the root for every reachable node (root = 1)
fn levels(graph: &BuildGraph) -> HashMap<&str, u32> {
    let mut levels = HashMap::new();
    let mut queue = VecDeque::new();
    levels.insert(graph.root.as_str(), 1);
    queue.push_back(graph.root.as_str());

    while let Some(name) = queue.pop_front() {
        let level = levels[name];
        if let Some(node) = graph.get(name) {
            for dep in node.dependencies.keys() {
                if !levels.contains_key(dep.as_str()) {
                    levels.insert(dep.as_str(), level + 1);
                    queue.push_back(dep.as_str());
                }
            }
        }
    }
    levels
}

/// Depth-first post-order flattening of `graph`
///
/// Every project appears at most once and after all of its (emitted)
/// dependencies. A project is emitted when its shortest distance from the
/// root lies within `options.depth`.
pub fn order_build_graph(graph: &BuildGraph, options: &OrderOptions) -> Vec<OrderedBuildItem> {
    let levels = levels(graph);
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(graph, &graph.root, options, &levels, &mut visited, &mut order);
    order
}

fn visit<'g>(
    graph: &'g BuildGraph,
    name: &'g str,
    options: &OrderOptions,
    levels: &HashMap<&str, u32>,
    visited: &mut HashSet<&'g str>,
    order: &mut Vec<OrderedBuildItem>,
) {
    if options.use_registry.iter().any(|p| p == name) {
        return;
    }
    if !visited.insert(name) {
        return;
    }
    let Some(node) = graph.get(name) else {
        return;
    };

    for dep in node.dependencies.keys() {
        visit(graph, dep, options, levels, visited, order);
    }

    let level = levels.get(name).copied().unwrap_or(u32::MAX);
    if !options.depth.includes(level) {
        return;
    }

    let Some(project) = project_ref(graph, name) else {
        return;
    };
    let dependencies = node
        .dependencies
        .keys()
        .filter_map(|dep| project_ref(graph, dep).map(|r| (dep.clone(), r)))
        .collect();

    order.push(OrderedBuildItem {
        project,
        dependencies,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::{BuildGraphNode, DependencyEdge};

    fn node(deps: &[&str]) -> BuildGraphNode {
        BuildGraphNode {
            version: "v1".to_string(),
            url: String::new(),
            registry: None,
            kind: BuildType::CorkBuildFile,
            secrets: Vec::new(),
            local_dir: None,
            dependencies: deps
                .iter()
                .map(|d| {
                    (
                        d.to_string(),
                        DependencyEdge {
                            version: "v1".to_string(),
                            url: format!("https://github.com/org/{}", d),
                        },
                    )
                })
                .collect(),
            required_by: String::new(),
        }
    }

    fn graph(root: &str, nodes: &[(&str, &[&str])]) -> BuildGraph {
        BuildGraph {
            root: root.to_string(),
            nodes: nodes.iter().map(|(n, deps)| (n.to_string(), node(deps))).collect(),
        }
    }

    fn names(items: &[OrderedBuildItem]) -> Vec<&str> {
        items.iter().map(|i| i.name()).collect()
    }

    fn all() -> OrderOptions {
        OrderOptions {
            depth: Depth::All,
            use_registry: Vec::new(),
        }
    }

    #[test]
    fn test_depth_parse() {
        assert_eq!("ALL".parse::<Depth>().unwrap(), Depth::All);
        assert_eq!("all".parse::<Depth>().unwrap(), Depth::All);
        assert_eq!("3".parse::<Depth>().unwrap(), Depth::Levels(3));
        assert!("0".parse::<Depth>().is_err());
        assert!("deep".parse::<Depth>().is_err());
        assert_eq!(Depth::default(), Depth::Levels(1));
    }

    #[test]
    fn test_diamond_post_order() {
        let g = graph("a", &[("a", &["b", "c"]), ("b", &["d"]), ("c", &["d"]), ("d", &[])]);
        let order = order_build_graph(&g, &all());
        assert_eq!(names(&order), vec!["d", "b", "c", "a"]);
        assert_eq!(order[3].dependencies.keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_depth_one_is_root_only() {
        let g = graph("a", &[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        let order = order_build_graph(&g, &OrderOptions::default());
        assert_eq!(names(&order), vec!["a"]);
        // Direct dependencies still travel with the item
        assert!(order[0].dependencies.contains_key("b"));
    }

    #[test]
    fn test_depth_uses_shortest_level() {
        // d is reachable at level 2 directly and at level 3 through b
        let g = graph("a", &[("a", &["b", "d"]), ("b", &["d"]), ("d", &[])]);
        let order = order_build_graph(
            &g,
            &OrderOptions {
                depth: Depth::Levels(2),
                use_registry: Vec::new(),
            },
        );
        assert_eq!(names(&order), vec!["d", "b", "a"]);
    }

    #[test]
    fn test_use_registry_skips_subtree() {
        let g = graph("a", &[("a", &["b", "c"]), ("b", &["d"]), ("c", &[]), ("d", &[])]);
        let order = order_build_graph(
            &g,
            &OrderOptions {
                depth: Depth::All,
                use_registry: vec!["b".to_string()],
            },
        );
        assert_eq!(names(&order), vec!["c", "a"]);
        // The skipped project is still a dependency for template resolution
        assert!(order[1].dependencies.contains_key("b"));
    }
}
