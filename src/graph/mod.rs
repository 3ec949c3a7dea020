// src/graph/mod.rs

//! Build graph resolution and ordering

mod builder;
mod order;

pub use builder::{BuildGraph, BuildGraphNode, DependencyEdge, LocalRepoLookup};
pub use order::{order_build_graph, Depth, OrderOptions, OrderedBuildItem, ProjectRef};
