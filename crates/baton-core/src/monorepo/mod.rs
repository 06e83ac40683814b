//! Monorepo package model

pub mod graph;
pub mod workspace;

pub use graph::{DependencyGraph, PackageNode};
pub use workspace::{Workspace, WorkspaceGraph};
