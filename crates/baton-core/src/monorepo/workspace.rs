//! Workspace packages and the package graph built from configuration

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::{Result, WorkspaceError};

use super::graph::DependencyGraph;

/// A package in the monorepo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique package name
    pub name: String,
    /// Directory relative to the repo root
    pub dir: PathBuf,
    /// Internal packages this one depends on
    pub dependencies: Vec<String>,
    /// Resolved external dependencies (name -> version)
    pub external_dependencies: BTreeMap<String, String>,
}

impl Workspace {
    /// Create a workspace with no dependencies
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            dependencies: Vec::new(),
            external_dependencies: BTreeMap::new(),
        }
    }

    /// Set internal dependencies
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Set external dependencies
    pub fn with_external(mut self, external: BTreeMap<String, String>) -> Self {
        self.external_dependencies = external;
        self
    }
}

/// All workspaces of a repository plus their topological graph
#[derive(Debug, Clone)]
pub struct WorkspaceGraph {
    root: PathBuf,
    workspaces: BTreeMap<String, Workspace>,
    graph: DependencyGraph,
}

impl WorkspaceGraph {
    /// Build from a list of workspaces rooted at `root`
    pub fn new(root: impl Into<PathBuf>, workspaces: Vec<Workspace>) -> Result<Self> {
        let graph = DependencyGraph::build(&workspaces)?;
        graph.validate()?;

        let workspaces = workspaces
            .into_iter()
            .map(|ws| (ws.name.clone(), ws))
            .collect();

        Ok(Self {
            root: root.into(),
            workspaces,
            graph,
        })
    }

    /// Build from the `[[packages]]` section of a config, checking that every
    /// package directory exists.
    #[instrument(skip_all, fields(root = %root.display(), packages = config.packages.len()))]
    pub fn from_config(root: &Path, config: &Config) -> Result<Self> {
        let mut workspaces = Vec::with_capacity(config.packages.len());

        for package in &config.packages {
            let abs = root.join(&package.path);
            if !abs.is_dir() {
                return Err(WorkspaceError::MissingDirectory {
                    name: package.name.clone(),
                    path: abs,
                }
                .into());
            }
            debug!(package = %package.name, path = %package.path.display(), "registered package");
            workspaces.push(
                Workspace::new(&package.name, &package.path)
                    .with_dependencies(package.dependencies.clone())
                    .with_external(package.external_dependencies.clone()),
            );
        }

        let graph = Self::new(root, workspaces)?;
        info!(packages = graph.len(), "workspace graph built");
        Ok(graph)
    }

    /// Repository root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get a workspace by name
    pub fn get(&self, name: &str) -> Option<&Workspace> {
        self.workspaces.get(name)
    }

    /// Absolute directory of a workspace
    pub fn absolute_dir(&self, name: &str) -> Option<PathBuf> {
        self.workspaces.get(name).map(|ws| self.root.join(&ws.dir))
    }

    /// Package names in topological order (dependencies first)
    pub fn sorted(&self) -> &[String] {
        self.graph.sorted()
    }

    /// Direct internal dependencies of a workspace
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.graph.get_dependencies(name)
    }

    /// Direct dependents of a workspace
    pub fn dependents(&self, name: &str) -> &[String] {
        self.graph.get_dependents(name)
    }

    /// The underlying package graph
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Iterate over workspaces in name order
    pub fn iter(&self) -> impl Iterator<Item = &Workspace> {
        self.workspaces.values()
    }

    /// Number of workspaces
    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    /// Check whether there are no workspaces
    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }
}
