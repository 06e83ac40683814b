//! Dependency graph for workspace packages

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkspaceError};

use super::workspace::Workspace;

/// A node in the dependency graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageNode {
    /// Package name
    pub name: String,
    /// Packages this package depends on
    pub dependencies: Vec<String>,
    /// Packages that depend on this package
    pub dependents: Vec<String>,
    /// Depth in the dependency tree (0 = no dependencies)
    pub depth: usize,
}

/// Dependency graph for workspace packages
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Nodes indexed by package name
    nodes: HashMap<String, PackageNode>,
    /// Topologically sorted order (dependencies before dependents)
    sorted_order: Vec<String>,
    /// Circular dependencies detected
    cycles: Vec<Vec<String>>,
}

impl DependencyGraph {
    /// Build a dependency graph from workspaces.
    ///
    /// Dependencies on undeclared packages are rejected. Cycles are recorded
    /// and reported by [`DependencyGraph::validate`].
    pub fn build(workspaces: &[Workspace]) -> Result<Self> {
        let mut nodes: HashMap<String, PackageNode> = HashMap::new();

        for ws in workspaces {
            if nodes.contains_key(&ws.name) {
                return Err(WorkspaceError::DuplicatePackage(ws.name.clone()).into());
            }
            let mut dependencies = ws.dependencies.clone();
            dependencies.sort();
            dependencies.dedup();
            nodes.insert(
                ws.name.clone(),
                PackageNode {
                    name: ws.name.clone(),
                    dependencies,
                    dependents: Vec::new(),
                    depth: 0,
                },
            );
        }

        for ws in workspaces {
            for dep in &ws.dependencies {
                match nodes.get_mut(dep) {
                    Some(dep_node) => {
                        if !dep_node.dependents.contains(&ws.name) {
                            dep_node.dependents.push(ws.name.clone());
                        }
                    }
                    None => {
                        return Err(WorkspaceError::UnknownDependency {
                            package: ws.name.clone(),
                            dependency: dep.clone(),
                        }
                        .into())
                    }
                }
            }
        }
        for node in nodes.values_mut() {
            node.dependents.sort();
        }

        let (sorted_order, cycles) = Self::topological_sort(&nodes);

        for name in &sorted_order {
            let max_dep_depth = nodes
                .get(name)
                .map(|node| {
                    node.dependencies
                        .iter()
                        .filter_map(|dep| nodes.get(dep))
                        .map(|n| n.depth + 1)
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0);

            if let Some(node) = nodes.get_mut(name) {
                node.depth = max_dep_depth;
            }
        }

        Ok(Self {
            nodes,
            sorted_order,
            cycles,
        })
    }

    /// Perform topological sort using Kahn's algorithm.
    ///
    /// Ties are broken by name so the order is stable across runs.
    fn topological_sort(nodes: &HashMap<String, PackageNode>) -> (Vec<String>, Vec<Vec<String>>) {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut ready: BTreeSet<&str> = BTreeSet::new();
        let mut sorted: Vec<String> = Vec::new();

        for (name, node) in nodes {
            let degree = node.dependencies.len();
            in_degree.insert(name.as_str(), degree);
            if degree == 0 {
                ready.insert(name.as_str());
            }
        }

        while let Some(name) = ready.pop_first() {
            sorted.push(name.to_string());

            if let Some(node) = nodes.get(name) {
                for dependent in &node.dependents {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            ready.insert(dependent.as_str());
                        }
                    }
                }
            }
        }

        let mut cycles = Vec::new();
        if sorted.len() != nodes.len() {
            let in_sorted: HashSet<_> = sorted.iter().collect();
            let mut cyclic_nodes: Vec<String> = nodes
                .keys()
                .filter(|n| !in_sorted.contains(n))
                .cloned()
                .collect();
            cyclic_nodes.sort();

            for start in &cyclic_nodes {
                if let Some(cycle) = Self::find_cycle(nodes, start, &cyclic_nodes) {
                    if !cycles.iter().any(|c: &Vec<String>| {
                        c.len() == cycle.len() && cycle.iter().all(|n| c.contains(n))
                    }) {
                        cycles.push(cycle);
                    }
                }
            }
        }

        (sorted, cycles)
    }

    /// Find a cycle starting from a given node
    fn find_cycle(
        nodes: &HashMap<String, PackageNode>,
        start: &str,
        cyclic_nodes: &[String],
    ) -> Option<Vec<String>> {
        fn dfs(
            nodes: &HashMap<String, PackageNode>,
            current: &str,
            start: &str,
            visited: &mut HashSet<String>,
            path: &mut Vec<String>,
            cyclic_nodes: &[String],
        ) -> bool {
            if visited.contains(current) {
                return current == start && !path.is_empty();
            }

            if !cyclic_nodes.iter().any(|n| n == current) {
                return false;
            }

            visited.insert(current.to_string());
            path.push(current.to_string());

            if let Some(node) = nodes.get(current) {
                for dep in &node.dependencies {
                    if dfs(nodes, dep, start, visited, path, cyclic_nodes) {
                        return true;
                    }
                }
            }

            path.pop();
            false
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut path: Vec<String> = Vec::new();
        if dfs(nodes, start, start, &mut visited, &mut path, cyclic_nodes) {
            Some(path)
        } else {
            None
        }
    }

    /// Get packages in topologically sorted order (dependencies first)
    pub fn sorted(&self) -> &[String] {
        &self.sorted_order
    }

    /// Check if there are any circular dependencies
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Get a package node
    pub fn get(&self, name: &str) -> Option<&PackageNode> {
        self.nodes.get(name)
    }

    /// Check whether a package exists
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Number of packages
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct dependents of a package, sorted by name
    pub fn get_dependents(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Direct dependencies of a package, sorted by name
    pub fn get_dependencies(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Get all transitive dependencies of a package
    pub fn get_all_dependencies(&self, name: &str) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(name);

        while let Some(current) = queue.pop_front() {
            for dep in self.get_dependencies(current) {
                if deps.insert(dep.clone()) {
                    queue.push_back(dep);
                }
            }
        }

        deps
    }

    /// All packages that depend on `name`, directly or transitively
    pub fn get_all_dependents(&self, name: &str) -> BTreeSet<String> {
        let mut dependents = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(name);

        while let Some(current) = queue.pop_front() {
            for dependent in self.get_dependents(current) {
                if dependents.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }

        dependents
    }

    /// Validate that the graph has no cycles
    pub fn validate(&self) -> Result<()> {
        if self.has_cycles() {
            let cycle_desc: Vec<String> = self.cycles.iter().map(|c| c.join(" -> ")).collect();
            return Err(WorkspaceError::CyclicDependency(cycle_desc.join("; ")).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws(name: &str, deps: &[&str]) -> Workspace {
        Workspace::new(name, format!("packages/{}", name))
            .with_dependencies(deps.iter().map(|d| d.to_string()).collect())
    }

    fn create_workspaces() -> Vec<Workspace> {
        vec![
            ws("core", &[]),
            ws("utils", &["core"]),
            ws("cli", &["core", "utils"]),
        ]
    }

    #[test]
    fn test_build_graph() {
        let graph = DependencyGraph::build(&create_workspaces()).unwrap();
        assert!(!graph.has_cycles());
        assert_eq!(graph.sorted(), &["core", "utils", "cli"]);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_dependents() {
        let graph = DependencyGraph::build(&create_workspaces()).unwrap();
        assert_eq!(graph.get_dependents("core"), &["cli", "utils"]);
        assert_eq!(graph.get_dependents("utils"), &["cli"]);
        assert!(graph.get_dependents("cli").is_empty());
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = DependencyGraph::build(&create_workspaces()).unwrap();
        let dependents: Vec<_> = graph.get_all_dependents("core").into_iter().collect();
        assert_eq!(dependents, vec!["cli", "utils"]);
        assert!(graph.get_all_dependents("cli").is_empty());
    }

    #[test]
    fn test_transitive_dependencies() {
        let graph = DependencyGraph::build(&[ws("a", &[]), ws("b", &["a"]), ws("c", &["b"])])
            .unwrap();
        let deps = graph.get_all_dependencies("c");
        assert_eq!(deps.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_depth_calculation() {
        let graph = DependencyGraph::build(&create_workspaces()).unwrap();
        assert_eq!(graph.get("core").unwrap().depth, 0);
        assert_eq!(graph.get("utils").unwrap().depth, 1);
        assert_eq!(graph.get("cli").unwrap().depth, 2);
    }

    #[test]
    fn test_unknown_dependency() {
        let result = DependencyGraph::build(&[ws("app", &["ghost"])]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cycle_detection() {
        let graph =
            DependencyGraph::build(&[ws("a", &["b"]), ws("b", &["c"]), ws("c", &["a"])]).unwrap();
        assert!(graph.has_cycles());
        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("Circular package dependencies"));
    }
}
