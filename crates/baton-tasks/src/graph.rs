//! Task graph construction
//!
//! Expands the package graph and per-workspace pipelines into a graph of
//! package-task nodes. Nodes live in an arena and are addressed by
//! [`NodeIndex`]; index 0 is a synthetic root that every node without
//! dependencies points at.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;

use tracing::{debug, info, instrument};

use baton_core::monorepo::WorkspaceGraph;

use crate::task::{Pipeline, TaskDefinition, TaskDependency, TaskId};

/// Position of a node in the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// The synthetic root node
    pub const ROOT: NodeIndex = NodeIndex(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// A package-task node
#[derive(Debug, Clone)]
pub struct TaskNode {
    /// Task identifier
    pub id: TaskId,
    /// The task definition for this workspace
    pub definition: TaskDefinition,
}

#[derive(Debug, Clone)]
enum GraphNode {
    Root,
    Task(TaskNode),
}

/// Directed acyclic graph of package-task nodes.
///
/// Edges point from a node to its dependencies. The graph is immutable once
/// built.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<TaskId, NodeIndex>,
    dependencies: Vec<BTreeSet<NodeIndex>>,
    dependents: Vec<BTreeSet<NodeIndex>>,
    /// Task nodes in topological order (dependencies first)
    sorted: Vec<NodeIndex>,
    /// Seed nodes: requested tasks in in-scope workspaces
    requested: BTreeSet<TaskId>,
}

/// Errors during graph construction
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Requested tasks exist in none of the workspaces in scope
    #[error("Could not find the following tasks in project: {}", .0.join(", "))]
    MissingTasks(Vec<String>),

    /// A referenced task has no definition
    #[error("Could not find task '{0}' in pipeline configuration")]
    TaskNotFound(TaskId),

    /// An explicit `package#task` names an unknown package
    #[error("Task '{task}' depends on '{dependency}', but that package does not exist")]
    UnknownPackage { task: TaskId, dependency: TaskId },

    /// A task id or `depends_on` entry is malformed
    #[error("Invalid task dependency '{entry}' in '{task}'")]
    InvalidTaskId { task: TaskId, entry: String },

    /// Cyclic dependency detected
    #[error("Cyclic dependency detected among tasks: {0}")]
    CyclicDependency(String),

    /// A task depends on a persistent task
    #[error("\"{persistent}\" is a persistent task, \"{dependent}\" cannot depend on it")]
    PersistentDependency { persistent: TaskId, dependent: TaskId },

    /// Persistent tasks would occupy every concurrency slot
    #[error("You have {persistent} persistent tasks but `concurrency` is set to {concurrency}; concurrency must be greater than the number of persistent tasks")]
    PersistentConcurrency { persistent: usize, concurrency: usize },
}

/// Builds a [`TaskGraph`] with a work queue seeded from the requested tasks
pub struct TaskGraphBuilder<'a> {
    workspaces: &'a WorkspaceGraph,
    pipeline: &'a Pipeline,
    scope: Vec<String>,
    tasks: Vec<String>,
    tasks_only: bool,
}

impl<'a> TaskGraphBuilder<'a> {
    pub fn new(workspaces: &'a WorkspaceGraph, pipeline: &'a Pipeline) -> Self {
        Self {
            workspaces,
            pipeline,
            scope: workspaces.sorted().to_vec(),
            tasks: Vec::new(),
            tasks_only: false,
        }
    }

    /// Restrict the seeds to these workspaces
    pub fn with_scope(mut self, scope: Vec<String>) -> Self {
        self.scope = scope;
        self
    }

    /// Task names to run
    pub fn with_tasks(mut self, tasks: Vec<String>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Only keep dependency edges toward requested task names
    pub fn with_tasks_only(mut self, tasks_only: bool) -> Self {
        self.tasks_only = tasks_only;
        self
    }

    /// Expand the seeds into a validated graph
    #[instrument(skip_all, fields(scope = self.scope.len(), tasks = self.tasks.len(), tasks_only = self.tasks_only))]
    pub fn build(self) -> Result<TaskGraph, GraphError> {
        let requested: BTreeSet<&str> = self.tasks.iter().map(String::as_str).collect();

        let missing: Vec<String> = requested
            .iter()
            .filter(|task| {
                !self
                    .scope
                    .iter()
                    .any(|ws| self.pipeline.get(ws, task).is_some())
            })
            .map(|task| task.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(GraphError::MissingTasks(missing));
        }

        let mut graph = TaskGraph::empty();
        let mut queue: VecDeque<TaskId> = VecDeque::new();
        for ws in &self.scope {
            for task in &self.tasks {
                if self.pipeline.get(ws, task).is_some() {
                    queue.push_back(TaskId::new(ws, task));
                }
            }
        }

        // Requested tasks in scope; with tasks_only, edges may only reach these
        let allowed: BTreeSet<TaskId> = self
            .scope
            .iter()
            .flat_map(|ws| self.tasks.iter().map(move |task| TaskId::new(ws, task)))
            .collect();

        let mut visited: BTreeSet<TaskId> = BTreeSet::new();
        while let Some(id) = queue.pop_front() {
            if visited.contains(&id) {
                continue;
            }

            let definition = self
                .pipeline
                .get(&id.package, &id.task)
                .ok_or_else(|| GraphError::TaskNotFound(id.clone()))?;
            let from = graph.insert(id.clone(), definition.clone());

            let mut deps: BTreeSet<TaskId> = BTreeSet::new();
            for dependency in definition.dependencies() {
                let dependency = dependency.map_err(|entry| GraphError::InvalidTaskId {
                    task: id.clone(),
                    entry,
                })?;

                if self.tasks_only && !requested.contains(dependency.task_name()) {
                    continue;
                }

                match dependency {
                    TaskDependency::Topological(task) => {
                        for upstream in self.workspaces.dependencies(&id.package) {
                            if self.pipeline.get(upstream, &task).is_some() {
                                deps.insert(TaskId::new(upstream, &task));
                            }
                        }
                    }
                    TaskDependency::SamePackage(task) => {
                        let dep = TaskId::new(&id.package, task);
                        if self.pipeline.get(&dep.package, &dep.task).is_none() {
                            return Err(GraphError::TaskNotFound(dep));
                        }
                        deps.insert(dep);
                    }
                    TaskDependency::Explicit(dep) => {
                        if self.workspaces.get(&dep.package).is_none() {
                            return Err(GraphError::UnknownPackage {
                                task: id.clone(),
                                dependency: dep,
                            });
                        }
                        if self.pipeline.get(&dep.package, &dep.task).is_none() {
                            return Err(GraphError::TaskNotFound(dep));
                        }
                        deps.insert(dep);
                    }
                }
            }

            if self.tasks_only {
                deps.retain(|dep| allowed.contains(dep));
            }

            if deps.is_empty() {
                graph.add_edge(from, NodeIndex::ROOT);
            }
            for dep in deps {
                let definition = self
                    .pipeline
                    .get(&dep.package, &dep.task)
                    .ok_or_else(|| GraphError::TaskNotFound(dep.clone()))?;
                let to = graph.insert(dep.clone(), definition.clone());
                graph.add_edge(from, to);
                if !visited.contains(&dep) {
                    queue.push_back(dep);
                }
            }

            visited.insert(id);
        }

        graph.requested = allowed
            .into_iter()
            .filter(|id| graph.index.contains_key(id))
            .collect();
        graph.sorted = graph.topological_sort()?;
        graph.validate_persistent_dependencies()?;

        info!(task_count = graph.len(), "task graph built");
        Ok(graph)
    }
}

impl TaskGraph {
    fn empty() -> Self {
        Self {
            nodes: vec![GraphNode::Root],
            index: HashMap::new(),
            dependencies: vec![BTreeSet::new()],
            dependents: vec![BTreeSet::new()],
            sorted: Vec::new(),
            requested: BTreeSet::new(),
        }
    }

    /// Start building a graph
    pub fn builder<'a>(workspaces: &'a WorkspaceGraph, pipeline: &'a Pipeline) -> TaskGraphBuilder<'a> {
        TaskGraphBuilder::new(workspaces, pipeline)
    }

    fn insert(&mut self, id: TaskId, definition: TaskDefinition) -> NodeIndex {
        if let Some(idx) = self.index.get(&id) {
            return *idx;
        }
        let idx = NodeIndex(self.nodes.len());
        self.nodes.push(GraphNode::Task(TaskNode {
            id: id.clone(),
            definition,
        }));
        self.dependencies.push(BTreeSet::new());
        self.dependents.push(BTreeSet::new());
        self.index.insert(id, idx);
        idx
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        self.dependencies[from.0].insert(to);
        self.dependents[to.0].insert(from);
    }

    /// Kahn's algorithm; ties resolve by task id for a stable order
    fn topological_sort(&self) -> Result<Vec<NodeIndex>, GraphError> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(BTreeSet::len).collect();
        let mut ready: BTreeMap<&TaskId, NodeIndex> = BTreeMap::new();
        let mut sorted = Vec::with_capacity(self.nodes.len());
        let mut settled = vec![false; self.nodes.len()];

        let mut next = Some(NodeIndex::ROOT);
        while let Some(idx) = next {
            settled[idx.0] = true;
            if idx != NodeIndex::ROOT {
                sorted.push(idx);
            }
            for dependent in &self.dependents[idx.0] {
                in_degree[dependent.0] -= 1;
                if in_degree[dependent.0] == 0 {
                    if let GraphNode::Task(node) = &self.nodes[dependent.0] {
                        ready.insert(&node.id, *dependent);
                    }
                }
            }
            next = ready.pop_first().map(|(_, idx)| idx);
        }

        if sorted.len() != self.nodes.len() - 1 {
            let cyclic: Vec<String> = self
                .task_nodes()
                .filter(|(idx, _)| !settled[idx.0])
                .map(|(_, node)| node.id.to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            return Err(GraphError::CyclicDependency(cyclic.join(", ")));
        }

        Ok(sorted)
    }

    fn validate_persistent_dependencies(&self) -> Result<(), GraphError> {
        for &from in &self.sorted {
            for &to in &self.dependencies[from.0] {
                if let (Some(dependent), Some(dependency)) = (self.node(from), self.node(to)) {
                    if dependency.definition.persistent {
                        return Err(GraphError::PersistentDependency {
                            persistent: dependency.id.clone(),
                            dependent: dependent.id.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Reject runs where persistent tasks would starve every other task
    pub fn validate_concurrency(&self, concurrency: usize) -> Result<(), GraphError> {
        let persistent = self.persistent_count();
        if persistent > 0 && persistent >= concurrency {
            return Err(GraphError::PersistentConcurrency {
                persistent,
                concurrency,
            });
        }
        Ok(())
    }

    fn task_nodes(&self) -> impl Iterator<Item = (NodeIndex, &TaskNode)> {
        self.nodes.iter().enumerate().filter_map(|(i, n)| match n {
            GraphNode::Task(node) => Some((NodeIndex(i), node)),
            GraphNode::Root => None,
        })
    }

    /// Number of persistent tasks
    pub fn persistent_count(&self) -> usize {
        self.task_nodes()
            .filter(|(_, node)| node.definition.persistent)
            .count()
    }

    /// Get a task node by index; `None` for the root
    pub fn node(&self, idx: NodeIndex) -> Option<&TaskNode> {
        match self.nodes.get(idx.0)? {
            GraphNode::Task(node) => Some(node),
            GraphNode::Root => None,
        }
    }

    /// Look up a node index
    pub fn index_of(&self, id: &TaskId) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// Get a task node by id
    pub fn get(&self, id: &TaskId) -> Option<&TaskNode> {
        self.index_of(id).and_then(|idx| self.node(idx))
    }

    /// Number of task nodes (the root is not counted)
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Check if the graph has no task nodes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Task nodes in topological order (dependencies first)
    pub fn sorted(&self) -> &[NodeIndex] {
        &self.sorted
    }

    /// Task ids in topological order
    pub fn sorted_ids(&self) -> Vec<&TaskId> {
        self.sorted
            .iter()
            .filter_map(|idx| self.node(*idx).map(|n| &n.id))
            .collect()
    }

    /// Direct dependencies of a node, excluding the root
    pub fn dependency_indices(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.dependencies[idx.0]
            .iter()
            .copied()
            .filter(|d| *d != NodeIndex::ROOT)
    }

    /// Direct dependents of a node
    pub fn dependent_indices(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.dependents[idx.0].iter().copied()
    }

    /// Whether the user asked for this task, as opposed to it being pulled
    /// in as a dependency
    pub fn is_requested(&self, id: &TaskId) -> bool {
        self.requested.contains(id)
    }

    /// Whether the node hangs directly off the root
    pub fn is_root_child(&self, idx: NodeIndex) -> bool {
        self.dependencies[idx.0].contains(&NodeIndex::ROOT)
    }

    /// Direct dependencies of a task
    pub fn dependencies(&self, id: &TaskId) -> Vec<&TaskId> {
        self.index_of(id)
            .map(|idx| {
                self.dependency_indices(idx)
                    .filter_map(|d| self.node(d).map(|n| &n.id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Direct dependents of a task
    pub fn dependents(&self, id: &TaskId) -> Vec<&TaskId> {
        self.index_of(id)
            .map(|idx| {
                self.dependent_indices(idx)
                    .filter_map(|d| self.node(d).map(|n| &n.id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every node that depends on `idx` directly or transitively
    pub fn transitive_dependents(&self, idx: NodeIndex) -> BTreeSet<NodeIndex> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<NodeIndex> = self.dependent_indices(idx).collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(self.dependent_indices(next));
            }
        }
        seen
    }

    /// Group nodes into waves: each wave only depends on earlier ones
    pub fn waves(&self) -> Vec<Vec<NodeIndex>> {
        let mut level: HashMap<NodeIndex, usize> = HashMap::new();
        for &idx in &self.sorted {
            let wave = self
                .dependency_indices(idx)
                .filter_map(|dep| level.get(&dep))
                .max()
                .map(|w| w + 1)
                .unwrap_or(0);
            level.insert(idx, wave);
        }

        let max_wave = level.values().max().copied().unwrap_or(0);
        let wave_count = if self.sorted.is_empty() { 0 } else { max_wave + 1 };
        let mut waves: Vec<Vec<NodeIndex>> = vec![Vec::new(); wave_count];
        for &idx in &self.sorted {
            if let Some(&wave) = level.get(&idx) {
                waves[wave].push(idx);
            }
        }
        waves
    }

    /// Get a human-readable summary of the execution plan
    pub fn execution_plan(&self) -> String {
        let mut plan = String::new();
        for (i, wave) in self.waves().iter().enumerate() {
            plan.push_str(&format!("Wave {} ({} tasks):\n", i, wave.len()));
            for &idx in wave {
                if let Some(node) = self.node(idx) {
                    let cmd = node.definition.command.as_deref().unwrap_or("<no command>");
                    let deps: Vec<String> = self
                        .dependency_indices(idx)
                        .filter_map(|d| self.node(d).map(|n| n.id.to_string()))
                        .collect();
                    if deps.is_empty() {
                        plan.push_str(&format!("  {} -> {}\n", node.id, cmd));
                    } else {
                        plan.push_str(&format!(
                            "  {} -> {} (after: {})\n",
                            node.id,
                            cmd,
                            deps.join(", ")
                        ));
                    }
                }
            }
        }
        debug!(lines = plan.lines().count(), "rendered execution plan");
        plan
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use baton_core::monorepo::Workspace;

    pub(crate) fn workspaces(edges: &[(&str, &[&str])]) -> WorkspaceGraph {
        let workspaces = edges
            .iter()
            .map(|(name, deps)| {
                Workspace::new(*name, format!("packages/{}", name))
                    .with_dependencies(deps.iter().map(|d| d.to_string()).collect())
            })
            .collect();
        WorkspaceGraph::new("/repo", workspaces).unwrap()
    }

    fn app_and_util() -> WorkspaceGraph {
        workspaces(&[("util", &[]), ("my-app", &["util"])])
    }

    fn build_graph(
        ws: &WorkspaceGraph,
        pipeline: &Pipeline,
        tasks: &[&str],
    ) -> Result<TaskGraph, GraphError> {
        TaskGraph::builder(ws, pipeline)
            .with_tasks(tasks.iter().map(|t| t.to_string()).collect())
            .build()
    }

    #[test]
    fn test_topological_dependency_edge() {
        let ws = app_and_util();
        let mut pipeline = Pipeline::new();
        pipeline.insert_all(
            &["util", "my-app"],
            TaskDefinition::new("build").with_depends_on("^build"),
        );

        let graph = build_graph(&ws, &pipeline, &["build"]).unwrap();
        assert_eq!(graph.len(), 2);

        let app = TaskId::new("my-app", "build");
        let util = TaskId::new("util", "build");
        assert_eq!(graph.dependencies(&app), vec![&util]);
        assert!(graph.dependencies(&util).is_empty());
        assert!(graph.is_root_child(graph.index_of(&util).unwrap()));
        assert_eq!(graph.sorted_ids(), vec![&util, &app]);
    }

    #[test]
    fn test_topological_dependency_skips_missing_task() {
        let ws = app_and_util();
        let mut pipeline = Pipeline::new();
        pipeline.insert("my-app", TaskDefinition::new("build").with_depends_on("^build"));

        let graph = build_graph(&ws, &pipeline, &["build"]).unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.dependencies(&TaskId::new("my-app", "build")).is_empty());
    }

    #[test]
    fn test_same_package_and_explicit_dependencies() {
        let ws = app_and_util();
        let mut pipeline = Pipeline::new();
        pipeline.insert_all(&["util", "my-app"], TaskDefinition::new("build"));
        pipeline.insert_all(&["util", "my-app"], TaskDefinition::new("codegen"));
        pipeline.insert(
            "my-app",
            TaskDefinition::new("test")
                .with_depends_on("build")
                .with_depends_on("util#codegen"),
        );

        let graph = build_graph(&ws, &pipeline, &["test"]).unwrap();
        let deps = graph.dependencies(&TaskId::new("my-app", "test"));
        assert_eq!(
            deps,
            vec![&TaskId::new("my-app", "build"), &TaskId::new("util", "codegen")]
        );
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_missing_requested_task() {
        let ws = app_and_util();
        let pipeline = Pipeline::new();
        let err = build_graph(&ws, &pipeline, &["lint", "build"]).unwrap_err();
        assert!(matches!(err, GraphError::MissingTasks(ref t) if t == &["build", "lint"]));
    }

    #[test]
    fn test_same_package_task_not_found() {
        let ws = app_and_util();
        let mut pipeline = Pipeline::new();
        pipeline.insert("util", TaskDefinition::new("test").with_depends_on("build"));
        let err = build_graph(&ws, &pipeline, &["test"]).unwrap_err();
        assert!(matches!(err, GraphError::TaskNotFound(ref id) if id.to_string() == "util#build"));
    }

    #[test]
    fn test_explicit_unknown_package() {
        let ws = app_and_util();
        let mut pipeline = Pipeline::new();
        pipeline.insert("util", TaskDefinition::new("test").with_depends_on("ghost#build"));
        let err = build_graph(&ws, &pipeline, &["test"]).unwrap_err();
        assert!(matches!(err, GraphError::UnknownPackage { .. }));
    }

    #[test]
    fn test_self_cycle_rejected() {
        let ws = app_and_util();
        let mut pipeline = Pipeline::new();
        pipeline.insert("util", TaskDefinition::new("build").with_depends_on("build"));
        let err = build_graph(&ws, &pipeline, &["build"]).unwrap_err();
        match err {
            GraphError::CyclicDependency(nodes) => assert_eq!(nodes, "util#build"),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_two_task_cycle_rejected() {
        let ws = app_and_util();
        let mut pipeline = Pipeline::new();
        pipeline.insert("util", TaskDefinition::new("a").with_depends_on("b"));
        pipeline.insert("util", TaskDefinition::new("b").with_depends_on("a"));
        let err = build_graph(&ws, &pipeline, &["a"]).unwrap_err();
        assert!(matches!(err, GraphError::CyclicDependency(ref s) if s == "util#a, util#b"));
    }

    #[test]
    fn test_persistent_topological_dependency_rejected() {
        let ws = app_and_util();
        let mut pipeline = Pipeline::new();
        pipeline.insert_all(&["util", "my-app"], TaskDefinition::new("dev").with_persistent(true));
        pipeline.insert_all(&["util", "my-app"], TaskDefinition::new("test").with_depends_on("^dev"));

        let err = build_graph(&ws, &pipeline, &["test"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"util#dev\" is a persistent task, \"my-app#test\" cannot depend on it"
        );
    }

    #[test]
    fn test_persistent_same_package_dependency_rejected() {
        let ws = app_and_util();
        let mut pipeline = Pipeline::new();
        pipeline.insert("util", TaskDefinition::new("dev").with_persistent(true));
        pipeline.insert("util", TaskDefinition::new("test").with_depends_on("dev"));
        let err = build_graph(&ws, &pipeline, &["test"]).unwrap_err();
        assert!(matches!(err, GraphError::PersistentDependency { .. }));
    }

    #[test]
    fn test_persistent_concurrency() {
        let ws = app_and_util();
        let mut pipeline = Pipeline::new();
        pipeline.insert_all(&["util", "my-app"], TaskDefinition::new("dev").with_persistent(true));
        let graph = build_graph(&ws, &pipeline, &["dev"]).unwrap();
        assert_eq!(graph.persistent_count(), 2);
        assert!(graph.validate_concurrency(2).is_err());
        assert!(graph.validate_concurrency(3).is_ok());
    }

    #[test]
    fn test_tasks_only_drops_other_edges() {
        let ws = app_and_util();
        let mut pipeline = Pipeline::new();
        pipeline.insert_all(&["util", "my-app"], TaskDefinition::new("build").with_depends_on("^build"));
        pipeline.insert_all(
            &["util", "my-app"],
            TaskDefinition::new("test").with_depends_on("build").with_depends_on("^test"),
        );

        let graph = TaskGraph::builder(&ws, &pipeline)
            .with_tasks(vec!["test".to_string()])
            .with_tasks_only(true)
            .build()
            .unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(
            graph.dependencies(&TaskId::new("my-app", "test")),
            vec![&TaskId::new("util", "test")]
        );
    }

    #[test]
    fn test_tasks_only_respects_scope() {
        let ws = app_and_util();
        let mut pipeline = Pipeline::new();
        pipeline.insert_all(&["util", "my-app"], TaskDefinition::new("build").with_depends_on("^build"));

        let graph = TaskGraph::builder(&ws, &pipeline)
            .with_scope(vec!["my-app".to_string()])
            .with_tasks(vec!["build".to_string()])
            .with_tasks_only(true)
            .build()
            .unwrap();

        assert_eq!(graph.len(), 1);
        assert!(graph.get(&TaskId::new("util", "build")).is_none());
        assert!(graph.dependencies(&TaskId::new("my-app", "build")).is_empty());
    }

    #[test]
    fn test_tasks_only_explicit_dependency() {
        let ws = app_and_util();
        let mut pipeline = Pipeline::new();
        pipeline.insert("util", TaskDefinition::new("build"));
        pipeline.insert("util", TaskDefinition::new("lint"));
        pipeline.insert("my-app", TaskDefinition::new("build").with_depends_on("util#build"));
        pipeline.insert("my-app", TaskDefinition::new("test").with_depends_on("util#lint"));

        let graph = TaskGraph::builder(&ws, &pipeline)
            .with_tasks(vec!["build".to_string(), "test".to_string()])
            .with_tasks_only(true)
            .build()
            .unwrap();

        assert_eq!(
            graph.dependencies(&TaskId::new("my-app", "build")),
            vec![&TaskId::new("util", "build")]
        );
        assert!(graph.dependencies(&TaskId::new("my-app", "test")).is_empty());
        assert!(graph.get(&TaskId::new("util", "lint")).is_none());

        let narrowed = TaskGraph::builder(&ws, &pipeline)
            .with_scope(vec!["my-app".to_string()])
            .with_tasks(vec!["build".to_string()])
            .with_tasks_only(true)
            .build()
            .unwrap();
        assert_eq!(narrowed.len(), 1);
        assert!(narrowed.dependencies(&TaskId::new("my-app", "build")).is_empty());
    }

    #[test]
    fn test_scope_limits_seeds_but_not_dependencies() {
        let ws = app_and_util();
        let mut pipeline = Pipeline::new();
        pipeline.insert_all(&["util", "my-app"], TaskDefinition::new("build").with_depends_on("^build"));
        let graph = TaskGraph::builder(&ws, &pipeline)
            .with_scope(vec!["my-app".to_string()])
            .with_tasks(vec!["build".to_string()])
            .build()
            .unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.is_requested(&TaskId::new("my-app", "build")));
        assert!(!graph.is_requested(&TaskId::new("util", "build")));
    }

    #[test]
    fn test_transitive_dependents_and_waves() {
        let ws = workspaces(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]);
        let mut pipeline = Pipeline::new();
        pipeline.insert_all(&["a", "b", "c", "d"], TaskDefinition::new("build").with_depends_on("^build"));
        let graph = build_graph(&ws, &pipeline, &["build"]).unwrap();

        let a = graph.index_of(&TaskId::new("a", "build")).unwrap();
        let dependents: Vec<String> = graph
            .transitive_dependents(a)
            .into_iter()
            .filter_map(|i| graph.node(i).map(|n| n.id.to_string()))
            .collect();
        assert_eq!(dependents.len(), 2);
        assert!(dependents.contains(&"c#build".to_string()));

        let waves = graph.waves();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0].len(), 2);

        let plan = graph.execution_plan();
        assert!(plan.contains("Wave 0"));
        assert!(plan.contains("c#build -> <no command> (after: b#build)"));
    }
}
