//! Task types and definitions

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use baton_core::config::{Config, OutputLogs, PipelineTask};

/// Unique identifier for a package-task node
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    /// Package name
    pub package: String,
    /// Task name (e.g., "build", "test", "lint")
    pub task: String,
}

impl TaskId {
    /// Create a new task ID
    pub fn new(package: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            task: task.into(),
        }
    }

    /// Parse a task ID from "package#task" format
    pub fn parse(s: &str) -> Option<Self> {
        let (package, task) = s.split_once('#')?;
        if package.is_empty() || task.is_empty() || task.contains('#') {
            return None;
        }
        Some(Self::new(package, task))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.package, self.task)
    }
}

/// A parsed `depends_on` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDependency {
    /// `^task`: the same task in every direct dependency package
    Topological(String),
    /// `task`: another task in the same package
    SamePackage(String),
    /// `package#task`
    Explicit(TaskId),
}

impl TaskDependency {
    /// Parse a single `depends_on` entry
    pub fn parse(entry: &str) -> Option<Self> {
        if let Some(task) = entry.strip_prefix('^') {
            if task.is_empty() || task.contains('#') {
                return None;
            }
            return Some(Self::Topological(task.to_string()));
        }
        if entry.contains('#') {
            return TaskId::parse(entry).map(Self::Explicit);
        }
        if entry.is_empty() {
            return None;
        }
        Some(Self::SamePackage(entry.to_string()))
    }

    /// Task name the dependency refers to
    pub fn task_name(&self) -> &str {
        match self {
            Self::Topological(t) | Self::SamePackage(t) => t,
            Self::Explicit(id) => &id.task,
        }
    }
}

/// Output globs split into inclusions and `!`-prefixed exclusions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutputs {
    pub inclusions: Vec<String>,
    pub exclusions: Vec<String>,
}

impl TaskOutputs {
    /// Split a list of globs on the `!` prefix
    pub fn from_globs(globs: &[String]) -> Self {
        let mut outputs = Self::default();
        for glob in globs {
            match glob.strip_prefix('!') {
                Some(excluded) => outputs.exclusions.push(excluded.to_string()),
                None => outputs.inclusions.push(glob.clone()),
            }
        }
        outputs
    }

    /// Copy with both lists sorted
    pub fn sorted(&self) -> Self {
        let mut sorted = self.clone();
        sorted.inclusions.sort();
        sorted.exclusions.sort();
        sorted
    }

    pub fn is_empty(&self) -> bool {
        self.inclusions.is_empty()
    }
}

/// Definition of a task for one workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Task name (e.g., "build", "test", "lint")
    pub name: String,

    /// Command to execute; `None` makes the task a no-op
    pub command: Option<String>,

    /// Raw `depends_on` entries
    pub depends_on: Vec<String>,

    /// Output globs (for caching)
    pub outputs: TaskOutputs,

    /// Input globs (for hashing); empty means every package file
    pub inputs: Vec<String>,

    /// Env var names or wildcards that affect the hash
    pub env: Vec<String>,

    /// Env vars passed through without affecting the hash
    pub pass_through_env: Option<Vec<String>>,

    /// Ordered `.env` files that affect the hash
    pub dot_env: Vec<String>,

    /// Whether results are cached
    pub cache: bool,

    /// Whether this is a persistent/long-running task (e.g., dev server)
    pub persistent: bool,

    /// Output mode override
    pub output_logs: Option<OutputLogs>,
}

impl TaskDefinition {
    /// Create a new task definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: None,
            depends_on: Vec::new(),
            outputs: TaskOutputs::default(),
            inputs: Vec::new(),
            env: Vec::new(),
            pass_through_env: None,
            dot_env: Vec::new(),
            cache: true,
            persistent: false,
            output_logs: None,
        }
    }

    /// Build from a pipeline entry
    pub fn from_pipeline(name: impl Into<String>, task: &PipelineTask) -> Self {
        Self {
            name: name.into(),
            command: task.command.clone(),
            depends_on: task.depends_on.clone(),
            outputs: TaskOutputs::from_globs(&task.outputs),
            inputs: task.inputs.clone(),
            env: task.env.clone(),
            pass_through_env: task.pass_through_env.clone(),
            dot_env: task.dot_env.clone(),
            cache: task.cache,
            persistent: task.persistent,
            output_logs: task.output_logs,
        }
    }

    /// Set the command
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Add a `depends_on` entry
    pub fn with_depends_on(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.push(dep.into());
        self
    }

    /// Set output globs
    pub fn with_outputs(mut self, outputs: Vec<String>) -> Self {
        self.outputs = TaskOutputs::from_globs(&outputs);
        self
    }

    /// Set input globs
    pub fn with_inputs(mut self, inputs: Vec<String>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Set hashed env vars
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    /// Mark as persistent
    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Enable or disable caching
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Parsed `depends_on` entries; malformed entries are returned as errors
    pub fn dependencies(&self) -> Vec<Result<TaskDependency, String>> {
        self.depends_on
            .iter()
            .map(|entry| TaskDependency::parse(entry).ok_or_else(|| entry.clone()))
            .collect()
    }
}

/// Task definitions for every workspace
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    by_workspace: BTreeMap<String, BTreeMap<String, TaskDefinition>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a pipeline for each named workspace from the config
    pub fn from_config<'a>(config: &Config, workspaces: impl IntoIterator<Item = &'a str>) -> Self {
        let mut pipeline = Self::new();
        for ws in workspaces {
            for (name, task) in config.pipeline_for(ws) {
                pipeline.insert(ws, TaskDefinition::from_pipeline(name, &task));
            }
        }
        pipeline
    }

    /// Add a definition for one workspace
    pub fn insert(&mut self, workspace: impl Into<String>, definition: TaskDefinition) {
        self.by_workspace
            .entry(workspace.into())
            .or_default()
            .insert(definition.name.clone(), definition);
    }

    /// Add a definition to several workspaces
    pub fn insert_all(&mut self, workspaces: &[&str], definition: TaskDefinition) {
        for ws in workspaces {
            self.insert(*ws, definition.clone());
        }
    }

    /// Look up a task definition
    pub fn get(&self, workspace: &str, task: &str) -> Option<&TaskDefinition> {
        self.by_workspace.get(workspace)?.get(task)
    }

    /// All definitions for a workspace
    pub fn tasks(&self, workspace: &str) -> impl Iterator<Item = &TaskDefinition> {
        self.by_workspace
            .get(workspace)
            .into_iter()
            .flat_map(|tasks| tasks.values())
    }
}
