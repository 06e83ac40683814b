//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use super::defaults::{default_concurrency, DEFAULT_CACHE_DIR, DEFAULT_TOKEN_ENV};

/// Main configuration for Baton
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Repository name
    pub name: Option<String>,

    /// How environment variables participate in hashing and child processes
    pub env_mode: EnvMode,

    /// Inputs shared by every task in a run
    pub global: GlobalConfig,

    /// Workspace packages
    pub packages: Vec<PackageConfig>,

    /// Task orchestration configuration
    pub tasks: TasksConfig,
}

impl Config {
    /// Resolve the pipeline for one workspace.
    ///
    /// Plain `task` entries apply to every workspace. A `workspace#task` entry
    /// replaces the plain definition for that workspace only.
    pub fn pipeline_for(&self, workspace: &str) -> BTreeMap<String, PipelineTask> {
        let mut resolved: BTreeMap<String, PipelineTask> = self
            .tasks
            .pipeline
            .iter()
            .filter(|(key, _)| !key.contains('#'))
            .map(|(key, task)| (key.clone(), task.clone()))
            .collect();

        for (key, task) in &self.tasks.pipeline {
            if let Some((pkg, task_name)) = key.split_once('#') {
                if pkg == workspace {
                    resolved.insert(task_name.to_string(), task.clone());
                }
            }
        }

        resolved
    }

    /// Get a package by name
    pub fn package(&self, name: &str) -> Option<&PackageConfig> {
        self.packages.iter().find(|p| p.name == name)
    }
}

/// Environment variable handling mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvMode {
    /// Strict when pass-through env is declared, loose otherwise
    #[default]
    Infer,
    /// Child processes see the full environment
    Loose,
    /// Child processes only see declared variables
    Strict,
}

impl fmt::Display for EnvMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infer => write!(f, "infer"),
            Self::Loose => write!(f, "loose"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

/// How task output is shown on the terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputLogs {
    /// Show all output, replaying logs on cache hits
    #[default]
    Full,
    /// Show nothing
    None,
    /// Only show the task hash
    HashOnly,
    /// Show output for cache misses, hash for cache hits
    NewOnly,
    /// Only show output of failed tasks
    ErrorsOnly,
}

impl fmt::Display for OutputLogs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Full => "full",
            Self::None => "none",
            Self::HashOnly => "hash-only",
            Self::NewOnly => "new-only",
            Self::ErrorsOnly => "errors-only",
        };
        f.write_str(s)
    }
}

/// Ordering of task logs on the terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOrder {
    /// Lines are printed as they arrive
    #[default]
    Stream,
    /// Each task's output is printed in one block when it finishes
    Grouped,
}

/// Global hashing inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Repository-relative globs whose contents affect every task
    pub dependencies: Vec<String>,

    /// Env var names or wildcards whose values affect every task
    pub env: Vec<String>,

    /// Env vars passed to every task without affecting hashes.
    /// Absent means the legacy global hash is used.
    pub pass_through_env: Option<Vec<String>>,

    /// Ordered `.env` files included in the global hash
    pub dot_env: Vec<String>,

    /// Whether framework env prefixes are inferred
    pub framework_inference: bool,

    /// Root-level external dependencies (name -> resolved version)
    pub external_dependencies: BTreeMap<String, String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            dependencies: Vec::new(),
            env: Vec::new(),
            pass_through_env: None,
            dot_env: Vec::new(),
            framework_inference: true,
            external_dependencies: BTreeMap::new(),
        }
    }
}

/// Per-package configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Package name
    pub name: String,

    /// Path to package (relative to repo root)
    pub path: PathBuf,

    /// Internal packages this package depends on
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Resolved external dependencies (name -> version)
    #[serde(default)]
    pub external_dependencies: BTreeMap<String, String>,
}

/// Task orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Maximum concurrent tasks
    pub concurrency: usize,

    /// Keep running independent tasks after a failure
    pub continue_on_error: bool,

    /// Ignore task dependencies when scheduling
    pub parallel: bool,

    /// Default output mode
    pub output_logs: OutputLogs,

    /// Terminal log ordering
    pub log_order: LogOrder,

    /// Task pipeline definitions, keyed by `task` or `workspace#task`
    pub pipeline: BTreeMap<String, PipelineTask>,

    /// Cache configuration
    pub cache: CacheConfig,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            continue_on_error: false,
            parallel: false,
            output_logs: OutputLogs::default(),
            log_order: LogOrder::default(),
            pipeline: BTreeMap::new(),
            cache: CacheConfig::default(),
        }
    }
}

/// A task in the pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineTask {
    /// Shell command to execute. Tasks without a command are no-ops.
    pub command: Option<String>,

    /// `^task`, `task` or `workspace#task` dependencies
    pub depends_on: Vec<String>,

    /// Output globs; entries starting with `!` are exclusions
    pub outputs: Vec<String>,

    /// Input globs; empty means every file in the package
    pub inputs: Vec<String>,

    /// Env var names or wildcards whose values affect the hash
    pub env: Vec<String>,

    /// Env vars passed through without affecting the hash
    pub pass_through_env: Option<Vec<String>>,

    /// Ordered `.env` files included in the hash
    pub dot_env: Vec<String>,

    /// Whether results are cached
    pub cache: bool,

    /// Whether this is a persistent/long-running task (e.g., dev server)
    pub persistent: bool,

    /// Output mode override
    pub output_logs: Option<OutputLogs>,
}

impl Default for PipelineTask {
    fn default() -> Self {
        Self {
            command: None,
            depends_on: Vec::new(),
            outputs: Vec::new(),
            inputs: Vec::new(),
            env: Vec::new(),
            pass_through_env: None,
            dot_env: Vec::new(),
            cache: true,
            persistent: false,
            output_logs: None,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether caching is enabled
    pub enabled: bool,

    /// Cache directory (relative to repo root)
    pub dir: PathBuf,

    /// Background upload workers; 0 writes synchronously
    pub workers: usize,

    /// Skip the local cache and only use the remote one
    pub remote_only: bool,

    /// Remote cache
    pub remote: Option<RemoteCacheConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
            workers: 10,
            remote_only: false,
            remote: None,
        }
    }
}

/// Remote cache connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCacheConfig {
    /// Base URL of the cache server
    pub url: String,

    /// Scope (team or project id) sent with each request
    #[serde(default)]
    pub scope: Option<String>,

    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}
