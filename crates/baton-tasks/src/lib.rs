//! Baton Tasks - task orchestration engine
//!
//! This crate expands the package graph into a task graph, hashes every
//! task from its inputs, restores and stores outputs through local and
//! remote caches, and runs the remaining tasks in dependency order.

pub mod cache;
pub mod color;
pub mod context;
pub mod env;
pub mod files;
pub mod graph;
pub mod hash;
pub mod process;
pub mod reporter;
pub mod run_cache;
pub mod scheduler;
pub mod summary;
pub mod task;

pub use cache::{open_cache, CacheBackend, CacheError, CacheOpts, CacheSource};
pub use color::ColorSelector;
pub use context::RunContext;
pub use env::EnvironmentVariableMap;
pub use files::{FileHasher, GlobFileHasher};
pub use graph::{GraphError, NodeIndex, TaskGraph, TaskGraphBuilder};
pub use hash::{GlobalHashInputs, HashError, TaskHash, TaskHasher};
pub use reporter::{TaskEvent, TaskReporter, TaskReporterRegistry};
pub use run_cache::{RunCache, RunCacheOpts};
pub use scheduler::{SchedulerError, SchedulerOptions, TaskResult, TaskScheduler, TaskStatus};
pub use summary::RunSummary;
pub use task::{Pipeline, TaskDefinition, TaskId};
