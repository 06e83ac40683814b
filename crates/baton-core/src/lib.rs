//! Baton Core - configuration and workspace model
//!
//! This crate provides error handling, configuration loading and the
//! package graph that the task engine expands into a task graph.

pub mod config;
pub mod error;
pub mod monorepo;

pub use error::{BatonError, ConfigError, Result, WorkspaceError};
pub use monorepo::{DependencyGraph, Workspace, WorkspaceGraph};
