//! Configuration validation

use std::collections::HashSet;

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_tasks(config)?;
    validate_packages(config)?;
    validate_pipeline(config)?;
    validate_cache(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

fn validate_tasks(config: &Config) -> Result<()> {
    if config.tasks.concurrency == 0 {
        return Err(invalid("tasks.concurrency", "must be at least 1").into());
    }
    Ok(())
}

fn validate_packages(config: &Config) -> Result<()> {
    if !config.packages.is_empty() {
        debug!(count = config.packages.len(), "validating packages");
    }

    let mut seen = HashSet::new();
    for (i, package) in config.packages.iter().enumerate() {
        if package.name.is_empty() {
            return Err(invalid(
                format!("packages[{}].name", i),
                "package name cannot be empty",
            )
            .into());
        }
        if package.name.contains('#') {
            return Err(invalid(
                format!("packages[{}].name", i),
                "package name cannot contain '#'",
            )
            .into());
        }
        if !seen.insert(package.name.as_str()) {
            return Err(invalid(
                format!("packages[{}].name", i),
                format!("duplicate package name '{}'", package.name),
            )
            .into());
        }
    }

    for package in &config.packages {
        for dep in &package.dependencies {
            if !seen.contains(dep.as_str()) {
                return Err(invalid(
                    format!("packages.{}.dependencies", package.name),
                    format!("unknown package '{}'", dep),
                )
                .into());
            }
        }
    }

    Ok(())
}

fn validate_pipeline(config: &Config) -> Result<()> {
    for (key, task) in &config.tasks.pipeline {
        if !is_valid_task_ref(key) || key.starts_with('^') {
            return Err(invalid(
                format!("tasks.pipeline.{}", key),
                "task key must be 'task' or 'workspace#task'",
            )
            .into());
        }

        for dep in &task.depends_on {
            if !is_valid_task_ref(dep) {
                return Err(invalid(
                    format!("tasks.pipeline.{}.depends_on", key),
                    format!("malformed dependency '{}'", dep),
                )
                .into());
            }
        }
    }
    Ok(())
}

/// Accepts `task`, `^task` and `workspace#task`
fn is_valid_task_ref(reference: &str) -> bool {
    if let Some(rest) = reference.strip_prefix('^') {
        return !rest.is_empty() && !rest.contains('#');
    }
    match reference.split_once('#') {
        Some((pkg, task)) => !pkg.is_empty() && !task.is_empty() && !task.contains('#'),
        None => !reference.is_empty(),
    }
}

fn validate_cache(config: &Config) -> Result<()> {
    let cache = &config.tasks.cache;

    if cache.remote_only && cache.remote.is_none() {
        return Err(invalid(
            "tasks.cache.remote_only",
            "requires a [tasks.cache.remote] section",
        )
        .into());
    }

    if let Some(remote) = &cache.remote {
        url::Url::parse(&remote.url)
            .map_err(|e| invalid("tasks.cache.remote.url", e.to_string()))?;
        if remote.timeout_secs == 0 {
            return Err(invalid("tasks.cache.remote.timeout_secs", "must be at least 1").into());
        }
    }

    Ok(())
}
