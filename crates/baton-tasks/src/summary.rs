//! End-of-run summary

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use baton_core::config::defaults::STATE_DIR;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheSource;
use crate::files::to_unix;
use crate::scheduler::{TaskResult, TaskStatus};

/// One task's line in the summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: String,
    pub package: String,
    pub task: String,
    pub hash: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_source: Option<CacheSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_saved_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl From<&TaskResult> for TaskSummary {
    fn from(result: &TaskResult) -> Self {
        let (status, error) = match &result.status {
            TaskStatus::Success => ("success", None),
            TaskStatus::CacheHit => ("cached", None),
            TaskStatus::Failed(error) => ("failed", Some(error.clone())),
            TaskStatus::Skipped(reason) => ("skipped", Some(reason.clone())),
        };
        Self {
            task_id: result.id.to_string(),
            package: result.id.package.clone(),
            task: result.id.task.clone(),
            hash: result.hash.clone(),
            status: status.to_string(),
            error,
            exit_code: result.exit_code,
            duration_ms: result.duration.as_millis() as u64,
            cache_source: result.cache.map(|c| c.source),
            time_saved_ms: result.cache.map(|c| c.time_saved),
            log_file: result.log_file.as_deref().map(to_unix),
        }
    }
}

/// Counts and per-task records for a finished run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "as_millis")]
    pub duration: Duration,
    pub global_hash: String,
    pub successful: usize,
    pub failed: usize,
    pub cached: usize,
    pub skipped: usize,
    pub attempted: usize,
    pub total: usize,
    pub tasks: Vec<TaskSummary>,
}

fn as_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl RunSummary {
    pub fn new(
        results: &[TaskResult],
        started_at: DateTime<Utc>,
        duration: Duration,
        global_hash: impl Into<String>,
    ) -> Self {
        let count = |f: fn(&TaskStatus) -> bool| results.iter().filter(|r| f(&r.status)).count();
        let skipped = count(|s| matches!(s, TaskStatus::Skipped(_)));

        Self {
            started_at,
            duration,
            global_hash: global_hash.into(),
            successful: count(TaskStatus::is_success),
            failed: count(|s| matches!(s, TaskStatus::Failed(_))),
            cached: count(|s| matches!(s, TaskStatus::CacheHit)),
            skipped,
            attempted: results.len() - skipped,
            total: results.len(),
            tasks: results.iter().map(TaskSummary::from).collect(),
        }
    }

    /// Failed task ids in run order
    pub fn failures(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| t.status == "failed")
            .map(|t| t.task_id.as_str())
            .collect()
    }

    /// Process exit code: the highest child exit code among failures, or 1
    /// when a failure has none
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 {
            return 0;
        }
        self.tasks
            .iter()
            .filter(|t| t.status == "failed")
            .map(|t| t.exit_code.filter(|c| *c > 0).unwrap_or(1))
            .max()
            .unwrap_or(1)
    }

    /// Write to `<root>/.baton/runs/<timestamp>.json`
    pub fn write_json(&self, root: &Path) -> io::Result<PathBuf> {
        let dir = root.join(STATE_DIR).join("runs");
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", self.started_at.format("%Y%m%dT%H%M%S%.3fZ")));
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " Tasks:    {} successful, {} total", self.successful, self.total)?;
        writeln!(f, "Cached:    {} cached, {} total", self.cached, self.total)?;
        write!(f, "  Time:    {:.1}s", self.duration.as_secs_f64())?;
        let failures = self.failures();
        if !failures.is_empty() {
            write!(f, "\nFailed:    {}", failures.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheHitMetadata;
    use crate::task::TaskId;
    use tempfile::TempDir;

    fn result(pkg: &str, status: TaskStatus, exit_code: Option<i32>) -> TaskResult {
        TaskResult {
            id: TaskId::new(pkg, "build"),
            status,
            hash: Some(format!("{}-hash", pkg)),
            duration: Duration::from_millis(250),
            exit_code,
            cache: None,
            log_file: None,
        }
    }

    #[test]
    fn test_counts_and_display() {
        let mut cached = result("util", TaskStatus::CacheHit, None);
        cached.cache = Some(CacheHitMetadata {
            source: CacheSource::Local,
            time_saved: 900,
        });
        let results = vec![cached, result("my-app", TaskStatus::Success, Some(0))];
        let summary = RunSummary::new(&results, Utc::now(), Duration::from_millis(1240), "g");

        assert_eq!(summary.successful, 2);
        assert_eq!(summary.cached, 1);
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.exit_code(), 0);

        let text = summary.to_string();
        assert!(text.contains("Tasks:    2 successful, 2 total"));
        assert!(text.contains("Cached:    1 cached, 2 total"));
        assert!(text.contains("Time:    1.2s"));
        assert!(!text.contains("Failed"));
    }

    #[test]
    fn test_failures_set_exit_code() {
        let results = vec![
            result("a", TaskStatus::Failed("exit 3".to_string()), Some(3)),
            result("b", TaskStatus::Failed("spawn".to_string()), None),
            result("c", TaskStatus::Skipped("dependency failed".to_string()), None),
        ];
        let summary = RunSummary::new(&results, Utc::now(), Duration::ZERO, "g");

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.exit_code(), 3);
        assert!(summary.to_string().contains("Failed:    a#build, b#build"));
    }

    #[test]
    fn test_write_json() {
        let temp = TempDir::new().unwrap();
        let mut failed = result("my-app", TaskStatus::Failed("exit 1".to_string()), Some(1));
        failed.log_file = Some(PathBuf::from("packages/my-app/.baton/build.log"));
        let results = vec![result("util", TaskStatus::Success, Some(0)), failed];
        let summary = RunSummary::new(&results, Utc::now(), Duration::from_secs(2), "abc");

        let path = summary.write_json(temp.path()).unwrap();
        assert!(path.starts_with(temp.path().join(".baton/runs")));

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["globalHash"], "abc");
        assert_eq!(json["duration"], 2000);
        assert_eq!(json["tasks"][0]["taskId"], "util#build");
        assert_eq!(json["tasks"][0]["status"], "success");
        assert!(json["tasks"][0].get("logFile").is_none());
        assert_eq!(json["tasks"][1]["logFile"], "packages/my-app/.baton/build.log");
        assert_eq!(json["tasks"][1]["exitCode"], 1);
    }
}
