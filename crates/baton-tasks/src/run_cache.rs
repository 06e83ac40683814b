//! Per-run cache policy, log files and output-mode handling

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use baton_core::config::defaults::STATE_DIR;
use baton_core::config::OutputLogs;

use crate::cache::{CacheBackend, CacheError, CacheHitMetadata};
use crate::files::{expand_globs, to_unix};
use crate::reporter::{TaskEvent, TaskReporter};
use crate::task::{TaskDefinition, TaskId};

/// Run-wide cache switches
#[derive(Debug, Clone, Copy, Default)]
pub struct RunCacheOpts {
    /// `--force`: never read from the cache
    pub skip_reads: bool,
    /// `--no-cache`: never write to the cache
    pub skip_writes: bool,
    /// `--output-logs`: overrides every task's mode
    pub output_logs_override: Option<OutputLogs>,
}

/// Cache access for one run
pub struct RunCache {
    cache: Option<Arc<dyn CacheBackend>>,
    anchor: PathBuf,
    opts: RunCacheOpts,
    default_output_logs: OutputLogs,
    reporter: Arc<dyn TaskReporter>,
}

impl RunCache {
    pub fn new(
        cache: Option<Arc<dyn CacheBackend>>,
        anchor: &Path,
        opts: RunCacheOpts,
        default_output_logs: OutputLogs,
        reporter: Arc<dyn TaskReporter>,
    ) -> Self {
        Self {
            cache,
            anchor: anchor.to_path_buf(),
            opts,
            default_output_logs,
            reporter,
        }
    }

    /// Cache handle for one node. `package_dir` is relative to the anchor.
    pub fn task_cache(
        &self,
        id: &TaskId,
        definition: &TaskDefinition,
        package_dir: &Path,
        hash: &str,
    ) -> TaskCache {
        let output_logs = self
            .opts
            .output_logs_override
            .or(definition.output_logs)
            .unwrap_or(self.default_output_logs);

        let prefix = |glob: &String| to_unix(&package_dir.join(glob));
        let mut outputs: Vec<String> = definition.outputs.inclusions.iter().map(prefix).collect();
        outputs.extend(
            definition
                .outputs
                .exclusions
                .iter()
                .map(|glob| format!("!{}", prefix(glob))),
        );

        TaskCache {
            id: id.clone(),
            hash: hash.to_string(),
            cache: self.cache.clone(),
            anchor: self.anchor.clone(),
            caching_disabled: !definition.cache,
            reads_disabled: self.opts.skip_reads,
            writes_disabled: self.opts.skip_writes,
            output_logs,
            outputs,
            log_file: log_file_path(package_dir, &definition.name),
            reporter: self.reporter.clone(),
        }
    }

    /// Flush pending uploads
    pub async fn shutdown(&self) {
        if let Some(cache) = &self.cache {
            cache.shutdown().await;
        }
    }
}

/// `<package_dir>/.baton/<task>.log`, with `:` in task names replaced
pub fn log_file_path(package_dir: &Path, task: &str) -> PathBuf {
    package_dir
        .join(STATE_DIR)
        .join(format!("{}.log", task.replace(':', "$colon$")))
}

/// Cache handle for one package-task
pub struct TaskCache {
    id: TaskId,
    hash: String,
    cache: Option<Arc<dyn CacheBackend>>,
    anchor: PathBuf,
    caching_disabled: bool,
    reads_disabled: bool,
    writes_disabled: bool,
    output_logs: OutputLogs,
    /// Anchor-relative output globs, `!` for exclusions
    outputs: Vec<String>,
    /// Anchor-relative log file
    log_file: PathBuf,
    reporter: Arc<dyn TaskReporter>,
}

impl TaskCache {
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn output_logs(&self) -> OutputLogs {
        self.output_logs
    }

    /// Absolute path of the task's log file
    pub fn log_file(&self) -> PathBuf {
        self.anchor.join(&self.log_file)
    }

    fn shows_status(&self) -> bool {
        !matches!(self.output_logs, OutputLogs::None | OutputLogs::ErrorsOnly)
    }

    fn message(&self, text: String) {
        self.reporter.report(&TaskEvent::Message {
            id: self.id.clone(),
            text,
        });
    }

    /// Try to restore outputs, printing the cache status per output mode.
    ///
    /// Backend errors are logged and treated as a miss.
    pub async fn restore_outputs(&self) -> Option<CacheHitMetadata> {
        if self.caching_disabled || self.reads_disabled {
            if self.shows_status() {
                self.message(format!("cache bypass, force executing {}", self.hash));
            }
            return None;
        }

        let hit = match &self.cache {
            Some(cache) => match cache.fetch(&self.anchor, &self.hash).await {
                Ok(hit) => hit,
                Err(err) => {
                    warn!(task = %self.id, hash = %self.hash, error = %err, "cache fetch failed, treating as miss");
                    None
                }
            },
            None => None,
        };

        let Some(hit) = hit else {
            if self.shows_status() {
                self.message(format!("cache miss, executing {}", self.hash));
            }
            return None;
        };

        match self.output_logs {
            OutputLogs::Full => {
                self.message(format!("cache hit, replaying logs {}", self.hash));
                self.replay_log_file();
            }
            OutputLogs::HashOnly | OutputLogs::NewOnly => {
                self.message(format!("cache hit, suppressing logs {}", self.hash));
            }
            OutputLogs::None | OutputLogs::ErrorsOnly => {}
        }

        debug!(task = %self.id, source = %hit.metadata.source, files = hit.files.len(), "restored outputs");
        Some(hit.metadata)
    }

    /// Send the stored log file through the reporter
    pub fn replay_log_file(&self) {
        match fs::read_to_string(self.log_file()) {
            Ok(contents) => {
                for line in contents.lines() {
                    self.reporter.report(&TaskEvent::Output {
                        id: self.id.clone(),
                        line: line.to_string(),
                        is_stderr: false,
                    });
                }
            }
            Err(err) => {
                warn!(task = %self.id, path = %self.log_file().display(), error = %err, "could not replay log file");
            }
        }
    }

    /// Sink for live output: writes the log file and forwards lines per
    /// output mode
    pub fn output_writer(&self) -> io::Result<TaskOutput> {
        let path = self.log_file();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let log = BufWriter::new(File::create(&path)?);
        Ok(TaskOutput {
            id: self.id.clone(),
            mode: self.output_logs,
            log: Some(log),
            buffered: Vec::new(),
            reporter: self.reporter.clone(),
        })
    }

    /// Store declared outputs plus the log file
    pub async fn save_outputs(&self, duration: Duration) -> Result<(), CacheError> {
        if self.caching_disabled || self.writes_disabled {
            return Ok(());
        }
        let Some(cache) = &self.cache else {
            return Ok(());
        };

        let mut files = expand_globs(&self.anchor, &self.outputs)
            .map_err(|e| CacheError::InvalidFilePath(e.to_string()))?;
        if self.log_file().is_file() {
            files.push(self.log_file.clone());
        }

        debug!(task = %self.id, hash = %self.hash, files = files.len(), "saving outputs");
        cache
            .put(&self.anchor, &self.hash, &files, duration.as_millis() as u64)
            .await
    }
}

/// Live output sink for one task
pub struct TaskOutput {
    id: TaskId,
    mode: OutputLogs,
    log: Option<BufWriter<File>>,
    buffered: Vec<(String, bool)>,
    reporter: Arc<dyn TaskReporter>,
}

impl TaskOutput {
    pub fn line(&mut self, line: &str, is_stderr: bool) {
        if let Some(log) = &mut self.log {
            if let Err(err) = writeln!(log, "{}", line) {
                warn!(task = %self.id, error = %err, "failed to write log file");
                self.log = None;
            }
        }

        match self.mode {
            OutputLogs::Full | OutputLogs::NewOnly => self.reporter.report(&TaskEvent::Output {
                id: self.id.clone(),
                line: line.to_string(),
                is_stderr,
            }),
            OutputLogs::ErrorsOnly => self.buffered.push((line.to_string(), is_stderr)),
            OutputLogs::HashOnly | OutputLogs::None => {}
        }
    }

    /// Flush the log; in `errors-only` mode a failed task's output is shown now
    pub fn finish(mut self, failed: bool) -> io::Result<()> {
        if failed && self.mode == OutputLogs::ErrorsOnly {
            for (line, is_stderr) in self.buffered.drain(..) {
                self.reporter.report(&TaskEvent::Output {
                    id: self.id.clone(),
                    line,
                    is_stderr,
                });
            }
        }
        match self.log.take() {
            Some(mut log) => log.flush(),
            None => Ok(()),
        }
    }
}
