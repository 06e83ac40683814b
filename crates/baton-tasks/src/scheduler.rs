//! Task scheduler: dependency-ordered async execution with tokio

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use baton_core::config::{defaults::default_concurrency, EnvMode};
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::CacheHitMetadata;
use crate::context::RunContext;
use crate::files::to_unix;
use crate::graph::{GraphError, NodeIndex, TaskNode};
use crate::hash::{HashError, TaskHash, TaskHashable};
use crate::process::{spawn_task_process, ChildExit, ProcessError, ProcessSpec, DEFAULT_GRACE_PERIOD};
use crate::reporter::TaskEvent;
use crate::run_cache::log_file_path;
use crate::summary::RunSummary;
use crate::task::TaskId;

/// Set in every child's environment to the task's hash
pub const HASH_ENV_VAR: &str = "BATON_HASH";

const DEPENDENCY_FAILED: &str = "dependency failed";
const RUN_STOPPED: &str = "run stopped after a failure";
const RUN_CANCELLED: &str = "run cancelled";

/// Result of a single task execution
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Task that was executed
    pub id: TaskId,
    pub status: TaskStatus,
    /// Absent when the task was never hashed
    pub hash: Option<String>,
    pub duration: Duration,
    pub exit_code: Option<i32>,
    /// Where a cache hit came from
    pub cache: Option<CacheHitMetadata>,
    /// Captured output of a task that ran and failed, relative to the repo root
    pub log_file: Option<PathBuf>,
}

/// Task execution status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task ran and exited zero
    Success,
    /// Outputs were restored from the cache
    CacheHit,
    /// Task failed; holds the error text
    Failed(String),
    /// Task never started; holds the reason
    Skipped(String),
}

impl TaskStatus {
    /// Check if this status represents success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::CacheHit)
    }
}

/// Run-level failures. Per-task errors end up in [`TaskStatus::Failed`].
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Failed to write task log: {0}")]
    Log(#[from] std::io::Error),

    #[error("Task worker failed: {0}")]
    Worker(String),
}

/// Options for the task scheduler
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum tasks running at once
    pub concurrency: usize,
    /// Keep running independent tasks after a failure
    pub continue_on_error: bool,
    /// Start every task at once, ignoring dependency order
    pub parallel: bool,
    /// Time between interrupt and kill on cancellation
    pub grace_period: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            continue_on_error: false,
            parallel: false,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// One entry of a dry run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTask {
    pub task_id: String,
    pub package: String,
    pub task: String,
    pub hash: String,
    pub command: Option<String>,
    pub directory: String,
    pub outputs: Vec<String>,
    pub log_file: String,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub env_mode: EnvMode,
    pub hash_inputs: TaskHashable,
}

/// Walks the task graph, running each node once its dependencies are done
pub struct TaskScheduler {
    ctx: Arc<RunContext>,
    options: SchedulerOptions,
}

impl TaskScheduler {
    pub fn new(ctx: Arc<RunContext>, options: SchedulerOptions) -> Self {
        Self { ctx, options }
    }

    /// Execute the graph, drain pending cache uploads and summarise
    pub async fn run(&self) -> Result<RunSummary, SchedulerError> {
        let started_at = Utc::now();
        let start = Instant::now();
        let results = self.execute().await?;
        self.ctx.run_cache.shutdown().await;
        Ok(RunSummary::new(
            &results,
            started_at,
            start.elapsed(),
            self.ctx.hasher.global_hash(),
        ))
    }

    /// Execute every node; results come back in topological order
    #[instrument(skip_all, fields(tasks = self.ctx.graph.len(), concurrency = self.options.concurrency))]
    pub async fn execute(&self) -> Result<Vec<TaskResult>, SchedulerError> {
        let graph = self.ctx.graph.clone();
        graph.validate_concurrency(self.options.concurrency)?;

        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let run_token = self.ctx.cancel_token().clone();
        // Stops dispatch; cancelled with the run token or on a failure
        let stop = run_token.child_token();

        // In parallel mode nothing waits for its dependencies, so hashes are
        // computed up front in dependency order.
        let mut prehashed = if self.options.parallel {
            self.hash_all().await?
        } else {
            HashMap::new()
        };

        let mut remaining: HashMap<NodeIndex, usize> = HashMap::new();
        let mut ready: VecDeque<NodeIndex> = VecDeque::new();
        for &idx in graph.sorted() {
            let count = if self.options.parallel {
                0
            } else {
                graph.dependency_indices(idx).count()
            };
            if count == 0 {
                ready.push_back(idx);
            }
            remaining.insert(idx, count);
        }

        let mut results: HashMap<NodeIndex, TaskResult> = HashMap::new();
        let mut failed: Vec<NodeIndex> = Vec::new();
        let mut running: JoinSet<(NodeIndex, std::thread::Result<Option<TaskResult>>)> = JoinSet::new();

        loop {
            while !stop.is_cancelled() {
                let Some(idx) = ready.pop_front() else { break };
                if results.contains_key(&idx) {
                    continue;
                }
                let worker = NodeWorker {
                    ctx: self.ctx.clone(),
                    idx,
                    semaphore: semaphore.clone(),
                    stop: stop.clone(),
                    grace: self.options.grace_period,
                    prehashed: prehashed.remove(&idx),
                };
                running.spawn(async move { (idx, AssertUnwindSafe(worker.run()).catch_unwind().await) });
            }

            let Some(joined) = running.join_next().await else { break };
            let (idx, outcome) = match joined {
                Ok(joined) => joined,
                Err(err) => {
                    warn!(error = %err, "task worker did not finish");
                    continue;
                }
            };

            let result = match outcome {
                Ok(Some(result)) => result,
                // Never started; skipped below
                Ok(None) => continue,
                Err(_) => self.panicked(idx),
            };

            let is_failure = matches!(result.status, TaskStatus::Failed(_));
            results.insert(idx, result);

            if is_failure {
                failed.push(idx);
                if self.options.continue_on_error {
                    for dependent in graph.transitive_dependents(idx) {
                        if !results.contains_key(&dependent) {
                            let skipped = self.skip(dependent, DEPENDENCY_FAILED);
                            results.insert(dependent, skipped);
                        }
                    }
                } else if !stop.is_cancelled() {
                    info!("task failed, not starting any more tasks");
                    stop.cancel();
                }
                continue;
            }

            for dependent in graph.dependent_indices(idx) {
                if let Some(count) = remaining.get_mut(&dependent) {
                    if *count > 0 {
                        *count -= 1;
                        if *count == 0 {
                            ready.push_back(dependent);
                        }
                    }
                }
            }
        }

        let blocked: BTreeSet<NodeIndex> = failed
            .iter()
            .flat_map(|idx| graph.transitive_dependents(*idx))
            .collect();
        for &idx in graph.sorted() {
            if results.contains_key(&idx) {
                continue;
            }
            let reason = if blocked.contains(&idx) {
                DEPENDENCY_FAILED
            } else if run_token.is_cancelled() {
                RUN_CANCELLED
            } else {
                RUN_STOPPED
            };
            let skipped = self.skip(idx, reason);
            results.insert(idx, skipped);
        }

        let ordered: Vec<TaskResult> = graph
            .sorted()
            .iter()
            .filter_map(|idx| results.remove(idx))
            .collect();

        self.ctx.reporter.report(&TaskEvent::RunCompleted {
            total: ordered.len(),
            succeeded: ordered.iter().filter(|r| r.status.is_success()).count(),
            failed: ordered
                .iter()
                .filter(|r| matches!(r.status, TaskStatus::Failed(_)))
                .count(),
            cached: ordered
                .iter()
                .filter(|r| r.status == TaskStatus::CacheHit)
                .count(),
            duration: start.elapsed(),
        });

        Ok(ordered)
    }

    /// Hash every node without running anything
    pub async fn plan(&self) -> Result<Vec<PlannedTask>, SchedulerError> {
        let mut hashes = self.hash_all().await?;
        let graph = &self.ctx.graph;
        let mut plan = Vec::with_capacity(graph.len());

        for &idx in graph.sorted() {
            let (Some(node), Some(hashed)) = (graph.node(idx), hashes.remove(&idx)) else {
                continue;
            };
            let hashed = hashed?;
            let dir = self.package_dir(&node.id);
            let def = &node.definition;
            let mut outputs = def.outputs.inclusions.clone();
            outputs.extend(def.outputs.exclusions.iter().map(|g| format!("!{}", g)));

            plan.push(PlannedTask {
                task_id: node.id.to_string(),
                package: node.id.package.clone(),
                task: node.id.task.clone(),
                hash: hashed.hash,
                command: def.command.clone(),
                directory: to_unix(&dir),
                outputs,
                log_file: to_unix(&log_file_path(&dir, &def.name)),
                dependencies: graph.dependencies(&node.id).iter().map(|d| d.to_string()).collect(),
                dependents: graph.dependents(&node.id).iter().map(|d| d.to_string()).collect(),
                env_mode: hashed.env_mode,
                hash_inputs: hashed.inputs,
            });
        }
        Ok(plan)
    }

    async fn hash_all(&self) -> Result<HashMap<NodeIndex, Result<TaskHash, HashError>>, SchedulerError> {
        let ctx = self.ctx.clone();
        tokio::task::spawn_blocking(move || {
            ctx.graph
                .sorted()
                .iter()
                .map(|&idx| (idx, ctx.hasher.calculate(&ctx.graph, idx)))
                .collect()
        })
        .await
        .map_err(|e| SchedulerError::Worker(e.to_string()))
    }

    fn package_dir(&self, id: &TaskId) -> PathBuf {
        self.ctx
            .workspaces
            .get(&id.package)
            .map(|ws| ws.dir.clone())
            .unwrap_or_default()
    }

    fn skip(&self, idx: NodeIndex, reason: &str) -> TaskResult {
        let id = self.task_id(idx);
        self.ctx.reporter.report(&TaskEvent::Skipped {
            id: id.clone(),
            reason: reason.to_string(),
        });
        TaskResult {
            id,
            status: TaskStatus::Skipped(reason.to_string()),
            hash: self.ctx.hasher.recorded(&self.task_id(idx)),
            duration: Duration::ZERO,
            exit_code: None,
            cache: None,
            log_file: None,
        }
    }

    fn panicked(&self, idx: NodeIndex) -> TaskResult {
        let id = self.task_id(idx);
        let error = "task worker panicked".to_string();
        self.ctx.reporter.report(&TaskEvent::Failed {
            id: id.clone(),
            duration: Duration::ZERO,
            error: error.clone(),
            exit_code: None,
        });
        TaskResult {
            id,
            status: TaskStatus::Failed(error),
            hash: None,
            duration: Duration::ZERO,
            exit_code: None,
            cache: None,
            log_file: None,
        }
    }

    fn task_id(&self, idx: NodeIndex) -> TaskId {
        self.ctx
            .graph
            .node(idx)
            .map(|n| n.id.clone())
            .unwrap_or_else(|| TaskId::new("", idx.index().to_string()))
    }
}

/// Carries one node from hashing to completion
struct NodeWorker {
    ctx: Arc<RunContext>,
    idx: NodeIndex,
    semaphore: Arc<Semaphore>,
    stop: CancellationToken,
    grace: Duration,
    prehashed: Option<Result<TaskHash, HashError>>,
}

impl NodeWorker {
    /// `None` when the node never started
    async fn run(mut self) -> Option<TaskResult> {
        let node = self.ctx.graph.node(self.idx)?.clone();

        let _permit = tokio::select! {
            biased;
            _ = self.stop.cancelled() => return None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok()?,
        };

        let start = Instant::now();
        self.ctx.reporter.report(&TaskEvent::Hashing { id: node.id.clone() });
        let task_hash = match self.hash().await {
            Ok(task_hash) => task_hash,
            Err(err) => return Some(self.fail(&node.id, None, start, err)),
        };

        match self.execute(&node, &task_hash, start).await {
            Ok(result) => result,
            Err(err) => Some(self.fail(&node.id, Some(task_hash.hash), start, err)),
        }
    }

    async fn hash(&mut self) -> Result<TaskHash, SchedulerError> {
        if let Some(prehashed) = self.prehashed.take() {
            return Ok(prehashed?);
        }
        let ctx = self.ctx.clone();
        let idx = self.idx;
        let hashed = tokio::task::spawn_blocking(move || ctx.hasher.calculate(&ctx.graph, idx))
            .await
            .map_err(|e| SchedulerError::Worker(e.to_string()))?;
        Ok(hashed?)
    }

    async fn execute(
        &self,
        node: &TaskNode,
        task_hash: &TaskHash,
        start: Instant,
    ) -> Result<Option<TaskResult>, SchedulerError> {
        let ctx = &self.ctx;
        let id = &node.id;
        let def = &node.definition;
        let hash = task_hash.hash.clone();
        let package_dir = ctx
            .workspaces
            .get(&id.package)
            .map(|ws| ws.dir.clone())
            .unwrap_or_default();

        let result = |status: TaskStatus, exit_code: Option<i32>, cache: Option<CacheHitMetadata>| TaskResult {
            id: id.clone(),
            status,
            hash: Some(hash.clone()),
            duration: start.elapsed(),
            exit_code,
            cache,
            log_file: None,
        };

        let Some(command) = def.command.as_deref() else {
            debug!(task = %id, "no command, nothing to run");
            ctx.reporter.report(&TaskEvent::Completed {
                id: id.clone(),
                duration: start.elapsed(),
                cached: false,
            });
            return Ok(Some(result(TaskStatus::Success, None, None)));
        };

        let task_cache = ctx.run_cache.task_cache(id, def, &package_dir, &hash);
        if let Some(hit) = task_cache.restore_outputs().await {
            ctx.reporter.report(&TaskEvent::CacheHit {
                id: id.clone(),
                hash: hash.clone(),
                source: hit.source,
                time_saved: Duration::from_millis(hit.time_saved),
            });
            ctx.reporter.report(&TaskEvent::Completed {
                id: id.clone(),
                duration: start.elapsed(),
                cached: true,
            });
            return Ok(Some(result(TaskStatus::CacheHit, None, Some(hit))));
        }
        ctx.reporter.report(&TaskEvent::CacheMiss {
            id: id.clone(),
            hash: hash.clone(),
        });

        if ctx.cancel_token().is_cancelled() {
            return Ok(None);
        }

        let mut env: BTreeMap<String, String> = (*task_hash.env).clone();
        env.insert(HASH_ENV_VAR.to_string(), hash.clone());
        let mut spec = ProcessSpec::new(command, &ctx.root().join(&package_dir))
            .with_env(env, task_hash.env_mode == EnvMode::Strict);
        // Pass-through args are hashed for every task but only handed to the
        // tasks that were asked for
        if ctx.graph.is_requested(id) {
            spec = spec.with_args(ctx.hasher.pass_through_args().to_vec());
        }

        ctx.reporter.report(&TaskEvent::Started {
            id: id.clone(),
            command: spec.command_line(),
        });

        let mut output = task_cache.output_writer()?;
        let process = spawn_task_process(&spec)?;
        let exit = process
            .wait_with_cancel(ctx.cancel_token(), self.grace, |line| {
                output.line(&line.line, line.is_stderr)
            })
            .await?;
        let duration = start.elapsed();
        output.finish(!exit.is_success())?;

        let (error, exit_code) = match exit {
            ChildExit::Finished(Some(0)) => {
                if let Err(err) = task_cache.save_outputs(duration).await {
                    warn!(task = %id, error = %err, "failed to cache outputs");
                }
                ctx.reporter.report(&TaskEvent::Completed {
                    id: id.clone(),
                    duration,
                    cached: false,
                });
                return Ok(Some(result(TaskStatus::Success, Some(0), None)));
            }
            ChildExit::Finished(Some(code)) => (format!("command exited with code {}", code), Some(code)),
            ChildExit::Finished(None) => ("command terminated by a signal".to_string(), None),
            ChildExit::Interrupted | ChildExit::Killed => ("interrupted".to_string(), None),
            ChildExit::Failed => ("could not read the command's exit status".to_string(), None),
        };

        ctx.reporter.report(&TaskEvent::Failed {
            id: id.clone(),
            duration,
            error: error.clone(),
            exit_code,
        });
        Ok(Some(TaskResult {
            log_file: Some(log_file_path(&package_dir, &def.name)),
            ..result(TaskStatus::Failed(error), exit_code, None)
        }))
    }

    fn fail(&self, id: &TaskId, hash: Option<String>, start: Instant, err: SchedulerError) -> TaskResult {
        let duration = start.elapsed();
        let error = err.to_string();
        self.ctx.reporter.report(&TaskEvent::Failed {
            id: id.clone(),
            duration,
            error: error.clone(),
            exit_code: None,
        });
        TaskResult {
            id: id.clone(),
            status: TaskStatus::Failed(error),
            hash,
            duration,
            exit_code: None,
            cache: None,
            log_file: None,
        }
    }
}


#[cfg(all(test, unix))]
mod run_tests {
    use super::*;
    use crate::cache::{CacheBackend, FsCache};
    use crate::env::EnvironmentVariableMap;
    use crate::files::GlobFileHasher;
    use crate::graph::TaskGraph;
    use crate::hash::TaskHasher;
    use crate::reporter::CollectingReporter;
    use crate::run_cache::{RunCache, RunCacheOpts};
    use crate::task::{Pipeline, TaskDefinition};
    use baton_core::config::{GlobalConfig, OutputLogs};
    use baton_core::monorepo::Workspace;
    use baton_core::WorkspaceGraph;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        workspaces: Arc<WorkspaceGraph>,
    }

    impl Fixture {
        fn new(packages: &[(&str, &[&str])]) -> Self {
            let temp = TempDir::new().unwrap();
            let workspaces = packages
                .iter()
                .map(|(name, deps)| {
                    let dir = temp.path().join("packages").join(name);
                    fs::create_dir_all(&dir).unwrap();
                    fs::write(dir.join("src.txt"), format!("source of {}", name)).unwrap();
                    Workspace::new(*name, format!("packages/{}", name))
                        .with_dependencies(deps.iter().map(|d| d.to_string()).collect())
                })
                .collect();
            let workspaces = Arc::new(WorkspaceGraph::new(temp.path(), workspaces).unwrap());
            Self { temp, workspaces }
        }

        fn app_and_util() -> Self {
            Self::new(&[("util", &[]), ("my-app", &["util"])])
        }

        fn context(
            &self,
            pipeline: Pipeline,
            cache_opts: RunCacheOpts,
        ) -> (Arc<RunContext>, Arc<CollectingReporter>) {
            let scope = self.workspaces.sorted().to_vec();
            self.scoped_context(pipeline, cache_opts, scope, Vec::new())
        }

        fn scoped_context(
            &self,
            pipeline: Pipeline,
            cache_opts: RunCacheOpts,
            scope: Vec<String>,
            args: Vec<String>,
        ) -> (Arc<RunContext>, Arc<CollectingReporter>) {
            let pipeline = Arc::new(pipeline);
            let graph = TaskGraph::builder(&self.workspaces, &pipeline)
                .with_tasks(vec!["build".to_string()])
                .with_scope(scope)
                .build()
                .unwrap();
            let hasher = TaskHasher::new(
                self.workspaces.clone(),
                pipeline.clone(),
                Arc::new(GlobFileHasher),
                Arc::new(EnvironmentVariableMap::infer()),
                GlobalConfig::default(),
                EnvMode::Infer,
                "global".to_string(),
            )
            .with_pass_through_args(args);
            let reporter = Arc::new(CollectingReporter::default());
            let cache: Arc<dyn CacheBackend> = Arc::new(FsCache::new(&self.temp.path().join(".baton/cache")));
            let run_cache = RunCache::new(
                Some(cache),
                self.temp.path(),
                cache_opts,
                OutputLogs::Full,
                reporter.clone(),
            );
            let ctx = RunContext::new(
                self.workspaces.clone(),
                Arc::new(graph),
                Arc::new(hasher),
                Arc::new(run_cache),
                reporter.clone(),
            );
            (Arc::new(ctx), reporter)
        }

        fn order(&self) -> Vec<String> {
            fs::read_to_string(self.temp.path().join("order.txt"))
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn build(command: &str) -> TaskDefinition {
        TaskDefinition::new("build")
            .with_command(command)
            .with_depends_on("^build")
            .with_outputs(vec!["dist/**".to_string()])
    }

    fn logged(name: &str) -> TaskDefinition {
        build(&format!(
            "echo {0}-start >> ../../order.txt && sleep 0.2 && mkdir -p dist && echo {0} > dist/out.txt && echo {0}-end >> ../../order.txt",
            name
        ))
    }

    fn pipeline(defs: Vec<(&str, TaskDefinition)>) -> Pipeline {
        let mut pipeline = Pipeline::new();
        for (ws, def) in defs {
            pipeline.insert(ws, def);
        }
        pipeline
    }

    fn status_of<'a>(results: &'a [TaskResult], pkg: &str) -> &'a TaskStatus {
        &results.iter().find(|r| r.id.package == pkg).unwrap().status
    }

    fn count(reporter: &CollectingReporter, f: fn(&TaskEvent) -> bool) -> usize {
        reporter.events().iter().filter(|e| f(e)).count()
    }

    #[tokio::test]
    async fn test_forced_run_respects_dependency_order() {
        let fx = Fixture::app_and_util();
        let opts = RunCacheOpts {
            skip_reads: true,
            ..Default::default()
        };
        let (ctx, reporter) = fx.context(
            pipeline(vec![("util", logged("util")), ("my-app", logged("my-app"))]),
            opts,
        );

        let summary = TaskScheduler::new(ctx, SchedulerOptions::default())
            .run()
            .await
            .unwrap();

        assert_eq!(count(&reporter, |e| matches!(e, TaskEvent::CacheMiss { .. })), 2);
        assert_eq!(fx.order(), vec!["util-start", "util-end", "my-app-start", "my-app-end"]);
        assert!(summary.to_string().contains("2 successful, 2 total"));
        assert_eq!(summary.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_second_run_restores_from_cache() {
        let fx = Fixture::app_and_util();
        let defs = || pipeline(vec![("util", logged("util")), ("my-app", logged("my-app"))]);

        let (ctx, _) = fx.context(defs(), RunCacheOpts::default());
        let first = TaskScheduler::new(ctx, SchedulerOptions::default()).execute().await.unwrap();
        assert!(first.iter().all(|r| r.status == TaskStatus::Success));
        fs::remove_dir_all(fx.temp.path().join("packages/util/dist")).unwrap();

        let (ctx, reporter) = fx.context(defs(), RunCacheOpts::default());
        let second = TaskScheduler::new(ctx, SchedulerOptions::default()).execute().await.unwrap();

        assert!(second.iter().all(|r| r.status == TaskStatus::CacheHit));
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.hash, b.hash);
        }
        assert_eq!(fx.order().len(), 4);
        assert_eq!(count(&reporter, |e| matches!(e, TaskEvent::Started { .. })), 0);
        assert_eq!(
            fs::read_to_string(fx.temp.path().join("packages/util/dist/out.txt")).unwrap(),
            "util\n"
        );
        assert!(reporter
            .lines_for(&TaskId::new("util", "build"))
            .iter()
            .any(|l| l.starts_with("cache hit, replaying logs")));
    }

    #[tokio::test]
    async fn test_failure_skips_dependents() {
        let fx = Fixture::app_and_util();
        let (ctx, reporter) = fx.context(
            pipeline(vec![("util", build("exit 3")), ("my-app", logged("my-app"))]),
            RunCacheOpts::default(),
        );

        let summary = TaskScheduler::new(ctx, SchedulerOptions::default()).run().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.exit_code(), 3);
        assert!(fx.order().is_empty());
        assert_eq!(count(&reporter, |e| matches!(e, TaskEvent::Started { .. })), 1);
        assert_eq!(summary.tasks[1].error.as_deref(), Some(DEPENDENCY_FAILED));

        let log_file = summary.tasks[0].log_file.as_deref().unwrap();
        assert_eq!(log_file, "packages/util/.baton/build.log");
        assert!(fx.temp.path().join(log_file).is_file());
        assert!(summary.tasks[1].log_file.is_none());
    }

    #[tokio::test]
    async fn test_continue_on_error_runs_independent_branches() {
        let fx = Fixture::new(&[("util", &[]), ("my-app", &["util"]), ("docs", &[])]);
        let (ctx, _) = fx.context(
            pipeline(vec![
                ("util", build("echo broken >&2; exit 1")),
                ("my-app", logged("my-app")),
                ("docs", logged("docs")),
            ]),
            RunCacheOpts::default(),
        );
        let opts = SchedulerOptions {
            continue_on_error: true,
            ..Default::default()
        };

        let results = TaskScheduler::new(ctx, opts).execute().await.unwrap();

        assert_eq!(status_of(&results, "docs"), &TaskStatus::Success);
        assert_eq!(
            status_of(&results, "util"),
            &TaskStatus::Failed("command exited with code 1".to_string())
        );
        assert_eq!(
            status_of(&results, "my-app"),
            &TaskStatus::Skipped(DEPENDENCY_FAILED.to_string())
        );
    }

    #[tokio::test]
    async fn test_parallel_ignores_dependency_order() {
        let fx = Fixture::app_and_util();
        let (ctx, _) = fx.context(
            pipeline(vec![
                ("util", build("sleep 0.5 && echo util-end >> ../../order.txt")),
                ("my-app", build("echo my-app-start >> ../../order.txt")),
            ]),
            RunCacheOpts::default(),
        );
        let opts = SchedulerOptions {
            parallel: true,
            ..Default::default()
        };

        let results = TaskScheduler::new(ctx, opts).execute().await.unwrap();

        assert!(results.iter().all(|r| r.status == TaskStatus::Success));
        assert_eq!(fx.order(), vec!["my-app-start", "util-end"]);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_running_tasks() {
        let fx = Fixture::app_and_util();
        let (ctx, _) = fx.context(
            pipeline(vec![("util", build("sleep 30")), ("my-app", logged("my-app"))]),
            RunCacheOpts::default(),
        );
        let opts = SchedulerOptions {
            grace_period: Duration::from_secs(1),
            ..Default::default()
        };

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let results = TaskScheduler::new(ctx, opts).execute().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(status_of(&results, "util"), &TaskStatus::Failed("interrupted".to_string()));
        assert!(matches!(status_of(&results, "my-app"), TaskStatus::Skipped(_)));
    }

    #[tokio::test]
    async fn test_child_sees_task_hash() {
        let fx = Fixture::new(&[("util", &[])]);
        let (ctx, reporter) = fx.context(
            pipeline(vec![("util", build("echo hash=$BATON_HASH"))]),
            RunCacheOpts::default(),
        );

        let results = TaskScheduler::new(ctx, SchedulerOptions::default()).execute().await.unwrap();

        let hash = results[0].hash.clone().unwrap();
        let lines = reporter.lines_for(&TaskId::new("util", "build"));
        assert!(lines.contains(&format!("hash={}", hash)));
    }

    #[tokio::test]
    async fn test_pass_through_args_reach_only_requested_tasks() {
        let fx = Fixture::app_and_util();
        let (ctx, reporter) = fx.scoped_context(
            pipeline(vec![("util", build("echo args:")), ("my-app", build("echo args:"))]),
            RunCacheOpts::default(),
            vec!["my-app".to_string()],
            vec!["--watch=false".to_string()],
        );

        let results = TaskScheduler::new(ctx, SchedulerOptions::default()).execute().await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == TaskStatus::Success));
        assert!(reporter
            .lines_for(&TaskId::new("my-app", "build"))
            .contains(&"args: --watch=false".to_string()));
        let util = reporter.lines_for(&TaskId::new("util", "build"));
        assert!(util.contains(&"args:".to_string()));
        assert!(!util.iter().any(|l| l.contains("--watch")));
    }

    #[tokio::test]
    async fn test_task_without_command_is_a_no_op() {
        let fx = Fixture::app_and_util();
        let (ctx, reporter) = fx.context(
            pipeline(vec![
                ("util", TaskDefinition::new("build")),
                ("my-app", logged("my-app")),
            ]),
            RunCacheOpts::default(),
        );

        let results = TaskScheduler::new(ctx, SchedulerOptions::default()).execute().await.unwrap();

        assert!(results.iter().all(|r| r.status == TaskStatus::Success));
        assert!(results[0].hash.is_some());
        assert_eq!(count(&reporter, |e| matches!(e, TaskEvent::Started { .. })), 1);
    }

    #[tokio::test]
    async fn test_missing_input_fails_only_that_branch() {
        let fx = Fixture::app_and_util();
        let (ctx, _) = fx.context(
            pipeline(vec![
                ("util", logged("util").with_inputs(vec!["missing.txt".to_string()])),
                ("my-app", logged("my-app")),
            ]),
            RunCacheOpts::default(),
        );

        let results = TaskScheduler::new(ctx, SchedulerOptions::default()).execute().await.unwrap();

        match status_of(&results, "util") {
            TaskStatus::Failed(error) => assert!(error.contains("missing.txt")),
            other => panic!("unexpected status {:?}", other),
        }
        assert!(matches!(status_of(&results, "my-app"), TaskStatus::Skipped(_)));
        assert!(fx.order().is_empty());
    }

    #[tokio::test]
    async fn test_persistent_tasks_need_free_slots() {
        let fx = Fixture::new(&[("util", &[])]);
        let (ctx, _) = fx.context(
            pipeline(vec![("util", build("sleep 1").with_persistent(true))]),
            RunCacheOpts::default(),
        );
        let opts = SchedulerOptions {
            concurrency: 1,
            ..Default::default()
        };

        let err = TaskScheduler::new(ctx, opts).execute().await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Graph(GraphError::PersistentConcurrency { .. })
        ));
    }

    #[tokio::test]
    async fn test_plan_hashes_without_running() {
        let fx = Fixture::app_and_util();
        let (ctx, reporter) = fx.context(
            pipeline(vec![("util", logged("util")), ("my-app", logged("my-app"))]),
            RunCacheOpts::default(),
        );

        let plan = TaskScheduler::new(ctx, SchedulerOptions::default()).plan().await.unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].task_id, "util#build");
        assert_eq!(plan[1].dependencies, vec!["util#build"]);
        assert_eq!(plan[0].dependents, vec!["my-app#build"]);
        assert_eq!(plan[0].log_file, "packages/util/.baton/build.log");
        assert_eq!(plan[1].hash_inputs.task_dependency_hashes, vec![plan[0].hash.clone()]);
        assert!(fx.order().is_empty());
        assert!(reporter.events().is_empty());
    }
}
