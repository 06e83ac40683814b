//! Run command: execute tasks across the workspace

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, ValueEnum};
use console::style;
use tokio_util::sync::CancellationToken;

use baton_core::config::{load_config_from_dir, repo_root, EnvMode, LogOrder, OutputLogs};
use baton_core::WorkspaceGraph;
use baton_tasks::scheduler::PlannedTask;
use baton_tasks::{
    open_cache, CacheError, CacheOpts, ColorSelector, EnvironmentVariableMap, GlobFileHasher,
    GlobalHashInputs, Pipeline, RunCache, RunCacheOpts, RunContext, SchedulerOptions, TaskGraph,
    TaskHasher, TaskReporter, TaskReporterRegistry, TaskScheduler,
};

use crate::cli::output::{self, ConsoleReporter};
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes;

/// Run tasks across the workspace
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Tasks to run (e.g., build test lint)
    #[arg(required = true)]
    pub tasks: Vec<String>,

    /// Restrict to packages: `name`, `name...` (with its dependencies) or
    /// `...name` (with its dependents). Can be repeated.
    #[arg(short = 'F', long)]
    pub filter: Vec<String>,

    /// Maximum concurrent tasks
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Continue running other tasks when one fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Start every task at once, ignoring dependency order
    #[arg(long)]
    pub parallel: bool,

    /// Ignore existing cache entries and run everything
    #[arg(long)]
    pub force: bool,

    /// Do not write task outputs to the cache
    #[arg(long)]
    pub no_cache: bool,

    /// Only use the remote cache
    #[arg(long)]
    pub remote_only: bool,

    /// Override the output mode of every task
    #[arg(long)]
    pub output_logs: Option<OutputLogsArg>,

    /// How task output is ordered on the terminal
    #[arg(long)]
    pub log_order: Option<LogOrderArg>,

    /// Override how environment variables reach tasks
    #[arg(long)]
    pub env_mode: Option<EnvModeArg>,

    /// Only follow dependencies on the requested tasks
    #[arg(long)]
    pub only: bool,

    /// Show the execution plan without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Write a JSON run summary to .baton/runs/
    #[arg(long)]
    pub summarize: bool,

    /// Arguments passed to every task command
    #[arg(last = true)]
    pub pass_through_args: Vec<String>,
}

/// `--output-logs` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputLogsArg {
    Full,
    None,
    HashOnly,
    NewOnly,
    ErrorsOnly,
}

impl From<OutputLogsArg> for OutputLogs {
    fn from(arg: OutputLogsArg) -> Self {
        match arg {
            OutputLogsArg::Full => OutputLogs::Full,
            OutputLogsArg::None => OutputLogs::None,
            OutputLogsArg::HashOnly => OutputLogs::HashOnly,
            OutputLogsArg::NewOnly => OutputLogs::NewOnly,
            OutputLogsArg::ErrorsOnly => OutputLogs::ErrorsOnly,
        }
    }
}

/// `--log-order` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogOrderArg {
    Stream,
    Grouped,
}

impl From<LogOrderArg> for LogOrder {
    fn from(arg: LogOrderArg) -> Self {
        match arg {
            LogOrderArg::Stream => LogOrder::Stream,
            LogOrderArg::Grouped => LogOrder::Grouped,
        }
    }
}

/// `--env-mode` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EnvModeArg {
    Infer,
    Loose,
    Strict,
}

impl From<EnvModeArg> for EnvMode {
    fn from(arg: EnvModeArg) -> Self {
        match arg {
            EnvModeArg::Infer => EnvMode::Infer,
            EnvModeArg::Loose => EnvMode::Loose,
            EnvModeArg::Strict => EnvMode::Strict,
        }
    }
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let cwd = std::env::current_dir()?;
        let (config, config_path) = load_config_from_dir(&cwd)?;
        let root = repo_root(&config_path);
        let json = cli.format == OutputFormat::Json;

        let workspaces = Arc::new(WorkspaceGraph::from_config(&root, &config)?);
        let scope = resolve_filter(&workspaces, &self.filter)?;
        let pipeline = Arc::new(Pipeline::from_config(
            &config,
            workspaces.sorted().iter().map(String::as_str),
        ));

        let graph = Arc::new(
            TaskGraph::builder(&workspaces, &pipeline)
                .with_scope(scope)
                .with_tasks(self.tasks.clone())
                .with_tasks_only(self.only)
                .build()?,
        );
        if graph.is_empty() {
            if !cli.quiet {
                output::info("No tasks to run.");
            }
            return Ok(exit_codes::SUCCESS);
        }

        let env_mode = self.env_mode.map(EnvMode::from).unwrap_or(config.env_mode);
        let env = Arc::new(EnvironmentVariableMap::infer());
        let files = Arc::new(GlobFileHasher);
        let global_hash = GlobalHashInputs::resolve(&workspaces, &config.global, env_mode, &env, files.as_ref())
            .context("failed to hash global inputs")?
            .calculate();
        tracing::debug!(global_hash = %global_hash, "resolved global hash");

        let hasher = Arc::new(
            TaskHasher::new(
                workspaces.clone(),
                pipeline.clone(),
                files,
                env,
                config.global.clone(),
                env_mode,
                global_hash,
            )
            .with_pass_through_args(self.pass_through_args.clone()),
        );

        let colors = Arc::new(ColorSelector::default());
        let mut registry = TaskReporterRegistry::new();
        if !cli.quiet && !json {
            let log_order = self.log_order.map(LogOrder::from).unwrap_or(config.tasks.log_order);
            registry.register(Arc::new(ConsoleReporter::new(colors.clone(), log_order, cli.verbose)));
        }
        let reporter: Arc<dyn TaskReporter> = Arc::new(registry);

        let cache = if self.dry_run || !config.tasks.cache.enabled {
            None
        } else {
            let mut opts = CacheOpts::from_config(&root, &config.tasks.cache);
            opts.skip_filesystem |= self.remote_only;
            match open_cache(&opts) {
                Ok(cache) => Some(cache),
                Err(CacheError::NoCachesEnabled) => {
                    tracing::warn!("no cache backends enabled, running without a cache");
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to open cache");
                    if !cli.quiet && !json {
                        output::warning(&format!("Cache unavailable, running without it: {}", e));
                    }
                    None
                }
            }
        };

        let run_cache = Arc::new(RunCache::new(
            cache,
            &root,
            RunCacheOpts {
                skip_reads: self.force,
                skip_writes: self.no_cache,
                output_logs_override: self.output_logs.map(OutputLogs::from),
            },
            config.tasks.output_logs,
            reporter.clone(),
        ));

        let token = CancellationToken::new();
        let ctx = Arc::new(
            RunContext::new(workspaces, graph.clone(), hasher, run_cache, reporter)
                .with_colors(colors)
                .with_cancel_token(token.clone()),
        );

        let options = SchedulerOptions {
            concurrency: self.concurrency.unwrap_or(config.tasks.concurrency),
            continue_on_error: self.continue_on_error || config.tasks.continue_on_error,
            parallel: self.parallel || config.tasks.parallel,
            ..SchedulerOptions::default()
        };
        let scheduler = TaskScheduler::new(ctx, options);

        if self.dry_run {
            let plan = scheduler.plan().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan);
            }
            return Ok(exit_codes::SUCCESS);
        }

        let ctrl_c = {
            let token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, cancelling run");
                    token.cancel();
                }
            })
        };

        let summary = scheduler.run().await;
        ctrl_c.abort();
        let summary = summary?;

        if json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else if !cli.quiet {
            println!();
            println!("{}", summary);
        }

        if self.summarize {
            let path = summary.write_json(&root).context("failed to write run summary")?;
            if !cli.quiet && !json {
                println!(
                    "{}",
                    output::key_value("Summary", &output::path_style().apply_to(path.display()).to_string())
                );
            }
        }

        if token.is_cancelled() {
            return Ok(exit_codes::CANCELLED);
        }
        Ok(summary.exit_code())
    }
}

/// Expand `--filter` entries into a package scope. No filters selects every
/// package.
pub fn resolve_filter(workspaces: &WorkspaceGraph, filters: &[String]) -> anyhow::Result<Vec<String>> {
    if filters.is_empty() {
        return Ok(workspaces.sorted().to_vec());
    }

    let graph = workspaces.graph();
    let mut selected = BTreeSet::new();
    for filter in filters {
        let (name, with_dependents, with_dependencies) = if let Some(name) = filter.strip_prefix("...") {
            (name, true, false)
        } else if let Some(name) = filter.strip_suffix("...") {
            (name, false, true)
        } else {
            (filter.as_str(), false, false)
        };

        if workspaces.get(name).is_none() {
            bail!("No package matches filter '{}'", filter);
        }
        selected.insert(name.to_string());
        if with_dependencies {
            selected.extend(graph.get_all_dependencies(name));
        }
        if with_dependents {
            selected.extend(graph.get_all_dependents(name));
        }
    }

    // Keep topological order
    Ok(workspaces
        .sorted()
        .iter()
        .filter(|name| selected.contains(*name))
        .cloned()
        .collect())
}

fn print_plan(plan: &[PlannedTask]) {
    println!(
        "{}",
        output::header(&format!("{} task{} would run", plan.len(), if plan.len() == 1 { "" } else { "s" }))
    );
    for task in plan {
        println!();
        println!("  {}", style(&task.task_id).bold());
        let mut fields = vec![
            ("Hash", output::hash_style().apply_to(&task.hash).to_string()),
            ("Command", task.command.clone().unwrap_or_else(|| "<none>".to_string())),
            ("Directory", output::path_style().apply_to(&task.directory).to_string()),
            ("Log file", output::path_style().apply_to(&task.log_file).to_string()),
            ("Env mode", task.env_mode.to_string()),
        ];
        for (key, values) in [
            ("Outputs", &task.outputs),
            ("Dependencies", &task.dependencies),
            ("Dependents", &task.dependents),
        ] {
            if !values.is_empty() {
                fields.push((key, values.join(", ")));
            }
        }
        for (key, value) in fields {
            println!("  {}", output::key_value(key, &value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_core::Workspace;

    fn workspaces() -> WorkspaceGraph {
        WorkspaceGraph::new(
            "/repo",
            vec![
                Workspace::new("core", "packages/core"),
                Workspace::new("util", "packages/util").with_dependencies(vec!["core".to_string()]),
                Workspace::new("my-app", "apps/my-app").with_dependencies(vec!["util".to_string()]),
                Workspace::new("docs", "apps/docs"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_no_filter_selects_everything() {
        let ws = workspaces();
        assert_eq!(resolve_filter(&ws, &[]).unwrap().len(), 4);
    }

    #[test]
    fn test_filter_with_dependencies() {
        let ws = workspaces();
        let scope = resolve_filter(&ws, &["my-app...".to_string()]).unwrap();
        assert_eq!(scope, vec!["core", "util", "my-app"]);
    }

    #[test]
    fn test_filter_with_dependents() {
        let ws = workspaces();
        let scope = resolve_filter(&ws, &["...util".to_string(), "docs".to_string()]).unwrap();
        assert!(scope.contains(&"util".to_string()));
        assert!(scope.contains(&"my-app".to_string()));
        assert!(scope.contains(&"docs".to_string()));
        assert!(!scope.contains(&"core".to_string()));
    }

    #[test]
    fn test_unknown_filter() {
        let ws = workspaces();
        let err = resolve_filter(&ws, &["nope".to_string()]).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_value_enums_convert() {
        assert_eq!(OutputLogs::from(OutputLogsArg::HashOnly), OutputLogs::HashOnly);
        assert_eq!(LogOrder::from(LogOrderArg::Grouped), LogOrder::Grouped);
        assert_eq!(EnvMode::from(EnvModeArg::Strict), EnvMode::Strict);
    }
}
