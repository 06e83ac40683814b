//! Hashing engine: global and per-task cache keys

use std::collections::{BTreeMap, HashMap};
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, instrument};
use twox_hash::XxHash64;

use baton_core::config::{EnvMode, GlobalConfig};
use baton_core::WorkspaceGraph;

use crate::env::{
    hashable_pass_through, resolve_env_mode, EnvError, EnvironmentVariableMap, BUILTIN_PASS_THROUGH,
};
use crate::files::{to_unix, FileHasher};
use crate::graph::{NodeIndex, TaskGraph};
use crate::task::{Pipeline, TaskId, TaskOutputs};

/// Salt mixed into every global hash; bump to invalidate all caches
pub const GLOBAL_CACHE_KEY: &str = "baton-cache-v1";

/// Errors while computing hashes
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("Input file not found: {0}")]
    MissingInput(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid glob: {0}")]
    Glob(String),

    #[error(transparent)]
    EnvPattern(#[from] EnvError),

    #[error("No hash recorded for dependency {0}")]
    MissingDependencyHash(TaskId),

    #[error("Unknown task node {0}")]
    UnknownNode(NodeIndex),
}

/// Digest bytes with xxHash64 (seed 0), rendered as 16 hex chars
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    format!("{:016x}", hasher.finish())
}

/// Length-prefixed, field-tagged byte encoder.
///
/// Every field is written under its schema position, so output depends on
/// the order of calls and never on map iteration. Callers sort maps and sets.
#[derive(Debug, Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn field(&mut self, tag: u8) -> &mut Self {
        self.buf.push(tag);
        self
    }

    fn str(&mut self, value: &str) -> &mut Self {
        self.buf.extend_from_slice(&(value.len() as u64).to_le_bytes());
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    fn bool(&mut self, value: bool) -> &mut Self {
        self.buf.push(value as u8);
        self
    }

    fn list(&mut self, items: &[String]) -> &mut Self {
        self.buf.extend_from_slice(&(items.len() as u64).to_le_bytes());
        for item in items {
            self.str(item);
        }
        self
    }

    fn opt_list(&mut self, items: Option<&[String]>) -> &mut Self {
        match items {
            Some(items) => {
                self.buf.push(1);
                self.list(items)
            }
            None => {
                self.buf.push(0);
                self
            }
        }
    }

    fn map(&mut self, map: &BTreeMap<String, String>) -> &mut Self {
        self.buf.extend_from_slice(&(map.len() as u64).to_le_bytes());
        for (key, value) in map {
            self.str(key);
            self.str(value);
        }
        self
    }

    fn finish(&self) -> String {
        digest(&self.buf)
    }
}

/// Hash of a sorted `path -> content hash` map
pub fn hash_file_map(files: &BTreeMap<String, String>) -> String {
    Encoder::default().map(files).finish()
}

/// Hash of resolved external dependencies (`name -> version`)
pub fn external_deps_hash(deps: &BTreeMap<String, String>) -> String {
    if deps.is_empty() {
        return String::new();
    }
    Encoder::default().map(deps).finish()
}

fn sorted(items: &[String]) -> Vec<String> {
    let mut items = items.to_vec();
    items.sort();
    items
}

/// Inputs shared by every task in a run
#[derive(Debug, Clone, Serialize)]
pub struct GlobalHashInputs {
    pub global_cache_key: String,
    pub global_file_hash_map: BTreeMap<String, String>,
    pub root_external_deps_hash: String,
    pub env: Vec<String>,
    pub resolved_env_vars: Vec<String>,
    pub pass_through_env: Option<Vec<String>>,
    pub env_mode: EnvMode,
    pub framework_inference: bool,
    pub dot_env: Vec<String>,
}

impl GlobalHashInputs {
    /// Gather global inputs from the repository and environment
    #[instrument(skip_all, fields(root = %workspaces.root().display()))]
    pub fn resolve(
        workspaces: &WorkspaceGraph,
        global: &GlobalConfig,
        env_mode: EnvMode,
        env: &EnvironmentVariableMap,
        files: &dyn FileHasher,
    ) -> Result<Self, HashError> {
        let root = workspaces.root();
        let mut global_file_hash_map = files.hash_globals(root, &global.dependencies)?;

        // .env files count as global inputs even in the legacy hash
        let present_dot_env: Vec<String> = global
            .dot_env
            .iter()
            .filter(|path| root.join(path).is_file())
            .cloned()
            .collect();
        global_file_hash_map.extend(files.hash_globals(root, &present_dot_env)?);

        let resolved = env.from_wildcards(&global.env)?;
        debug!(vars = ?resolved.names(), "global hash env vars");

        Ok(Self {
            global_cache_key: GLOBAL_CACHE_KEY.to_string(),
            global_file_hash_map,
            root_external_deps_hash: external_deps_hash(&global.external_dependencies),
            env: sorted(&global.env),
            resolved_env_vars: resolved.to_hashable(),
            pass_through_env: global.pass_through_env.as_deref().map(sorted),
            env_mode,
            framework_inference: global.framework_inference,
            dot_env: global.dot_env.iter().map(|p| to_unix(Path::new(p))).collect(),
        })
    }

    /// Whether the reduced legacy field set applies
    pub fn is_legacy(&self) -> bool {
        self.pass_through_env.is_none() && self.framework_inference
    }

    /// Compute the global hash.
    ///
    /// Without pass-through env and with framework inference on, only the
    /// legacy fields are hashed so earlier cache entries stay valid.
    pub fn calculate(&self) -> String {
        let mut enc = Encoder::default();
        if self.is_legacy() {
            enc.field(0).str(&self.global_cache_key);
            enc.field(1).map(&self.global_file_hash_map);
            enc.field(2).str(&self.root_external_deps_hash);
            enc.field(3).list(&self.resolved_env_vars);
            return enc.finish();
        }

        enc.field(0).str(&self.global_cache_key);
        enc.field(1).map(&self.global_file_hash_map);
        enc.field(2).str(&self.root_external_deps_hash);
        enc.field(3).list(&self.env);
        enc.field(4).list(&self.resolved_env_vars);
        enc.field(5).opt_list(self.pass_through_env.as_deref());
        enc.field(6).str(&self.env_mode.to_string());
        enc.field(7).bool(self.framework_inference);
        enc.field(8).list(&self.dot_env);
        enc.finish()
    }
}

/// Every input of one package-task, in schema order
#[derive(Debug, Clone, Serialize)]
pub struct TaskHashable {
    pub global_hash: String,
    pub task_dependency_hashes: Vec<String>,
    pub package_dir: String,
    pub hash_of_files: String,
    pub external_deps_hash: String,
    pub task: String,
    pub outputs: TaskOutputs,
    pub pass_through_args: Vec<String>,
    pub env: Vec<String>,
    pub resolved_env_vars: Vec<String>,
    pub pass_through_env: Option<Vec<String>>,
    pub env_mode: EnvMode,
    pub dot_env: Vec<String>,
}

impl TaskHashable {
    /// Digest the task inputs.
    ///
    /// Dependency hashes, outputs, env names are sorted here; pass-through
    /// args and dot_env keep their order.
    pub fn calculate(&self) -> String {
        let mut deps = self.task_dependency_hashes.clone();
        deps.sort();
        let outputs = self.outputs.sorted();

        let mut enc = Encoder::default();
        enc.field(0).str(&self.global_hash);
        enc.field(1).str(&self.package_dir);
        enc.field(2).str(&self.hash_of_files);
        enc.field(3).str(&self.external_deps_hash);
        enc.field(4).str(&self.task);
        enc.field(5).str(&self.env_mode.to_string());
        enc.field(6).list(&outputs.inclusions).list(&outputs.exclusions);
        enc.field(7).list(&deps);
        enc.field(8).list(&self.pass_through_args);
        enc.field(9).list(&sorted(&self.env));
        enc.field(10).opt_list(self.pass_through_env.as_deref());
        enc.field(11).list(&self.dot_env);
        enc.field(12).list(&self.resolved_env_vars);
        enc.finish()
    }
}

/// Result of hashing one node
#[derive(Debug, Clone)]
pub struct TaskHash {
    pub hash: String,
    /// Resolved env mode for this task
    pub env_mode: EnvMode,
    /// Environment handed to the child process
    pub env: EnvironmentVariableMap,
    /// Hashed inputs, kept for dry runs and summaries
    pub inputs: TaskHashable,
}

/// Computes and records task hashes for one run.
///
/// Shared between scheduler workers; package file hashes are memoized per
/// (package, inputs) pair.
pub struct TaskHasher {
    workspaces: Arc<WorkspaceGraph>,
    pipeline: Arc<Pipeline>,
    files: Arc<dyn FileHasher>,
    env: Arc<EnvironmentVariableMap>,
    global: GlobalConfig,
    env_mode: EnvMode,
    global_hash: String,
    pass_through_args: Vec<String>,
    file_hashes: Mutex<HashMap<(String, Vec<String>), String>>,
    task_hashes: Mutex<HashMap<TaskId, String>>,
}

impl TaskHasher {
    pub fn new(
        workspaces: Arc<WorkspaceGraph>,
        pipeline: Arc<Pipeline>,
        files: Arc<dyn FileHasher>,
        env: Arc<EnvironmentVariableMap>,
        global: GlobalConfig,
        env_mode: EnvMode,
        global_hash: String,
    ) -> Self {
        Self {
            workspaces,
            pipeline,
            files,
            env,
            global,
            env_mode,
            global_hash,
            pass_through_args: Vec::new(),
            file_hashes: Mutex::new(HashMap::new()),
            task_hashes: Mutex::new(HashMap::new()),
        }
    }

    /// Arguments appended to every command and hashed in order
    pub fn with_pass_through_args(mut self, args: Vec<String>) -> Self {
        self.pass_through_args = args;
        self
    }

    pub fn global_hash(&self) -> &str {
        &self.global_hash
    }

    pub fn pass_through_args(&self) -> &[String] {
        &self.pass_through_args
    }

    /// Previously recorded hash of a task
    pub fn recorded(&self, id: &TaskId) -> Option<String> {
        self.task_hashes.lock().ok()?.get(id).cloned()
    }

    fn package_file_hash(&self, package: &str, inputs: &[String]) -> Result<String, HashError> {
        let key = (package.to_string(), sorted(inputs));
        if let Some(hash) = self.file_hashes.lock().ok().and_then(|m| m.get(&key).cloned()) {
            return Ok(hash);
        }

        let dir = self
            .workspaces
            .absolute_dir(package)
            .unwrap_or_else(|| self.workspaces.root().to_path_buf());

        // Outputs of the package's own tasks never feed its default inputs
        let excludes: Vec<String> = if inputs.is_empty() {
            self.pipeline
                .tasks(package)
                .flat_map(|def| def.outputs.inclusions.iter().cloned())
                .collect()
        } else {
            Vec::new()
        };

        let files = self.files.hash_package(&dir, inputs, &excludes)?;
        let hash = hash_file_map(&files);
        if let Ok(mut memo) = self.file_hashes.lock() {
            memo.insert(key, hash.clone());
        }
        Ok(hash)
    }

    /// Hash one node. Every dependency must have been hashed first.
    #[instrument(skip_all, fields(task = tracing::field::Empty))]
    pub fn calculate(&self, graph: &TaskGraph, idx: NodeIndex) -> Result<TaskHash, HashError> {
        let node = graph.node(idx).ok_or(HashError::UnknownNode(idx))?;
        tracing::Span::current().record("task", tracing::field::display(&node.id));
        let def = &node.definition;

        let mut task_dependency_hashes = Vec::new();
        for dep in graph.dependency_indices(idx) {
            let dep_id = graph
                .node(dep)
                .map(|n| n.id.clone())
                .ok_or(HashError::UnknownNode(dep))?;
            let hash = self
                .recorded(&dep_id)
                .ok_or(HashError::MissingDependencyHash(dep_id))?;
            task_dependency_hashes.push(hash);
        }

        let workspace = self.workspaces.get(&node.id.package);
        let package_dir = workspace.map(|ws| to_unix(&ws.dir)).unwrap_or_default();
        let external = workspace
            .map(|ws| external_deps_hash(&ws.external_dependencies))
            .unwrap_or_default();

        let env_mode = resolve_env_mode(self.env_mode, def.pass_through_env.as_deref());
        let resolved = self.env.from_wildcards(&def.env)?;

        let inputs = TaskHashable {
            global_hash: self.global_hash.clone(),
            task_dependency_hashes,
            package_dir,
            hash_of_files: self.package_file_hash(&node.id.package, &def.inputs)?,
            external_deps_hash: external,
            task: def.name.clone(),
            outputs: def.outputs.sorted(),
            pass_through_args: self.pass_through_args.clone(),
            env: def.env.clone(),
            resolved_env_vars: resolved.to_hashable(),
            pass_through_env: hashable_pass_through(env_mode, def.pass_through_env.as_deref()),
            env_mode,
            dot_env: def.dot_env.clone(),
        };

        let hash = inputs.calculate();
        debug!(hash = %hash, env_mode = %env_mode, "calculated task hash");
        if let Ok(mut recorded) = self.task_hashes.lock() {
            recorded.insert(node.id.clone(), hash.clone());
        }

        let env = self.child_env(env_mode, &resolved, def.pass_through_env.as_deref())?;
        Ok(TaskHash {
            hash,
            env_mode,
            env,
            inputs,
        })
    }

    /// Environment for a child: everything in loose mode, an allow list in
    /// strict mode.
    fn child_env(
        &self,
        env_mode: EnvMode,
        declared: &EnvironmentVariableMap,
        pass_through: Option<&[String]>,
    ) -> Result<EnvironmentVariableMap, HashError> {
        if env_mode != EnvMode::Strict {
            return Ok((*self.env).clone());
        }

        let builtin: Vec<String> = BUILTIN_PASS_THROUGH.iter().map(|s| s.to_string()).collect();
        let mut child = self.env.from_wildcards(&builtin)?;
        child.union(&self.env.from_wildcards(&self.global.env)?);
        if let Some(global_pass) = &self.global.pass_through_env {
            child.union(&self.env.from_wildcards(global_pass)?);
        }
        child.union(declared);
        if let Some(pass) = pass_through {
            child.union(&self.env.from_wildcards(pass)?);
        }
        Ok(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::GlobFileHasher;
    use crate::graph::TaskGraphBuilder;
    use crate::task::TaskDefinition;
    use baton_core::monorepo::Workspace;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    struct Fixture {
        temp: TempDir,
        workspaces: Arc<WorkspaceGraph>,
        pipeline: Arc<Pipeline>,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "packages/util/index.js", "util");
        write(temp.path(), "apps/my-app/index.js", "app");
        let workspaces = WorkspaceGraph::new(
            temp.path(),
            vec![
                Workspace::new("util", "packages/util"),
                Workspace::new("my-app", "apps/my-app").with_dependencies(vec!["util".to_string()]),
            ],
        )
        .unwrap();

        let mut pipeline = Pipeline::new();
        pipeline.insert_all(
            &["util", "my-app"],
            TaskDefinition::new("build")
                .with_depends_on("^build")
                .with_outputs(vec!["dist/**".to_string()])
                .with_env(vec!["API_URL".to_string()]),
        );

        Fixture {
            temp,
            workspaces: Arc::new(workspaces),
            pipeline: Arc::new(pipeline),
        }
    }

    fn hash_all(fx: &Fixture, env: EnvironmentVariableMap, args: Vec<String>) -> BTreeMap<String, String> {
        let graph = TaskGraphBuilder::new(&fx.workspaces, &fx.pipeline)
            .with_tasks(vec!["build".to_string()])
            .build()
            .unwrap();
        let hasher = TaskHasher::new(
            fx.workspaces.clone(),
            fx.pipeline.clone(),
            Arc::new(GlobFileHasher),
            Arc::new(env),
            GlobalConfig::default(),
            EnvMode::Infer,
            "global".to_string(),
        )
        .with_pass_through_args(args);

        graph
            .sorted()
            .iter()
            .filter_map(|idx| {
                let node = graph.node(*idx)?;
                Some((node.id.to_string(), hasher.calculate(&graph, *idx).unwrap().hash))
            })
            .collect()
    }

    #[test]
    fn test_digest_format() {
        let hash = digest(b"hello");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, digest(b"hello"));
    }

    #[test]
    fn test_task_hash_is_deterministic() {
        let fx = fixture();
        let first = hash_all(&fx, EnvironmentVariableMap::default(), vec![]);
        let second = hash_all(&fx, EnvironmentVariableMap::default(), vec![]);
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_file_change_propagates_to_dependents_only() {
        let fx = fixture();
        let before = hash_all(&fx, EnvironmentVariableMap::default(), vec![]);

        write(fx.temp.path(), "apps/my-app/index.js", "changed");
        let after = hash_all(&fx, EnvironmentVariableMap::default(), vec![]);
        assert_eq!(before["util#build"], after["util#build"]);
        assert_ne!(before["my-app#build"], after["my-app#build"]);

        write(fx.temp.path(), "packages/util/index.js", "changed");
        let again = hash_all(&fx, EnvironmentVariableMap::default(), vec![]);
        assert_ne!(after["util#build"], again["util#build"]);
        assert_ne!(after["my-app#build"], again["my-app#build"]);
    }

    #[test]
    fn test_outputs_do_not_affect_file_hash() {
        let fx = fixture();
        let before = hash_all(&fx, EnvironmentVariableMap::default(), vec![]);
        write(fx.temp.path(), "packages/util/dist/index.js", "built");
        let after = hash_all(&fx, EnvironmentVariableMap::default(), vec![]);
        assert_eq!(before, after);
    }

    #[test]
    fn test_env_value_changes_hash() {
        let fx = fixture();
        let env = |v: &str| -> EnvironmentVariableMap {
            [("API_URL".to_string(), v.to_string())].into_iter().collect()
        };
        let a = hash_all(&fx, env("a"), vec![]);
        let b = hash_all(&fx, env("b"), vec![]);
        assert_ne!(a["util#build"], b["util#build"]);
    }

    #[test]
    fn test_pass_through_args_order_matters() {
        let fx = fixture();
        let ab = hash_all(&fx, EnvironmentVariableMap::default(), vec!["a".into(), "b".into()]);
        let ba = hash_all(&fx, EnvironmentVariableMap::default(), vec!["b".into(), "a".into()]);
        assert_ne!(ab["util#build"], ba["util#build"]);
    }

    fn hashable() -> TaskHashable {
        TaskHashable {
            global_hash: "g".to_string(),
            task_dependency_hashes: vec!["b".to_string(), "a".to_string()],
            package_dir: "packages/util".to_string(),
            hash_of_files: "f".to_string(),
            external_deps_hash: String::new(),
            task: "build".to_string(),
            outputs: TaskOutputs::from_globs(&["dist/**".to_string(), "lib/**".to_string()]),
            pass_through_args: vec![],
            env: vec!["B".to_string(), "A".to_string()],
            resolved_env_vars: vec![],
            pass_through_env: None,
            env_mode: EnvMode::Loose,
            dot_env: vec![".env".to_string(), ".env.local".to_string()],
        }
    }

    #[test]
    fn test_unordered_fields_are_sorted() {
        let base = hashable();
        let mut shuffled = hashable();
        shuffled.task_dependency_hashes.reverse();
        shuffled.env.reverse();
        shuffled.outputs.inclusions.reverse();
        assert_eq!(base.calculate(), shuffled.calculate());
    }

    #[test]
    fn test_dot_env_order_matters() {
        let base = hashable();
        let mut reordered = hashable();
        reordered.dot_env.reverse();
        assert_ne!(base.calculate(), reordered.calculate());
    }

    fn global_inputs() -> GlobalHashInputs {
        GlobalHashInputs {
            global_cache_key: GLOBAL_CACHE_KEY.to_string(),
            global_file_hash_map: BTreeMap::new(),
            root_external_deps_hash: String::new(),
            env: vec![],
            resolved_env_vars: vec![],
            pass_through_env: None,
            env_mode: EnvMode::Infer,
            framework_inference: true,
            dot_env: vec![],
        }
    }

    #[test]
    fn test_legacy_global_hash_ignores_env_mode() {
        let infer = global_inputs();
        let mut strict = global_inputs();
        strict.env_mode = EnvMode::Strict;
        assert!(infer.is_legacy());
        assert_eq!(infer.calculate(), strict.calculate());

        let mut full = global_inputs();
        full.pass_through_env = Some(vec![]);
        assert!(!full.is_legacy());
        assert_ne!(infer.calculate(), full.calculate());

        let mut full_strict = full.clone();
        full_strict.env_mode = EnvMode::Strict;
        assert_ne!(full.calculate(), full_strict.calculate());
    }

    #[test]
    fn test_global_resolve_includes_files_and_dot_env() {
        let fx = fixture();
        write(fx.temp.path(), "tsconfig.json", "{}");
        write(fx.temp.path(), ".env", "A=1");
        let global = GlobalConfig {
            dependencies: vec!["tsconfig.json".to_string()],
            dot_env: vec![".env".to_string(), ".env.missing".to_string()],
            ..Default::default()
        };

        let inputs = GlobalHashInputs::resolve(
            &fx.workspaces,
            &global,
            EnvMode::Infer,
            &EnvironmentVariableMap::default(),
            &GlobFileHasher,
        )
        .unwrap();
        assert!(inputs.global_file_hash_map.contains_key("tsconfig.json"));
        assert!(inputs.global_file_hash_map.contains_key(".env"));
        assert_eq!(inputs.dot_env, vec![".env", ".env.missing"]);
    }

    #[test]
    fn test_strict_child_env_is_filtered() {
        let fx = fixture();
        let env: EnvironmentVariableMap = [
            ("PATH", "/bin"),
            ("API_URL", "x"),
            ("SECRET", "s"),
            ("AWS_KEY", "k"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let mut pipeline = Pipeline::new();
        let mut def = TaskDefinition::new("build").with_env(vec!["API_URL".to_string()]);
        def.pass_through_env = Some(vec!["AWS_*".to_string()]);
        pipeline.insert_all(&["util", "my-app"], def);
        let pipeline = Arc::new(pipeline);

        let graph = TaskGraphBuilder::new(&fx.workspaces, &pipeline)
            .with_tasks(vec!["build".to_string()])
            .build()
            .unwrap();
        let hasher = TaskHasher::new(
            fx.workspaces.clone(),
            pipeline.clone(),
            Arc::new(GlobFileHasher),
            Arc::new(env),
            GlobalConfig::default(),
            EnvMode::Infer,
            "global".to_string(),
        );
        let idx = graph.index_of(&TaskId::new("util", "build")).unwrap();
        let hashed = hasher.calculate(&graph, idx).unwrap();
        assert_eq!(hashed.env_mode, EnvMode::Strict);
        assert_eq!(hashed.env.names(), vec!["API_URL", "AWS_KEY", "PATH"]);
    }

    #[test]
    fn test_missing_dependency_hash() {
        let fx = fixture();
        let graph = TaskGraphBuilder::new(&fx.workspaces, &fx.pipeline)
            .with_tasks(vec!["build".to_string()])
            .build()
            .unwrap();
        let hasher = TaskHasher::new(
            fx.workspaces.clone(),
            fx.pipeline.clone(),
            Arc::new(GlobFileHasher),
            Arc::new(EnvironmentVariableMap::default()),
            GlobalConfig::default(),
            EnvMode::Infer,
            "global".to_string(),
        );
        let idx = graph.index_of(&TaskId::new("my-app", "build")).unwrap();
        assert!(matches!(
            hasher.calculate(&graph, idx),
            Err(HashError::MissingDependencyHash(_))
        ));
    }
}
