//! State shared by everything taking part in one run

use std::path::Path;
use std::sync::Arc;

use baton_core::WorkspaceGraph;
use tokio_util::sync::CancellationToken;

use crate::color::ColorSelector;
use crate::graph::TaskGraph;
use crate::hash::TaskHasher;
use crate::reporter::TaskReporter;
use crate::run_cache::RunCache;

/// Built once per run and handed to the scheduler and its workers.
///
/// Everything here is read-only during execution except the colour cache
/// and the cancellation token.
pub struct RunContext {
    pub workspaces: Arc<WorkspaceGraph>,
    pub graph: Arc<TaskGraph>,
    pub hasher: Arc<TaskHasher>,
    pub run_cache: Arc<RunCache>,
    pub reporter: Arc<dyn TaskReporter>,
    pub colors: Arc<ColorSelector>,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(
        workspaces: Arc<WorkspaceGraph>,
        graph: Arc<TaskGraph>,
        hasher: Arc<TaskHasher>,
        run_cache: Arc<RunCache>,
        reporter: Arc<dyn TaskReporter>,
    ) -> Self {
        Self {
            workspaces,
            graph,
            hasher,
            run_cache,
            reporter,
            colors: Arc::new(ColorSelector::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_colors(mut self, colors: Arc<ColorSelector>) -> Self {
        self.colors = colors;
        self
    }

    /// Use an externally owned token, e.g. one wired to Ctrl-C
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop dispatching and interrupt running tasks
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn root(&self) -> &Path {
        self.workspaces.root()
    }
}
