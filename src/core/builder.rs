use std::sync::Arc;

use crate::{
    core::SupervisorConfig,
    exec::{ExecutorRef, ProcessExecutor},
    subscribers::Subscribe,
};

use super::supervisor::Supervisor;

/// Builder for constructing a [`Supervisor`].
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    executor: Option<ExecutorRef>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            executor: None,
        }
    }

    /// Sets event subscribers registered from the start.
    ///
    /// More can be added later with [`Supervisor::subscribe`] and [`Supervisor::on`].
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the default [`ProcessExecutor`].
    pub fn with_executor(mut self, executor: ExecutorRef) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Builds the supervisor.
    ///
    /// Must be called inside a tokio runtime: subscriber workers and the event
    /// listener are spawned here.
    pub fn build(self) -> Arc<Supervisor> {
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(ProcessExecutor::new(self.cfg.env.clone())));
        Supervisor::new_internal(self.cfg, self.subscribers, executor)
    }
}
