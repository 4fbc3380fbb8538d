//! # Environment handed to child processes.
//!
//! Children never inherit the parent's environment wholesale. They start from
//! an empty environment, receive the variables named in [`ExecEnv::passthrough`]
//! (copied from the parent when present) and then the explicit [`ExecEnv::vars`].

use std::path::PathBuf;

use tokio::process::Command;

/// Environment and working directory applied to every spawned process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecEnv {
    /// Names of parent variables copied into the child, if set.
    pub passthrough: Vec<String>,
    /// Explicit variables; applied after `passthrough` and win on conflict.
    pub vars: Vec<(String, String)>,
    /// Working directory for the child (`None` = the parent's).
    pub cwd: Option<PathBuf>,
}

impl ExecEnv {
    /// An environment with nothing inherited and nothing set.
    pub fn empty() -> Self {
        Self {
            passthrough: Vec::new(),
            vars: Vec::new(),
            cwd: None,
        }
    }

    /// Adds a parent variable to copy through.
    pub fn pass(mut self, name: impl Into<String>) -> Self {
        self.passthrough.push(name.into());
        self
    }

    /// Sets an explicit variable.
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.push((key.into(), value.into()));
        self
    }

    /// Sets the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Applies the environment to `cmd`.
    pub(crate) fn apply(&self, cmd: &mut Command) {
        cmd.env_clear();
        for name in &self.passthrough {
            if let Some(value) = std::env::var_os(name) {
                cmd.env(name, value);
            }
        }
        for (key, value) in &self.vars {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
    }
}

impl Default for ExecEnv {
    /// Passes through `PATH` (needed to resolve bare program names), `HOME` and `LANG`.
    fn default() -> Self {
        Self::empty().pass("PATH").pass("HOME").pass("LANG")
    }
}
