//! Tracks every child spawned during a session so they can all be
//! stopped or waited on together. Mirrors
//! `turborepo-lib/src/process/mod.rs`'s typestate manager.

use std::time::Duration;

use camino::Utf8PathBuf;
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::child::{Child, ChildExit, ShutdownStyle};
use crate::command::Command;

pub struct Open(Vec<Child>);
pub struct Closed;

pub struct ProcessManager<T> {
    state: T,
}

impl Default for ProcessManager<Closed> {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessManager<Closed> {
    pub fn new() -> Self {
        ProcessManager { state: Closed }
    }

    pub fn start(self) -> ProcessManager<Open> {
        ProcessManager {
            state: Open(Vec::new()),
        }
    }
}

impl ProcessManager<Open> {
    /// Spawn a child, streaming its output to the given paths, and start
    /// tracking it for a later `stop`/`wait`.
    pub async fn spawn(
        &mut self,
        command: Command,
        timeout: Duration,
        stdout_path: Utf8PathBuf,
        stderr_path: Utf8PathBuf,
    ) -> std::io::Result<Child> {
        let child = Child::spawn(
            command,
            ShutdownStyle::Graceful(timeout),
            stdout_path,
            stderr_path,
        )
        .await?;
        self.state.0.push(child.clone());
        Ok(child)
    }

    /// Stop every tracked child (SIGINT then kill on timeout).
    pub async fn stop(self) -> ProcessManager<Closed> {
        let mut set = JoinSet::new();
        for mut child in self.state.0.into_iter() {
            set.spawn(async move { child.stop().await });
        }
        debug!("waiting for {} processes to exit", set.len());
        while let Some(out) = set.join_next().await {
            trace!("process exited: {:?}", out);
        }
        ProcessManager { state: Closed }
    }

    /// Wait for every tracked child to exit on its own.
    pub async fn wait(self) -> ProcessManager<Closed> {
        let mut set: JoinSet<ChildExit> = JoinSet::new();
        for mut child in self.state.0.into_iter() {
            set.spawn(async move { child.wait().await });
        }
        debug!("waiting for {} processes to exit", set.len());
        while let Some(out) = set.join_next().await {
            trace!("process exited: {:?}", out);
        }
        ProcessManager { state: Closed }
    }
}
