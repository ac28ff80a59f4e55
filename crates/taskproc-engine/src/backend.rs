//! The Executor contract the engine consumes (§6), and the bundled local
//! backend that implements it by spawning `.command.sh` through
//! `taskproc_process`.

use std::collections::BTreeMap;
use std::time::Duration;

use camino::Utf8Path;
use taskproc_process::{Command, ProcessManager};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskCompletion {
    pub exit_status: i32,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to prepare or run the task: {0}")]
    Io(#[from] std::io::Error),
}

/// What the engine needs from a backend: run a resolved command under a
/// work directory and report its exit status. Cluster/cloud backends
/// implement the same trait; only `LocalExecutor` ships here.
#[allow(async_fn_in_trait)]
pub trait Executor: Send + Sync {
    fn is_foreign_file(&self, path: &Utf8Path) -> bool;

    async fn submit(
        &self,
        resolved_command: &str,
        shell: &str,
        work_dir: &Utf8Path,
        env: &BTreeMap<String, String>,
    ) -> Result<TaskCompletion, ExecutorError>;
}

/// Prepend a `#!` line if the script lacks one, per `SPEC_FULL.md` §6.
pub fn ensure_shebang(script: &str, shell: &str) -> String {
    let trimmed = script.trim_end();
    let body = if trimmed.starts_with("#!") {
        return format!("{trimmed}\n");
    } else {
        trimmed
    };
    let shebang = if shell.starts_with('/') {
        format!("#!{shell}")
    } else {
        format!("#!/usr/bin/env {shell}")
    };
    format!("{shebang}\n{body}\n")
}

pub struct LocalExecutor {
    manager: Mutex<Option<ProcessManager<taskproc_process::Open>>>,
    shutdown_timeout: Duration,
}

impl LocalExecutor {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            manager: Mutex::new(Some(ProcessManager::new().start())),
            shutdown_timeout,
        }
    }

    pub async fn shutdown(&self) {
        let mut guard = self.manager.lock().await;
        if let Some(manager) = guard.take() {
            manager.stop().await;
        }
    }
}

impl Executor for LocalExecutor {
    fn is_foreign_file(&self, _path: &Utf8Path) -> bool {
        false
    }

    async fn submit(
        &self,
        resolved_command: &str,
        shell: &str,
        work_dir: &Utf8Path,
        env: &BTreeMap<String, String>,
    ) -> Result<TaskCompletion, ExecutorError> {
        let script_path = work_dir.join(".command.sh");
        let stdout_path = work_dir.join(".command.out");
        let stderr_path = work_dir.join(".command.err");
        let exitcode_path = work_dir.join(".exitcode");

        let script = ensure_shebang(resolved_command, shell);
        tokio::fs::write(&script_path, script).await?;
        make_executable(&script_path).await?;

        let command = Command::new(shell)
            .args([script_path.as_str()])
            .current_dir(work_dir.to_path_buf())
            .envs(env.clone());

        let mut guard = self.manager.lock().await;
        let manager = guard.as_mut().expect("executor used after shutdown");
        let mut child = manager
            .spawn(command, self.shutdown_timeout, stdout_path, stderr_path)
            .await?;
        drop(guard);

        let exit = child.wait().await;
        let exit_status = match exit {
            taskproc_process::ChildExit::Finished(Some(code)) => code,
            taskproc_process::ChildExit::Finished(None) => -1,
            taskproc_process::ChildExit::Killed | taskproc_process::ChildExit::Failed => -1,
        };

        tokio::fs::write(&exitcode_path, exit_status.to_string()).await?;
        Ok(TaskCompletion { exit_status })
    }
}

#[cfg(unix)]
async fn make_executable(path: &Utf8Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(perms.mode() | 0o100);
    tokio::fs::set_permissions(path, perms).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Utf8Path) -> std::io::Result<()> {
    Ok(())
}
