//! A single spawned child process, its shutdown behavior, and the
//! plumbing that streams its stdout/stderr to files as it runs.
//!
//! Grounded on `turborepo-lib/src/process/child.rs`: a process group is
//! created on unix so a graceful shutdown can signal the whole group, and
//! a timeout upgrades to a hard kill if the signal is not honored in
//! time. The PTY-backed interactive path in the teacher is not needed
//! here (tasks are always run non-interactively) and is dropped.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::command::Command;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChildExit {
    Finished(Option<i32>),
    Killed,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub enum ShutdownStyle {
    Graceful(Duration),
    Kill,
}

impl ShutdownStyle {
    async fn process(&self, child: &mut tokio::process::Child) -> ChildExit {
        match self {
            ShutdownStyle::Graceful(timeout) => {
                #[cfg(unix)]
                {
                    let fut = async {
                        if let Some(pid) = child.id() {
                            debug!("sending SIGINT to process group {pid}");
                            let pgid = -(pid as i32);
                            unsafe {
                                libc::kill(pgid, libc::SIGINT);
                            }
                            child.wait().await
                        } else {
                            Ok(std::process::ExitStatus::default())
                        }
                    };
                    match tokio::time::timeout(*timeout, fut).await {
                        Ok(Ok(_)) => ChildExit::Killed,
                        Ok(Err(_)) => ChildExit::Failed,
                        Err(_) => {
                            debug!("graceful shutdown timed out, killing");
                            match child.kill().await {
                                Ok(()) => ChildExit::Killed,
                                Err(_) => ChildExit::Failed,
                            }
                        }
                    }
                }
                #[cfg(not(unix))]
                {
                    match child.kill().await {
                        Ok(()) => ChildExit::Killed,
                        Err(_) => ChildExit::Failed,
                    }
                }
            }
            ShutdownStyle::Kill => match child.kill().await {
                Ok(()) => ChildExit::Killed,
                Err(_) => ChildExit::Failed,
            },
        }
    }
}

struct Inner {
    child: Option<tokio::process::Child>,
    pid: Option<u32>,
}

/// A handle to a spawned process. Cheaply cloneable; every clone shares
/// the same underlying child and exit watch channel, the way the
/// teacher's `Child` does.
#[derive(Clone)]
pub struct Child {
    inner: Arc<Mutex<Inner>>,
    shutdown_style: ShutdownStyle,
    exit_rx: watch::Receiver<Option<ChildExit>>,
}

impl Child {
    /// Spawn `command`, streaming its stdout/stderr into the files at
    /// `stdout_path`/`stderr_path` as the process runs. Returns the
    /// handle immediately; completion is observed through
    /// [`Child::wait`] or the exit watch channel.
    pub async fn spawn(
        command: Command,
        shutdown_style: ShutdownStyle,
        stdout_path: Utf8PathBuf,
        stderr_path: Utf8PathBuf,
    ) -> std::io::Result<Self> {
        let mut tokio_command: tokio::process::Command = command.into();
        #[cfg(unix)]
        {
            use nix_setsid::pre_exec_setsid;
            unsafe {
                tokio_command.pre_exec(pre_exec_setsid);
            }
        }

        let mut child = tokio_command.spawn()?;
        let pid = child.id();
        let stdout = child.stdout.take().expect("stdout must be piped");
        let stderr = child.stderr.take().expect("stderr must be piped");

        let (exit_tx, exit_rx) = watch::channel(None);

        tokio::spawn(forward_stream(stdout, stdout_path));
        tokio::spawn(forward_stream(stderr, stderr_path));

        let inner = Arc::new(Mutex::new(Inner {
            child: Some(child),
            pid,
        }));

        let handle = Child {
            inner: inner.clone(),
            shutdown_style,
            exit_rx,
        };

        tokio::spawn(async move {
            let mut guard = inner.lock().await;
            if let Some(child) = guard.child.as_mut() {
                let status = child.wait().await;
                let exit = match status {
                    Ok(status) => ChildExit::Finished(status.code()),
                    Err(_) => ChildExit::Failed,
                };
                let _ = exit_tx.send(Some(exit));
            }
        });

        Ok(handle)
    }

    pub async fn pid(&self) -> Option<u32> {
        self.inner.lock().await.pid
    }

    /// Wait for the process to exit on its own.
    pub async fn wait(&mut self) -> ChildExit {
        let mut rx = self.exit_rx.clone();
        loop {
            if let Some(exit) = *rx.borrow() {
                return exit;
            }
            if rx.changed().await.is_err() {
                return ChildExit::Failed;
            }
        }
    }

    /// Stop the process per its configured [`ShutdownStyle`].
    pub async fn stop(&mut self) -> ChildExit {
        let already_exited = *self.exit_rx.borrow();
        if let Some(exit) = already_exited {
            return exit;
        }
        let mut guard = self.inner.lock().await;
        if let Some(child) = guard.child.as_mut() {
            self.shutdown_style.process(child).await
        } else {
            ChildExit::Failed
        }
    }
}

async fn forward_stream<R>(mut reader: R, path: Utf8PathBuf)
where
    R: tokio::io::AsyncRead + Unpin,
{
    if let Ok(mut file) = tokio::fs::File::create(&path).await {
        let _ = tokio::io::copy(&mut reader, &mut file).await;
        let _ = file.flush().await;
    }
}

#[cfg(unix)]
mod nix_setsid {
    pub unsafe fn pre_exec_setsid() -> std::io::Result<()> {
        if libc::setsid() == -1 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}
