//! The per-process state agent: a single task owns the submitted/
//! completed/poisoned counters, serializing every mutation through a
//! request channel the way the teacher models a dedicated "actor" for
//! child process bookkeeping in `turborepo-lib/src/process/child.rs`'s
//! `ChildStateManager`.

use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessState {
    pub submitted: u64,
    pub completed: u64,
    pub open_ports: u32,
    pub poisoned: bool,
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        self.poisoned && self.submitted == self.completed
    }
}

enum Event {
    IncSubmitted,
    IncCompleted,
    ClosePort,
    Snapshot(oneshot::Sender<ProcessState>),
}

/// A handle to the running state agent. Clone freely; every clone shares
/// the same underlying task.
#[derive(Clone)]
pub struct StateHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl StateHandle {
    pub fn inc_submitted(&self) {
        let _ = self.tx.send(Event::IncSubmitted);
    }

    pub fn inc_completed(&self) {
        let _ = self.tx.send(Event::IncCompleted);
    }

    pub fn close_port(&self) {
        let _ = self.tx.send(Event::ClosePort);
    }

    pub async fn snapshot(&self) -> ProcessState {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(Event::Snapshot(tx));
        rx.await.unwrap_or_default()
    }
}

/// Spawns the agent task and returns a handle plus a receiver that fires
/// exactly once, when the process reaches its terminal state
/// (`poisoned && submitted == completed`).
pub fn spawn(open_ports: u32) -> (StateHandle, oneshot::Receiver<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let (terminal_tx, terminal_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut state = ProcessState {
            open_ports,
            ..Default::default()
        };
        let mut terminal_tx = Some(terminal_tx);

        while let Some(event) = rx.recv().await {
            match event {
                Event::IncSubmitted => state.submitted += 1,
                Event::IncCompleted => state.completed += 1,
                Event::ClosePort => {
                    state.open_ports = state.open_ports.saturating_sub(1);
                    if state.open_ports == 0 {
                        state.poisoned = true;
                    }
                }
                Event::Snapshot(reply) => {
                    let _ = reply.send(state);
                    continue;
                }
            }
            if state.is_terminal() {
                if let Some(tx) = terminal_tx.take() {
                    let _ = tx.send(());
                }
            }
        }
    });

    (StateHandle { tx }, terminal_rx)
}
