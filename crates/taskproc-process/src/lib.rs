//! Process spawning primitives: a fluent `Command` builder, a `Child`
//! handle with graceful-shutdown semantics, and a `ProcessManager` that
//! tracks every child spawned during a session.

mod child;
mod command;
mod manager;

pub use child::{Child, ChildExit, ShutdownStyle};
pub use command::Command;
pub use manager::{Closed, Open, ProcessManager};
