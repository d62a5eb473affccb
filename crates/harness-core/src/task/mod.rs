//! Concurrent execution of test bodies
//!
//! [`TaskRunner`] launches a body as a tokio task with resolved arguments
//! and hands back an id. The body's outcome travels back through a one-shot
//! channel and is collected with [`TaskRunner::wait`].

mod args;
mod command;
mod runner;

pub use args::{ArgumentError, ResolvedArgs, TaskArgs, TaskSignature};
pub use command::{CommandOutput, OutputLine, command_signature, run_command};
pub use runner::{TaskFailure, TaskId, TaskOutcome, TaskRunner, TaskState};
