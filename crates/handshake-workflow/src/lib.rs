//! Scripted handshake workflows.
//!
//! A `WorkflowTrace` is an ordered list of actions (send, receive, generic
//! receive, wait). `WorkflowExecutor` runs it against a `Connection`,
//! threading one `Context` through every action and recording each outcome
//! back into the trace, where a `TraceInspector` can query it.

pub mod abort;
pub mod action;
pub mod executor;
pub mod inspector;
mod run;
pub mod trace;

pub use abort::{AbortHandle, AbortSignal, abort_pair};
pub use action::{Action, ActionOutcome, Expect};
pub use executor::{ExecutionResult, WorkflowExecutor};
pub use inspector::{MessagesOf, TraceInspector};
pub use trace::{TracedAction, WorkflowTrace};
