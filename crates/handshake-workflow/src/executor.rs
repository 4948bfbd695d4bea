//! Runs a workflow trace against a connection.

use handshake_core::{ActionError, ConfigError, ConnectionConfig, Context, MessageCodec, RunId};
use handshake_transport::{Connection, TcpConnection};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::Instrument;

use crate::{
    abort::AbortSignal,
    action::{Action, ActionOutcome},
    run::{ContextGuard, Run, wait},
    trace::WorkflowTrace,
};

/// Summary of one `execute` call. Per-action detail lives in the trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Id of the context the run used.
    pub run_id: RunId,
    /// Every action ran and succeeded.
    pub completed: bool,
    /// Index of the action that halted the run.
    pub failed_at: Option<usize>,
    /// Why the run halted.
    pub error: Option<ActionError>,
}

impl ExecutionResult {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.completed
    }
}

/// Drives traces of `C::Message` actions, one run at a time per call.
pub struct WorkflowExecutor<C: MessageCodec> {
    codec: C,
    abort: Option<AbortSignal>,
}

impl<C: MessageCodec> WorkflowExecutor<C> {
    #[must_use]
    pub const fn new(codec: C) -> Self {
        Self { codec, abort: None }
    }

    /// Observe `signal` between actions and during waits.
    #[must_use]
    pub fn with_abort(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }

    #[must_use]
    pub const fn codec(&self) -> &C {
        &self.codec
    }

    /// Validate `config` and run `trace` over a fresh TCP connection.
    ///
    /// # Errors
    /// Returns error if the connection parameters are invalid. Nothing is
    /// sent and the trace is left untouched in that case. Failures during
    /// the run are reported in the `ExecutionResult` instead.
    pub async fn execute(
        &self,
        ctx: &mut Context,
        config: &ConnectionConfig,
        trace: &mut WorkflowTrace<C::Message>,
    ) -> Result<ExecutionResult, ConfigError> {
        config.validate()?;
        Ok(self
            .execute_on(ctx, TcpConnection::new(config.clone()), trace)
            .await)
    }

    /// Run `trace` over `conn`, which is closed before this returns (or when
    /// the returned future is dropped).
    ///
    /// Actions that already carry an outcome are skipped, so a trace halted
    /// by cancellation can be resumed with a new connection. A trace whose
    /// recorded outcomes include a failure reports that failure again
    /// without any I/O.
    pub async fn execute_on<T: Connection>(
        &self,
        ctx: &mut Context,
        conn: T,
        trace: &mut WorkflowTrace<C::Message>,
    ) -> ExecutionResult {
        let span = tracing::info_span!("workflow", run_id = %ctx.id());
        self.run(ctx, conn, trace).instrument(span).await
    }

    async fn run<T: Connection>(
        &self,
        ctx: &mut Context,
        conn: T,
        trace: &mut WorkflowTrace<C::Message>,
    ) -> ExecutionResult {
        let mut ctx = ContextGuard::activate(ctx);
        let run_id = ctx.id();
        let mut abort = self.abort.clone();
        let mut run = Run::new(&self.codec, conn);
        tracing::info!(actions = trace.len(), "Starting workflow");

        let mut halted = None;
        for index in 0..trace.len() {
            if let Some(recorded) = trace.outcome(index) {
                if let Some(error) = &recorded.error {
                    tracing::debug!(index, "Trace already halted here");
                    halted = Some((index, error.clone()));
                    break;
                }
                continue;
            }
            if abort.as_ref().is_some_and(AbortSignal::is_aborted) {
                tracing::info!(index, "Workflow cancelled");
                halted = Some((index, ActionError::Cancelled));
                break;
            }

            let outcome = match trace.get(index) {
                Some(traced) => {
                    tracing::debug!(index, action = traced.action.name(), "Running action");
                    perform(&mut run, &traced.action, &mut ctx, abort.as_mut()).await
                }
                None => break,
            };

            let failure = outcome.error.clone();
            trace.record(index, outcome);
            if let Some(error) = failure {
                tracing::warn!(index, "Action failed: {error}");
                halted = Some((index, error));
                break;
            }
        }

        let stats = run.release();
        drop(ctx);

        let result = match halted {
            Some((index, error)) => ExecutionResult {
                run_id,
                completed: false,
                failed_at: Some(index),
                error: Some(error),
            },
            None => ExecutionResult {
                run_id,
                completed: true,
                failed_at: None,
                error: None,
            },
        };
        tracing::info!(
            completed = result.completed,
            failed_at = ?result.failed_at,
            bytes_sent = stats.bytes_sent,
            bytes_received = stats.bytes_received,
            "Workflow finished"
        );
        result
    }
}

async fn perform<C: MessageCodec, T: Connection>(
    run: &mut Run<'_, C, T>,
    action: &Action<C::Message>,
    ctx: &mut Context,
    abort: Option<&mut AbortSignal>,
) -> ActionOutcome<C::Message> {
    let started = Instant::now();
    let mut outcome = ActionOutcome::default();
    let result = dispatch(run, action, ctx, abort, &mut outcome).await;
    outcome.error = result.err();
    outcome.elapsed = started.elapsed();
    outcome
}

async fn dispatch<C: MessageCodec, T: Connection>(
    run: &mut Run<'_, C, T>,
    action: &Action<C::Message>,
    ctx: &mut Context,
    abort: Option<&mut AbortSignal>,
    outcome: &mut ActionOutcome<C::Message>,
) -> Result<(), ActionError> {
    if action.needs_network() {
        run.open().await?;
    }
    match action {
        Action::Send { messages } => run.send(messages, ctx, outcome).await,
        Action::Receive { expected } => run.receive(expected, ctx, outcome).await,
        Action::GenericReceive => run.generic_receive(ctx, outcome).await,
        Action::Wait { duration } => wait(*duration, abort).await,
    }
}
