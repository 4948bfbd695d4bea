//! Read-only queries over an executed (or partially executed) trace.

use std::slice;

use handshake_core::{ActionError, ProtocolMessage};

use crate::trace::{TracedAction, WorkflowTrace};

/// Query view over a trace. Never mutates it.
#[derive(Debug)]
pub struct TraceInspector<'a, M: ProtocolMessage> {
    trace: &'a WorkflowTrace<M>,
}

impl<M: ProtocolMessage> Clone for TraceInspector<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: ProtocolMessage> Copy for TraceInspector<'_, M> {}

impl<'a, M: ProtocolMessage> TraceInspector<'a, M> {
    #[must_use]
    pub const fn new(trace: &'a WorkflowTrace<M>) -> Self {
        Self { trace }
    }

    /// True iff any executed action recorded a received message of `kind`.
    #[must_use]
    pub fn did_receive(&self, kind: M::Kind) -> bool {
        self.messages_of(kind).next().is_some()
    }

    /// True iff any executed action wrote a message of `kind`.
    #[must_use]
    pub fn did_send(&self, kind: M::Kind) -> bool {
        self.trace
            .actions()
            .iter()
            .filter_map(TracedAction::outcome)
            .flat_map(|o| o.sent.iter())
            .any(|m| m.kind() == kind)
    }

    /// Received messages of `kind` in recorded order.
    ///
    /// The iterator is lazy and `Clone`; clone it (or call again) to restart.
    #[must_use]
    pub fn messages_of(&self, kind: M::Kind) -> MessagesOf<'a, M> {
        MessagesOf {
            actions: self.trace.actions().iter(),
            current: Default::default(),
            kind: Some(kind),
        }
    }

    /// Every received message in recorded order.
    #[must_use]
    pub fn received(&self) -> MessagesOf<'a, M> {
        MessagesOf {
            actions: self.trace.actions().iter(),
            current: Default::default(),
            kind: None,
        }
    }

    /// Index and error of the action that halted the run, if any.
    #[must_use]
    pub fn first_failure(&self) -> Option<(usize, &'a ActionError)> {
        self.trace.first_failure()
    }
}

/// Lazy iterator over recorded received messages.
#[derive(Debug, Clone)]
pub struct MessagesOf<'a, M: ProtocolMessage> {
    actions: slice::Iter<'a, TracedAction<M>>,
    current: slice::Iter<'a, M>,
    kind: Option<M::Kind>,
}

impl<'a, M: ProtocolMessage> Iterator for MessagesOf<'a, M> {
    type Item = &'a M;

    fn next(&mut self) -> Option<&'a M> {
        loop {
            let kind = self.kind;
            if let Some(message) = self
                .current
                .find(|m| kind.is_none_or(|k| m.kind() == k))
            {
                return Some(message);
            }
            let next = self.actions.next()?;
            if let Some(outcome) = next.outcome() {
                self.current = outcome.received.iter();
            }
        }
    }
}
