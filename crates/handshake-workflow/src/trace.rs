//! Ordered workflow trace with per-action outcomes.

use std::time::Duration;

use handshake_core::{ActionError, ProtocolMessage};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    action::{Action, ActionOutcome},
    inspector::TraceInspector,
};

/// An action together with its outcome, once it has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "M: Serialize, M::Kind: Serialize",
    deserialize = "M: Deserialize<'de>, M::Kind: Deserialize<'de>"
))]
pub struct TracedAction<M: ProtocolMessage> {
    /// The scripted step.
    pub action: Action<M>,
    /// `None` until the step has run.
    #[serde(default)]
    pub outcome: Option<ActionOutcome<M>>,
}

impl<M: ProtocolMessage> TracedAction<M> {
    #[must_use]
    pub const fn is_executed(&self) -> bool {
        self.outcome.is_some()
    }

    #[must_use]
    pub const fn outcome(&self) -> Option<&ActionOutcome<M>> {
        self.outcome.as_ref()
    }
}

/// Ordered sequence of actions. Sequence order is execution order.
///
/// Actions can only be appended; once an action has run its outcome is
/// fixed and it is never executed again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "M: Serialize, M::Kind: Serialize",
    deserialize = "M: Deserialize<'de>, M::Kind: Deserialize<'de>"
))]
pub struct WorkflowTrace<M: ProtocolMessage> {
    actions: Vec<TracedAction<M>>,
}

impl<M: ProtocolMessage> Default for WorkflowTrace<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ProtocolMessage> WorkflowTrace<M> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Append an action.
    pub fn add_action(&mut self, action: Action<M>) {
        self.actions.push(TracedAction {
            action,
            outcome: None,
        });
    }

    /// Append an action, builder style.
    #[must_use]
    pub fn then(mut self, action: Action<M>) -> Self {
        self.add_action(action);
        self
    }

    #[must_use]
    pub fn send(self, messages: impl IntoIterator<Item = M>) -> Self {
        self.then(Action::send(messages))
    }

    #[must_use]
    pub fn receive(self, kind: M::Kind) -> Self {
        self.then(Action::receive(kind))
    }

    #[must_use]
    pub fn receive_one_of(self, kinds: impl IntoIterator<Item = M::Kind>) -> Self {
        self.then(Action::receive_one_of(kinds))
    }

    #[must_use]
    pub fn receive_any(self) -> Self {
        self.then(Action::receive_any())
    }

    #[must_use]
    pub fn generic_receive(self) -> Self {
        self.then(Action::GenericReceive)
    }

    #[must_use]
    pub fn wait(self, duration: Duration) -> Self {
        self.then(Action::wait(duration))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    #[must_use]
    pub fn actions(&self) -> &[TracedAction<M>] {
        &self.actions
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&TracedAction<M>> {
        self.actions.get(index)
    }

    #[must_use]
    pub fn outcome(&self, index: usize) -> Option<&ActionOutcome<M>> {
        self.actions.get(index).and_then(TracedAction::outcome)
    }

    #[must_use]
    pub fn is_executed(&self, index: usize) -> bool {
        self.outcome(index).is_some()
    }

    /// Number of actions that have run.
    #[must_use]
    pub fn executed_count(&self) -> usize {
        self.actions.iter().filter(|a| a.is_executed()).count()
    }

    /// True iff every action ran and succeeded.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.actions
            .iter()
            .all(|a| a.outcome().is_some_and(ActionOutcome::is_success))
    }

    /// Index and error of the first failed action.
    #[must_use]
    pub fn first_failure(&self) -> Option<(usize, &ActionError)> {
        self.actions
            .iter()
            .enumerate()
            .find_map(|(i, a)| a.outcome().and_then(|o| o.error.as_ref()).map(|e| (i, e)))
    }

    /// Read-only queries over recorded outcomes.
    #[must_use]
    pub const fn inspect(&self) -> TraceInspector<'_, M> {
        TraceInspector::new(self)
    }

    /// Record the outcome of a pending action. Returns false if the action
    /// already had one.
    pub(crate) fn record(&mut self, index: usize, outcome: ActionOutcome<M>) -> bool {
        match self.actions.get_mut(index) {
            Some(slot) if slot.outcome.is_none() => {
                slot.outcome = Some(outcome);
                true
            }
            _ => false,
        }
    }
}

impl<M> WorkflowTrace<M>
where
    M: ProtocolMessage + Serialize + DeserializeOwned,
    M::Kind: Serialize + DeserializeOwned,
{
    /// Serialize the trace, outcomes included.
    ///
    /// # Errors
    /// Returns error if a message fails to serialize.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a trace document.
    ///
    /// # Errors
    /// Returns error if the document is not a valid trace.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use handshake_core::TransportError;
    use handshake_transport::TlvMessage;

    use super::*;

    fn script() -> WorkflowTrace<TlvMessage> {
        WorkflowTrace::new()
            .send([TlvMessage::empty(1)])
            .generic_receive()
            .wait(Duration::from_millis(2000))
            .receive_any()
    }

    #[test]
    fn test_builder_preserves_order() {
        let trace = script();
        let names: Vec<&str> = trace.actions().iter().map(|a| a.action.name()).collect();
        assert_eq!(names, vec!["send", "generic_receive", "wait", "receive"]);
        assert_eq!(trace.executed_count(), 0);
        assert!(!trace.is_completed());
        assert!(WorkflowTrace::<TlvMessage>::new().is_completed());
    }

    #[test]
    fn test_record_is_write_once() {
        let mut trace = script();
        assert!(trace.record(0, ActionOutcome::default()));

        let failed = ActionOutcome {
            error: Some(TransportError::Closed.into()),
            ..ActionOutcome::default()
        };
        assert!(!trace.record(0, failed.clone()));
        assert!(trace.record(1, failed));
        assert!(!trace.record(9, ActionOutcome::default()));

        assert!(trace.outcome(0).unwrap().is_success());
        assert_eq!(
            trace.first_failure(),
            Some((1, &ActionError::from(TransportError::Closed)))
        );
        assert!(!trace.is_executed(2));
    }

    #[test]
    fn test_declared_script_from_json() {
        let json = r#"{
            "actions": [
                {"action": {"type": "send", "messages": [{"kind": 1, "payload": "AwM="}]}},
                {"action": {"type": "receive", "expected": {"one_of": [2]}}},
                {"action": {"type": "wait", "duration": 250}},
                {"action": {"type": "generic_receive"}}
            ]
        }"#;
        let trace = WorkflowTrace::<TlvMessage>::from_json(json).unwrap();
        let expected = WorkflowTrace::new()
            .send([TlvMessage::new(1, &b"\x03\x03"[..])])
            .receive(2)
            .wait(Duration::from_millis(250))
            .generic_receive();
        assert_eq!(trace, expected);

        let reparsed = WorkflowTrace::<TlvMessage>::from_json(&trace.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, trace);
    }
}
