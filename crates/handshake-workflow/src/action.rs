//! Scripted steps of a workflow and their recorded outcomes.

use std::time::Duration;

use bytes::Bytes;
use handshake_core::{
    ActionError, ProtocolMessage,
    encoding::{base64_bytes, duration_ms},
};
use serde::{Deserialize, Serialize};

/// Which message kinds a strict receive accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expect<K> {
    /// Any kind.
    Any,
    /// One of these kinds.
    OneOf(Vec<K>),
}

impl<K: Eq> Expect<K> {
    #[must_use]
    pub fn matches(&self, kind: &K) -> bool {
        match self {
            Self::Any => true,
            Self::OneOf(kinds) => kinds.contains(kind),
        }
    }
}

/// One scripted step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    bound(
        serialize = "M: Serialize, M::Kind: Serialize",
        deserialize = "M: Deserialize<'de>, M::Kind: Deserialize<'de>"
    )
)]
pub enum Action<M: ProtocolMessage> {
    /// Serialize and write each message, in order.
    Send { messages: Vec<M> },
    /// Read exactly one message and require its kind to match.
    Receive { expected: Expect<M::Kind> },
    /// Read whatever arrives until the timeout or peer close.
    GenericReceive,
    /// Pause the run without I/O.
    Wait {
        #[serde(with = "duration_ms")]
        duration: Duration,
    },
}

impl<M: ProtocolMessage> Action<M> {
    pub fn send(messages: impl IntoIterator<Item = M>) -> Self {
        Self::Send {
            messages: messages.into_iter().collect(),
        }
    }

    pub fn receive(kind: M::Kind) -> Self {
        Self::Receive {
            expected: Expect::OneOf(vec![kind]),
        }
    }

    pub fn receive_one_of(kinds: impl IntoIterator<Item = M::Kind>) -> Self {
        Self::Receive {
            expected: Expect::OneOf(kinds.into_iter().collect()),
        }
    }

    #[must_use]
    pub const fn receive_any() -> Self {
        Self::Receive {
            expected: Expect::Any,
        }
    }

    #[must_use]
    pub const fn wait(duration: Duration) -> Self {
        Self::Wait { duration }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::Receive { .. } => "receive",
            Self::GenericReceive => "generic_receive",
            Self::Wait { .. } => "wait",
        }
    }

    /// Whether running this action touches the connection.
    #[must_use]
    pub fn needs_network(&self) -> bool {
        match self {
            Self::Send { messages } => !messages.is_empty(),
            Self::Receive { .. } | Self::GenericReceive => true,
            Self::Wait { .. } => false,
        }
    }
}

/// What happened when an action ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "M: Serialize",
    deserialize = "M: Deserialize<'de>"
))]
pub struct ActionOutcome<M> {
    /// `None` on success.
    pub error: Option<ActionError>,
    /// Messages fully written before the action ended.
    pub sent: Vec<M>,
    /// Messages parsed, including one of an unexpected kind.
    pub received: Vec<M>,
    /// Bytes a generic receive could not parse.
    #[serde(with = "base64_bytes", default)]
    pub unparsed: Bytes,
    /// Wall time the action took.
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl<M> Default for ActionOutcome<M> {
    fn default() -> Self {
        Self {
            error: None,
            sent: Vec::new(),
            received: Vec::new(),
            unparsed: Bytes::new(),
            elapsed: Duration::ZERO,
        }
    }
}

impl<M> ActionOutcome<M> {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use handshake_transport::TlvMessage;

    use super::*;

    #[test]
    fn test_expect_matching() {
        let expect = Expect::OneOf(vec![2u8, 11]);
        assert!(expect.matches(&11));
        assert!(!expect.matches(&14));
        assert!(Expect::<u8>::Any.matches(&14));
        assert!(!Expect::<u8>::OneOf(Vec::new()).matches(&0));
    }

    #[test]
    fn test_network_classification() {
        assert!(!Action::<TlvMessage>::wait(Duration::from_secs(1)).needs_network());
        assert!(!Action::<TlvMessage>::send(Vec::new()).needs_network());
        assert!(Action::send([TlvMessage::empty(1)]).needs_network());
        assert!(Action::<TlvMessage>::GenericReceive.needs_network());
        assert_eq!(Action::<TlvMessage>::receive(2).name(), "receive");
    }

    #[test]
    fn test_action_json_shape() {
        let action = Action::<TlvMessage>::wait(Duration::from_millis(2000));
        let json = serde_json::to_string(&action).unwrap();
        assert_eq!(json, r#"{"type":"wait","duration":2000}"#);

        let parsed: Action<TlvMessage> =
            serde_json::from_str(r#"{"type":"receive","expected":{"one_of":[2,11]}}"#).unwrap();
        assert_eq!(parsed, Action::receive_one_of([2, 11]));
    }
}
