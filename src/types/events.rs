//! Unified possibility stream events.
//!
//! The merged output of a fan-out turn is a forward-only sequence of these
//! events. For a single possibility id the contract is: exactly one
//! `possibility_start`, zero or more `token` deltas (append-only), an
//! optional `probability`, then exactly one of `possibility_complete` or
//! `error`. One exception: a possibility aborted while still queued in the
//! pool never started, so it yields only its `error` event with no
//! preceding `possibility_start`. A trailing `done` terminates the whole
//! multiplexed sequence. Across possibilities no ordering is guaranteed.

use serde::{Deserialize, Serialize};

/// Unified streaming event enum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A possibility branch has started; carries its request metadata.
    PossibilityStart {
        id: String,
        provider: String,
        model: String,
        temperature: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_instruction: Option<String>,
    },

    /// Incremental content delta for one possibility.
    Token { id: String, token: String },

    /// Overall answer probability (geometric mean of per-token
    /// probabilities); `null` when the provider supplies no logprobs.
    Probability { id: String, probability: Option<f64> },

    /// A possibility finished; carries the full accumulated content.
    PossibilityComplete {
        id: String,
        content: String,
        #[serde(default)]
        probability: Option<f64>,
    },

    /// A possibility failed. Scoped to one id; siblings are unaffected.
    Error { id: String, message: String },

    /// The whole multiplexed sequence is complete.
    Done,
}

impl StreamEvent {
    /// The possibility this event belongs to, if any (`Done` has none).
    pub fn possibility_id(&self) -> Option<&str> {
        match self {
            StreamEvent::PossibilityStart { id, .. }
            | StreamEvent::Token { id, .. }
            | StreamEvent::Probability { id, .. }
            | StreamEvent::PossibilityComplete { id, .. }
            | StreamEvent::Error { id, .. } => Some(id),
            StreamEvent::Done => None,
        }
    }

    /// True for the two events that terminate a single possibility branch.
    pub fn is_terminal_for_possibility(&self) -> bool {
        matches!(
            self,
            StreamEvent::PossibilityComplete { .. } | StreamEvent::Error { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_serialization() {
        let ev = StreamEvent::Token {
            id: "p1".to_string(),
            token: "Hel".to_string(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "token");
        assert_eq!(json["id"], "p1");
        assert_eq!(json["token"], "Hel");
    }

    #[test]
    fn test_probability_null_when_unavailable() {
        let ev = StreamEvent::Probability {
            id: "p1".to_string(),
            probability: None,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"probability\":null"));
    }

    #[test]
    fn test_done_round_trip() {
        let json = serde_json::to_string(&StreamEvent::Done).unwrap();
        assert_eq!(json, "{\"type\":\"done\"}");
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StreamEvent::Done);
        assert!(back.possibility_id().is_none());
    }
}
