//! Generation permutation descriptors.
//!
//! A [`Permutation`] is the immutable description of exactly one generation
//! request: which provider and model to call, at which temperature, with
//! which optional per-possibility system instruction. Each permutation is
//! consumed 1:1 by one pool task and identifies one possibility in the
//! merged event stream.

use serde::{Deserialize, Serialize};

/// A named system instruction attached to a subset of permutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInstruction {
    pub name: String,
    pub content: String,
}

impl SystemInstruction {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Immutable descriptor of one generation request.
///
/// `id` is unique within one chat turn and doubles as the pool task id, so a
/// single possibility can be aborted while still queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permutation {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
}

impl Permutation {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        temperature: f64,
        system_instruction: Option<SystemInstruction>,
    ) -> Self {
        let provider = provider.into();
        let model = model.into();
        let id = Self::derive_id(&provider, &model, temperature, system_instruction.as_ref());
        Self {
            id,
            provider,
            model,
            temperature,
            system_instruction,
        }
    }

    /// Deterministic id: `provider/model@temperature` plus the instruction
    /// name when present.
    fn derive_id(
        provider: &str,
        model: &str,
        temperature: f64,
        instruction: Option<&SystemInstruction>,
    ) -> String {
        match instruction {
            Some(instr) => format!("{}/{}@{:.2}#{}", provider, model, temperature, instr.name),
            None => format!("{}/{}@{:.2}", provider, model, temperature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_id_is_stable() {
        let p = Permutation::new("openai", "gpt-4o", 0.7, None);
        assert_eq!(p.id, "openai/gpt-4o@0.70");

        let q = Permutation::new(
            "anthropic",
            "claude-sonnet",
            1.0,
            Some(SystemInstruction::new("concise", "Be concise.")),
        );
        assert_eq!(q.id, "anthropic/claude-sonnet@1.00#concise");
    }

    #[test]
    fn test_instruction_skipped_when_absent() {
        let p = Permutation::new("openai", "gpt-4o", 0.7, None);
        let json = serde_json::to_value(&p).unwrap();
        assert!(json.get("system_instruction").is_none());
    }
}
