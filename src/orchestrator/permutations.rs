//! Permutation generation from user settings.
//!
//! One chat turn fans out into the cartesian product of selected models,
//! temperatures, and system instructions. Each combination becomes one
//! [`Permutation`] and therefore one possibility panel.

use crate::types::permutation::{Permutation, SystemInstruction};
use serde::{Deserialize, Serialize};

/// A model the user selected, together with its owning provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedModel {
    pub provider: String,
    pub model: String,
}

impl SelectedModel {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// User-facing generation settings; the permutation generator's input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermutationSettings {
    pub models: Vec<SelectedModel>,
    /// Empty means "one permutation at the default temperature".
    pub temperatures: Vec<f64>,
    /// Empty means "no per-possibility instruction".
    pub system_instructions: Vec<SystemInstruction>,
}

impl PermutationSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.models.push(SelectedModel::new(provider, model));
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperatures.push(temperature);
        self
    }

    pub fn with_instruction(mut self, instruction: SystemInstruction) -> Self {
        self.system_instructions.push(instruction);
        self
    }
}

const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Expand settings into the full model x temperature x instruction product.
pub fn generate_permutations(settings: &PermutationSettings) -> Vec<Permutation> {
    let temperatures: &[f64] = if settings.temperatures.is_empty() {
        &[DEFAULT_TEMPERATURE]
    } else {
        &settings.temperatures
    };

    let mut permutations = Vec::new();
    for selected in &settings.models {
        for &temperature in temperatures {
            if settings.system_instructions.is_empty() {
                permutations.push(Permutation::new(
                    &selected.provider,
                    &selected.model,
                    temperature,
                    None,
                ));
            } else {
                for instruction in &settings.system_instructions {
                    permutations.push(Permutation::new(
                        &selected.provider,
                        &selected.model,
                        temperature,
                        Some(instruction.clone()),
                    ));
                }
            }
        }
    }
    permutations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_settings_yield_nothing() {
        assert!(generate_permutations(&PermutationSettings::new()).is_empty());
    }

    #[test]
    fn test_default_temperature_applied() {
        let settings = PermutationSettings::new().with_model("openai", "gpt-4o");
        let perms = generate_permutations(&settings);
        assert_eq!(perms.len(), 1);
        assert_eq!(perms[0].temperature, DEFAULT_TEMPERATURE);
        assert!(perms[0].system_instruction.is_none());
    }

    #[test]
    fn test_full_product() {
        let settings = PermutationSettings::new()
            .with_model("openai", "gpt-4o")
            .with_model("anthropic", "claude-sonnet")
            .with_temperature(0.2)
            .with_temperature(1.0)
            .with_instruction(SystemInstruction::new("concise", "Be concise."))
            .with_instruction(SystemInstruction::new("verbose", "Elaborate."));

        let perms = generate_permutations(&settings);
        assert_eq!(perms.len(), 2 * 2 * 2);

        // Ids are unique across the product.
        let mut ids: Vec<_> = perms.iter().map(|p| p.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }
}
