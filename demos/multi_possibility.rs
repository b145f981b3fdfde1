//! Multi-Possibility Streaming Example
//!
//! This example fans one chat turn out into several possibility branches
//! (model x temperature x instruction permutations) and prints the merged
//! event stream as it arrives:
//! - One `possibility_start` per permutation
//! - Interleaved `token` events tagged with the possibility id
//! - A `probability` and `possibility_complete` per finished branch
//! - A single trailing `done`
//!
//! Providers are scripted in-process so the example runs offline.
//!
//! Usage:
//!   cargo run --example multi_possibility

use async_trait::async_trait;
use fanout_core::orchestrator::{generate_permutations, OrchestratorBuilder, PermutationSettings};
use fanout_core::provider::{
    GenerationOptions, ModelConfig, Provider, ProviderEvent, ProviderRegistry, ProviderResponse,
};
use fanout_core::{BoxStream, Message, Result, StreamEvent, SystemInstruction};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

/// Offline provider that streams a canned answer word by word.
struct CannedProvider {
    name: &'static str,
    answer: &'static str,
}

#[async_trait]
impl Provider for CannedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn stream_chat(
        &self,
        _messages: &[Message],
        _model: &str,
        options: &GenerationOptions,
    ) -> Result<BoxStream<'static, ProviderEvent>> {
        let words: Vec<String> = self
            .answer
            .split_whitespace()
            .enumerate()
            .map(|(i, w)| {
                if i == 0 {
                    w.to_string()
                } else {
                    format!(" {}", w)
                }
            })
            .collect();
        // Higher temperature, noisier logprobs.
        let logprob = (0.9 - options.temperature * 0.3).ln();
        let logprobs = vec![logprob; words.len()];

        let stream = futures::stream::unfold(
            (words.into_iter(), Some(logprobs)),
            |(mut words, logprobs)| async move {
                tokio::time::sleep(Duration::from_millis(15)).await;
                match words.next() {
                    Some(token) => Some((Ok(ProviderEvent::Token { token }), (words, logprobs))),
                    None => logprobs.map(|lp| {
                        (
                            Ok(ProviderEvent::Complete {
                                response: ProviderResponse {
                                    content: String::new(),
                                    probability: None,
                                    logprobs: Some(lp),
                                },
                            }),
                            (words, None),
                        )
                    }),
                }
            },
        );
        Ok(Box::pin(stream))
    }

    async fn chat(
        &self,
        _messages: &[Message],
        _model: &str,
        _options: &GenerationOptions,
    ) -> Result<ProviderResponse> {
        Ok(ProviderResponse {
            content: self.answer.to_string(),
            probability: None,
            logprobs: None,
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fanout_core=debug".into()),
        )
        .init();

    println!("=== Multi-Possibility Streaming Demo ===\n");

    let mut registry = ProviderRegistry::new();
    registry.register_model(ModelConfig::new("gpt-4o", "openai"));
    registry.register_model(ModelConfig::new("claude-sonnet", "anthropic"));
    registry.register_provider(Arc::new(CannedProvider {
        name: "openai",
        answer: "Rust makes fearless concurrency practical.",
    }));
    registry.register_provider(Arc::new(CannedProvider {
        name: "anthropic",
        answer: "Concurrency in Rust is checked at compile time.",
    }));

    let orchestrator = OrchestratorBuilder::new(Arc::new(registry))
        .with_system_prompt("You are a concise assistant.")
        .build();

    let settings = PermutationSettings::new()
        .with_model("openai", "gpt-4o")
        .with_model("anthropic", "claude-sonnet")
        .with_temperature(0.2)
        .with_temperature(0.9)
        .with_instruction(SystemInstruction::new("direct", "Answer in one sentence."));
    let permutations = generate_permutations(&settings);
    println!("Fanning out into {} possibilities:\n", permutations.len());
    for p in &permutations {
        println!("  {}", p.id);
    }
    println!();

    let mut events = orchestrator.stream_possibilities(
        vec![Message::user("Why do people like Rust for concurrent code?")],
        permutations,
    );

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::PossibilityStart { id, .. } => {
                println!("[start]    {}", id);
            }
            StreamEvent::Token { id, token } => {
                println!("[token]    {} {:?}", id, token);
            }
            StreamEvent::Probability { id, probability } => {
                println!("[prob]     {} {:?}", id, probability);
            }
            StreamEvent::PossibilityComplete {
                id,
                content,
                probability,
            } => {
                println!("[complete] {} (p={:?}): {}", id, probability, content);
            }
            StreamEvent::Error { id, message } => {
                println!("[error]    {}: {}", id, message);
            }
            StreamEvent::Done => {
                println!("\n[done] all possibilities settled");
            }
        }
    }

    let signals = orchestrator.signals();
    println!("\nBreaker signals:");
    for (name, metrics) in signals.breakers {
        println!(
            "  {} state={} attempts={}",
            name, metrics.state, metrics.total_attempts
        );
    }
}
