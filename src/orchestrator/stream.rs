//! Per-permutation branch driving and event multiplexing.
//!
//! One branch per permutation; all branches write into one unbounded channel
//! whose receiver is the merged [`EventStream`]. A branch failure is
//! converted to an `error` event scoped to that permutation's id and never
//! cancels siblings. The coordinator emits a single trailing `done` once
//! every branch has settled.

use super::probability::resolve_probability;
use super::Orchestrator;
use crate::pool::QueuedTask;
use crate::provider::{GenerationOptions, ProviderEvent, ProviderRegistry, ProviderResponse};
use crate::resilience::{CircuitBreaker, CircuitBreakerRegistry};
use crate::types::events::StreamEvent;
use crate::types::message::Message;
use crate::types::permutation::Permutation;
use crate::{Error, ErrorContext, EventStream, Result};
use futures::channel::mpsc::{self, UnboundedSender};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Everything a branch needs, owned so branches are `'static`.
#[derive(Clone)]
pub(crate) struct BranchContext {
    pub(crate) providers: Arc<ProviderRegistry>,
    pub(crate) breakers: Arc<CircuitBreakerRegistry>,
    pub(crate) system_prompt: Option<String>,
    pub(crate) fallback_chunk_delay: Duration,
}

impl Orchestrator {
    /// Fan a chat turn out into one streaming branch per permutation and
    /// merge their events into a single forward-only sequence.
    ///
    /// With a pool configured, each branch is one [`QueuedTask`] keyed by
    /// its permutation id, so at most `max_connections` provider calls are
    /// in flight and a queued possibility can be aborted by id. An aborted
    /// possibility never started, so it yields only its `error` event.
    /// Without a pool, branches run unbounded (non-interactive code paths).
    ///
    /// Must be called with a tokio runtime current.
    pub fn stream_possibilities(
        &self,
        messages: Vec<Message>,
        permutations: Vec<Permutation>,
    ) -> EventStream {
        let (tx, rx) = mpsc::unbounded::<StreamEvent>();
        let ctx = self.branch_context();
        let turn_id = Uuid::new_v4();
        debug!(
            turn_id = %turn_id,
            permutations = permutations.len(),
            pooled = self.pool.is_some(),
            "starting possibility fan-out"
        );

        match self.pool.clone() {
            Some(pool) => {
                let mut handles = Vec::with_capacity(permutations.len());
                for permutation in permutations {
                    let priority = (self.priority_fn)(&permutation);
                    let branch_ctx = ctx.clone();
                    let branch_tx = tx.clone();
                    let branch_messages = messages.clone();
                    let id = permutation.id.clone();
                    let task = QueuedTask::new(id.clone(), priority, move || {
                        run_branch(branch_ctx, branch_messages, permutation, branch_tx)
                    });
                    handles.push((id, pool.enqueue(task)));
                }

                tokio::spawn(async move {
                    for (id, handle) in handles {
                        if let Err(err) = handle.await {
                            // Non-abort errors already produced their event
                            // inside the branch.
                            if err.is_aborted() {
                                let _ = tx.unbounded_send(StreamEvent::Error {
                                    id,
                                    message: err.to_string(),
                                });
                            }
                        }
                    }
                    debug!(turn_id = %turn_id, "possibility fan-out complete");
                    let _ = tx.unbounded_send(StreamEvent::Done);
                });
            }
            None => {
                let mut joins = Vec::with_capacity(permutations.len());
                for permutation in permutations {
                    let branch_ctx = ctx.clone();
                    let branch_tx = tx.clone();
                    let branch_messages = messages.clone();
                    joins.push(tokio::spawn(async move {
                        let _ = run_branch(branch_ctx, branch_messages, permutation, branch_tx)
                            .await;
                    }));
                }

                tokio::spawn(async move {
                    for join in joins {
                        let _ = join.await;
                    }
                    debug!(turn_id = %turn_id, "possibility fan-out complete");
                    let _ = tx.unbounded_send(StreamEvent::Done);
                });
            }
        }

        Box::pin(rx)
    }

    fn branch_context(&self) -> BranchContext {
        BranchContext {
            providers: Arc::clone(&self.providers),
            breakers: Arc::clone(&self.breakers),
            system_prompt: self.system_prompt.clone(),
            fallback_chunk_delay: self.fallback_chunk_delay,
        }
    }
}

/// Drive one permutation to its terminal event. Any failure becomes an
/// `error` event for this id; the `Err` also propagates to the pool so its
/// failure counter reflects it.
async fn run_branch(
    ctx: BranchContext,
    messages: Vec<Message>,
    permutation: Permutation,
    tx: UnboundedSender<StreamEvent>,
) -> Result<()> {
    let id = permutation.id.clone();
    match drive_permutation(&ctx, &messages, &permutation, &tx).await {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!(possibility = id.as_str(), error = %err, "possibility failed");
            let _ = tx.unbounded_send(StreamEvent::Error {
                id,
                message: err.to_string(),
            });
            Err(err)
        }
    }
}

async fn drive_permutation(
    ctx: &BranchContext,
    messages: &[Message],
    permutation: &Permutation,
    tx: &UnboundedSender<StreamEvent>,
) -> Result<()> {
    let (model_config, provider) = ctx.providers.resolve(&permutation.model).ok_or_else(|| {
        Error::validation_with_context(
            format!("unknown model: {}", permutation.model),
            ErrorContext::new().with_source("possibility_stream"),
        )
    })?;
    let model_config = model_config.clone();

    let _ = tx.unbounded_send(StreamEvent::PossibilityStart {
        id: permutation.id.clone(),
        provider: permutation.provider.clone(),
        model: permutation.model.clone(),
        temperature: permutation.temperature,
        system_instruction: permutation
            .system_instruction
            .as_ref()
            .map(|i| i.name.clone()),
    });

    let prepared = prepare_messages(ctx.system_prompt.as_deref(), permutation, messages);
    let options = GenerationOptions {
        temperature: permutation.temperature,
        max_tokens: model_config.max_tokens,
    };
    let breaker = ctx
        .breakers
        .breaker(&format!("ai-provider-{}", permutation.provider));

    breaker.allow()?;

    match provider
        .stream_chat(&prepared, &model_config.id, &options)
        .await
    {
        Ok(stream) => consume_stream(stream, &breaker, permutation, tx).await,
        Err(err) => {
            // The true streaming call failed outright; try the
            // non-streaming path and synthesize token events so the
            // downstream contract is unchanged.
            breaker.record_failure();
            debug!(
                possibility = permutation.id.as_str(),
                error = %err,
                "streaming call failed, falling back to non-streaming"
            );
            let response = breaker
                .execute(|| provider.chat(&prepared, &model_config.id, &options))
                .await?;
            synthesize_tokens(&response, permutation, tx, ctx.fallback_chunk_delay).await
        }
    }
}

async fn consume_stream(
    mut stream: crate::BoxStream<'static, ProviderEvent>,
    breaker: &CircuitBreaker,
    permutation: &Permutation,
    tx: &UnboundedSender<StreamEvent>,
) -> Result<()> {
    let mut content = String::new();
    let mut probability = None;

    while let Some(event) = stream.next().await {
        match event {
            Ok(ProviderEvent::Token { token }) => {
                content.push_str(&token);
                let _ = tx.unbounded_send(StreamEvent::Token {
                    id: permutation.id.clone(),
                    token,
                });
            }
            Ok(ProviderEvent::Complete { response }) => {
                probability = resolve_probability(&response);
            }
            Err(err) => {
                // A failure after partial output still counts against the
                // provider's breaker: the stream did not deliver.
                breaker.record_failure();
                return Err(err);
            }
        }
    }

    breaker.record_success();
    let _ = tx.unbounded_send(StreamEvent::Probability {
        id: permutation.id.clone(),
        probability,
    });
    let _ = tx.unbounded_send(StreamEvent::PossibilityComplete {
        id: permutation.id.clone(),
        content,
        probability,
    });
    Ok(())
}

/// Replay a non-streaming response as token events, split on whitespace
/// with a small artificial delay between chunks.
async fn synthesize_tokens(
    response: &ProviderResponse,
    permutation: &Permutation,
    tx: &UnboundedSender<StreamEvent>,
    chunk_delay: Duration,
) -> Result<()> {
    let mut content = String::new();
    for (i, word) in response.content.split_whitespace().enumerate() {
        let chunk = if i == 0 {
            word.to_string()
        } else {
            format!(" {}", word)
        };
        content.push_str(&chunk);
        let _ = tx.unbounded_send(StreamEvent::Token {
            id: permutation.id.clone(),
            token: chunk,
        });
        if !chunk_delay.is_zero() {
            tokio::time::sleep(chunk_delay).await;
        }
    }

    let probability = resolve_probability(response);
    let _ = tx.unbounded_send(StreamEvent::Probability {
        id: permutation.id.clone(),
        probability,
    });
    let _ = tx.unbounded_send(StreamEvent::PossibilityComplete {
        id: permutation.id.clone(),
        content,
        probability,
    });
    Ok(())
}

/// Prepend a synthesized system message concatenating the global system
/// prompt and the permutation's instruction, when either is present.
fn prepare_messages(
    system_prompt: Option<&str>,
    permutation: &Permutation,
    messages: &[Message],
) -> Vec<Message> {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(prompt) = system_prompt {
        if !prompt.trim().is_empty() {
            parts.push(prompt.trim());
        }
    }
    if let Some(instruction) = &permutation.system_instruction {
        if !instruction.content.trim().is_empty() {
            parts.push(instruction.content.trim());
        }
    }
    if parts.is_empty() {
        return messages.to_vec();
    }

    let mut prepared = Vec::with_capacity(messages.len() + 1);
    prepared.push(Message::system(parts.join("\n\n")));
    prepared.extend(messages.iter().cloned());
    prepared
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::permutation::SystemInstruction;

    fn perm(instruction: Option<SystemInstruction>) -> Permutation {
        Permutation::new("openai", "gpt-4o", 0.7, instruction)
    }

    #[test]
    fn test_prepare_messages_untouched_without_prompts() {
        let messages = vec![Message::user("hi")];
        let prepared = prepare_messages(None, &perm(None), &messages);
        assert_eq!(prepared, messages);
    }

    #[test]
    fn test_prepare_messages_concatenates_prompt_and_instruction() {
        let messages = vec![Message::user("hi")];
        let prepared = prepare_messages(
            Some("Global prompt."),
            &perm(Some(SystemInstruction::new("concise", "Be concise."))),
            &messages,
        );
        assert_eq!(prepared.len(), 2);
        assert!(prepared[0].is_system());
        assert_eq!(prepared[0].content, "Global prompt.\n\nBe concise.");
        assert_eq!(prepared[1], messages[0]);
    }

    #[test]
    fn test_prepare_messages_instruction_only() {
        let messages = vec![Message::user("hi")];
        let prepared = prepare_messages(
            None,
            &perm(Some(SystemInstruction::new("concise", "Be concise."))),
            &messages,
        );
        assert_eq!(prepared[0].content, "Be concise.");
    }

    #[test]
    fn test_prepare_messages_ignores_blank_prompt() {
        let messages = vec![Message::user("hi")];
        let prepared = prepare_messages(Some("   "), &perm(None), &messages);
        assert_eq!(prepared, messages);
    }
}
