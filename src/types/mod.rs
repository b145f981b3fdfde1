//! Core type definitions: messages, generation permutations, stream events.

pub mod events;
pub mod message;
pub mod permutation;

pub use events::StreamEvent;
pub use message::{Message, MessageRole};
pub use permutation::{Permutation, SystemInstruction};
