//! AgentRAG Context Engine
//!
//! Everything between a caller's question and a grounded answer:
//! - [`memory`]: bounded per-conversation message windows
//! - [`reasoner`]: the timestamped reasoning chain behind each answer
//! - [`synthesizer`]: language-model answers with an extractive fallback
//! - [`engine`]: the shared context object wiring collaborators together
//! - [`stream`]: the public entry point, one-shot or as a stream of events

pub mod engine;
pub mod memory;
pub mod reasoner;
pub mod stream;
pub mod synthesizer;

pub use engine::{EngineContext, EngineContextBuilder};
pub use memory::{ConversationHistory, ConversationMemory, ConversationMessage, ConversationSummary, MessageRole};
pub use reasoner::{ReasoningEngine, ReasoningStep, StepType};
pub use stream::{
    AnswerOutcome, AnswerRequest, Evidence, EventStream, RAGResponse, ReasoningStream, StreamEvent,
};
pub use synthesizer::{AnswerSource, SynthesizedAnswer, Synthesizer};
