//! Collaborator traits for Vox Agent.
//!
//! - `llm`: the language-model endpoint (ChatModel)
//! - `speech`: optional speech engines (SpeechSynthesizer, SpeechTranscriber)
//! - `context`: optional retrieval context (ContextProvider)

pub mod context;
pub mod llm;
pub mod speech;

pub use context::*;
pub use llm::*;
pub use speech::*;
