//! Teaching-Aid Module - Gesprächsimpulse
//!
//! Dieses Modul verwaltet:
//! - Prompt-Typen und Validierung der Generator-Antworten
//! - Den Fallback-Pool generischer Fragen
//! - Den Fetcher mit Timeout und Fallback
//! - Den Gemini-Client als Standard-Generator

mod fetcher;
mod gemini;
mod prompt;

pub use fetcher::{
    ContentGenerator, FetchedPrompt, GeneratorError, PromptSource, TeachingAidFetcher,
    UnconfiguredGenerator,
};
pub use gemini::GeminiGenerator;
pub use prompt::{
    fallback_prompts, pick_fallback, Difficulty, Prompt, PromptRequest, PromptValidationError,
    UsedPrompts,
};
