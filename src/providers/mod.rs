//! Provider module for wagpt
//!
//! This module contains the generative backend abstraction and its two
//! implementations: the hosted OpenAI-compatible API and a local Ollama
//! server.

pub mod base;
pub mod ollama;
pub mod openai;

pub use base::{build_messages, Message, Provider, StreamAccumulator};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use crate::config::GptConfig;
use crate::error::{Result, WagptError};

/// Create the provider selected by `config.engine`
///
/// The choice is made once at startup; callers keep the returned box for the
/// lifetime of the process.
///
/// # Errors
///
/// Returns error if the engine is unknown or provider initialization fails
pub fn create_provider(config: &GptConfig) -> Result<Box<dyn Provider>> {
    match config.engine.as_str() {
        "openai" => Ok(Box::new(OpenAiProvider::new(
            config.openai.clone(),
            config.model.clone(),
        )?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(
            config.ollama.clone(),
            config.model.clone(),
        )?)),
        other => Err(WagptError::Config(format!("Unknown engine: {}", other)).into()),
    }
}
