//! Text-generation providers.

mod openai;

pub use openai::OpenAiGenerator;
