pub mod image;
pub mod llm;
pub mod prompt;
pub mod setup;
pub mod workflow;
