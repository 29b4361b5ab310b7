//! mathbot core library: conversation routing, context assembly and reply delivery for a
//! Discord math-teacher assistant, plus the Discord and Gemini adapters.

pub mod agent;
pub mod bot;
pub mod channels;
pub mod config;
pub mod init;
pub mod llm;
pub mod persona;
pub mod prompt;
pub mod routing;
pub mod sanitize;
pub mod transcript;
