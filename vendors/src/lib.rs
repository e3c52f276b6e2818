//! Completion clients for tokenbench
//!
//! Both supported APIs speak the OpenAI chat completions protocol with
//! Server-Sent Events streaming:
//!
//! - OpenAI and OpenAI-compatible servers
//! - LiteLLM proxies

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod factory;
pub mod openai;
pub mod streaming;

pub use factory::construct_clients;
pub use openai::{request_body, ClientConfig, OpenAiClient};
pub use streaming::{SseEvent, SseParser, StreamTimer};
