//! Chat completion dispatch and normalization.

mod error;
mod gateway;
mod types;

pub use error::GatewayError;
pub use gateway::{CompletionGateway, CompletionResult, DEFAULT_ENDPOINT};
pub use types::{ChatRequest, ChatResponse, Choice, Message, Role, Usage};
