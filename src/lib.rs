//! Tollgate - LLM provider gateway with per-request token cost accounting.
//!
//! The crate owns three cooperating pieces:
//! - [`config::ConfigStore`]: durable provider configurations (credentials,
//!   model, limits), mirrored to a persistence snapshot on every mutation.
//! - [`pricing::PricingTable`]: per-model unit prices with a time-gated
//!   external refresh through a pluggable [`pricing::PriceFeed`].
//! - [`llm::CompletionGateway`]: normalizes completion requests/responses
//!   across OpenAI-compatible providers and combines token usage with the
//!   pricing table into a cost figure.
//!
//! Stores are explicit instances constructed once at startup and shared via
//! `Arc`; there is no global state.

pub mod config;
pub mod llm;
pub mod pricing;
pub mod store;

pub use config::{ConfigStore, ProviderConfig, SelectionStore};
pub use llm::{CompletionGateway, CompletionResult, GatewayError, Message, Role, Usage};
pub use pricing::{PriceFeed, PricingEntry, PricingTable};
pub use store::{BlobStore, FileBlobStore, MemoryBlobStore, StorageError};
