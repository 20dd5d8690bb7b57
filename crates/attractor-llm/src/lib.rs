//! LLM request/response types and the `ProviderAdapter` abstraction.
//!
//! Concrete provider backends (OpenAI, Anthropic, Gemini, ...) are handler
//! implementation details outside the runner's interface contract; this
//! crate only defines the contract and a `DynProvider` wrapper for dynamic
//! dispatch in the handler registry.

mod provider;
mod types;

pub use provider::*;
pub use types::*;
