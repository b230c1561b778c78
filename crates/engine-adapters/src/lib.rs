//! Concrete `LLMClient` implementations (C5's provider side) - one `reqwest`
//! blocking HTTP client per wire format the reference drivers need, per §6
//! ("Provider adapters supplied"). No core type in `wayfarer-engine-app`
//! depends on any of these; a driver selects one by `provider_kind` and
//! hands the coordinator a `Box<dyn LLMClient>`.

mod http_support;

pub mod anthropic_style;
pub mod llama_cpp;
pub mod openai_compatible;
pub mod tgi;

pub use anthropic_style::AnthropicStyleClient;
pub use llama_cpp::LlamaCppClient;
pub use openai_compatible::OpenAiCompatibleClient;
pub use tgi::TgiClient;
