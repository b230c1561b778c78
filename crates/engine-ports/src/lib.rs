//! Trait boundaries for the Wayfarer turn-coordination engine: the
//! `Contributor` protocol the coordinator dispatches to, the `LLMClient`
//! capability set a provider adapter implements, and the `Tool` contract for
//! side-channel handlers. No concrete I/O lives here - only the shapes.

pub mod contributor;
pub mod llm_client;
pub mod tool;

pub use contributor::{Contributor, ContributorCapabilities, ContributorError, ContributorOutcome};
pub use llm_client::{
    LLMClient, ProviderCapabilities, ProviderError, ProviderMessage, ProviderRequest,
    ProviderResponse, Role, TokenUsage, ToolDescriptor,
};
pub use tool::{Tool, ToolResult};
