//! The concrete agents: a generic LLM agent and the two query agents built on it

mod llm_agent;
mod query_generation;
mod query_validation;

pub use llm_agent::{DEFAULT_MAX_TOKENS, DEFAULT_MAX_TOOL_ROUNDS, LlmAgent};
pub use query_generation::{QUERY_GENERATION_AGENT, QUERY_GENERATION_DESCRIPTION, QueryGenerationAgent};
pub use query_validation::{QUERY_VALIDATION_AGENT, QUERY_VALIDATION_DESCRIPTION, QueryValidationAgent};
