//! kqlpair - two agents that turn a request into a validated KQL query
//!
//! A query generation agent and a query validation agent take turns on a
//! shared conversation until the validator approves or the turn budget runs
//! out.

pub mod agents;
pub mod chat;
pub mod error;
pub mod kql;
pub mod llm;
pub mod tools;

pub use error::{KqlPairError, Result};
