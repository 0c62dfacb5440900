//! Agent Common - Guarded query agent core for agentctl v0.3.0
//!
//! Deterministic routing before any LLM call. Arithmetic and currency
//! conversion never reach model inference; numbers come from a guardrail
//! or from search-extracted values, never from generation.

pub mod agent;
pub mod calc;
pub mod config;
pub mod error;
pub mod expression;
pub mod numeric;
pub mod ollama;
pub mod pre_router;
pub mod rag;
pub mod search;
pub mod toolcall;

pub use agent::Agent;
pub use calc::{CalculationGuardrail, Calculation};
pub use config::AgentConfig;
pub use error::AgentError;
pub use pre_router::{classify, QueryClass, RoutingDecision};
