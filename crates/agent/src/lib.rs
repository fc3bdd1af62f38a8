//! Assistant runtime for the bond desk.
//!
//! An inbound utterance is classified by [`dispatch`] into the fast path (a short
//! JSON list of prompt suggestions) or the orchestrated path, where the model may
//! call the tools in [`tools`] through the capability gateway. Guarded actions go
//! through the approval protocol and the [`guardrails`]. Every outgoing text delta
//! passes through [`extract`] before it is forwarded.
//!
//! The model only decides which tool to call. Validation, approval and the
//! preview token check happen in code.

pub mod conversation;
pub mod dispatch;
pub mod extract;
pub mod guardrails;
pub mod llm;
pub mod runtime;
pub mod tools;

pub use dispatch::{classify, DispatchDecision};
pub use extract::{extract, ExtractedIds, SanitizedChunk};
pub use runtime::{AgentReply, AgentRequest, AgentRuntime};
