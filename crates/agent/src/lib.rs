//! Agent Runtime - bounded-step shopping concierge loop
//!
//! This crate turns a free-text shopping request into a small ranked set of
//! verified offers. One run of [`runtime::AgentRuntime`] owns one
//! [`state::LoopState`] and drives it through:
//!
//! 1. **Intent Resolution** (`intent`) - NL request → structured `Intent`, or a follow-up question
//! 2. **Planning** (`planner`) - pure decision over loop state, one action per step
//! 3. **Execution** (`executor`) - call the tool adapter, merge evidence, log failures
//! 4. **Reconciliation** (`reconciler`) - count the step, dedupe evidence by link
//! 5. **Finalization** (`finalizer`) - filter, trust-segment, pre-sort, rank
//!
//! # Key Types
//!
//! - `AgentRuntime` - loop controller (see `runtime` module)
//! - `LlmClient` - pluggable completion seam for OpenAI/Anthropic/Ollama
//! - `ToolBox` - the injected adapter set (search, enrichment, detail fetch, prices, ranking)
//!
//! # Safety Principle
//!
//! The LLM never invents offers. Ranking output is mapped back onto evidence
//! the loop gathered itself; links it does not recognize are dropped.

pub mod adapters;
pub mod executor;
pub mod finalizer;
pub mod intent;
pub mod llm;
pub mod planner;
pub mod reconciler;
pub mod runtime;
pub mod state;
pub mod tools;

pub use runtime::{AgentRuntime, RuntimeError};
pub use state::LoopState;
