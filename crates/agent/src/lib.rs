//! Agent runtime for railsql.
//!
//! The decision loop of one chat turn lives here:
//! - `llm` defines the prompt shape and the `LlmClient` seam
//! - `providers` holds the HTTP clients and the deterministic dry-run client
//! - `gateway` picks a client per backend from a lookup table
//! - `prompts` and `parsing` build requests and read replies
//! - `runtime` drives Supervisor, Query and Interpretation until Terminal
//! - `session` restores and persists thread checkpoints around a turn
//! - `bootstrap` wires stores, warehouse and gateway from configuration
//!
//! The language model only writes text. Routing budgets and retry decisions
//! are made by the pure engine in `railsql_core::flows`.

pub mod bootstrap;
pub mod gateway;
pub mod llm;
pub mod parsing;
pub mod prompts;
pub mod providers;
pub mod runtime;
pub mod session;

pub use bootstrap::{assemble, BootstrapError, ChatStack};
pub use gateway::ModelGateway;
pub use llm::{LlmClient, Prompt, PromptTask};
pub use runtime::{Orchestrator, TurnReport};
pub use session::{ThreadService, TurnRequest};
