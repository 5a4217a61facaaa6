pub mod agent_prompts;
pub mod config;
pub mod error;
pub mod execution_loop;
pub mod fuzzy_matcher;
pub mod golden_queries;
pub mod ingestion;
pub mod inspect;
pub mod llm;
pub mod memory;
pub mod program;
pub mod session;
pub mod table;

pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use llm::{CodeGenerator, GenerationError, LlmClient, RetryPolicy};
pub use session::{Answer, AvailabilityAgent, Session};
