//! Session context and the agent facade.
//!
//! A [`Session`] owns one conversation: the installed table and its memory. The
//! [`AvailabilityAgent`] holds no per-conversation state, so one agent can serve many
//! sessions; every operation receives the session it acts on.

use crate::agent_prompts::PromptComposer;
use crate::config::{AgentConfig, DEFAULT_SHEET_NAME};
use crate::error::AgentError;
use crate::execution_loop::{ExecutionLoop, TurnContext, TurnOutcome};
use crate::golden_queries::{ExampleRetriever, GoldenExample, GOLDEN_QUERIES};
use crate::ingestion::TableConsolidator;
use crate::llm::{CodeGenerator, RetryPolicy};
use crate::memory::{ConversationMemory, DEFAULT_HISTORY_WINDOW};
use crate::program::{ResultValue, SandboxedExecutor};
use crate::table::UnifiedTable;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Result text for questions asked before any table is loaded.
pub const DATA_NOT_LOADED: &str = "Data not loaded.";

pub struct Session {
    id: Uuid,
    table: Option<UnifiedTable>,
    memory: ConversationMemory,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl Session {
    pub fn new(history_window: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            table: None,
            memory: ConversationMemory::new(history_window),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn table(&self) -> Option<&UnifiedTable> {
        self.table.as_ref()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn is_loaded(&self) -> bool {
        self.table.is_some()
    }

    /// Replace the table and clear the memory together.
    pub fn install(&mut self, table: UnifiedTable) {
        self.table = Some(table);
        self.memory.clear();
    }
}

/// Caller-facing shape of every turn.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub result: ResultValue,
    pub explanation: Option<String>,
    #[serde(skip)]
    pub trace: Option<TurnOutcome>,
}

impl Answer {
    fn plain(result: &str) -> Self {
        Self {
            result: ResultValue::Text(result.to_string()),
            explanation: None,
            trace: None,
        }
    }
}

pub struct AvailabilityAgent<G: CodeGenerator> {
    generator: G,
    retriever: ExampleRetriever,
    library: &'static [GoldenExample],
    execution: ExecutionLoop,
    consolidator: TableConsolidator,
}

impl<G: CodeGenerator> AvailabilityAgent<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            retriever: ExampleRetriever::default(),
            library: GOLDEN_QUERIES,
            execution: ExecutionLoop::new(
                PromptComposer::new(),
                SandboxedExecutor::new(),
                RetryPolicy::default(),
            ),
            consolidator: TableConsolidator::new(DEFAULT_SHEET_NAME),
        }
    }

    pub fn from_config(config: &AgentConfig, generator: G) -> Self {
        Self::new(generator)
            .with_sheet(config.sheet_name.clone())
            .with_retriever(ExampleRetriever::new(
                config.examples_top_k,
                config.examples_min_score,
            ))
            .with_retry(config.retry_policy())
    }

    pub fn with_sheet(mut self, sheet_name: impl Into<String>) -> Self {
        self.consolidator = TableConsolidator::new(sheet_name);
        self
    }

    pub fn with_retriever(mut self, retriever: ExampleRetriever) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn with_library(mut self, library: &'static [GoldenExample]) -> Self {
        self.library = library;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.execution = ExecutionLoop::new(PromptComposer::new(), SandboxedExecutor::new(), retry);
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Load every snapshot in `directory` into the session. Returns a status line;
    /// on failure the session keeps its previous table and memory.
    pub fn load(&self, session: &mut Session, directory: &Path) -> String {
        match self.consolidator.load_directory(directory) {
            Ok(report) => {
                let status = report.status_line();
                session.install(report.table);
                info!("📊 Session {}: {}", session.id, status);
                status
            }
            Err(e) => {
                warn!("Session {}: load of {} failed: {}", session.id, directory.display(), e);
                match e {
                    AgentError::Load(message) => format!("Error loading data: {}", message),
                    other => format!("Error loading data: {}", other),
                }
            }
        }
    }

    /// Answer one question. Never fails: every outcome is rendered into an [`Answer`],
    /// and the exchange is recorded in the session memory.
    pub async fn run(&self, session: &mut Session, question: &str) -> Answer {
        let answer = match session.table.as_ref() {
            None => Answer::plain(DATA_NOT_LOADED),
            Some(table) => {
                let examples = self.retriever.retrieve(question, self.library);
                let ctx = TurnContext {
                    table,
                    memory: &session.memory,
                    examples: &examples,
                    question,
                };
                let outcome = self.execution.run_turn(&self.generator, &ctx).await;
                info!(
                    "Turn finished as {:?} after {} program(s)",
                    outcome.status,
                    outcome.attempts()
                );
                Answer {
                    result: outcome.result.clone(),
                    explanation: outcome.explanation.clone(),
                    trace: Some(outcome),
                }
            }
        };

        session
            .memory
            .push_exchange(question, &answer.result.to_string());
        answer
    }
}
