//! Execution Loop
//!
//! One question: generate a program, execute it, and on failure repair it exactly once.

use crate::agent_prompts::PromptComposer;
use crate::execution_loop::error_recovery::{ErrorRecovery, RepairContext};
use crate::golden_queries::RetrievedExamples;
use crate::llm::{CodeGenerator, RetryPolicy};
use crate::memory::ConversationMemory;
use crate::program::{
    strip_code_fences, ExecutionOutcome, ResultValue, SandboxedExecutor, NO_RESULT_FOUND,
};
use crate::table::UnifiedTable;
use serde::Serialize;
use tracing::{info, warn};

/// Result text when the generation capability cannot be reached.
pub const SERVICE_BUSY: &str =
    "The assistant is busy right now. Please try again in a little while.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    Idle,
    Generating,
    Executing,
    Repairing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TurnStatus {
    /// First program succeeded.
    Answered,
    /// First program failed, the repaired one succeeded.
    Repaired,
    /// The repaired program failed too.
    ProgramFailed,
    /// Generation itself failed.
    ServiceBusy,
}

/// Inputs for one turn.
pub struct TurnContext<'a> {
    pub table: &'a UnifiedTable,
    pub memory: &'a ConversationMemory,
    pub examples: &'a RetrievedExamples,
    pub question: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub result: ResultValue,
    pub explanation: Option<String>,
    pub status: TurnStatus,
    /// Programs that were executed, fences stripped.
    pub programs: Vec<String>,
    pub states: Vec<LoopState>,
}

impl TurnOutcome {
    pub fn attempts(&self) -> usize {
        self.programs.len()
    }
}

/// Generation/execution loop with a single repair attempt
pub struct ExecutionLoop {
    composer: PromptComposer,
    executor: SandboxedExecutor,
    retry: RetryPolicy,
    recovery: ErrorRecovery,
}

impl ExecutionLoop {
    pub fn new(composer: PromptComposer, executor: SandboxedExecutor, retry: RetryPolicy) -> Self {
        Self {
            composer,
            executor,
            retry,
            recovery: ErrorRecovery::new(),
        }
    }

    pub fn executor(&self) -> &SandboxedExecutor {
        &self.executor
    }

    pub async fn run_turn<G: CodeGenerator + ?Sized>(
        &self,
        generator: &G,
        ctx: &TurnContext<'_>,
    ) -> TurnOutcome {
        let mut state = LoopState::Idle;
        let mut states = Vec::new();
        let mut prompt = String::new();
        let mut programs: Vec<String> = Vec::new();
        let mut repair: Option<RepairContext> = None;
        let mut finished: Option<(ResultValue, Option<String>, TurnStatus)> = None;

        loop {
            states.push(state);
            state = match state {
                LoopState::Idle => {
                    prompt = self
                        .composer
                        .compose(ctx.table, ctx.memory, ctx.examples, ctx.question);
                    LoopState::Generating
                }
                LoopState::Generating => {
                    match self.retry.generate_with_retry(generator, &prompt).await {
                        Ok(text) => {
                            programs.push(strip_code_fences(&text));
                            LoopState::Executing
                        }
                        Err(e) => {
                            warn!("❌ Generation failed: {}", e);
                            finished = Some((
                                ResultValue::Text(SERVICE_BUSY.to_string()),
                                Some(e.to_string()),
                                TurnStatus::ServiceBusy,
                            ));
                            LoopState::Done
                        }
                    }
                }
                LoopState::Executing => {
                    let program = programs.last().map(String::as_str).unwrap_or_default();
                    match self.executor.execute(ctx.table, program) {
                        ExecutionOutcome::Success { value, explanation } => {
                            let status = if repair.is_some() {
                                TurnStatus::Repaired
                            } else {
                                TurnStatus::Answered
                            };
                            info!("✅ Program succeeded on attempt {}", programs.len());
                            let value = value
                                .unwrap_or_else(|| ResultValue::Text(NO_RESULT_FOUND.to_string()));
                            finished = Some((value, explanation, status));
                            LoopState::Done
                        }
                        ExecutionOutcome::Failure { error } if repair.is_none() => {
                            let context = self.recovery.repair_context(program, &error);
                            warn!(
                                "🔧 Program failed ({}), attempting repair: {}",
                                context.class, context.rendered_error
                            );
                            repair = Some(context);
                            LoopState::Repairing
                        }
                        ExecutionOutcome::Failure { error } => {
                            let context = self.recovery.repair_context(program, &error);
                            warn!("❌ Repaired program failed too: {}", context.rendered_error);
                            finished = Some((
                                ResultValue::Text(context.rendered_error),
                                None,
                                TurnStatus::ProgramFailed,
                            ));
                            LoopState::Done
                        }
                    }
                }
                LoopState::Repairing => {
                    if let Some(context) = &repair {
                        prompt = self.composer.compose_repair(
                            ctx.table,
                            ctx.memory,
                            ctx.question,
                            &context.failed_program,
                            &context.rendered_error,
                            &context.hint,
                        );
                    }
                    LoopState::Generating
                }
                LoopState::Done => break,
            };
        }

        let (result, explanation, status) = finished.unwrap_or_else(|| {
            (
                ResultValue::Text(NO_RESULT_FOUND.to_string()),
                None,
                TurnStatus::Answered,
            )
        });

        TurnOutcome {
            result,
            explanation,
            status,
            programs,
            states,
        }
    }
}
