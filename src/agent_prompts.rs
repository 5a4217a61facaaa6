//! Agent Prompts - instruction template for program generation and the repair prompt.
//!
//! The template encodes the output contract (a JSON program with `result` and
//! `explanation`) together with the domain rules for the availability data.

use crate::golden_queries::RetrievedExamples;
use crate::memory::ConversationMemory;
use crate::table::UnifiedTable;
use regex::{Captures, Regex};
use tracing::debug;

lazy_static::lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([a-z_]+)\}").unwrap();
}

/// System prompt for query program generation
pub const PROGRAM_GENERATION_PROMPT: &str = r#"You are a data analyst answering questions about an employee availability tracker.
The data is one table built from several weekly report snapshots. Every row carries a
`report_date` column naming the snapshot it came from, so the same employee appears once per report.

## Output contract

Reply with ONE JSON document and nothing else:

{"result": <expression>, "explanation": "<steps to verify the answer in Excel>"}

- `result` is required for answerable questions. `explanation` is a short, plain-language recipe a
  person can follow in Excel (filters, pivot tables) to reproduce the number. Use the original
  column titles where you can.
- No other top-level keys are allowed.

## Frames (row selections)

{"snapshot": "latest" | "all" | "YYYY-MM-DD", "filters": [<condition>, ...]}

"snapshot" defaults to "latest" when omitted; history across reports needs "all" explicitly.

Conditions are AND-ed. A condition is {"column": "<column>", "op": "<op>", "value": <value>}
or {"any": [<condition>, ...]} for OR.
Ops: eq, ne, in, not_in (exact, case-sensitive), contains, not_contains, starts_with
(case-insensitive text), gt, gte, lt, lte (numbers and dates only), is_null, not_null.

## Expressions

- {"count_rows": <frame>}
- {"count_people": <frame>}  unique employee_id values
- {"count_unique": {"frame": <frame>, "column": "<column>"}}
- {"values": {"frame": <frame>, "column": "<column>", "distinct": true}}
- {"rows": {"frame": <frame>, "columns": ["<column>", ...], "limit": 50}}
- {"aggregate": {"frame": <frame>, "column": "<numeric column>", "func": "sum" | "mean" | "min" | "max"}}
- {"breakdown": {"frame": <frame>, "by": "<column>", "measure": "people" | "rows"}}
- {"chart": {"kind": "bar" | "pie" | "line", "title": "<title>", "frame": <frame>, "by": "<column>", "measure": "people"}}
- {"named": [{"label": "<label>", "value": <expression>}, ...]}
- {"literal": <any JSON value>}
- {"refuse": "<reason>"}

## Rules

(a) A bare role name matches that designation exactly. "Consultant" uses
    {"column": "designation", "op": "eq", "value": "Consultant"} and never includes "Senior Consultant".
(b) When counting people use count_people (or measure "people"), which deduplicates by employee_id.
(c) If a text filter (contains / starts_with) can match more than one stored value, answer with a
    breakdown by that column so each matched value is shown with its own count; the total is their sum.
(d) Questions about the current state, or with no date, use "snapshot": "latest". Use "all" or a
    specific date only when the question asks about history or a particular report.
(e) Resolve pronouns and follow-up questions ("what about them?", "and in Mumbai?") from the chat history.
(f) If the question is unrelated to this data, or needs a column that does not exist, reply with
    {"result": {"refuse": "<why>"}} instead of guessing.
Only use column names listed in the schema, and only use values as they appear in the samples.

## Schema (column: kind)
{schema_context}

## Sample values (not exhaustive)
{values_context}

## Chat history
{chat_history}

## Similar examples
{few_shot_examples}

## Question
{user_question}
"#;

/// Appended to the prompt when the first program failed.
pub const REPAIR_DIRECTIVE: &str = r#"## Repair
The previous program failed.

Program:
```json
{failed_program}
```

{error}

{hint}
Fix it and reply with the corrected JSON program only."#;

/// Fills the generation template.
pub struct PromptComposer {
    template: String,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptComposer {
    pub fn new() -> Self {
        Self {
            template: PROGRAM_GENERATION_PROMPT.to_string(),
        }
    }

    /// Use a different template; the same placeholders are substituted.
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Prompt for the first generation attempt.
    pub fn compose(
        &self,
        table: &UnifiedTable,
        memory: &ConversationMemory,
        examples: &RetrievedExamples,
        question: &str,
    ) -> String {
        let prompt = self.fill(table, memory, &examples.render(), question);
        debug!("Composed prompt ({} chars)", prompt.len());
        prompt
    }

    /// Prompt for the single repair attempt: same context without the examples,
    /// plus the failed program and its rendered error.
    pub fn compose_repair(
        &self,
        table: &UnifiedTable,
        memory: &ConversationMemory,
        question: &str,
        failed_program: &str,
        error: &str,
        hint: &str,
    ) -> String {
        let base = self.fill(table, memory, "", question);
        let directive = fill_placeholders(
            REPAIR_DIRECTIVE,
            &[
                ("failed_program", failed_program.trim()),
                ("error", error),
                ("hint", hint),
            ],
        );
        format!("{}\n{}", base, directive)
    }

    fn fill(
        &self,
        table: &UnifiedTable,
        memory: &ConversationMemory,
        examples: &str,
        question: &str,
    ) -> String {
        let schema = table.schema().render();
        let values = table.values().render();
        let history = memory.transcript();
        fill_placeholders(
            &self.template,
            &[
                ("schema_context", schema.as_str()),
                ("values_context", values.as_str()),
                ("chat_history", history.as_str()),
                ("few_shot_examples", examples),
                ("user_question", question),
            ],
        )
    }
}

/// Substitute known `{name}` placeholders in a single pass. Inserted text is not rescanned,
/// and unknown names (JSON in the template) are left as they are.
fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            values
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::golden_queries::{ExampleRetriever, GOLDEN_QUERIES, NO_EXAMPLES};
    use crate::memory::NO_HISTORY;
    use crate::table::{CellValue, SnapshotRows};
    use chrono::NaiveDate;

    fn table() -> UnifiedTable {
        UnifiedTable::from_snapshots(&[SnapshotRows {
            source_file: "Report_16102025.csv".into(),
            report_date: NaiveDate::from_ymd_opt(2025, 10, 16).unwrap(),
            columns: vec!["employee_id".into(), "designation".into()],
            rows: vec![vec![
                CellValue::Number(1.0),
                CellValue::Text("Consultant".into()),
            ]],
        }])
        .unwrap()
    }

    #[test]
    fn test_compose_fills_every_placeholder() {
        let composer = PromptComposer::new();
        let memory = ConversationMemory::default();
        let examples = ExampleRetriever::default().retrieve("zzzz qqqq", GOLDEN_QUERIES);
        let prompt = composer.compose(&table(), &memory, &examples, "how many consultants now?");

        assert!(prompt.contains("- designation: text"));
        assert!(prompt.contains("latest report_date: 2025-10-16"));
        assert!(prompt.contains(NO_HISTORY));
        assert!(prompt.contains(NO_EXAMPLES));
        assert!(prompt.contains("how many consultants now?"));
        assert!(!prompt.contains("{schema_context}"));
        assert!(!prompt.contains("{user_question}"));
    }

    #[test]
    fn test_repair_prompt_skips_examples() {
        let composer = PromptComposer::new();
        let mut memory = ConversationMemory::default();
        memory.push_exchange("count of interns", "4");
        let prompt = composer.compose_repair(
            &table(),
            &memory,
            "Count of interns",
            "{\"result\": {\"count_rows\": {\"filters\": [{\"column\": \"grade\", \"op\": \"eq\", \"value\": 1}]}}}",
            "Error: column 'grade' does not exist",
            "Use only columns from the schema.",
        );

        assert!(prompt.contains("Error: column 'grade' does not exist"));
        assert!(prompt.contains("\"column\": \"grade\""));
        assert!(prompt.contains("User: count of interns"));
        assert!(!prompt.contains("Q: "));
        assert!(!prompt.contains(NO_EXAMPLES));
    }

    #[test]
    fn test_inserted_text_is_not_substituted_again() {
        let composer = PromptComposer::new();
        let mut memory = ConversationMemory::default();
        memory.push_exchange("what does {user_question} mean?", "{hint}");
        let examples = ExampleRetriever::default().retrieve("zzzz qqqq", GOLDEN_QUERIES);
        let prompt = composer.compose(&table(), &memory, &examples, "how many consultants now?");

        assert!(prompt.contains("User: what does {user_question} mean?"));
        assert_eq!(prompt.matches("how many consultants now?").count(), 1);

        let repair = composer.compose_repair(
            &table(),
            &memory,
            "how many consultants now?",
            "{\"result\": {\"count_rows\": {}}}",
            "Error: value {error} is not valid",
            "Check the value.",
        );
        assert!(repair.contains("Error: value {error} is not valid"));
        assert!(repair.contains("Assistant: {hint}"));
        assert!(repair.contains("{\"result\": {\"count_rows\": {}}}"));
    }
}
