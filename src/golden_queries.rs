//! Golden Queries - curated question -> program pairs and similarity retrieval over them.

use crate::fuzzy_matcher::FuzzyMatcher;
use serde::Serialize;
use tracing::debug;

/// Sentinel rendered into the prompt when no worked example qualifies.
pub const NO_EXAMPLES: &str = "No similar examples found.";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct GoldenExample {
    pub question: &'static str,
    pub program: &'static str,
}

/// Known-good programs for the availability tracker layout.
pub const GOLDEN_QUERIES: &[GoldenExample] = &[
    GoldenExample {
        question: "How many non-billable people are in Delhi?",
        program: r#"{
  "result": {"breakdown": {
    "frame": {"snapshot": "latest", "filters": [
      {"column": "office_location", "op": "contains", "value": "Delhi"},
      {"column": "deployment_status", "op": "eq", "value": "NON BILLABLE"}
    ]},
    "by": "office_location",
    "measure": "people"
  }},
  "explanation": "Filter 'Report Date' to the latest report. Filter 'Office Location' for values containing 'Delhi' (matches Delhi, Delhi-NCR) and 'Deployment Status' for 'NON BILLABLE'. Count unique Employee IDs for each matched Office Location; the total is their sum."
}"#,
    },
    GoldenExample {
        question: "List all people in Mumbai office",
        program: r#"{
  "result": {"values": {
    "frame": {"snapshot": "latest", "filters": [
      {"column": "office_location", "op": "eq", "value": "Mumbai"}
    ]},
    "column": "employee_name",
    "distinct": true
  }},
  "explanation": "Filter 'Report Date' to the latest report and 'Office Location' for 'Mumbai'. List the 'Employee Name' column."
}"#,
    },
    GoldenExample {
        question: "What is the bench strength?",
        program: r#"{
  "result": {"count_people": {"snapshot": "latest", "filters": [
    {"column": "spine_current_status", "op": "eq", "value": "Available"}
  ]}},
  "explanation": "Filter 'Report Date' to the latest report and 'sPInE Current status' for 'Available'. Count unique Employee IDs."
}"#,
    },
    GoldenExample {
        question: "Count of interns",
        program: r#"{
  "result": {"count_people": {"snapshot": "latest", "filters": [
    {"column": "category", "op": "eq", "value": "INTERN"}
  ]}},
  "explanation": "Filter 'Report Date' to the latest report and 'Category' for 'INTERN'. Count unique Employee IDs."
}"#,
    },
    GoldenExample {
        question: "How many Consultants vs Senior Consultants?",
        program: r#"{
  "result": {"named": [
    {"label": "Consultant", "value": {"count_people": {"snapshot": "latest", "filters": [
      {"column": "designation", "op": "eq", "value": "Consultant"}
    ]}}},
    {"label": "Senior Consultant", "value": {"count_people": {"snapshot": "latest", "filters": [
      {"column": "designation", "op": "eq", "value": "Senior Consultant"}
    ]}}}
  ]},
  "explanation": "Filter 'Report Date' to the latest report. Filter 'Designation' exactly for 'Consultant', then exactly for 'Senior Consultant'. Count unique Employee IDs for each."
}"#,
    },
    GoldenExample {
        question: "Show a chart of headcount by office location",
        program: r#"{
  "result": {"chart": {
    "kind": "bar",
    "title": "Headcount by office location",
    "frame": {"snapshot": "latest"},
    "by": "office_location",
    "measure": "people"
  }},
  "explanation": "Filter 'Report Date' to the latest report. Insert a pivot table with 'Office Location' as rows and the distinct count of 'Employee ID' as values."
}"#,
    },
    GoldenExample {
        question: "How has the bench changed across reports?",
        program: r#"{
  "result": {"breakdown": {
    "frame": {"snapshot": "all", "filters": [
      {"column": "spine_current_status", "op": "eq", "value": "Available"}
    ]},
    "by": "report_date",
    "measure": "people"
  }},
  "explanation": "Filter 'sPInE Current status' for 'Available'. For each report file, count unique Employee IDs."
}"#,
    },
    GoldenExample {
        question: "What is the weather in Delhi today?",
        program: r#"{
  "result": {"refuse": "The question is about the weather, which is not part of the availability data."}
}"#,
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct ScoredExample {
    pub example: GoldenExample,
    pub score: u8,
}

/// Outcome of example retrieval: either qualifying matches or an explicit "none".
#[derive(Debug, Clone, Serialize)]
pub enum RetrievedExamples {
    Matches(Vec<ScoredExample>),
    NoExamples,
}

impl RetrievedExamples {
    pub fn matches(&self) -> &[ScoredExample] {
        match self {
            RetrievedExamples::Matches(m) => m,
            RetrievedExamples::NoExamples => &[],
        }
    }

    /// Prompt block with each example as a question and its program.
    pub fn render(&self) -> String {
        match self {
            RetrievedExamples::NoExamples => NO_EXAMPLES.to_string(),
            RetrievedExamples::Matches(matches) => matches
                .iter()
                .map(|m| {
                    format!(
                        "Q: {}\nA:\n```json\n{}\n```",
                        m.example.question, m.example.program
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

/// Top-k fuzzy retrieval over a golden library.
pub struct ExampleRetriever {
    top_k: usize,
    matcher: FuzzyMatcher,
}

impl Default for ExampleRetriever {
    fn default() -> Self {
        Self::new(3, 50)
    }
}

impl ExampleRetriever {
    pub fn new(top_k: usize, min_score: u8) -> Self {
        Self {
            top_k,
            matcher: FuzzyMatcher::new(min_score),
        }
    }

    /// Score every library question, keep the best `top_k`, then drop those at or below the threshold.
    /// Ties keep library order, so the result is deterministic.
    pub fn retrieve(&self, question: &str, library: &[GoldenExample]) -> RetrievedExamples {
        let mut scored: Vec<ScoredExample> = library
            .iter()
            .map(|example| ScoredExample {
                example: *example,
                score: self.matcher.similarity(question, example.question),
            })
            .collect();
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored.truncate(self.top_k);
        scored.retain(|s| s.score > self.matcher.threshold);

        debug!(
            "Retrieved {} example(s) for '{}': {:?}",
            scored.len(),
            question,
            scored.iter().map(|s| s.score).collect::<Vec<_>>()
        );

        if scored.is_empty() {
            RetrievedExamples::NoExamples
        } else {
            RetrievedExamples::Matches(scored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::parse_program;

    #[test]
    fn test_golden_programs_parse() {
        for example in GOLDEN_QUERIES {
            assert!(
                parse_program(example.program).is_ok(),
                "golden program for '{}' does not parse",
                example.question
            );
        }
    }

    #[test]
    fn test_retrieve_exact_question_first() {
        let retriever = ExampleRetriever::default();
        let retrieved = retriever.retrieve("Count of interns", GOLDEN_QUERIES);
        let matches = retrieved.matches();
        assert!(!matches.is_empty());
        assert!(matches.len() <= 3);
        assert_eq!(matches[0].example.question, "Count of interns");
        assert_eq!(matches[0].score, 100);
        assert!(matches.iter().all(|m| m.score > 50));
    }

    #[test]
    fn test_empty_library_yields_sentinel() {
        let retriever = ExampleRetriever::default();
        let retrieved = retriever.retrieve("Count of interns", &[]);
        assert!(matches!(retrieved, RetrievedExamples::NoExamples));
        assert_eq!(retrieved.render(), NO_EXAMPLES);
    }

    #[test]
    fn test_unrelated_question_yields_sentinel() {
        let retriever = ExampleRetriever::default();
        let retrieved = retriever.retrieve("qqqq xxzz", GOLDEN_QUERIES);
        assert!(matches!(retrieved, RetrievedExamples::NoExamples));
    }

    #[test]
    fn test_retrieval_is_deterministic() {
        let retriever = ExampleRetriever::default();
        let a = retriever.retrieve("how many consultants are on the bench", GOLDEN_QUERIES);
        let b = retriever.retrieve("how many consultants are on the bench", GOLDEN_QUERIES);
        assert_eq!(a.render(), b.render());
    }
}
