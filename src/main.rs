use anyhow::{Context, Result};
use availability_agent::inspect::inspect_workbook;
use availability_agent::{AgentConfig, AvailabilityAgent, LlmClient, Session};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "availability-agent")]
#[command(about = "Answer questions about employee availability reports")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Directory with the dated report snapshots (or set DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Worksheet to read from each snapshot (or set SHEET_NAME)
    #[arg(short, long)]
    sheet: Option<String>,

    /// Question to answer; starts an interactive prompt when omitted
    question: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Show sheets, columns and sample values of one snapshot file
    Inspect {
        /// Snapshot file to inspect
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = AgentConfig::from_env()?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(sheet) = args.sheet {
        config.sheet_name = sheet;
    }

    if let Some(Command::Inspect { file }) = args.command {
        let report = inspect_workbook(&file, &config.sheet_name)
            .with_context(|| format!("Failed to inspect {}", file.display()))?;
        println!("{}", report);
        return Ok(());
    }

    let llm = LlmClient::new(config.llm.clone()).context("Failed to build LLM client")?;
    info!("Using model {}", llm.model());
    let agent = AvailabilityAgent::from_config(&config, llm);
    let mut session = Session::new(config.history_window);

    println!("{}", agent.load(&mut session, &config.data_dir));

    if !args.question.is_empty() {
        let question = args.question.join(" ");
        print_answer(&agent.run(&mut session, &question).await);
        return Ok(());
    }

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }
        print_answer(&agent.run(&mut session, question).await);
    }

    Ok(())
}

fn print_answer(answer: &availability_agent::Answer) {
    println!("\n{}", answer.result);
    if let Some(explanation) = &answer.explanation {
        println!("\nHow to verify:\n{}", explanation);
    }
    println!();
}
