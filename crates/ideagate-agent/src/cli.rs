use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ideagate", version, about = "Quality and novelty gate for research idea stories")]
pub struct Cli {
    /// Pattern corpus (JSON, JSONL or YAML). Overrides `corpus.patterns_path`.
    #[arg(long, global = true, env = "IDEAGATE_PATTERNS")]
    pub patterns: Option<PathBuf>,

    /// Novelty records with embeddings. Overrides `corpus.records_path`.
    #[arg(long, global = true, env = "IDEAGATE_RECORDS")]
    pub records: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check an idea against the reference corpus and print the novelty report
    Novelty {
        /// Idea text
        idea: String,
    },
    /// Decide pass/fail for raw critic scores on a pattern
    Verdict {
        #[arg(long)]
        pattern: String,
        /// Raw scores on the 0-10 scale, one per critic
        #[arg(required = true, num_args = 1..)]
        scores: Vec<f64>,
    },
    /// Print the calibration anchors for a pattern, or the global set
    Anchors {
        #[arg(long, conflicts_with = "global")]
        pattern: Option<String>,
        #[arg(long)]
        global: bool,
    },
    /// Pick the strategy-diverse patterns to try an idea against
    Select,
    /// Score a story JSON file with the LLM critic panel and print the verdict
    Score {
        #[arg(long)]
        story: PathBuf,
        #[arg(long)]
        pattern: String,
    },
}
