//! One module per pipeline stage.
//!
//! Every stage runs against a [`StageContext`], which owns the ledger, the
//! registry lock and the loaded registry, and returns a [`StageReport`] the
//! binary prints and maps to an exit code.

pub mod context;
pub mod core;
pub mod mint;
pub mod pools;
pub mod swap;
pub mod tokens;

use std::fmt;

use crate::pipeline::{Outcome, RunReport};

pub use context::StageContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Core,
    Tokens,
    Pools,
    Mint,
    Swap,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Core => "core",
            Stage::Tokens => "tokens",
            Stage::Pools => "pools",
            Stage::Mint => "mint",
            Stage::Swap => "swap",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    /// Finished, but some entries need manual follow-up
    Degraded(Vec<String>),
    Failed(String),
}

/// What a stage did, as printed at the end of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    /// (label, value) lines, in display order
    pub entries: Vec<(String, String)>,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Completed,
            entries: Vec::new(),
        }
    }

    pub fn entry(&mut self, label: impl Into<String>, value: impl fmt::Display) {
        self.entries.push((label.into(), value.to_string()));
    }

    /// Derive the status from a pipeline outcome
    pub fn with_outcome(mut self, run: &RunReport) -> Self {
        self.status = match &run.outcome {
            Outcome::Done => StageStatus::Completed,
            Outcome::Degraded { gaps } => StageStatus::Degraded(
                gaps.iter()
                    .map(|gap| format!("{} ({}): {}", gap.contract, gap.key, gap.reason))
                    .collect(),
            ),
            Outcome::Failed { stage, error } => StageStatus::Failed(format!("{}: {}", stage, error)),
        };
        self
    }

    /// Completed and degraded runs both exit 0
    pub fn is_success(&self) -> bool {
        !matches!(self.status, StageStatus::Failed(_))
    }

    /// Print the summary to stdout
    pub fn print(&self) {
        println!();
        println!("=== {} summary ===", self.stage);
        for (label, value) in &self.entries {
            println!("  {:<28} {}", label, value);
        }
        match &self.status {
            StageStatus::Completed => println!("[OK] {} stage completed", self.stage),
            StageStatus::Degraded(notes) => {
                println!("[WARN] {} stage completed with gaps:", self.stage);
                for note in notes {
                    println!("  - {}", note);
                }
            }
            StageStatus::Failed(reason) => eprintln!("[ERROR] {} stage failed: {}", self.stage, reason),
        }
    }
}
