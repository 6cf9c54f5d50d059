use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kanban-sim")]
#[command(about = "Replay multi-user kanban sessions against an in-memory server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a TOML config file (or set KANBAN_CONFIG env var)
    #[arg(long, value_name = "FILE", env = "KANBAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Simulated server latency per request, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a scenario and print the resulting board state
    Run {
        #[arg(value_enum)]
        scenario: Scenario,
    },
    /// List available scenarios
    List,
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Two users drag, rename and create cards and converge
    Demo,
    /// A rejected move snaps back to the pre-drag state
    Rollback,
    /// A remote rename lands while a move is in flight
    ConcurrentEdit,
    /// Move a card into the middle of another board
    CrossBoard,
    /// Two moves of one card fail in turn
    OverlappingMoves,
}

impl Scenario {
    pub fn name(self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Rollback => "rollback",
            Self::ConcurrentEdit => "concurrent-edit",
            Self::CrossBoard => "cross-board",
            Self::OverlappingMoves => "overlapping-moves",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Demo => "Two users drag, rename and create cards and converge",
            Self::Rollback => "A rejected move snaps back to the pre-drag state",
            Self::ConcurrentEdit => "A remote rename lands while a move is in flight",
            Self::CrossBoard => "Move a card into the middle of another board",
            Self::OverlappingMoves => "Two moves of one card fail in turn",
        }
    }
}
