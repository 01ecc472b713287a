//! Command-Line Interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Motion capture action recognition: featurize, train, smooth and score
#[derive(Parser, Debug)]
#[command(name = "mocap-actions")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Featurize recordings into per-recording datasets
    Preprocess {
        /// Directory of recording subdirectories
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output directory for datasets
        #[arg(short, long)]
        output: PathBuf,

        /// Window size in frames
        #[arg(short, long)]
        window: Option<usize>,

        /// Gap between window starts in frames
        #[arg(short, long)]
        gap: Option<usize>,

        /// Only these recordings
        #[arg(long, value_delimiter = ',')]
        pick: Vec<String>,

        /// Recompute existing datasets
        #[arg(short, long)]
        force: bool,
    },

    /// Train a classifier on every dataset outside the test group
    Train {
        /// Dataset directory
        #[arg(short, long)]
        data: PathBuf,

        /// Recordings held out for testing
        #[arg(short, long, value_delimiter = ',', required = true)]
        test: Vec<String>,

        /// Classifier tag
        #[arg(short, long, default_value = "knn")]
        model: String,

        /// Where to write the trained model
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Score a trained classifier on the test group
    Evaluate {
        /// Dataset directory
        #[arg(short, long)]
        data: PathBuf,

        /// Trained model file
        #[arg(short, long)]
        model: PathBuf,

        /// Recordings used as the test set
        #[arg(short, long, value_delimiter = ',', required = true)]
        test: Vec<String>,

        /// Smoothing window in rows (config value when omitted)
        #[arg(short, long)]
        smoothing: Option<usize>,

        /// Print predicted and true timelines
        #[arg(long)]
        timeline: bool,

        /// Feature rows per second of motion, for timeline clocks
        #[arg(long, default_value_t = 6.0)]
        rows_per_second: f64,

        /// Recipe JSON to correct the smoothed actions against (overrides config)
        #[arg(short, long)]
        recipe: Option<PathBuf>,
    },

    /// Run the configured parameter sweep
    Sweep {
        /// Only run these combination keys
        #[arg(short, long, value_delimiter = ',')]
        keys: Vec<String>,

        /// Do not record results in the ledger
        #[arg(long)]
        no_ledger: bool,
    },

    /// List ledger results, best smoothed accuracy first
    Results {
        /// Only this test group (e.g. "4-5")
        #[arg(short, long)]
        test_group: Option<String>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Target path (default location when omitted)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
