use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Conformance verification harness for filesystem-like stores
#[derive(Parser, Debug)]
#[command(name = "fsconform", version, about, long_about = None)]
pub struct Cli {
    /// Change to this directory before doing anything else
    #[arg(short = 'C', value_name = "DIR", global = true)]
    pub directory: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). Takes precedence
    /// over RUST_LOG.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full baseline suite against a host directory
    Run {
        /// Directory backing the store under test
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,

        /// Capability preset (posix, minimal, host) or a TOML file
        #[arg(long, value_name = "PRESET|FILE", default_value = "host")]
        features: String,

        /// Keep the per-run directory for inspection instead of removing it
        #[arg(long)]
        keep: bool,

        /// Group to skip (repeatable, case-insensitive)
        #[arg(long, value_name = "GROUP")]
        skip: Vec<String>,
    },

    /// Run the quick smoke check (create, read back, remove)
    Quick {
        /// Directory backing the store under test
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,
    },

    /// Run the fuzz drivers with a reproducible seed
    Fuzz {
        /// Directory backing the store under test
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,

        /// Seed for the mutation RNG
        #[arg(long, default_value_t = 0x5eed_f00d)]
        seed: u64,

        /// Inputs per driver
        #[arg(long, default_value_t = 256)]
        iterations: u32,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
