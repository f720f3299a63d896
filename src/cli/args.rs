//! Command line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Media Library - Keep a movie and series catalog in sync with your disks
#[derive(Parser, Debug)]
#[command(name = "media-library")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to ~/.config/media_library/config.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip preflight checks
    #[arg(long, global = true)]
    pub skip_preflight: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan libraries once and exit
    Scan {
        /// Only scan this library (repeatable)
        #[arg(short, long, value_name = "NAME")]
        library: Vec<String>,
    },

    /// Run the scheduler until interrupted
    Run,

    /// List scheduled tasks
    Tasks,

    /// Run one scheduled task now
    Trigger {
        /// Task name, e.g. library-scan
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// List libraries
    Libraries,

    /// Print technical metadata of a file
    Probe {
        /// Video file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Show how a filename is interpreted
    Parse {
        /// Video file path (need not exist)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}
