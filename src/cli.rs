use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "lisns", version, about, long_about = None)]
pub struct Cli {
    /// JSON config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the journal and image (overrides the config file)
    #[arg(short, long, value_name = "DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Client identity used for leases
    #[arg(long, default_value = "lisns-cli")]
    pub holder: String,

    /// Verbose mode (-v, -vv, -vvv)
    #[arg(short, action = ArgAction::Count)]
    pub verbosity: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Creates a directory and any missing parents
    Mkdir { path: String },
    /// Creates a file and leaves it open for writing
    Create {
        path: String,
        #[arg(short, long)]
        overwrite: bool,
    },
    /// Records the durable length of a file open for writing
    Sync { path: String, length: u64 },
    /// Finalizes a file at the given length and drops the lease
    Close { path: String, length: u64 },
    /// Moves a file or directory
    #[command(alias = "mv")]
    Rename { src: String, dst: String },
    /// Removes a file or directory recursively
    Rm { path: String },
    /// Lists a directory
    #[command(alias = "ls")]
    List {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Shows one entry
    Stat { path: String },
    /// Shows every open lease
    Leases,
    /// Writes a checkpoint image and truncates the journal
    Checkpoint,
    /// Recovers twice and checks both runs agree
    Recover,
}
