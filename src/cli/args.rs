use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the cinder binary.
#[derive(Parser, Debug)]
#[command(
    name = "cinder",
    version,
    about = "Lower C#-like iterator methods into state machines"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Lower iterator methods and print the generated state machines.
    Lower {
        /// JSON file holding one method or an array of methods.
        input: PathBuf,

        /// Print the lowered machines as JSON instead of pseudo-C#.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        lowering: LoweringArgs,
    },

    /// Lower iterator methods and enumerate them with the reference evaluator.
    Run {
        /// JSON file holding one method or an array of methods.
        input: PathBuf,

        /// Stop after this many elements.
        #[arg(long)]
        take: Option<usize>,

        /// Call Dispose on the enumerator once enumeration stops.
        #[arg(long)]
        dispose: bool,

        /// Make calls to this host method throw. Can be repeated.
        #[arg(long = "fail-on", value_name = "NAME")]
        fail_on: Vec<String>,

        #[command(flatten)]
        lowering: LoweringArgs,
    },
}

/// Options shared by every subcommand that lowers.
#[derive(Args, Debug, Default)]
pub struct LoweringArgs {
    /// State numbers from a previous compilation: a JSON state map, or a
    /// machine written by `cinder lower --json`.
    #[arg(long, value_name = "FILE")]
    pub previous: Option<PathBuf>,

    /// Omit the initial thread id check in `GetEnumerator`.
    #[arg(long = "no-thread-check")]
    pub no_thread_check: bool,
}
