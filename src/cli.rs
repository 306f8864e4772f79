use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::verbs::VmVerb;

#[derive(Parser, Debug)]
#[command(
    name = "orbrun",
    version,
    about = "Run commands and lifecycle verbs on OrbStack machines, with retries"
)]
pub struct Cli {
    /// Path to config file [default: ./orbrun.toml, then the user config dir]
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print command output and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Auto, global = true)]
    pub output: OutputFormat,

    /// Append debug logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Spinners on a terminal, plain lines otherwise
    Auto,
    Interactive,
    Plain,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a shell command on one or more machines
    Exec(ExecArgs),

    /// Machine lifecycle
    Vm {
        #[command(subcommand)]
        action: VmCommand,
    },

    /// Copy a local file into a machine
    Push {
        machine: String,
        local: String,
        remote: String,
    },

    /// Copy a file out of a machine
    Pull {
        machine: String,
        remote: String,
        local: String,
    },

    /// List machines and their host groups
    Inventory {
        /// Only show this machine
        name: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Target machine (repeatable)
    #[arg(short, long = "machine", value_name = "NAME")]
    pub machines: Vec<String>,

    /// Target every machine in an inventory group (e.g. orbstack_running)
    #[arg(short, long, conflicts_with_all = ["machines", "local"])]
    pub group: Option<String>,

    /// Run on this host instead of a machine
    #[arg(long, conflicts_with = "machines")]
    pub local: bool,

    /// Run with elevated privileges
    #[arg(long)]
    pub sudo: bool,

    /// Elevate to this user (implies --sudo)
    #[arg(long, value_name = "USER")]
    pub sudo_user: Option<String>,

    /// Per-attempt timeout, e.g. 90s or 5m [default: from the operation label]
    #[arg(long)]
    pub timeout: Option<String>,

    /// Exit code counted as success (repeatable) [default: 0]
    #[arg(long = "success-code", value_name = "CODE", allow_negative_numbers = true)]
    pub success_codes: Vec<i32>,

    /// Log in to the machine as this user
    #[arg(short = 'u', long, value_name = "USER", conflicts_with = "local")]
    pub user: Option<String>,

    /// Working directory (inside the machine, or on this host with --local)
    #[arg(short = 'w', long)]
    pub workdir: Option<String>,

    /// Feed this file to the command's stdin
    #[arg(long, value_name = "FILE")]
    pub stdin_file: Option<PathBuf>,

    /// Do not start stopped machines first
    #[arg(long)]
    pub no_start: bool,

    /// Command to run; one argument is a shell line, several are quoted words
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum VmCommand {
    /// Create a machine (or delete it with --absent)
    Create {
        name: String,
        /// Image, e.g. ubuntu:22.04
        image: String,
        #[arg(long)]
        arch: Option<String>,
        /// Default username
        #[arg(long)]
        user: Option<String>,
        /// Ensure the machine does not exist instead
        #[arg(long)]
        absent: bool,
    },
    /// Delete a machine
    Delete { name: String },
    /// Start a machine
    Start { name: String },
    /// Stop a machine
    Stop {
        name: String,
        #[arg(short, long)]
        force: bool,
    },
    /// Restart a machine
    Restart { name: String },
    /// Clone a machine
    Clone { source: String, name: String },
    /// Export a machine to an archive
    Export { name: String, path: String },
    /// Import a machine from an archive
    Import { name: String, path: String },
    /// Show machine details as JSON
    Info { name: String },
    /// List machines as JSON
    List,
}

impl From<VmCommand> for VmVerb {
    fn from(cmd: VmCommand) -> Self {
        match cmd {
            VmCommand::Create {
                name,
                image,
                arch,
                user,
                absent,
            } => VmVerb::ensure(name, image, arch, user, !absent),
            VmCommand::Delete { name } => VmVerb::Delete { name },
            VmCommand::Start { name } => VmVerb::Start { name },
            VmCommand::Stop { name, force } => VmVerb::Stop { name, force },
            VmCommand::Restart { name } => VmVerb::Restart { name },
            VmCommand::Clone { source, name } => VmVerb::Clone { source, name },
            VmCommand::Export { name, path } => VmVerb::Export { name, path },
            VmCommand::Import { name, path } => VmVerb::Import { name, path },
            VmCommand::Info { name } => VmVerb::Info { name },
            VmCommand::List => VmVerb::List,
        }
    }
}
