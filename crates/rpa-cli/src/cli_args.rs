use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "rpa-cli")]
#[command(about = "Headless runner for RPA script libraries")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Run a script library to completion.
    Run(RunArgs),
    /// Load and validate a script library without running it.
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[arg(long = "scripts-dir")]
    pub(crate) scripts_dir: String,
    #[arg(long = "entry-script")]
    pub(crate) entry_script: Option<String>,
    /// Honor breakpoints and read debug commands from stdin.
    #[arg(long = "debug")]
    pub(crate) debug: bool,
    #[arg(long = "breakpoint", value_name = "LINE")]
    pub(crate) breakpoints: Vec<usize>,
    #[arg(long = "start-line")]
    pub(crate) start_line: Option<usize>,
    #[arg(long = "command-delay-ms")]
    pub(crate) command_delay_ms: Option<u64>,
    /// Entry argument; the value is parsed as JSON and falls back to a string.
    #[arg(long = "arg", value_name = "NAME=VALUE")]
    pub(crate) args: Vec<String>,
}

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    #[arg(long = "scripts-dir")]
    pub(crate) scripts_dir: String,
    #[arg(long = "entry-script")]
    pub(crate) entry_script: Option<String>,
}
