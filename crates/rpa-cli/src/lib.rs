use std::ffi::OsString;

use clap::Parser;
use rpa_core::EngineError;
use tracing_subscriber::EnvFilter;

mod cli_args;
mod debug_input;
mod error_map;
mod models;
mod runner;
mod source_loader;

pub(crate) use cli_args::{CheckArgs, Cli, Mode, RunArgs};
pub(crate) use debug_input::pump_debug_input;
pub(crate) use error_map::{
    emit_error, map_cli_debug_input, map_cli_io, map_cli_source_path, map_cli_source_read,
    map_cli_source_scan,
};
pub(crate) use models::{DebugInput, DebugInputAction, LoadedSources};
pub(crate) use runner::{check_scripts, run_scripts};
pub(crate) use source_loader::load_source_by_scripts_dir;

/// Logs go to stderr so stdout stays machine readable. `RUST_LOG`
/// overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber installed by an embedding process wins.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, EngineError> {
    match cli.command {
        Mode::Run(args) => run_scripts(args),
        Mode::Check(args) => check_scripts(args),
    }
}
