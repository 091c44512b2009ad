use std::io::{BufRead, Write};

use rpa_core::EngineError;
use rpa_runtime::{DebugCommand, EngineHandle};

use crate::{map_cli_debug_input, DebugInput, DebugInputAction};

const HELP: &str = "commands: resume|r  over|n  into|s  abort|a  pause|p  cancel|q";

pub(crate) fn parse_debug_input(line: &str) -> Option<DebugInput> {
    let input = match line.trim() {
        "resume" | "r" | "continue" | "c" => DebugInput::Send(DebugCommand::Resume),
        "over" | "n" => DebugInput::Send(DebugCommand::StepOver),
        "into" | "s" => DebugInput::Send(DebugCommand::StepInto),
        "abort" | "a" => DebugInput::Send(DebugCommand::Abort),
        "pause" | "p" => DebugInput::Pause,
        "cancel" | "q" => DebugInput::Cancel,
        "help" | "h" | "?" => DebugInput::Help,
        _ => return None,
    };
    Some(input)
}

pub(crate) fn handle_debug_input(
    line: &str,
    handle: &EngineHandle,
    writer: &mut dyn Write,
) -> Result<DebugInputAction, EngineError> {
    if line.trim().is_empty() {
        return Ok(DebugInputAction::Continue);
    }

    let Some(input) = parse_debug_input(line) else {
        writeln!(
            writer,
            "UNKNOWN_COMMAND_JSON:{}",
            serde_json::to_string(line.trim()).expect("string json")
        )
        .map_err(map_cli_debug_input)?;
        return Ok(DebugInputAction::Continue);
    };

    match input {
        DebugInput::Send(command) => {
            if !handle.controller().send(command) {
                writeln!(writer, "NOT_PAUSED").map_err(map_cli_debug_input)?;
            }
        }
        DebugInput::Pause => handle.request_pause(),
        DebugInput::Cancel => {
            handle.request_cancel();
            return Ok(DebugInputAction::Quit);
        }
        DebugInput::Help => writeln!(writer, "{}", HELP).map_err(map_cli_debug_input)?,
    }
    writer.flush().map_err(map_cli_debug_input)?;
    Ok(DebugInputAction::Continue)
}

/// Feeds stdin lines to the run until it finishes, input ends, or the user
/// cancels.
pub(crate) fn pump_debug_input(
    reader: &mut dyn BufRead,
    handle: &EngineHandle,
    writer: &mut dyn Write,
) -> Result<(), EngineError> {
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader.read_line(&mut line).map_err(map_cli_debug_input)?;
        if read == 0 || handle.status().is_finished() {
            return Ok(());
        }
        if handle_debug_input(&line, handle, writer)? == DebugInputAction::Quit {
            return Ok(());
        }
    }
}
