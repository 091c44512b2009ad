use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rpa_api::{create_engine, load_project_from_json_map, CreateEngineOptions};
use rpa_core::{EngineError, FinishResult, HostEvent, ScriptFinished, Severity, Value};
use rpa_runtime::{ChannelHost, EngineHandle};
use tracing::{info, warn};

use crate::{
    load_source_by_scripts_dir, map_cli_debug_input, map_cli_io, pump_debug_input, CheckArgs,
    RunArgs,
};

pub(crate) fn run_scripts(args: RunArgs) -> Result<i32, EngineError> {
    let sources = load_source_by_scripts_dir(&args.scripts_dir)?;
    let entry_args = parse_entry_args(&args.args)?;
    let (host, events) = ChannelHost::new();

    let project = create_engine(CreateEngineOptions {
        scripts_json: sources.scripts_json,
        entry_script: args.entry_script,
        entry_args: Some(entry_args),
        host: Some(Arc::new(host)),
        debug: args.debug,
        breakpoints: args.breakpoints.into_iter().collect::<BTreeSet<_>>(),
        start_line: args.start_line,
        command_delay: args.command_delay_ms.map(Duration::from_millis),
        ..CreateEngineOptions::default()
    })?;
    info!(
        root = %sources.root.display(),
        entry = %project.entry_script,
        debug = args.debug,
        "starting run"
    );

    let running = project.spawn()?;
    if args.debug {
        start_debug_input(running.handle().clone())?;
    }

    // Unlocked so the debug input thread can answer on the same stream.
    let mut writer = io::stdout();
    forward_events(&events, args.debug, &mut writer)?;

    let finished = running.join()?;
    emit_finished(&finished, &mut writer)?;
    Ok(exit_code(finished.result))
}

pub(crate) fn check_scripts(args: CheckArgs) -> Result<i32, EngineError> {
    let sources = load_source_by_scripts_dir(&args.scripts_dir)?;
    let project = load_project_from_json_map(&sources.scripts_json, args.entry_script)?;

    println!("RESULT:OK");
    println!("ENTRY_SCRIPT:{}", project.entry_script);
    for name in project.scripts.keys() {
        println!("SCRIPT:{}", name);
    }
    Ok(0)
}

/// Parses repeated `NAME=VALUE` entry arguments. Values that are not JSON
/// are taken as plain strings.
pub(crate) fn parse_entry_args(raw: &[String]) -> Result<BTreeMap<String, Value>, EngineError> {
    let mut args = BTreeMap::new();
    for item in raw {
        let Some((name, value)) = item.split_once('=') else {
            return Err(EngineError::new(
                "CLI_ARG_INVALID",
                format!("Expected NAME=VALUE, got \"{}\".", item),
            ));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::new(
                "CLI_ARG_INVALID",
                format!("Argument \"{}\" has no name.", item),
            ));
        }
        let value = serde_json::from_str::<Value>(value)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        args.insert(name.to_string(), value);
    }
    Ok(args)
}

fn start_debug_input(handle: EngineHandle) -> Result<(), EngineError> {
    thread::Builder::new()
        .name("rpa-debug-input".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            let mut reader = stdin.lock();
            let mut writer = io::stdout();
            if let Err(error) = pump_debug_input(&mut reader, &handle, &mut writer) {
                warn!(code = %error.code, "debug input stopped: {}", error.message);
            }
        })
        .map_err(map_cli_debug_input)?;
    Ok(())
}

/// Prints host events until the worker drops its host.
pub(crate) fn forward_events(
    events: &Receiver<HostEvent>,
    debug: bool,
    writer: &mut dyn Write,
) -> Result<(), EngineError> {
    for event in events {
        match event {
            HostEvent::Progress { message, severity } => writeln!(
                writer,
                "PROGRESS:{}|{}",
                severity_label(severity),
                serde_json::to_string(&message).expect("string json")
            )
            .map_err(map_cli_io)?,
            HostEvent::LineChanged { line } if debug => {
                writeln!(writer, "LINE:{}", line).map_err(map_cli_io)?
            }
            HostEvent::LineChanged { .. } | HostEvent::Finished { .. } => continue,
        }
        writer.flush().map_err(map_cli_io)?;
    }
    Ok(())
}

pub(crate) fn emit_finished(
    finished: &ScriptFinished,
    writer: &mut dyn Write,
) -> Result<(), EngineError> {
    let result = match finished.result {
        FinishResult::Successful => "SUCCESSFUL",
        FinishResult::Cancelled => "CANCELLED",
        FinishResult::Error => "ERROR",
    };
    writeln!(writer, "RESULT:{}", result).map_err(map_cli_io)?;
    writeln!(
        writer,
        "TASK_RESULT_JSON:{}",
        serde_json::to_string(&finished.task_result).expect("string json")
    )
    .map_err(map_cli_io)?;
    writeln!(writer, "ELAPSED_MS:{}", finished.elapsed.as_millis()).map_err(map_cli_io)?;

    if let Some(error) = &finished.error {
        writeln!(writer, "ERROR_CODE:{}", error.code).map_err(map_cli_io)?;
        writeln!(writer, "ERROR_LINE:{}", error.line).map_err(map_cli_io)?;
        writeln!(
            writer,
            "ERROR_MSG_JSON:{}",
            serde_json::to_string(&error.message).expect("string json")
        )
        .map_err(map_cli_io)?;
        writeln!(
            writer,
            "ERROR_TRACE_JSON:{}",
            serde_json::to_string(&error.stack_trace).expect("string json")
        )
        .map_err(map_cli_io)?;
    }
    writeln!(
        writer,
        "VARIABLES_JSON:{}",
        serde_json::to_string(&finished.variables).expect("value json")
    )
    .map_err(map_cli_io)?;
    writer.flush().map_err(map_cli_io)
}

pub(crate) fn exit_code(result: FinishResult) -> i32 {
    match result {
        FinishResult::Successful => 0,
        FinishResult::Error => 1,
        FinishResult::Cancelled => 2,
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "INFO",
        Severity::Warning => "WARNING",
        Severity::Error => "ERROR",
    }
}

#[cfg(test)]
mod runner_tests {
    use super::*;
    use rpa_core::ScriptError;
    use std::sync::mpsc::channel;

    #[test]
    fn parse_entry_args_reads_json_and_falls_back_to_text() {
        let args = parse_entry_args(&[
            "count=3".to_string(),
            "names=[\"a\",\"b\"]".to_string(),
            "url=https://example.test/?q=1".to_string(),
        ])
        .expect("args should parse");
        assert_eq!(args["count"], Value::Int(3));
        assert_eq!(
            args["names"],
            Value::List(vec![Value::string("a"), Value::string("b")])
        );
        assert_eq!(args["url"], Value::string("https://example.test/?q=1"));
    }

    #[test]
    fn parse_entry_args_rejects_missing_names() {
        for raw in ["novalue", "=3"] {
            let error = parse_entry_args(&[raw.to_string()]).expect_err("invalid arg");
            assert_eq!(error.code, "CLI_ARG_INVALID");
        }
    }

    #[test]
    fn forward_events_prints_progress_and_debug_lines() {
        let (sender, receiver) = channel();
        sender
            .send(HostEvent::LineChanged { line: 4 })
            .expect("send");
        sender
            .send(HostEvent::Progress {
                message: "Running Line 4: Delay".to_string(),
                severity: Severity::Info,
            })
            .expect("send");
        drop(sender);

        let mut out = Vec::new();
        forward_events(&receiver, true, &mut out).expect("forward");
        let text = String::from_utf8(out).expect("utf-8");
        assert_eq!(
            text,
            "LINE:4\nPROGRESS:INFO|\"Running Line 4: Delay\"\n"
        );
    }

    #[test]
    fn emit_finished_prints_the_error_block() {
        let finished = ScriptFinished {
            script: "main".to_string(),
            result: FinishResult::Error,
            error: Some(ScriptError {
                source_file: "main.script.json".to_string(),
                line: 7,
                kind: rpa_core::ErrorKind::Command,
                code: "ENGINE_THROWN".to_string(),
                message: "boom".to_string(),
                stack_trace: "at main:7".to_string(),
            }),
            errors: Vec::new(),
            elapsed: Duration::from_millis(12),
            task_result: "Successfully Completed Script".to_string(),
            variables: BTreeMap::new(),
            arguments: BTreeMap::new(),
        };

        let mut out = Vec::new();
        emit_finished(&finished, &mut out).expect("emit");
        let text = String::from_utf8(out).expect("utf-8");
        assert!(text.starts_with("RESULT:ERROR\n"));
        assert!(text.contains("ELAPSED_MS:12\n"));
        assert!(text.contains("ERROR_CODE:ENGINE_THROWN\n"));
        assert!(text.contains("ERROR_LINE:7\n"));
        assert!(text.contains("ERROR_MSG_JSON:\"boom\"\n"));
        assert_eq!(exit_code(finished.result), 1);
    }
}
