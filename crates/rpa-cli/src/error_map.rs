use rpa_core::EngineError;
use std::fmt::Display;
use std::io::{self, Write};

fn map_error(code: &'static str, error: impl Display) -> EngineError {
    EngineError::new(code, error.to_string())
}

/// Prints a setup failure in the same shape as the error part of a
/// finished run and returns the exit code.
pub(crate) fn emit_error(error: EngineError) -> i32 {
    let mut stdout = io::stdout();
    // Nothing sensible is left to report to if stdout itself is gone.
    let _ = write_error_block(&error, &mut stdout);
    1
}

fn write_error_block(error: &EngineError, writer: &mut dyn Write) -> io::Result<()> {
    writeln!(writer, "RESULT:ERROR")?;
    writeln!(writer, "ERROR_CODE:{}", error.code)?;
    if let Some(line) = error.line {
        writeln!(writer, "ERROR_LINE:{}", line)?;
    }
    writeln!(
        writer,
        "ERROR_MSG_JSON:{}",
        serde_json::to_string(&error.message).expect("string json")
    )?;
    writer.flush()
}

pub(crate) fn map_cli_io(error: std::io::Error) -> EngineError {
    map_error("CLI_IO", error)
}

pub(crate) fn map_cli_source_path(error: std::io::Error) -> EngineError {
    map_error("CLI_SOURCE_PATH", error)
}

pub(crate) fn map_cli_source_scan(error: impl Display) -> EngineError {
    map_error("CLI_SOURCE_SCAN", error)
}

pub(crate) fn map_cli_source_read(error: std::io::Error) -> EngineError {
    map_error("CLI_SOURCE_READ", error)
}

pub(crate) fn map_cli_debug_input(error: std::io::Error) -> EngineError {
    map_error("CLI_DEBUG_INPUT", error)
}

#[cfg(test)]
mod error_map_tests {
    use super::*;

    #[test]
    fn emit_error_returns_non_zero_exit_code() {
        let code = emit_error(EngineError::new("ERR", "failed"));
        assert_eq!(code, 1);
    }

    #[test]
    fn error_block_matches_the_run_result_shape() {
        let mut out = Vec::new();
        write_error_block(&EngineError::new("API_ENTRY_MAIN_NOT_FOUND", "no main"), &mut out)
            .expect("write");
        assert_eq!(
            String::from_utf8(out).expect("utf-8"),
            "RESULT:ERROR\nERROR_CODE:API_ENTRY_MAIN_NOT_FOUND\nERROR_MSG_JSON:\"no main\"\n"
        );

        let mut out = Vec::new();
        write_error_block(&EngineError::new("ENGINE_THROWN", "boom").at_line(4), &mut out)
            .expect("write");
        let text = String::from_utf8(out).expect("utf-8");
        assert!(text.contains("ERROR_CODE:ENGINE_THROWN\nERROR_LINE:4\n"));
    }

    #[test]
    fn mapping_helpers_keep_error_codes() {
        assert_eq!(map_cli_io(std::io::Error::other("io")).code, "CLI_IO");
        assert_eq!(
            map_cli_source_path(std::io::Error::other("path")).code,
            "CLI_SOURCE_PATH"
        );

        let strip_error = std::path::Path::new("/a")
            .strip_prefix("/b")
            .expect_err("strip prefix");
        assert_eq!(map_cli_source_scan(strip_error).code, "CLI_SOURCE_SCAN");

        assert_eq!(
            map_cli_source_read(std::io::Error::other("read")).code,
            "CLI_SOURCE_READ"
        );
        assert_eq!(
            map_cli_debug_input(std::io::Error::other("stdin")).code,
            "CLI_DEBUG_INPUT"
        );
    }
}
