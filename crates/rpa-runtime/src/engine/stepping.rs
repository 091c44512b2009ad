use super::*;

impl ExecutionEngine {
    /// Pauses before `action` when a breakpoint, a host pause request or a
    /// pending step asks for it. Returns the signal to short-circuit with.
    pub(super) fn debug_gate(&mut self, action: &Action) -> Option<ControlSignal> {
        let stepping = std::mem::take(&mut self.state.debug.pending_step_over);
        let first_line = std::mem::take(&mut self.pause_at_start);
        let requested = self.controller.take_pause_request();
        let breakpoint = self.debug && action.breakpoint;
        if !(stepping || first_line || requested || breakpoint) {
            return None;
        }

        match self.pause_at(action.line) {
            PauseOutcome::Cancelled => Some(ControlSignal::Cancel),
            PauseOutcome::Command(DebugCommand::Resume) => None,
            PauseOutcome::Command(DebugCommand::StepOver) => {
                self.state.debug.pending_step_over = true;
                None
            }
            PauseOutcome::Command(DebugCommand::StepInto) => {
                self.state.debug.pending_step_over = true;
                if matches!(action.command, Command::RunScript { .. }) {
                    self.state.debug.pending_step_into = true;
                }
                None
            }
            PauseOutcome::Command(DebugCommand::Abort) => {
                info!(line = action.line, "run aborted at pause");
                self.controller.request_cancel();
                Some(ControlSignal::Cancel)
            }
        }
    }

    /// Reports the failure, then waits for the host. Resume and both steps
    /// clear the error list and continue after the failing action; Abort
    /// re-raises.
    pub(super) fn pause_on_error(
        &mut self,
        action: &Action,
        error: EngineError,
    ) -> Result<ControlSignal, EngineError> {
        self.host.on_progress(
            &format!(
                "Unhandled error at line {}: {}. Resume to continue or abort.",
                action.line, error.message
            ),
            Severity::Error,
        );

        match self.pause_at(action.line) {
            PauseOutcome::Cancelled => Ok(ControlSignal::Cancel),
            PauseOutcome::Command(DebugCommand::Abort) => Err(error),
            PauseOutcome::Command(command) => {
                debug!(line = action.line, ?command, "continuing past error");
                self.state.clear_errors();
                self.state.acknowledge_child_failure();
                if command != DebugCommand::Resume {
                    self.state.debug.pending_step_over = true;
                }
                Ok(ControlSignal::Continue)
            }
        }
    }

    fn pause_at(&mut self, line: usize) -> PauseOutcome {
        self.state.debug.is_paused = true;
        self.host.on_line_changed(line);
        self.host
            .on_progress(&format!("Paused at line {}", line), Severity::Info);
        debug!(script = self.state.script_name(), line, "paused");

        let outcome = self.controller.wait_while_paused(line);

        self.state.debug.is_paused = false;
        debug!(script = self.state.script_name(), line, ?outcome, "pause released");
        outcome
    }
}
