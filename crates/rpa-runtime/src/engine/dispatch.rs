use super::*;

impl ExecutionEngine {
    /// Dispatches one action and everything it owns.
    ///
    /// Gates run in order: run-from-line skip, debug pause, cancellation,
    /// unacknowledged child failure. Errors raised by the action itself are
    /// recorded exactly once, against its line, and then filtered through
    /// its [`ErrorPolicy`]. Errors coming up from children already carry a
    /// line and pass through untouched.
    pub fn execute_action(&mut self, action: &Action) -> Result<ControlSignal, EngineError> {
        if action.disabled {
            return Ok(ControlSignal::Continue);
        }
        if let Some(start_line) = self.start_line {
            if !action.is_scope_start() && action.line < start_line {
                return Ok(ControlSignal::Continue);
            }
        }

        if let Some(signal) = self.debug_gate(action) {
            return Ok(signal);
        }
        if self.is_cancelled() {
            return Ok(ControlSignal::Cancel);
        }

        self.frames.push(action.line);
        let outcome = self.dispatch_guarded(action);
        self.frames.pop();
        outcome
    }

    fn dispatch_guarded(&mut self, action: &Action) -> Result<ControlSignal, EngineError> {
        if self.state.child_failure_pending() {
            let error = self.record_error(self.pending_child_error(), action.line);
            return self.unhandled(action, error);
        }

        self.report_progress(action);

        let category = action.command.category();
        let result = match category {
            CommandCategory::Scope => self.execute_scope(action),
            CommandCategory::Marker => Ok(ControlSignal::Continue),
            CommandCategory::Terminal => Ok(self.execute_terminal(action)),
            CommandCategory::Leaf => {
                self.state.current_error_policy = action.error_policy;
                self.execute_leaf(action)
            }
        };

        match result {
            Ok(ControlSignal::Continue) if category == CommandCategory::Leaf => {
                self.command_pause()
            }
            Ok(signal) => Ok(signal),
            Err(error) => self.handle_error(action, error),
        }
    }

    fn handle_error(
        &mut self,
        action: &Action,
        error: EngineError,
    ) -> Result<ControlSignal, EngineError> {
        if error.is_cancellation() || self.is_cancelled() {
            return Ok(ControlSignal::Cancel);
        }
        if error.line.is_some() {
            return Err(error);
        }

        let error = self.record_error(error, action.line);
        match action.error_policy {
            ErrorPolicy::Ignore => {
                warn!(
                    line = action.line,
                    code = %error.code,
                    "ignored error: {}",
                    error.message
                );
                self.host.on_progress(
                    &format!("Ignored error at line {}: {}", action.line, error.message),
                    Severity::Warning,
                );
                Ok(ControlSignal::Continue)
            }
            ErrorPolicy::Report => {
                error!(
                    line = action.line,
                    code = %error.code,
                    "reported error: {}",
                    error.message
                );
                self.host.on_progress(
                    &format!("Error at line {}: {}", action.line, error.message),
                    Severity::Error,
                );
                self.unhandled(action, error)
            }
            ErrorPolicy::None => self.unhandled(action, error),
        }
    }

    /// An error nobody in this run will catch. Debug runs stop on it first.
    fn unhandled(
        &mut self,
        action: &Action,
        error: EngineError,
    ) -> Result<ControlSignal, EngineError> {
        if self.debug && self.handler_depth == 0 {
            return self.pause_on_error(action, error);
        }
        Err(error)
    }

    /// A handler scope gave up on an error its body already recorded. Once
    /// no handler is left above it, the error gets its debug pause here.
    pub(super) fn rethrown(
        &mut self,
        action: &Action,
        result: Result<ControlSignal, EngineError>,
    ) -> Result<ControlSignal, EngineError> {
        match result {
            Err(error) if error.line.is_some() && !error.is_cancellation() => {
                self.unhandled(action, error)
            }
            other => other,
        }
    }

    pub(super) fn record_error(&mut self, error: EngineError, line: usize) -> EngineError {
        let error = error.at_line(line);
        let recorded =
            ScriptError::from_engine_error(&error, self.state.source_file(), self.stack_trace());
        self.state.record_error(recorded);
        error
    }

    pub(super) fn stack_trace(&self) -> String {
        let script = self.state.script_name();
        self.frames
            .iter()
            .rev()
            .map(|line| format!("at {}:{}", script, line))
            .chain(self.caller_trace.iter().cloned())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(super) fn pending_child_error(&self) -> EngineError {
        let detail = self
            .state
            .last_error()
            .map(|error| error.message.clone())
            .unwrap_or_default();
        EngineError::propagation(
            "ENGINE_CHILD_SCRIPT_FAILED",
            format!("A child script finished with an error: {}", detail),
        )
    }

    fn report_progress(&self, action: &Action) {
        let description = action.command.describe();
        debug!(
            script = self.state.script_name(),
            line = action.line,
            "dispatch {}",
            description
        );
        self.host.on_line_changed(action.line);
        self.host.on_progress(
            &format!("Running Line {}: {}", action.line, description),
            Severity::Info,
        );
    }

    fn command_pause(&self) -> Result<ControlSignal, EngineError> {
        if self.command_delay.is_zero() {
            return Ok(ControlSignal::Continue);
        }
        if self.controller.sleep(self.command_delay) {
            Ok(ControlSignal::Continue)
        } else {
            Ok(ControlSignal::Cancel)
        }
    }

    fn execute_terminal(&mut self, action: &Action) -> ControlSignal {
        match action.command {
            Command::ExitLoop => ControlSignal::Break,
            Command::NextLoop => ControlSignal::ContinueLoop,
            _ => {
                info!(line = action.line, "stop requested by script");
                self.state.flags.cancellation_requested = true;
                ControlSignal::Cancel
            }
        }
    }
}
