use rpa_core::ArgumentDecl;

use super::*;

impl ExecutionEngine {
    /// Runs another script of the library to completion on this thread.
    ///
    /// In/InOut values are copied into the child, Out/InOut values are
    /// copied back into `assign_to` variables once it finishes. A child that
    /// ends in error does not fail this action; it leaves a pending child
    /// failure that the next dispatch raises unless a Try/Retry absorbs it.
    pub(super) fn execute_run_script(
        &mut self,
        action: &Action,
        script_name: &str,
        bindings: &[ArgumentBinding],
    ) -> Result<ControlSignal, EngineError> {
        let step_into = std::mem::take(&mut self.state.debug.pending_step_into);
        let scripts = Arc::clone(&self.scripts);
        let script = scripts.get(script_name).ok_or_else(|| {
            EngineError::new(
                "ENGINE_SCRIPT_NOT_FOUND",
                format!("Script \"{}\" is not loaded.", script_name),
            )
        })?;

        let mut inputs = BTreeMap::new();
        for binding in bindings {
            let decl = argument_decl(script, &binding.name)?;
            if binding.assign_to.is_some() && !decl.direction.returns_output() {
                return Err(direction_error(script_name, &binding.name));
            }
            if let Some(expression) = &binding.value {
                if !decl.direction.accepts_input() {
                    return Err(direction_error(script_name, &binding.name));
                }
                inputs.insert(binding.name.clone(), self.evaluate(expression)?);
            }
        }

        let mut child = self.child_engine(step_into);
        let finished = child.run(script_name, Some(inputs))?;

        match finished.result {
            FinishResult::Successful => {
                self.copy_outputs(bindings, &finished);
                Ok(ControlSignal::Continue)
            }
            FinishResult::Cancelled if self.controller.is_cancelled() => Ok(ControlSignal::Cancel),
            FinishResult::Cancelled => {
                debug!(script = script_name, "child script stopped itself");
                self.copy_outputs(bindings, &finished);
                Ok(ControlSignal::Continue)
            }
            FinishResult::Error => {
                let message = finished
                    .error
                    .as_ref()
                    .map(|error| error.message.clone())
                    .unwrap_or_default();
                if let Some(error) = finished.error {
                    self.state.record_error(error);
                }
                match self.state.current_error_policy {
                    ErrorPolicy::Ignore => {
                        warn!(
                            line = action.line,
                            script = script_name,
                            "ignored child script failure: {}",
                            message
                        );
                    }
                    policy => {
                        if policy == ErrorPolicy::Report {
                            error!(
                                line = action.line,
                                script = script_name,
                                "child script failed: {}",
                                message
                            );
                        }
                        self.state.flags.child_script_failed = true;
                        self.state.flags.child_script_error_acknowledged = false;
                    }
                }
                Ok(ControlSignal::Continue)
            }
        }
    }

    fn child_engine(&self, pause_at_start: bool) -> ExecutionEngine {
        let script = self.state.script_name();
        let caller_trace = self
            .frames
            .iter()
            .rev()
            .map(|line| format!("at {}:{}", script, line))
            .chain(self.caller_trace.iter().cloned())
            .collect();

        ExecutionEngine {
            scripts: Arc::clone(&self.scripts),
            evaluator: Arc::clone(&self.evaluator),
            commands: Arc::clone(&self.commands),
            host: Arc::clone(&self.host),
            controller: Arc::clone(&self.controller),
            instances: self.instances.clone(),
            debug: self.debug || pause_at_start,
            start_line: None,
            command_delay: self.command_delay,
            state: EngineState::new("", "", self.instances.clone()),
            frames: Vec::new(),
            caller_trace,
            handler_depth: self.handler_depth,
            nested: true,
            pause_at_start,
        }
    }

    fn copy_outputs(&mut self, bindings: &[ArgumentBinding], finished: &ScriptFinished) {
        for binding in bindings {
            let (Some(target), Some(value)) =
                (&binding.assign_to, finished.arguments.get(&binding.name))
            else {
                continue;
            };
            self.state.set_variable(target.clone(), value.clone());
        }
    }
}

fn argument_decl<'a>(script: &'a Script, name: &str) -> Result<&'a ArgumentDecl, EngineError> {
    script
        .arguments
        .iter()
        .find(|decl| decl.name == name)
        .ok_or_else(|| {
            EngineError::new(
                "ENGINE_ARGUMENT_UNKNOWN",
                format!(
                    "Argument \"{}\" is not declared in script \"{}\".",
                    name, script.name
                ),
            )
        })
}

fn direction_error(script: &str, name: &str) -> EngineError {
    EngineError::new(
        "ENGINE_ARGUMENT_DIRECTION",
        format!(
            "Argument \"{}\" of script \"{}\" does not flow that way.",
            name, script
        ),
    )
}
