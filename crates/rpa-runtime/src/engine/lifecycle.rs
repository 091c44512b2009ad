use super::*;

#[derive(Clone, Default)]
pub struct ExecutionEngineOptions {
    /// Script library keyed by script name. The entry script and every
    /// `RunScript` target must be in here.
    pub scripts: BTreeMap<String, Script>,
    pub evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    pub commands: Option<Arc<CommandRegistry>>,
    pub host: Option<Arc<dyn EngineHost>>,
    pub controller: Option<Arc<DebugController>>,
    pub debug: bool,
    /// Run-from-line: non-scope actions above this line are skipped.
    pub start_line: Option<usize>,
    /// Fixed pause after every leaf command.
    pub command_delay: Option<Duration>,
    pub instances: Option<InstanceRegistry>,
}

pub struct ExecutionEngine {
    pub(super) scripts: Arc<BTreeMap<String, Script>>,
    pub(super) evaluator: Arc<dyn ExpressionEvaluator>,
    pub(super) commands: Arc<CommandRegistry>,
    pub(super) host: Arc<dyn EngineHost>,
    pub(super) controller: Arc<DebugController>,
    pub(super) instances: InstanceRegistry,
    pub(super) debug: bool,
    pub(super) start_line: Option<usize>,
    pub(super) command_delay: Duration,

    pub(super) state: EngineState,
    /// Lines of the actions currently being dispatched, outermost first.
    pub(super) frames: Vec<usize>,
    /// Stack-trace lines of the callers, innermost first.
    pub(super) caller_trace: Vec<String>,
    /// Enclosing Try/Retry scopes, including those of calling scripts.
    pub(super) handler_depth: usize,
    pub(super) nested: bool,
    pub(super) pause_at_start: bool,
}

impl ExecutionEngine {
    pub fn new(options: ExecutionEngineOptions) -> Result<Self, EngineError> {
        for (name, script) in &options.scripts {
            if name != &script.name {
                return Err(EngineError::configuration(
                    "ENGINE_SCRIPT_NAME_MISMATCH",
                    format!(
                        "Script registered as \"{}\" is named \"{}\".",
                        name, script.name
                    ),
                ));
            }
            validate_actions(&script.name, &script.actions)?;
        }

        let instances = options.instances.unwrap_or_default();
        Ok(Self {
            scripts: Arc::new(options.scripts),
            evaluator: options
                .evaluator
                .unwrap_or_else(|| Arc::new(RhaiEvaluator::new())),
            commands: options
                .commands
                .unwrap_or_else(|| Arc::new(CommandRegistry::new())),
            host: options.host.unwrap_or_else(|| Arc::new(TracingHost)),
            controller: options
                .controller
                .unwrap_or_else(|| Arc::new(DebugController::new())),
            state: EngineState::new("", "", instances.clone()),
            instances,
            debug: options.debug,
            start_line: options.start_line,
            command_delay: options.command_delay.unwrap_or(Duration::ZERO),
            frames: Vec::new(),
            caller_trace: Vec::new(),
            handler_depth: 0,
            nested: false,
            pause_at_start: false,
        })
    }

    /// Control surface for another thread.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle::new(Arc::clone(&self.controller))
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn status(&self) -> EngineStatus {
        self.controller.status()
    }

    /// Runs `entry` to the end on the calling thread. `Err` is reserved for
    /// runs that cannot start; failures during the run are reported through
    /// the returned [`ScriptFinished`].
    pub fn run(
        &mut self,
        entry: &str,
        args: Option<BTreeMap<String, Value>>,
    ) -> Result<ScriptFinished, EngineError> {
        let scripts = Arc::clone(&self.scripts);
        let script = scripts.get(entry).ok_or_else(|| {
            EngineError::configuration(
                "ENGINE_SCRIPT_NOT_FOUND",
                format!("Script \"{}\" is not loaded.", entry),
            )
        })?;
        self.state = EngineState::for_script(script, args.unwrap_or_default(), self.instances.clone())?;
        self.frames.clear();

        if self.nested {
            debug!(script = entry, "child script started");
        } else {
            self.instances.merge_from(InstanceRegistry::global());
            self.controller.set_status(EngineStatus::Running);
            info!(script = entry, debug = self.debug, "script started");
        }

        let started = Instant::now();
        let outcome = self.execute_top_level(&script.actions);
        let result = self.resolve_result(outcome);
        let finished = self.build_finished(script, result, started.elapsed());

        if !self.nested {
            self.controller.set_status(EngineStatus::Finished(result));
            self.host.on_finished(&finished);
        }
        Ok(finished)
    }

    fn execute_top_level(&mut self, actions: &[Action]) -> Result<(), EngineError> {
        for action in actions {
            if self.is_cancelled() {
                return Ok(());
            }
            match self.execute_action(action)? {
                ControlSignal::Continue => {}
                ControlSignal::Cancel => return Ok(()),
                signal => warn!(
                    line = action.line,
                    "{:?} outside of a loop is ignored",
                    signal
                ),
            }
        }
        Ok(())
    }

    fn resolve_result(&mut self, outcome: Result<(), EngineError>) -> FinishResult {
        if self.is_cancelled() {
            return FinishResult::Cancelled;
        }
        match outcome {
            Err(error) => {
                if error.line.is_none() {
                    self.record_error(error, 0);
                }
                FinishResult::Error
            }
            Ok(()) if self.state.child_failure_pending() => FinishResult::Error,
            Ok(()) => FinishResult::Successful,
        }
    }

    fn build_finished(
        &self,
        script: &Script,
        result: FinishResult,
        elapsed: Duration,
    ) -> ScriptFinished {
        let error = match result {
            FinishResult::Error => self.state.last_error().cloned(),
            _ => None,
        };
        ScriptFinished {
            script: script.name.clone(),
            result,
            error,
            errors: self.state.errors().to_vec(),
            elapsed,
            task_result: self.task_result(),
            variables: self.state.variables().clone(),
            arguments: self.state.argument_values(),
        }
    }

    fn task_result(&self) -> String {
        self.state
            .variable(TASK_RESULT_VARIABLE)
            .filter(|value| !value.is_empty())
            .map(Value::to_text)
            .unwrap_or_else(|| DEFAULT_TASK_RESULT.to_string())
    }

    /// Host cancellation or `StopTask`.
    pub(super) fn is_cancelled(&self) -> bool {
        self.controller.is_cancelled() || self.state.flags.cancellation_requested
    }
}

fn validate_actions(script: &str, actions: &[Action]) -> Result<(), EngineError> {
    for action in actions {
        if !action.is_scope_start() && !action.children.is_empty() {
            return Err(EngineError::configuration(
                "ENGINE_LEAF_WITH_CHILDREN",
                format!(
                    "{} at {}:{} cannot own child actions.",
                    action.command.name(),
                    script,
                    action.line
                ),
            ));
        }
        validate_actions(script, &action.children)?;
    }
    Ok(())
}

#[cfg(test)]
mod lifecycle_tests {
    use super::runtime_test_support::*;
    use super::*;

    #[test]
    fn leaf_actions_may_not_own_children() {
        let broken = script(
            "main",
            &[],
            vec![set(1, "x", "1").with_children(vec![set(2, "y", "2")])],
        );
        let error = ExecutionEngine::new(options(vec![broken]))
            .err()
            .expect("leaf with children should be rejected");
        assert_eq!(error.code, "ENGINE_LEAF_WITH_CHILDREN");
    }

    #[test]
    fn library_keys_must_match_script_names() {
        let mut options = options(vec![script("main", &[], Vec::new())]);
        let renamed = options.scripts.remove("main").expect("main");
        options.scripts.insert("other".to_string(), renamed);
        let error = ExecutionEngine::new(options)
            .err()
            .expect("mismatch should be rejected");
        assert_eq!(error.code, "ENGINE_SCRIPT_NAME_MISMATCH");
    }

    #[test]
    fn unknown_entry_script_does_not_start() {
        let mut engine = engine(vec![script("main", &[], Vec::new())]);
        let error = engine.run("missing", None).expect_err("missing entry");
        assert_eq!(error.code, "ENGINE_SCRIPT_NOT_FOUND");
        assert_eq!(engine.status(), EngineStatus::Loaded);
    }

    #[test]
    fn task_result_defaults_and_can_be_overridden() {
        let finished = run_main(vec![script("main", &[], vec![set(1, "x", "1")])]);
        assert_eq!(finished.result, FinishResult::Successful);
        assert_eq!(finished.task_result, DEFAULT_TASK_RESULT);

        let finished = run_main(vec![script(
            "main",
            &[],
            vec![set(1, TASK_RESULT_VARIABLE, "\"3 invoices booked\"")],
        )]);
        assert_eq!(finished.task_result, "3 invoices booked");
    }

    #[test]
    fn finished_status_is_published_on_the_controller() {
        let mut engine = engine(vec![script("main", &[], vec![throw(1, "boom")])]);
        let finished = engine.run("main", None).expect("run");
        assert_eq!(finished.result, FinishResult::Error);
        assert_eq!(engine.status(), EngineStatus::Finished(FinishResult::Error));
        let error = finished.error.expect("last error");
        assert_eq!(error.code, "ENGINE_THROWN");
        assert_eq!(error.line, 1);
        assert_eq!(error.source_file, "main.script.json");
    }

    #[test]
    fn each_run_picks_up_globally_published_instances() {
        let name = "lifecycle-test-window";
        let mut engine = engine(vec![script(
            "main",
            &[],
            vec![Action::new(
                1,
                Command::If {
                    predicate: Predicate::InstanceExists {
                        name: name.to_string(),
                    },
                },
            )
            .with_children(vec![set(2, "found", "true")])],
        )]);

        let first = engine.run("main", None).expect("first run");
        assert!(!first.variables.contains_key("found"));

        InstanceRegistry::new().publish(name, Arc::new(7u8));
        let second = engine.run("main", None).expect("second run");
        InstanceRegistry::global().remove(name);

        assert_eq!(second.variables.get("found"), Some(&Value::Bool(true)));
    }

    #[test]
    fn stray_loop_signals_at_top_level_are_ignored() {
        let finished = run_main(vec![script(
            "main",
            &[],
            vec![Action::new(1, Command::ExitLoop), set(2, "after", "true")],
        )]);
        assert_eq!(finished.result, FinishResult::Successful);
        assert_eq!(finished.variables["after"], Value::Bool(true));
    }
}
