use super::*;
use crate::commands::CommandParams;
use crate::dates::{self, DateRequest};

impl ExecutionEngine {
    pub(super) fn execute_leaf(&mut self, action: &Action) -> Result<ControlSignal, EngineError> {
        match &action.command {
            Command::RunScript { script, arguments } => {
                self.execute_run_script(action, script, arguments)
            }
            Command::SetVariable { name, value } => {
                if name.trim().is_empty() {
                    return Err(EngineError::new(
                        "ENGINE_VARIABLE_NAME_EMPTY",
                        "SetVariable needs a variable name.",
                    ));
                }
                let value = self.evaluate(value)?;
                self.state.set_variable(name.clone(), value);
                Ok(ControlSignal::Continue)
            }
            Command::Delay { milliseconds } => {
                if self.controller.sleep(Duration::from_millis(*milliseconds)) {
                    Ok(ControlSignal::Continue)
                } else {
                    Ok(ControlSignal::Cancel)
                }
            }
            Command::ThrowError { message } => {
                Err(EngineError::new("ENGINE_THROWN", self.render(message)?))
            }
            Command::LogMessage { message, severity } => {
                let message = self.render(message)?;
                info!(script = self.state.script_name(), line = action.line, "{}", message);
                self.host.on_progress(&message, *severity);
                Ok(ControlSignal::Continue)
            }
            Command::Comment { .. } => Ok(ControlSignal::Continue),
            Command::DateCalculation {
                input,
                input_format,
                operation,
                unit,
                amount,
                output_format,
                output_variable,
            } => {
                let input = self.render(input)?;
                let amount = match amount {
                    Some(expression) => self.evaluate(expression)?.as_int().ok_or_else(|| {
                        EngineError::evaluation(
                            "ENGINE_DATE_AMOUNT_INVALID",
                            format!("Date amount \"{}\" is not an integer.", expression),
                        )
                    })?,
                    None => 1,
                };
                let output = dates::calculate(&DateRequest {
                    input: &input,
                    input_format: input_format.as_deref(),
                    operation: *operation,
                    unit: *unit,
                    amount,
                    output_format: output_format.as_deref(),
                })?;
                self.state
                    .set_variable(output_variable.clone(), Value::String(output));
                Ok(ControlSignal::Continue)
            }
            Command::Automation { name, params } => self.execute_automation(action, name, params),
            other => Err(EngineError::configuration(
                "ENGINE_COMMAND_NOT_LEAF",
                format!("{} is not a leaf command.", other.name()),
            )),
        }
    }

    fn execute_automation(
        &mut self,
        action: &Action,
        name: &str,
        params: &CommandParams,
    ) -> Result<ControlSignal, EngineError> {
        let handler = self.commands.get(name).ok_or_else(|| {
            EngineError::configuration(
                "ENGINE_COMMAND_UNKNOWN",
                format!("No handler is registered for command \"{}\".", name),
            )
        })?;

        let mut ctx = CommandContext::new(
            &mut self.state,
            self.evaluator.as_ref(),
            self.controller.as_ref(),
            action.line,
        );
        handler.execute(params, &mut ctx)?;

        if self.is_cancelled() {
            Ok(ControlSignal::Cancel)
        } else {
            Ok(ControlSignal::Continue)
        }
    }
}

#[cfg(test)]
mod leaf_tests {
    use super::runtime_test_support::*;
    use super::*;
    use rpa_core::{DateOperation, DateUnit};

    #[test]
    fn log_message_renders_placeholders() {
        let (host, events) = crate::host::ChannelHost::new();
        let mut options = options(vec![script(
            "main",
            &[("count", Value::Int(3))],
            vec![Action::new(
                1,
                Command::LogMessage {
                    message: "found ${count} rows".to_string(),
                    severity: Severity::Warning,
                },
            )],
        )]);
        options.host = Some(Arc::new(host));
        ExecutionEngine::new(options)
            .expect("engine")
            .run("main", None)
            .expect("run");

        let logged = events.try_iter().any(|event| {
            event
                == rpa_core::HostEvent::Progress {
                    message: "found 3 rows".to_string(),
                    severity: Severity::Warning,
                }
        });
        assert!(logged);
    }

    #[test]
    fn date_calculation_writes_the_output_variable() {
        let finished = run_main(vec![script(
            "main",
            &[("start", Value::string("2024-01-31"))],
            vec![Action::new(
                1,
                Command::DateCalculation {
                    input: "${start}".to_string(),
                    input_format: None,
                    operation: DateOperation::Add,
                    unit: DateUnit::Month,
                    amount: Some("1".to_string()),
                    output_format: None,
                    output_variable: "due".to_string(),
                },
            )],
        )]);
        assert_eq!(finished.variables["due"], Value::string("2024-02-29"));
    }

    #[test]
    fn automation_commands_run_through_the_registry() {
        let mut registry = CommandRegistry::new();
        registry
            .register_fn("OpenBrowser", |params, ctx| {
                let url = ctx.required_param(params, "url")?;
                ctx.instances().insert("browser", Arc::new(url.clone()));
                ctx.set_variable("opened", Value::String(url));
                Ok(())
            })
            .expect("register");

        let mut options = options(vec![script(
            "main",
            &[("site", Value::string("example.test"))],
            vec![
                Action::new(
                    1,
                    Command::Automation {
                        name: "OpenBrowser".to_string(),
                        params: CommandParams::from([(
                            "url".to_string(),
                            "https://${site}".to_string(),
                        )]),
                    },
                ),
                when(
                    2,
                    "true",
                    vec![Action::new(
                        3,
                        Command::Automation {
                            name: "CloseBrowser".to_string(),
                            params: CommandParams::new(),
                        },
                    )],
                ),
            ],
        )]);
        options.commands = Some(Arc::new(registry));
        let instances = options.instances.clone().expect("instances");
        let finished = ExecutionEngine::new(options)
            .expect("engine")
            .run("main", None)
            .expect("run");

        assert_eq!(
            finished.variables["opened"],
            Value::string("https://example.test")
        );
        assert!(instances.contains("browser"));
        assert_eq!(finished.result, FinishResult::Error);
        let error = finished.error.expect("unknown command");
        assert_eq!(error.code, "ENGINE_COMMAND_UNKNOWN");
        assert_eq!(error.line, 3);
    }

    #[test]
    fn cancelled_handler_becomes_a_cancel_signal() {
        let mut registry = CommandRegistry::new();
        registry
            .register_fn("WaitForWindow", |_, ctx| {
                ctx.poll_until(Duration::from_secs(5), Duration::from_millis(1), |ctx| {
                    Ok(ctx.variable("never").is_some())
                })
            })
            .expect("register");

        let mut options = options(vec![script(
            "main",
            &[],
            vec![
                Action::new(
                    1,
                    Command::Automation {
                        name: "WaitForWindow".to_string(),
                        params: CommandParams::new(),
                    },
                ),
                set(2, "after", "true"),
            ],
        )]);
        options.commands = Some(Arc::new(registry));
        let running = ExecutionEngine::new(options)
            .expect("engine")
            .spawn("main", None)
            .expect("spawn");
        std::thread::sleep(Duration::from_millis(20));
        running.handle().request_cancel();
        let finished = running.join().expect("join");
        assert_eq!(finished.result, FinishResult::Cancelled);
        assert!(finished.errors.is_empty());
        assert!(!finished.variables.contains_key("after"));
    }
}
