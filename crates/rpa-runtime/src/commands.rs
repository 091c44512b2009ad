use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rpa_core::{EngineError, Value, BUILTIN_COMMAND_NAMES};

use crate::control::DebugController;
use crate::evaluator::ExpressionEvaluator;
use crate::instances::InstanceRegistry;
use crate::state::EngineState;

pub type CommandParams = BTreeMap<String, String>;

/// Contract of an external leaf command (browser, Office, UI automation...).
/// Parameter values are raw text; handlers resolve them through the context.
pub trait CommandHandler: Send + Sync {
    fn execute(
        &self,
        params: &CommandParams,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), EngineError>;
}

struct FnHandler<F>(F);

impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(&CommandParams, &mut CommandContext<'_>) -> Result<(), EngineError> + Send + Sync,
{
    fn execute(
        &self,
        params: &CommandParams,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), EngineError> {
        (self.0)(params, ctx)
    }
}

#[derive(Clone, Default)]
pub struct CommandRegistry {
    handlers: BTreeMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<(), EngineError> {
        let name = name.into();
        if BUILTIN_COMMAND_NAMES.contains(&name.as_str()) {
            return Err(EngineError::configuration(
                "ENGINE_COMMAND_RESERVED",
                format!("Command name \"{}\" is reserved by the engine.", name),
            ));
        }
        if self.handlers.contains_key(&name) {
            return Err(EngineError::configuration(
                "ENGINE_COMMAND_DUPLICATE",
                format!("Command \"{}\" is already registered.", name),
            ));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, handler: F) -> Result<(), EngineError>
    where
        F: Fn(&CommandParams, &mut CommandContext<'_>) -> Result<(), EngineError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, Arc::new(FnHandler(handler)))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// What a leaf command may touch while it runs.
pub struct CommandContext<'a> {
    state: &'a mut EngineState,
    evaluator: &'a dyn ExpressionEvaluator,
    controller: &'a DebugController,
    line: usize,
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(
        state: &'a mut EngineState,
        evaluator: &'a dyn ExpressionEvaluator,
        controller: &'a DebugController,
        line: usize,
    ) -> Self {
        Self {
            state,
            evaluator,
            controller,
            line,
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn state(&self) -> &EngineState {
        self.state
    }

    pub fn evaluate(&self, expression: &str) -> Result<Value, EngineError> {
        self.evaluator.evaluate(expression, &self.state.bindings())
    }

    pub fn render(&self, template: &str) -> Result<String, EngineError> {
        self.evaluator.render(template, &self.state.bindings())
    }

    /// Rendered parameter, or `None` when the command was configured
    /// without it.
    pub fn param(&self, params: &CommandParams, key: &str) -> Result<Option<String>, EngineError> {
        params
            .get(key)
            .map(|template| self.render(template))
            .transpose()
    }

    pub fn required_param(&self, params: &CommandParams, key: &str) -> Result<String, EngineError> {
        self.param(params, key)?.ok_or_else(|| {
            EngineError::new(
                "ENGINE_COMMAND_PARAM_MISSING",
                format!("Required parameter \"{}\" is missing.", key),
            )
        })
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.state.variable(name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.state.set_variable(name, value);
    }

    pub fn instances(&self) -> &InstanceRegistry {
        self.state.instances()
    }

    pub fn is_cancelled(&self) -> bool {
        self.controller.is_cancelled() || self.state.flags.cancellation_requested
    }

    pub fn sleep(&self, duration: Duration) -> Result<(), EngineError> {
        if self.controller.sleep(duration) && !self.is_cancelled() {
            Ok(())
        } else {
            Err(EngineError::cancelled())
        }
    }

    /// Re-runs `check` every `interval` until it reports `true`. Fails with
    /// `ENGINE_WAIT_TIMEOUT` once `timeout` has passed.
    pub fn poll_until<F>(
        &mut self,
        timeout: Duration,
        interval: Duration,
        mut check: F,
    ) -> Result<(), EngineError>
    where
        F: FnMut(&mut Self) -> Result<bool, EngineError>,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_cancelled() {
                return Err(EngineError::cancelled());
            }
            if check(self)? {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(EngineError::new(
                    "ENGINE_WAIT_TIMEOUT",
                    format!("Condition not met within {} ms.", timeout.as_millis()),
                ));
            }
            self.sleep(interval.min(deadline - now))?;
        }
    }
}
