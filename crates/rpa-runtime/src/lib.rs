mod commands;
mod control;
mod dates;
mod engine;
mod evaluator;
mod host;
mod instances;
mod state;
mod worker;

mod helpers {
    pub(crate) mod rhai_bridge;
}

pub use commands::{CommandContext, CommandHandler, CommandParams, CommandRegistry};
pub use control::{DebugCommand, DebugController, EngineHandle};
pub use dates::{calculate as calculate_date, DateRequest, DEFAULT_DATETIME_FORMAT, DEFAULT_DATE_FORMAT};
pub use engine::{ExecutionEngine, ExecutionEngineOptions};
pub use evaluator::{Bindings, ExpressionEvaluator, RhaiEvaluator};
pub use host::{ChannelHost, EngineHost, TracingHost};
pub use instances::{InstanceObject, InstanceRegistry};
pub use state::{Argument, ControlFlags, DebugFlags, EngineState};
pub use worker::RunningScript;
