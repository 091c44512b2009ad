use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rpa_core::{
    Action, ArgumentBinding, Command, CommandCategory, ControlSignal, EngineError, EngineStatus,
    ErrorPolicy, FinishResult, LoopKind, Predicate, Script, ScriptError, ScriptFinished, Severity,
    Value, DEFAULT_TASK_RESULT, TASK_RESULT_VARIABLE,
};
use tracing::{debug, error, info, warn};

use crate::commands::{CommandContext, CommandRegistry};
use crate::control::{DebugCommand, DebugController, EngineHandle, PauseOutcome};
use crate::evaluator::{ExpressionEvaluator, RhaiEvaluator};
use crate::host::{EngineHost, TracingHost};
use crate::instances::InstanceRegistry;
use crate::state::EngineState;

mod callstack;
mod control_flow;
mod dispatch;
mod eval;
mod leaf;
mod lifecycle;
mod stepping;

pub use lifecycle::{ExecutionEngine, ExecutionEngineOptions};
