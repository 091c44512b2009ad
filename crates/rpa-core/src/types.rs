use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ScriptError;
use crate::value::Value;

pub const TASK_RESULT_VARIABLE: &str = "TaskResult";
pub const DEFAULT_TASK_RESULT: &str = "Successfully Completed Script";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Record and re-raise.
    #[default]
    None,
    /// Record, log and continue with the next action.
    Ignore,
    /// Record, log as an error and re-raise.
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Logic {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Contains,
    StartsWith,
    EndsWith,
}

impl Comparison {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Contains => "contains",
            Self::StartsWith => "starts with",
            Self::EndsWith => "ends with",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Predicate {
    Expression {
        expr: String,
    },
    Compare {
        left: String,
        operator: Comparison,
        right: String,
    },
    VariableHasValue {
        name: String,
    },
    InstanceExists {
        name: String,
    },
}

impl Predicate {
    pub fn expression(expr: impl Into<String>) -> Self {
        Self::Expression { expr: expr.into() }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Expression { expr } => expr.clone(),
            Self::Compare {
                left,
                operator,
                right,
            } => format!("{} {} {}", left, operator.symbol(), right),
            Self::VariableHasValue { name } => format!("variable '{}' has value", name),
            Self::InstanceExists { name } => format!("instance '{}' exists", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LoopKind {
    /// `times` is an expression evaluated once when the loop starts.
    Count { times: String },
    While { predicate: Predicate },
    Collection { items: String, item_variable: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOperation {
    Add,
    Subtract,
    Next,
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateUnit {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentDirection {
    #[default]
    In,
    Out,
    InOut,
}

impl ArgumentDirection {
    pub fn accepts_input(self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    pub fn returns_output(self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentBinding {
    /// Argument name declared by the child script.
    pub name: String,
    /// Expression evaluated in the caller for In/InOut arguments.
    #[serde(default)]
    pub value: Option<String>,
    /// Caller variable receiving the child's final Out/InOut value.
    #[serde(default)]
    pub assign_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCategory {
    Scope,
    Marker,
    Terminal,
    Leaf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Command {
    If {
        predicate: Predicate,
    },
    MultiIf {
        logic: Logic,
        predicates: Vec<Predicate>,
    },
    Loop {
        mode: LoopKind,
        #[serde(default)]
        index_variable: Option<String>,
    },
    Retry {
        attempts: u32,
        #[serde(default)]
        delay_ms: u64,
        #[serde(default)]
        until: Option<Predicate>,
    },
    Try,
    Switch {
        selector: String,
    },
    Sequence,
    Else,
    Case {
        value: String,
    },
    DefaultCase,
    Catch {
        #[serde(default)]
        error_variable: Option<String>,
    },
    Finally,
    ExitLoop,
    NextLoop,
    StopTask,
    RunScript {
        script: String,
        #[serde(default)]
        arguments: Vec<ArgumentBinding>,
    },
    SetVariable {
        name: String,
        value: String,
    },
    Delay {
        milliseconds: u64,
    },
    ThrowError {
        message: String,
    },
    LogMessage {
        message: String,
        #[serde(default)]
        severity: Severity,
    },
    Comment {
        #[serde(default)]
        text: String,
    },
    DateCalculation {
        input: String,
        #[serde(default)]
        input_format: Option<String>,
        operation: DateOperation,
        unit: DateUnit,
        #[serde(default)]
        amount: Option<String>,
        #[serde(default)]
        output_format: Option<String>,
        output_variable: String,
    },
    Automation {
        name: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
    },
}

/// Names an automation handler may not take over.
pub const BUILTIN_COMMAND_NAMES: &[&str] = &[
    "If",
    "MultiIf",
    "Loop",
    "Retry",
    "Try",
    "Switch",
    "Sequence",
    "Else",
    "Case",
    "DefaultCase",
    "Catch",
    "Finally",
    "ExitLoop",
    "NextLoop",
    "StopTask",
    "RunScript",
    "SetVariable",
    "Delay",
    "ThrowError",
    "LogMessage",
    "Comment",
    "DateCalculation",
];

impl Command {
    pub fn category(&self) -> CommandCategory {
        match self {
            Self::If { .. }
            | Self::MultiIf { .. }
            | Self::Loop { .. }
            | Self::Retry { .. }
            | Self::Try
            | Self::Switch { .. }
            | Self::Sequence => CommandCategory::Scope,
            Self::Else
            | Self::Case { .. }
            | Self::DefaultCase
            | Self::Catch { .. }
            | Self::Finally => CommandCategory::Marker,
            Self::ExitLoop | Self::NextLoop | Self::StopTask => CommandCategory::Terminal,
            _ => CommandCategory::Leaf,
        }
    }

    pub fn is_scope(&self) -> bool {
        self.category() == CommandCategory::Scope
    }

    pub fn name(&self) -> &str {
        match self {
            Self::If { .. } => "If",
            Self::MultiIf { .. } => "MultiIf",
            Self::Loop { .. } => "Loop",
            Self::Retry { .. } => "Retry",
            Self::Try => "Try",
            Self::Switch { .. } => "Switch",
            Self::Sequence => "Sequence",
            Self::Else => "Else",
            Self::Case { .. } => "Case",
            Self::DefaultCase => "DefaultCase",
            Self::Catch { .. } => "Catch",
            Self::Finally => "Finally",
            Self::ExitLoop => "ExitLoop",
            Self::NextLoop => "NextLoop",
            Self::StopTask => "StopTask",
            Self::RunScript { .. } => "RunScript",
            Self::SetVariable { .. } => "SetVariable",
            Self::Delay { .. } => "Delay",
            Self::ThrowError { .. } => "ThrowError",
            Self::LogMessage { .. } => "LogMessage",
            Self::Comment { .. } => "Comment",
            Self::DateCalculation { .. } => "DateCalculation",
            Self::Automation { name, .. } => name.as_str(),
        }
    }

    /// One-line text shown in progress reports.
    pub fn describe(&self) -> String {
        match self {
            Self::If { predicate } => format!("If ({})", predicate.describe()),
            Self::MultiIf { logic, predicates } => {
                let joiner = match logic {
                    Logic::And => " AND ",
                    Logic::Or => " OR ",
                };
                let parts = predicates
                    .iter()
                    .map(Predicate::describe)
                    .collect::<Vec<_>>();
                format!("If ({})", parts.join(joiner))
            }
            Self::Loop { mode, .. } => match mode {
                LoopKind::Count { times } => format!("Loop {} times", times),
                LoopKind::While { predicate } => format!("Loop while ({})", predicate.describe()),
                LoopKind::Collection { items, .. } => format!("Loop over {}", items),
            },
            Self::Retry { attempts, .. } => format!("Retry up to {} times", attempts),
            Self::Switch { selector } => format!("Switch ({})", selector),
            Self::Case { value } => format!("Case '{}'", value),
            Self::RunScript { script, .. } => format!("Run script '{}'", script),
            Self::SetVariable { name, value } => format!("Set '{}' = {}", name, value),
            Self::Delay { milliseconds } => format!("Delay {} ms", milliseconds),
            Self::ThrowError { message } => format!("Throw '{}'", message),
            Self::LogMessage { message, .. } => format!("Log '{}'", message),
            Self::Comment { text } => format!("// {}", text),
            Self::DateCalculation {
                operation,
                unit,
                output_variable,
                ..
            } => format!(
                "Date {:?} {:?} into '{}'",
                operation, unit, output_variable
            ),
            Self::Automation { name, params } => {
                if params.is_empty() {
                    name.clone()
                } else {
                    let parts = params
                        .iter()
                        .map(|(key, value)| format!("{}={}", key, value))
                        .collect::<Vec<_>>();
                    format!("{} [{}]", name, parts.join(", "))
                }
            }
            _ => self.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub line: usize,
    pub command: Command,
    #[serde(default)]
    pub children: Vec<Action>,
    #[serde(default)]
    pub breakpoint: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

impl Action {
    pub fn new(line: usize, command: Command) -> Self {
        Self {
            line,
            command,
            children: Vec::new(),
            breakpoint: false,
            disabled: false,
            error_policy: ErrorPolicy::None,
        }
    }

    pub fn with_children(mut self, children: Vec<Action>) -> Self {
        self.children = children;
        self
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_breakpoint(mut self) -> Self {
        self.breakpoint = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn is_scope_start(&self) -> bool {
        self.command.is_scope()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentDecl {
    pub name: String,
    #[serde(default)]
    pub direction: ArgumentDirection,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub name: String,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub variables: Vec<VariableDecl>,
    #[serde(default)]
    pub arguments: Vec<ArgumentDecl>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Script {
    pub fn new(name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            name: name.into(),
            source_file: None,
            variables: Vec::new(),
            arguments: Vec::new(),
            actions,
        }
    }

    pub fn source_label(&self) -> String {
        self.source_file
            .clone()
            .unwrap_or_else(|| format!("{}.script.json", self.name))
    }
}

/// Outcome of dispatching one action, returned up the call stack in place
/// of shared break/continue/cancel flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Continue,
    Break,
    ContinueLoop,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishResult {
    Successful,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "result", rename_all = "snake_case")]
pub enum EngineStatus {
    Loaded,
    Running,
    Paused,
    Finished(FinishResult),
}

impl EngineStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptFinished {
    pub script: String,
    pub result: FinishResult,
    pub error: Option<ScriptError>,
    pub errors: Vec<ScriptError>,
    pub elapsed: Duration,
    pub task_result: String,
    pub variables: BTreeMap<String, Value>,
    pub arguments: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    Progress { message: String, severity: Severity },
    LineChanged { line: usize },
    Finished { finished: Box<ScriptFinished> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_split_scope_marker_terminal_leaf() {
        assert!(Command::Try.is_scope());
        assert!(Command::Sequence.is_scope());
        assert_eq!(Command::Else.category(), CommandCategory::Marker);
        assert_eq!(Command::NextLoop.category(), CommandCategory::Terminal);
        assert_eq!(
            Command::Automation {
                name: "ClickElement".to_string(),
                params: BTreeMap::new(),
            }
            .category(),
            CommandCategory::Leaf
        );
    }

    #[test]
    fn builtin_names_cover_every_builtin_variant() {
        let builtins = [
            Command::Try,
            Command::Sequence,
            Command::Else,
            Command::DefaultCase,
            Command::Finally,
            Command::ExitLoop,
            Command::NextLoop,
            Command::StopTask,
        ];
        for command in builtins {
            assert!(BUILTIN_COMMAND_NAMES.contains(&command.name()));
        }
    }

    #[test]
    fn action_tree_deserializes_from_json() {
        let json = r#"
{
  "name": "main",
  "variables": [{ "name": "x", "value": 1 }],
  "actions": [
    {
      "line": 1,
      "command": {
        "kind": "loop",
        "mode": { "type": "count", "times": "3" },
        "index_variable": "i"
      },
      "children": [
        { "line": 2, "command": { "kind": "nextLoop" }, "error_policy": "ignore" }
      ]
    },
    {
      "line": 3,
      "command": {
        "kind": "if",
        "predicate": { "type": "compare", "left": "x", "operator": "equal", "right": "1" }
      },
      "breakpoint": true
    }
  ]
}
"#;
        let script: Script = serde_json::from_str(json).expect("script should parse");
        assert_eq!(script.name, "main");
        assert_eq!(script.variables[0].value, Value::Int(1));
        let looped = &script.actions[0];
        assert!(looped.is_scope_start());
        assert!(matches!(
            &looped.command,
            Command::Loop { mode: LoopKind::Count { times }, index_variable: Some(index) }
                if times == "3" && index == "i"
        ));
        assert_eq!(looped.children[0].error_policy, ErrorPolicy::Ignore);
        assert!(script.actions[1].breakpoint);
        assert_eq!(script.source_label(), "main.script.json");
    }

    #[test]
    fn describe_is_readable() {
        let command = Command::MultiIf {
            logic: Logic::And,
            predicates: vec![Predicate::expression("a"), Predicate::expression("b")],
        };
        assert_eq!(command.describe(), "If (a AND b)");
        assert_eq!(
            Command::Loop {
                mode: LoopKind::Count {
                    times: "3".to_string()
                },
                index_variable: None,
            }
            .describe(),
            "Loop 3 times"
        );
        assert_eq!(Command::StopTask.describe(), "StopTask");
    }

    #[test]
    fn status_serializes_with_result() {
        let json = serde_json::to_string(&EngineStatus::Finished(FinishResult::Cancelled))
            .expect("status json");
        assert_eq!(json, r#"{"state":"finished","result":"cancelled"}"#);
        assert!(EngineStatus::Finished(FinishResult::Error).is_finished());
        assert!(!EngineStatus::Paused.is_finished());
    }
}
