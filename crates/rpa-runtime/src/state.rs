use std::collections::BTreeMap;

use rpa_core::{ArgumentDirection, EngineError, ErrorPolicy, Script, ScriptError, Value};

use crate::evaluator::Bindings;
use crate::instances::InstanceRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlFlags {
    /// Set by `StopTask`. Host cancellation lives on the controller.
    pub cancellation_requested: bool,
    pub child_script_failed: bool,
    pub child_script_error_acknowledged: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugFlags {
    pub is_paused: bool,
    pub pending_step_over: bool,
    pub pending_step_into: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub direction: ArgumentDirection,
    pub value: Value,
}

/// Mutable context of one script run. Owned by exactly one engine.
#[derive(Debug)]
pub struct EngineState {
    script_name: String,
    source_file: String,
    variables: BTreeMap<String, Value>,
    arguments: BTreeMap<String, Argument>,
    instances: InstanceRegistry,
    errors: Vec<ScriptError>,
    pub(crate) flags: ControlFlags,
    pub(crate) debug: DebugFlags,
    pub(crate) current_error_policy: ErrorPolicy,
}

impl EngineState {
    pub fn new(
        script_name: impl Into<String>,
        source_file: impl Into<String>,
        instances: InstanceRegistry,
    ) -> Self {
        Self {
            script_name: script_name.into(),
            source_file: source_file.into(),
            variables: BTreeMap::new(),
            arguments: BTreeMap::new(),
            instances,
            errors: Vec::new(),
            flags: ControlFlags::default(),
            debug: DebugFlags::default(),
            current_error_policy: ErrorPolicy::None,
        }
    }

    pub(crate) fn for_script(
        script: &Script,
        entry_args: BTreeMap<String, Value>,
        instances: InstanceRegistry,
    ) -> Result<Self, EngineError> {
        let mut state = Self::new(script.name.clone(), script.source_label(), instances);

        for decl in &script.variables {
            if state.variables.contains_key(&decl.name) {
                return Err(EngineError::configuration(
                    "ENGINE_VARIABLE_DUPLICATE",
                    format!(
                        "Variable \"{}\" is declared twice in script \"{}\".",
                        decl.name, script.name
                    ),
                ));
            }
            state.variables.insert(decl.name.clone(), decl.value.clone());
        }

        for decl in &script.arguments {
            if state.variables.contains_key(&decl.name) || state.arguments.contains_key(&decl.name)
            {
                return Err(EngineError::configuration(
                    "ENGINE_STORE_NAME_CONFLICT",
                    format!(
                        "Argument \"{}\" collides with another variable or argument in script \"{}\".",
                        decl.name, script.name
                    ),
                ));
            }
            state.arguments.insert(
                decl.name.clone(),
                Argument {
                    direction: decl.direction,
                    value: decl.value.clone(),
                },
            );
        }

        for (name, value) in entry_args {
            let Some(argument) = state.arguments.get_mut(&name) else {
                return Err(EngineError::configuration(
                    "ENGINE_ARGUMENT_UNKNOWN",
                    format!(
                        "Argument \"{}\" is not declared in script \"{}\".",
                        name, script.name
                    ),
                ));
            };
            if !argument.direction.accepts_input() {
                return Err(EngineError::configuration(
                    "ENGINE_ARGUMENT_DIRECTION",
                    format!("Argument \"{}\" is output-only and takes no value.", name),
                ));
            }
            argument.value = value;
        }

        Ok(state)
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    /// Variables first, then arguments.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables
            .get(name)
            .or_else(|| self.arguments.get(name).map(|argument| &argument.value))
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    pub fn arguments(&self) -> &BTreeMap<String, Argument> {
        &self.arguments
    }

    pub fn argument_values(&self) -> BTreeMap<String, Value> {
        self.arguments
            .iter()
            .map(|(name, argument)| (name.clone(), argument.value.clone()))
            .collect()
    }

    /// Writes an argument when one has that name, otherwise a variable. The
    /// two stores stay disjoint.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(argument) = self.arguments.get_mut(&name) {
            argument.value = value;
            return;
        }
        self.variables.insert(name, value);
    }

    /// Snapshot handed to the expression evaluator.
    pub fn bindings(&self) -> Bindings {
        let mut bindings = self.variables.clone();
        for (name, argument) in &self.arguments {
            bindings.insert(name.clone(), argument.value.clone());
        }
        bindings
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &self.instances
    }

    pub fn errors(&self) -> &[ScriptError] {
        &self.errors
    }

    pub fn last_error(&self) -> Option<&ScriptError> {
        self.errors.last()
    }

    pub(crate) fn record_error(&mut self, error: ScriptError) {
        self.errors.push(error);
    }

    pub(crate) fn truncate_errors(&mut self, len: usize) {
        self.errors.truncate(len);
    }

    pub(crate) fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn flags(&self) -> ControlFlags {
        self.flags
    }

    pub fn debug_flags(&self) -> DebugFlags {
        self.debug
    }

    pub fn current_error_policy(&self) -> ErrorPolicy {
        self.current_error_policy
    }

    pub(crate) fn child_failure_pending(&self) -> bool {
        self.flags.child_script_failed && !self.flags.child_script_error_acknowledged
    }

    pub(crate) fn acknowledge_child_failure(&mut self) {
        if self.flags.child_script_failed {
            self.flags.child_script_failed = false;
            self.flags.child_script_error_acknowledged = true;
        }
    }
}
