use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use rpa_core::{Action, EngineError, Script, ScriptFinished, Value};
use rpa_runtime::{
    CommandRegistry, DebugController, EngineHost, ExecutionEngine, ExecutionEngineOptions,
    ExpressionEvaluator, InstanceRegistry, RunningScript,
};
use tracing::debug;

/// Script library parsed from JSON sources, with the entry already resolved.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub scripts: BTreeMap<String, Script>,
    pub entry_script: String,
}

#[derive(Clone, Default)]
pub struct CreateEngineOptions {
    /// JSON script sources keyed by their path.
    pub scripts_json: BTreeMap<String, String>,
    pub entry_script: Option<String>,
    pub entry_args: Option<BTreeMap<String, Value>>,
    pub evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    pub commands: Option<Arc<CommandRegistry>>,
    pub host: Option<Arc<dyn EngineHost>>,
    pub controller: Option<Arc<DebugController>>,
    pub instances: Option<InstanceRegistry>,
    pub debug: bool,
    /// Lines of the entry script to break at, on top of the breakpoints
    /// stored in the sources. Only honored in debug mode.
    pub breakpoints: BTreeSet<usize>,
    pub start_line: Option<usize>,
    pub command_delay: Option<Duration>,
}

/// An engine bound to its entry script and arguments, ready to run.
pub struct ProjectEngine {
    pub engine: ExecutionEngine,
    pub entry_script: String,
    pub entry_args: Option<BTreeMap<String, Value>>,
}

impl ProjectEngine {
    pub fn run(mut self) -> Result<ScriptFinished, EngineError> {
        self.engine.run(&self.entry_script, self.entry_args)
    }

    pub fn spawn(self) -> Result<RunningScript, EngineError> {
        self.engine.spawn(self.entry_script, self.entry_args)
    }
}

pub fn load_scripts_from_json_map(
    scripts_json: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, Script>, EngineError> {
    let mut scripts = BTreeMap::new();
    let mut origins: BTreeMap<String, &str> = BTreeMap::new();

    for (path, text) in scripts_json {
        let mut script: Script = serde_json::from_str(text).map_err(|error| {
            EngineError::configuration(
                "API_SCRIPT_JSON_INVALID",
                format!("Failed to parse \"{}\": {}", path, error),
            )
        })?;
        if script.name.trim().is_empty() {
            return Err(EngineError::configuration(
                "API_SCRIPT_NAME_EMPTY",
                format!("Script in \"{}\" has no name.", path),
            ));
        }
        if let Some(previous) = origins.insert(script.name.clone(), path) {
            return Err(EngineError::configuration(
                "API_SCRIPT_DUPLICATE",
                format!(
                    "Script \"{}\" is defined in both \"{}\" and \"{}\".",
                    script.name, previous, path
                ),
            ));
        }
        if script.source_file.is_none() {
            script.source_file = Some(path.clone());
        }
        debug!(script = %script.name, path = %path, "loaded script");
        scripts.insert(script.name.clone(), script);
    }

    Ok(scripts)
}

pub fn load_project_from_json_map(
    scripts_json: &BTreeMap<String, String>,
    entry_script: Option<String>,
) -> Result<LoadedProject, EngineError> {
    let scripts = load_scripts_from_json_map(scripts_json)?;
    let entry_script = resolve_entry_script(&scripts, entry_script)?;
    Ok(LoadedProject {
        scripts,
        entry_script,
    })
}

pub fn create_engine(options: CreateEngineOptions) -> Result<ProjectEngine, EngineError> {
    let mut project = load_project_from_json_map(&options.scripts_json, options.entry_script)?;
    if let Some(entry) = project.scripts.get_mut(&project.entry_script) {
        mark_breakpoints(&mut entry.actions, &options.breakpoints);
    }

    let engine = ExecutionEngine::new(ExecutionEngineOptions {
        scripts: project.scripts,
        evaluator: options.evaluator,
        commands: options.commands,
        host: options.host,
        controller: options.controller,
        debug: options.debug,
        start_line: options.start_line,
        command_delay: options.command_delay,
        instances: options.instances,
    })?;

    Ok(ProjectEngine {
        engine,
        entry_script: project.entry_script,
        entry_args: options.entry_args,
    })
}

/// Loads the project and runs it to the end on the calling thread.
pub fn run_project(options: CreateEngineOptions) -> Result<ScriptFinished, EngineError> {
    create_engine(options)?.run()
}

/// Loads the project and runs it on a worker thread.
pub fn spawn_project(options: CreateEngineOptions) -> Result<RunningScript, EngineError> {
    create_engine(options)?.spawn()
}

fn mark_breakpoints(actions: &mut [Action], lines: &BTreeSet<usize>) {
    for action in actions {
        if lines.contains(&action.line) {
            action.breakpoint = true;
        }
        mark_breakpoints(&mut action.children, lines);
    }
}

pub fn resolve_entry_script(
    scripts: &BTreeMap<String, Script>,
    explicit: Option<String>,
) -> Result<String, EngineError> {
    if let Some(entry) = explicit {
        if !scripts.contains_key(&entry) {
            return Err(EngineError::configuration(
                "API_ENTRY_SCRIPT_NOT_FOUND",
                format!("Entry script \"{}\" is not registered.", entry),
            ));
        }
        return Ok(entry);
    }

    if scripts.contains_key("main") {
        return Ok("main".to_string());
    }

    Err(EngineError::configuration(
        "API_ENTRY_MAIN_NOT_FOUND",
        "Expected script with name \"main\" as default entry.",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpa_core::{EngineStatus, FinishResult};

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    const MAIN: &str = r#"{
        "name": "main",
        "variables": [{ "name": "greeting", "value": "hi" }],
        "actions": [
            { "line": 1, "command": { "kind": "setVariable", "name": "greeting", "value": "greeting + \" there\"" } },
            { "line": 2, "command": { "kind": "setVariable", "name": "TaskResult", "value": "greeting" } }
        ]
    }"#;

    #[test]
    fn load_scripts_from_json_map_parses_each_source() {
        let scripts = load_scripts_from_json_map(&map(&[("flows/main.script.json", MAIN)]))
            .expect("load should pass");
        let main = scripts.get("main").expect("main");
        assert_eq!(main.actions.len(), 2);
        assert_eq!(main.source_file.as_deref(), Some("flows/main.script.json"));
    }

    #[test]
    fn load_scripts_from_json_map_rejects_invalid_json() {
        let error = load_scripts_from_json_map(&map(&[("bad.script.json", "{ nope")]))
            .expect_err("invalid json should fail");
        assert_eq!(error.code, "API_SCRIPT_JSON_INVALID");
        assert!(error.message.contains("bad.script.json"));
    }

    #[test]
    fn load_scripts_from_json_map_rejects_duplicate_names() {
        let error = load_scripts_from_json_map(&map(&[
            ("a/main.script.json", MAIN),
            ("b/main.script.json", MAIN),
        ]))
        .expect_err("duplicate should fail");
        assert_eq!(error.code, "API_SCRIPT_DUPLICATE");
    }

    #[test]
    fn load_project_uses_default_main_entry() {
        let project = load_project_from_json_map(&map(&[("main.script.json", MAIN)]), None)
            .expect("load should pass");
        assert_eq!(project.entry_script, "main");
    }

    #[test]
    fn load_project_returns_error_for_missing_explicit_entry() {
        let error = load_project_from_json_map(
            &map(&[("main.script.json", MAIN)]),
            Some("missing".to_string()),
        )
        .expect_err("missing entry should fail");
        assert_eq!(error.code, "API_ENTRY_SCRIPT_NOT_FOUND");
    }

    #[test]
    fn load_project_returns_error_without_main() {
        let error = load_project_from_json_map(
            &map(&[("other.script.json", r#"{ "name": "other" }"#)]),
            None,
        )
        .expect_err("default main should fail");
        assert_eq!(error.code, "API_ENTRY_MAIN_NOT_FOUND");
    }

    #[test]
    fn run_project_reports_task_result() {
        let finished = run_project(CreateEngineOptions {
            scripts_json: map(&[("main.script.json", MAIN)]),
            ..CreateEngineOptions::default()
        })
        .expect("run should start");
        assert_eq!(finished.result, FinishResult::Successful);
        assert_eq!(finished.task_result, "hi there");
    }

    #[test]
    fn create_engine_marks_breakpoints_on_the_entry_script() {
        let project = create_engine(CreateEngineOptions {
            scripts_json: map(&[("main.script.json", MAIN)]),
            debug: true,
            breakpoints: BTreeSet::from([2]),
            ..CreateEngineOptions::default()
        })
        .expect("engine should build");
        let handle = project.engine.handle();
        let running = project.spawn().expect("spawn should pass");

        assert!(handle.wait_for_status(EngineStatus::Paused, Duration::from_secs(5)));
        assert_eq!(handle.paused_line(), Some(2));
        assert!(handle.resume());
        let finished = running.join().expect("join");
        assert_eq!(finished.task_result, "hi there");
    }

    #[test]
    fn spawn_project_finishes_on_the_worker() {
        let controller = Arc::new(DebugController::new());
        let running = spawn_project(CreateEngineOptions {
            scripts_json: map(&[("main.script.json", MAIN)]),
            controller: Some(Arc::clone(&controller)),
            ..CreateEngineOptions::default()
        })
        .expect("spawn should pass");
        let finished = running.join().expect("join");
        assert_eq!(finished.result, FinishResult::Successful);
        assert_eq!(
            controller.status(),
            EngineStatus::Finished(FinishResult::Successful)
        );
    }
}
