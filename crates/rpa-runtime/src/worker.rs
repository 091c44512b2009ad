use std::collections::BTreeMap;
use std::thread::{self, JoinHandle};

use rpa_core::{EngineError, ScriptFinished, Value};

use crate::control::EngineHandle;
use crate::engine::ExecutionEngine;

/// A run executing on its own worker thread.
pub struct RunningScript {
    handle: EngineHandle,
    join: JoinHandle<Result<ScriptFinished, EngineError>>,
}

impl RunningScript {
    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the worker. A panicking worker surfaces as
    /// `ENGINE_WORKER_PANICKED`.
    pub fn join(self) -> Result<ScriptFinished, EngineError> {
        self.join.join().map_err(|_| {
            EngineError::new("ENGINE_WORKER_PANICKED", "Script worker thread panicked.")
        })?
    }
}

impl ExecutionEngine {
    pub fn spawn(
        mut self,
        entry: impl Into<String>,
        args: Option<BTreeMap<String, Value>>,
    ) -> Result<RunningScript, EngineError> {
        let entry = entry.into();
        let handle = self.handle();
        let join = thread::Builder::new()
            .name(format!("rpa-run-{}", entry))
            .spawn(move || self.run(&entry, args))
            .map_err(|error| {
                EngineError::new(
                    "ENGINE_WORKER_SPAWN",
                    format!("Failed to start script worker: {}", error),
                )
            })?;
        Ok(RunningScript { handle, join })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExecutionEngineOptions;
    use crate::instances::InstanceRegistry;
    use rpa_core::{Action, Command, EngineStatus, FinishResult, LoopKind, Script};
    use std::time::{Duration, Instant};

    #[test]
    fn cancelling_an_endless_loop_finishes_cancelled() {
        let script = Script::new(
            "main",
            vec![Action::new(
                1,
                Command::Loop {
                    mode: LoopKind::While {
                        predicate: rpa_core::Predicate::expression("true"),
                    },
                    index_variable: Some("i".to_string()),
                },
            )
            .with_children(vec![Action::new(2, Command::Delay { milliseconds: 1 })])],
        );
        let engine = ExecutionEngine::new(ExecutionEngineOptions {
            scripts: BTreeMap::from([("main".to_string(), script)]),
            instances: Some(InstanceRegistry::new()),
            ..ExecutionEngineOptions::default()
        })
        .expect("engine");

        let running = engine.spawn("main", None).expect("spawn");
        assert!(running
            .handle()
            .wait_for_status(EngineStatus::Running, Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        let cancelled_at = Instant::now();
        running.handle().request_cancel();

        let finished = running.join().expect("join");
        assert_eq!(finished.result, FinishResult::Cancelled);
        assert!(cancelled_at.elapsed() < Duration::from_secs(5));
        assert!(finished.errors.is_empty());
    }
}
