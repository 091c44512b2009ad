use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rpa_core::EngineStatus;

/// Host decision while the engine sits on a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCommand {
    Resume,
    StepOver,
    StepInto,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PauseOutcome {
    Command(DebugCommand),
    Cancelled,
}

#[derive(Debug)]
struct ControlState {
    status: EngineStatus,
    paused_line: Option<usize>,
    pause_requested: bool,
    pending: Option<DebugCommand>,
    disposed: bool,
}

/// Shared between the worker thread and the host. Pauses block on a
/// condition variable; cancellation is an atomic flag so the dispatch loop
/// can poll it without taking the lock.
#[derive(Debug)]
pub struct DebugController {
    cancel_requested: AtomicBool,
    state: Mutex<ControlState>,
    signal: Condvar,
}

impl Default for DebugController {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugController {
    pub fn new() -> Self {
        Self {
            cancel_requested: AtomicBool::new(false),
            state: Mutex::new(ControlState {
                status: EngineStatus::Loaded,
                paused_line: None,
                pause_requested: false,
                pending: None,
                disposed: false,
            }),
            signal: Condvar::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
        let _state = self.state.lock();
        self.signal.notify_all();
    }

    /// The host went away: nobody can resume a pause any more.
    pub fn dispose(&self) {
        self.state.lock().disposed = true;
        self.request_cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    pub fn request_pause(&self) {
        self.state.lock().pause_requested = true;
    }

    /// Delivers a debug command. Only a paused engine accepts commands,
    /// except `Resume`, which also withdraws a pause request that has not
    /// been honoured yet.
    pub fn send(&self, command: DebugCommand) -> bool {
        let mut state = self.state.lock();
        if state.status != EngineStatus::Paused {
            if command == DebugCommand::Resume && state.pause_requested {
                state.pause_requested = false;
                return true;
            }
            return false;
        }
        state.pending = Some(command);
        self.signal.notify_all();
        true
    }

    pub fn status(&self) -> EngineStatus {
        self.state.lock().status
    }

    pub fn paused_line(&self) -> Option<usize> {
        self.state.lock().paused_line
    }

    pub(crate) fn set_status(&self, status: EngineStatus) {
        self.state.lock().status = status;
    }

    pub(crate) fn take_pause_request(&self) -> bool {
        let mut state = self.state.lock();
        std::mem::replace(&mut state.pause_requested, false)
    }

    pub(crate) fn wait_while_paused(&self, line: usize) -> PauseOutcome {
        let mut state = self.state.lock();
        state.status = EngineStatus::Paused;
        state.paused_line = Some(line);
        state.pending = None;
        state.pause_requested = false;

        loop {
            if self.is_cancelled() {
                state.status = EngineStatus::Running;
                state.paused_line = None;
                return PauseOutcome::Cancelled;
            }
            if let Some(command) = state.pending.take() {
                state.status = EngineStatus::Running;
                state.paused_line = None;
                return PauseOutcome::Command(command);
            }
            self.signal.wait(&mut state);
        }
    }

    /// Sleeps for `duration` unless cancellation arrives first. Returns
    /// `false` when cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_cancelled();
        }
        let deadline = Instant::now() + duration;
        let mut state = self.state.lock();
        loop {
            if self.is_cancelled() {
                return false;
            }
            if Instant::now() >= deadline {
                return true;
            }
            self.signal.wait_until(&mut state, deadline);
        }
    }
}

/// Control-signal surface handed to the host (GUI debugger or batch runner).
#[derive(Debug, Clone)]
pub struct EngineHandle {
    controller: Arc<DebugController>,
}

impl EngineHandle {
    pub fn new(controller: Arc<DebugController>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &Arc<DebugController> {
        &self.controller
    }

    pub fn request_cancel(&self) {
        self.controller.request_cancel();
    }

    pub fn request_pause(&self) {
        self.controller.request_pause();
    }

    pub fn resume(&self) -> bool {
        self.controller.send(DebugCommand::Resume)
    }

    pub fn step_over(&self) -> bool {
        self.controller.send(DebugCommand::StepOver)
    }

    pub fn step_into(&self) -> bool {
        self.controller.send(DebugCommand::StepInto)
    }

    pub fn abort(&self) -> bool {
        self.controller.send(DebugCommand::Abort)
    }

    pub fn dispose(&self) {
        self.controller.dispose();
    }

    pub fn status(&self) -> EngineStatus {
        self.controller.status()
    }

    pub fn paused_line(&self) -> Option<usize> {
        self.controller.paused_line()
    }

    pub fn is_cancelled(&self) -> bool {
        self.controller.is_cancelled()
    }

    /// Blocks until the engine reports `status` or `timeout` elapses.
    pub fn wait_for_status(&self, status: EngineStatus, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.status() == status {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}
